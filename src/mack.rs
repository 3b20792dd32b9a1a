//! MACK message storage.
//!
//! This module contains [`MackStorage`], which holds MACK messages until
//! the TESLA keys that resolve their tags are disclosed. Each stored
//! message tracks whether its fast tags (key delay of one sub-frame) and
//! its Slow MAC tags (key delay of eleven sub-frames) have been resolved,
//! so that tags whose key never becomes authentic can be reported exactly
//! once when they expire.

use crate::gst::Gst;
use crate::storage::StaticStorage;
use crate::types::MackMessage;
use crate::Svn;
use generic_array::GenericArray;
use typenum::Unsigned;

/// Sub-frames after which unresolved fast tags expire.
///
/// The disclosing key arrives one sub-frame after the tags; twice the key
/// delay plus one sub-frame of slack.
pub const FAST_EXPIRY_SUBFRAMES: i64 = 3;

/// Sub-frames after which unresolved Slow MAC tags expire.
///
/// The disclosing key arrives eleven sub-frames after the tags; the key
/// delay plus two sub-frames of slack.
pub const SLOW_EXPIRY_SUBFRAMES: i64 = 13;

/// MACK message store.
///
/// A statically sized container holding a history of MACK messages per
/// satellite. As new messages are stored, the oldest ones are erased.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct MackStorage<S: StaticStorage> {
    macks: GenericArray<Option<MackEntry>, S::MackDepthSats>,
    gsts: GenericArray<Option<Gst>, S::MackDepth>,
    write_pointer: usize,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
struct MackEntry {
    message: MackMessage,
    svn: Svn,
    fast_resolved: bool,
    slow_resolved: bool,
}

/// A stored MACK message with tags that expired unresolved.
///
/// Returned by [`MackStorage::sweep_expired`] so the caller can report
/// the affected tags.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct ExpiredMack {
    /// The stored MACK message.
    pub message: MackMessage,
    /// SVN of the satellite that transmitted the message.
    pub svn: Svn,
    /// GST at the start of the sub-frame of the message.
    pub gst: Gst,
    /// `true` if the fast tags of the message were never resolved.
    pub fast_pending: bool,
    /// `true` if the Slow MAC tags of the message were never resolved.
    pub slow_pending: bool,
}

impl<S: StaticStorage> MackStorage<S> {
    /// Creates a new, empty store of MACK messages.
    pub fn new() -> MackStorage<S> {
        MackStorage {
            macks: GenericArray::default(),
            gsts: GenericArray::default(),
            write_pointer: 0,
        }
    }

    /// Store a MACK message.
    ///
    /// The `svn` parameter is the SVN of the satellite that transmitted
    /// the message, and `gst` the GST at the start of its sub-frame. The
    /// oldest messages are erased when storage space is needed.
    pub fn store(&mut self, mack: &MackMessage, svn: Svn, gst: Gst) {
        self.adjust_write_pointer(gst);
        for location in self.current_macks_as_mut().iter_mut() {
            if location.is_none() {
                log::trace!("storing MACK {:02x?} for {} and GST {:?}", mack, svn, gst);
                *location = Some(MackEntry {
                    message: *mack,
                    svn,
                    fast_resolved: false,
                    slow_resolved: false,
                });
                return;
            }
        }
        log::warn!(
            "no room to store MACK {:02x?} for {} and GST {:?}",
            mack,
            svn,
            gst
        );
    }

    fn current_macks_as_mut(&mut self) -> &mut [Option<MackEntry>] {
        &mut self.macks[self.write_pointer * S::NUM_SATS..(self.write_pointer + 1) * S::NUM_SATS]
    }

    fn adjust_write_pointer(&mut self, gst: Gst) {
        // When the write pointer points to a valid GST distinct from the
        // current one, advance it and erase the entries at the new
        // location.
        if let Some(g) = self.gsts[self.write_pointer] {
            if g != gst {
                log::trace!(
                    "got a new GST {:?} (current GST is {:?}); advancing write pointer",
                    gst,
                    g
                );
                self.write_pointer = (self.write_pointer + 1) % S::MackDepth::USIZE;
                self.current_macks_as_mut().fill(None);
            }
        }
        self.gsts[self.write_pointer] = Some(gst);
    }

    /// Try to retrieve the MACK message for a satellite and sub-frame.
    pub fn get(&self, svn: Svn, gst: Gst) -> Option<&MackMessage> {
        let gst_idx = self.find_gst(gst)?;
        self.macks[gst_idx * S::NUM_SATS..(gst_idx + 1) * S::NUM_SATS]
            .iter()
            .flatten()
            .find_map(|entry| {
                if entry.svn == svn {
                    Some(&entry.message)
                } else {
                    None
                }
            })
    }

    /// Marks the fast tags of a stored message as resolved.
    pub fn mark_fast_resolved(&mut self, svn: Svn, gst: Gst) {
        self.mark(svn, gst, |entry| entry.fast_resolved = true);
    }

    /// Marks the Slow MAC tags of a stored message as resolved.
    pub fn mark_slow_resolved(&mut self, svn: Svn, gst: Gst) {
        self.mark(svn, gst, |entry| entry.slow_resolved = true);
    }

    fn mark(&mut self, svn: Svn, gst: Gst, f: impl Fn(&mut MackEntry)) {
        let Some(gst_idx) = self.find_gst(gst) else {
            return;
        };
        for entry in self.macks[gst_idx * S::NUM_SATS..(gst_idx + 1) * S::NUM_SATS]
            .iter_mut()
            .flatten()
        {
            if entry.svn == svn {
                f(entry);
                return;
            }
        }
    }

    fn find_gst(&self, gst: Gst) -> Option<usize> {
        self.gsts
            .iter()
            .enumerate()
            .find_map(|(j, &g)| if g == Some(gst) { Some(j) } else { None })
    }

    /// Collects the stored messages whose unresolved tags have expired.
    ///
    /// Fast tags expire [`FAST_EXPIRY_SUBFRAMES`] after their sub-frame
    /// and Slow MAC tags after [`SLOW_EXPIRY_SUBFRAMES`]. Expired tags are
    /// marked resolved, so each message is returned at most once per tag
    /// class.
    pub fn sweep_expired(&mut self, current: Gst) -> Vec<ExpiredMack> {
        // With a history shorter than the nominal windows, entries must
        // expire before the ring overwrites them.
        let depth_limit = i64::try_from(S::MackDepth::USIZE - 1).unwrap();
        let fast_limit = FAST_EXPIRY_SUBFRAMES.min(depth_limit);
        let slow_limit = SLOW_EXPIRY_SUBFRAMES.min(depth_limit);
        let mut expired = Vec::new();
        for (gst_idx, g) in self.gsts.iter().enumerate() {
            let Some(g) = *g else {
                continue;
            };
            let age = current.subframes_difference(g);
            let fast_expired = age >= fast_limit;
            let slow_expired = age >= slow_limit;
            if !fast_expired && !slow_expired {
                continue;
            }
            for entry in self.macks[gst_idx * S::NUM_SATS..(gst_idx + 1) * S::NUM_SATS]
                .iter_mut()
                .flatten()
            {
                let fast_pending = fast_expired && !entry.fast_resolved;
                let slow_pending = slow_expired && !entry.slow_resolved;
                if !fast_pending && !slow_pending {
                    continue;
                }
                entry.fast_resolved |= fast_pending;
                entry.slow_resolved |= slow_pending;
                expired.push(ExpiredMack {
                    message: entry.message,
                    svn: entry.svn,
                    gst: g,
                    fast_pending,
                    slow_pending,
                });
            }
        }
        expired
    }
}

impl<S: StaticStorage> Default for MackStorage<S> {
    fn default() -> MackStorage<S> {
        MackStorage::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::storage::FullStorage;
    use crate::types::MACK_MESSAGE_BYTES;

    fn message(value: u8) -> MackMessage {
        [value; MACK_MESSAGE_BYTES]
    }

    #[test]
    fn store_and_get() {
        let mut storage = MackStorage::<FullStorage>::new();
        let svn = Svn::try_from(5).unwrap();
        let gst = Gst::new(1176, 121050);
        storage.store(&message(1), svn, gst);
        storage.store(&message(2), Svn::try_from(6).unwrap(), gst);
        assert_eq!(storage.get(svn, gst), Some(&message(1)));
        assert_eq!(storage.get(Svn::try_from(7).unwrap(), gst), None);
        assert_eq!(storage.get(svn, gst.add_subframes(1)), None);
    }

    #[test]
    fn expiry_sweep() {
        let mut storage = MackStorage::<FullStorage>::new();
        let svn = Svn::try_from(5).unwrap();
        let gst = Gst::new(1176, 121050);
        storage.store(&message(1), svn, gst);
        // nothing expires while the message is fresh
        assert!(storage
            .sweep_expired(gst.add_subframes(2))
            .is_empty());
        // fast tags expire first
        let expired = storage.sweep_expired(gst.add_subframes(3));
        assert_eq!(expired.len(), 1);
        assert!(expired[0].fast_pending);
        assert!(!expired[0].slow_pending);
        // fast tags are only reported once
        assert!(storage.sweep_expired(gst.add_subframes(4)).is_empty());
        // Slow MAC tags expire later
        let expired = storage.sweep_expired(gst.add_subframes(13));
        assert_eq!(expired.len(), 1);
        assert!(!expired[0].fast_pending);
        assert!(expired[0].slow_pending);
        assert!(storage.sweep_expired(gst.add_subframes(14)).is_empty());
    }

    #[test]
    fn resolved_entries_do_not_expire() {
        let mut storage = MackStorage::<FullStorage>::new();
        let svn = Svn::try_from(5).unwrap();
        let gst = Gst::new(1176, 121050);
        storage.store(&message(1), svn, gst);
        storage.mark_fast_resolved(svn, gst);
        assert!(storage.sweep_expired(gst.add_subframes(3)).is_empty());
        storage.mark_slow_resolved(svn, gst);
        assert!(storage.sweep_expired(gst.add_subframes(13)).is_empty());
    }
}
