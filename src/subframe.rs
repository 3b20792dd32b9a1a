//! Sub-frame assembly.
//!
//! This module contains the [`SubframeAssembler`], which collects the 15
//! pages of each 30-second sub-frame per satellite and produces a
//! [`Subframe`] holding the complete HKROOT and MACK messages. Missing
//! pages are handled according to the gaps policy: with gaps disallowed,
//! incomplete sub-frames are dropped silently; with gaps allowed, the
//! sub-frame is emitted with a presence bitmap and the missing sections
//! read as zero.

use crate::pages::Page;
use crate::types::{
    HkrootMessage, MackMessage, HKROOT_MESSAGE_BYTES, MACK_MESSAGE_BYTES, MACK_SECTION_BYTES,
    NUM_SVNS, PAGES_PER_SUBFRAME,
};
use crate::{Gst, Svn};

/// Bitmap value with all 15 pages present.
pub const ALL_PAGES: u16 = (1 << PAGES_PER_SUBFRAME) - 1;

/// Assembled sub-frame for one satellite.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct Subframe {
    svn: Svn,
    gst: Gst,
    hkroot: HkrootMessage,
    mack: MackMessage,
    present: u16,
}

impl Subframe {
    /// Returns the SVN of the transmitting satellite.
    pub fn svn(&self) -> Svn {
        self.svn
    }

    /// Returns the GST at the start of the sub-frame.
    pub fn gst(&self) -> Gst {
        self.gst
    }

    /// Returns the HKROOT message.
    pub fn hkroot(&self) -> &HkrootMessage {
        &self.hkroot
    }

    /// Returns the MACK message.
    pub fn mack(&self) -> &MackMessage {
        &self.mack
    }

    /// Returns the page presence bitmap (bit `n` set if page `n` arrived).
    pub fn present(&self) -> u16 {
        self.present
    }

    /// Returns `true` if all 15 pages of the sub-frame were received.
    pub fn complete(&self) -> bool {
        self.present == ALL_PAGES
    }
}

/// Notice that a sub-frame epoch ended without being emitted.
///
/// Produced when pages of a newer epoch arrive while an older epoch is
/// still incomplete, which happens after page losses or a loss of lock.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct SubframeGap {
    /// SVN of the transmitting satellite.
    pub svn: Svn,
    /// GST of the flushed sub-frame.
    pub gst: Gst,
    /// Pages that had arrived before the flush.
    pub present: u16,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
struct SvnState {
    gst: Option<Gst>,
    hkroot: HkrootMessage,
    mack: MackMessage,
    present: u16,
    emitted: bool,
}

impl SvnState {
    fn empty() -> SvnState {
        SvnState {
            gst: None,
            hkroot: [0; HKROOT_MESSAGE_BYTES],
            mack: [0; MACK_MESSAGE_BYTES],
            present: 0,
            emitted: false,
        }
    }

    fn reset(&mut self, gst: Gst) {
        *self = SvnState::empty();
        self.gst = Some(gst);
    }
}

/// Sub-frame assembler.
///
/// Collects pages for the 36 satellites in parallel. Pages must be fed in
/// chronological order per satellite; a page older than the sub-frame
/// being collected for its satellite is discarded.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct SubframeAssembler {
    state: [SvnState; NUM_SVNS],
    allow_gaps: bool,
}

impl SubframeAssembler {
    /// Creates a new assembler with the given gaps policy.
    pub fn new(allow_gaps: bool) -> SubframeAssembler {
        SubframeAssembler {
            state: [SvnState::empty(); NUM_SVNS],
            allow_gaps,
        }
    }

    /// Feed a decoded page.
    ///
    /// Returns the completed sub-frame, if this page completes one, and a
    /// gap notice, if this page starts a new epoch while an older one was
    /// still pending.
    pub fn feed(&mut self, page: &Page) -> (Option<Subframe>, Option<SubframeGap>) {
        let svn = page.svn;
        let sf_gst = page.gst.gst_subframe();
        let state = &mut self.state[usize::from(svn) - 1];
        let mut gap = None;
        match state.gst {
            Some(g) if g == sf_gst => (),
            Some(g) if g > sf_gst => {
                log::warn!(
                    "{} page at {:?} is older than current sub-frame {:?}; discarded",
                    svn,
                    page.gst,
                    g
                );
                return (None, None);
            }
            Some(g) => {
                if !state.emitted && state.present != 0 {
                    log::info!(
                        "{} sub-frame {:?} flushed incomplete (pages {:#06x})",
                        svn,
                        g,
                        state.present
                    );
                    gap = Some(SubframeGap {
                        svn,
                        gst: g,
                        present: state.present,
                    });
                }
                state.reset(sf_gst);
            }
            None => state.reset(sf_gst),
        }
        let slot = usize::try_from((page.gst.tow() % 30) / 2).unwrap();
        state.hkroot[slot] = page.osnma[0];
        state.mack[slot * MACK_SECTION_BYTES..(slot + 1) * MACK_SECTION_BYTES]
            .copy_from_slice(&page.osnma[1..]);
        state.present |= 1 << slot;
        let mut out = None;
        if slot == PAGES_PER_SUBFRAME - 1 && !state.emitted {
            state.emitted = true;
            if state.present == ALL_PAGES || self.allow_gaps {
                log::trace!(
                    "{} sub-frame {:?} assembled (pages {:#06x})",
                    svn,
                    sf_gst,
                    state.present
                );
                out = Some(Subframe {
                    svn,
                    gst: sf_gst,
                    hkroot: state.hkroot,
                    mack: state.mack,
                    present: state.present,
                });
            } else {
                log::debug!(
                    "{} sub-frame {:?} incomplete (pages {:#06x}); dropped",
                    svn,
                    sf_gst,
                    state.present
                );
            }
        }
        (out, gap)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::types::{INAV_WORD_BYTES, OSNMA_FIELD_BYTES};

    fn make_page(svn: Svn, gst: Gst, counter: u8) -> Page {
        let mut osnma = [counter; OSNMA_FIELD_BYTES];
        osnma[0] ^= 0xff;
        Page {
            svn,
            gst,
            word: [0; INAV_WORD_BYTES],
            osnma,
        }
    }

    fn svn() -> Svn {
        Svn::try_from(1).unwrap()
    }

    #[test]
    fn assemble() {
        let wn = 1234;
        let tow0 = 123 * 30;
        let mut assembler = SubframeAssembler::new(false);
        let mut counter = 0;
        for tow in (tow0..tow0 + 30).step_by(2) {
            let page = make_page(svn(), Gst::new(wn, tow), counter);
            let (sf, gap) = assembler.feed(&page);
            assert!(gap.is_none());
            counter += 1;
            if tow != tow0 + 28 {
                assert!(sf.is_none());
            } else {
                let sf = sf.unwrap();
                assert_eq!(sf.svn(), svn());
                assert_eq!(sf.gst(), Gst::new(wn, tow0));
                assert!(sf.complete());
                let mut expected_hkroot = Vec::new();
                let mut expected_mack = Vec::new();
                for j in 0..PAGES_PER_SUBFRAME as u8 {
                    expected_hkroot.push(j ^ 0xff);
                    expected_mack.extend_from_slice(&[j; MACK_SECTION_BYTES]);
                }
                assert_eq!(&sf.hkroot()[..], &expected_hkroot[..]);
                assert_eq!(&sf.mack()[..], &expected_mack[..]);
            }
        }
    }

    #[test]
    fn missing_page_policies() {
        let wn = 1234;
        let tow0 = 200 * 30;
        // page at tow0 + 10 is lost
        for (allow_gaps, expect_emit) in [(false, false), (true, true)] {
            let mut assembler = SubframeAssembler::new(allow_gaps);
            let mut emitted = None;
            for tow in (tow0..tow0 + 30).step_by(2) {
                if tow == tow0 + 10 {
                    continue;
                }
                let page = make_page(svn(), Gst::new(wn, tow), 1);
                let (sf, _) = assembler.feed(&page);
                if sf.is_some() {
                    emitted = sf;
                }
            }
            assert_eq!(emitted.is_some(), expect_emit);
            if let Some(sf) = emitted {
                assert!(!sf.complete());
                assert_eq!(sf.present(), ALL_PAGES & !(1 << 5));
            }
        }
    }

    #[test]
    fn interleaved_epochs_flush() {
        let wn = 1234;
        let tow0 = 300 * 30;
        let mut assembler = SubframeAssembler::new(false);
        // a few pages of one epoch, then the next epoch starts
        for tow in (tow0..tow0 + 8).step_by(2) {
            let page = make_page(svn(), Gst::new(wn, tow), 0);
            let (sf, gap) = assembler.feed(&page);
            assert!(sf.is_none() && gap.is_none());
        }
        let page = make_page(svn(), Gst::new(wn, tow0 + 30), 0);
        let (sf, gap) = assembler.feed(&page);
        assert!(sf.is_none());
        let gap = gap.unwrap();
        assert_eq!(gap.gst, Gst::new(wn, tow0));
        assert_eq!(gap.present, 0b1111);
        // pages from the flushed epoch are now discarded
        let page = make_page(svn(), Gst::new(wn, tow0 + 8), 0);
        assert_eq!(assembler.feed(&page), (None, None));
    }
}
