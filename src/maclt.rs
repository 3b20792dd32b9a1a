//! MAC look-up table.
//!
//! The MAC look-up table from Annex C of the OSNMA SIS ICD prescribes, for
//! each MACLT id, the sequence of ADKDs and authentication objects that
//! the tags of a MACK message must follow. Slots marked FLX are flexible
//! and accept any tag; their tag-info fields enter the MACSEQ computation.

use crate::bitfields::Adkd;
use core::fmt;

const MSG: usize = 2;

/// Maximum number of FLX entries in a single MAC look-up table sequence.
pub const MAX_FLX_ENTRIES: usize = 4;

// Shorthand for table definitions
const S00: MacLTSlot = MacLTSlot::Fixed {
    adkd: Adkd::InavCed,
    object: AuthObject::SelfAuth,
};
const E00: MacLTSlot = MacLTSlot::Fixed {
    adkd: Adkd::InavCed,
    object: AuthObject::CrossAuth,
};
const S04: MacLTSlot = MacLTSlot::Fixed {
    adkd: Adkd::InavTiming,
    object: AuthObject::SelfAuth,
};
const S12: MacLTSlot = MacLTSlot::Fixed {
    adkd: Adkd::SlowMac,
    object: AuthObject::SelfAuth,
};
const E12: MacLTSlot = MacLTSlot::Fixed {
    adkd: Adkd::SlowMac,
    object: AuthObject::CrossAuth,
};
const FLX: MacLTSlot = MacLTSlot::Flex;

struct MacLTEntry {
    id: u8,
    // One sequence per half of the GST minute. The first slot, which is
    // always 00S and corresponds to tag0, is omitted, so each sequence
    // holds nt - 1 slots.
    sequences: [&'static [MacLTSlot]; MSG],
}

#[cfg(test)]
impl MacLTEntry {
    fn num_tags(&self) -> usize {
        self.sequences[0].len() + 1
    }
}

#[rustfmt::skip]
static MACLT: &[MacLTEntry] = &[
    MacLTEntry {
        id: 27,
        sequences: [
            &[E00, E00, E00, S12, E00],
            &[E00, E00, S04, S12, E00],
        ],
    },
    MacLTEntry {
        id: 28,
        sequences: [
            &[E00, E00, E00, S00, E00, E00, S12, E00, E00],
            &[E00, E00, S00, E00, E00, S04, S12, E00, E00],
        ],
    },
    MacLTEntry {
        id: 31,
        sequences: [
            &[E00, E00, S12, E00],
            &[E00, E00, S12, S04],
        ],
    },
    MacLTEntry {
        id: 33,
        sequences: [
            &[E00, S04, E00, S12, E00],
            &[E00, E00, S12, E00, E12],
        ],
    },
    MacLTEntry {
        id: 34,
        sequences: [
            &[FLX, S04, FLX, S12, E00],
            &[FLX, E00, S12, E00, E12],
        ],
    },
    MacLTEntry {
        id: 35,
        sequences: [
            &[FLX, S04, FLX, S12, FLX],
            &[FLX, FLX, S12, FLX, FLX],
        ],
    },
    MacLTEntry {
        id: 36,
        sequences: [
            &[FLX, S04, FLX, S12],
            &[FLX, E00, S12, E12],
        ],
    },
    MacLTEntry {
        id: 37,
        sequences: [
            &[E00, S04, E00, S12],
            &[E00, E00, S12, E12],
        ],
    },
    MacLTEntry {
        id: 38,
        sequences: [
            &[FLX, S04, FLX, S12],
            &[FLX, FLX, S12, FLX],
        ],
    },
    MacLTEntry {
        id: 39,
        sequences: [
            &[FLX, S04, FLX],
            &[FLX, E00, S12],
        ],
    },
    MacLTEntry {
        id: 40,
        sequences: [
            &[E00, S04, S12],
            &[E00, E00, E12],
        ],
    },
    MacLTEntry {
        id: 41,
        sequences: [
            &[FLX, S04, FLX],
            &[FLX, FLX, S12],
        ],
    },
];

/// Looks up an entry in the MAC look-up table.
///
/// Returns the slot for the table id `maclt`, message number `msg` (zero or
/// one, selecting the half of the GST minute) and tag number `num_tag`.
///
/// # Panics
///
/// Panics if `msg` is not zero or one, or if `num_tag` is zero.
pub fn get_maclt_entry(maclt: u8, msg: usize, num_tag: usize) -> Result<MacLTSlot, MacLTError> {
    assert!((msg == 0) || (msg == 1));
    assert!(num_tag >= 1);
    let entry = find_entry(maclt)?;
    let slot = *entry.sequences[msg]
        .get(num_tag - 1)
        .ok_or(MacLTError::InvalidTagNumber)?;
    // The table only uses self-authentication for timing parameters
    if let MacLTSlot::Fixed { adkd, object } = slot {
        assert!(adkd != Adkd::InavTiming || object == AuthObject::SelfAuth);
    }
    Ok(slot)
}

/// Returns an iterator over the tag indices of the FLX slots for a table
/// id `maclt` and message number `msg` (zero or one).
///
/// # Panics
///
/// Panics if `msg` is not zero or one.
pub fn get_flx_indices(maclt: u8, msg: usize) -> Result<impl Iterator<Item = usize>, MacLTError> {
    assert!((msg == 0) || (msg == 1));
    let entry = find_entry(maclt)?;
    Ok(entry.sequences[msg]
        .iter()
        .enumerate()
        .filter_map(|(j, &slot)| if slot == FLX { Some(j + 1) } else { None }))
}

fn find_entry(maclt: u8) -> Result<&'static MacLTEntry, MacLTError> {
    MACLT
        .iter()
        .find(|entry| entry.id == maclt)
        .ok_or(MacLTError::InvalidMaclt)
}

/// MAC look-up table slot.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum MacLTSlot {
    /// Fixed slot, such as '00S', '04S', '12S', '00E', or '12E'.
    Fixed {
        /// ADKD of the fixed slot.
        adkd: Adkd,
        /// Authentication object of the fixed slot.
        object: AuthObject,
    },
    /// Flexible slot ('FLX' in the table).
    Flex,
}

/// Object authenticated by a MAC look-up table entry.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum AuthObject {
    /// Self-authentication ('S' in the table entry).
    SelfAuth,
    /// Cross-authentication ('E' in the table entry).
    CrossAuth,
}

/// Errors produced during MAC table look-up.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum MacLTError {
    /// The MACLT value does not appear as an id in the table.
    InvalidMaclt,
    /// The tag number exceeds the number of tags of the table entry.
    InvalidTagNumber,
}

impl fmt::Display for MacLTError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MacLTError::InvalidMaclt => "invalid MAC look-up table ID".fmt(f),
            MacLTError::InvalidTagNumber => "invalid tag number".fmt(f),
        }
    }
}

impl std::error::Error for MacLTError {}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn lookups() {
        assert_eq!(get_maclt_entry(34, 0, 1), Ok(FLX));
        assert_eq!(get_maclt_entry(34, 0, 2), Ok(S04));
        assert_eq!(get_maclt_entry(34, 1, 5), Ok(E12));
        assert_eq!(get_maclt_entry(26, 0, 1), Err(MacLTError::InvalidMaclt));
        assert_eq!(get_maclt_entry(34, 0, 6), Err(MacLTError::InvalidTagNumber));
    }

    #[test]
    #[should_panic]
    fn lookup_wrong_msg() {
        let _ = get_maclt_entry(34, 2, 1);
    }

    #[test]
    #[should_panic]
    fn lookup_wrong_tag_number() {
        let _ = get_maclt_entry(34, 0, 0);
    }

    #[test]
    fn sequences_consistent() {
        for entry in MACLT {
            assert!(entry.num_tags() >= 2);
            assert_eq!(entry.sequences[0].len(), entry.sequences[1].len());
        }
    }

    #[test]
    fn max_flx_entries() {
        let max = MACLT
            .iter()
            .flat_map(|entry| entry.sequences.iter())
            .map(|s| s.iter().filter(|&&slot| slot == FLX).count())
            .max()
            .unwrap();
        assert_eq!(max, MAX_FLX_ENTRIES);
    }

    #[test]
    fn flx_indices() {
        let indices = get_flx_indices(34, 0).unwrap().collect::<Vec<_>>();
        assert_eq!(&indices, &[1, 3]);
        let indices = get_flx_indices(34, 1).unwrap().collect::<Vec<_>>();
        assert_eq!(&indices, &[1]);
    }
}
