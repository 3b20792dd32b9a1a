//! Engine events.
//!
//! The engine reports its outcomes as values of the [`Event`] enum, which
//! are delivered to the registered [`Subscriber`]s. Events carry their
//! data by value; subscribers never hold references into the engine. The
//! `Display` implementation gives the canonical one-line form of each
//! event, which the CLI prints to stdout.

use crate::bitfields::Adkd;
use crate::{Gst, Svn};
use core::fmt;

/// Outcome of an authentication attempt for one tag.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum AuthOutcome {
    /// The computed tag matches the received tag.
    Ok,
    /// The disclosing key is authentic but the tag does not match.
    InvalidTag,
    /// The disclosing key never became authentic within the waiting
    /// window.
    MissingKey,
    /// The navigation data required by the tag was never seen, or is too
    /// stale for the tag's cut-off.
    UnknownData,
}

impl fmt::Display for AuthOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthOutcome::Ok => "OK".fmt(f),
            AuthOutcome::InvalidTag => "INVALID_TAG".fmt(f),
            AuthOutcome::MissingKey => "MISSING_KEY".fmt(f),
            AuthOutcome::UnknownData => "UNKNOWN_DATA".fmt(f),
        }
    }
}

/// Event emitted by the engine.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Event {
    /// A tag reached a terminal authentication outcome.
    AuthAttempt {
        /// SVN of the satellite whose data was authenticated (or 255 for
        /// constellation data).
        prnd: u8,
        /// SVN of the satellite that transmitted the tag.
        prna: Svn,
        /// GST at the start of the sub-frame in which the tag was
        /// transmitted.
        gst: Gst,
        /// ADKD of the tag.
        adkd: Adkd,
        /// Outcome of the attempt.
        outcome: AuthOutcome,
    },
    /// A page failed its CRC check.
    PageCrcFail {
        /// SVN of the transmitting satellite.
        svn: Svn,
        /// GST at the start of the page.
        gst: Gst,
    },
    /// A half-page arrived without a matching partner.
    PagePairingFail {
        /// SVN of the transmitting satellite.
        svn: Svn,
        /// GST at the start of the half-page.
        gst: Gst,
    },
    /// A sub-frame epoch ended without all its pages.
    SubframeGap {
        /// SVN of the transmitting satellite.
        svn: Svn,
        /// GST of the flushed sub-frame.
        gst: Gst,
        /// Bitmap of the pages that had arrived.
        pages: u16,
    },
    /// A DSM-KROOT was verified and its chain installed.
    KrootVerified {
        /// Chain ID of the installed chain.
        chain_id: u8,
        /// GST of the sub-frame in which the verification happened.
        gst: Gst,
    },
    /// A DSM-KROOT failed its ECDSA signature check.
    KrootSignatureFail {
        /// GST of the sub-frame in which the check happened.
        gst: Gst,
    },
    /// A disclosed TESLA key failed the one-way chain walk.
    KeyChainFail {
        /// SVN that disclosed the key.
        svn: Svn,
        /// GST of the sub-frame in which the key was disclosed.
        gst: Gst,
    },
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::AuthAttempt {
                prnd,
                prna,
                gst,
                adkd,
                outcome,
            } => write!(
                f,
                "AuthAttempt(PRND={}, PRNA={}, wn={}, tow={}, adkd={}, outcome={})",
                prnd,
                u8::from(*prna),
                gst.wn(),
                gst.tow(),
                adkd.value(),
                outcome
            ),
            Event::PageCrcFail { svn, gst } => write!(
                f,
                "Page CRC failed. WN: {}, TOW: {}, SVID: {}",
                gst.wn(),
                gst.tow(),
                u8::from(*svn)
            ),
            Event::PagePairingFail { svn, gst } => write!(
                f,
                "Page pairing failed. WN: {}, TOW: {}, SVID: {}",
                gst.wn(),
                gst.tow(),
                u8::from(*svn)
            ),
            Event::SubframeGap { svn, gst, pages } => write!(
                f,
                "SubframeGap(svn={}, wn={}, tow={}, pages={:#06x})",
                u8::from(*svn),
                gst.wn(),
                gst.tow(),
                pages
            ),
            Event::KrootVerified { chain_id, gst } => write!(
                f,
                "KrootVerified(chain={}, wn={}, tow={})",
                chain_id,
                gst.wn(),
                gst.tow()
            ),
            Event::KrootSignatureFail { gst } => write!(
                f,
                "KrootSignatureFail(wn={}, tow={})",
                gst.wn(),
                gst.tow()
            ),
            Event::KeyChainFail { svn, gst } => write!(
                f,
                "KeyChainFail(svn={}, wn={}, tow={})",
                u8::from(*svn),
                gst.wn(),
                gst.tow()
            ),
        }
    }
}

/// Receiver of engine events.
///
/// Subscribers are registered on the engine at setup and called for every
/// event, in emission order. A failing subscriber is logged and does not
/// interrupt processing.
pub trait Subscriber {
    /// Handles one event.
    fn handle(&mut self, event: &Event) -> Result<(), Box<dyn std::error::Error>>;
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn canonical_forms() {
        let prna = Svn::try_from(12).unwrap();
        let event = Event::AuthAttempt {
            prnd: 11,
            prna,
            gst: Gst::new(1176, 121050),
            adkd: Adkd::InavCed,
            outcome: AuthOutcome::Ok,
        };
        assert_eq!(
            format!("{}", event),
            "AuthAttempt(PRND=11, PRNA=12, wn=1176, tow=121050, adkd=0, outcome=OK)"
        );
        let event = Event::AuthAttempt {
            prnd: 11,
            prna,
            gst: Gst::new(1176, 121050),
            adkd: Adkd::SlowMac,
            outcome: AuthOutcome::MissingKey,
        };
        assert_eq!(
            format!("{}", event),
            "AuthAttempt(PRND=11, PRNA=12, wn=1176, tow=121050, adkd=12, outcome=MISSING_KEY)"
        );
        let event = Event::PageCrcFail {
            svn: prna,
            gst: Gst::new(1176, 121052),
        };
        assert_eq!(
            format!("{}", event),
            "Page CRC failed. WN: 1176, TOW: 121052, SVID: 12"
        );
        let event = Event::KrootSignatureFail {
            gst: Gst::new(1176, 121050),
        };
        assert_eq!(format!("{}", event), "KrootSignatureFail(wn=1176, tow=121050)");
    }
}
