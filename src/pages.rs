//! I/NAV page decoding.
//!
//! This module contains the [`PageDecoder`], which pairs the even and odd
//! half-pages of a nominal I/NAV page, checks the page CRC, and extracts
//! the navigation word and the OSNMA field. Alert pages and dummy words
//! are excluded from further processing.

use crate::types::{
    BitSlice, HalfPage, InavWord, OsnmaField, PageBits, HALF_PAGE_BYTES, NUM_SVNS,
};
use crate::{Gst, Svn};
use bitvec::prelude::*;
use core::fmt;

// CRC-24Q generator polynomial (without the x^24 term).
const CRC_POLY: u32 = 0x86_4CFB;
// Bits of the even and odd half-pages covered by the CRC.
const CRC_EVEN_BITS: usize = 114;
const CRC_ODD_BITS: usize = 82;
const CRC_BITS: usize = 24;

// Dummy pages carry word type 63.
const WORD_TYPE_DUMMY: u8 = 63;

/// Decoded nominal page.
///
/// Produced by the [`PageDecoder`] once both half-pages have been received
/// and the CRC has been checked.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct Page {
    /// SVN of the transmitting satellite.
    pub svn: Svn,
    /// GST at the start of the page transmission.
    pub gst: Gst,
    /// The 128-bit I/NAV word carried by the page.
    pub word: InavWord,
    /// The 40-bit OSNMA field carried by the page.
    pub osnma: OsnmaField,
}

/// Page decoding errors.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum PageError {
    /// The 24-bit page CRC does not match.
    Crc,
    /// A half-page arrived without a matching partner.
    Pairing,
}

impl fmt::Display for PageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageError::Crc => "page CRC check failed".fmt(f),
            PageError::Pairing => "half-page without matching partner".fmt(f),
        }
    }
}

impl std::error::Error for PageError {}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
struct PendingEven {
    gst: Gst,
    half: HalfPage,
}

/// Page decoder.
///
/// Buffers even half-pages per satellite until the matching odd half-page
/// arrives, then validates and decodes the full page. Sources that deliver
/// whole pages can use [`PageDecoder::feed_page`] directly.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct PageDecoder {
    pending: [Option<PendingEven>; NUM_SVNS],
}

impl PageDecoder {
    /// Creates a new, empty page decoder.
    pub fn new() -> PageDecoder {
        PageDecoder {
            pending: [None; NUM_SVNS],
        }
    }

    /// Feed one 120-bit half-page.
    ///
    /// The `gst` parameter gives the GST at the start of the half-page
    /// transmission (the odd half may be stamped either at the page start
    /// or one second later). A `Page` is returned once the even and odd
    /// halves of the same page have both been seen and the CRC checks out.
    /// Alert pages and dummy words decode to `Ok(None)`.
    pub fn feed_half_page(
        &mut self,
        svn: Svn,
        gst: Gst,
        half: &HalfPage,
    ) -> Result<Option<Page>, PageError> {
        let odd = BitSlice::from_slice(half)[0];
        let idx = usize::from(svn) - 1;
        if !odd {
            let stale = self.pending[idx].replace(PendingEven { gst, half: *half });
            return if stale.is_some() {
                log::warn!("{} even half-page at {:?} replaces unpaired one", svn, gst);
                Err(PageError::Pairing)
            } else {
                Ok(None)
            };
        }
        let Some(even) = self.pending[idx].take() else {
            log::warn!("{} odd half-page at {:?} without even partner", svn, gst);
            return Err(PageError::Pairing);
        };
        if gst != even.gst && gst != even.gst.add_seconds(1) {
            log::warn!(
                "{} half-pages at {:?} and {:?} do not belong to the same page",
                svn,
                even.gst,
                gst
            );
            return Err(PageError::Pairing);
        }
        Self::decode(svn, even.gst, &even.half, half)
    }

    /// Feed a full 240-bit nominal page (even half followed by odd half).
    ///
    /// The `gst` parameter gives the GST at the start of the page
    /// transmission.
    pub fn feed_page(
        &mut self,
        svn: Svn,
        gst: Gst,
        page: &PageBits,
    ) -> Result<Option<Page>, PageError> {
        let even: HalfPage = page[..HALF_PAGE_BYTES].try_into().unwrap();
        let odd: HalfPage = page[HALF_PAGE_BYTES..].try_into().unwrap();
        if BitSlice::from_slice(&even)[0] || !BitSlice::from_slice(&odd)[0] {
            log::warn!("{} page at {:?} has wrong even/odd flags", svn, gst);
            return Err(PageError::Pairing);
        }
        Self::decode(svn, gst, &even, &odd)
    }

    fn decode(svn: Svn, gst: Gst, even: &HalfPage, odd: &HalfPage) -> Result<Option<Page>, PageError> {
        let even_bits = BitSlice::from_slice(even);
        let odd_bits = BitSlice::from_slice(odd);
        if even_bits[1] || odd_bits[1] {
            log::debug!("{} alert page at {:?} excluded", svn, gst);
            return Ok(None);
        }
        let crc = crc24q_update(0, &even_bits[..CRC_EVEN_BITS]);
        let crc = crc24q_update(crc, &odd_bits[..CRC_ODD_BITS]);
        let received = odd_bits[CRC_ODD_BITS..CRC_ODD_BITS + CRC_BITS].load_be::<u32>();
        if crc != received {
            log::warn!(
                "{} page at {:?} CRC mismatch (computed {:06x}, received {:06x})",
                svn,
                gst,
                crc,
                received
            );
            return Err(PageError::Crc);
        }
        let mut word = [0u8; crate::types::INAV_WORD_BYTES];
        {
            let word_bits = BitSlice::from_slice_mut(&mut word);
            word_bits[..112].copy_from_bitslice(&even_bits[2..114]);
            word_bits[112..128].copy_from_bitslice(&odd_bits[2..18]);
        }
        let word_type = BitSlice::from_slice(&word)[..6].load_be::<u8>();
        if word_type == WORD_TYPE_DUMMY {
            log::trace!("{} dummy word at {:?} excluded", svn, gst);
            return Ok(None);
        }
        let mut osnma = [0u8; crate::types::OSNMA_FIELD_BYTES];
        BitSlice::from_slice_mut(&mut osnma).copy_from_bitslice(&odd_bits[18..58]);
        log::trace!(
            "{} decoded page at {:?}, word type {}, osnma {:02x?}",
            svn,
            gst,
            word_type,
            osnma
        );
        Ok(Some(Page {
            svn,
            gst,
            word,
            osnma,
        }))
    }
}

impl Default for PageDecoder {
    fn default() -> PageDecoder {
        PageDecoder::new()
    }
}

// Bit-serial CRC-24Q update, MSB first, init 0, no reflection.
fn crc24q_update(crc: u32, bits: &BitSlice) -> u32 {
    let mut crc = crc;
    for bit in bits.iter().by_vals() {
        let feedback = ((crc >> 23) & 1) ^ u32::from(bit);
        crc = (crc << 1) & 0xFF_FFFF;
        if feedback != 0 {
            crc ^= CRC_POLY;
        }
    }
    crc
}

// Builds a well-formed nominal page with the given word type and OSNMA
// field, used by the tests of this module and of the engine.
#[cfg(test)]
pub(crate) fn build_test_page(word_type: u8, osnma: &OsnmaField) -> PageBits {
    let mut page = [0u8; crate::types::PAGE_BYTES];
    {
        let bits = BitSlice::from_slice_mut(&mut page);
        // even half: even/odd = 0, page type = 0 (nominal)
        bits[2..8].store_be(word_type);
        // fill the data fields with a pattern
        for j in (8..114).step_by(2) {
            bits.set(j, true);
        }
        // odd half: even/odd = 1, page type = 0
        bits.set(120, true);
        for (j, byte) in osnma.iter().enumerate() {
            bits[138 + 8 * j..146 + 8 * j].store_be(*byte);
        }
    }
    let crc = {
        let bits = BitSlice::from_slice(&page);
        let c = crc24q_update(0, &bits[..114]);
        crc24q_update(c, &bits[120..202])
    };
    BitSlice::from_slice_mut(&mut page)[202..226].store_be(crc);
    page
}
