//! Common types and protocol sizes.
//!
//! This module collects the fixed sizes of the I/NAV and OSNMA message
//! structures and the type aliases built on them, which are used throughout
//! the crate.

/// Number of bytes in an I/NAV half-page (120 bits).
pub const HALF_PAGE_BYTES: usize = 15;
/// I/NAV half-page.
///
/// Contains the 120 bits of the even or odd part of a nominal page,
/// including the 6 tail bits.
pub type HalfPage = [u8; HALF_PAGE_BYTES];

/// Number of bytes in a full nominal page (240 bits).
pub const PAGE_BYTES: usize = 2 * HALF_PAGE_BYTES;
/// Full nominal page: the even half-page followed by the odd half-page.
pub type PageBits = [u8; PAGE_BYTES];

/// Size in bytes of the HKROOT section carried by one page.
pub const HKROOT_SECTION_BYTES: usize = 1;
/// Size in bytes of the MACK section carried by one page.
pub const MACK_SECTION_BYTES: usize = 4;
/// Size in bytes of the OSNMA field of one page.
///
/// The OSNMA field is 40 bits in the odd half-page: 8 bits of HKROOT
/// followed by 32 bits of MACK.
pub const OSNMA_FIELD_BYTES: usize = HKROOT_SECTION_BYTES + MACK_SECTION_BYTES;
/// OSNMA field of one page.
pub type OsnmaField = [u8; OSNMA_FIELD_BYTES];

/// Number of nominal pages in a 30-second sub-frame.
pub const PAGES_PER_SUBFRAME: usize = 15;

/// Number of bytes in a complete HKROOT message (one sub-frame).
pub const HKROOT_MESSAGE_BYTES: usize = HKROOT_SECTION_BYTES * PAGES_PER_SUBFRAME;
/// HKROOT message: NMA header, DSM header, and one 13-byte DSM block.
pub type HkrootMessage = [u8; HKROOT_MESSAGE_BYTES];

/// Number of bytes in a complete MACK message (one sub-frame).
pub const MACK_MESSAGE_BYTES: usize = MACK_SECTION_BYTES * PAGES_PER_SUBFRAME;
/// MACK message: tags with their info fields and a disclosed TESLA key.
pub type MackMessage = [u8; MACK_MESSAGE_BYTES];

/// Size of a DSM block in bytes.
pub const DSM_BLOCK_BYTES: usize = 13;
/// DSM block: the HKROOT message minus the NMA and DSM headers.
pub type DsmBlock = [u8; DSM_BLOCK_BYTES];

/// Number of bytes in an I/NAV word.
pub const INAV_WORD_BYTES: usize = 16;
/// I/NAV word: the 128 bits of navigation data recovered from one page.
pub type InavWord = [u8; INAV_WORD_BYTES];

/// The number of SVNs in the Galileo constellation.
pub const NUM_SVNS: usize = 36;

/// Time of week counted in hours, as used by the DSM-KROOT message.
pub type Towh = u8;

/// Size in bytes of a Merkle tree node (SHA-256 output).
pub const MERKLE_TREE_NODE_BYTES: usize = 32;
/// Merkle tree node.
pub type MerkleTreeNode = [u8; MERKLE_TREE_NODE_BYTES];

/// A slice of bits.
///
/// A [`BitSlice`](bitvec::slice::BitSlice) from the `bitvec` crate used to
/// represent binary data whose length is not a multiple of 8 bits or which
/// is not byte aligned within its containing message. Galileo documentation
/// numbers the most significant bit of the first byte as bit 0, so the
/// [`Msb0`](bitvec::order::Msb0) ordering is used.
pub type BitSlice = bitvec::slice::BitSlice<u8, bitvec::order::Msb0>;

/// Signal band on which an I/NAV word was received.
///
/// The OSNMA field is only transmitted on E1B, but navigation words from
/// both bands contribute to the stored navigation data.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum InavBand {
    /// E1-B signal.
    E1B,
    /// E5b-I signal.
    E5B,
}
