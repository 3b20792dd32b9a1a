//! DSM message collection.
//!
//! This module contains the [`CollectDsm`] struct, which reassembles DSM
//! messages from the 13-byte blocks carried in HKROOT messages. One
//! reassembly buffer is kept per DSM ID, since satellites may broadcast
//! blocks of different DSMs in parallel. A buffer completes once block 0
//! (which carries the block count) and all blocks within the count have
//! been observed.

use crate::bitfields::{
    dsm_type_for_id, number_of_kroot_blocks, number_of_pkr_blocks, DsmHeader, DsmType,
};
use crate::types::{DsmBlock, DSM_BLOCK_BYTES};
use crate::Gst;

const NUM_DSM_IDS: usize = 16;
const MAX_DSM_BLOCKS: usize = 16;
const MAX_DSM_BYTES: usize = MAX_DSM_BLOCKS * DSM_BLOCK_BYTES;

// Buffers with no progress for this many sub-frames are discarded.
const STALE_SUBFRAMES: i64 = 240;

/// Reassembled DSM message.
///
/// The data is borrowed from the internal storage of the [`CollectDsm`]
/// that produced it.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct Dsm<'a> {
    id: u8,
    data: &'a [u8],
}

impl Dsm<'_> {
    /// Returns the DSM ID.
    pub fn id(&self) -> u8 {
        self.id
    }

    /// Returns the DSM type corresponding to the DSM ID.
    pub fn dsm_type(&self) -> DsmType {
        dsm_type_for_id(self.id)
    }

    /// Returns the message data.
    pub fn data(&self) -> &[u8] {
        self.data
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
struct DsmBuffer {
    data: [u8; MAX_DSM_BYTES],
    block_valid: [bool; MAX_DSM_BLOCKS],
    done: bool,
    last_progress: Gst,
}

impl DsmBuffer {
    fn new(gst: Gst) -> DsmBuffer {
        DsmBuffer {
            data: [0; MAX_DSM_BYTES],
            block_valid: [false; MAX_DSM_BLOCKS],
            done: false,
            last_progress: gst,
        }
    }

    fn num_blocks(&self, dsm_type: DsmType) -> Option<usize> {
        if !self.block_valid[0] {
            return None;
        }
        let nb = self.data[0] >> 4;
        match dsm_type {
            DsmType::Kroot => number_of_kroot_blocks(nb),
            DsmType::Pkr => number_of_pkr_blocks(nb),
        }
    }
}

/// DSM message collector.
///
/// Collects DSM blocks into per-ID buffers and produces a complete DSM
/// message once all the blocks of one message have been gathered. After
/// completion, re-broadcast blocks of the same message are ignored until
/// the buffer goes stale, so a message is only produced once.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct CollectDsm {
    buffers: [Option<DsmBuffer>; NUM_DSM_IDS],
}

impl CollectDsm {
    /// Constructs a new, empty DSM collector.
    pub fn new() -> CollectDsm {
        CollectDsm {
            buffers: [None; NUM_DSM_IDS],
        }
    }

    /// Feed a new block into the DSM collector.
    ///
    /// The `header` parameter contains the DSM header of the block, the
    /// `block` parameter the 13-byte DSM block, and `gst` the sub-frame in
    /// which the block was received. If this block completes a DSM
    /// message, the reassembled message is returned.
    pub fn feed(&mut self, header: DsmHeader, block: &DsmBlock, gst: Gst) -> Option<Dsm<'_>> {
        log::trace!("feeding header = {:?}, block = {:02x?}", header, block);
        self.discard_stale(gst);
        let id = header.dsm_id();
        let dsm_type = header.dsm_type();
        let buffer = self.buffers[usize::from(id)].get_or_insert_with(|| {
            log::info!("starting collection of DSM with id = {}", id);
            DsmBuffer::new(gst)
        });
        if buffer.done {
            log::trace!("DSM with id = {} already complete; block ignored", id);
            return None;
        }
        let block_id = usize::from(header.dsm_block_id());
        let section = &mut buffer.data[block_id * DSM_BLOCK_BYTES..(block_id + 1) * DSM_BLOCK_BYTES];
        if buffer.block_valid[block_id] {
            if section != block {
                // The content contradicts what was stored, which can happen
                // after a re-key that reuses the DSM ID. Drop the buffer and
                // start over with this block.
                log::warn!(
                    "block {} of DSM {} differs from stored copy; dropping buffer",
                    block_id,
                    id
                );
                *buffer = DsmBuffer::new(gst);
                buffer.data[block_id * DSM_BLOCK_BYTES..(block_id + 1) * DSM_BLOCK_BYTES]
                    .copy_from_slice(block);
                buffer.block_valid[block_id] = true;
                return None;
            }
            log::trace!("block {} of DSM {} already stored", block_id, id);
            return None;
        }
        section.copy_from_slice(block);
        buffer.block_valid[block_id] = true;
        buffer.last_progress = gst;
        log::trace!("stored block {} of DSM {}", block_id, id);
        // A change of the NB field after a re-key shows up as a content
        // mismatch of block 0, which drops the buffer above.
        let Some(n) = buffer.num_blocks(dsm_type) else {
            if buffer.block_valid[0] {
                // A reserved block count can never complete. The buffer will
                // be dropped by the stale timer.
                log::error!("reserved NB value in DSM {}", id);
            }
            return None;
        };
        let missing = buffer.block_valid[..n].iter().filter(|&&x| !x).count();
        log::trace!("DSM {} has {} blocks, {} missing", id, n, missing);
        if missing > 0 {
            return None;
        }
        buffer.done = true;
        let size = n * DSM_BLOCK_BYTES;
        log::info!("completed DSM with id = {}, size = {} bytes", id, size);
        let data = &self.buffers[usize::from(id)].as_ref().unwrap().data[..size];
        log::trace!("DSM contents {:02x?}", data);
        Some(Dsm { id, data })
    }

    fn discard_stale(&mut self, gst: Gst) {
        for (id, buffer) in self.buffers.iter_mut().enumerate() {
            if let Some(b) = buffer {
                if gst.subframes_difference(b.last_progress) > STALE_SUBFRAMES {
                    log::info!("discarding stale DSM buffer with id = {}", id);
                    *buffer = None;
                }
            }
        }
    }
}

impl Default for CollectDsm {
    fn default() -> CollectDsm {
        CollectDsm::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use hex_literal::hex;

    // HKROOT messages broadcast on 2022-03-07 ~09:00 UTC
    const HKROOTS: [[u8; 15]; 14] = [
        hex!("52 25 01 9d 5b 6e 1d d1 87 b9 45 3c df 06 ca"),
        hex!("52 23 a4 c6 6d 7e 3d 29 18 53 ba 5a 13 c9 c3"),
        hex!("52 27 cb 12 29 89 77 35 c0 21 b0 41 73 93 b5"),
        hex!("52 26 7f 34 ea 14 97 52 5a af 18 f1 f9 f1 fc"),
        hex!("52 24 48 4a 26 77 70 11 2a 13 38 3e a5 2d 3a"),
        hex!("52 20 22 50 49 21 04 98 21 25 d3 96 4d a3 a2"),
        hex!("52 27 cb 12 29 89 77 35 c0 21 b0 41 73 93 b5"),
        hex!("52 25 01 9d 5b 6e 1d d1 87 b9 45 3c df 06 ca"),
        hex!("52 20 22 50 49 21 04 98 21 25 d3 96 4d a3 a2"),
        hex!("52 20 22 50 49 21 04 98 21 25 d3 96 4d a3 a2"),
        hex!("52 26 7f 34 ea 14 97 52 5a af 18 f1 f9 f1 fc"),
        hex!("52 21 84 1e 1d e4 d4 58 c0 e9 84 24 76 e0 04"),
        hex!("52 27 cb 12 29 89 77 35 c0 21 b0 41 73 93 b5"),
        hex!("52 22 66 6c f3 79 58 de 28 51 97 a2 63 53 f1"),
    ];

    fn expected_dsm() -> [u8; 104] {
        hex!(
            "22 50 49 21 04 98 21 25 d3 96 4d a3 a2 84 1e 1d
             e4 d4 58 c0 e9 84 24 76 e0 04 66 6c f3 79 58 de
             28 51 97 a2 63 53 f1 a4 c6 6d 7e 3d 29 18 53 ba
             5a 13 c9 c3 48 4a 26 77 70 11 2a 13 38 3e a5 2d
             3a 01 9d 5b 6e 1d d1 87 b9 45 3c df 06 ca 7f 34
             ea 14 97 52 5a af 18 f1 f9 f1 fc cb 12 29 89 77
             35 c0 21 b0 41 73 93 b5"
        )
    }

    fn feed(collect: &mut CollectDsm, hkroot: &[u8; 15], gst: Gst) -> Option<(u8, Vec<u8>)> {
        collect
            .feed(
                DsmHeader(hkroot[1..2].try_into().unwrap()),
                hkroot[2..].try_into().unwrap(),
                gst,
            )
            .map(|dsm| (dsm.id(), dsm.data().to_vec()))
    }

    #[test]
    fn collect_dsm() {
        let mut collect = CollectDsm::new();
        let gst0 = Gst::new(1176, 120900);
        for (j, hkroot) in HKROOTS.iter().enumerate() {
            let gst = gst0.add_subframes(j.try_into().unwrap());
            let ret = feed(&mut collect, hkroot, gst);
            if j != HKROOTS.len() - 1 {
                assert!(ret.is_none());
            } else {
                let (id, data) = ret.unwrap();
                assert_eq!(id, 2);
                assert_eq!(&data[..], &expected_dsm()[..]);
            }
        }
    }

    #[test]
    fn complete_dsm_is_idempotent() {
        let mut collect = CollectDsm::new();
        let gst0 = Gst::new(1176, 120900);
        let mut completions = 0;
        // feed the full set twice
        for (j, hkroot) in HKROOTS.iter().cycle().take(2 * HKROOTS.len()).enumerate() {
            let gst = gst0.add_subframes(j.try_into().unwrap());
            if feed(&mut collect, hkroot, gst).is_some() {
                completions += 1;
            }
        }
        assert_eq!(completions, 1);
    }

    #[test]
    fn stale_buffer_discarded() {
        let mut collect = CollectDsm::new();
        let gst0 = Gst::new(1176, 120900);
        // feed all blocks but the last
        for (j, hkroot) in HKROOTS[..HKROOTS.len() - 1].iter().enumerate() {
            let gst = gst0.add_subframes(j.try_into().unwrap());
            assert!(feed(&mut collect, hkroot, gst).is_none());
        }
        // much later, the remaining block no longer completes the message
        let late = gst0.add_subframes(i32::try_from(STALE_SUBFRAMES).unwrap() + 20);
        assert!(feed(&mut collect, &HKROOTS[HKROOTS.len() - 1], late).is_none());
    }

    #[test]
    fn content_mismatch_drops_buffer() {
        let mut collect = CollectDsm::new();
        let gst = Gst::new(1176, 120900);
        assert!(feed(&mut collect, &HKROOTS[0], gst).is_none());
        let mut altered = HKROOTS[0];
        altered[5] ^= 0xff;
        // same block id with different content resets the collection
        assert!(feed(&mut collect, &altered, gst.add_subframes(1)).is_none());
        // the altered copy is now the stored one
        assert!(feed(&mut collect, &altered, gst.add_subframes(2)).is_none());
    }
}
