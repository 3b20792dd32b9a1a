//! Input framing.
//!
//! This module contains the readers that turn a raw byte source into
//! nominal I/NAV pages: [`SbfReader`] for the Septentrio Binary Format
//! (block `GALRawINAV`) and [`AsciiReader`] for a line-oriented hex
//! format. Framing errors (bad sync, bad CRC, malformed blocks) are
//! logged and skipped; only transport errors terminate reading.
//!
//! The [`Source`] enum parses the input source strings accepted on the
//! command line.

use crate::types::{BitSlice, InavBand, PageBits, PAGE_BYTES};
use crate::{Gst, Svn};
use bitvec::prelude::*;
use core::fmt;
use std::io::{self, BufRead, BufReader, Read};

// SBF block number of GALRawINAV (the block ID field also carries a
// revision in its upper 3 bits).
const GAL_RAW_INAV_BLOCK: u16 = 4023;
// Septentrio numbers Galileo satellites 71 to 106.
const SBF_GALILEO_SVID_OFFSET: i16 = 70;
// The WNc field counts GPS weeks; the Galileo week number starts 1024
// weeks later.
const SBF_WN_OFFSET: u16 = 1024;

const SECS_IN_WEEK: u32 = 604800;

/// A raw page produced by one of the transport readers.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct RawPage {
    /// SVN of the transmitting satellite.
    pub svn: Svn,
    /// GST at the start of the page transmission.
    pub gst: Gst,
    /// Signal band of the page.
    pub band: InavBand,
    /// Receiver-side CRC flag (the page CRC is re-checked downstream).
    pub crc_passed: bool,
    /// The 240 bits of the nominal page.
    pub page: PageBits,
}

/// Reader for the Septentrio Binary Format.
///
/// Scans the byte source for `$@` block syncs, checks the block CRC, and
/// decodes `GALRawINAV` blocks into pages. All other blocks are skipped.
#[derive(Debug)]
pub struct SbfReader<R> {
    read: R,
}

impl<R: Read> SbfReader<R> {
    /// Constructs a new SBF reader over a byte source.
    pub fn new(read: R) -> SbfReader<R> {
        SbfReader { read }
    }

    /// Reads the next page.
    ///
    /// Skips over unknown blocks and malformed frames. Returns `Ok(None)`
    /// at the end of the stream.
    pub fn read_page(&mut self) -> io::Result<Option<RawPage>> {
        loop {
            if !self.sync()? {
                return Ok(None);
            }
            let mut header = [0u8; 6];
            if !self.read_exact_or_eof(&mut header)? {
                return Ok(None);
            }
            let crc = u16::from_le_bytes(header[..2].try_into().unwrap());
            let id = u16::from_le_bytes(header[2..4].try_into().unwrap());
            let length = usize::from(u16::from_le_bytes(header[4..6].try_into().unwrap()));
            if length < 8 || length % 4 != 0 {
                log::warn!("SBF block with invalid length {}; resyncing", length);
                continue;
            }
            let mut payload = vec![0; length - 8];
            if !self.read_exact_or_eof(&mut payload)? {
                return Ok(None);
            }
            let mut crc_data = Vec::with_capacity(4 + payload.len());
            crc_data.extend_from_slice(&header[2..6]);
            crc_data.extend_from_slice(&payload);
            if crc16_ccitt(&crc_data) != crc {
                log::warn!("SBF block with wrong CRC; skipping");
                continue;
            }
            if id & 0x1fff != GAL_RAW_INAV_BLOCK {
                log::trace!("skipping SBF block {}", id & 0x1fff);
                continue;
            }
            if let Some(page) = Self::parse_gal_raw_inav(&payload) {
                return Ok(Some(page));
            }
        }
    }

    fn sync(&mut self) -> io::Result<bool> {
        let mut byte = [0u8; 1];
        let mut have_dollar = false;
        loop {
            if self.read.read(&mut byte)? == 0 {
                return Ok(false);
            }
            if have_dollar && byte[0] == b'@' {
                return Ok(true);
            }
            have_dollar = byte[0] == b'$';
        }
    }

    fn read_exact_or_eof(&mut self, buf: &mut [u8]) -> io::Result<bool> {
        match self.read.read_exact(buf) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn parse_gal_raw_inav(payload: &[u8]) -> Option<RawPage> {
        // TOW (ms), WNc, SVID, CRCPassed, ViterbiCnt, Source, FreqNr,
        // RxChannel, NAVBits as 8 little-endian 32-bit words
        const FIXED_LEN: usize = 12;
        const NAVBITS_LEN: usize = 32;
        if payload.len() < FIXED_LEN + NAVBITS_LEN {
            log::warn!("GALRawINAV block too short ({} bytes)", payload.len());
            return None;
        }
        let tow_ms = u32::from_le_bytes(payload[0..4].try_into().unwrap());
        let wnc = u16::from_le_bytes(payload[4..6].try_into().unwrap());
        if tow_ms == u32::MAX || wnc == u16::MAX {
            // do-not-use values
            return None;
        }
        let svid = payload[6];
        let Ok(svn) = Svn::try_from(i16::from(svid) - SBF_GALILEO_SVID_OFFSET) else {
            log::warn!("GALRawINAV block with non-Galileo SVID {}", svid);
            return None;
        };
        let crc_passed = payload[7] & 1 != 0;
        let band = match payload[9] & 0x1f {
            17 => InavBand::E1B,
            21 => InavBand::E5B,
            signal => {
                log::warn!("GALRawINAV block with unexpected signal {}", signal);
                return None;
            }
        };
        let Some(wn) = wnc.checked_sub(SBF_WN_OFFSET) else {
            log::warn!("GALRawINAV block with WNc {} before the Galileo epoch", wnc);
            return None;
        };
        // The block is timestamped at the end of the 2-second page
        let tow = (tow_ms / 1000).saturating_sub(2);
        let tow = tow - tow % 2;
        if tow >= SECS_IN_WEEK {
            log::warn!("GALRawINAV block with invalid TOW {}", tow);
            return None;
        }
        // NAVBits holds the 228 page bits without the tail bits: 114 of
        // the even half followed by 114 of the odd half
        let mut stream = [0u8; NAVBITS_LEN];
        for j in 0..8 {
            let word = u32::from_le_bytes(
                payload[FIXED_LEN + 4 * j..FIXED_LEN + 4 * (j + 1)]
                    .try_into()
                    .unwrap(),
            );
            stream[4 * j..4 * (j + 1)].copy_from_slice(&word.to_be_bytes());
        }
        let mut page = [0u8; PAGE_BYTES];
        {
            let src = BitSlice::from_slice(&stream);
            let dst = BitSlice::from_slice_mut(&mut page);
            dst[..114].copy_from_bitslice(&src[..114]);
            dst[120..234].copy_from_bitslice(&src[114..228]);
        }
        Some(RawPage {
            svn,
            gst: Gst::new(wn, tow),
            band,
            crc_passed,
            page,
        })
    }
}

fn crc16_ccitt(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in data {
        crc ^= u16::from(byte) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ 0x1021;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

/// Reader for the line-oriented hex page format.
///
/// Each line holds `SVID TOW HEXPAGE` or `SVID TOW WN HEXPAGE`, where
/// `HEXPAGE` is the 240-bit nominal page as 60 hex characters. The week
/// number defaults to 0 when absent. Unparsable lines are logged and
/// skipped.
#[derive(Debug)]
pub struct AsciiReader<R> {
    read: BufReader<R>,
}

impl<R: Read> AsciiReader<R> {
    /// Constructs a new reader over a byte source.
    pub fn new(read: R) -> AsciiReader<R> {
        AsciiReader {
            read: BufReader::new(read),
        }
    }

    /// Reads the next page. Returns `Ok(None)` at the end of the stream.
    pub fn read_page(&mut self) -> io::Result<Option<RawPage>> {
        let mut line = String::new();
        loop {
            line.clear();
            if self.read.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            match Self::parse_line(line.trim()) {
                Some(page) => return Ok(Some(page)),
                None => {
                    if !line.trim().is_empty() {
                        log::warn!("skipping unparsable line: {:?}", line.trim());
                    }
                }
            }
        }
    }

    fn parse_line(line: &str) -> Option<RawPage> {
        if line.is_empty() || line.starts_with('#') {
            return None;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        let (svid, tow, wn, hex_page) = match fields.len() {
            3 => (fields[0], fields[1], "0", fields[2]),
            4 => (fields[0], fields[1], fields[2], fields[3]),
            _ => return None,
        };
        let svn = Svn::try_from(svid.parse::<u8>().ok()?).ok()?;
        let tow = tow.parse::<u32>().ok()?;
        let wn = wn.parse::<u16>().ok()?;
        if tow >= SECS_IN_WEEK {
            return None;
        }
        let bytes = hex::decode(hex_page).ok()?;
        let page: PageBits = bytes.try_into().ok()?;
        Some(RawPage {
            svn,
            gst: Gst::new(wn, tow),
            band: InavBand::E1B,
            crc_passed: true,
            page,
        })
    }
}

/// Input source description.
///
/// Parsed from the forms `filepath`, `file:filepath`,
/// `serial:device:baudrate` and `net:host:port`; an absent source means
/// standard input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Read from standard input.
    Stdin,
    /// Read from a file.
    File(String),
    /// Read from a serial device.
    Serial {
        /// Device path.
        device: String,
        /// Baud rate.
        baud: u32,
    },
    /// Read from a TCP connection.
    Net {
        /// Host name or address.
        host: String,
        /// TCP port.
        port: u16,
    },
}

impl Source {
    /// Parses an input source string.
    pub fn parse(input: Option<&str>) -> Result<Source, SourceParseError> {
        let Some(input) = input else {
            return Ok(Source::Stdin);
        };
        if let Some(rest) = input.strip_prefix("serial:") {
            let (device, baud) = rest.rsplit_once(':').ok_or(SourceParseError::MissingField)?;
            let baud = baud.parse().map_err(|_| SourceParseError::BadNumber)?;
            Ok(Source::Serial {
                device: device.to_string(),
                baud,
            })
        } else if let Some(rest) = input.strip_prefix("net:") {
            let (host, port) = rest.rsplit_once(':').ok_or(SourceParseError::MissingField)?;
            let port = port.parse().map_err(|_| SourceParseError::BadNumber)?;
            Ok(Source::Net {
                host: host.to_string(),
                port,
            })
        } else if let Some(rest) = input.strip_prefix("file:") {
            Ok(Source::File(rest.to_string()))
        } else {
            Ok(Source::File(input.to_string()))
        }
    }
}

/// Errors produced while parsing an input source string.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum SourceParseError {
    /// The source string is missing a field.
    MissingField,
    /// A numeric field could not be parsed.
    BadNumber,
}

impl fmt::Display for SourceParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceParseError::MissingField => "missing field in input source".fmt(f),
            SourceParseError::BadNumber => "invalid number in input source".fmt(f),
        }
    }
}

impl std::error::Error for SourceParseError {}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn crc16_check_value() {
        // CRC-16/CCITT (XModem) of the ASCII string "123456789"
        assert_eq!(crc16_ccitt(b"123456789"), 0x31c3);
    }

    fn test_page() -> PageBits {
        let mut page = [0u8; PAGE_BYTES];
        let bits = BitSlice::from_slice_mut(&mut page);
        for j in (0..234).step_by(3) {
            bits.set(j, true);
        }
        // zero the tail bits like a real page
        bits[114..120].fill(false);
        bits[234..240].fill(false);
        page
    }

    fn sbf_frame(svid: u8, tow_ms: u32, wnc: u16, page: &PageBits) -> Vec<u8> {
        let mut stream = [0u8; 32];
        {
            let src = BitSlice::from_slice(page);
            let dst = BitSlice::from_slice_mut(&mut stream);
            dst[..114].copy_from_bitslice(&src[..114]);
            dst[114..228].copy_from_bitslice(&src[120..234]);
        }
        let mut payload = Vec::new();
        payload.extend_from_slice(&tow_ms.to_le_bytes());
        payload.extend_from_slice(&wnc.to_le_bytes());
        payload.push(svid);
        payload.push(1); // CRCPassed
        payload.push(0); // ViterbiCnt
        payload.push(17); // Source: E1B
        payload.push(0); // FreqNr
        payload.push(0); // RxChannel
        for j in 0..8 {
            let word = u32::from_be_bytes(stream[4 * j..4 * (j + 1)].try_into().unwrap());
            payload.extend_from_slice(&word.to_le_bytes());
        }
        let length = u16::try_from(8 + payload.len()).unwrap();
        let mut crc_data = Vec::new();
        crc_data.extend_from_slice(&GAL_RAW_INAV_BLOCK.to_le_bytes());
        crc_data.extend_from_slice(&length.to_le_bytes());
        crc_data.extend_from_slice(&payload);
        let crc = crc16_ccitt(&crc_data);
        let mut frame = Vec::new();
        frame.extend_from_slice(b"$@");
        frame.extend_from_slice(&crc.to_le_bytes());
        frame.extend_from_slice(&crc_data);
        frame
    }

    #[test]
    fn sbf_round_trip() {
        let page = test_page();
        // E11 at WN 1176, page starting at TOW 121052
        let frame = sbf_frame(81, 121054 * 1000, 1176 + 1024, &page);
        let mut reader = SbfReader::new(&frame[..]);
        let raw = reader.read_page().unwrap().unwrap();
        assert_eq!(raw.svn, Svn::try_from(11).unwrap());
        assert_eq!(raw.gst, Gst::new(1176, 121052));
        assert_eq!(raw.band, InavBand::E1B);
        assert!(raw.crc_passed);
        assert_eq!(raw.page, page);
        assert!(reader.read_page().unwrap().is_none());
    }

    #[test]
    fn sbf_bad_crc_skipped() {
        let page = test_page();
        let mut bad = sbf_frame(81, 121054 * 1000, 1176 + 1024, &page);
        bad[20] ^= 0xff;
        let good = sbf_frame(82, 121056 * 1000, 1176 + 1024, &page);
        let mut stream = bad;
        stream.extend_from_slice(&good);
        let mut reader = SbfReader::new(&stream[..]);
        let raw = reader.read_page().unwrap().unwrap();
        assert_eq!(raw.svn, Svn::try_from(12).unwrap());
    }

    #[test]
    fn sbf_garbage_before_sync() {
        let page = test_page();
        let frame = sbf_frame(81, 121054 * 1000, 1176 + 1024, &page);
        let mut stream = b"noise $ more @$".to_vec();
        stream.extend_from_slice(&frame);
        let mut reader = SbfReader::new(&stream[..]);
        assert!(reader.read_page().unwrap().is_some());
    }

    #[test]
    fn ascii_lines() {
        let page = test_page();
        let hex_page = hex::encode(page);
        let text = format!(
            "# comment\n11 121052 {}\nnot a page\n12 121054 1176 {}\n",
            hex_page, hex_page
        );
        let mut reader = AsciiReader::new(text.as_bytes());
        let first = reader.read_page().unwrap().unwrap();
        assert_eq!(first.svn, Svn::try_from(11).unwrap());
        assert_eq!(first.gst, Gst::new(0, 121052));
        assert_eq!(first.page, page);
        let second = reader.read_page().unwrap().unwrap();
        assert_eq!(second.svn, Svn::try_from(12).unwrap());
        assert_eq!(second.gst, Gst::new(1176, 121054));
        assert!(reader.read_page().unwrap().is_none());
    }

    #[test]
    fn source_strings() {
        assert_eq!(Source::parse(None), Ok(Source::Stdin));
        assert_eq!(
            Source::parse(Some("capture.sbf")),
            Ok(Source::File("capture.sbf".to_string()))
        );
        assert_eq!(
            Source::parse(Some("file:capture.sbf")),
            Ok(Source::File("capture.sbf".to_string()))
        );
        assert_eq!(
            Source::parse(Some("serial:/dev/ttyUSB0:115200")),
            Ok(Source::Serial {
                device: "/dev/ttyUSB0".to_string(),
                baud: 115200,
            })
        );
        assert_eq!(
            Source::parse(Some("net:192.168.1.10:28784")),
            Ok(Source::Net {
                host: "192.168.1.10".to_string(),
                port: 28784,
            })
        );
        assert_eq!(
            Source::parse(Some("serial:/dev/ttyUSB0")),
            Err(SourceParseError::MissingField)
        );
        assert_eq!(
            Source::parse(Some("net:host:notaport")),
            Err(SourceParseError::BadNumber)
        );
    }
}
