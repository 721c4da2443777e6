//! Ogg page framing.
//!
//! Layout of a page header (all integers little-endian):
//!
//! | offset | size | field |
//! |---|---|---|
//! | 0 | 4 | capture pattern `OggS` |
//! | 4 | 1 | stream structure version (0) |
//! | 5 | 1 | header type flags |
//! | 6 | 8 | granule position |
//! | 14 | 4 | bitstream serial number |
//! | 18 | 4 | page sequence number |
//! | 22 | 4 | CRC-32 checksum |
//! | 26 | 1 | number of segments |
//! | 27 | n | lacing values |

use crate::engine::EngineError;

pub const CAPTURE_PATTERN: &[u8; 4] = b"OggS";

/// Fixed part of the page header.
pub const HEADER_SIZE: usize = 27;

/// Largest possible page: full header, 255 lacing values, 255 full segments.
pub const MAX_PAGE_SIZE: usize = HEADER_SIZE + 255 + 255 * 255;

const CHECKSUM_OFFSET: usize = 22;

/// Header type flags.
pub mod flags {
    /// First packet on the page continues one from the previous page.
    pub const CONTINUED: u8 = 0x01;
    /// Beginning of a logical stream.
    pub const BOS: u8 = 0x02;
    /// End of a logical stream.
    pub const EOS: u8 = 0x04;
}

/// Ogg CRC-32: polynomial 0x04C11DB7, zero initial value, no reflection.
const CRC_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u32) << 24;
        let mut j = 0;
        while j < 8 {
            if crc & 0x8000_0000 != 0 {
                crc = (crc << 1) ^ 0x04C1_1DB7;
            } else {
                crc <<= 1;
            }
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

/// Checksum of a complete serialized page; the stored checksum field is
/// treated as zero.
pub fn checksum(page: &[u8]) -> u32 {
    let mut crc = 0u32;
    for (i, &byte) in page.iter().enumerate() {
        let byte = if (CHECKSUM_OFFSET..CHECKSUM_OFFSET + 4).contains(&i) {
            0
        } else {
            byte
        };
        crc = (crc << 8) ^ CRC_TABLE[(((crc >> 24) as u8) ^ byte) as usize];
    }
    crc
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageHeader {
    pub header_type: u8,
    /// `-1` when no packet finishes on this page.
    pub granule_position: i64,
    pub serial: u32,
    pub sequence: u32,
    pub lacing: Vec<u8>,
}

impl PageHeader {
    pub fn is_continued(&self) -> bool {
        self.header_type & flags::CONTINUED != 0
    }

    pub fn is_bos(&self) -> bool {
        self.header_type & flags::BOS != 0
    }

    pub fn is_eos(&self) -> bool {
        self.header_type & flags::EOS != 0
    }

    pub fn header_len(&self) -> usize {
        HEADER_SIZE + self.lacing.len()
    }

    pub fn body_len(&self) -> usize {
        self.lacing.iter().map(|&l| l as usize).sum()
    }

    /// Serialize this header followed by `body`, filling in the checksum.
    ///
    /// `body.len()` must equal [`body_len`](Self::body_len).
    pub fn write(&self, body: &[u8]) -> Vec<u8> {
        debug_assert_eq!(body.len(), self.body_len());
        let mut out = Vec::with_capacity(self.header_len() + body.len());
        out.extend_from_slice(CAPTURE_PATTERN);
        out.push(0);
        out.push(self.header_type);
        out.extend_from_slice(&self.granule_position.to_le_bytes());
        out.extend_from_slice(&self.serial.to_le_bytes());
        out.extend_from_slice(&self.sequence.to_le_bytes());
        out.extend_from_slice(&[0; 4]);
        out.push(self.lacing.len() as u8);
        out.extend_from_slice(&self.lacing);
        out.extend_from_slice(body);

        let crc = checksum(&out);
        out[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 4].copy_from_slice(&crc.to_le_bytes());
        out
    }
}

/// A page borrowed from an input buffer.
#[derive(Debug)]
pub struct Page<'a> {
    pub header: PageHeader,
    pub body: &'a [u8],
}

/// Parse the page that starts at `data[0]`.
///
/// Returns `Ok(None)` when `data` is a valid but incomplete page prefix, and
/// `Ok(Some((page, len)))` with the total page length otherwise.
pub fn parse_page(data: &[u8]) -> Result<Option<(Page<'_>, usize)>, EngineError> {
    if data.len() < CAPTURE_PATTERN.len() {
        return if CAPTURE_PATTERN.starts_with(data) {
            Ok(None)
        } else {
            Err(EngineError::NotFormat("missing Ogg capture pattern".into()))
        };
    }
    if !data.starts_with(CAPTURE_PATTERN) {
        return Err(EngineError::NotFormat("missing Ogg capture pattern".into()));
    }
    if data.len() < HEADER_SIZE {
        return Ok(None);
    }
    if data[4] != 0 {
        return Err(EngineError::NotFormat(format!(
            "unsupported Ogg stream structure version {}",
            data[4]
        )));
    }

    let segments = data[26] as usize;
    let header_len = HEADER_SIZE + segments;
    if data.len() < header_len {
        return Ok(None);
    }
    let lacing = data[HEADER_SIZE..header_len].to_vec();
    let body_len: usize = lacing.iter().map(|&l| l as usize).sum();
    let total = header_len + body_len;
    if data.len() < total {
        return Ok(None);
    }

    let stored = u32::from_le_bytes([data[22], data[23], data[24], data[25]]);
    let computed = checksum(&data[..total]);
    if stored != computed {
        return Err(EngineError::Checksum { stored, computed });
    }

    let header = PageHeader {
        header_type: data[5],
        granule_position: i64::from_le_bytes([
            data[6], data[7], data[8], data[9], data[10], data[11], data[12], data[13],
        ]),
        serial: u32::from_le_bytes([data[14], data[15], data[16], data[17]]),
        sequence: u32::from_le_bytes([data[18], data[19], data[20], data[21]]),
        lacing,
    };

    Ok(Some((
        Page {
            header,
            body: &data[header_len..total],
        },
        total,
    )))
}

/// Result of scanning a byte stream for the next page.
#[derive(Debug)]
pub enum Sync<'a> {
    /// A complete, verified page starts at offset 0.
    Page { page: Page<'a>, len: usize },
    /// Discard this many leading bytes; they cannot start a valid page.
    Skip(usize),
    /// More bytes are needed.
    NeedMore,
}

/// Locate the next valid page, resynchronising past garbage and corrupt pages.
pub fn sync_page(data: &[u8]) -> Sync<'_> {
    if !data.starts_with(CAPTURE_PATTERN) {
        if data.len() < CAPTURE_PATTERN.len() && CAPTURE_PATTERN.starts_with(data) {
            return Sync::NeedMore;
        }
        return match find_capture(&data[1.min(data.len())..]) {
            Some(pos) => Sync::Skip(pos + 1),
            // keep a possible partial capture pattern at the tail
            None => match data.len().saturating_sub(CAPTURE_PATTERN.len() - 1) {
                0 => Sync::NeedMore,
                n => Sync::Skip(n),
            },
        };
    }

    match parse_page(data) {
        Ok(Some((page, len))) => Sync::Page { page, len },
        Ok(None) => Sync::NeedMore,
        Err(e) => {
            log::debug!("dropping invalid page candidate: {}", e);
            Sync::Skip(1)
        }
    }
}

fn find_capture(data: &[u8]) -> Option<usize> {
    data.windows(CAPTURE_PATTERN.len())
        .position(|w| w == CAPTURE_PATTERN)
}

/// Lacing values for a packet of `len` bytes that ends on this page.
pub fn lacing_for(len: usize) -> Vec<u8> {
    let mut lacing = vec![255u8; len / 255];
    lacing.push((len % 255) as u8);
    lacing
}
