//! Opus header packets (RFC 7845 section 5).

use crate::engine::EngineError;

pub const OPUS_HEAD_MAGIC: &[u8; 8] = b"OpusHead";
pub const OPUS_TAGS_MAGIC: &[u8; 8] = b"OpusTags";

const OPUS_HEAD_MIN_LEN: usize = 19;

/// Identification header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpusHead {
    pub version: u8,
    pub channels: u8,
    /// Samples at 48 kHz to discard from the start of the decoded output.
    pub pre_skip: u16,
    /// Sample rate of the original input, informational only.
    pub input_sample_rate: u32,
    /// Q7.8 gain in dB applied to the decoded output.
    pub output_gain: i16,
    pub mapping_family: u8,
    pub mapping: Option<ChannelMapping>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMapping {
    pub stream_count: u8,
    pub coupled_count: u8,
    pub table: Vec<u8>,
}

impl OpusHead {
    pub fn parse(packet: &[u8]) -> Result<Self, EngineError> {
        if !packet.starts_with(OPUS_HEAD_MAGIC) {
            return Err(EngineError::NotFormat(
                "first packet is not an OpusHead header".into(),
            ));
        }
        if packet.len() < OPUS_HEAD_MIN_LEN {
            return Err(EngineError::BadHeader(format!(
                "OpusHead is {} bytes, need at least {}",
                packet.len(),
                OPUS_HEAD_MIN_LEN
            )));
        }

        // only the major version nibble breaks compatibility
        let version = packet[8];
        if version >> 4 != 0 {
            return Err(EngineError::Version(version));
        }

        let channels = packet[9];
        if channels == 0 {
            return Err(EngineError::BadHeader("channel count is zero".into()));
        }

        let pre_skip = u16::from_le_bytes([packet[10], packet[11]]);
        let input_sample_rate = u32::from_le_bytes([packet[12], packet[13], packet[14], packet[15]]);
        let output_gain = i16::from_le_bytes([packet[16], packet[17]]);
        let mapping_family = packet[18];

        let mapping = if mapping_family == 0 {
            if channels > 2 {
                return Err(EngineError::BadHeader(format!(
                    "mapping family 0 allows 1 or 2 channels, got {channels}"
                )));
            }
            None
        } else {
            let table_end = 21 + channels as usize;
            if packet.len() < table_end {
                return Err(EngineError::BadHeader("channel mapping table truncated".into()));
            }
            let stream_count = packet[19];
            let coupled_count = packet[20];
            if stream_count == 0 || coupled_count > stream_count {
                return Err(EngineError::BadHeader(format!(
                    "invalid stream counts {stream_count}/{coupled_count}"
                )));
            }
            Some(ChannelMapping {
                stream_count,
                coupled_count,
                table: packet[21..table_end].to_vec(),
            })
        };

        Ok(Self {
            version,
            channels,
            pre_skip,
            input_sample_rate,
            output_gain,
            mapping_family,
            mapping,
        })
    }

    /// Linear factor for [`output_gain`](Self::output_gain).
    pub fn gain_factor(&self) -> f32 {
        10f32.powf(self.output_gain as f32 / (20.0 * 256.0))
    }
}

/// Comment header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpusTags {
    pub vendor: String,
    pub comments: Vec<String>,
}

impl OpusTags {
    pub fn parse(packet: &[u8]) -> Result<Self, EngineError> {
        if !packet.starts_with(OPUS_TAGS_MAGIC) {
            return Err(EngineError::NotFormat(
                "second packet is not an OpusTags header".into(),
            ));
        }

        let mut cursor = FieldReader {
            data: packet,
            pos: OPUS_TAGS_MAGIC.len(),
        };
        let vendor = cursor.string()?;
        let count = cursor.u32()? as usize;
        let mut comments = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            comments.push(cursor.string()?);
        }
        Ok(Self { vendor, comments })
    }

    /// Value of the first `KEY=value` comment matching `key`, case-insensitively.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.comments.iter().find_map(|c| {
            let (k, v) = c.split_once('=')?;
            k.eq_ignore_ascii_case(key).then_some(v)
        })
    }
}

struct FieldReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl FieldReader<'_> {
    fn take(&mut self, n: usize) -> Result<&[u8], EngineError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| EngineError::BadHeader("OpusTags truncated".into()))?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn u32(&mut self) -> Result<u32, EngineError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn string(&mut self) -> Result<String, EngineError> {
        let len = self.u32()? as usize;
        Ok(String::from_utf8_lossy(self.take(len)?).into_owned())
    }
}
