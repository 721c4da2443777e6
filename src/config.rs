//! Decoder configuration, read from `config.toml` at build time.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ogg::engine::MAX_PACKET_FRAMES;
use crate::ogg::page::MAX_PAGE_SIZE;

/// Fallbacks used when the build-time values cannot be parsed.
const DEFAULT_BUFFER_CAPACITY: usize = 64 * 1024;
const DEFAULT_MAX_FRAMES: usize = MAX_PACKET_FRAMES;
const DEFAULT_MAX_CHANNELS: usize = 8;
const DEFAULT_INPUT_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct DecoderConfig {
    /// Capacity of the streaming buffer in bytes.
    ///
    /// Must be at least one maximum-size Ogg page. A smaller buffer means
    /// header discovery may never succeed and enqueue eventually always
    /// overflows.
    pub buffer_capacity: usize,
    /// Upper bound on sample frames produced by a single decode call.
    ///
    /// Must cover the longest Opus packet (120 ms at 48 kHz).
    pub max_frames_per_decode: usize,
    /// Largest channel count the session accepts from an engine.
    pub max_channels: usize,
    /// Chunk size used by the one-shot stream decoder.
    #[serde(default = "default_input_chunk_size")]
    pub input_chunk_size: usize,
}

fn default_input_chunk_size() -> usize {
    DEFAULT_INPUT_CHUNK_SIZE
}

impl DecoderConfig {
    /// 从编译时设置的环境变量创建配置
    /// 所有参数都在编译时从 config.toml 中读取
    pub fn new() -> Result<Self> {
        let config = Self {
            buffer_capacity: env!("BUFFER_CAPACITY")
                .parse()
                .map_err(|_| Error::Config("Failed to parse BUFFER_CAPACITY".into()))?,
            max_frames_per_decode: env!("DECODE_MAX_FRAMES")
                .parse()
                .map_err(|_| Error::Config("Failed to parse DECODE_MAX_FRAMES".into()))?,
            max_channels: env!("DECODE_MAX_CHANNELS")
                .parse()
                .map_err(|_| Error::Config("Failed to parse DECODE_MAX_CHANNELS".into()))?,
            input_chunk_size: env!("INPUT_CHUNK_SIZE")
                .parse()
                .map_err(|_| Error::Config("Failed to parse INPUT_CHUNK_SIZE".into()))?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse a runtime override, e.g. a `[decoder]` table an application
    /// keeps in its own settings file.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.buffer_capacity == 0 {
            return Err(Error::Config("buffer_capacity must be non-zero".into()));
        }
        if self.max_frames_per_decode < MAX_PACKET_FRAMES {
            return Err(Error::Config(format!(
                "max_frames_per_decode must be at least {}",
                MAX_PACKET_FRAMES
            )));
        }
        if self.max_channels == 0 {
            return Err(Error::Config("max_channels must be non-zero".into()));
        }
        if self.input_chunk_size == 0 || self.input_chunk_size > self.buffer_capacity {
            return Err(Error::Config(format!(
                "input_chunk_size must be in 1..={}",
                self.buffer_capacity
            )));
        }
        if self.buffer_capacity < MAX_PAGE_SIZE {
            log::warn!(
                "buffer_capacity {} is below the maximum Ogg page size {}; \
                 streams with large header pages will never be discovered",
                self.buffer_capacity,
                MAX_PAGE_SIZE
            );
        }
        Ok(())
    }

    /// Length of the interleaved scratch region the session allocates.
    pub fn scratch_len(&self) -> usize {
        self.max_frames_per_decode * self.max_channels
    }
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self::new().unwrap_or(Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            max_frames_per_decode: DEFAULT_MAX_FRAMES,
            max_channels: DEFAULT_MAX_CHANNELS,
            input_chunk_size: DEFAULT_INPUT_CHUNK_SIZE,
        })
    }
}
