//! ogg_opus_stream - incremental Ogg Opus decoding
//!
//! Push compressed bytes of any size into a [`DecoderSession`] as they
//! arrive and pull back per-channel f32 samples as soon as enough data is
//! buffered. The session owns a bounded [`StreamBuffer`]; the container and
//! codec engine behind it pull exactly the bytes they need through the
//! [`Reader`] trait.
//!
//! Seeking, chained streams and resampling are not supported.

pub mod buffer;
pub mod config;
pub mod deinterleave;
pub mod engine;
pub mod error;
pub mod ogg;
pub mod session;
pub mod stream_decoder;

pub use buffer::StreamBuffer;
pub use config::DecoderConfig;
pub use engine::{Discovery, Engine, EngineError, EngineFactory, Reader};
pub use error::{Error, Result};
pub use ogg::{OggOpusEngine, OggOpusFactory};
pub use session::{DecoderSession, EnqueueStatus};
pub use stream_decoder::{DecodedAudio, OggOpusStreamDecoder, StreamDecoder};
