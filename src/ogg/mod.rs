//! Ogg Opus container demuxing and the libopus-backed engine.

pub mod engine;
pub mod header;
pub mod packet;
pub mod page;

pub use engine::{OggOpusEngine, OggOpusFactory};
pub use header::{OpusHead, OpusTags};
