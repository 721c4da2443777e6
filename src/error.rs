//! Error types for the streaming decoder.

use thiserror::Error;

use crate::engine::EngineError;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the buffer, session and stream decoder.
#[derive(Error, Debug)]
pub enum Error {
    /// Appending would exceed the buffer capacity. Nothing was written.
    #[error("cannot enqueue {requested} bytes: {unread}/{capacity} bytes already buffered")]
    Overflow {
        requested: usize,
        unread: usize,
        capacity: usize,
    },

    /// The engine failed while decoding a discovered stream.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A chunk was refused even after the decoder had been drained.
    #[error("could not enqueue bytes for decoding, the input may not be a valid Ogg Opus stream")]
    Enqueue(#[source] Box<Error>),
}

impl Error {
    /// Whether the caller can recover by decoding and retrying.
    pub fn is_backpressure(&self) -> bool {
        matches!(self, Error::Overflow { .. })
    }
}
