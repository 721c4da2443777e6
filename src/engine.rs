//! The seam between the session and a container/codec engine.
//!
//! An engine is built by an [`EngineFactory`] once enough bytes have been
//! buffered to recognise the start of a stream. After that it pulls the
//! compressed bytes it needs through a [`Reader`] on every decode call.
//! Dropping an engine releases everything it owns.

use thiserror::Error;

/// Consumer-driven byte source handed to engines.
pub trait Reader {
    /// Copy up to `dst.len()` bytes into `dst` and return how many were written.
    ///
    /// A short read, including zero, means no more input is available right
    /// now. It never means the stream has ended.
    fn read(&mut self, dst: &mut [u8]) -> usize;
}

/// Outcome of one discovery attempt.
#[derive(Debug)]
pub enum Discovery<E> {
    /// The stream start was recognised. `consumed` is the length of the
    /// prefix the engine has taken ownership of.
    Ready { engine: E, consumed: usize },
    /// Not enough bytes yet.
    NotReady,
    /// The prefix can never become a valid stream.
    Malformed(EngineError),
}

/// Builds engines from a buffered prefix.
pub trait EngineFactory {
    type Engine: Engine;

    /// Try to recognise a stream at the start of `initial`.
    ///
    /// Called again with a longer prefix after every enqueue until it
    /// returns [`Discovery::Ready`].
    fn discover(&mut self, initial: &[u8]) -> Discovery<Self::Engine>;
}

/// A discovered container/codec engine.
pub trait Engine {
    /// Channel count of the interleaved output. Fixed for the engine's lifetime.
    fn channels(&self) -> usize;

    /// Output sample rate in Hz.
    fn sample_rate(&self) -> u32;

    /// Perform one decode step, pulling compressed bytes from `reader` as needed.
    ///
    /// Writes interleaved samples to `scratch`, whose length is a multiple of
    /// [`channels`](Engine::channels), and returns the number of sample
    /// frames written. `Ok(0)` means no complete frame is available yet.
    fn decode(&mut self, reader: &mut dyn Reader, scratch: &mut [f32]) -> Result<usize, EngineError>;
}

/// Failure classes reported by engines.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The stream did not begin with a recognised page or header magic.
    #[error("not a recognised stream: {0}")]
    NotFormat(String),

    /// A page failed its CRC check.
    #[error("page checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    Checksum { stored: u32, computed: u32 },

    /// A required header was malformed or missing.
    #[error("malformed header: {0}")]
    BadHeader(String),

    /// The identification header has an unsupported version.
    #[error("unrecognised header version {0}")]
    Version(u8),

    /// The stream uses a feature this engine does not implement.
    #[error("unimplemented stream feature: {0}")]
    Unimplemented(String),

    /// Page sequence numbers skipped; a page was corrupt or missing.
    #[error("hole in page sequence: expected {expected}, found {found}")]
    Hole { expected: u32, found: u32 },

    /// A packet failed to decode.
    #[error("bad packet: {0}")]
    BadPacket(String),

    /// Error raised by the underlying codec library.
    #[error("codec error: {0}")]
    Codec(String),
}
