//! Decoder session: push compressed bytes in, pull deinterleaved samples out.

use crate::buffer::StreamBuffer;
use crate::config::DecoderConfig;
use crate::deinterleave::deinterleave;
use crate::engine::{Discovery, Engine, EngineError, EngineFactory, Reader};
use crate::error::{Error, Result};
use crate::ogg::OggOpusFactory;

/// State reported after a successful enqueue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueStatus {
    /// Bytes are buffered but the stream start is not recognisable yet.
    AwaitingHeader,
    /// The buffered prefix can never become a valid stream. The bytes stay
    /// buffered; retrying with more input will keep failing.
    Rejected(EngineError),
    /// An engine is decoding the stream.
    Active { channels: usize },
}

/// A streaming decode session.
///
/// Single-threaded: every call completes synchronously and the engine only
/// pulls bytes from within [`enqueue`](Self::enqueue) or
/// [`decode`](Self::decode). Share a session across threads only behind
/// external serialisation.
pub struct DecoderSession<F: EngineFactory = OggOpusFactory> {
    config: DecoderConfig,
    buffer: StreamBuffer,
    factory: F,
    engine: Option<F::Engine>,
    channels: usize,
    scratch: Vec<f32>,
}

impl DecoderSession<OggOpusFactory> {
    /// Session for Ogg Opus input with the build-time configuration.
    pub fn create() -> Self {
        Self::with_factory(DecoderConfig::default(), OggOpusFactory::new())
    }
}

impl<F: EngineFactory> DecoderSession<F> {
    pub fn with_factory(config: DecoderConfig, factory: F) -> Self {
        Self {
            buffer: StreamBuffer::new(config.buffer_capacity),
            scratch: vec![0.0; config.scratch_len()],
            config,
            factory,
            engine: None,
            channels: 0,
        }
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Whether discovery has succeeded.
    pub fn is_active(&self) -> bool {
        self.engine.is_some()
    }

    /// Channel count of the discovered stream, or `None` before discovery.
    pub fn channels(&self) -> Option<usize> {
        self.engine.as_ref().map(|_| self.channels)
    }

    pub fn sample_rate(&self) -> Option<u32> {
        self.engine.as_ref().map(Engine::sample_rate)
    }

    pub fn engine(&self) -> Option<&F::Engine> {
        self.engine.as_ref()
    }

    /// Bytes buffered and not yet pulled by the engine.
    pub fn buffered(&self) -> usize {
        self.buffer.unread()
    }

    /// Free buffer space, i.e. the largest chunk the next enqueue accepts.
    pub fn remaining(&self) -> usize {
        self.buffer.remaining()
    }

    /// Append `data` to the buffer and attempt discovery if no engine exists yet.
    ///
    /// Fails only with [`Error::Overflow`], in which case nothing was
    /// buffered: decode to free space, or split the input, and retry.
    pub fn enqueue(&mut self, data: &[u8]) -> Result<EnqueueStatus> {
        if let Err(e) = self.buffer.append(data) {
            log::warn!("{}; decode before enqueuing more", e);
            return Err(e);
        }

        if self.engine.is_some() {
            return Ok(EnqueueStatus::Active {
                channels: self.channels,
            });
        }

        log::debug!("attempting discovery with {} buffered bytes", self.buffer.unread());
        match self.factory.discover(self.buffer.as_slice()) {
            Discovery::Ready { engine, consumed } => {
                let channels = engine.channels();
                if channels == 0 || channels > self.config.max_channels {
                    let err = EngineError::Unimplemented(format!(
                        "{} channels, at most {} supported",
                        channels, self.config.max_channels
                    ));
                    log::warn!("discovered stream rejected: {}", err);
                    return Ok(EnqueueStatus::Rejected(err));
                }

                let consumed = self.buffer.consume(consumed);
                log::info!(
                    "stream discovered: {} ch @ {} Hz, {} header bytes, {} bytes left for decode",
                    channels,
                    engine.sample_rate(),
                    consumed,
                    self.buffer.unread()
                );
                self.channels = channels;
                self.engine = Some(engine);
                Ok(EnqueueStatus::Active { channels })
            }
            Discovery::NotReady => Ok(EnqueueStatus::AwaitingHeader),
            Discovery::Malformed(err) => {
                log::debug!("discovery failed: {}", err);
                Ok(EnqueueStatus::Rejected(err))
            }
        }
    }

    /// Pull up to `dst.len()` buffered bytes on behalf of the engine.
    ///
    /// Always returns 0 before discovery.
    pub fn pull_read(&mut self, dst: &mut [u8]) -> usize {
        if self.engine.is_none() {
            return 0;
        }
        self.buffer.read(dst)
    }

    /// Run one decode step and deinterleave the result into `outputs`.
    ///
    /// Returns the number of sample frames written to each of the first
    /// [`channels`](Self::channels) slices. `Ok(0)` means nothing can be
    /// decoded yet (including before discovery); enqueue more and retry.
    ///
    /// # Panics
    ///
    /// Panics if `outputs` holds fewer slices than the stream has channels,
    /// or if a slice is shorter than the frames produced. Slices of
    /// [`DecoderConfig::max_frames_per_decode`] samples are always enough.
    pub fn decode(&mut self, outputs: &mut [&mut [f32]]) -> Result<usize> {
        let Some(engine) = self.engine.as_mut() else {
            return Ok(0);
        };

        let channels = self.channels;
        let scratch = &mut self.scratch[..self.config.max_frames_per_decode * channels];
        let frames = engine
            .decode(&mut self.buffer, scratch)
            .map_err(Error::Engine)?;
        let frames = frames.min(self.config.max_frames_per_decode);

        deinterleave(&self.scratch, channels, frames, outputs);
        Ok(frames)
    }

    /// Drop the engine and all buffered bytes, as if freshly created.
    pub fn reset(&mut self) {
        self.engine = None;
        self.channels = 0;
        self.buffer.clear();
    }

    /// Release the engine and all session memory.
    pub fn destroy(self) {}
}
