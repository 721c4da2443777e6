//! One-shot decoding on top of a [`DecoderSession`].

use serde::Serialize;

use crate::config::DecoderConfig;
use crate::engine::EngineFactory;
use crate::error::{Error, Result};
use crate::ogg::OggOpusFactory;
use crate::session::{DecoderSession, EnqueueStatus};

/// Planar audio produced by one [`StreamDecoder::decode`] call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DecodedAudio {
    /// One vector per channel, each `samples_decoded` long.
    #[serde(skip)]
    pub channel_data: Vec<Vec<f32>>,
    pub samples_decoded: usize,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn channels(&self) -> usize {
        self.channel_data.len()
    }

    fn append(&mut self, other: DecodedAudio) {
        if self.channel_data.is_empty() {
            *self = other;
            return;
        }
        for (dst, src) in self.channel_data.iter_mut().zip(other.channel_data) {
            dst.extend(src);
        }
        self.samples_decoded += other.samples_decoded;
    }
}

/// A decoder that turns arbitrarily sized slices of compressed bytes into
/// planar f32 samples, keeping state between calls.
pub trait StreamDecoder {
    /// Decode as much of `data` as possible.
    ///
    /// Output may lag input: samples for the tail of `data` can arrive on a
    /// later call once more bytes complete a page.
    fn decode(&mut self, data: &[u8]) -> Result<DecodedAudio>;

    /// Forget all stream state.
    fn reset(&mut self);
}

/// Chunked enqueue/drain loop over a [`DecoderSession`].
///
/// Note for chained or concatenated streams: only the first logical stream
/// is decoded.
pub struct OggOpusStreamDecoder<F: EngineFactory = OggOpusFactory> {
    session: DecoderSession<F>,
    channel_buffers: Vec<Vec<f32>>,
}

impl OggOpusStreamDecoder<OggOpusFactory> {
    pub fn new() -> Self {
        Self::with_session(DecoderSession::create())
    }

    pub fn with_config(config: DecoderConfig) -> Self {
        Self::with_session(DecoderSession::with_factory(config, OggOpusFactory::new()))
    }
}

impl Default for OggOpusStreamDecoder<OggOpusFactory> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: EngineFactory> OggOpusStreamDecoder<F> {
    pub fn with_session(session: DecoderSession<F>) -> Self {
        let config = *session.config();
        Self {
            session,
            channel_buffers: vec![vec![0.0; config.max_frames_per_decode]; config.max_channels],
        }
    }

    pub fn session(&self) -> &DecoderSession<F> {
        &self.session
    }

    /// Decode until the engine reports that nothing more is available.
    fn drain(&mut self) -> Result<DecodedAudio> {
        let mut decoded = DecodedAudio {
            sample_rate: self.session.sample_rate().unwrap_or(0),
            ..Default::default()
        };
        let Some(channels) = self.session.channels() else {
            return Ok(decoded);
        };
        decoded.channel_data = vec![Vec::new(); channels];

        loop {
            let mut outputs: Vec<&mut [f32]> = self
                .channel_buffers
                .iter_mut()
                .map(|b| b.as_mut_slice())
                .collect();
            let frames = self.session.decode(&mut outputs)?;
            if frames == 0 {
                break;
            }
            for (dst, src) in decoded.channel_data.iter_mut().zip(&self.channel_buffers) {
                dst.extend_from_slice(&src[..frames]);
            }
            decoded.samples_decoded += frames;
        }
        Ok(decoded)
    }
}

impl<F: EngineFactory> StreamDecoder for OggOpusStreamDecoder<F> {
    fn decode(&mut self, data: &[u8]) -> Result<DecodedAudio> {
        let chunk_size = self.session.config().input_chunk_size;
        let mut decoded = DecodedAudio::default();

        for chunk in data.chunks(chunk_size) {
            // enqueue bytes to decode and fail on any error
            let status = self
                .session
                .enqueue(chunk)
                .map_err(|e| Error::Enqueue(Box::new(e)))?;
            if let EnqueueStatus::Rejected(e) = status {
                return Err(Error::Engine(e));
            }

            // continue to decode until no more bytes are left to decode
            decoded.append(self.drain()?);
        }

        if decoded.sample_rate == 0 {
            decoded.sample_rate = self.session.sample_rate().unwrap_or(0);
        }
        Ok(decoded)
    }

    fn reset(&mut self) {
        self.session.reset();
    }
}
