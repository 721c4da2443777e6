//! Ogg Opus engine: demuxes pages pulled from a [`Reader`] and decodes the
//! packets with libopus through the `opus` crate.

use crate::engine::{Discovery, Engine, EngineError, EngineFactory, Reader};

use super::header::{OpusHead, OpusTags};
use super::packet::{Packet, PacketAssembler};
use super::page::{self, Page, Sync, MAX_PAGE_SIZE};

/// Opus always decodes at 48 kHz here; the header's input rate is informational.
pub const OPUS_SAMPLE_RATE: u32 = 48_000;

/// Longest Opus packet: 120 ms at 48 kHz.
pub const MAX_PACKET_FRAMES: usize = 120 * 48;

/// Bytes requested per pull-read.
const READ_CHUNK: usize = 4096;

/// Discovers Ogg Opus streams.
///
/// Discovery succeeds once the `OpusHead` page and every page of the
/// `OpusTags` packet are buffered. The pages after the headers are left for
/// the engine to pull.
#[derive(Debug, Default)]
pub struct OggOpusFactory;

impl OggOpusFactory {
    pub fn new() -> Self {
        Self
    }
}

impl EngineFactory for OggOpusFactory {
    type Engine = OggOpusEngine;

    fn discover(&mut self, initial: &[u8]) -> Discovery<OggOpusEngine> {
        let headers = match scan_headers(initial) {
            Ok(Some(headers)) => headers,
            Ok(None) => return Discovery::NotReady,
            Err(e) => return Discovery::Malformed(e),
        };

        let consumed = headers.consumed;
        match OggOpusEngine::new(headers) {
            Ok(engine) => Discovery::Ready { engine, consumed },
            Err(e) => Discovery::Malformed(e),
        }
    }
}

struct Headers {
    head: OpusHead,
    tags: OpusTags,
    serial: u32,
    next_sequence: u32,
    consumed: usize,
}

fn scan_headers(data: &[u8]) -> Result<Option<Headers>, EngineError> {
    let mut assembler = PacketAssembler::new();
    let mut offset = 0;
    let mut stream: Option<(u32, u32)> = None;
    let mut head: Option<OpusHead> = None;
    let mut skipped = 0;

    loop {
        let (page, len) = match page::sync_page(&data[offset..]) {
            Sync::Page { page, len } => (page, len),
            Sync::Skip(n) => {
                offset += n;
                skipped += n;
                if skipped > MAX_PAGE_SIZE {
                    return Err(EngineError::NotFormat(format!(
                        "no Ogg page found in {} bytes",
                        skipped
                    )));
                }
                continue;
            }
            Sync::NeedMore => return Ok(None),
        };
        offset += len;

        let header = &page.header;
        let current = stream;
        let next_sequence = match current {
            None => {
                if !header.is_bos() {
                    return Err(EngineError::NotFormat(
                        "first page is not a beginning-of-stream page".into(),
                    ));
                }
                let completed = assembler.push_page(&page);
                let packet = assembler.pop();
                match packet {
                    Some(packet) if completed == 1 && !assembler.has_partial() => {
                        head = Some(OpusHead::parse(&packet.data)?);
                    }
                    _ => {
                        return Err(EngineError::BadHeader(
                            "OpusHead must be the only packet on the first page".into(),
                        ));
                    }
                }
                stream = Some((header.serial, header.sequence.wrapping_add(1)));
                continue;
            }
            Some((serial, _)) if serial != header.serial => {
                // pages of other logical streams are not ours
                continue;
            }
            Some((_, expected)) => {
                if header.sequence != expected {
                    return Err(EngineError::Hole {
                        expected,
                        found: header.sequence,
                    });
                }
                expected.wrapping_add(1)
            }
        };
        let serial = header.serial;
        stream = Some((serial, next_sequence));

        if assembler.push_page(&page) == 0 {
            continue;
        }
        let Some(packet) = assembler.pop() else {
            continue;
        };
        let tags = OpusTags::parse(&packet.data)?;
        if assembler.pop().is_some() || assembler.has_partial() {
            return Err(EngineError::BadHeader(
                "OpusTags must finish its page".into(),
            ));
        }

        let head = head
            .take()
            .ok_or_else(|| EngineError::BadHeader("missing OpusHead".into()))?;
        if skipped > 0 {
            log::debug!("skipped {} bytes of junk while reading headers", skipped);
        }
        return Ok(Some(Headers {
            head,
            tags,
            serial,
            next_sequence,
            consumed: offset,
        }));
    }
}

/// Decoding half of an Ogg Opus stream.
pub struct OggOpusEngine {
    decoder: opus::Decoder,
    head: OpusHead,
    tags: OpusTags,
    serial: u32,
    next_sequence: u32,
    sync: Vec<u8>,
    assembler: PacketAssembler,
    pre_skip_remaining: usize,
    gain: f32,
    /// Raw frames decoded so far, before pre-skip, for end trimming.
    decoded_frames: i64,
    finished: bool,
}

impl OggOpusEngine {
    fn new(headers: Headers) -> Result<Self, EngineError> {
        let Headers {
            head,
            tags,
            serial,
            next_sequence,
            ..
        } = headers;

        let channels = match (head.mapping_family, head.channels) {
            (0, 1) => opus::Channels::Mono,
            (0, 2) => opus::Channels::Stereo,
            (family, channels) => {
                return Err(EngineError::Unimplemented(format!(
                    "channel mapping family {family} with {channels} channels"
                )));
            }
        };
        let decoder = opus::Decoder::new(OPUS_SAMPLE_RATE, channels)
            .map_err(|e| EngineError::Codec(e.to_string()))?;

        log::info!(
            "Ogg Opus stream {:#010x}: {} ch, pre-skip {}, gain {} (Q7.8 dB), vendor \"{}\"",
            serial,
            head.channels,
            head.pre_skip,
            head.output_gain,
            tags.vendor
        );

        Ok(Self {
            decoder,
            pre_skip_remaining: head.pre_skip as usize,
            gain: head.gain_factor(),
            head,
            tags,
            serial,
            next_sequence,
            sync: Vec::with_capacity(READ_CHUNK * 2),
            assembler: PacketAssembler::new(),
            decoded_frames: 0,
            finished: false,
        })
    }

    pub fn head(&self) -> &OpusHead {
        &self.head
    }

    pub fn tags(&self) -> &OpusTags {
        &self.tags
    }

    /// Whether the end-of-stream page has been decoded.
    pub fn is_finished(&self) -> bool {
        self.finished && self.assembler.is_empty()
    }

    fn accept_page(&mut self, page: &Page<'_>) -> Result<(), EngineError> {
        let header = &page.header;
        if header.serial != self.serial {
            log::debug!("ignoring page of logical stream {:#010x}", header.serial);
            return Ok(());
        }

        let expected = self.next_sequence;
        self.next_sequence = header.sequence.wrapping_add(1);
        let hole = header.sequence != expected;
        if hole {
            self.assembler.discard_partial();
        }
        self.assembler.push_page(page);
        if header.is_eos() {
            self.finished = true;
        }

        if hole {
            log::warn!(
                "page sequence hole: expected {}, found {}",
                expected,
                header.sequence
            );
            return Err(EngineError::Hole {
                expected,
                found: header.sequence,
            });
        }
        Ok(())
    }

    /// Pull and demux until at least one packet is ready.
    ///
    /// Returns `Ok(false)` when the reader has nothing more to give right now.
    fn fill_packets(&mut self, reader: &mut dyn Reader) -> Result<bool, EngineError> {
        let mut chunk = [0u8; READ_CHUNK];
        while self.assembler.is_empty() {
            if self.finished {
                self.discard_trailing(reader, &mut chunk);
                return Ok(false);
            }
            let mut sync = std::mem::take(&mut self.sync);
            let step = match page::sync_page(&sync) {
                Sync::Page { page, len } => Some((len, self.accept_page(&page))),
                Sync::Skip(n) => {
                    log::debug!("skipping {} bytes while searching for a page", n);
                    Some((n, Ok(())))
                }
                Sync::NeedMore => None,
            };
            let accepted = match step {
                Some((n, accepted)) => {
                    sync.drain(..n);
                    accepted
                }
                None => {
                    let n = reader.read(&mut chunk);
                    log::trace!("pulled {} of {} bytes", n, chunk.len());
                    sync.extend_from_slice(&chunk[..n]);
                    if n == 0 {
                        self.sync = sync;
                        return Ok(false);
                    }
                    Ok(())
                }
            };
            self.sync = sync;
            accepted?;
        }
        Ok(true)
    }

    /// Drop everything after the end-of-stream page so the buffer keeps
    /// accepting input.
    fn discard_trailing(&mut self, reader: &mut dyn Reader, chunk: &mut [u8]) {
        let mut discarded = self.sync.len();
        self.sync.clear();
        loop {
            let n = reader.read(chunk);
            if n == 0 {
                break;
            }
            discarded += n;
        }
        if discarded > 0 {
            log::debug!("discarding {} bytes after end of stream", discarded);
        }
    }

    fn decode_packet(&mut self, packet: &Packet, scratch: &mut [f32]) -> Result<usize, EngineError> {
        let channels = self.head.channels as usize;
        let mut frames = self
            .decoder
            .decode_float(&packet.data, scratch, false)
            .map_err(|e| EngineError::BadPacket(e.to_string()))?;

        let start = self.decoded_frames;
        self.decoded_frames += frames as i64;

        // the final granule position marks where valid audio ends
        if packet.eos {
            if let Some(end) = packet.granule_position {
                frames = frames_before_end(start, end, frames);
            }
        }

        let skip = self.pre_skip_remaining.min(frames);
        if skip > 0 {
            self.pre_skip_remaining -= skip;
            scratch.copy_within(skip * channels..frames * channels, 0);
            frames -= skip;
        }

        if self.gain != 1.0 {
            for sample in &mut scratch[..frames * channels] {
                *sample *= self.gain;
            }
        }
        Ok(frames)
    }
}

/// Frames of a packet starting at `start` that lie before granule `end`.
fn frames_before_end(start: i64, end: i64, frames: usize) -> usize {
    end.saturating_sub(start).clamp(0, frames as i64) as usize
}

impl Engine for OggOpusEngine {
    fn channels(&self) -> usize {
        self.head.channels as usize
    }

    fn sample_rate(&self) -> u32 {
        OPUS_SAMPLE_RATE
    }

    fn decode(&mut self, reader: &mut dyn Reader, scratch: &mut [f32]) -> Result<usize, EngineError> {
        loop {
            if !self.fill_packets(reader)? {
                return Ok(0);
            }
            let Some(packet) = self.assembler.pop() else {
                return Ok(0);
            };
            let frames = self.decode_packet(&packet, scratch)?;
            // packets consumed entirely by pre-skip produce nothing for the caller
            if frames > 0 {
                return Ok(frames);
            }
        }
    }
}

impl std::fmt::Debug for OggOpusEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OggOpusEngine")
            .field("head", &self.head)
            .field("serial", &self.serial)
            .field("next_sequence", &self.next_sequence)
            .field("buffered", &self.sync.len())
            .field("finished", &self.finished)
            .finish()
    }
}
