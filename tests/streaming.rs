use ogg_opus_stream::ogg::page::{flags, lacing_for, PageHeader};
use ogg_opus_stream::{
    DecoderConfig, DecoderSession, EngineError, EnqueueStatus, Error, OggOpusFactory,
    OggOpusStreamDecoder, StreamDecoder,
};

const SERIAL: u32 = 0x0BAD_CAFE;
const PRE_SKIP: u16 = 312;
const FRAME: usize = 960;

fn opus_head(channels: u8, pre_skip: u16) -> Vec<u8> {
    opus_head_with_gain(channels, pre_skip, 0)
}

fn opus_head_with_gain(channels: u8, pre_skip: u16, output_gain: i16) -> Vec<u8> {
    let mut data = b"OpusHead".to_vec();
    data.push(1);
    data.push(channels);
    data.extend_from_slice(&pre_skip.to_le_bytes());
    data.extend_from_slice(&48_000u32.to_le_bytes());
    data.extend_from_slice(&output_gain.to_le_bytes());
    data.push(0);
    data
}

/// OpusTags packet of exactly `len` bytes (at least 28).
fn opus_tags(len: usize) -> Vec<u8> {
    let vendor = b"test";
    let comment_len = len - 8 - 4 - vendor.len() - 4 - 4;
    let mut data = b"OpusTags".to_vec();
    data.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
    data.extend_from_slice(vendor);
    data.extend_from_slice(&1u32.to_le_bytes());
    data.extend_from_slice(&(comment_len as u32).to_le_bytes());
    data.extend_from_slice(b"PAD=");
    data.resize(len, b'x');
    data
}

/// Serializes packets into Ogg pages for one logical stream.
struct PageWriter {
    serial: u32,
    sequence: u32,
    out: Vec<u8>,
    /// Byte offset of every page written.
    offsets: Vec<usize>,
}

impl PageWriter {
    fn new(serial: u32) -> Self {
        Self {
            serial,
            sequence: 0,
            out: Vec::new(),
            offsets: Vec::new(),
        }
    }

    fn page(&mut self, header_type: u8, granule_position: i64, lacing: Vec<u8>, body: &[u8]) {
        let header = PageHeader {
            header_type,
            granule_position,
            serial: self.serial,
            sequence: self.sequence,
            lacing,
        };
        self.offsets.push(self.out.len());
        self.out.extend(header.write(body));
        self.sequence += 1;
    }

    /// Write `packets` on one page.
    fn packets(&mut self, header_type: u8, granule_position: i64, packets: &[Vec<u8>]) {
        let mut lacing = Vec::new();
        let mut body = Vec::new();
        for packet in packets {
            lacing.extend(lacing_for(packet.len()));
            body.extend_from_slice(packet);
        }
        assert!(lacing.len() <= 255);
        self.page(header_type, granule_position, lacing, &body);
    }

    /// Write one packet, spreading it over as many pages as needed.
    fn spanning_packet(&mut self, packet: &[u8], granule_position: i64) {
        let lacing = lacing_for(packet.len());
        let pages: Vec<&[u8]> = lacing.chunks(255).collect();
        let mut offset = 0;
        for (i, page_lacing) in pages.iter().enumerate() {
            let len: usize = page_lacing.iter().map(|&l| l as usize).sum();
            let header_type = if i == 0 { 0 } else { flags::CONTINUED };
            let granule = if i + 1 == pages.len() { granule_position } else { -1 };
            self.page(header_type, granule, page_lacing.to_vec(), &packet[offset..offset + len]);
            offset += len;
        }
    }
}

/// Stereo sine, `frames` frames of 20 ms each, encoded with libopus.
fn encode_sine(frames: usize) -> Vec<Vec<u8>> {
    let mut encoder =
        opus::Encoder::new(48_000, opus::Channels::Stereo, opus::Application::Audio).unwrap();
    let mut packets = Vec::new();
    let mut out = vec![0u8; 4000];
    for f in 0..frames {
        let pcm: Vec<f32> = (0..FRAME)
            .flat_map(|i| {
                let t = (f * FRAME + i) as f32 / 48_000.0;
                let s = (t * 440.0 * std::f32::consts::TAU).sin() * 0.5;
                [s, s]
            })
            .collect();
        let n = encoder.encode_float(&pcm, &mut out).unwrap();
        packets.push(out[..n].to_vec());
    }
    packets
}

/// Complete stereo stream: headers, then `audio` packets five to a page.
/// The final granule position trims `end_trim` frames.
fn sine_stream(audio: &[Vec<u8>], end_trim: usize) -> PageWriter {
    sine_stream_with_gain(audio, end_trim, 0)
}

fn sine_stream_with_gain(audio: &[Vec<u8>], end_trim: usize, output_gain: i16) -> PageWriter {
    let mut writer = PageWriter::new(SERIAL);
    writer.packets(flags::BOS, 0, &[opus_head_with_gain(2, PRE_SKIP, output_gain)]);
    writer.packets(0, 0, &[opus_tags(64)]);

    let pages: Vec<&[Vec<u8>]> = audio.chunks(5).collect();
    let mut granule = 0i64;
    for (i, page) in pages.iter().enumerate() {
        granule += (page.len() * FRAME) as i64;
        if i + 1 == pages.len() {
            writer.packets(flags::EOS, granule - end_trim as i64, page);
        } else {
            writer.packets(0, granule, page);
        }
    }
    writer
}

fn drain(session: &mut DecoderSession, left: &mut [f32], right: &mut [f32]) -> (usize, Vec<EngineError>) {
    let mut frames = 0;
    let mut errors = Vec::new();
    loop {
        match session.decode(&mut [&mut left[..], &mut right[..]]) {
            Ok(0) => break,
            Ok(n) => frames += n,
            Err(Error::Engine(e)) => errors.push(e),
            Err(e) => panic!("unexpected error {e}"),
        }
    }
    (frames, errors)
}

#[test]
fn test_header_discovered_on_fourth_chunk() {
    // 47-byte OpusHead page, OpusTags over two pages; exactly 64 KiB total
    let mut writer = PageWriter::new(SERIAL);
    writer.packets(flags::BOS, 0, &[opus_head(2, PRE_SKIP)]);
    writer.spanning_packet(&opus_tags(255 * 255 + 154), 0);
    let stream = writer.out;
    assert_eq!(stream.len(), 64 * 1024);

    let mut session = DecoderSession::create();
    for (i, chunk) in stream.chunks(16 * 1024).enumerate() {
        let status = session.enqueue(chunk).unwrap();
        if i < 3 {
            assert_eq!(status, EnqueueStatus::AwaitingHeader, "chunk {i}");
            assert!(!session.is_active());
        } else {
            assert_eq!(status, EnqueueStatus::Active { channels: 2 });
        }
    }

    assert_eq!(session.buffered(), 0);
    let mut left = vec![0.0f32; 5760];
    let mut right = vec![0.0f32; 5760];
    let frames = session
        .decode(&mut [&mut left[..], &mut right[..]])
        .unwrap();
    assert_eq!(frames, 0);
    assert_eq!(session.engine().unwrap().tags().vendor, "test");
}

#[test]
fn test_decode_sine_in_small_chunks() {
    let packets = encode_sine(25);
    let stream = sine_stream(&packets, 100).out;

    let mut decoder = OggOpusStreamDecoder::new();
    let mut left = Vec::new();
    let mut right = Vec::new();
    for chunk in stream.chunks(1000) {
        let audio = decoder.decode(chunk).unwrap();
        if audio.samples_decoded > 0 {
            assert_eq!(audio.channels(), 2);
            assert_eq!(audio.sample_rate, 48_000);
            left.extend_from_slice(&audio.channel_data[0]);
            right.extend_from_slice(&audio.channel_data[1]);
        }
    }

    // raw frames minus end trim minus pre-skip
    assert_eq!(left.len(), 25 * FRAME - 100 - PRE_SKIP as usize);
    assert_eq!(right.len(), left.len());
    let peak = left.iter().fold(0.0f32, |m, s| m.max(s.abs()));
    assert!(peak > 0.1, "decoded signal is silent (peak {peak})");
    assert!(decoder.session().engine().unwrap().is_finished());
}

#[test]
fn test_trailing_audio_kept_after_discovery() {
    let packets = encode_sine(5);
    let stream = sine_stream(&packets, 0).out;

    // whole stream in one enqueue: the audio page arrives with the headers
    let mut session = DecoderSession::create();
    assert_eq!(
        session.enqueue(&stream).unwrap(),
        EnqueueStatus::Active { channels: 2 }
    );
    assert!(session.buffered() > 0);

    let mut left = vec![0.0f32; 5760];
    let mut right = vec![0.0f32; 5760];
    let (frames, errors) = drain(&mut session, &mut left, &mut right);
    assert!(errors.is_empty());
    assert_eq!(frames, 5 * FRAME - PRE_SKIP as usize);
}

#[test]
fn test_corrupt_page_reports_hole_then_recovers() {
    let packets = encode_sine(20);
    let writer = sine_stream(&packets, 0);
    let mut stream = writer.out.clone();
    // second audio page; headers occupy pages 0 and 1
    let corrupt = writer.offsets[3] + 40;
    stream[corrupt] ^= 0x5A;

    let config = DecoderConfig {
        buffer_capacity: 8 * 1024,
        max_frames_per_decode: 5760,
        max_channels: 2,
        input_chunk_size: 4096,
    };
    let mut session = DecoderSession::with_factory(config, OggOpusFactory::new());
    let mut left = vec![0.0f32; 5760];
    let mut right = vec![0.0f32; 5760];
    let mut frames = 0;
    let mut errors = Vec::new();
    for chunk in stream.chunks(1024) {
        session.enqueue(chunk).unwrap();
        let (n, e) = drain(&mut session, &mut left, &mut right);
        frames += n;
        errors.extend(e);
    }

    assert_eq!(
        errors,
        vec![EngineError::Hole {
            expected: 3,
            found: 4
        }]
    );
    // one page of five packets lost
    assert_eq!(frames, 15 * FRAME - PRE_SKIP as usize);
}

#[test]
fn test_foreign_stream_pages_ignored() {
    let packets = encode_sine(10);
    let mut writer = PageWriter::new(SERIAL);
    writer.packets(flags::BOS, 0, &[opus_head(2, PRE_SKIP)]);
    writer.packets(0, 0, &[opus_tags(64)]);
    writer.packets(0, (5 * FRAME) as i64, &packets[..5]);

    let mut other = PageWriter::new(0x1234);
    other.packets(flags::BOS, 0, &[vec![0u8; 30]]);
    writer.out.extend_from_slice(&other.out);
    writer.packets(flags::EOS, (10 * FRAME) as i64, &packets[5..]);

    let mut decoder = OggOpusStreamDecoder::new();
    let audio = decoder.decode(&writer.out).unwrap();
    assert_eq!(audio.samples_decoded, 10 * FRAME - PRE_SKIP as usize);
}

#[test]
fn test_not_opus_rejected() {
    let mut writer = PageWriter::new(SERIAL);
    let mut vorbis = vec![1u8];
    vorbis.extend_from_slice(b"vorbis");
    vorbis.resize(30, 0);
    writer.packets(flags::BOS, 0, &[vorbis]);

    let mut session = DecoderSession::create();
    assert!(matches!(
        session.enqueue(&writer.out).unwrap(),
        EnqueueStatus::Rejected(EngineError::NotFormat(_))
    ));
}

#[test]
fn test_input_after_end_of_stream_discarded() {
    let packets = encode_sine(10);
    let mut stream = sine_stream(&packets, 0).out;
    stream.extend(std::iter::repeat_n(0xA5u8, 100 * 1024));

    let mut decoder = OggOpusStreamDecoder::new();
    let audio = decoder.decode(&stream).unwrap();
    assert_eq!(audio.samples_decoded, 10 * FRAME - PRE_SKIP as usize);
    assert_eq!(decoder.session().buffered(), 0);

    // a live source that keeps sending must not back up the buffer
    for _ in 0..4 {
        let audio = decoder.decode(&[0x5Au8; 48 * 1024]).unwrap();
        assert_eq!(audio.samples_decoded, 0);
    }
    assert_eq!(decoder.session().buffered(), 0);
}

#[test]
fn test_output_gain_applied() {
    let packets = encode_sine(10);
    let plain = OggOpusStreamDecoder::new()
        .decode(&sine_stream(&packets, 0).out)
        .unwrap();
    // +6 dB in Q7.8
    let gained = OggOpusStreamDecoder::new()
        .decode(&sine_stream_with_gain(&packets, 0, 6 * 256).out)
        .unwrap();
    assert_eq!(gained.samples_decoded, plain.samples_decoded);

    let peak = |samples: &[f32]| samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
    let ratio = peak(&gained.channel_data[0]) / peak(&plain.channel_data[0]);
    assert!((ratio - 1.9953).abs() < 0.01, "gain ratio {ratio}");
}

#[test]
fn test_negative_end_granule_trims_last_packet() {
    let packets = encode_sine(10);
    let mut writer = PageWriter::new(SERIAL);
    writer.packets(flags::BOS, 0, &[opus_head(2, PRE_SKIP)]);
    writer.packets(0, 0, &[opus_tags(64)]);
    writer.packets(0, (5 * FRAME) as i64, &packets[..5]);
    writer.packets(flags::EOS, i64::MIN, &packets[5..]);

    let mut decoder = OggOpusStreamDecoder::new();
    let audio = decoder.decode(&writer.out).unwrap();
    // only the packet that ends the EOS page is cut
    assert_eq!(audio.samples_decoded, 9 * FRAME - PRE_SKIP as usize);
}
