use std::path::PathBuf;

use anyhow::{bail, Context};
use ogg_opus_stream::{DecodedAudio, DecoderConfig, OggOpusStreamDecoder, StreamDecoder};
use serde::Serialize;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};

// 解码结果摘要
#[derive(Serialize)]
struct Summary {
    input: String,
    bytes_read: u64,
    channels: usize,
    sample_rate: u32,
    samples_decoded: usize,
    duration_secs: f64,
    vendor: Option<String>,
    comments: Vec<String>,
}

fn usage() -> String {
    format!(
        "{} {}\nusage: {} <input.opus> [output.f32]",
        env!("APP_NAME"),
        env!("APP_VERSION"),
        env!("APP_NAME")
    )
}

/// Interleave planar samples as little-endian f32 bytes.
fn interleave_le(audio: &DecodedAudio, out: &mut Vec<u8>) {
    out.clear();
    out.reserve(audio.samples_decoded * audio.channels() * 4);
    for i in 0..audio.samples_decoded {
        for channel in &audio.channel_data {
            out.extend_from_slice(&channel[i].to_le_bytes());
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let Some(input) = args.next().map(PathBuf::from) else {
        bail!(usage());
    };
    let output = args.next().map(PathBuf::from);

    // 加载配置
    let config = DecoderConfig::new().unwrap_or_default();
    log::info!(
        "buffer {} bytes, chunk {} bytes, up to {} frames x {} ch per decode",
        config.buffer_capacity,
        config.input_chunk_size,
        config.max_frames_per_decode,
        config.max_channels
    );

    let mut file = File::open(&input)
        .await
        .with_context(|| format!("failed to open {}", input.display()))?;
    let mut writer = match &output {
        Some(path) => Some(BufWriter::new(
            File::create(path)
                .await
                .with_context(|| format!("failed to create {}", path.display()))?,
        )),
        None => None,
    };

    let mut decoder = OggOpusStreamDecoder::with_config(config);
    // read in buffer-sized pieces, feeding the decoder as bytes arrive
    let mut chunk = vec![0u8; config.input_chunk_size];
    let mut bytes = Vec::new();
    let mut bytes_read = 0u64;
    let mut channels = 0;
    let mut sample_rate = 0;
    let mut samples_decoded = 0;

    loop {
        let n = file.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        bytes_read += n as u64;

        let audio = decoder
            .decode(&chunk[..n])
            .with_context(|| format!("decode failed after {} input bytes", bytes_read))?;
        if audio.samples_decoded == 0 {
            continue;
        }
        log::debug!("{} bytes in -> {} frames out", n, audio.samples_decoded);

        channels = audio.channels();
        sample_rate = audio.sample_rate;
        samples_decoded += audio.samples_decoded;

        if let Some(writer) = writer.as_mut() {
            interleave_le(&audio, &mut bytes);
            writer.write_all(&bytes).await?;
        }
    }

    if let Some(mut writer) = writer {
        writer.flush().await?;
    }

    let engine = decoder.session().engine();
    if engine.is_none() {
        bail!("{} is not a decodable Ogg Opus stream", input.display());
    }
    let summary = Summary {
        input: input.display().to_string(),
        bytes_read,
        channels,
        sample_rate,
        samples_decoded,
        duration_secs: if sample_rate > 0 {
            samples_decoded as f64 / sample_rate as f64
        } else {
            0.0
        },
        vendor: engine.map(|e| e.tags().vendor.clone()),
        comments: engine.map(|e| e.tags().comments.clone()).unwrap_or_default(),
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
