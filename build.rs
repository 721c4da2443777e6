use std::fs;
use std::path::Path;
use serde::Deserialize;

#[derive(Deserialize)]
struct Config {
    application: Application,
    buffer: Buffer,
    decode: Decode,
    input: Input,
}

#[derive(Deserialize)]
struct Application {
    name: String,
    version: String,
}

#[derive(Deserialize)]
struct Buffer {
    capacity: usize,
}

#[derive(Deserialize)]
struct Decode {
    max_frames: usize,
    max_channels: usize,
}

#[derive(Deserialize)]
struct Input {
    chunk_size: usize,
}

// 在编译时读取 config.toml 并设置环境变量
fn main() {
    println!("cargo:rerun-if-changed=config.toml");

    let config_path = Path::new("config.toml");
    if !config_path.exists() {
        panic!("config.toml not found!");
    }

    let config_str = fs::read_to_string(config_path).expect("Failed to read config.toml");
    let config: Config = toml::from_str(&config_str).expect("Failed to parse config.toml");

    println!("cargo:rustc-env=APP_NAME={}", config.application.name);
    println!("cargo:rustc-env=APP_VERSION={}", config.application.version);

    // 缓冲区配置
    println!("cargo:rustc-env=BUFFER_CAPACITY={}", config.buffer.capacity);

    // 解码配置
    println!("cargo:rustc-env=DECODE_MAX_FRAMES={}", config.decode.max_frames);
    println!("cargo:rustc-env=DECODE_MAX_CHANNELS={}", config.decode.max_channels);

    println!("cargo:rustc-env=INPUT_CHUNK_SIZE={}", config.input.chunk_size);
}
