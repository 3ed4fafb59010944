use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use log::error;

use crate::circular_buffer::DEFAULT_CAPACITY;

/// Ceiling for runtime capacity increases: 16 MiB.
pub const DEFAULT_MAX_CAPACITY: usize = 16 * 1024 * 1024;

const DEFAULT_SAMPLE_RATE: u32 = 16000;
const DEFAULT_CHUNK_BYTES: usize = 1024;

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    #[serde(default)]
    pub buffer: BufferConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub sources: Vec<FileConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BufferConfig {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    #[serde(default)]
    pub overlap: bool,
    #[serde(default = "default_max_capacity")]
    pub max_capacity: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            overlap: false,
            max_capacity: DEFAULT_MAX_CAPACITY,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AudioConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default)]
    pub denoise: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self { sample_rate: DEFAULT_SAMPLE_RATE, denoise: false }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FileConfig {
    pub id: String,
    pub path: String,
    #[serde(default = "default_chunk_bytes")]
    pub chunk_bytes: usize,
    #[serde(default, rename = "loop")]
    pub loop_: Option<bool>,
    #[serde(default)]
    pub enabled: bool,
}

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

fn default_max_capacity() -> usize {
    DEFAULT_MAX_CAPACITY
}

fn default_sample_rate() -> u32 {
    DEFAULT_SAMPLE_RATE
}

fn default_chunk_bytes() -> usize {
    DEFAULT_CHUNK_BYTES
}

#[derive(Debug, Clone)]
pub struct FlattenedConfig {
    pub capacity: usize,
    pub overlap: bool,
    pub max_capacity: usize,
    pub sample_rate: u32,
    pub denoise: bool,
    pub file_sources: Vec<FileConfig>,
}

pub fn load_config(path: &str) -> Result<FlattenedConfig, Box<dyn std::error::Error>> {

    if !Path::new(path).exists() {
        return Err(format!("Config file not found: {}", path).into());
    }

    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config file {}: {}", path, e))?;

    let cfg = parse_config(&content)
        .map_err(|e| format!("Failed to parse TOML config {}: {}", path, e))?;

    log::info!("Config loaded from: {}", path);
    Ok(cfg)
}

pub fn parse_config(content: &str) -> Result<FlattenedConfig, Box<dyn std::error::Error>> {
    let cfg: Config = toml::from_str(content)?;

    log::info!(
        "Buffer: {} bytes (max {}), overlap {}; audio: {} Hz, denoise {}",
        cfg.buffer.capacity, cfg.buffer.max_capacity, cfg.buffer.overlap,
        cfg.audio.sample_rate, cfg.audio.denoise
    );
    log::info!("Found {} total sources in config", cfg.sources.len());

    let mut file_sources = Vec::new();
    let mut seen_ids: HashSet<String> = HashSet::new();
    for s in cfg.sources.into_iter().filter(|s| s.enabled) {
        if !is_valid_id(&s.id) {
            error!("Invalid source id '{}'. Use [a-z0-9][a-z0-9_-]*", s.id);
            continue;
        }
        if s.chunk_bytes == 0 {
            error!("Source '{}' has chunk_bytes = 0 - skipping", s.id);
            continue;
        }
        if !seen_ids.insert(s.id.clone()) {
            error!("Duplicate source id '{}' - skipping", s.id);
            continue;
        }
        file_sources.push(s);
    }

    log::info!("Enabled sources: {} file", file_sources.len());
    if file_sources.is_empty() {
        log::warn!("No enabled sources found in config - data only arrives over D-Bus");
    }

    Ok(FlattenedConfig {
        capacity: cfg.buffer.capacity,
        overlap: cfg.buffer.overlap,
        max_capacity: cfg.buffer.max_capacity,
        sample_rate: cfg.audio.sample_rate,
        denoise: cfg.audio.denoise,
        file_sources,
    })
}

fn is_valid_id(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if is_lc_alnum(c) => {},
        _ => return false,
    }
    for c in chars {
        if !(is_lc_alnum(c) || c == '-' || c == '_') { return false; }
    }
    true
}

fn is_lc_alnum(c: char) -> bool {
    matches!(c, 'a'..='z' | '0'..='9')
}
