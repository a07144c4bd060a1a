use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_dir: Option<String>,
    pub port: Option<u16>,
    pub logging_level: Option<String>,
    pub mirror_base_url: Option<String>,
    pub book_dir: Option<String>,
    pub song_dir: Option<String>,

    // Feature configs
    pub acquisition: Option<AcquisitionConfig>,
    pub musicbrainz: Option<MusicBrainzConfig>,
    pub tools: Option<ToolsConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct AcquisitionConfig {
    pub poll_interval_secs: Option<u64>,
    pub max_concurrent_downloads: Option<usize>,
    pub request_timeout_secs: Option<u64>,
    pub retry_attempts: Option<u32>,
    pub retry_delay_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct MusicBrainzConfig {
    pub base_url: Option<String>,
    pub cover_art_url: Option<String>,
    pub user_agent: Option<String>,
    pub search_limit: Option<u32>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ToolsConfig {
    pub yt_dlp_path: Option<String>,
    pub ffmpeg_path: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
