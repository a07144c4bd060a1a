mod file_config;

pub use file_config::{AcquisitionConfig, FileConfig, MusicBrainzConfig, ToolsConfig};

use crate::server::RequestsLoggingLevel;
use anyhow::{bail, Result};
use clap::ValueEnum;
use reqwest::Url;
use std::path::PathBuf;
use std::time::Duration;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub mirror_base_url: Option<String>,
    pub book_dir: Option<PathBuf>,
    pub song_dir: Option<PathBuf>,
    pub poll_interval_secs: Option<u64>,
    pub max_concurrent_downloads: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub db_dir: PathBuf,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub mirror_base_url: String,
    pub book_dir: PathBuf,
    pub song_dir: PathBuf,

    // Feature configs (with defaults)
    pub acquisition: AcquisitionSettings,
    pub musicbrainz: MusicBrainzSettings,
    pub tools: ToolSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        // TOML overrides CLI for each field
        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;

        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let mirror_base_url = file
            .mirror_base_url
            .or_else(|| cli.mirror_base_url.clone())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "mirror_base_url must be specified via --mirror-base-url or in config file"
                )
            })?;
        if let Err(e) = Url::parse(&mirror_base_url) {
            bail!("Invalid mirror_base_url {:?}: {}", mirror_base_url, e);
        }
        let mirror_base_url = mirror_base_url.trim_end_matches('/').to_string();

        let port = file.port.unwrap_or(cli.port);

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let book_dir = file
            .book_dir
            .map(PathBuf::from)
            .or_else(|| cli.book_dir.clone())
            .unwrap_or_else(|| db_dir.join("books"));
        let song_dir = file
            .song_dir
            .map(PathBuf::from)
            .or_else(|| cli.song_dir.clone())
            .unwrap_or_else(|| db_dir.join("songs"));

        // Acquisition settings - merge file config, CLI and defaults
        let acq_file = file.acquisition.unwrap_or_default();
        let defaults = AcquisitionSettings::default();
        let acquisition = AcquisitionSettings {
            poll_interval_secs: acq_file
                .poll_interval_secs
                .or(cli.poll_interval_secs)
                .unwrap_or(defaults.poll_interval_secs),
            max_concurrent_downloads: acq_file
                .max_concurrent_downloads
                .or(cli.max_concurrent_downloads)
                .unwrap_or(defaults.max_concurrent_downloads)
                .max(1),
            request_timeout_secs: acq_file
                .request_timeout_secs
                .unwrap_or(defaults.request_timeout_secs),
            retry_attempts: acq_file.retry_attempts.unwrap_or(defaults.retry_attempts),
            retry_delay_ms: acq_file.retry_delay_ms.unwrap_or(defaults.retry_delay_ms),
        };

        let mb_file = file.musicbrainz.unwrap_or_default();
        let mb_defaults = MusicBrainzSettings::default();
        let musicbrainz = MusicBrainzSettings {
            base_url: mb_file.base_url.unwrap_or(mb_defaults.base_url),
            cover_art_url: mb_file.cover_art_url.unwrap_or(mb_defaults.cover_art_url),
            user_agent: mb_file.user_agent.unwrap_or(mb_defaults.user_agent),
            search_limit: mb_file.search_limit.unwrap_or(mb_defaults.search_limit),
        };

        let tools_file = file.tools.unwrap_or_default();
        let tool_defaults = ToolSettings::default();
        let tools = ToolSettings {
            yt_dlp_path: tools_file.yt_dlp_path.unwrap_or(tool_defaults.yt_dlp_path),
            ffmpeg_path: tools_file.ffmpeg_path.unwrap_or(tool_defaults.ffmpeg_path),
        };

        Ok(Self {
            db_dir,
            port,
            logging_level,
            mirror_base_url,
            book_dir,
            song_dir,
            acquisition,
            musicbrainz,
            tools,
        })
    }

    pub fn acquisition_db_path(&self) -> PathBuf {
        self.db_dir.join("acquisition.db")
    }
}

#[derive(Debug, Clone)]
pub struct AcquisitionSettings {
    pub poll_interval_secs: u64,
    pub max_concurrent_downloads: usize,
    pub request_timeout_secs: u64,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
}

impl AcquisitionSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
            max_concurrent_downloads: 4,
            request_timeout_secs: 10,
            retry_attempts: 5,
            retry_delay_ms: 200,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MusicBrainzSettings {
    pub base_url: String,
    pub cover_art_url: String,
    pub user_agent: String,
    pub search_limit: u32,
}

impl Default for MusicBrainzSettings {
    fn default() -> Self {
        Self {
            base_url: "https://musicbrainz.org/ws/2".to_string(),
            cover_art_url: "https://coverartarchive.org".to_string(),
            user_agent: concat!("acquisition-server/", env!("CARGO_PKG_VERSION")).to_string(),
            search_limit: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ToolSettings {
    pub yt_dlp_path: String,
    pub ffmpeg_path: String,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            yt_dlp_path: "yt-dlp".to_string(),
            ffmpeg_path: "ffmpeg".to_string(),
        }
    }
}

/// Parses a logging level string into RequestsLoggingLevel.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}
