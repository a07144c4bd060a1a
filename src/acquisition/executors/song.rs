//! Song downloads: find a matching audio source, extract it as FLAC, then
//! tag it with the recording metadata and cover.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{move_into_library, open_stream, stream_to_file, DownloadExecutor};
use crate::acquisition::error::AcquisitionError;
use crate::acquisition::filename::sanitize_filename;
use crate::acquisition::models::{NewLibraryRecord, NewSong, QueueEntry, QueuePayload};
use crate::acquisition::progress::{DownloadStage, ProgressHandle};
use crate::acquisition::retry::RetryPolicy;
use crate::config::ToolSettings;

/// Metadata embedded into the final audio file.
#[derive(Debug, Clone, PartialEq)]
pub struct TagMetadata {
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub date: Option<String>,
    pub isrc: Option<String>,
}

/// External audio tooling used by [`SongExecutor`].
#[async_trait]
pub trait AudioToolchain: Send + Sync {
    /// Identifier of the best audio source for `query`, if any.
    async fn search(&self, query: &str) -> Result<Option<String>, AcquisitionError>;

    /// Download the source's audio as FLAC into `dir`, returning the file.
    async fn extract_audio(&self, source_id: &str, dir: &Path) -> Result<PathBuf, AcquisitionError>;

    /// Write `audio` to `dest` with metadata and an optional cover picture.
    async fn tag(
        &self,
        audio: &Path,
        cover: Option<&Path>,
        metadata: &TagMetadata,
        dest: &Path,
    ) -> Result<(), AcquisitionError>;
}

/// yt-dlp and ffmpeg, run as child processes.
pub struct ExternalToolchain {
    yt_dlp_path: String,
    ffmpeg_path: String,
}

impl ExternalToolchain {
    pub fn new(settings: &ToolSettings) -> Self {
        Self {
            yt_dlp_path: settings.yt_dlp_path.clone(),
            ffmpeg_path: settings.ffmpeg_path.clone(),
        }
    }

    async fn run(&self, program: &str, args: Vec<OsString>) -> Result<String, AcquisitionError> {
        let output = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| AcquisitionError::external_process(program, e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AcquisitionError::external_process(
                program,
                format!("{}: {}", output.status, stderr.trim()),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

const AUDIO_STEM: &str = "audio";

fn yt_dlp_search_args(query: &str) -> Vec<OsString> {
    vec![
        "--no-playlist".into(),
        "--print".into(),
        "id".into(),
        format!("ytsearch1:{}", query).into(),
    ]
}

fn yt_dlp_extract_args(source_id: &str, dir: &Path) -> Vec<OsString> {
    vec![
        "-f".into(),
        "bestaudio".into(),
        "-x".into(),
        "--audio-format".into(),
        "flac".into(),
        "--no-playlist".into(),
        "-o".into(),
        dir.join(format!("{}.%(ext)s", AUDIO_STEM)).into_os_string(),
        format!("https://www.youtube.com/watch?v={}", source_id).into(),
    ]
}

fn ffmpeg_tag_args(
    audio: &Path,
    cover: Option<&Path>,
    metadata: &TagMetadata,
    dest: &Path,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-y".into(), "-i".into(), audio.as_os_str().into()];
    if let Some(cover) = cover {
        args.extend(["-i".into(), cover.as_os_str().into()]);
    }

    args.extend(["-map".into(), "0:a".into()]);
    if cover.is_some() {
        args.extend([
            "-map".into(),
            "1:v".into(),
            "-c:v".into(),
            "mjpeg".into(),
            "-disposition:v".into(),
            "attached_pic".into(),
            "-metadata:s:v".into(),
            "comment=Cover (front)".into(),
        ]);
    }
    args.extend(["-c:a".into(), "copy".into()]);

    let mut tag = |key: &str, value: &str| {
        args.push("-metadata".into());
        args.push(format!("{}={}", key, value).into());
    };
    tag("title", &metadata.title);
    tag("artist", &metadata.artist);
    if let Some(album) = &metadata.album {
        tag("album", album);
    }
    if let Some(date) = &metadata.date {
        tag("date", date);
    }
    if let Some(isrc) = &metadata.isrc {
        tag("ISRC", isrc);
    }

    args.push(dest.as_os_str().into());
    args
}

#[async_trait]
impl AudioToolchain for ExternalToolchain {
    async fn search(&self, query: &str) -> Result<Option<String>, AcquisitionError> {
        let stdout = self.run(&self.yt_dlp_path, yt_dlp_search_args(query)).await?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string))
    }

    async fn extract_audio(&self, source_id: &str, dir: &Path) -> Result<PathBuf, AcquisitionError> {
        self.run(&self.yt_dlp_path, yt_dlp_extract_args(source_id, dir))
            .await?;
        let audio = dir.join(format!("{}.flac", AUDIO_STEM));
        if !tokio::fs::try_exists(&audio).await? {
            return Err(AcquisitionError::external_process(
                &self.yt_dlp_path,
                format!("expected output {:?} was not produced", audio),
            ));
        }
        Ok(audio)
    }

    async fn tag(
        &self,
        audio: &Path,
        cover: Option<&Path>,
        metadata: &TagMetadata,
        dest: &Path,
    ) -> Result<(), AcquisitionError> {
        self.run(&self.ffmpeg_path, ffmpeg_tag_args(audio, cover, metadata, dest))
            .await?;
        Ok(())
    }
}

pub struct SongExecutor {
    toolchain: Arc<dyn AudioToolchain>,
    client: Client,
    song_dir: PathBuf,
    retry_policy: RetryPolicy,
}

impl SongExecutor {
    pub fn new(
        toolchain: Arc<dyn AudioToolchain>,
        song_dir: PathBuf,
        request_timeout: Duration,
        retry_policy: RetryPolicy,
    ) -> Result<Self, AcquisitionError> {
        Ok(Self {
            toolchain,
            client: Client::builder().timeout(request_timeout).build()?,
            song_dir,
            retry_policy,
        })
    }

    async fn fetch_cover(&self, url: &str, dir: &Path) -> Result<PathBuf, AcquisitionError> {
        let response = open_stream(&self.client, url, &self.retry_policy).await?;
        let dest = dir.join("cover.jpg");
        stream_to_file(response, &dest, &ProgressHandle::default()).await?;
        Ok(dest)
    }
}

#[async_trait]
impl DownloadExecutor for SongExecutor {
    async fn execute(
        &self,
        entry: &QueueEntry,
        progress: ProgressHandle,
    ) -> Result<NewLibraryRecord, AcquisitionError> {
        let song = match &entry.payload {
            QueuePayload::Song(song) => song,
            other => {
                return Err(AcquisitionError::parse(format!(
                    "song executor got a {} entry",
                    other.kind().as_str()
                )))
            }
        };

        // Resolve
        progress.set_stage(DownloadStage::Resolving);
        let query = format!("{} {}", song.title, song.artist);
        let source_id = self
            .toolchain
            .search(&query)
            .await?
            .ok_or_else(|| AcquisitionError::NotFound(query.clone()))?;
        debug!("Resolved {} to source {}", entry.display_title(), source_id);

        // Inside the song directory so the finished file can be renamed into
        // place. Removed on drop, whichever way this function returns.
        tokio::fs::create_dir_all(&self.song_dir).await?;
        let workdir = tempfile::Builder::new()
            .prefix(".acquisition-song-")
            .tempdir_in(&self.song_dir)?;

        // Transcode
        progress.set_stage(DownloadStage::Transcoding);
        let audio = self
            .toolchain
            .extract_audio(&source_id, workdir.path())
            .await?;

        // Cover
        let cover = match &entry.cover_url {
            Some(url) => match self.fetch_cover(url, workdir.path()).await {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!("Skipping cover for {}: {}", entry.display_title(), e);
                    None
                }
            },
            None => None,
        };

        // Tag
        progress.set_stage(DownloadStage::Tagging);
        let tagged = workdir.path().join("tagged.flac");
        let metadata = TagMetadata {
            title: song.title.clone(),
            artist: song.artist.clone(),
            album: song.album.clone(),
            date: song.release_date.clone(),
            isrc: song.isrc.clone(),
        };
        self.toolchain
            .tag(&audio, cover.as_deref(), &metadata, &tagged)
            .await?;
        let filename = sanitize_filename(&format!("{} - {}.flac", song.artist, song.title));
        let dest = move_into_library(&tagged, &self.song_dir, &filename).await?;
        info!("Tagged {} to {:?}", entry.display_title(), dest);

        Ok(NewLibraryRecord::Song(NewSong {
            title: song.title.clone(),
            artist: song.artist.clone(),
            album: song.album.clone(),
            release_date: song.release_date.clone(),
            isrc: song.isrc.clone(),
            path: dest,
            external_id: entry.external_id.clone(),
        }))
    }
}
