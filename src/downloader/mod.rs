pub mod engine;
pub mod info;
pub mod manager;
pub mod progress;
pub mod strategies;
pub mod transport;

use serde::{Deserialize, Serialize};
use crate::errors::Result;
use std::path::{Path, PathBuf};

pub use progress::{ProgressNormalizer, ProgressQueue, ProgressState, ProgressStatus, RawProgress};
pub use strategies::{StrategyCatalog, StrategyConfig, StrategyList};

/// Sync callback the extractor feeds raw progress into while a download runs.
pub type ProgressHook<'a> = &'a mut (dyn FnMut(RawProgress) + Send);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FormatInfo {
    #[serde(default)]
    pub format_id: String,
    pub ext: Option<String>,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    pub height: Option<u64>,
    pub filesize: Option<u64>,
    pub format_note: Option<String>,
    pub protocol: Option<String>,
}

fn codec_present(codec: &Option<String>) -> bool {
    codec
        .as_deref()
        .map(|c| !c.is_empty() && !c.eq_ignore_ascii_case("none"))
        .unwrap_or(false)
}

impl FormatInfo {
    /// Storyboards are sprite sheets of thumbnails served as pseudo-formats.
    pub fn is_storyboard(&self) -> bool {
        let id = self.format_id.to_lowercase();
        let note = self.format_note.as_deref().unwrap_or_default().to_lowercase();
        id.starts_with("sb")
            || id.contains("storyboard")
            || note.contains("storyboard")
            || self.ext.as_deref() == Some("mhtml")
    }

    pub fn has_video(&self) -> bool {
        !self.is_storyboard() && codec_present(&self.vcodec)
    }

    pub fn has_audio(&self) -> bool {
        !self.is_storyboard() && codec_present(&self.acodec)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThumbnailInfo {
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Metadata as returned by the extractor's metadata call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaMetadata {
    #[serde(default)]
    pub id: String,
    pub title: Option<String>,
    pub duration: Option<f64>,
    pub uploader: Option<String>,
    pub view_count: Option<u64>,
    pub upload_date: Option<String>,
    pub description: Option<String>,
    pub thumbnail: Option<String>,
    pub thumbnails: Option<Vec<ThumbnailInfo>>,
    pub webpage_url: Option<String>,
    pub formats: Option<Vec<FormatInfo>>,
}

impl MediaMetadata {
    pub fn formats(&self) -> &[FormatInfo] {
        self.formats.as_deref().unwrap_or_default()
    }

    pub fn video_formats(&self) -> impl Iterator<Item = &FormatInfo> {
        self.formats().iter().filter(|f| f.has_video())
    }

    pub fn audio_formats(&self) -> impl Iterator<Item = &FormatInfo> {
        self.formats().iter().filter(|f| f.has_audio())
    }

    /// Whether at least one real (non-storyboard) stream satisfies the request.
    pub fn has_playable_format(&self, audio_only: bool) -> bool {
        if audio_only {
            self.audio_formats().next().is_some()
        } else {
            self.video_formats().next().is_some()
        }
    }

    /// Prefers the last entry of the thumbnail list, which yt-dlp orders by quality.
    pub fn best_thumbnail(&self) -> Option<String> {
        self.thumbnails
            .as_ref()
            .and_then(|thumbs| thumbs.last())
            .map(|thumb| thumb.url.clone())
            .or_else(|| self.thumbnail.clone())
    }
}

/// Where the extractor left the downloaded file.
#[derive(Debug, Clone)]
pub struct DownloadedMedia {
    pub path: PathBuf,
}

#[async_trait::async_trait]
pub trait MediaExtractor: Send + Sync {
    async fn fetch_metadata(&self, url: &str, client_hint: Option<&str>) -> Result<MediaMetadata>;

    async fn fetch_stream(
        &self,
        url: &str,
        strategy: &StrategyConfig,
        output_dir: &Path,
        progress: ProgressHook<'_>,
    ) -> Result<DownloadedMedia>;

    async fn version(&self) -> Result<String>;

    fn get_name(&self) -> &str;
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum AttemptOutcome {
    Pending,
    Succeeded,
    FailedException,
    SkippedNoVideoFormats,
    SkippedDecoyArtifact,
    FailedConversion,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyAttempt {
    pub name: String,
    pub index: u32,
    pub outcome: AttemptOutcome,
    pub error: Option<String>,
    /// Downloaded file kept on disk because conversion failed.
    pub leftover_file: Option<PathBuf>,
}

impl StrategyAttempt {
    pub fn pending(name: &str, index: u32) -> Self {
        Self {
            name: name.to_string(),
            index,
            outcome: AttemptOutcome::Pending,
            error: None,
            leftover_file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletedDownload {
    pub filename: String,
    pub path: PathBuf,
    pub strategy: String,
    pub size_bytes: u64,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailedDownload {
    pub error: String,
    pub attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SessionResult {
    Completed(CompletedDownload),
    Failed(FailedDownload),
}

/// One user-initiated download request, from submission to terminal result.
#[derive(Debug)]
pub struct DownloadSession {
    pub id: String,
    pub original_url: String,
    pub normalized_url: String,
    pub is_short: bool,
    pub audio_only: bool,
    pub attempts: Vec<StrategyAttempt>,
    pub progress: ProgressNormalizer,
    pub result: Option<SessionResult>,
}

impl DownloadSession {
    pub fn new(id: String, url: &str, audio_only: bool, progress: ProgressNormalizer) -> Self {
        let original_url = url.trim().to_string();
        Self {
            id,
            normalized_url: crate::utils::normalize_url(&original_url),
            is_short: crate::utils::is_short(&original_url),
            original_url,
            audio_only,
            attempts: Vec::new(),
            progress,
            result: None,
        }
    }

    pub fn current_attempt_mut(&mut self) -> Option<&mut StrategyAttempt> {
        self.attempts.last_mut()
    }
}
