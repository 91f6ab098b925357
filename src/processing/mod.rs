pub mod converter;
pub mod ffmpeg;
pub mod validator;

pub use converter::{ConversionFailure, ConversionPipeline, FilenameSequencer};
pub use ffmpeg::FfmpegProcessor;
pub use validator::ArtifactValidator;

use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use crate::errors::Result;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MediaProfile {
    Video,
    Audio,
}

impl MediaProfile {
    pub fn for_request(audio_only: bool) -> Self {
        if audio_only {
            MediaProfile::Audio
        } else {
            MediaProfile::Video
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TranscodeMode {
    /// Rewrap the existing streams into the new container.
    Copy,
    /// Re-encode with the canonical codecs.
    Reencode,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StreamInfo {
    pub codec_type: String,
    pub codec_name: Option<String>,
    pub frame_count: Option<u64>,
    pub duration: Option<f64>,
}

/// Structured result of probing a media file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProbeReport {
    pub duration: Option<f64>,
    pub streams: Vec<StreamInfo>,
}

impl ProbeReport {
    /// The first stream of type video.
    pub fn primary_video_stream(&self) -> Option<&StreamInfo> {
        self.streams.iter().find(|s| s.codec_type == "video")
    }

    /// Container duration, or the longest stream duration when the container
    /// does not report one.
    pub fn total_duration(&self) -> Option<f64> {
        self.duration.or_else(|| {
            self.streams
                .iter()
                .filter_map(|s| s.duration)
                .fold(None, |max: Option<f64>, d| Some(max.map_or(d, |m| m.max(d))))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", content = "reason", rename_all = "snake_case")]
pub enum ArtifactVerdict {
    Unchecked,
    Genuine,
    Decoy(String),
}

/// A file on disk produced by the extractor or the conversion pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileArtifact {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub verdict: ArtifactVerdict,
    pub probe: Option<ProbeReport>,
}

impl FileArtifact {
    pub async fn from_path(path: &Path) -> Result<Self> {
        let metadata = tokio::fs::metadata(path).await?;
        Ok(Self {
            path: path.to_path_buf(),
            size_bytes: metadata.len(),
            verdict: ArtifactVerdict::Unchecked,
            probe: None,
        })
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    pub fn extension(&self) -> Option<String> {
        self.path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
    }
}

/// Media probing and transcoding collaborator.
#[async_trait::async_trait]
pub trait MediaProcessor: Send + Sync {
    async fn probe(&self, path: &Path) -> Result<ProbeReport>;

    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        mode: TranscodeMode,
        profile: MediaProfile,
    ) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_duration_prefers_container_value() {
        let report = ProbeReport {
            duration: Some(12.5),
            streams: vec![StreamInfo { codec_type: "video".into(), duration: Some(99.0), ..Default::default() }],
        };
        assert_eq!(report.total_duration(), Some(12.5));
    }

    #[test]
    fn total_duration_falls_back_to_longest_stream() {
        let report = ProbeReport {
            duration: None,
            streams: vec![
                StreamInfo { codec_type: "video".into(), duration: Some(3.0), ..Default::default() },
                StreamInfo { codec_type: "audio".into(), duration: Some(4.5), ..Default::default() },
            ],
        };
        assert_eq!(report.total_duration(), Some(4.5));
        assert_eq!(ProbeReport::default().total_duration(), None);
    }

    #[test]
    fn primary_video_stream_is_first_video() {
        let report = ProbeReport {
            duration: None,
            streams: vec![
                StreamInfo { codec_type: "audio".into(), codec_name: Some("aac".into()), ..Default::default() },
                StreamInfo { codec_type: "video".into(), codec_name: Some("h264".into()), ..Default::default() },
                StreamInfo { codec_type: "video".into(), codec_name: Some("mjpeg".into()), ..Default::default() },
            ],
        };
        assert_eq!(
            report.primary_video_stream().and_then(|s| s.codec_name.as_deref()),
            Some("h264")
        );
    }
}
