//! Decoy detection for freshly downloaded files.
//!
//! Some player clients hand out a placeholder instead of the real media: a
//! tiny file, a still image wrapped in a video container or a clip only a
//! few seconds long. Such a file is deleted on the spot so the engine can
//! move on to the next strategy.

use std::sync::Arc;
use crate::config::ValidationConfig;
use crate::errors::Result;
use crate::utils::bytes_to_mb;
use super::{ArtifactVerdict, FileArtifact, MediaProcessor, MediaProfile, ProbeReport};

pub struct ArtifactValidator {
    processor: Arc<dyn MediaProcessor>,
    rules: ValidationConfig,
}

impl ArtifactValidator {
    pub fn new(processor: Arc<dyn MediaProcessor>, rules: ValidationConfig) -> Self {
        Self { processor, rules }
    }

    /// Classifies the artifact, records the verdict on it and removes the file
    /// when it is a decoy.
    pub async fn inspect(&self, artifact: &mut FileArtifact, profile: MediaProfile) -> Result<ArtifactVerdict> {
        artifact.size_bytes = tokio::fs::metadata(&artifact.path).await?.len();

        let verdict = self.classify(artifact, profile).await;
        if let ArtifactVerdict::Decoy(reason) = &verdict {
            log::warn!("🚫 [VALIDATE] Rejected {:?}: {}", artifact.path, reason);
            if let Err(e) = tokio::fs::remove_file(&artifact.path).await {
                log::warn!("⚠️ [VALIDATE] Could not delete decoy {:?}: {}", artifact.path, e);
            }
        } else {
            log::info!("✅ [VALIDATE] Accepted {:?} ({:.2} MB)", artifact.path, bytes_to_mb(artifact.size_bytes));
        }

        artifact.verdict = verdict.clone();
        Ok(verdict)
    }

    async fn classify(&self, artifact: &mut FileArtifact, profile: MediaProfile) -> ArtifactVerdict {
        if artifact.size_bytes < self.rules.min_file_size_bytes {
            return ArtifactVerdict::Decoy(format!(
                "file too small ({:.2} MB, at least {:.2} MB expected)",
                bytes_to_mb(artifact.size_bytes),
                bytes_to_mb(self.rules.min_file_size_bytes)
            ));
        }

        let report = match self.processor.probe(&artifact.path).await {
            Ok(report) => report,
            Err(e) => {
                log::warn!("⚠️ [VALIDATE] Probe failed for {:?}, accepting file: {}", artifact.path, e);
                return ArtifactVerdict::Genuine;
            }
        };

        let verdict = self.check_report(&report, profile);
        artifact.probe = Some(report);
        verdict
    }

    fn check_report(&self, report: &ProbeReport, profile: MediaProfile) -> ArtifactVerdict {
        if profile == MediaProfile::Video {
            if let Some(stream) = report.primary_video_stream() {
                let codec = stream.codec_name.as_deref().unwrap_or_default();
                let frames = stream.frame_count.unwrap_or(0);
                let still_image = self
                    .rules
                    .still_image_codecs
                    .iter()
                    .any(|c| c.eq_ignore_ascii_case(codec));
                if still_image && frames < self.rules.min_frame_count {
                    return ArtifactVerdict::Decoy(format!(
                        "still image disguised as video ({} codec, {} frames)",
                        codec, frames
                    ));
                }
            }
        }

        if let Some(duration) = report.total_duration() {
            if duration < self.rules.min_duration_secs {
                return ArtifactVerdict::Decoy(format!("duration too short ({:.1}s)", duration));
            }
        }

        ArtifactVerdict::Genuine
    }
}
