use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use regex::Regex;
use crate::config::ConversionConfig;
use crate::errors::{AppError, Result};
use super::{FileArtifact, MediaProcessor, MediaProfile, TranscodeMode};

type DirectoryLocks = Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>;

fn directory_lock(dir: &Path) -> Arc<tokio::sync::Mutex<()>> {
    static LOCKS: OnceLock<DirectoryLocks> = OnceLock::new();
    let key = std::fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf());
    let mut locks = LOCKS
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    locks.entry(key).or_default().clone()
}

/// Hands out `<prefix>_<N>.<ext>` names within a directory. `N` is one more
/// than the highest number already present, across every extension.
///
/// A name is reserved by creating an empty placeholder file while holding a
/// process-wide lock for the directory, so concurrent sessions writing into
/// the same directory never receive the same name.
#[derive(Debug, Clone)]
pub struct FilenameSequencer {
    prefix: String,
    pattern: Regex,
}

/// A placeholder file created for a canonical name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservedName {
    pub path: PathBuf,
    pub number: u64,
}

impl FilenameSequencer {
    pub fn new(prefix: &str) -> Result<Self> {
        let pattern = Regex::new(&format!(r"^{}_(\d+)\.\w+$", regex::escape(prefix)))
            .map_err(|e| AppError::Validation(format!("invalid filename prefix '{}': {}", prefix, e)))?;
        Ok(Self { prefix: prefix.to_string(), pattern })
    }

    /// Scans `dir` and returns the next free sequence number.
    pub async fn next_number(&self, dir: &Path) -> Result<u64> {
        let mut highest = 0u64;
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(n) = self
                .pattern
                .captures(&name)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse::<u64>().ok())
            {
                highest = highest.max(n);
            }
        }
        Ok(highest + 1)
    }

    pub async fn reserve(&self, dir: &Path, extension: &str) -> Result<ReservedName> {
        let lock = directory_lock(dir);
        let _guard = lock.lock().await;

        let mut number = self.next_number(dir).await?;
        loop {
            let path = dir.join(format!("{}_{}.{}", self.prefix, number, extension));
            match tokio::fs::OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(_) => {
                    log::debug!("📝 [CONVERT] Reserved {:?}", path);
                    return Ok(ReservedName { path, number });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => number += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Conversion failed; the downloaded source is still on disk.
#[derive(Debug)]
pub struct ConversionFailure {
    pub original: FileArtifact,
    pub error: AppError,
}

/// Moves a validated artifact to its canonical container and name.
pub struct ConversionPipeline {
    processor: Arc<dyn MediaProcessor>,
    sequencer: FilenameSequencer,
    video_container: String,
    audio_container: String,
}

impl ConversionPipeline {
    pub fn new(processor: Arc<dyn MediaProcessor>, config: &ConversionConfig) -> Result<Self> {
        Ok(Self {
            processor,
            sequencer: FilenameSequencer::new(&config.filename_prefix)?,
            video_container: config.video_container.to_lowercase(),
            audio_container: config.audio_container.to_lowercase(),
        })
    }

    pub fn container_for(&self, profile: MediaProfile) -> &str {
        match profile {
            MediaProfile::Video => &self.video_container,
            MediaProfile::Audio => &self.audio_container,
        }
    }

    /// Produces the canonical file next to the source. The source is removed
    /// on success and left untouched on failure.
    pub async fn convert(
        &self,
        artifact: FileArtifact,
        profile: MediaProfile,
    ) -> std::result::Result<FileArtifact, ConversionFailure> {
        match self.convert_inner(&artifact, profile).await {
            Ok(converted) => Ok(converted),
            Err(error) => {
                log::error!("❌ [CONVERT] Conversion of {:?} failed, keeping source: {}", artifact.path, error);
                Err(ConversionFailure { original: artifact, error })
            }
        }
    }

    async fn convert_inner(&self, artifact: &FileArtifact, profile: MediaProfile) -> Result<FileArtifact> {
        let dir = artifact
            .path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| AppError::Conversion(format!("{:?} has no parent directory", artifact.path)))?;
        let container = self.container_for(profile).to_string();
        let reserved = self.sequencer.reserve(&dir, &container).await?;

        let already_canonical = artifact
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case(&container))
            .unwrap_or(false);

        let outcome = if already_canonical {
            log::info!("📦 [CONVERT] Already {}, renaming to {:?}", container, reserved.path);
            tokio::fs::rename(&artifact.path, &reserved.path).await.map_err(AppError::from)
        } else {
            self.transcode_with_fallback(&artifact.path, &reserved.path, profile).await
        };

        if let Err(e) = outcome {
            if let Err(cleanup) = tokio::fs::remove_file(&reserved.path).await {
                log::warn!("⚠️ [CONVERT] Could not remove placeholder {:?}: {}", reserved.path, cleanup);
            }
            return Err(e);
        }

        if !already_canonical {
            if let Err(e) = tokio::fs::remove_file(&artifact.path).await {
                log::warn!("⚠️ [CONVERT] Could not remove source {:?}: {}", artifact.path, e);
            }
        }

        let mut converted = FileArtifact::from_path(&reserved.path).await?;
        converted.verdict = artifact.verdict.clone();
        converted.probe = artifact.probe.clone();
        log::info!("✅ [CONVERT] Final file: {:?} ({} bytes)", converted.path, converted.size_bytes);
        Ok(converted)
    }

    async fn transcode_with_fallback(&self, input: &Path, output: &Path, profile: MediaProfile) -> Result<()> {
        let copy = self.processor.transcode(input, output, TranscodeMode::Copy, profile).await;
        match copy {
            Ok(()) if non_empty(output).await => return Ok(()),
            Ok(()) => log::warn!("⚠️ [CONVERT] Stream copy produced no output, re-encoding"),
            Err(e) => log::warn!("⚠️ [CONVERT] Stream copy failed ({}), re-encoding", e),
        }

        self.processor.transcode(input, output, TranscodeMode::Reencode, profile).await?;
        if non_empty(output).await {
            Ok(())
        } else {
            Err(AppError::Conversion(format!("re-encode produced an empty file at {:?}", output)))
        }
    }
}

async fn non_empty(path: &Path) -> bool {
    tokio::fs::metadata(path).await.map(|m| m.len() > 0).unwrap_or(false)
}
