use std::path::PathBuf;
use std::sync::Arc;
use crate::config::AppConfig;
use crate::errors::{AppError, Result};
use crate::processing::{
    ArtifactValidator, ArtifactVerdict, ConversionPipeline, FileArtifact, MediaProcessor, MediaProfile,
};
use crate::utils::ensure_dir_exists;
use super::{
    AttemptOutcome, CompletedDownload, DownloadSession, FailedDownload, MediaExtractor, RawProgress,
    SessionResult, StrategyConfig, StrategyList,
};

/// Why one strategy attempt did not produce a file.
#[derive(Debug)]
struct AttemptFailure {
    outcome: AttemptOutcome,
    error: AppError,
    leftover: Option<PathBuf>,
}

impl AttemptFailure {
    fn exception(error: AppError) -> Self {
        Self { outcome: AttemptOutcome::FailedException, error, leftover: None }
    }
}

/// Runs a session's strategies in order until one yields a genuine,
/// converted file.
pub struct FallbackEngine {
    extractor: Arc<dyn MediaExtractor>,
    validator: ArtifactValidator,
    pipeline: ConversionPipeline,
    download_dir: PathBuf,
}

impl FallbackEngine {
    pub fn new(
        extractor: Arc<dyn MediaExtractor>,
        processor: Arc<dyn MediaProcessor>,
        config: &AppConfig,
    ) -> Result<Self> {
        Ok(Self {
            extractor,
            validator: ArtifactValidator::new(processor.clone(), config.validation.clone()),
            pipeline: ConversionPipeline::new(processor, &config.conversion)?,
            download_dir: config.download_path.clone(),
        })
    }

    /// Drives the session to exactly one terminal progress snapshot and a
    /// recorded result, whatever happens.
    pub async fn run(&self, session: &mut DownloadSession, strategies: &StrategyList) -> Result<CompletedDownload> {
        let outcome = self.run_strategies(session, strategies).await;

        match &outcome {
            Ok(done) => {
                session.progress.complete(&done.filename);
                session.result = Some(SessionResult::Completed(done.clone()));
                log::info!("🎉 [ENGINE] Session {} completed with '{}': {}", session.id, done.strategy, done.filename);
            }
            Err(e) => {
                let message = e.to_string();
                session.progress.fail(&message);
                session.result = Some(SessionResult::Failed(FailedDownload {
                    error: message.clone(),
                    attempts: session.attempts.len() as u32,
                }));
                log::error!("❌ [ENGINE] Session {} failed: {}", session.id, message);
            }
        }
        outcome
    }

    async fn run_strategies(&self, session: &mut DownloadSession, strategies: &StrategyList) -> Result<CompletedDownload> {
        ensure_dir_exists(&self.download_dir).await?;
        let profile = MediaProfile::for_request(session.audio_only);
        let mut last_error = String::from("no strategy was attempted");

        for strategy in strategies.iter() {
            let index = session.attempts.len() as u32 + 1;
            session.progress.begin_strategy(strategy.name());
            session.attempts.push(super::StrategyAttempt::pending(strategy.name(), index));
            log::info!("🔄 [ENGINE] Attempt {}/{} with strategy: {}", index, strategies.len(), strategy.name());

            match self.attempt(session, strategy, profile).await {
                Ok(done) => {
                    if let Some(attempt) = session.current_attempt_mut() {
                        attempt.outcome = AttemptOutcome::Succeeded;
                    }
                    return Ok(done);
                }
                Err(failure) => {
                    let message = failure.error.to_string();
                    log::warn!("⚠️ [ENGINE] Strategy '{}' {:?}: {}", strategy.name(), failure.outcome, message);
                    if let Some(path) = &failure.leftover {
                        log::warn!("📁 [ENGINE] Unconverted download kept at {:?}", path);
                    }
                    if let Some(attempt) = session.current_attempt_mut() {
                        attempt.outcome = failure.outcome;
                        attempt.error = Some(message.clone());
                        attempt.leftover_file = failure.leftover;
                    }
                    if !failure.error.is_recoverable() {
                        return Err(failure.error);
                    }
                    last_error = message;
                }
            }
        }

        Err(AppError::StrategiesExhausted {
            attempts: session.attempts.len() as u32,
            last_error,
        })
    }

    async fn attempt(
        &self,
        session: &mut DownloadSession,
        strategy: &StrategyConfig,
        profile: MediaProfile,
    ) -> std::result::Result<CompletedDownload, AttemptFailure> {
        let url = session.normalized_url.clone();

        let metadata = self
            .extractor
            .fetch_metadata(&url, strategy.client_hint())
            .await
            .map_err(AttemptFailure::exception)?;

        if !metadata.has_playable_format(session.audio_only) {
            let kind = if session.audio_only { "audio" } else { "video" };
            return Err(AttemptFailure {
                outcome: AttemptOutcome::SkippedNoVideoFormats,
                error: AppError::NoVideoFormats(format!(
                    "no playable {} formats among {} listed (storyboards only)",
                    kind,
                    metadata.formats().len()
                )),
                leftover: None,
            });
        }

        let progress = &mut session.progress;
        let mut hook = |raw: RawProgress| progress.observe(raw);
        let media = self
            .extractor
            .fetch_stream(&url, strategy, &self.download_dir, &mut hook)
            .await
            .map_err(AttemptFailure::exception)?;

        let mut artifact = FileArtifact::from_path(&media.path)
            .await
            .map_err(AttemptFailure::exception)?;

        let verdict = self
            .validator
            .inspect(&mut artifact, profile)
            .await
            .map_err(AttemptFailure::exception)?;
        if let ArtifactVerdict::Decoy(reason) = verdict {
            return Err(AttemptFailure {
                outcome: AttemptOutcome::SkippedDecoyArtifact,
                error: AppError::DecoyArtifact(reason),
                leftover: None,
            });
        }

        session.progress.converting();
        let converted = self
            .pipeline
            .convert(artifact, profile)
            .await
            .map_err(|failure| AttemptFailure {
                outcome: AttemptOutcome::FailedConversion,
                error: failure.error,
                leftover: Some(failure.original.path),
            })?;

        Ok(CompletedDownload {
            filename: converted.file_name(),
            path: converted.path,
            strategy: strategy.name().to_string(),
            size_bytes: converted.size_bytes,
            title: metadata.title,
        })
    }
}
