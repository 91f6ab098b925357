use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::AppConfig;
use crate::downloader::info::InfoService;
use crate::downloader::manager::DownloadManager;
use crate::downloader::strategies::YtDlpExtractor;
use crate::downloader::{ProgressState, SessionResult};
use crate::errors::{AppError, Result};
use crate::library::{media_type_for, DownloadLibrary};
use crate::security::InputValidator;
use crate::utils::bytes_to_mb;

// State shared by every command
pub struct AppState {
    pub config: AppConfig,
    pub download_manager: DownloadManager,
    pub info_service: InfoService,
    pub library: DownloadLibrary,
}

impl AppState {
    pub fn new(config: AppConfig) -> Result<Self> {
        let download_manager = DownloadManager::from_config(&config)?;
        let info_service = InfoService::new(Arc::new(YtDlpExtractor::from_config(&config)));
        let library = DownloadLibrary::new(config.download_path.clone());
        Ok(Self { config, download_manager, info_service, library })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub url: String,
    #[serde(default)]
    pub audio_only: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SettingsUpdate {
    pub download_path: Option<PathBuf>,
    pub max_concurrent_sessions: Option<usize>,
    pub ytdlp_path: Option<PathBuf>,
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
}

/// Runs one download to completion, handing every progress snapshot to
/// `on_progress` as it arrives.
pub async fn download_video<F>(
    state: &AppState,
    request: DownloadRequest,
    mut on_progress: F,
) -> Result<serde_json::Value>
where
    F: FnMut(&ProgressState),
{
    let handle = state.download_manager.submit(&request.url, request.audio_only).await?;
    let session_id = handle.id().to_string();

    let mut progress = Box::pin(handle.into_stream());
    while let Some(state) = progress.next().await {
        on_progress(&state);
    }

    let session = state
        .download_manager
        .get_session(&session_id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("session {}", session_id)))?;

    match session.result {
        Some(SessionResult::Completed(done)) => Ok(serde_json::json!({
            "status": "success",
            "session_id": session_id,
            "filename": done.filename,
            "path": done.path,
            "title": done.title,
            "strategy": done.strategy,
            "size_mb": bytes_to_mb(done.size_bytes),
            "media_type": media_type_for(&done.filename),
            "is_short": session.is_short,
            "attempts": session.attempts,
        })),
        Some(SessionResult::Failed(failed)) => Err(AppError::StrategiesExhausted {
            attempts: failed.attempts,
            last_error: failed.error,
        }),
        None => Err(AppError::Worker(format!("session {} ended without a result", session_id))),
    }
}

pub async fn video_info(state: &AppState, url: &str) -> Result<serde_json::Value> {
    let summary = state.info_service.info(url).await?;
    Ok(serde_json::to_value(summary)?)
}

pub async fn diagnose_url(state: &AppState, url: &str) -> Result<serde_json::Value> {
    let report = state.info_service.diagnose(url).await;
    Ok(serde_json::to_value(report)?)
}

pub async fn list_downloads(state: &AppState) -> Result<serde_json::Value> {
    let listing = state.library.list().await?;
    Ok(serde_json::to_value(listing)?)
}

pub async fn delete_download(state: &AppState, filename: &str) -> Result<serde_json::Value> {
    state.library.delete(filename).await?;
    Ok(serde_json::json!({
        "status": "success",
        "message": format!("File {} deleted", filename),
    }))
}

pub async fn get_settings(state: &AppState) -> Result<serde_json::Value> {
    Ok(serde_json::to_value(&state.config)?)
}

/// Applies the update to a copy of `config`, validates it and writes it to
/// `config_path`, or to the default location when none is given.
pub fn update_settings(config: &AppConfig, update: SettingsUpdate, config_path: Option<&Path>) -> Result<AppConfig> {
    let validator = InputValidator::new();
    let mut config = config.clone();

    if let Some(path) = update.download_path {
        validator.validate_download_path(&path)?;
        config.download_path = path;
    }
    if let Some(max) = update.max_concurrent_sessions {
        config.max_concurrent_sessions = max;
    }
    if let Some(path) = update.ytdlp_path {
        config.tools.ytdlp = Some(path);
    }
    if let Some(path) = update.ffmpeg_path {
        config.tools.ffmpeg = Some(path);
    }
    if let Some(path) = update.ffprobe_path {
        config.tools.ffprobe = Some(path);
    }

    config.validate()?;
    match config_path {
        Some(path) => config.save_to(path)?,
        None => config.save()?,
    }
    log::info!("⚙️ [CONFIG] Settings updated");
    Ok(config)
}
