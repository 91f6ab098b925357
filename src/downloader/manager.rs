use std::collections::HashMap;
use std::sync::Arc;
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch, Mutex, Semaphore};
use tokio::task::JoinHandle;
use crate::config::{AppConfig, ProgressConfig};
use crate::downloader::engine::FallbackEngine;
use crate::downloader::strategies::{StrategyCatalog, YtDlpExtractor};
use crate::downloader::transport::ProgressTransport;
use crate::downloader::{
    DownloadSession, FailedDownload, ProgressNormalizer, ProgressQueue, ProgressState, SessionResult,
    StrategyAttempt,
};
use crate::errors::{AppError, Result};
use crate::processing::FfmpegProcessor;
use crate::security::InputValidator;
use crate::utils::generate_session_id;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Failed)
    }
}

/// Read-only view of a session as kept in the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub original_url: String,
    pub normalized_url: String,
    pub is_short: bool,
    pub audio_only: bool,
    pub status: SessionStatus,
    pub attempts: Vec<StrategyAttempt>,
    pub latest_progress: Option<ProgressState>,
    pub result: Option<SessionResult>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
}

struct SessionRecord {
    summary: SessionSummary,
    latest: watch::Receiver<Option<ProgressState>>,
}

impl SessionRecord {
    fn snapshot(&self) -> SessionSummary {
        let mut summary = self.summary.clone();
        summary.latest_progress = self.latest.borrow().clone();
        summary
    }
}

type Registry = Arc<Mutex<HashMap<String, SessionRecord>>>;

/// The caller's side of a submitted session: a stream of progress snapshots
/// ending with exactly one `completed` or `error` snapshot.
///
/// Dropping the handle detaches from the session; the download keeps going
/// and its result stays available from the manager.
pub struct SessionHandle {
    id: String,
    progress: mpsc::Receiver<ProgressState>,
    relay: JoinHandle<()>,
}

impl SessionHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn next_progress(&mut self) -> Option<ProgressState> {
        self.progress.recv().await
    }

    /// Progress as a stream. The stream ends once the terminal snapshot has
    /// been delivered and the session's registry entry is final.
    pub fn into_stream(self) -> impl Stream<Item = ProgressState> {
        let SessionHandle { progress, relay, .. } = self;
        stream::unfold((progress, Some(relay)), |(mut rx, relay)| async move {
            match rx.recv().await {
                Some(state) => Some((state, (rx, relay))),
                None => {
                    if let Some(relay) = relay {
                        if let Err(e) = relay.await {
                            log::warn!("⚠️ [MANAGER] Progress relay ended abnormally: {}", e);
                        }
                    }
                    None
                }
            }
        })
    }

    /// Collects every snapshot until the terminal one and waits for the
    /// session's bookkeeping to settle.
    pub async fn wait(mut self) -> Result<Vec<ProgressState>> {
        let mut received = Vec::new();
        while let Some(state) = self.progress.recv().await {
            received.push(state);
        }
        self.relay
            .await
            .map_err(|e| AppError::Worker(format!("progress relay for {} failed: {}", self.id, e)))?;
        Ok(received)
    }
}

pub struct DownloadManager {
    sessions: Registry,
    engine: Arc<FallbackEngine>,
    catalog: Arc<StrategyCatalog>,
    permits: Arc<Semaphore>,
    validator: InputValidator,
    progress: ProgressConfig,
}

impl DownloadManager {
    pub fn new(engine: FallbackEngine, catalog: StrategyCatalog, config: &AppConfig) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            engine: Arc::new(engine),
            catalog: Arc::new(catalog),
            permits: Arc::new(Semaphore::new(config.max_concurrent_sessions.max(1))),
            validator: InputValidator::new(),
            progress: config.progress.clone(),
        }
    }

    /// Wires the real yt-dlp and ffmpeg collaborators from configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let extractor = Arc::new(YtDlpExtractor::from_config(config));
        let processor = Arc::new(FfmpegProcessor::from_config(config));
        let engine = FallbackEngine::new(extractor, processor, config)?;
        Ok(Self::new(engine, StrategyCatalog::default(), config))
    }

    /// Validates the request, registers a session and starts it in the
    /// background. Progress is delivered through the returned handle.
    pub async fn submit(&self, url: &str, audio_only: bool) -> Result<SessionHandle> {
        self.validator.validate_url(url)?;

        let id = generate_session_id();
        let queue = ProgressQueue::with_capacity(self.progress.queue_capacity);
        let mut session = DownloadSession::new(id.clone(), url, audio_only, ProgressNormalizer::new(queue.clone()));
        let (latest_tx, latest_rx) = watch::channel(None);

        log::info!(
            "📥 [MANAGER] Session {} queued: {} (normalized: {}, short: {}, audio only: {})",
            id, session.original_url, session.normalized_url, session.is_short, audio_only
        );

        {
            let mut sessions = self.sessions.lock().await;
            sessions.insert(
                id.clone(),
                SessionRecord {
                    summary: SessionSummary {
                        id: id.clone(),
                        original_url: session.original_url.clone(),
                        normalized_url: session.normalized_url.clone(),
                        is_short: session.is_short,
                        audio_only,
                        status: SessionStatus::Queued,
                        attempts: Vec::new(),
                        latest_progress: None,
                        result: None,
                        created_at: chrono::Utc::now(),
                        started_at: None,
                        finished_at: None,
                    },
                    latest: latest_rx,
                },
            );
        }

        let worker = {
            let engine = self.engine.clone();
            let catalog = self.catalog.clone();
            let permits = self.permits.clone();
            let sessions = self.sessions.clone();
            tokio::spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                update_record(&sessions, &session.id, |summary| {
                    summary.status = SessionStatus::Running;
                    summary.started_at = Some(chrono::Utc::now());
                })
                .await;

                let strategies = catalog.for_request(session.audio_only);
                let outcome = engine.run(&mut session, strategies).await;

                let status = if outcome.is_ok() { SessionStatus::Completed } else { SessionStatus::Failed };
                let attempts = session.attempts.clone();
                let result = session.result.clone();
                update_record(&sessions, &session.id, move |summary| {
                    summary.status = status;
                    summary.attempts = attempts;
                    summary.result = result;
                    summary.finished_at = Some(chrono::Utc::now());
                })
                .await;
            })
        };

        let (tx, rx) = mpsc::channel(self.progress.channel_capacity);
        let transport = ProgressTransport::new(&id, queue, tx, self.progress.poll_interval()).with_latest(latest_tx);
        let relay = {
            let sessions = self.sessions.clone();
            let id = id.clone();
            tokio::spawn(async move {
                let outcome = transport.run(worker).await;
                if outcome.worker_output.is_none() {
                    let error = outcome
                        .last
                        .map(|s| s.message)
                        .unwrap_or_else(|| "download worker stopped unexpectedly".to_string());
                    update_record(&sessions, &id, move |summary| {
                        if !summary.status.is_finished() {
                            summary.status = SessionStatus::Failed;
                            summary.result = Some(SessionResult::Failed(FailedDownload {
                                attempts: summary.attempts.len() as u32,
                                error,
                            }));
                            summary.finished_at = Some(chrono::Utc::now());
                        }
                    })
                    .await;
                }
            })
        };

        Ok(SessionHandle { id, progress: rx, relay })
    }

    /// The terminal result, once the session has one.
    pub async fn result(&self, session_id: &str) -> Option<SessionResult> {
        let sessions = self.sessions.lock().await;
        sessions.get(session_id).and_then(|record| record.summary.result.clone())
    }

    pub async fn get_session(&self, session_id: &str) -> Option<SessionSummary> {
        let sessions = self.sessions.lock().await;
        sessions.get(session_id).map(SessionRecord::snapshot)
    }

    /// Running sessions first, then queued, then finished ones, each group
    /// oldest first.
    pub async fn list_sessions(&self) -> Vec<SessionSummary> {
        let sessions = self.sessions.lock().await;
        let mut list: Vec<SessionSummary> = sessions.values().map(SessionRecord::snapshot).collect();

        let priority = |status: &SessionStatus| -> u8 {
            match status {
                SessionStatus::Running => 1,
                SessionStatus::Queued => 2,
                SessionStatus::Completed => 3,
                SessionStatus::Failed => 4,
            }
        };
        list.sort_by(|a, b| {
            priority(&a.status)
                .cmp(&priority(&b.status))
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        list
    }

    /// Forgets finished sessions. Returns how many were removed.
    pub async fn clear_finished(&self) -> usize {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, record| !record.summary.status.is_finished());
        before - sessions.len()
    }
}

async fn update_record<F>(sessions: &Registry, session_id: &str, update: F)
where
    F: FnOnce(&mut SessionSummary),
{
    let mut sessions = sessions.lock().await;
    if let Some(record) = sessions.get_mut(session_id) {
        update(&mut record.summary);
    }
}
