//! Moves progress snapshots from a session's queue to the caller.
//!
//! The transport polls the queue on a fixed interval, forwards snapshots over
//! a bounded channel and stops after the terminal snapshot. Once the worker
//! task has finished it drains the queue one last time, so nothing the worker
//! produced is lost. If the worker died without a terminal snapshot, an error
//! snapshot is synthesized so the caller always sees exactly one.

use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use super::{ProgressQueue, ProgressState, ProgressStatus};

/// What the transport observed over a session's lifetime.
#[derive(Debug)]
pub struct RelayOutcome<T> {
    /// `None` when the worker panicked or was aborted.
    pub worker_output: Option<T>,
    pub forwarded: usize,
    pub last: Option<ProgressState>,
    pub caller_detached: bool,
}

pub struct ProgressTransport {
    session_id: String,
    queue: ProgressQueue,
    sender: mpsc::Sender<ProgressState>,
    latest: Option<watch::Sender<Option<ProgressState>>>,
    poll_interval: Duration,
    forwarded: usize,
    last: Option<ProgressState>,
    terminal_sent: bool,
    caller_detached: bool,
}

impl ProgressTransport {
    pub fn new(
        session_id: &str,
        queue: ProgressQueue,
        sender: mpsc::Sender<ProgressState>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            session_id: session_id.to_string(),
            queue,
            sender,
            latest: None,
            poll_interval,
            forwarded: 0,
            last: None,
            terminal_sent: false,
            caller_detached: false,
        }
    }

    /// Also publish every forwarded snapshot to a watch channel.
    pub fn with_latest(mut self, latest: watch::Sender<Option<ProgressState>>) -> Self {
        self.latest = Some(latest);
        self
    }

    pub async fn run<T>(mut self, mut worker: JoinHandle<T>) -> RelayOutcome<T> {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !self.terminal_sent {
            ticker.tick().await;
            if worker.is_finished() {
                break;
            }
            self.forward_queued().await;
        }

        let worker_output = match (&mut worker).await {
            Ok(output) => Some(output),
            Err(e) => {
                log::error!("💥 [TRANSPORT] Worker for session {} stopped abnormally: {}", self.session_id, e);
                None
            }
        };

        self.forward_queued().await;

        if !self.terminal_sent {
            let percent = self.last.as_ref().map(|s| s.percent).unwrap_or(0.0);
            let state = ProgressState::new(
                ProgressStatus::Error,
                percent,
                "Download worker stopped before reporting a result",
            );
            self.forward(state).await;
        }

        log::debug!("📡 [TRANSPORT] Session {} relay finished after {} snapshots", self.session_id, self.forwarded);
        RelayOutcome {
            worker_output,
            forwarded: self.forwarded,
            last: self.last,
            caller_detached: self.caller_detached,
        }
    }

    async fn forward_queued(&mut self) {
        for state in self.queue.drain() {
            self.forward(state).await;
        }
    }

    async fn forward(&mut self, state: ProgressState) {
        if self.terminal_sent {
            log::debug!("[TRANSPORT] Dropping snapshot after terminal for session {}", self.session_id);
            return;
        }
        let terminal = state.is_terminal();

        if let Some(latest) = &self.latest {
            latest.send_replace(Some(state.clone()));
        }

        if !self.caller_detached && self.sender.send(state.clone()).await.is_err() {
            log::info!("🔌 [TRANSPORT] Caller detached from session {}, download continues", self.session_id);
            self.caller_detached = true;
        }

        self.forwarded += 1;
        self.last = Some(state);
        self.terminal_sent = terminal;
    }
}
