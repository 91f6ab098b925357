//! Monotonic, strategy-spanning progress reporting.
//!
//! The extractor reports raw byte counts per attempt, and those counts restart
//! from zero whenever the engine falls back to another strategy. The
//! [`ProgressNormalizer`] folds them into a single percentage that never goes
//! backwards for the lifetime of a session and publishes every snapshot into a
//! [`ProgressQueue`] that the transport drains.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use crate::utils::{format_eta, format_speed};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Starting,
    Downloading,
    Processing,
    Converting,
    Completed,
    Error,
}

impl ProgressStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressStatus::Completed | ProgressStatus::Error)
    }
}

/// One immutable progress snapshot. A new value is built for every update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressState {
    pub status: ProgressStatus,
    pub percent: f64,
    pub downloaded_bytes: Option<u64>,
    pub total_bytes: Option<u64>,
    pub speed: Option<String>,
    pub eta: Option<String>,
    pub current_strategy: Option<String>,
    pub message: String,
    pub filename: Option<String>,
}

impl ProgressState {
    pub fn new(status: ProgressStatus, percent: f64, message: impl Into<String>) -> Self {
        Self {
            status,
            percent: round_percent(percent),
            downloaded_bytes: None,
            total_bytes: None,
            speed: None,
            eta: None,
            current_strategy: None,
            message: message.into(),
            filename: None,
        }
    }

    pub fn with_strategy(mut self, strategy: Option<&str>) -> Self {
        self.current_strategy = strategy.map(str::to_string);
        self
    }

    pub fn with_filename(mut self, filename: Option<String>) -> Self {
        self.filename = filename;
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Raw event as reported by the extraction collaborator's progress hook.
#[derive(Debug, Clone, PartialEq)]
pub enum RawProgress {
    Downloading {
        downloaded_bytes: u64,
        total_bytes: Option<u64>,
        speed: Option<f64>,
        eta: Option<u64>,
        filename: Option<String>,
    },
    /// The transfer is done and the extractor moves on to post-processing.
    Finished { filename: Option<String> },
}

impl RawProgress {
    pub fn raw_percent(&self) -> f64 {
        match self {
            RawProgress::Downloading { downloaded_bytes, total_bytes: Some(total), .. } if *total > 0 => {
                (*downloaded_bytes as f64 / *total as f64 * 100.0).clamp(0.0, 100.0)
            }
            RawProgress::Downloading { .. } => 0.0,
            RawProgress::Finished { .. } => 100.0,
        }
    }
}

fn round_percent(percent: f64) -> f64 {
    (percent.clamp(0.0, 100.0) * 100.0).round() / 100.0
}

#[derive(Debug)]
struct QueueState {
    items: VecDeque<ProgressState>,
    capacity: usize,
    coalesced: u64,
}

/// Single-producer snapshot queue shared between a session worker and its
/// transport. The lock is only ever held for a push or a drain.
///
/// The queue is bounded: once `capacity` snapshots are waiting, a new
/// `downloading` snapshot replaces a trailing `downloading` snapshot instead
/// of growing the queue. Status transitions are always appended.
#[derive(Debug, Clone)]
pub struct ProgressQueue {
    inner: Arc<Mutex<QueueState>>,
}

impl ProgressQueue {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity.min(256)),
                capacity,
                coalesced: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn push(&self, state: ProgressState) {
        let mut queue = self.lock();
        if queue.items.len() >= queue.capacity && state.status == ProgressStatus::Downloading {
            if let Some(last) = queue.items.back_mut() {
                if last.status == ProgressStatus::Downloading {
                    *last = state;
                    queue.coalesced += 1;
                    return;
                }
            }
        }
        queue.items.push_back(state);
    }

    /// Takes every queued snapshot, oldest first.
    pub fn drain(&self) -> Vec<ProgressState> {
        self.lock().items.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of intermediate `downloading` snapshots superseded while full.
    pub fn coalesced(&self) -> u64 {
        self.lock().coalesced
    }
}

/// Per-session progress state machine. Owned by the session and lent to the
/// extractor's progress hook for the duration of each download call.
#[derive(Debug)]
pub struct ProgressNormalizer {
    queue: ProgressQueue,
    max_percent_reached: f64,
    attempt_count: u32,
    current_strategy: Option<String>,
    last: Option<ProgressState>,
    sealed: bool,
}

impl ProgressNormalizer {
    pub fn new(queue: ProgressQueue) -> Self {
        Self {
            queue,
            max_percent_reached: 0.0,
            attempt_count: 0,
            current_strategy: None,
            last: None,
            sealed: false,
        }
    }

    pub fn queue(&self) -> &ProgressQueue {
        &self.queue
    }

    pub fn max_percent_reached(&self) -> f64 {
        self.max_percent_reached
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn current_strategy(&self) -> Option<&str> {
        self.current_strategy.as_deref()
    }

    pub fn last(&self) -> Option<&ProgressState> {
        self.last.as_ref()
    }

    /// True once a terminal snapshot has been emitted.
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Registers the start of a strategy attempt. Only the very first attempt
    /// of the session announces itself with a `starting` snapshot.
    pub fn begin_strategy(&mut self, name: &str) {
        if self.sealed {
            return;
        }
        self.attempt_count += 1;
        self.current_strategy = Some(name.to_string());

        if self.attempt_count == 1 {
            let state = ProgressState::new(
                ProgressStatus::Starting,
                0.0,
                format!("Starting download with: {}", name),
            )
            .with_strategy(Some(name));
            self.emit(state);
        }
    }

    /// Folds a raw extractor event into the session's monotonic progress.
    pub fn observe(&mut self, raw: RawProgress) {
        if self.sealed {
            return;
        }

        match raw {
            RawProgress::Downloading { downloaded_bytes, total_bytes, speed, eta, ref filename } => {
                let percent = self.remap(raw.raw_percent());
                let state = ProgressState {
                    status: ProgressStatus::Downloading,
                    percent: round_percent(percent),
                    downloaded_bytes: Some(downloaded_bytes),
                    total_bytes,
                    speed: format_speed(speed),
                    eta: format_eta(eta),
                    current_strategy: self.current_strategy.clone(),
                    message: format!("Downloading: {:.1}%", percent),
                    filename: filename.clone(),
                };
                self.emit(state);
            }
            RawProgress::Finished { filename } => {
                self.max_percent_reached = 100.0;
                let state = ProgressState::new(
                    ProgressStatus::Processing,
                    100.0,
                    "Download finished, processing file...",
                )
                .with_strategy(self.current_strategy.as_deref())
                .with_filename(filename);
                self.emit(state);
            }
        }
    }

    /// Announces that the validated artifact is being converted.
    pub fn converting(&mut self) {
        if self.sealed {
            return;
        }
        let state = ProgressState::new(
            ProgressStatus::Converting,
            self.max_percent_reached,
            "Converting to the final format...",
        )
        .with_strategy(self.current_strategy.as_deref());
        self.emit(state);
    }

    /// Emits the terminal success snapshot and freezes the normalizer.
    pub fn complete(&mut self, filename: &str) {
        if self.sealed {
            return;
        }
        self.max_percent_reached = 100.0;
        let state = ProgressState::new(
            ProgressStatus::Completed,
            100.0,
            "Download completed successfully!",
        )
        .with_strategy(self.current_strategy.as_deref())
        .with_filename(Some(filename.to_string()));
        self.emit(state);
        self.sealed = true;
    }

    /// Emits the terminal failure snapshot. The percentage stays where it
    /// was so the sequence never regresses.
    pub fn fail(&mut self, message: &str) {
        if self.sealed {
            return;
        }
        let state = ProgressState::new(ProgressStatus::Error, self.max_percent_reached, message)
            .with_strategy(self.current_strategy.as_deref());
        self.emit(state);
        self.sealed = true;
    }

    fn remap(&mut self, raw_percent: f64) -> f64 {
        let candidate = if self.attempt_count <= 1 {
            raw_percent
        } else {
            let remaining = 100.0 - self.max_percent_reached;
            self.max_percent_reached + raw_percent * remaining / 100.0
        };

        if candidate > self.max_percent_reached {
            self.max_percent_reached = candidate;
        }
        self.max_percent_reached
    }

    fn emit(&mut self, state: ProgressState) {
        self.queue.push(state.clone());
        self.last = Some(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn downloading(done: u64, total: Option<u64>) -> RawProgress {
        RawProgress::Downloading {
            downloaded_bytes: done,
            total_bytes: total,
            speed: Some(2048.0),
            eta: Some(65),
            filename: None,
        }
    }

    fn percents(queue: &ProgressQueue) -> Vec<f64> {
        queue.drain().into_iter().map(|s| s.percent).collect()
    }

    #[test]
    fn first_strategy_emits_single_starting_event() {
        let queue = ProgressQueue::with_capacity(16);
        let mut normalizer = ProgressNormalizer::new(queue.clone());
        normalizer.begin_strategy("A");
        normalizer.begin_strategy("B");

        let events = queue.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, ProgressStatus::Starting);
        assert_eq!(events[0].percent, 0.0);
        assert_eq!(events[0].current_strategy.as_deref(), Some("A"));
        assert_eq!(normalizer.attempt_count(), 2);
        assert_eq!(normalizer.current_strategy(), Some("B"));
    }

    #[test]
    fn first_attempt_uses_raw_percent_with_floor() {
        let queue = ProgressQueue::with_capacity(16);
        let mut normalizer = ProgressNormalizer::new(queue.clone());
        normalizer.begin_strategy("A");
        queue.drain();

        normalizer.observe(downloading(25, Some(100)));
        normalizer.observe(downloading(10, Some(100)));
        normalizer.observe(downloading(40, Some(100)));

        assert_eq!(percents(&queue), vec![25.0, 25.0, 40.0]);
    }

    #[test]
    fn later_attempts_continue_from_the_maximum() {
        let queue = ProgressQueue::with_capacity(16);
        let mut normalizer = ProgressNormalizer::new(queue.clone());
        normalizer.begin_strategy("A");
        normalizer.observe(downloading(50, Some(100)));
        normalizer.begin_strategy("B");
        queue.drain();

        normalizer.observe(downloading(0, Some(100)));
        normalizer.observe(downloading(50, Some(100)));

        let events = queue.drain();
        assert_eq!(events[0].percent, 50.0);
        assert_eq!(events[1].percent, 75.0);
        assert_eq!(events[1].current_strategy.as_deref(), Some("B"));
    }

    #[test]
    fn unknown_total_reports_zero_without_regressing() {
        let queue = ProgressQueue::with_capacity(16);
        let mut normalizer = ProgressNormalizer::new(queue.clone());
        normalizer.begin_strategy("A");
        normalizer.observe(downloading(30, Some(100)));
        normalizer.observe(downloading(999, None));

        let last = normalizer.last().cloned().unwrap();
        assert_eq!(last.percent, 30.0);
        assert_eq!(last.total_bytes, None);
    }

    #[test]
    fn finished_forces_processing_at_100() {
        let queue = ProgressQueue::with_capacity(16);
        let mut normalizer = ProgressNormalizer::new(queue.clone());
        normalizer.begin_strategy("A");
        normalizer.observe(downloading(10, Some(100)));
        normalizer.observe(RawProgress::Finished { filename: Some("clip.webm".into()) });

        let last = normalizer.last().cloned().unwrap();
        assert_eq!(last.status, ProgressStatus::Processing);
        assert_eq!(last.percent, 100.0);
        assert_eq!(normalizer.max_percent_reached(), 100.0);
    }

    #[test]
    fn speed_and_eta_are_formatted() {
        let queue = ProgressQueue::with_capacity(16);
        let mut normalizer = ProgressNormalizer::new(queue.clone());
        normalizer.begin_strategy("A");
        normalizer.observe(downloading(1, Some(4)));

        let last = normalizer.last().cloned().unwrap();
        assert_eq!(last.speed.as_deref(), Some("2.00 KB/s"));
        assert_eq!(last.eta.as_deref(), Some("1m 5s"));
        assert_eq!(last.downloaded_bytes, Some(1));
    }

    #[test]
    fn nothing_is_emitted_after_completion() {
        let queue = ProgressQueue::with_capacity(16);
        let mut normalizer = ProgressNormalizer::new(queue.clone());
        normalizer.begin_strategy("A");
        normalizer.complete("video_1.mp4");
        normalizer.observe(downloading(1, Some(100)));
        normalizer.fail("late failure");
        normalizer.begin_strategy("B");

        let events = queue.drain();
        assert_eq!(events.last().map(|s| s.status), Some(ProgressStatus::Completed));
        assert_eq!(events.iter().filter(|s| s.is_terminal()).count(), 1);
        assert!(normalizer.is_sealed());
    }

    #[test]
    fn failure_keeps_the_reached_percent() {
        let queue = ProgressQueue::with_capacity(16);
        let mut normalizer = ProgressNormalizer::new(queue.clone());
        normalizer.begin_strategy("A");
        normalizer.observe(downloading(60, Some(100)));
        normalizer.fail("all strategies failed");

        let last = normalizer.last().cloned().unwrap();
        assert_eq!(last.status, ProgressStatus::Error);
        assert_eq!(last.percent, 60.0);
    }

    #[test]
    fn full_queue_coalesces_only_downloading_snapshots() {
        let queue = ProgressQueue::with_capacity(2);
        queue.push(ProgressState::new(ProgressStatus::Starting, 0.0, "s"));
        queue.push(ProgressState::new(ProgressStatus::Downloading, 10.0, "d"));
        queue.push(ProgressState::new(ProgressStatus::Downloading, 20.0, "d"));
        queue.push(ProgressState::new(ProgressStatus::Processing, 100.0, "p"));

        let events = queue.drain();
        assert_eq!(events.len(), 3);
        assert_eq!(events[1].percent, 20.0);
        assert_eq!(events[2].status, ProgressStatus::Processing);
        assert_eq!(queue.coalesced(), 1);
    }
}
