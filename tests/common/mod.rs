#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use clipfetch::config::AppConfig;
use clipfetch::downloader::strategies::{StrategyCatalog, StrategyConfig, StrategyList};
use clipfetch::downloader::{
    DownloadedMedia, FormatInfo, MediaExtractor, MediaMetadata, ProgressHook, ProgressState, RawProgress,
};
use clipfetch::errors::{AppError, Result};
use clipfetch::processing::{MediaProcessor, MediaProfile, ProbeReport, StreamInfo, TranscodeMode};

pub const MB: usize = 1024 * 1024;

/// What the fake extractor does for one strategy attempt.
#[derive(Debug, Clone)]
pub enum Step {
    MetadataFails(String),
    StoryboardsOnly,
    StreamFails(String),
    Produces { file_name: String, bytes: usize },
}

pub fn produces(file_name: &str, bytes: usize) -> Step {
    Step::Produces { file_name: file_name.to_string(), bytes }
}

fn format(id: &str, vcodec: &str, acodec: &str) -> FormatInfo {
    FormatInfo {
        format_id: id.to_string(),
        vcodec: Some(vcodec.to_string()),
        acodec: Some(acodec.to_string()),
        ..Default::default()
    }
}

pub fn real_metadata() -> MediaMetadata {
    MediaMetadata {
        id: "abcdefghijk".into(),
        title: Some("Test Clip".into()),
        duration: Some(212.0),
        formats: Some(vec![
            format("sb0", "none", "none"),
            format("140", "none", "mp4a.40.2"),
            format("137", "avc1.640028", "none"),
            format("18", "avc1.42001E", "mp4a.40.2"),
        ]),
        ..Default::default()
    }
}

pub fn storyboard_metadata() -> MediaMetadata {
    MediaMetadata {
        id: "abcdefghijk".into(),
        title: Some("Test Clip".into()),
        formats: Some(vec![format("sb0", "none", "none"), format("sb1", "none", "none")]),
        ..Default::default()
    }
}

/// Scripted extractor: each strategy attempt consumes one [`Step`].
pub struct FakeExtractor {
    steps: Mutex<VecDeque<Step>>,
    pub metadata_hints: Mutex<Vec<Option<String>>>,
    pub streamed: Mutex<Vec<String>>,
}

impl FakeExtractor {
    pub fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            metadata_hints: Mutex::new(Vec::new()),
            streamed: Mutex::new(Vec::new()),
        })
    }

    pub fn streamed(&self) -> Vec<String> {
        self.streamed.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaExtractor for FakeExtractor {
    async fn fetch_metadata(&self, _url: &str, client_hint: Option<&str>) -> Result<MediaMetadata> {
        self.metadata_hints.lock().unwrap().push(client_hint.map(str::to_string));
        let mut steps = self.steps.lock().unwrap();
        match steps.front().cloned() {
            Some(Step::MetadataFails(msg)) => {
                steps.pop_front();
                Err(AppError::Extraction(msg))
            }
            Some(Step::StoryboardsOnly) => {
                steps.pop_front();
                Ok(storyboard_metadata())
            }
            Some(_) => Ok(real_metadata()),
            None => Err(AppError::Extraction("no scripted step left".into())),
        }
    }

    async fn fetch_stream(
        &self,
        _url: &str,
        strategy: &StrategyConfig,
        output_dir: &Path,
        progress: ProgressHook<'_>,
    ) -> Result<DownloadedMedia> {
        self.streamed.lock().unwrap().push(strategy.name().to_string());
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::StreamFails(msg)) => {
                progress(RawProgress::Downloading {
                    downloaded_bytes: 10,
                    total_bytes: Some(100),
                    speed: Some(1000.0),
                    eta: Some(3),
                    filename: None,
                });
                Err(AppError::Extraction(msg))
            }
            Some(Step::Produces { file_name, bytes }) => {
                let total = bytes as u64;
                for quarter in 0..=4u64 {
                    progress(RawProgress::Downloading {
                        downloaded_bytes: total * quarter / 4,
                        total_bytes: Some(total),
                        speed: Some(2.0 * MB as f64),
                        eta: Some(4 - quarter),
                        filename: Some(file_name.clone()),
                    });
                }
                let path = output_dir.join(&file_name);
                tokio::fs::write(&path, vec![7u8; bytes]).await?;
                progress(RawProgress::Finished { filename: Some(file_name) });
                Ok(DownloadedMedia { path })
            }
            other => Err(AppError::Extraction(format!("unexpected step {:?}", other))),
        }
    }

    async fn version(&self) -> Result<String> {
        Ok("2024.01.01".into())
    }

    fn get_name(&self) -> &str {
        "fake"
    }
}

pub fn genuine_report() -> ProbeReport {
    ProbeReport {
        duration: Some(212.0),
        streams: vec![
            StreamInfo {
                codec_type: "video".into(),
                codec_name: Some("h264".into()),
                frame_count: Some(6360),
                duration: Some(212.0),
            },
            StreamInfo { codec_type: "audio".into(), codec_name: Some("aac".into()), ..Default::default() },
        ],
    }
}

pub fn still_image_report(frames: u64, duration: f64) -> ProbeReport {
    ProbeReport {
        duration: Some(duration),
        streams: vec![StreamInfo {
            codec_type: "video".into(),
            codec_name: Some("mjpeg".into()),
            frame_count: Some(frames),
            duration: Some(duration),
        }],
    }
}

/// Processor whose probe answers come from a per-file-name table and whose
/// transcodes copy bytes.
#[derive(Default)]
pub struct FakeProcessor {
    pub probes: Mutex<HashMap<String, ProbeReport>>,
    pub fail_copy: bool,
    pub fail_all: bool,
    pub transcodes: Mutex<Vec<(TranscodeMode, PathBuf)>>,
}

impl FakeProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_copy() -> Self {
        Self { fail_copy: true, ..Self::default() }
    }

    pub fn failing_all() -> Self {
        Self { fail_all: true, ..Self::default() }
    }

    pub fn with_probe(self, file_name: &str, report: ProbeReport) -> Self {
        self.probes.lock().unwrap().insert(file_name.to_string(), report);
        self
    }

    pub fn transcode_modes(&self) -> Vec<TranscodeMode> {
        self.transcodes.lock().unwrap().iter().map(|(mode, _)| *mode).collect()
    }
}

#[async_trait]
impl MediaProcessor for FakeProcessor {
    async fn probe(&self, path: &Path) -> Result<ProbeReport> {
        let name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        Ok(self.probes.lock().unwrap().get(&name).cloned().unwrap_or_else(genuine_report))
    }

    async fn transcode(&self, input: &Path, output: &Path, mode: TranscodeMode, _profile: MediaProfile) -> Result<()> {
        self.transcodes.lock().unwrap().push((mode, output.to_path_buf()));
        if self.fail_all || (self.fail_copy && mode == TranscodeMode::Copy) {
            return Err(AppError::Conversion(format!("{:?} failed", mode)));
        }
        tokio::fs::copy(input, output).await?;
        Ok(())
    }
}

pub fn test_config(dir: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.download_path = dir.to_path_buf();
    config.progress.poll_interval_ms = 5;
    config
}

pub fn strategies(names: &[&str]) -> StrategyList {
    StrategyList::new(names.iter().map(|n| StrategyConfig::new(n, "best").with_client_hint(n)).collect()).unwrap()
}

pub fn audio_strategies() -> StrategyList {
    StrategyList::new(vec![StrategyConfig::new("Best Audio", "ba/best").audio_only()]).unwrap()
}

pub fn catalog(names: &[&str]) -> StrategyCatalog {
    StrategyCatalog::new(strategies(names), audio_strategies()).unwrap()
}

pub fn assert_well_formed(events: &[ProgressState]) {
    assert!(!events.is_empty(), "no progress was reported");
    for pair in events.windows(2) {
        assert!(
            pair[1].percent >= pair[0].percent,
            "percent regressed from {} to {}",
            pair[0].percent,
            pair[1].percent
        );
    }
    assert_eq!(events.iter().filter(|s| s.is_terminal()).count(), 1);
    assert!(events.last().map(|s| s.is_terminal()).unwrap_or(false));
}
