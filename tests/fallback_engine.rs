mod common;

use std::sync::Arc;

use clipfetch::downloader::{
    AttemptOutcome, DownloadSession, ProgressNormalizer, ProgressQueue, ProgressState, ProgressStatus,
    SessionResult, StrategyList,
};
use clipfetch::errors::AppError;
use clipfetch::processing::TranscodeMode;
use clipfetch::FallbackEngine;
use common::*;

const URL: &str = "https://www.youtube.com/watch?v=abcdefghijk";

struct Run {
    session: DownloadSession,
    events: Vec<ProgressState>,
    result: clipfetch::Result<clipfetch::downloader::CompletedDownload>,
}

async fn run_engine(
    dir: &std::path::Path,
    extractor: Arc<FakeExtractor>,
    processor: Arc<FakeProcessor>,
    list: &StrategyList,
    audio_only: bool,
) -> Run {
    let engine = FallbackEngine::new(extractor, processor, &test_config(dir)).unwrap();
    let queue = ProgressQueue::with_capacity(1024);
    let mut session = DownloadSession::new("test".into(), URL, audio_only, ProgressNormalizer::new(queue.clone()));
    let result = engine.run(&mut session, list).await;
    Run { session, events: queue.drain(), result }
}

fn outcomes(session: &DownloadSession) -> Vec<AttemptOutcome> {
    session.attempts.iter().map(|a| a.outcome).collect()
}

#[tokio::test]
async fn falls_through_failed_strategies_to_the_third() {
    let dir = tempfile::tempdir().unwrap();
    let extractor = FakeExtractor::new(vec![
        Step::MetadataFails("HTTP Error 403: Forbidden".into()),
        Step::StreamFails("Sign in to confirm you're not a bot".into()),
        produces("Test Clip [abcdefghijk].mp4", 2 * MB),
    ]);
    let processor = Arc::new(FakeProcessor::new());

    let run = run_engine(dir.path(), extractor.clone(), processor, &strategies(&["S1", "S2", "S3"]), false).await;

    let done = run.result.unwrap();
    assert_eq!(done.strategy, "S3");
    assert_eq!(done.filename, "video_1.mp4");
    assert_eq!(
        outcomes(&run.session),
        vec![AttemptOutcome::FailedException, AttemptOutcome::FailedException, AttemptOutcome::Succeeded]
    );
    assert_eq!(run.session.attempts[0].error.as_deref(), Some("Extraction error: HTTP Error 403: Forbidden"));
    assert_eq!(extractor.streamed(), vec!["S2", "S3"]);
    assert_eq!(run.session.attempts.iter().map(|a| a.index).collect::<Vec<_>>(), vec![1, 2, 3]);

    assert_well_formed(&run.events);
    assert_eq!(run.events.iter().filter(|s| s.status == ProgressStatus::Starting).count(), 1);
    let last = run.events.last().unwrap();
    assert_eq!(last.status, ProgressStatus::Completed);
    assert_eq!(last.percent, 100.0);
    assert_eq!(last.filename.as_deref(), Some("video_1.mp4"));
    assert!(matches!(run.session.result, Some(SessionResult::Completed(_))));
}

#[tokio::test]
async fn small_decoy_is_deleted_and_progress_keeps_climbing() {
    let dir = tempfile::tempdir().unwrap();
    let extractor = FakeExtractor::new(vec![
        produces("decoy.mp4", 500 * 1024),
        produces("real.mp4", 2 * MB),
    ]);
    let processor = Arc::new(FakeProcessor::new());

    let run = run_engine(dir.path(), extractor, processor, &strategies(&["S1", "S2"]), false).await;

    assert!(run.result.is_ok());
    assert_eq!(outcomes(&run.session), vec![AttemptOutcome::SkippedDecoyArtifact, AttemptOutcome::Succeeded]);
    assert!(!dir.path().join("decoy.mp4").exists());
    assert!(dir.path().join("video_1.mp4").exists());
    assert_well_formed(&run.events);

    let processing_at = run.events.iter().position(|s| s.status == ProgressStatus::Processing).unwrap();
    assert!(run.events[processing_at..].iter().all(|s| s.percent == 100.0));
}

#[tokio::test]
async fn still_image_decoy_is_rejected_despite_long_duration() {
    let dir = tempfile::tempdir().unwrap();
    let extractor = FakeExtractor::new(vec![
        produces("poster.mp4", 2 * MB),
        produces("movie.mp4", 2 * MB),
    ]);
    let processor = Arc::new(FakeProcessor::new().with_probe("poster.mp4", still_image_report(12, 3600.0)));

    let run = run_engine(dir.path(), extractor, processor, &strategies(&["S1", "S2"]), false).await;

    assert_eq!(run.result.unwrap().strategy, "S2");
    assert_eq!(run.session.attempts[0].outcome, AttemptOutcome::SkippedDecoyArtifact);
    assert!(run.session.attempts[0].error.as_deref().unwrap_or_default().contains("mjpeg"));
    assert!(!dir.path().join("poster.mp4").exists());
}

#[tokio::test]
async fn storyboard_only_listing_skips_the_download() {
    let dir = tempfile::tempdir().unwrap();
    let extractor = FakeExtractor::new(vec![Step::StoryboardsOnly, produces("clip.mp4", 2 * MB)]);
    let processor = Arc::new(FakeProcessor::new());

    let run = run_engine(dir.path(), extractor.clone(), processor, &strategies(&["S1", "S2"]), false).await;

    assert!(run.result.is_ok());
    assert_eq!(outcomes(&run.session), vec![AttemptOutcome::SkippedNoVideoFormats, AttemptOutcome::Succeeded]);
    assert_eq!(extractor.streamed(), vec!["S2"]);
}

#[tokio::test]
async fn exhaustion_reports_count_and_last_error() {
    let dir = tempfile::tempdir().unwrap();
    let extractor = FakeExtractor::new(vec![
        Step::MetadataFails("first".into()),
        Step::StreamFails("second".into()),
        Step::MetadataFails("HTTP Error 429: Too Many Requests".into()),
    ]);
    let processor = Arc::new(FakeProcessor::new());

    let run = run_engine(dir.path(), extractor, processor, &strategies(&["S1", "S2", "S3"]), false).await;

    match run.result {
        Err(AppError::StrategiesExhausted { attempts, ref last_error }) => {
            assert_eq!(attempts, 3);
            assert!(last_error.contains("HTTP Error 429"));
        }
        ref other => panic!("expected exhaustion, got {:?}", other),
    }
    assert_well_formed(&run.events);
    let last = run.events.last().unwrap();
    assert_eq!(last.status, ProgressStatus::Error);
    assert!(last.message.contains('3'));
    assert!(matches!(
        run.session.result,
        Some(SessionResult::Failed(ref failed)) if failed.attempts == 3
    ));
}

#[tokio::test]
async fn audio_only_runs_the_audio_list_and_skips_codec_checks() {
    let dir = tempfile::tempdir().unwrap();
    let extractor = FakeExtractor::new(vec![produces("song.mp3", 2 * MB)]);
    let processor = Arc::new(FakeProcessor::new().with_probe("song.mp3", still_image_report(1, 215.0)));

    let run = run_engine(dir.path(), extractor.clone(), processor.clone(), &audio_strategies(), true).await;

    let done = run.result.unwrap();
    assert_eq!(done.filename, "video_1.mp3");
    assert_eq!(extractor.streamed(), vec!["Best Audio"]);
    assert!(processor.transcode_modes().is_empty());
    assert_well_formed(&run.events);
}

#[tokio::test]
async fn canonical_container_is_renamed_with_identical_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let extractor = FakeExtractor::new(vec![produces("Clip.MP4", 2 * MB)]);
    let processor = Arc::new(FakeProcessor::new());

    let run = run_engine(dir.path(), extractor, processor.clone(), &strategies(&["S1"]), false).await;

    let done = run.result.unwrap();
    let bytes = std::fs::read(&done.path).unwrap();
    assert_eq!(bytes, vec![7u8; 2 * MB]);
    assert_eq!(done.size_bytes, (2 * MB) as u64);
    assert!(!dir.path().join("Clip.MP4").exists());
    assert!(processor.transcode_modes().is_empty());
}

#[tokio::test]
async fn failed_stream_copy_falls_back_to_reencode() {
    let dir = tempfile::tempdir().unwrap();
    let extractor = FakeExtractor::new(vec![produces("clip.webm", 2 * MB)]);
    let processor = Arc::new(FakeProcessor::failing_copy());

    let run = run_engine(dir.path(), extractor, processor.clone(), &strategies(&["S1"]), false).await;

    assert_eq!(run.result.unwrap().filename, "video_1.mp4");
    assert_eq!(processor.transcode_modes(), vec![TranscodeMode::Copy, TranscodeMode::Reencode]);
    assert!(!dir.path().join("clip.webm").exists());
    assert!(run.events.iter().any(|s| s.status == ProgressStatus::Converting));
}

#[tokio::test]
async fn conversion_failure_keeps_the_source_and_frees_the_name() {
    let dir = tempfile::tempdir().unwrap();
    let extractor = FakeExtractor::new(vec![produces("clip.webm", 2 * MB)]);
    let processor = Arc::new(FakeProcessor::failing_all());

    let run = run_engine(dir.path(), extractor, processor, &strategies(&["S1"]), false).await;

    assert!(matches!(run.result, Err(AppError::StrategiesExhausted { attempts: 1, .. })));
    let attempt = &run.session.attempts[0];
    assert_eq!(attempt.outcome, AttemptOutcome::FailedConversion);
    assert_eq!(attempt.leftover_file.as_deref(), Some(dir.path().join("clip.webm").as_path()));
    assert!(dir.path().join("clip.webm").exists());
    assert!(!dir.path().join("video_1.mp4").exists());
}

#[tokio::test]
async fn numbering_continues_after_existing_files() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("video_4.mp3"), b"old").unwrap();
    let extractor = FakeExtractor::new(vec![produces("clip.mp4", 2 * MB)]);
    let processor = Arc::new(FakeProcessor::new());

    let run = run_engine(dir.path(), extractor, processor, &strategies(&["S1"]), false).await;
    assert_eq!(run.result.unwrap().filename, "video_5.mp4");
}
