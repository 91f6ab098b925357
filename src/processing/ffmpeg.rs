use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use crate::config::AppConfig;
use crate::errors::{AppError, Result};
use super::{MediaProcessor, MediaProfile, ProbeReport, StreamInfo, TranscodeMode};

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

fn parse_number<T: std::str::FromStr>(value: Option<&String>) -> Option<T> {
    value.and_then(|v| v.trim().parse::<T>().ok())
}

/// Turns ffprobe's JSON into a [`ProbeReport`]. ffprobe reports numbers as
/// strings and uses `N/A` for unknown values.
pub fn parse_probe_output(json: &[u8]) -> Result<ProbeReport> {
    let output: FfprobeOutput = serde_json::from_slice(json)?;

    let streams = output
        .streams
        .iter()
        .map(|s| StreamInfo {
            codec_type: s.codec_type.clone().unwrap_or_default(),
            codec_name: s.codec_name.clone(),
            frame_count: parse_number(s.nb_frames.as_ref()),
            duration: parse_number::<f64>(s.duration.as_ref()).filter(|d| d.is_finite()),
        })
        .collect();

    let duration = output
        .format
        .as_ref()
        .and_then(|f| parse_number::<f64>(f.duration.as_ref()))
        .filter(|d| d.is_finite());

    Ok(ProbeReport { duration, streams })
}

/// Command line arguments for one transcode.
pub fn transcode_args(input: &Path, output: &Path, mode: TranscodeMode, profile: MediaProfile) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-y".into(), "-hide_banner".into(), "-loglevel".into(), "error".into()];
    args.push("-i".into());
    args.push(input.as_os_str().to_owned());

    let codec_args: &[&str] = match (profile, mode) {
        (MediaProfile::Video, TranscodeMode::Copy) => &["-c", "copy", "-movflags", "+faststart"],
        (MediaProfile::Video, TranscodeMode::Reencode) => &[
            "-c:v", "libx264", "-preset", "fast", "-crf", "23",
            "-c:a", "aac", "-b:a", "128k",
            "-movflags", "+faststart",
        ],
        (MediaProfile::Audio, TranscodeMode::Copy) => &["-vn", "-c:a", "copy"],
        (MediaProfile::Audio, TranscodeMode::Reencode) => &["-vn", "-c:a", "libmp3lame", "-b:a", "192k"],
    };
    args.extend(codec_args.iter().map(OsString::from));
    args.push(output.as_os_str().to_owned());
    args
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(5);
    lines[start..].join(" | ")
}

/// [`MediaProcessor`] backed by the ffmpeg and ffprobe executables.
pub struct FfmpegProcessor {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    probe_timeout: Duration,
    transcode_timeout: Duration,
}

impl FfmpegProcessor {
    pub fn new(ffmpeg: PathBuf, ffprobe: PathBuf) -> Self {
        Self {
            ffmpeg,
            ffprobe,
            probe_timeout: Duration::from_secs(30),
            transcode_timeout: Duration::from_secs(300),
        }
    }

    pub fn with_timeouts(mut self, probe: Duration, transcode: Duration) -> Self {
        self.probe_timeout = probe;
        self.transcode_timeout = transcode;
        self
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let tools = crate::tools::ToolSet::discover(config);
        log::info!("🔧 [FFMPEG] Using ffmpeg at {:?}, ffprobe at {:?}", tools.ffmpeg, tools.ffprobe);
        Self::new(tools.ffmpeg, tools.ffprobe).with_timeouts(config.probe_timeout(), config.transcode_timeout())
    }

    async fn run(&self, program: &Path, args: &[OsString], limit: Duration) -> Result<std::process::Output> {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(limit, child).await {
            Ok(output) => output.map_err(|e| AppError::ToolNotFound(format!("failed to start {:?}: {}", program, e))),
            Err(_) => Err(AppError::Conversion(format!("{:?} timed out after {}s", program, limit.as_secs()))),
        }
    }
}

#[async_trait]
impl MediaProcessor for FfmpegProcessor {
    async fn probe(&self, path: &Path) -> Result<ProbeReport> {
        let args: Vec<OsString> = vec![
            "-v".into(),
            "error".into(),
            "-show_entries".into(),
            "stream=codec_type,codec_name,nb_frames,duration".into(),
            "-show_entries".into(),
            "format=duration".into(),
            "-of".into(),
            "json".into(),
            path.as_os_str().to_owned(),
        ];

        let output = self
            .run(&self.ffprobe, &args, self.probe_timeout)
            .await
            .map_err(|e| AppError::Probe(e.to_string()))?;

        if !output.status.success() {
            return Err(AppError::Probe(stderr_tail(&output.stderr)));
        }

        let report = parse_probe_output(&output.stdout)?;
        log::debug!("🔎 [FFMPEG] Probed {:?}: {:?}", path, report);
        Ok(report)
    }

    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        mode: TranscodeMode,
        profile: MediaProfile,
    ) -> Result<()> {
        log::info!("🎬 [FFMPEG] {:?} transcode ({:?}) {:?} -> {:?}", mode, profile, input, output);
        let args = transcode_args(input, output, mode, profile);
        let result = self.run(&self.ffmpeg, &args, self.transcode_timeout).await?;

        if !result.status.success() {
            let error = stderr_tail(&result.stderr);
            log::warn!("❌ [FFMPEG] {:?} transcode failed: {}", mode, error);
            return Err(AppError::Conversion(error));
        }
        Ok(())
    }
}
