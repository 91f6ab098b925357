use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::Command;
use async_trait::async_trait;
use crate::config::AppConfig;
use crate::downloader::{DownloadedMedia, MediaExtractor, MediaMetadata, ProgressHook, RawProgress};
use crate::errors::{AppError, Result};
use super::{PostProcess, StrategyConfig};

const PROGRESS_MARKER: &str = "[clipfetch:progress]";
const FILE_MARKER: &str = "[clipfetch:file]";
const METADATA_SOCKET_TIMEOUT_SECS: u64 = 30;
const MAX_ERROR_CHARS: usize = 500;

/// Extraction collaborator backed by the yt-dlp command line program.
pub struct YtDlpExtractor {
    name: String,
    ytdlp_path: PathBuf,
    ffmpeg_location: Option<PathBuf>,
}

impl YtDlpExtractor {
    pub fn new(ytdlp_path: PathBuf) -> Self {
        Self {
            name: "yt-dlp".to_string(),
            ytdlp_path,
            ffmpeg_location: None,
        }
    }

    pub fn with_ffmpeg_location(mut self, ffmpeg: &Path) -> Self {
        self.ffmpeg_location = Some(ffmpeg.to_path_buf());
        self
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let tools = crate::tools::ToolSet::discover(config);
        log::info!("🔧 [YTDLP] Using yt-dlp at {:?}", tools.ytdlp);
        Self::new(tools.ytdlp).with_ffmpeg_location(&tools.ffmpeg)
    }

    pub fn metadata_args(url: &str, client_hint: Option<&str>) -> Vec<String> {
        let mut args = vec![
            "--dump-single-json".to_string(),
            "--no-warnings".to_string(),
            "--no-playlist".to_string(),
            "--skip-download".to_string(),
            "--socket-timeout".to_string(),
            METADATA_SOCKET_TIMEOUT_SECS.to_string(),
        ];
        if let Some(hint) = client_hint {
            args.push("--extractor-args".to_string());
            args.push(format!("youtube:player_client={}", hint));
        }
        args.push(url.to_string());
        args
    }

    pub fn download_args(&self, url: &str, strategy: &StrategyConfig, output_dir: &Path) -> Vec<String> {
        let output = output_dir.join(strategy.output_template());
        let mut args = vec![
            "-f".to_string(),
            strategy.format_selector().to_string(),
            "-o".to_string(),
            output.to_string_lossy().to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--newline".to_string(),
            "--progress".to_string(),
            "--progress-template".to_string(),
            format!(
                "download:{} %(progress.status)s %(progress.downloaded_bytes)s %(progress.total_bytes)s \
                 %(progress.total_bytes_estimate)s %(progress.speed)s %(progress.eta)s %(progress.filename)s",
                PROGRESS_MARKER
            ),
            "--print".to_string(),
            format!("after_move:{} %(filepath)s", FILE_MARKER),
            "--socket-timeout".to_string(),
            strategy.socket_timeout().as_secs().to_string(),
            "--retries".to_string(),
            strategy.retries().to_string(),
        ];

        if let Some(hint) = strategy.client_hint() {
            args.push("--extractor-args".to_string());
            args.push(format!("youtube:player_client={}", hint));
        }

        for (key, value) in strategy.http_headers() {
            args.push("--add-headers".to_string());
            args.push(format!("{}:{}", key, value));
        }

        match strategy.post_process() {
            PostProcess::None => {}
            PostProcess::MergeInto { container } => {
                args.push("--merge-output-format".to_string());
                args.push(container.clone());
            }
            PostProcess::ExtractAudio { codec, quality } => {
                args.push("--extract-audio".to_string());
                args.push("--audio-format".to_string());
                args.push(codec.clone());
                args.push("--audio-quality".to_string());
                args.push(format!("{}K", quality));
            }
        }

        if let Some(ffmpeg) = &self.ffmpeg_location {
            args.push("--ffmpeg-location".to_string());
            args.push(ffmpeg.to_string_lossy().to_string());
        }

        args.push(url.to_string());
        args
    }
}

fn optional_number(token: Option<&str>) -> Option<f64> {
    token
        .filter(|t| *t != "NA" && *t != "None")
        .and_then(|t| t.parse::<f64>().ok())
        .filter(|n| n.is_finite() && *n >= 0.0)
}

/// Parses one line produced by the progress template.
pub fn parse_progress_line(line: &str) -> Option<RawProgress> {
    let rest = line.trim().strip_prefix(PROGRESS_MARKER)?;
    let mut fields = rest.split_whitespace();
    let status = fields.next()?;
    let downloaded = optional_number(fields.next());
    let total = optional_number(fields.next());
    let estimate = optional_number(fields.next());
    let speed = optional_number(fields.next());
    let eta = optional_number(fields.next());
    let filename = fields.collect::<Vec<_>>().join(" ");
    let filename = Some(filename).filter(|f| !f.is_empty() && f != "NA");

    match status {
        "downloading" => Some(RawProgress::Downloading {
            downloaded_bytes: downloaded.unwrap_or(0.0) as u64,
            total_bytes: total.or(estimate).map(|t| t as u64),
            speed,
            eta: eta.map(|e| e as u64),
            filename,
        }),
        "finished" => Some(RawProgress::Finished { filename }),
        _ => None,
    }
}

/// Parses the final path printed after yt-dlp moved the file into place.
pub fn parse_file_line(line: &str) -> Option<PathBuf> {
    let path = line.trim().strip_prefix(FILE_MARKER)?.trim();
    if path.is_empty() || path == "NA" {
        return None;
    }
    Some(PathBuf::from(path))
}

/// Keeps the `ERROR:` lines when there are any, otherwise the last line.
fn summarize_stderr(stderr: &str) -> String {
    let errors: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|l| l.starts_with("ERROR:"))
        .collect();

    let summary = if errors.is_empty() {
        stderr.lines().rev().map(str::trim).find(|l| !l.is_empty()).unwrap_or("unknown error").to_string()
    } else {
        errors.join(" | ")
    };

    summary.chars().take(MAX_ERROR_CHARS).collect()
}

#[async_trait]
impl MediaExtractor for YtDlpExtractor {
    async fn fetch_metadata(&self, url: &str, client_hint: Option<&str>) -> Result<MediaMetadata> {
        log::info!("🔍 [YTDLP] Fetching metadata (client: {}) for {}", client_hint.unwrap_or("default"), url);

        let output = Command::new(&self.ytdlp_path)
            .args(Self::metadata_args(url, client_hint))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| AppError::ToolNotFound(format!("failed to start yt-dlp ({:?}): {}", self.ytdlp_path, e)))?;

        if !output.status.success() {
            let error = summarize_stderr(&String::from_utf8_lossy(&output.stderr));
            log::warn!("❌ [YTDLP] Metadata lookup failed: {}", error);
            return Err(AppError::Extraction(error));
        }

        let metadata: MediaMetadata = serde_json::from_slice(&output.stdout)?;
        log::info!(
            "✅ [YTDLP] Metadata for '{}' with {} formats",
            metadata.title.as_deref().unwrap_or("untitled"),
            metadata.formats().len()
        );
        Ok(metadata)
    }

    async fn fetch_stream(
        &self,
        url: &str,
        strategy: &StrategyConfig,
        output_dir: &Path,
        progress: ProgressHook<'_>,
    ) -> Result<DownloadedMedia> {
        let args = self.download_args(url, strategy, output_dir);
        log::info!("⬇️ [YTDLP] Starting download with strategy '{}'", strategy.name());
        log::debug!("🚀 [YTDLP] Command: {:?} {:?}", self.ytdlp_path, args);

        let mut child = Command::new(&self.ytdlp_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AppError::ToolNotFound(format!("failed to start yt-dlp ({:?}): {}", self.ytdlp_path, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::Extraction("yt-dlp stdout unavailable".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| AppError::Extraction("yt-dlp stderr unavailable".to_string()))?;

        let stderr_reader = tokio::spawn(async move {
            let mut content = String::new();
            let mut reader = BufReader::new(stderr);
            let mut buf = Vec::new();
            while let Ok(Some(line)) = read_lossy_line(&mut reader, &mut buf).await {
                content.push_str(&line);
                content.push('\n');
            }
            content
        });

        let mut produced: Option<PathBuf> = None;
        let mut reader = BufReader::new(stdout);
        let mut buf = Vec::new();
        while let Some(line) = read_lossy_line(&mut reader, &mut buf).await? {
            if let Some(raw) = parse_progress_line(&line) {
                progress(raw);
            } else if let Some(path) = parse_file_line(&line) {
                log::info!("📁 [YTDLP] Output file: {:?}", path);
                produced = Some(path);
            } else if !line.trim().is_empty() {
                log::debug!("[YTDLP] {}", line);
            }
        }

        let status = child.wait().await?;
        let stderr_content = stderr_reader.await.unwrap_or_default();

        if !status.success() {
            let error = summarize_stderr(&stderr_content);
            log::error!("❌ [YTDLP] Strategy '{}' failed: {}", strategy.name(), error);
            return Err(AppError::Extraction(error));
        }

        let path = produced
            .filter(|p| p.exists())
            .ok_or_else(|| AppError::Extraction("yt-dlp finished without producing an output file".to_string()))?;

        log::info!("✅ [YTDLP] Download finished: {:?}", path);
        Ok(DownloadedMedia { path })
    }

    async fn version(&self) -> Result<String> {
        let output = Command::new(&self.ytdlp_path)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| AppError::ToolNotFound(format!("failed to start yt-dlp ({:?}): {}", self.ytdlp_path, e)))?;

        if !output.status.success() {
            return Err(AppError::Extraction(summarize_stderr(&String::from_utf8_lossy(&output.stderr))));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn get_name(&self) -> &str {
        &self.name
    }
}

/// Reads one line, replacing bytes that are not UTF-8. yt-dlp prints titles
/// in the console code page on some platforms.
async fn read_lossy_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    if reader.read_until(b'\n', buf).await? == 0 {
        return Ok(None);
    }
    let line = String::from_utf8_lossy(&buf[..]);
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}
