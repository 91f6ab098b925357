use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::info;

use clipfetch::commands::{self, AppState, DownloadRequest, SettingsUpdate};
use clipfetch::config::AppConfig;
use clipfetch::downloader::{ProgressState, ProgressStatus};

#[derive(Parser)]
#[command(
    name = "clipfetch",
    version,
    about = "Download videos through a chain of yt-dlp fallback strategies"
)]
struct Cli {
    /// Configuration file to use instead of the one in the user config directory
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the download directory for this run
    #[arg(long, global = true)]
    download_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Download a video (or its audio) and print the result as JSON
    Download {
        url: String,
        #[arg(long, default_value_t = false)]
        audio_only: bool,
        /// Print progress snapshots as JSON lines instead of a progress bar
        #[arg(long, default_value_t = false)]
        json_progress: bool,
    },
    /// Show metadata for a URL
    Info { url: String },
    /// Try every lookup method on a URL and report what happened
    Diagnose { url: String },
    /// List finished downloads
    List,
    /// Delete a finished download by file name
    Delete { filename: String },
    /// Show or change persistent settings
    Config {
        #[arg(long)]
        download_path: Option<PathBuf>,
        #[arg(long)]
        max_concurrent_sessions: Option<usize>,
        #[arg(long)]
        ytdlp_path: Option<PathBuf>,
        #[arg(long)]
        ffmpeg_path: Option<PathBuf>,
        #[arg(long)]
        ffprobe_path: Option<PathBuf>,
    },
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(10_000);
    let style = ProgressStyle::with_template("{spinner} [{bar:40.cyan/blue}] {percent:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
    bar.set_style(style);
    bar
}

fn render(bar: &ProgressBar, state: &ProgressState) {
    bar.set_position((state.percent * 100.0).round() as u64);
    let mut message = state.message.clone();
    if let Some(strategy) = &state.current_strategy {
        message = format!("{} [{}]", message, strategy);
    }
    if let (Some(speed), Some(eta)) = (&state.speed, &state.eta) {
        message = format!("{} {} ETA {}", message, speed, eta);
    }
    bar.set_message(message);
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(Some(path.clone())),
        None => AppConfig::load(),
    }
    .context("failed to load configuration")?;

    if let Command::Config { download_path, max_concurrent_sessions, ytdlp_path, ffmpeg_path, ffprobe_path } =
        &cli.command
    {
        let update = SettingsUpdate {
            download_path: download_path.clone(),
            max_concurrent_sessions: *max_concurrent_sessions,
            ytdlp_path: ytdlp_path.clone(),
            ffmpeg_path: ffmpeg_path.clone(),
            ffprobe_path: ffprobe_path.clone(),
        };
        let changed = update.download_path.is_some()
            || update.max_concurrent_sessions.is_some()
            || update.ytdlp_path.is_some()
            || update.ffmpeg_path.is_some()
            || update.ffprobe_path.is_some();
        if changed {
            config = commands::update_settings(&config, update, cli.config.as_deref())?;
        }
        return print_json(&serde_json::to_value(&config)?);
    }

    // One-off override, never persisted.
    if let Some(dir) = cli.download_dir {
        config.download_path = dir;
    }
    info!("Downloads go to {:?}", config.download_path);

    let state = AppState::new(config).context("failed to initialise")?;

    let output = match cli.command {
        Command::Download { url, audio_only, json_progress } => {
            let bar = (!json_progress).then(progress_bar);
            let result = commands::download_video(&state, DownloadRequest { url, audio_only }, |progress| {
                match &bar {
                    Some(bar) => render(bar, progress),
                    None => {
                        if let Ok(line) = serde_json::to_string(progress) {
                            println!("{}", line);
                        }
                    }
                }
                if let (Some(bar), ProgressStatus::Error) = (&bar, progress.status) {
                    bar.abandon_with_message(progress.message.clone());
                }
            })
            .await;
            if let Some(bar) = &bar {
                if !bar.is_finished() {
                    bar.finish_and_clear();
                }
            }
            result?
        }
        Command::Info { url } => commands::video_info(&state, &url).await?,
        Command::Diagnose { url } => commands::diagnose_url(&state, &url).await?,
        Command::List => commands::list_downloads(&state).await?,
        Command::Delete { filename } => commands::delete_download(&state, &filename).await?,
        Command::Config { .. } => commands::get_settings(&state).await?,
    };

    print_json(&output)
}
