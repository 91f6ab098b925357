use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use crate::errors::{AppError, Result};

const CONFIG_DIR_NAME: &str = "clipfetch";
const ENV_PREFIX: &str = "CLIPFETCH";

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AppConfig {
    pub download_path: PathBuf,
    pub max_concurrent_sessions: usize,
    pub tools: ToolPaths,
    pub progress: ProgressConfig,
    pub validation: ValidationConfig,
    pub conversion: ConversionConfig,
}

/// Explicit locations for the external executables. Unset entries are
/// discovered on `PATH`.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ToolPaths {
    pub ytdlp: Option<PathBuf>,
    pub ffmpeg: Option<PathBuf>,
    pub ffprobe: Option<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ProgressConfig {
    pub poll_interval_ms: u64,
    pub queue_capacity: usize,
    pub channel_capacity: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ValidationConfig {
    pub min_file_size_bytes: u64,
    pub still_image_codecs: Vec<String>,
    pub min_frame_count: u64,
    pub min_duration_secs: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ConversionConfig {
    pub video_container: String,
    pub audio_container: String,
    pub filename_prefix: String,
    pub probe_timeout_secs: u64,
    pub transcode_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            download_path: dirs::download_dir()
                .map(|dir| dir.join(CONFIG_DIR_NAME))
                .unwrap_or_else(|| PathBuf::from("./downloads")),
            max_concurrent_sessions: 3,
            tools: ToolPaths::default(),
            progress: ProgressConfig::default(),
            validation: ValidationConfig::default(),
            conversion: ConversionConfig::default(),
        }
    }
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            queue_capacity: 1024,
            channel_capacity: 64,
        }
    }
}

impl ProgressConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_file_size_bytes: 1024 * 1024,
            still_image_codecs: vec![
                "mjpeg".to_string(),
                "png".to_string(),
                "bmp".to_string(),
                "webp".to_string(),
            ],
            min_frame_count: 100,
            min_duration_secs: 5.0,
        }
    }
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            video_container: "mp4".to_string(),
            audio_container: "mp3".to_string(),
            filename_prefix: "video".to_string(),
            probe_timeout_secs: 30,
            transcode_timeout_secs: 300,
        }
    }
}

impl AppConfig {
    /// Builds the effective configuration: defaults, then the JSON file in the
    /// user config directory (if present), then `CLIPFETCH__*` environment
    /// variables.
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;
        Self::load_from(Some(config_path))
    }

    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?);

        if let Some(path) = config_path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Json)
                    .required(false),
            );
        }

        let config: AppConfig = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    /// Writes the configuration as JSON to `config_path`, creating parent
    /// directories as needed.
    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(config_dir) = config_path.parent() {
            if !config_dir.exists() {
                std::fs::create_dir_all(config_dir)?;
            }
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| AppError::Config(config::ConfigError::Message("Could not find config directory".to_string())))?;

        Ok(config_dir.join(CONFIG_DIR_NAME).join("config.json"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_sessions == 0 {
            return Err(AppError::Validation("max_concurrent_sessions must be at least 1".to_string()));
        }
        if self.progress.poll_interval_ms == 0 {
            return Err(AppError::Validation("progress.poll_interval_ms must be positive".to_string()));
        }
        if self.progress.queue_capacity == 0 || self.progress.channel_capacity == 0 {
            return Err(AppError::Validation("progress queue and channel capacities must be positive".to_string()));
        }
        if self.conversion.video_container.is_empty() || self.conversion.audio_container.is_empty() {
            return Err(AppError::Validation("canonical containers cannot be empty".to_string()));
        }
        if self.conversion.filename_prefix.is_empty() {
            return Err(AppError::Validation("filename_prefix cannot be empty".to_string()));
        }
        Ok(())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.conversion.probe_timeout_secs)
    }

    pub fn transcode_timeout(&self) -> Duration {
        Duration::from_secs(self.conversion.transcode_timeout_secs)
    }
}
