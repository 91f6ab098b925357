pub mod ytdlp;

pub use ytdlp::YtDlpExtractor;

use std::collections::HashSet;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::errors::{AppError, Result};

pub const DEFAULT_OUTPUT_TEMPLATE: &str = "%(title).150s [%(id)s].%(ext)s";
const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// What the extractor should do with the file after the transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PostProcess {
    None,
    /// Merge separate video and audio streams into this container.
    MergeInto { container: String },
    /// Extract the audio track with the given codec and bitrate (kbps).
    ExtractAudio { codec: String, quality: String },
}

/// One named extraction configuration. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    name: String,
    client_hint: Option<String>,
    format_selector: String,
    output_template: String,
    socket_timeout_secs: u64,
    retries: u32,
    audio_only: bool,
    post_process: PostProcess,
    http_headers: Vec<(String, String)>,
}

impl StrategyConfig {
    pub fn new(name: &str, format_selector: &str) -> Self {
        Self {
            name: name.to_string(),
            client_hint: None,
            format_selector: format_selector.to_string(),
            output_template: DEFAULT_OUTPUT_TEMPLATE.to_string(),
            socket_timeout_secs: 60,
            retries: 5,
            audio_only: false,
            post_process: PostProcess::None,
            http_headers: Vec::new(),
        }
    }

    pub fn with_client_hint(mut self, hint: &str) -> Self {
        self.client_hint = Some(hint.to_string());
        self
    }

    pub fn with_output_template(mut self, template: &str) -> Self {
        self.output_template = template.to_string();
        self
    }

    pub fn with_socket_timeout(mut self, secs: u64) -> Self {
        self.socket_timeout_secs = secs;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_post_process(mut self, post_process: PostProcess) -> Self {
        self.post_process = post_process;
        self
    }

    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.http_headers.push((key.to_string(), value.to_string()));
        self
    }

    pub fn audio_only(mut self) -> Self {
        self.audio_only = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn client_hint(&self) -> Option<&str> {
        self.client_hint.as_deref()
    }

    pub fn format_selector(&self) -> &str {
        &self.format_selector
    }

    pub fn output_template(&self) -> &str {
        &self.output_template
    }

    pub fn socket_timeout(&self) -> Duration {
        Duration::from_secs(self.socket_timeout_secs)
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn is_audio_only(&self) -> bool {
        self.audio_only
    }

    pub fn post_process(&self) -> &PostProcess {
        &self.post_process
    }

    pub fn http_headers(&self) -> &[(String, String)] {
        &self.http_headers
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::InvalidStrategy("strategy name cannot be empty".to_string()));
        }
        if self.format_selector.trim().is_empty() {
            return Err(AppError::InvalidStrategy(format!("{}: empty format selector", self.name)));
        }
        if !self.output_template.contains("%(ext)s") {
            return Err(AppError::InvalidStrategy(format!(
                "{}: output template must end in the %(ext)s placeholder",
                self.name
            )));
        }
        if self.socket_timeout_secs == 0 {
            return Err(AppError::InvalidStrategy(format!("{}: socket timeout must be positive", self.name)));
        }
        if let PostProcess::ExtractAudio { .. } = self.post_process {
            if !self.audio_only {
                return Err(AppError::InvalidStrategy(format!(
                    "{}: audio extraction requires an audio-only strategy",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

/// An ordered, validated list of strategies. Order is attempt order.
#[derive(Debug, Clone)]
pub struct StrategyList {
    strategies: Vec<StrategyConfig>,
}

impl StrategyList {
    pub fn new(strategies: Vec<StrategyConfig>) -> Result<Self> {
        if strategies.is_empty() {
            return Err(AppError::InvalidStrategy("strategy list cannot be empty".to_string()));
        }

        let mut seen = HashSet::new();
        for strategy in &strategies {
            strategy.validate()?;
            if !seen.insert(strategy.name()) {
                return Err(AppError::InvalidStrategy(format!("duplicate strategy name: {}", strategy.name())));
            }
        }

        let audio_only = strategies[0].is_audio_only();
        if strategies.iter().any(|s| s.is_audio_only() != audio_only) {
            return Err(AppError::InvalidStrategy(
                "a strategy list cannot mix audio-only and video strategies".to_string(),
            ));
        }

        Ok(Self { strategies })
    }

    pub fn iter(&self) -> impl Iterator<Item = &StrategyConfig> {
        self.strategies.iter()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    pub fn is_audio_only(&self) -> bool {
        self.strategies.first().map(StrategyConfig::is_audio_only).unwrap_or(false)
    }

    pub fn names(&self) -> Vec<&str> {
        self.strategies.iter().map(StrategyConfig::name).collect()
    }
}

/// The video list and the audio list a session picks from.
#[derive(Debug, Clone)]
pub struct StrategyCatalog {
    video: StrategyList,
    audio: StrategyList,
}

impl StrategyCatalog {
    pub fn new(video: StrategyList, audio: StrategyList) -> Result<Self> {
        if video.is_audio_only() {
            return Err(AppError::InvalidStrategy("video list contains audio-only strategies".to_string()));
        }
        if !audio.is_audio_only() {
            return Err(AppError::InvalidStrategy("audio list contains video strategies".to_string()));
        }
        if audio.len() != 1 {
            return Err(AppError::InvalidStrategy(format!(
                "audio list must hold exactly one strategy, got {}",
                audio.len()
            )));
        }
        let video_names: HashSet<&str> = video.iter().map(StrategyConfig::name).collect();
        if let Some(shared) = audio.iter().find(|s| video_names.contains(s.name())) {
            return Err(AppError::InvalidStrategy(format!(
                "strategy '{}' appears in both the video and the audio list",
                shared.name()
            )));
        }
        Ok(Self { video, audio })
    }

    pub fn for_request(&self, audio_only: bool) -> &StrategyList {
        if audio_only {
            &self.audio
        } else {
            &self.video
        }
    }

    pub fn video(&self) -> &StrategyList {
        &self.video
    }

    pub fn audio(&self) -> &StrategyList {
        &self.audio
    }
}

impl Default for StrategyCatalog {
    fn default() -> Self {
        let video = StrategyList::new(default_video_strategies()).expect("built-in video strategies are valid");
        let audio = StrategyList::new(default_audio_strategies()).expect("built-in audio strategy is valid");
        Self::new(video, audio).expect("built-in catalog is valid")
    }
}

/// Video strategies in attempt order. Each one asks YouTube for a different
/// player client, ending with no client override at all.
pub fn default_video_strategies() -> Vec<StrategyConfig> {
    let merge_mp4 = PostProcess::MergeInto { container: "mp4".to_string() };
    vec![
        StrategyConfig::new("MediaConnect Client", "best")
            .with_client_hint("mediaconnect"),
        StrategyConfig::new("iOS Music Client", "best")
            .with_client_hint("ios_music"),
        StrategyConfig::new("Android Music Client", "best")
            .with_client_hint("android_music"),
        StrategyConfig::new("Web Client - Modern", "best")
            .with_client_hint("web")
            .with_header("User-Agent", BROWSER_USER_AGENT)
            .with_header("Accept-Language", "en-US,en;q=0.9"),
        StrategyConfig::new("Direct - No Client Override", "(bestvideo[height<=1080]+bestaudio)/best")
            .with_post_process(merge_mp4),
    ]
}

pub fn default_audio_strategies() -> Vec<StrategyConfig> {
    vec![StrategyConfig::new("Best Audio", "ba/best")
        .audio_only()
        .with_post_process(PostProcess::ExtractAudio {
            codec: "mp3".to_string(),
            quality: "192".to_string(),
        })]
}

/// A player client used only for metadata lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InfoClient {
    pub name: String,
    pub client_hint: Option<String>,
}

impl InfoClient {
    fn new(name: &str, client_hint: Option<&str>) -> Self {
        Self { name: name.to_string(), client_hint: client_hint.map(str::to_string) }
    }
}

pub fn default_info_clients() -> Vec<InfoClient> {
    vec![
        InfoClient::new("Android", Some("android")),
        InfoClient::new("Web", Some("web")),
        InfoClient::new("iOS", Some("ios")),
        InfoClient::new("Legacy", None),
    ]
}
