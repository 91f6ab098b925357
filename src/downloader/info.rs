use std::sync::Arc;
use serde::{Deserialize, Serialize};
use crate::downloader::strategies::{default_info_clients, InfoClient};
use crate::downloader::{MediaExtractor, MediaMetadata};
use crate::errors::{AppError, Result};
use crate::security::InputValidator;
use crate::utils::{is_short, normalize_url};

const DESCRIPTION_LIMIT: usize = 500;

/// What the `info` operation reports about a URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoSummary {
    pub title: Option<String>,
    pub duration: Option<f64>,
    pub uploader: Option<String>,
    pub view_count: Option<u64>,
    pub upload_date: Option<String>,
    pub description: Option<String>,
    pub thumbnail: Option<String>,
    pub formats_available: usize,
    pub is_short: bool,
    pub normalized_url: String,
}

impl VideoSummary {
    fn from_metadata(metadata: &MediaMetadata, url: &str) -> Self {
        Self {
            title: metadata.title.clone(),
            duration: metadata.duration,
            uploader: metadata.uploader.clone(),
            view_count: metadata.view_count,
            upload_date: metadata.upload_date.clone(),
            description: metadata
                .description
                .as_ref()
                .map(|d| d.chars().take(DESCRIPTION_LIMIT).collect()),
            thumbnail: metadata.best_thumbnail(),
            formats_available: metadata.formats().len(),
            is_short: is_short(url),
            normalized_url: normalize_url(url),
        }
    }
}

/// Troubleshooting report for a URL. Building one never fails; problems end
/// up in `errors`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DiagnosisReport {
    pub original_url: String,
    pub normalized_url: String,
    pub is_short: bool,
    pub extractor_version: Option<String>,
    pub video_available: bool,
    pub title: Option<String>,
    pub duration: Option<f64>,
    pub formats_available: usize,
    pub successful_strategy: Option<String>,
    pub errors: Vec<String>,
}

struct Lookup {
    found: Option<(String, MediaMetadata)>,
    errors: Vec<String>,
}

/// Metadata lookups that walk the info clients in order.
pub struct InfoService {
    extractor: Arc<dyn MediaExtractor>,
    clients: Vec<InfoClient>,
    validator: InputValidator,
}

impl InfoService {
    pub fn new(extractor: Arc<dyn MediaExtractor>) -> Self {
        Self::with_clients(extractor, default_info_clients())
    }

    pub fn with_clients(extractor: Arc<dyn MediaExtractor>, clients: Vec<InfoClient>) -> Self {
        Self { extractor, clients, validator: InputValidator::new() }
    }

    async fn lookup(&self, url: &str) -> Lookup {
        let mut errors = Vec::new();
        for client in &self.clients {
            log::info!("🔍 [INFO] Trying {} client for {}", client.name, url);
            match self.extractor.fetch_metadata(url, client.client_hint.as_deref()).await {
                Ok(metadata) => {
                    return Lookup { found: Some((client.name.clone(), metadata)), errors };
                }
                Err(e) => {
                    log::warn!("⚠️ [INFO] {} client failed: {}", client.name, e);
                    errors.push(format!("{}: {}", client.name, e));
                }
            }
        }
        Lookup { found: None, errors }
    }

    pub async fn info(&self, url: &str) -> Result<VideoSummary> {
        self.validator.validate_url(url)?;
        let url = url.trim();
        let normalized = normalize_url(url);

        let lookup = self.lookup(&normalized).await;
        match lookup.found {
            Some((client, metadata)) => {
                log::info!("✅ [INFO] Metadata obtained with the {} client", client);
                Ok(VideoSummary::from_metadata(&metadata, url))
            }
            None => Err(AppError::Extraction(format!(
                "All {} lookup methods failed. Last error: {}",
                self.clients.len(),
                lookup.errors.last().map(String::as_str).unwrap_or("none attempted")
            ))),
        }
    }

    pub async fn diagnose(&self, url: &str) -> DiagnosisReport {
        let original = url.trim().to_string();
        let mut report = DiagnosisReport {
            normalized_url: normalize_url(&original),
            is_short: is_short(&original),
            original_url: original,
            ..Default::default()
        };

        match self.extractor.version().await {
            Ok(version) => report.extractor_version = Some(version),
            Err(e) => report.errors.push(format!("{} version check: {}", self.extractor.get_name(), e)),
        }

        if let Err(e) = self.validator.validate_url(&report.original_url) {
            report.errors.push(e.to_string());
            return report;
        }

        let lookup = self.lookup(&report.normalized_url).await;
        report.errors.extend(lookup.errors);
        if let Some((client, metadata)) = lookup.found {
            report.video_available = true;
            report.title = metadata.title.clone();
            report.duration = metadata.duration;
            report.formats_available = metadata.formats().len();
            report.successful_strategy = Some(client);
        }
        report
    }
}
