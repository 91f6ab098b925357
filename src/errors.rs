use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid strategy: {0}")]
    InvalidStrategy(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("No video formats: {0}")]
    NoVideoFormats(String),

    #[error("Decoy artifact: {0}")]
    DecoyArtifact(String),

    #[error("Conversion error: {0}")]
    Conversion(String),

    #[error("Probe error: {0}")]
    Probe(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Worker error: {0}")]
    Worker(String),

    #[error("All {attempts} download attempts failed. Last error: {last_error}")]
    StrategiesExhausted { attempts: u32, last_error: String },
}

impl AppError {
    /// Errors the fallback engine absorbs and moves past.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            AppError::StrategiesExhausted { .. } | AppError::Config(_) | AppError::InvalidStrategy(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
