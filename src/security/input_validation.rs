use crate::errors::{AppError, Result};
use url::Url;
use std::path::{Component, Path};

#[derive(Debug, Clone, Default)]
pub struct InputValidator;

impl InputValidator {
    pub fn new() -> Self {
        Self
    }

    /// Accepts any absolute `http`/`https` URL with a host. The extractor
    /// decides whether it can actually serve the site.
    pub fn validate_url(&self, url: &str) -> Result<Url> {
        let url = url.trim();
        if url.is_empty() {
            return Err(AppError::Validation("URL cannot be empty".to_string()));
        }

        let parsed_url = Url::parse(url)
            .map_err(|e| AppError::Validation(format!("Invalid URL: {}", e)))?;

        if !matches!(parsed_url.scheme(), "http" | "https") {
            return Err(AppError::Validation(format!(
                "Unsupported URL scheme: {}",
                parsed_url.scheme()
            )));
        }

        if parsed_url.host_str().map_or(true, str::is_empty) {
            return Err(AppError::Validation("URL must have a host".to_string()));
        }

        Ok(parsed_url)
    }

    /// A stored download is addressed by a bare file name: no separators,
    /// no parent components, no NUL bytes.
    pub fn validate_file_name(&self, filename: &str) -> Result<()> {
        if filename.is_empty() {
            return Err(AppError::Validation("File name cannot be empty".to_string()));
        }

        if filename.contains('\0') {
            return Err(AppError::Validation("Null bytes not allowed in file name".to_string()));
        }

        if filename.contains('/') || filename.contains('\\') {
            return Err(AppError::Validation("File name cannot contain path separators".to_string()));
        }

        let mut components = Path::new(filename).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(()),
            _ => Err(AppError::Validation("Path traversal detected".to_string())),
        }
    }

    pub fn validate_download_path(&self, path: &Path) -> Result<()> {
        if path.as_os_str().is_empty() {
            return Err(AppError::Validation("Download path cannot be empty".to_string()));
        }

        if path.exists() && !path.is_dir() {
            return Err(AppError::Validation("Download path is not a directory".to_string()));
        }

        if path.exists() {
            let readonly = path.metadata()?.permissions().readonly();
            if readonly {
                return Err(AppError::Validation("Download path is read-only".to_string()));
            }
        }

        Ok(())
    }
}
