//! The download directory as seen by users: listing, lookup and deletion of
//! finished files.

use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use crate::errors::{AppError, Result};
use crate::security::InputValidator;
use crate::utils::bytes_to_mb;

const PARTIAL_SUFFIXES: &[&str] = &[".part", ".ytdl", ".temp"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LibraryEntry {
    pub filename: String,
    pub size_bytes: u64,
    pub size_mb: f64,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LibraryListing {
    pub downloads: Vec<LibraryEntry>,
    pub total: usize,
}

pub fn media_type_for(filename: &str) -> &'static str {
    let ext = Path::new(filename)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "mp4" => "video/mp4",
        "mp3" => "audio/mpeg",
        "webm" => "video/webm",
        _ => "application/octet-stream",
    }
}

pub struct DownloadLibrary {
    root: PathBuf,
    validator: InputValidator,
}

impl DownloadLibrary {
    pub fn new(root: PathBuf) -> Self {
        Self { root, validator: InputValidator::new() }
    }

    /// Finished files, newest first. Hidden files and in-flight partial
    /// downloads are left out.
    pub async fn list(&self) -> Result<LibraryListing> {
        let mut downloads = Vec::new();
        if !self.root.exists() {
            return Ok(LibraryListing { downloads, total: 0 });
        }

        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let filename = entry.file_name().to_string_lossy().to_string();
            if filename.starts_with('.') || PARTIAL_SUFFIXES.iter().any(|s| filename.ends_with(s)) {
                continue;
            }

            let created_at = metadata
                .created()
                .or_else(|_| metadata.modified())
                .ok()
                .map(chrono::DateTime::<chrono::Utc>::from);

            downloads.push(LibraryEntry {
                filename,
                size_bytes: metadata.len(),
                size_mb: bytes_to_mb(metadata.len()),
                created_at,
            });
        }

        downloads.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.filename.cmp(&b.filename)));
        let total = downloads.len();
        Ok(LibraryListing { downloads, total })
    }

    /// Full path of an existing file in the library.
    pub async fn resolve(&self, filename: &str) -> Result<PathBuf> {
        self.validator.validate_file_name(filename)?;
        let path = self.root.join(filename);
        match tokio::fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => Ok(path),
            _ => Err(AppError::NotFound(format!("file not found: {}", filename))),
        }
    }

    pub async fn delete(&self, filename: &str) -> Result<()> {
        let path = self.resolve(filename).await?;
        tokio::fs::remove_file(&path).await?;
        log::info!("🗑️ [LIBRARY] Deleted {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_types_follow_extension() {
        assert_eq!(media_type_for("video_1.mp4"), "video/mp4");
        assert_eq!(media_type_for("video_2.MP3"), "audio/mpeg");
        assert_eq!(media_type_for("clip.webm"), "video/webm");
        assert_eq!(media_type_for("notes.txt"), "application/octet-stream");
        assert_eq!(media_type_for("noext"), "application/octet-stream");
    }

    #[tokio::test]
    async fn lists_finished_files_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("video_1.mp4"), vec![0u8; 2048]).unwrap();
        std::fs::write(dir.path().join("clip.webm.part"), b"partial").unwrap();
        std::fs::write(dir.path().join(".hidden"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let listing = DownloadLibrary::new(dir.path().to_path_buf()).list().await.unwrap();
        assert_eq!(listing.total, 1);
        assert_eq!(listing.downloads[0].filename, "video_1.mp4");
        assert_eq!(listing.downloads[0].size_bytes, 2048);
    }

    #[tokio::test]
    async fn missing_root_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let listing = DownloadLibrary::new(dir.path().join("absent")).list().await.unwrap();
        assert_eq!(listing.total, 0);
    }

    #[tokio::test]
    async fn delete_removes_file_and_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let library = DownloadLibrary::new(dir.path().to_path_buf());
        std::fs::write(dir.path().join("video_1.mp4"), b"data").unwrap();

        library.delete("video_1.mp4").await.unwrap();
        assert!(!dir.path().join("video_1.mp4").exists());

        assert!(matches!(library.delete("video_1.mp4").await, Err(AppError::NotFound(_))));
        assert!(library.resolve("../etc/passwd").await.is_err());
    }
}
