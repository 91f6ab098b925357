pub mod commands;
pub mod config;
pub mod downloader;
pub mod errors;
pub mod library;
pub mod processing;
pub mod security;
pub mod tools;
pub mod utils;

pub use config::AppConfig;
pub use downloader::engine::FallbackEngine;
pub use downloader::info::InfoService;
pub use downloader::manager::{DownloadManager, SessionHandle};
pub use errors::{AppError, Result};
