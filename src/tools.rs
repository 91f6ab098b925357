//! Discovery of the external executables (yt-dlp, ffmpeg, ffprobe).

use std::path::{Path, PathBuf};
use crate::config::AppConfig;

#[cfg(windows)]
const COMMON_DIRS: &[&str] = &[
    "C:\\ffmpeg\\bin",
    "C:\\Program Files\\ffmpeg\\bin",
    "C:\\Program Files (x86)\\ffmpeg\\bin",
];

#[cfg(not(windows))]
const COMMON_DIRS: &[&str] = &["/usr/local/bin", "/usr/bin", "/opt/homebrew/bin", "/opt/local/bin"];

fn executable_name(program: &str) -> String {
    if cfg!(windows) {
        format!("{}.exe", program)
    } else {
        program.to_string()
    }
}

/// Resolves a program: an explicitly configured path wins, then `PATH`, then
/// a handful of usual install directories. Falls back to the bare name so the
/// spawn error names the missing tool.
pub fn locate(program: &str, configured: Option<&Path>) -> PathBuf {
    if let Some(path) = configured {
        if path.exists() {
            return path.to_path_buf();
        }
        log::warn!("⚠️ [TOOLS] Configured path for {} does not exist: {:?}", program, path);
    }

    if let Ok(path) = which::which(program) {
        log::debug!("🔍 [TOOLS] Found {} on PATH: {:?}", program, path);
        return path;
    }

    let file_name = executable_name(program);
    for dir in COMMON_DIRS {
        let candidate = Path::new(dir).join(&file_name);
        if candidate.exists() {
            log::debug!("🔍 [TOOLS] Found {} at {:?}", program, candidate);
            return candidate;
        }
    }

    log::warn!("⚠️ [TOOLS] {} not found, relying on the system to resolve it", program);
    PathBuf::from(program)
}

/// ffprobe normally ships next to ffmpeg, so look there first.
pub fn locate_ffprobe(ffmpeg: &Path, configured: Option<&Path>) -> PathBuf {
    if configured.is_none() {
        if let Some(dir) = ffmpeg.parent().filter(|d| !d.as_os_str().is_empty()) {
            let sibling = dir.join(executable_name("ffprobe"));
            if sibling.exists() {
                return sibling;
            }
        }
    }
    locate("ffprobe", configured)
}

/// Resolved tool locations for one configuration.
#[derive(Debug, Clone)]
pub struct ToolSet {
    pub ytdlp: PathBuf,
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl ToolSet {
    pub fn discover(config: &AppConfig) -> Self {
        let ytdlp = locate("yt-dlp", config.tools.ytdlp.as_deref());
        let ffmpeg = locate("ffmpeg", config.tools.ffmpeg.as_deref());
        let ffprobe = locate_ffprobe(&ffmpeg, config.tools.ffprobe.as_deref());
        Self { ytdlp, ffmpeg, ffprobe }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_path_wins_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("my-ffmpeg");
        std::fs::write(&tool, b"").unwrap();

        assert_eq!(locate("ffmpeg", Some(&tool)), tool);
    }

    #[test]
    fn ffprobe_is_found_next_to_ffmpeg() {
        let dir = tempfile::tempdir().unwrap();
        let ffmpeg = dir.path().join(executable_name("ffmpeg"));
        let ffprobe = dir.path().join(executable_name("ffprobe"));
        std::fs::write(&ffmpeg, b"").unwrap();
        std::fs::write(&ffprobe, b"").unwrap();

        assert_eq!(locate_ffprobe(&ffmpeg, None), ffprobe);
    }

    #[test]
    fn unknown_program_falls_back_to_bare_name() {
        let name = "clipfetch-definitely-missing-tool";
        assert_eq!(locate(name, None), PathBuf::from(name));
    }
}
