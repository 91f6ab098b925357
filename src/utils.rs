use std::sync::OnceLock;
use regex::Regex;
use log::info;
use crate::errors::Result;

const KIB: f64 = 1024.0;
const MIB: f64 = 1024.0 * 1024.0;

fn video_id_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?:youtube\.com/watch\?v=|youtu\.be/|youtube\.com/embed/|youtube\.com/shorts/)([a-zA-Z0-9_-]{11})",
            r"youtube\.com/.*[?&]v=([a-zA-Z0-9_-]{11})",
        ]
        .iter()
        .filter_map(|pattern| Regex::new(pattern).ok())
        .collect()
    })
}

/// Rewrites the known YouTube URL shapes to a canonical watch or shorts URL.
/// Anything unrecognised is returned untouched.
pub fn normalize_url(url: &str) -> String {
    for pattern in video_id_patterns() {
        if let Some(video_id) = pattern.captures(url).and_then(|c| c.get(1)) {
            return if is_short(url) {
                format!("https://www.youtube.com/shorts/{}", video_id.as_str())
            } else {
                format!("https://www.youtube.com/watch?v={}", video_id.as_str())
            };
        }
    }
    url.to_string()
}

pub fn is_short(url: &str) -> bool {
    url.to_lowercase().contains("/shorts/")
}

/// Creates a directory if it doesn't exist
pub async fn ensure_dir_exists(path: &std::path::Path) -> Result<()> {
    if !path.exists() {
        tokio::fs::create_dir_all(path).await?;
        info!("Created directory: {:?}", path);
    }
    Ok(())
}

/// Generates a unique ID for download sessions
pub fn generate_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Formats a byte rate with binary scaling, e.g. `1.50 MB/s`.
/// Zero or missing rates produce no value.
pub fn format_speed(bytes_per_sec: Option<f64>) -> Option<String> {
    let speed = bytes_per_sec.filter(|s| s.is_finite() && *s > 0.0)?;
    Some(if speed > MIB {
        format!("{:.2} MB/s", speed / MIB)
    } else if speed > KIB {
        format!("{:.2} KB/s", speed / KIB)
    } else {
        format!("{:.2} B/s", speed)
    })
}

/// Formats an ETA in seconds as `Xm Ys`. Zero or missing produces no value.
pub fn format_eta(eta_secs: Option<u64>) -> Option<String> {
    let eta = eta_secs.filter(|e| *e > 0)?;
    Some(format!("{}m {}s", eta / 60, eta % 60))
}

pub fn bytes_to_mb(bytes: u64) -> f64 {
    (bytes as f64 / MIB * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_watch_and_short_links() {
        assert_eq!(
            normalize_url("https://youtu.be/dQw4w9WgXcQ?si=abc"),
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ"
        );
        assert_eq!(
            normalize_url("https://www.youtube.com/watch?feature=share&v=dQw4w9WgXcQ"),
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ"
        );
        assert_eq!(
            normalize_url("https://youtube.com/shorts/abcdefghijk?feature=share"),
            "https://www.youtube.com/shorts/abcdefghijk"
        );
        assert_eq!(normalize_url("https://vimeo.com/12345"), "https://vimeo.com/12345");
    }

    #[test]
    fn detects_shorts() {
        assert!(is_short("https://www.YouTube.com/Shorts/abcdefghijk"));
        assert!(!is_short("https://www.youtube.com/watch?v=abcdefghijk"));
    }

    #[test]
    fn speed_uses_binary_units() {
        assert_eq!(format_speed(Some(512.0)).as_deref(), Some("512.00 B/s"));
        assert_eq!(format_speed(Some(2048.0)).as_deref(), Some("2.00 KB/s"));
        assert_eq!(format_speed(Some(3.5 * 1024.0 * 1024.0)).as_deref(), Some("3.50 MB/s"));
        assert_eq!(format_speed(None), None);
        assert_eq!(format_speed(Some(0.0)), None);
    }

    #[test]
    fn eta_is_minutes_and_seconds() {
        assert_eq!(format_eta(Some(125)).as_deref(), Some("2m 5s"));
        assert_eq!(format_eta(Some(59)).as_deref(), Some("0m 59s"));
        assert_eq!(format_eta(None), None);
        assert_eq!(format_eta(Some(0)), None);
    }
}
