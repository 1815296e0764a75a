//! Normalization of share-style video URLs into direct-fetch form
//!
//! Google Drive share links embed the file identifier in the path
//! (`/file/d/<id>/view`); the analysis services need the direct download
//! form. Anything that does not match a known share pattern passes through
//! unchanged, so normalization is total and idempotent.

use regex::Regex;
use std::sync::OnceLock;

fn drive_share_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"/file/d/([a-zA-Z0-9_-]+)/").expect("valid drive share pattern")
    })
}

/// Rewrite a recognized share link to its direct-download form
///
/// Returns the input unchanged when no pattern matches.
#[must_use]
pub fn normalize_source_url(url: &str) -> String {
    if url.starts_with("http") && url.contains("drive.google.com") {
        if let Some(captures) = drive_share_pattern().captures(url) {
            let file_id = &captures[1];
            return format!("https://drive.google.com/uc?export=download&id={file_id}");
        }
    }
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drive_share_link_rewritten() {
        assert_eq!(
            normalize_source_url("https://drive.google.com/file/d/ABC123/view"),
            "https://drive.google.com/uc?export=download&id=ABC123"
        );
    }

    #[test]
    fn test_drive_share_link_with_query_rewritten() {
        assert_eq!(
            normalize_source_url("https://drive.google.com/file/d/a_b-9/view?usp=sharing"),
            "https://drive.google.com/uc?export=download&id=a_b-9"
        );
    }

    #[test]
    fn test_non_drive_url_passes_through() {
        let url = "https://example.com/videos/demo.mp4";
        assert_eq!(normalize_source_url(url), url);
    }

    #[test]
    fn test_drive_url_without_file_segment_passes_through() {
        let url = "https://drive.google.com/uc?export=download&id=ABC123";
        assert_eq!(normalize_source_url(url), url);
    }

    #[test]
    fn test_local_path_passes_through() {
        let path = "/tmp/upload_1234.mp4";
        assert_eq!(normalize_source_url(path), path);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let inputs = [
            "https://drive.google.com/file/d/ABC123/view",
            "https://example.com/videos/demo.mp4",
            "/tmp/upload.mp4",
        ];
        for input in inputs {
            let once = normalize_source_url(input);
            assert_eq!(normalize_source_url(&once), once);
        }
    }
}
