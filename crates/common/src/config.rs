//! Process-wide configuration
//!
//! Built once from the environment in `main` and passed into each component
//! explicitly; no component reads ambient process state after startup.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Speech-to-text service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    /// Base URL of the transcription HTTP endpoint
    pub base_url: String,
    /// Per-request timeout; the remote operation is long-running
    pub timeout_secs: u64,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            base_url: std::env::var("TRANSCRIBE_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:9000".to_string()),
            timeout_secs: std::env::var("TRANSCRIBE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(600),
        }
    }
}

/// Video indexing / visual analysis service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualConfig {
    /// Base URL of the indexing service
    pub base_url: String,
    /// API key; absent key disables the adapter with an explicit error
    pub api_key: Option<String>,
    /// Seconds between indexing status polls
    pub poll_interval_secs: u64,
    /// Maximum status polls before the wait is abandoned
    pub poll_max_attempts: u32,
    /// Per-request timeout for indexing and analysis calls
    pub timeout_secs: u64,
}

impl Default for VisualConfig {
    fn default() -> Self {
        Self {
            base_url: std::env::var("VISUAL_BASE_URL")
                .unwrap_or_else(|_| "https://api.twelvelabs.io/v1.3".to_string()),
            api_key: std::env::var("VISUAL_API_KEY").ok(),
            poll_interval_secs: std::env::var("VISUAL_POLL_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            poll_max_attempts: std::env::var("VISUAL_POLL_MAX_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(120),
            timeout_secs: std::env::var("VISUAL_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(600),
        }
    }
}

/// Text-generation (LLM) service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of the text-generation endpoint
    pub base_url: String,
    /// API key; when absent the comparison engine runs as a disabled stub
    pub api_key: Option<String>,
    /// Per-request timeout
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: std::env::var("LLM_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:9100".to_string()),
            api_key: std::env::var("LLM_API_KEY").ok(),
            timeout_secs: std::env::var("LLM_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(120),
        }
    }
}

/// Identity-provider settings for bearer-token verification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Identity-provider domain, e.g. `tenant.auth0.com`
    pub domain: String,
    /// Expected `aud` claim
    pub audience: String,
}

impl AuthConfig {
    /// Read the provider settings; `None` when either variable is unset,
    /// which degrades verification to a local-principal stub.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let domain = std::env::var("AUTH_DOMAIN").ok()?;
        let audience = std::env::var("AUTH_AUDIENCE").ok()?;
        Some(Self { domain, audience })
    }
}

/// Top-level application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// HTTP bind address
    pub bind_addr: String,
    /// SQLite database path for the job store
    pub db_path: PathBuf,
    /// Directory for report artifacts
    pub reports_dir: PathBuf,
    /// Transcription service settings
    pub transcription: TranscriptionConfig,
    /// Visual analysis service settings
    pub visual: VisualConfig,
    /// Text-generation service settings
    pub llm: LlmConfig,
    /// Identity-provider settings; `None` disables verification
    pub auth: Option<AuthConfig>,
    /// Number of concurrent pipeline workers
    pub worker_concurrency: usize,
    /// Pending-run queue depth; admission control for in-flight jobs
    pub queue_depth: usize,
}

impl AppConfig {
    /// Load configuration from the environment
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            bind_addr: std::env::var("RECON_BIND_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            db_path: std::env::var("RECON_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data/jobs.db")),
            reports_dir: std::env::var("RECON_REPORTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("reports")),
            transcription: TranscriptionConfig::default(),
            visual: VisualConfig::default(),
            llm: LlmConfig::default(),
            auth: AuthConfig::from_env(),
            worker_concurrency: std::env::var("RECON_WORKER_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(4),
            queue_depth: std::env::var("RECON_QUEUE_DEPTH")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(32),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcription_defaults() {
        let config = TranscriptionConfig {
            base_url: "http://localhost:9000".to_string(),
            timeout_secs: 600,
        };
        assert_eq!(config.timeout_secs, 600);
    }

    #[test]
    fn test_visual_poll_bounds_are_positive() {
        let config = VisualConfig::default();
        assert!(config.poll_interval_secs > 0);
        assert!(config.poll_max_attempts > 0);
    }

    #[test]
    fn test_app_config_from_env_has_sane_defaults() {
        let config = AppConfig::from_env();
        assert!(config.worker_concurrency > 0);
        assert!(config.queue_depth > 0);
        assert!(!config.bind_addr.is_empty());
    }
}
