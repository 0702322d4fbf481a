//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$MAILPULL_CONFIG` (environment variable)
//! 2. `~/.config/mailpull/config.toml` (Linux/macOS)
//!    `%APPDATA%\mailpull\config.toml` (Windows)
//! 3. Built-in defaults
//!
//! Command-line flags override individual values after loading.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Remote call pacing and timeouts.
    pub fetch: FetchConfig,
    /// Attachment skip policy.
    pub attachments: AttachmentConfig,
    /// Output naming.
    pub output: OutputConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Override cache directory for logs.
    pub cache_dir: Option<PathBuf>,
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
}

/// Remote call pacing and timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Listing page size; the service never returns more than 500.
    pub page_size: u32,
    /// Timeout for a single message fetch, in seconds.
    pub message_timeout_secs: u64,
    /// Fixed delay before the single retry, in seconds.
    pub retry_backoff_secs: u64,
    /// Pause between two messages, in milliseconds.
    pub item_delay_ms: u64,
    /// Pause before each attachment download, in milliseconds.
    pub attachment_delay_ms: u64,
    /// Overall run time limit, in seconds.
    pub run_timeout_secs: u64,
    /// Transport-level timeout applied to every HTTP request, in seconds.
    pub request_timeout_secs: u64,
    /// Base URL of the mail REST API.
    pub api_base_url: String,
}

/// Attachment skip policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AttachmentConfig {
    /// Attachments reported larger than this many bytes are skipped.
    pub max_size: u64,
    /// Attachment ids longer than this are treated as corrupted metadata.
    pub max_id_len: usize,
    /// Attachments below this size get the short download timeout.
    pub small_size: u64,
    /// Download timeout for small attachments, in seconds.
    pub small_timeout_secs: u64,
    /// Download timeout for all other attachments, in seconds.
    pub timeout_secs: u64,
    /// Leave out parts carrying a `Content-ID` (images embedded in HTML).
    pub skip_inline_images: bool,
    /// Known-bad remote records whose download hangs.
    pub denylist: Vec<DenylistEntry>,
}

/// One known-bad attachment record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenylistEntry {
    /// Message the attachment belongs to.
    pub message_id: String,
    /// Substring of the remote attachment id.
    pub id_contains: String,
    /// Shown in the log when the entry fires.
    #[serde(default)]
    pub reason: String,
}

/// Output naming.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Maximum byte length of `{date}_{subject}`.
    pub prefix_budget: usize,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            log_level: "info".to_string(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            page_size: 500,
            message_timeout_secs: 30,
            retry_backoff_secs: 2,
            item_delay_ms: 100,
            attachment_delay_ms: 50,
            run_timeout_secs: 5 * 60,
            request_timeout_secs: 60,
            api_base_url: "https://gmail.googleapis.com/gmail/v1".to_string(),
        }
    }
}

impl Default for AttachmentConfig {
    fn default() -> Self {
        Self {
            max_size: 10 * 1024 * 1024, // 10 MiB
            max_id_len: 500,
            small_size: 1024,
            small_timeout_secs: 10,
            timeout_secs: 45,
            skip_inline_images: false,
            denylist: vec![DenylistEntry {
                message_id: "19855d64da73b5be".to_string(),
                id_contains: "ANGjdJ".to_string(),
                reason: "barcode image whose data is missing server-side; download hangs"
                    .to_string(),
            }],
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { prefix_budget: 200 }
    }
}

impl FetchConfig {
    pub fn message_timeout(&self) -> Duration {
        Duration::from_secs(self.message_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_secs)
    }

    pub fn item_delay(&self) -> Duration {
        Duration::from_millis(self.item_delay_ms)
    }

    pub fn attachment_delay(&self) -> Duration {
        Duration::from_millis(self.attachment_delay_ms)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// ── Load ────────────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    if let Some(path) = config_file_path() {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded config");
                        return cfg;
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to parse config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to read config file, using defaults"
                    );
                }
            }
        }
    }
    Config::default()
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("MAILPULL_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    dirs::config_dir().map(|d| d.join("mailpull").join("config.toml"))
}

/// Return the cache directory for logs.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailpull")
}
