//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$MAILATTACH_CONFIG` (environment variable)
//! 2. `~/.config/mailattach/config.toml` (Linux/macOS)
//!    `%APPDATA%\mailattach\config.toml` (Windows)
//! 3. Built-in defaults

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// 25 MiB, the default budget for a single attachment and for a whole message.
pub const DEFAULT_MAX_BYTES: u64 = 25 * 1024 * 1024;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Upload size ceilings.
    pub limits: LimitsConfig,
    /// Fetch/decrypt tuning.
    pub fetch: FetchConfig,
    /// Fetched-attachment cache policy.
    pub cache: CacheConfig,
    /// Download defaults.
    pub download: DownloadConfig,
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

/// Upload size ceilings.
///
/// Both limits apply: a file is rejected if it alone exceeds
/// `max_attachment_bytes`, or if the attachments already on the draft plus
/// the new file exceed `max_message_bytes`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LimitsConfig {
    /// Byte budget for all attachments of one message.
    pub max_message_bytes: u64,
    /// Byte ceiling for a single attachment.
    pub max_attachment_bytes: u64,
}

/// Fetch/decrypt tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Maximum number of attachments retrieved and decrypted at once.
    pub max_concurrency: usize,
    /// Timeout for HTTP ciphertext downloads, in seconds.
    pub http_timeout_secs: u64,
}

/// Eviction policy for the fetched-attachment cache.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CachePolicy {
    /// Entries live for the whole session.
    Unbounded,
    /// Least-recently-used entries are dropped past `capacity`.
    Lru,
}

/// Fetched-attachment cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Eviction policy.
    pub policy: CachePolicy,
    /// Entry capacity, only used by the `lru` policy.
    pub capacity: usize,
}

/// Download defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Default output directory.
    pub default_output_dir: Option<PathBuf>,
    /// Base name for multi-attachment zip archives (without `.zip`).
    pub archive_name: String,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            log_level: "warn".to_string(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_message_bytes: DEFAULT_MAX_BYTES,
            max_attachment_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 6,
            http_timeout_secs: 60,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            policy: CachePolicy::Unbounded,
            capacity: 256,
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            default_output_dir: None,
            archive_name: "attachments".to_string(),
        }
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
    if let Ok(env_path) = std::env::var("MAILATTACH_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    dirs::config_dir().map(|d| d.join("mailattach").join("config.toml"))
}

/// Return the cache directory for logs.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailattach")
}

/// Return the log file path.
pub fn log_file_path(config: &Config) -> PathBuf {
    cache_dir(config).join("mailattach.log")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.limits.max_message_bytes, 25 * 1024 * 1024);
        assert_eq!(cfg.limits.max_attachment_bytes, 25 * 1024 * 1024);
        assert_eq!(cfg.fetch.max_concurrency, 6);
        assert_eq!(cfg.cache.policy, CachePolicy::Unbounded);
        assert_eq!(cfg.general.log_level, "warn");
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let partial = r#"
[limits]
max_attachment_bytes = 1048576

[cache]
policy = "lru"
capacity = 8
"#;
        let cfg: Config = toml::from_str(partial).expect("parse partial");
        assert_eq!(cfg.limits.max_attachment_bytes, 1_048_576);
        assert_eq!(cfg.limits.max_message_bytes, DEFAULT_MAX_BYTES);
        assert_eq!(cfg.cache.policy, CachePolicy::Lru);
        assert_eq!(cfg.cache.capacity, 8);
        assert_eq!(cfg.download.archive_name, "attachments");
    }

    #[test]
    fn test_unknown_policy_is_rejected() {
        let bad = "[cache]\npolicy = \"fifo\"\n";
        assert!(toml::from_str::<Config>(bad).is_err());
    }

    #[test]
    fn test_log_file_under_cache_dir() {
        let mut cfg = Config::default();
        cfg.general.cache_dir = Some(PathBuf::from("/tmp/mailattach-test"));
        assert_eq!(
            log_file_path(&cfg),
            PathBuf::from("/tmp/mailattach-test/mailattach.log")
        );
    }
}
