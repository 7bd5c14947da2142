//! Configuration for crawld

mod job;
mod logging;

pub use job::{
    CrawlConfig, PlaygroundConfig, TimeoutConfig, ValidationIssue, WebhookConfig,
    WEBHOOK_STATUSES,
};
pub use logging::LoggingConfig;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default user agent for all HTTP requests (page fetches, robots.txt, sitemaps)
pub const DEFAULT_USER_AGENT: &str = "CrawldBot/1.0 (+https://github.com/crawld)";

/// HTTP API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Listen address for the HTTP server (e.g., "0.0.0.0:8080")
    pub listen_addr: String,
    /// Enable CORS (useful for browser-based clients)
    pub cors_enabled: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            cors_enabled: false,
        }
    }
}

/// Job queue configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum number of queued jobs before enqueues are rejected with 503.
    /// Absent means unbounded.
    #[serde(default)]
    pub max_pending: Option<usize>,
}

/// Job retention configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    /// How long to retain terminal jobs before they are swept, in seconds.
    /// Absent disables sweeping.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: Option<u64>,
}

fn default_retention_secs() -> Option<u64> {
    Some(3600)
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            retention_secs: default_retention_secs(),
        }
    }
}

/// Main configuration for the crawld server
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP API server configuration
    #[serde(default)]
    pub http: HttpConfig,
    /// Job queue configuration
    #[serde(default)]
    pub queue: QueueConfig,
    /// Job retention configuration
    #[serde(default)]
    pub jobs: JobsConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e)
        })?;
        let config: Config = toml::from_str(&content).map_err(|e| {
            anyhow::anyhow!("Failed to parse config file '{}': {}", path.display(), e)
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration fields.
    ///
    /// Collects all validation errors and reports them together so the user
    /// can fix everything in one pass.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if self.http.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!(
                "http listen_addr '{}' is not a valid socket address",
                self.http.listen_addr
            ));
        }
        if let Some(max) = self.queue.max_pending {
            if max == 0 {
                errors.push("queue max_pending must be positive when set".to_string());
            }
        }
        if let Some(retention) = self.jobs.retention_secs {
            if retention == 0 {
                errors.push("jobs retention_secs must be positive when set".to_string());
            }
        }
        if !self.logging.is_valid_level() {
            errors.push(format!(
                "logging level '{}' is not a valid filter directive",
                self.logging.level
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }
    }

    /// Commented default configuration written by `crawld init`.
    pub fn default_toml() -> &'static str {
        r#"# crawld configuration

[http]
# Address the HTTP API listens on
listen_addr = "127.0.0.1:8080"
# Allow browser clients from other origins
cors_enabled = false

[queue]
# Maximum queued jobs before new submissions get 503.
# Comment out for an unbounded queue.
max_pending = 100

[jobs]
# Seconds to keep finished jobs around for status lookups
retention_secs = 3600

[logging]
# EnvFilter directive: "info", "crawld=debug,hyper=warn", ...
level = "info"
# One JSON object per line instead of human-readable text
json = false
"#
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_passes_validation() {
        let cfg = Config::default();
        assert!(cfg.validate().is_ok(), "default config should be valid");
    }

    #[test]
    fn default_toml_round_trips() {
        let cfg: Config = toml::from_str(Config::default_toml()).unwrap();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.queue.max_pending, Some(100));
        assert_eq!(cfg.jobs.retention_secs, Some(3600));
    }

    #[test]
    fn validate_rejects_bad_listen_addr() {
        let mut cfg = Config::default();
        cfg.http.listen_addr = "not-an-addr".to_string();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("listen_addr"));
    }

    #[test]
    fn validate_rejects_zero_max_pending() {
        let mut cfg = Config::default();
        cfg.queue.max_pending = Some(0);
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("max_pending"));
    }

    #[test]
    fn validate_rejects_bad_logging_level() {
        let mut cfg = Config::default();
        cfg.logging.level = "===".to_string();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("logging level"));
    }

    #[test]
    fn validate_collects_multiple_errors() {
        let mut cfg = Config::default();
        cfg.http.listen_addr = "nope".to_string();
        cfg.jobs.retention_secs = Some(0);
        let msg = cfg.validate().unwrap_err().to_string();
        assert!(msg.contains("listen_addr"));
        assert!(msg.contains("retention_secs"));
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.http.listen_addr, "127.0.0.1:8080");
        assert!(cfg.queue.max_pending.is_none());
    }
}
