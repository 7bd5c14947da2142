//! Logging setup
//!
//! The configured level is an `EnvFilter` directive, so `"info"` works and
//! so does `"crawld=debug,hyper=warn"`. `RUST_LOG` overrides the config for
//! a single run.

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. "info" or "crawld=debug,hyper=warn"
    pub level: String,
    /// Emit one JSON object per line instead of human-readable text
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl LoggingConfig {
    /// Whether the configured level parses as a filter directive.
    pub fn is_valid_level(&self) -> bool {
        EnvFilter::try_new(&self.level).is_ok()
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.level))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    }

    /// Install the global tracing subscriber.
    pub fn init(&self) {
        let builder = tracing_subscriber::fmt().with_env_filter(self.filter());
        if self.json {
            builder.json().init();
        } else {
            builder.init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_plain_info() {
        let cfg = LoggingConfig::default();
        assert_eq!(cfg.level, "info");
        assert!(!cfg.json);
        assert!(cfg.is_valid_level());
    }

    #[test]
    fn accepts_per_target_directives() {
        let cfg = LoggingConfig {
            level: "crawld=debug,hyper=warn".to_string(),
            json: true,
        };
        assert!(cfg.is_valid_level());
    }

    #[test]
    fn rejects_malformed_directives() {
        let cfg = LoggingConfig {
            level: "===".to_string(),
            json: false,
        };
        assert!(!cfg.is_valid_level());
    }

    #[test]
    fn deserializes_with_partial_fields() {
        let cfg: LoggingConfig = toml::from_str("json = true").unwrap();
        assert!(cfg.json);
        assert_eq!(cfg.level, "info");
    }
}
