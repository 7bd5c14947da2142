//! Per-job configuration: crawl, playground, and webhook settings
//!
//! These are the wire shapes accepted by the HTTP API. Validation collects
//! every issue instead of stopping at the first one so a client can fix its
//! request in one pass.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Hard bounds for crawl settings.
pub const MAX_DEPTH_RANGE: (u8, u8) = (1, 10);
pub const MAX_PAGES_RANGE: (usize, usize) = (1, 1000);
pub const MAX_RPM_RANGE: (u32, u32) = (1, 300);
pub const MAX_CONCURRENCY_RANGE: (usize, usize) = (1, 100);
pub const TIMEOUT_RANGE_MS: (u64, u64) = (1_000, 60_000);
pub const WEBHOOK_RETRIES_RANGE: (u32, u32) = (1, 5);

/// Outbound webhook statuses a filter may select.
pub const WEBHOOK_STATUSES: &[&str] = &["started", "progress", "completed", "failed"];

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_max_depth() -> u8 {
    3
}

fn default_max_pages() -> usize {
    100
}

fn default_max_requests_per_minute() -> u32 {
    60
}

fn default_max_concurrency() -> usize {
    5
}

fn default_webhook_retries() -> u32 {
    3
}

/// A single validation failure, pointing at the offending field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

fn check_range<T: PartialOrd + std::fmt::Display>(
    issues: &mut Vec<ValidationIssue>,
    field: &str,
    value: T,
    (min, max): (T, T),
) {
    if value < min || value > max {
        issues.push(ValidationIssue::new(
            field,
            format!("must be between {} and {}, got {}", min, max, value),
        ));
    }
}

/// Page and request timeouts, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeoutConfig {
    /// Budget for loading a single page
    #[serde(default = "default_timeout_ms")]
    pub page: u64,
    /// Budget for auxiliary requests (robots.txt, sitemaps, webhooks)
    #[serde(default = "default_timeout_ms")]
    pub request: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            page: default_timeout_ms(),
            request: default_timeout_ms(),
        }
    }
}

impl TimeoutConfig {
    fn validate(&self, issues: &mut Vec<ValidationIssue>) {
        check_range(issues, "timeout.page", self.page, TIMEOUT_RANGE_MS);
        check_range(issues, "timeout.request", self.request, TIMEOUT_RANGE_MS);
    }
}

/// Webhook delivery settings for a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookConfig {
    /// Destination URL for event POSTs
    pub url: String,
    /// Status filter; when absent, every status is delivered.
    /// Unknown names are ignored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on: Option<Vec<String>>,
    /// Extra headers merged into every delivery
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    /// Total delivery attempts per event
    #[serde(default = "default_webhook_retries")]
    pub retries: u32,
}

impl WebhookConfig {
    /// Whether the filter lets an outbound status through.
    pub fn delivers(&self, status: &str) -> bool {
        match &self.on {
            None => true,
            Some(on) => on.iter().any(|s| s == status),
        }
    }

    /// Statuses this webhook will actually receive.
    pub fn expected_updates(&self) -> Vec<String> {
        WEBHOOK_STATUSES
            .iter()
            .filter(|s| self.delivers(s))
            .map(|s| s.to_string())
            .collect()
    }

    fn validate(&self, issues: &mut Vec<ValidationIssue>) {
        match url::Url::parse(&self.url) {
            Ok(u) if u.scheme() == "http" || u.scheme() == "https" => {}
            Ok(u) => issues.push(ValidationIssue::new(
                "webhook.url",
                format!("unsupported scheme '{}'", u.scheme()),
            )),
            Err(e) => issues.push(ValidationIssue::new(
                "webhook.url",
                format!("not a valid URL: {}", e),
            )),
        }
        check_range(
            issues,
            "webhook.retries",
            self.retries,
            WEBHOOK_RETRIES_RANGE,
        );
    }
}

/// Configuration for one crawl job.
///
/// `url` is not part of the request body; the HTTP layer fills it in from the
/// `{siteDomain}` path segment after normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlConfig {
    /// Starting URL, derived from the requested domain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default = "default_max_depth")]
    pub max_depth: u8,
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
    #[serde(default = "default_max_requests_per_minute")]
    pub max_requests_per_minute: u32,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default)]
    pub timeout: TimeoutConfig,
    /// Extra headers sent with every page fetch
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub respect_robots_txt: bool,
    /// Optional sitemap whose `<loc>` entries seed the frontier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sitemap_url: Option<String>,
    /// Regex patterns a discovered URL must match to be crawled
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include_patterns: Vec<String>,
    /// Regex patterns that exclude a discovered URL
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_patterns: Vec<String>,
    /// Required; its absence is a validation issue, not a parse error
    #[serde(default)]
    pub webhook: Option<WebhookConfig>,
}

impl CrawlConfig {
    /// Validate every field, collecting all issues.
    pub fn validate(&self) -> Result<(), Vec<ValidationIssue>> {
        let mut issues = Vec::new();

        check_range(&mut issues, "maxDepth", self.max_depth, MAX_DEPTH_RANGE);
        check_range(&mut issues, "maxPages", self.max_pages, MAX_PAGES_RANGE);
        check_range(
            &mut issues,
            "maxRequestsPerMinute",
            self.max_requests_per_minute,
            MAX_RPM_RANGE,
        );
        check_range(
            &mut issues,
            "maxConcurrency",
            self.max_concurrency,
            MAX_CONCURRENCY_RANGE,
        );
        self.timeout.validate(&mut issues);

        if let Some(sitemap) = &self.sitemap_url {
            if url::Url::parse(sitemap).is_err() {
                issues.push(ValidationIssue::new("sitemapUrl", "not a valid URL"));
            }
        }
        for (field, patterns) in [
            ("includePatterns", &self.include_patterns),
            ("excludePatterns", &self.exclude_patterns),
        ] {
            for p in patterns {
                if regex::Regex::new(p).is_err() {
                    issues.push(ValidationIssue::new(field, format!("invalid regex '{}'", p)));
                }
            }
        }
        match &self.webhook {
            Some(webhook) => webhook.validate(&mut issues),
            None => issues.push(ValidationIssue::new("webhook", "webhook is required")),
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }
}

/// Configuration for one playground job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaygroundConfig {
    /// Opaque input handed to every plugin; its absence is a validation
    /// issue, not a parse error
    #[serde(default)]
    pub input: serde_json::Value,
    /// Per-plugin execute retries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
    /// Names of registered plugins to run; absent means all
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugins: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook: Option<WebhookConfig>,
}

impl PlaygroundConfig {
    pub fn validate(&self) -> Result<(), Vec<ValidationIssue>> {
        let mut issues = Vec::new();

        if self.input.is_null() {
            issues.push(ValidationIssue::new("input", "input is required"));
        }
        if let Some(retries) = self.retries {
            if retries > 10 {
                issues.push(ValidationIssue::new("retries", "must be at most 10"));
            }
        }
        if let Some(plugins) = &self.plugins {
            if plugins.is_empty() {
                issues.push(ValidationIssue::new(
                    "plugins",
                    "must name at least one plugin when present",
                ));
            }
        }
        if let Some(webhook) = &self.webhook {
            webhook.validate(&mut issues);
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_webhook() -> WebhookConfig {
        WebhookConfig {
            url: "https://example.com/hook".to_string(),
            on: None,
            headers: HashMap::new(),
            retries: 3,
        }
    }

    fn valid_crawl_config() -> CrawlConfig {
        serde_json::from_value(serde_json::json!({
            "webhook": { "url": "https://example.com/hook" }
        }))
        .unwrap()
    }

    // ========================================================================
    // CrawlConfig defaults and validation
    // ========================================================================

    #[test]
    fn crawl_config_defaults() {
        let cfg = valid_crawl_config();
        assert_eq!(cfg.max_depth, 3);
        assert_eq!(cfg.max_pages, 100);
        assert_eq!(cfg.max_requests_per_minute, 60);
        assert_eq!(cfg.max_concurrency, 5);
        assert_eq!(cfg.timeout.page, 30_000);
        assert_eq!(cfg.timeout.request, 30_000);
        assert!(!cfg.respect_robots_txt);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_out_of_range_depth() {
        let mut cfg = valid_crawl_config();
        cfg.max_depth = 11;
        let issues = cfg.validate().unwrap_err();
        assert!(issues.iter().any(|i| i.field == "maxDepth"));
    }

    #[test]
    fn validate_rejects_zero_pages() {
        let mut cfg = valid_crawl_config();
        cfg.max_pages = 0;
        let issues = cfg.validate().unwrap_err();
        assert!(issues.iter().any(|i| i.field == "maxPages"));
    }

    #[test]
    fn validate_rejects_timeout_below_one_second() {
        let mut cfg = valid_crawl_config();
        cfg.timeout.page = 500;
        let issues = cfg.validate().unwrap_err();
        assert!(issues.iter().any(|i| i.field == "timeout.page"));
    }

    #[test]
    fn validate_collects_multiple_issues() {
        let mut cfg = valid_crawl_config();
        cfg.max_depth = 0;
        cfg.max_requests_per_minute = 1000;
        cfg.webhook.as_mut().unwrap().retries = 9;
        let issues = cfg.validate().unwrap_err();
        assert_eq!(issues.len(), 3);
    }

    #[test]
    fn validate_rejects_invalid_regex_pattern() {
        let mut cfg = valid_crawl_config();
        cfg.exclude_patterns = vec!["(unclosed".to_string()];
        let issues = cfg.validate().unwrap_err();
        assert!(issues.iter().any(|i| i.field == "excludePatterns"));
    }

    #[test]
    fn crawl_config_requires_webhook() {
        let cfg: CrawlConfig =
            serde_json::from_value(serde_json::json!({ "maxDepth": 2 })).unwrap();
        let issues = cfg.validate().unwrap_err();
        assert!(issues.iter().any(|i| i.field == "webhook"));
    }

    // ========================================================================
    // WebhookConfig
    // ========================================================================

    #[test]
    fn webhook_delivers_everything_without_filter() {
        let cfg = valid_webhook();
        for status in WEBHOOK_STATUSES {
            assert!(cfg.delivers(status));
        }
    }

    #[test]
    fn webhook_filter_limits_statuses() {
        let mut cfg = valid_webhook();
        cfg.on = Some(vec!["completed".to_string(), "failed".to_string()]);
        assert!(!cfg.delivers("started"));
        assert!(!cfg.delivers("progress"));
        assert!(cfg.delivers("completed"));
        assert!(cfg.delivers("failed"));
        assert_eq!(cfg.expected_updates(), vec!["completed", "failed"]);
    }

    fn webhook_issues(cfg: &WebhookConfig) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        cfg.validate(&mut issues);
        issues
    }

    #[test]
    fn webhook_filter_ignores_unknown_names() {
        let mut cfg = valid_webhook();
        cfg.on = Some(vec!["bogus".to_string(), "completed".to_string()]);
        assert!(webhook_issues(&cfg).is_empty());
        assert_eq!(cfg.expected_updates(), vec!["completed"]);
    }

    #[test]
    fn webhook_rejects_non_http_url() {
        let mut cfg = valid_webhook();
        cfg.url = "ftp://example.com/hook".to_string();
        let issues = webhook_issues(&cfg);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].field, "webhook.url");
    }

    #[test]
    fn webhook_rejects_out_of_range_retries() {
        let mut cfg = valid_webhook();
        cfg.retries = 0;
        assert!(webhook_issues(&cfg).iter().any(|i| i.field == "webhook.retries"));
    }

    // ========================================================================
    // PlaygroundConfig
    // ========================================================================

    #[test]
    fn playground_config_minimal() {
        let cfg: PlaygroundConfig =
            serde_json::from_value(serde_json::json!({ "input": "hello" })).unwrap();
        assert!(cfg.validate().is_ok());
        assert!(cfg.plugins.is_none());
        assert!(cfg.webhook.is_none());
    }

    #[test]
    fn playground_rejects_null_input() {
        let cfg: PlaygroundConfig =
            serde_json::from_value(serde_json::json!({ "input": null })).unwrap();
        let issues = cfg.validate().unwrap_err();
        assert!(issues.iter().any(|i| i.field == "input"));
    }

    #[test]
    fn playground_rejects_empty_plugin_list() {
        let cfg: PlaygroundConfig = serde_json::from_value(serde_json::json!({
            "input": "x",
            "plugins": []
        }))
        .unwrap();
        assert!(cfg.validate().is_err());
    }
}
