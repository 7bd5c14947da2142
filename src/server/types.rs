//! HTTP API request/response types

use serde::{Deserialize, Serialize};

use crate::config::{PlaygroundConfig, ValidationIssue};
use crate::job::JobId;

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error kind, e.g. "Invalid domain"
    pub error: String,
    /// Human-readable detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Field-level validation issues
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issues: Option<Vec<ValidationIssue>>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: Some(message.into()),
            issues: None,
        }
    }

    pub fn invalid_domain(message: impl Into<String>) -> Self {
        Self::new("Invalid domain", message)
    }

    pub fn invalid_configuration(issues: Vec<ValidationIssue>) -> Self {
        Self {
            error: "Invalid configuration".to_string(),
            message: None,
            issues: Some(issues),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("Not found", message)
    }

    pub fn queue_full(message: impl Into<String>) -> Self {
        Self::new("Queue full", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("Internal error", message)
    }
}

/// Where a newly accepted job sits in the queue
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueInfo {
    /// 1-based position at enqueue time
    pub position: usize,
    /// Whether a job currently holds the execution slot
    pub is_processing: bool,
    /// Human-readable start estimate
    pub estimated_start: String,
}

/// Webhook echo returned to the submitter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEcho {
    pub url: String,
    /// Statuses this webhook will receive, after filtering
    pub expected_updates: Vec<String>,
}

/// Response to an accepted crawl submission
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlAcceptedResponse {
    pub message: String,
    pub job_id: JobId,
    /// Always "accepted"
    pub status: String,
    pub queue_info: QueueInfo,
    pub webhook: WebhookEcho,
}

/// Playground job submission body
#[derive(Debug, Clone, Deserialize)]
pub struct PlaygroundJobRequest {
    #[serde(flatten)]
    pub config: PlaygroundConfig,
    /// When true, return as soon as the job is running
    #[serde(rename = "async", default)]
    pub run_async: bool,
}

/// Response to an accepted asynchronous playground submission
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaygroundAcceptedResponse {
    pub job_id: JobId,
    /// "accepted"
    pub status: String,
    pub message: String,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn playground_request_parses_flattened_config() {
        let req: PlaygroundJobRequest = serde_json::from_value(json!({
            "input": "hello",
            "plugins": ["reverse"],
            "async": true
        }))
        .unwrap();
        assert!(req.run_async);
        assert_eq!(req.config.plugins.as_deref().unwrap(), ["reverse"]);
    }

    #[test]
    fn playground_request_defaults_to_sync() {
        let req: PlaygroundJobRequest =
            serde_json::from_value(json!({ "input": "x" })).unwrap();
        assert!(!req.run_async);
    }

    #[test]
    fn error_response_skips_absent_fields() {
        let v = serde_json::to_value(ErrorResponse::invalid_domain("no hostname")).unwrap();
        assert_eq!(v["error"], "Invalid domain");
        assert_eq!(v["message"], "no hostname");
        assert!(v.get("issues").is_none());
    }
}
