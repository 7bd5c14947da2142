//! Crawl job handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{debug, error};
use url::Url;

use crate::config::CrawlConfig;
use crate::crawler::CreateOptions;
use crate::job::{EngineError, QueueError};

use super::super::types::{CrawlAcceptedResponse, ErrorResponse, QueueInfo, WebhookEcho};
use super::AppState;

/// Parse a job ID path segment.
pub(super) fn parse_job_id(job_id: &str) -> Result<uuid::Uuid, Response> {
    uuid::Uuid::parse_str(job_id).map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("Invalid job ID", "not a UUID")),
        )
            .into_response()
    })
}

/// Normalize a `{siteDomain}` path segment into a start URL.
///
/// The domain is prefixed with `https://` (falling back to `http://`) and
/// reduced to its hostname.
fn normalize_domain(raw: &str) -> Option<Url> {
    for scheme in ["https", "http"] {
        if let Ok(url) = Url::parse(&format!("{}://{}", scheme, raw)) {
            if let Some(host) = url.host_str() {
                if !host.is_empty() {
                    return Url::parse(&format!("{}://{}/", scheme, host)).ok();
                }
            }
        }
    }
    None
}

/// Submit a crawl job against a domain
pub async fn start_crawl(
    State(state): State<AppState>,
    Path(site_domain): Path<String>,
    Json(mut config): Json<CrawlConfig>,
) -> impl IntoResponse {
    let Some(start_url) = normalize_domain(&site_domain) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::invalid_domain(format!(
                "'{}' does not contain a usable hostname",
                site_domain
            ))),
        )
            .into_response();
    };

    if let Err(issues) = config.validate() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::invalid_configuration(issues)),
        )
            .into_response();
    }
    config.url = Some(start_url.to_string());

    debug!(
        domain = %site_domain,
        max_depth = config.max_depth,
        max_pages = config.max_pages,
        "crawl submission"
    );

    let Some(webhook) = config.webhook.clone() else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("Invalid configuration", "webhook is required")),
        )
            .into_response();
    };
    match state.crawler.create_job(config, CreateOptions::default()) {
        Ok(created) => {
            let (pending, is_processing) = state.crawler.queue_state();
            let position = created.queue_position.unwrap_or(pending.max(1));
            let estimated_start = if position <= 1 && !is_processing {
                "immediate".to_string()
            } else {
                let ahead = position.saturating_sub(1) + usize::from(is_processing);
                format!("after {} job(s)", ahead)
            };

            (
                StatusCode::OK,
                Json(CrawlAcceptedResponse {
                    message: format!("Crawl of {} accepted", start_url),
                    job_id: created.job.id,
                    status: "accepted".to_string(),
                    queue_info: QueueInfo {
                        position,
                        is_processing,
                        estimated_start,
                    },
                    webhook: WebhookEcho {
                        url: webhook.url.clone(),
                        expected_updates: webhook.expected_updates(),
                    },
                }),
            )
                .into_response()
        }
        Err(EngineError::Queue(QueueError::Saturated { max })) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse::queue_full(format!(
                "queue is at its limit of {} pending jobs",
                max
            ))),
        )
            .into_response(),
        Err(e) => {
            error!("crawl job creation failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::internal(e.to_string())),
            )
                .into_response()
        }
    }
}

/// Fetch a crawl job by ID
pub async fn get_crawl_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Response {
    let id = match parse_job_id(&job_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match state.crawler.get_job(&id) {
        Some(job) => (StatusCode::OK, Json(job)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::not_found(format!("job {} not found", id))),
        )
            .into_response(),
    }
}

/// Fetch a crawl job's progress by ID
pub async fn get_crawl_progress(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Response {
    let id = match parse_job_id(&job_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match state.crawler.get_progress(&id) {
        Some(progress) => (StatusCode::OK, Json(progress)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::not_found(format!("job {} not found", id))),
        )
            .into_response(),
    }
}
