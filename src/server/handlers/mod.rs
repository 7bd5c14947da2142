//! HTTP request handlers

mod crawl;
mod events;
mod playground;

pub use crawl::{get_crawl_job, get_crawl_progress, start_crawl};
pub use events::job_events_sse;
pub use playground::{
    create_playground_job, get_playground_job, get_playground_progress, start_playground_job,
};

use std::sync::Arc;

use axum::{http::StatusCode, Json};

use crate::crawler::CrawlEngine;
use crate::events::EventBus;
use crate::job::JobStore;
use crate::playground::PlaygroundEngine;

use super::types::HealthResponse;

/// Shared state injected into every handler
#[derive(Clone)]
pub struct AppState {
    pub crawler: Arc<CrawlEngine>,
    pub playground: Arc<PlaygroundEngine>,
    pub store: Arc<JobStore>,
    pub bus: EventBus,
}

/// Health check
pub async fn health() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            healthy: true,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}
