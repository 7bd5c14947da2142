//! HTTP API route definitions

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{self, AppState};

/// Create the API router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health))
        // Crawl jobs
        .route("/crawl/:site_domain", post(handlers::start_crawl))
        .route("/crawl/jobs/:job_id", get(handlers::get_crawl_job))
        .route(
            "/crawl/jobs/:job_id/progress",
            get(handlers::get_crawl_progress),
        )
        .route("/crawl/jobs/:job_id/events", get(handlers::job_events_sse))
        // Playground jobs
        .route("/playground/jobs", post(handlers::create_playground_job))
        .route(
            "/playground/jobs/:job_id/start",
            post(handlers::start_playground_job),
        )
        .route("/playground/jobs/:job_id", get(handlers::get_playground_job))
        .route(
            "/playground/jobs/:job_id/progress",
            get(handlers::get_playground_progress),
        )
        .route(
            "/playground/jobs/:job_id/events",
            get(handlers::job_events_sse),
        )
        .with_state(state)
}
