//! Playground job handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{debug, error};

use crate::job::{EngineError, JobStatus, QueueError};

use super::super::types::{ErrorResponse, PlaygroundAcceptedResponse, PlaygroundJobRequest};
use super::crawl::parse_job_id;
use super::AppState;

/// Submit a playground job.
///
/// Synchronous mode (default) runs the pipeline within the request and
/// returns the final job; `async: true` returns as soon as the job is
/// running.
pub async fn create_playground_job(
    State(state): State<AppState>,
    Json(request): Json<PlaygroundJobRequest>,
) -> Response {
    if let Err(issues) = request.config.validate() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::invalid_configuration(issues)),
        )
            .into_response();
    }

    debug!(run_async = request.run_async, "playground submission");

    if request.run_async {
        match state.playground.create_and_start(request.config).await {
            Ok(job) => (
                StatusCode::OK,
                Json(PlaygroundAcceptedResponse {
                    job_id: job.id,
                    status: "accepted".to_string(),
                    message: format!("job is {}", job.progress.status),
                }),
            )
                .into_response(),
            Err(e) => engine_error(e),
        }
    } else {
        match state.playground.create_and_run(request.config).await {
            Ok(job) => (StatusCode::OK, Json(job)).into_response(),
            Err(e) => engine_error(e),
        }
    }
}

/// Idempotent start gate: runs a queued job, returns the current job
/// otherwise.
pub async fn start_playground_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Response {
    let id = match parse_job_id(&job_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let Some(job) = state.playground.get_job(&id) else {
        return not_found(id);
    };

    if job.progress.status != JobStatus::Queued {
        return (StatusCode::OK, Json(job)).into_response();
    }

    match state.playground.start_job(id).await {
        Ok(job) => (StatusCode::OK, Json(job)).into_response(),
        // Lost the race to another starter; report the current state
        Err(_) => match state.playground.get_job(&id) {
            Some(job) => (StatusCode::OK, Json(job)).into_response(),
            None => not_found(id),
        },
    }
}

/// Fetch a playground job by ID
pub async fn get_playground_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Response {
    let id = match parse_job_id(&job_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match state.playground.get_job(&id) {
        Some(job) => (StatusCode::OK, Json(job)).into_response(),
        None => not_found(id),
    }
}

/// Fetch a playground job's progress by ID
pub async fn get_playground_progress(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Response {
    let id = match parse_job_id(&job_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match state.playground.get_progress(&id) {
        Some(progress) => (StatusCode::OK, Json(progress)).into_response(),
        None => not_found(id),
    }
}

fn not_found(id: uuid::Uuid) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse::not_found(format!("job {} not found", id))),
    )
        .into_response()
}

fn engine_error(e: anyhow::Error) -> Response {
    if let Some(EngineError::Queue(QueueError::Saturated { max })) =
        e.downcast_ref::<EngineError>()
    {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse::queue_full(format!(
                "queue is at its limit of {} pending jobs",
                max
            ))),
        )
            .into_response();
    }
    error!("playground job failed: {:#}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::internal(e.to_string())),
    )
        .into_response()
}
