//! Per-job SSE event stream

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    Json,
};
use serde_json::json;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tracing::{debug, warn};

use super::super::types::ErrorResponse;
use super::crawl::parse_job_id;
use super::AppState;

/// Keep-alive comment cadence for idle streams
const SSE_KEEPALIVE: Duration = Duration::from_secs(20);

/// Stream one job's bus events as SSE.
///
/// Each bus event becomes an SSE message whose `event:` field is the event
/// kind and whose data is the event's JSON form. A subscriber that falls
/// behind the bus gets a `dropped` message with the count it missed.
pub async fn job_events_sse(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> impl IntoResponse {
    let id = match parse_job_id(&job_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    if !state.store.contains(&id) {
        return (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::not_found(format!("job {} not found", id))),
        )
            .into_response();
    }
    debug!(job_id = %id, "event stream attached");

    let stream = BroadcastStream::new(state.bus.subscribe()).filter_map(move |item| {
        let event = match item {
            Ok(event) if event.job_id() == id => event,
            Ok(_) => return None,
            Err(BroadcastStreamRecvError::Lagged(n)) => {
                warn!(job_id = %id, dropped = n, "event stream fell behind the bus");
                return Some(Ok(Event::default()
                    .event("dropped")
                    .data(json!({ "dropped": n }).to_string())));
            }
        };

        match serde_json::to_string(&event) {
            Ok(data) => Some(Ok::<_, Infallible>(
                Event::default().event(event.event_name()).data(data),
            )),
            Err(e) => {
                warn!(job_id = %id, "event not serializable: {}", e);
                None
            }
        }
    });

    Sse::new(stream)
        .keep_alive(KeepAlive::default().interval(SSE_KEEPALIVE))
        .into_response()
}
