//! In-process event bus
//!
//! Typed publish/subscribe between the engines and their observers (webhook
//! emitter, SSE streams). Events carry a snapshot of the job taken at emit
//! time. The bus is a broadcast channel: emitting never blocks the engine,
//! and a slow subscriber lags and drops events instead of applying
//! backpressure.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

use crate::job::{Job, JobId, PageAnalysis};

/// Channel capacity for job events
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Events emitted during job execution.
///
/// Serialized as internally-tagged JSON (`"type": "eventName"`), which is
/// also the shape streamed over SSE.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum JobEvent {
    /// Job left the queue and began running.
    JobStart { job: Job },

    /// Job reached `completed`.
    JobComplete { job: Job },

    /// Job reached `failed`.
    JobError { job: Job, error: String },

    /// A page fetch has begun (crawl only).
    PageStart { job: Job, url: String },

    /// A page was fetched and analyzed (crawl only).
    PageComplete { job: Job, page: PageAnalysis },

    /// A page failed to load or analyze (crawl only).
    PageError { job: Job, url: String, error: String },

    /// A plugin began one execution.
    PluginStart { job: Job, plugin_name: String },

    /// A plugin finished one execution.
    PluginComplete {
        job: Job,
        plugin_name: String,
        metrics: Value,
    },

    /// A plugin hook failed; the run continues.
    PluginError {
        job: Job,
        plugin_name: String,
        error: String,
    },

    /// Periodic progress snapshot.
    Progress { job: Job },
}

impl JobEvent {
    /// The event kind name, also used as the SSE `event:` field.
    pub fn event_name(&self) -> &'static str {
        match self {
            JobEvent::JobStart { .. } => "jobStart",
            JobEvent::JobComplete { .. } => "jobComplete",
            JobEvent::JobError { .. } => "jobError",
            JobEvent::PageStart { .. } => "pageStart",
            JobEvent::PageComplete { .. } => "pageComplete",
            JobEvent::PageError { .. } => "pageError",
            JobEvent::PluginStart { .. } => "pluginStart",
            JobEvent::PluginComplete { .. } => "pluginComplete",
            JobEvent::PluginError { .. } => "pluginError",
            JobEvent::Progress { .. } => "progress",
        }
    }

    /// The job snapshot carried by this event.
    pub fn job(&self) -> &Job {
        match self {
            JobEvent::JobStart { job }
            | JobEvent::JobComplete { job }
            | JobEvent::JobError { job, .. }
            | JobEvent::PageStart { job, .. }
            | JobEvent::PageComplete { job, .. }
            | JobEvent::PageError { job, .. }
            | JobEvent::PluginStart { job, .. }
            | JobEvent::PluginComplete { job, .. }
            | JobEvent::PluginError { job, .. }
            | JobEvent::Progress { job } => job,
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job().id
    }
}

/// Broadcast-backed pub/sub for job events
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<JobEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event, logging how many subscribers received it.
    pub fn emit(&self, event: JobEvent) {
        let name = event.event_name();
        match self.tx.send(event) {
            Ok(n) => debug!("event {}: {} subscriber(s)", name, n),
            Err(_) => debug!("event {}: no subscribers", name),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EVENT_CHANNEL_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> Job {
        Job::new_playground(
            serde_json::from_value(serde_json::json!({ "input": "x" })).unwrap(),
        )
    }

    #[tokio::test]
    async fn subscribers_receive_emitted_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.emit(JobEvent::JobStart { job: job() });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_name(), "jobStart");
    }

    #[tokio::test]
    async fn emit_without_subscribers_does_not_panic() {
        let bus = EventBus::default();
        bus.emit(JobEvent::Progress { job: job() });
    }

    #[test]
    fn event_serializes_with_type_tag() {
        let event = JobEvent::PluginError {
            job: job(),
            plugin_name: "reverse".to_string(),
            error: "boom".to_string(),
        };
        let v = serde_json::to_value(&event).unwrap();
        assert_eq!(v["type"], "pluginError");
        assert_eq!(v["pluginName"], "reverse");
        assert_eq!(v["error"], "boom");
        assert!(v["job"]["id"].is_string());
    }

    #[test]
    fn job_id_matches_carried_snapshot() {
        let j = job();
        let id = j.id;
        let event = JobEvent::JobComplete { job: j };
        assert_eq!(event.job_id(), id);
    }
}
