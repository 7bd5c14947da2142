//! Webhook emitter
//!
//! Subscribes to the event bus and fans filtered deliveries out to each
//! job's configured webhook URL. Deliveries are fire-and-forget: each one
//! runs in its own task with exponential backoff, and a delivery that
//! exhausts its attempts is logged and dropped. Nothing here ever mutates
//! job state.

pub mod payload;

pub use payload::{outbound, OutboundWebhook};

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::events::{EventBus, JobEvent};
use crate::job::JobId;

/// Delivers job events to per-job webhook URLs
pub struct WebhookEmitter {
    client: reqwest::Client,
}

impl WebhookEmitter {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self { client })
    }

    /// Subscribe to the bus and process events until shutdown.
    pub fn spawn(
        self,
        bus: &EventBus,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let mut rx = bus.subscribe();
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    biased;
                    _ = shutdown.recv() => break,
                    event = rx.recv() => match event {
                        Ok(event) => event,
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("webhook emitter lagged, {} events dropped", n);
                            continue;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                };
                self.handle(event);
            }
            debug!("webhook emitter stopped");
        })
    }

    /// Map an event to its outbound delivery and launch it, if the job has
    /// a webhook and the filter lets the status through.
    fn handle(&self, event: JobEvent) {
        let Some(webhook) = event.job().webhook().cloned() else {
            return;
        };
        let Some(out) = payload::outbound(&event) else {
            return;
        };
        if !webhook.delivers(out.status) {
            debug!(
                job_id = %event.job_id(),
                status = out.status,
                "webhook filtered out"
            );
            return;
        }

        // Serialize once so every retry sends identical bytes.
        let body = match serde_json::to_string(&out.payload) {
            Ok(body) => body,
            Err(e) => {
                warn!(job_id = %event.job_id(), "webhook payload serialization failed: {}", e);
                return;
            }
        };

        let client = self.client.clone();
        let job_id = event.job_id();
        let status = out.status;
        let timeout = Duration::from_millis(event.job().config.request_timeout_ms());
        tokio::spawn(deliver(
            client,
            job_id,
            status,
            webhook.url.clone(),
            webhook.headers.clone(),
            body,
            webhook.retries,
            timeout,
        ));
    }
}

/// Delay before attempt `n` (0-indexed): none, then 1s, 2s, 4s, ...
fn backoff(attempt: u32) -> Option<Duration> {
    if attempt == 0 {
        None
    } else {
        Some(Duration::from_secs(1u64 << (attempt - 1).min(30)))
    }
}

/// POST one payload with retries. Runs detached from the engine.
#[allow(clippy::too_many_arguments)]
async fn deliver(
    client: reqwest::Client,
    job_id: JobId,
    status: &'static str,
    url: String,
    headers: HashMap<String, String>,
    body: String,
    retries: u32,
    timeout: Duration,
) {
    let attempts = retries.clamp(1, 5);

    for attempt in 0..attempts {
        if let Some(delay) = backoff(attempt) {
            tokio::time::sleep(delay).await;
        }

        let mut request = client
            .post(&url)
            .timeout(timeout)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        for (name, value) in &headers {
            request = request.header(name, value);
        }

        match request.body(body.clone()).send().await {
            Ok(response) if response.status().is_success() => {
                debug!(
                    %job_id, status, attempt,
                    "webhook delivered ({})", response.status()
                );
                return;
            }
            Ok(response) => {
                warn!(
                    %job_id, status, attempt,
                    "webhook returned {}", response.status()
                );
            }
            Err(e) => {
                warn!(%job_id, status, attempt, "webhook send failed: {}", e);
            }
        }
    }

    warn!(
        %job_id, status,
        "webhook delivery dropped after {} attempt(s)", attempts
    );
}
