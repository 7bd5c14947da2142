//! Sequential FIFO job queue
//!
//! A single dispatcher task drains the queue one job at a time, so at most one
//! job per queue instance is ever running. Enqueues never block the caller;
//! when a bound is configured, a full queue rejects new IDs so the HTTP layer
//! can answer 503.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use super::{Job, JobId};

/// Executes a queued job to a terminal state.
///
/// `start_job` must leave the job terminal on its own. A returned error is
/// logged and swallowed by the dispatcher, which simply advances to the next
/// job.
#[async_trait]
pub trait JobRunner: Send + Sync + 'static {
    async fn start_job(&self, id: JobId) -> anyhow::Result<Job>;
}

/// Errors surfaced to enqueue callers
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("job queue is full ({max} pending jobs)")]
    Saturated { max: usize },
    #[error("job queue is shut down")]
    Closed,
}

/// FIFO single-worker dispatcher
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::UnboundedSender<JobId>,
    pending: Arc<AtomicUsize>,
    processing: Arc<AtomicBool>,
    max_pending: Option<usize>,
}

impl JobQueue {
    /// Create the queue and spawn its dispatcher.
    pub fn new(
        runner: Arc<dyn JobRunner>,
        max_pending: Option<usize>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<JobId>();
        let pending = Arc::new(AtomicUsize::new(0));
        let processing = Arc::new(AtomicBool::new(false));

        let worker_pending = Arc::clone(&pending);
        let worker_processing = Arc::clone(&processing);
        tokio::spawn(async move {
            loop {
                let id = tokio::select! {
                    biased;
                    _ = shutdown.recv() => break,
                    id = rx.recv() => match id {
                        Some(id) => id,
                        None => break,
                    },
                };

                worker_pending.fetch_sub(1, Ordering::SeqCst);
                worker_processing.store(true, Ordering::SeqCst);
                debug!(job_id = %id, "dispatching job");
                if let Err(e) = runner.start_job(id).await {
                    // The runner has already marked the job failed.
                    warn!(job_id = %id, "job run returned error: {:#}", e);
                }
                worker_processing.store(false, Ordering::SeqCst);
            }
            debug!("job queue dispatcher stopped");
        });

        Self {
            tx,
            pending,
            processing,
            max_pending,
        }
    }

    /// Append a job ID, waking the dispatcher if it is idle.
    ///
    /// Returns the 1-based queue position at enqueue time. Never blocks; safe
    /// to call while a job is running.
    pub fn enqueue(&self, id: JobId) -> Result<usize, QueueError> {
        if let Some(max) = self.max_pending {
            if self.pending.load(Ordering::SeqCst) >= max {
                return Err(QueueError::Saturated { max });
            }
        }
        let position = self.pending.fetch_add(1, Ordering::SeqCst) + 1;
        self.tx.send(id).map_err(|_| {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            QueueError::Closed
        })?;
        Ok(position)
    }

    /// Number of jobs waiting to be dispatched.
    pub fn len(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the dispatcher currently holds the execution slot.
    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Duration;

    /// Runner that records dispatch order and simulates work.
    struct RecordingRunner {
        seen: Mutex<Vec<JobId>>,
        delay: Duration,
        fail: bool,
    }

    impl RecordingRunner {
        fn new(delay: Duration, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
                delay,
                fail,
            })
        }
    }

    #[async_trait]
    impl JobRunner for RecordingRunner {
        async fn start_job(&self, id: JobId) -> anyhow::Result<Job> {
            self.seen.lock().push(id);
            tokio::time::sleep(self.delay).await;
            if self.fail {
                anyhow::bail!("boom");
            }
            Ok(Job::new_playground(
                serde_json::from_value(serde_json::json!({ "input": "x" })).unwrap(),
            ))
        }
    }

    fn shutdown_pair() -> (broadcast::Sender<()>, broadcast::Receiver<()>) {
        let (tx, rx) = broadcast::channel(1);
        (tx, rx)
    }

    #[tokio::test]
    async fn dispatches_in_fifo_order() {
        let runner = RecordingRunner::new(Duration::from_millis(1), false);
        let (_tx, rx) = shutdown_pair();
        let queue = JobQueue::new(runner.clone(), None, rx);

        let ids: Vec<JobId> = (0..5).map(|_| uuid::Uuid::new_v4()).collect();
        for id in &ids {
            queue.enqueue(*id).unwrap();
        }

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(*runner.seen.lock(), ids);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn runner_errors_do_not_stop_dispatch() {
        let runner = RecordingRunner::new(Duration::from_millis(1), true);
        let (_tx, rx) = shutdown_pair();
        let queue = JobQueue::new(runner.clone(), None, rx);

        for _ in 0..3 {
            queue.enqueue(uuid::Uuid::new_v4()).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(runner.seen.lock().len(), 3);
    }

    #[tokio::test]
    async fn saturation_rejects_enqueue() {
        // Slow runner keeps the first job in flight while we fill the queue.
        let runner = RecordingRunner::new(Duration::from_secs(5), false);
        let (_tx, rx) = shutdown_pair();
        let queue = JobQueue::new(runner, Some(2), rx);

        // First job is picked up by the dispatcher almost immediately.
        queue.enqueue(uuid::Uuid::new_v4()).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        queue.enqueue(uuid::Uuid::new_v4()).unwrap();
        queue.enqueue(uuid::Uuid::new_v4()).unwrap();
        let err = queue.enqueue(uuid::Uuid::new_v4()).unwrap_err();
        assert_eq!(err, QueueError::Saturated { max: 2 });
    }

    #[tokio::test]
    async fn is_processing_tracks_the_execution_slot() {
        let runner = RecordingRunner::new(Duration::from_millis(100), false);
        let (_tx, rx) = shutdown_pair();
        let queue = JobQueue::new(runner, None, rx);

        assert!(!queue.is_processing());
        queue.enqueue(uuid::Uuid::new_v4()).unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(queue.is_processing());
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!queue.is_processing());
    }

    #[tokio::test]
    async fn enqueue_positions_are_one_based() {
        let runner = RecordingRunner::new(Duration::from_secs(5), false);
        let (_tx, rx) = shutdown_pair();
        let queue = JobQueue::new(runner, None, rx);

        queue.enqueue(uuid::Uuid::new_v4()).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        // First job left the queue for the execution slot.
        assert_eq!(queue.enqueue(uuid::Uuid::new_v4()).unwrap(), 1);
        assert_eq!(queue.enqueue(uuid::Uuid::new_v4()).unwrap(), 2);
    }

    #[tokio::test]
    async fn shutdown_stops_the_dispatcher() {
        let runner = RecordingRunner::new(Duration::from_millis(1), false);
        let (tx, rx) = shutdown_pair();
        let queue = JobQueue::new(runner.clone(), None, rx);

        tx.send(()).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        queue.enqueue(uuid::Uuid::new_v4()).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(runner.seen.lock().is_empty(), "no dispatch after shutdown");
    }
}
