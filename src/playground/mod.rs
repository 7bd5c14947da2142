//! Playground engine
//!
//! Runs plugin pipelines over arbitrary inputs through the same job, queue,
//! event, and webhook machinery as the crawler. There are no pages: the
//! pipeline runs exactly once per job, plugin by plugin, in registration
//! order. A single plugin's failure is recorded on the result and the job
//! still completes.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::PlaygroundConfig;
use crate::events::{EventBus, JobEvent};
use crate::job::{
    EngineError, Job, JobError, JobId, JobQueue, JobResult, JobRunner, JobStatus, JobStore,
    Progress,
};
use crate::plugin::{InputPipeline, PluginContext, PluginRegistry, RegisteredInputPlugin};

/// The playground job engine
pub struct PlaygroundEngine {
    store: Arc<JobStore>,
    bus: EventBus,
    registry: Arc<PluginRegistry>,
    pipeline: InputPipeline,
    queue: OnceLock<JobQueue>,
    shutdown: broadcast::Sender<()>,
}

impl PlaygroundEngine {
    /// Construct the engine and initialize its plugins exactly once.
    pub async fn new(
        store: Arc<JobStore>,
        bus: EventBus,
        registry: Arc<PluginRegistry>,
        shutdown: broadcast::Sender<()>,
    ) -> Arc<Self> {
        InputPipeline::initialize(registry.input_plugins()).await;
        let pipeline = InputPipeline::new(bus.clone());
        Arc::new(Self {
            store,
            bus,
            registry,
            pipeline,
            queue: OnceLock::new(),
            shutdown,
        })
    }

    /// Attach the queue that dispatches this engine's jobs.
    pub fn bind_queue(&self, queue: JobQueue) {
        if self.queue.set(queue).is_err() {
            warn!("playground queue bound twice; keeping the first");
        }
    }

    fn queue(&self) -> &JobQueue {
        self.queue
            .get()
            .expect("playground queue bound at bootstrap")
    }

    /// Register a new playground job. Unless `queued_only`, the job is
    /// handed to the queue for background dispatch.
    pub fn create_job(
        &self,
        config: PlaygroundConfig,
        queued_only: bool,
    ) -> Result<Job, EngineError> {
        self.store.sweep();

        let job = Job::new_playground(config);
        let id = job.id;
        self.store.insert(job.clone());

        if !queued_only {
            if let Err(e) = self.queue().enqueue(id) {
                self.store.remove(&id);
                return Err(e.into());
            }
        }

        info!(job_id = %id, "playground job created");
        Ok(job)
    }

    /// Create a job and run it to completion within this call.
    ///
    /// This is the synchronous HTTP mode: a thin wrapper over
    /// "create returns queued, start runs".
    pub async fn create_and_run(&self, config: PlaygroundConfig) -> anyhow::Result<Job> {
        let job = self.create_job(config, true)?;
        let id = job.id;
        match self.start_job(id).await {
            Ok(job) => Ok(job),
            // The run failed, but the failure is recorded on the job itself
            Err(_) => self
                .get_job(&id)
                .ok_or_else(|| anyhow::anyhow!("job {} vanished", id)),
        }
    }

    /// Create a job, transition it to running, and finish it in the
    /// background. Returns as soon as the job is `running`.
    pub async fn create_and_start(
        self: &Arc<Self>,
        config: PlaygroundConfig,
    ) -> anyhow::Result<Job> {
        let job = self.create_job(config, true)?;
        let id = job.id;
        let job = self.begin_job(id)?;

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = engine.finish_started_job(id).await {
                warn!(job_id = %id, "background playground run failed: {:#}", e);
            }
        });

        Ok(job)
    }

    pub fn get_job(&self, id: &JobId) -> Option<Job> {
        self.store.get(id)
    }

    pub fn get_progress(&self, id: &JobId) -> Option<Progress> {
        self.store.get(id).map(|j| j.progress)
    }

    /// Transition `queued -> running`, initialize the result, and announce
    /// the start.
    fn begin_job(&self, id: JobId) -> Result<Job, EngineError> {
        let current = self.store.get(&id).ok_or(EngineError::NotFound(id))?;
        let transitioned = self.store.update(&id, |job| {
            job.transition_to(JobStatus::Running).map(|()| {
                job.result = Some(JobResult::default());
            })
        });

        match transitioned {
            Some(Ok(())) => {
                let job = self.store.get(&id).ok_or(EngineError::NotFound(id))?;
                self.bus.emit(JobEvent::JobStart { job: job.clone() });
                Ok(job)
            }
            _ => Err(EngineError::InvalidState {
                id,
                status: current.progress.status,
            }),
        }
    }

    /// Terminal transition to `failed`. Idempotent on terminal jobs.
    pub fn fail_job(&self, id: JobId, message: &str) -> Option<Job> {
        let transitioned = self.store.update(&id, |job| {
            match job.transition_to(JobStatus::Failed) {
                Ok(()) => {
                    job.progress.error = Some(message.to_string());
                    if let Some(result) = job.result.as_mut() {
                        result.error = Some(JobError::new(message));
                    }
                    true
                }
                Err(e) => {
                    debug!(job_id = %id, "fail_job: {}", e);
                    false
                }
            }
        });

        let job = self.store.get(&id)?;
        if transitioned == Some(true) {
            self.bus.emit(JobEvent::JobError {
                job: job.clone(),
                error: message.to_string(),
            });
        }
        Some(job)
    }

    fn complete_job(&self, id: JobId) -> Option<Job> {
        let transitioned = self
            .store
            .update(&id, |job| job.transition_to(JobStatus::Completed).is_ok());

        let job = self.store.get(&id)?;
        if transitioned == Some(true) {
            self.bus.emit(JobEvent::JobComplete { job: job.clone() });
        }
        Some(job)
    }

    /// Run a queued job to a terminal state.
    pub async fn start_job(&self, id: JobId) -> anyhow::Result<Job> {
        self.begin_job(id)?;
        self.finish_started_job(id).await
    }

    /// Drive an already-running job through the pipeline to a terminal
    /// state.
    async fn finish_started_job(&self, id: JobId) -> anyhow::Result<Job> {
        match self.run_pipeline(id).await {
            Ok(()) => self
                .complete_job(id)
                .ok_or_else(|| anyhow::anyhow!("job {} vanished at completion", id)),
            Err(e) => {
                self.fail_job(id, &format!("{e:#}"));
                Err(e)
            }
        }
    }

    /// Shutdown hook: let plugins release their resources.
    pub async fn destroy(&self) {
        for reg in self.registry.input_plugins() {
            if let Err(e) = reg.plugin.destroy().await {
                warn!(plugin = reg.plugin.name(), "destroy failed: {}", e);
            }
        }
    }

    /// Execute the selected plugins once, in registration order.
    async fn run_pipeline(&self, id: JobId) -> anyhow::Result<()> {
        let job = self
            .store
            .get(&id)
            .ok_or_else(|| anyhow::anyhow!("job {} not found", id))?;
        let config = match &job.config {
            crate::job::JobConfig::Playground(c) => c.clone(),
            _ => anyhow::bail!("job {} is not a playground job", id),
        };

        let selected: Vec<RegisteredInputPlugin> =
            self.registry.select_input(config.plugins.as_deref());
        debug!(job_id = %id, "running {} plugin(s)", selected.len());

        let mut shutdown_rx = self.shutdown.subscribe();
        let mut ctx = PluginContext::new(id, config.input.clone(), job.progress.start_time);

        for reg in &selected {
            if shutdown_rx.try_recv().is_ok() {
                anyhow::bail!("server shutting down");
            }

            let name = reg.plugin.name().to_string();
            let _ = self.store.update(&id, |job| {
                if let Some(p) = job.progress.playground.as_mut() {
                    p.current_plugin = Some(name.clone());
                }
            });

            let snapshot = self
                .store
                .get(&id)
                .ok_or_else(|| anyhow::anyhow!("job {} vanished mid-run", id))?;
            let outcome = self
                .pipeline
                .run_plugin(&snapshot, reg, &mut ctx, job.max_retries)
                .await;

            let _ = self.store.update(&id, |job| {
                job.retries += outcome.retries_used;
                if let Some(metrics) = &outcome.metrics {
                    if let Some(result) = job.result.as_mut() {
                        let mut entry = serde_json::Map::new();
                        entry.insert(name.clone(), metrics.clone());
                        result.metrics.push(entry);
                    }
                    if let Some(p) = job.progress.playground.as_mut() {
                        if !p.completed_plugins.iter().any(|n| n == &name) {
                            p.completed_plugins.push(name.clone());
                        }
                    }
                }
                if let Some(error) = &outcome.error {
                    if let Some(result) = job.result.as_mut() {
                        result.error = Some(JobError::from_plugin(error.as_str(), name.as_str()));
                    }
                }
                if let Some(p) = job.progress.playground.as_mut() {
                    p.current_plugin = None;
                }
            });
        }

        // Summaries for the plugins that actually produced metrics
        let job = self
            .store
            .get(&id)
            .ok_or_else(|| anyhow::anyhow!("job {} vanished mid-run", id))?;
        if let Some(result) = &job.result {
            let summary = InputPipeline::summaries(&selected, result).await;
            let _ = self.store.update(&id, |job| {
                if let Some(r) = job.result.as_mut() {
                    r.summary = summary;
                }
            });
        }

        Ok(())
    }
}

#[async_trait]
impl JobRunner for PlaygroundEngine {
    async fn start_job(&self, id: JobId) -> anyhow::Result<Job> {
        PlaygroundEngine::start_job(self, id).await
    }
}
