//! Plugin pipeline
//!
//! Plugins contribute metrics and an optional summary to a job's result.
//! Crawl plugins observe every visited page; input plugins run once per
//! playground job over an opaque input. Every hook is isolated: one plugin's
//! failure never affects its siblings or the job's ability to finish.

pub mod builtin;
pub mod pipeline;
pub mod registry;
pub mod storage;

pub use pipeline::{CrawlPipeline, InputPipeline, PageEvaluation, PluginRunOutcome};
pub use registry::{PluginRegistry, RegisteredCrawlPlugin, RegisteredInputPlugin};
pub use storage::PluginStorage;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

use crate::crawler::driver::PageSnapshot;
use crate::job::{Job, JobId};

/// Failure raised by a plugin hook
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct PluginError(pub String);

impl PluginError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

pub type PluginResult<T> = Result<T, PluginError>;

/// Context handed to input plugins, one per playground job.
///
/// `storage` always points at the store of the plugin currently executing.
#[derive(Debug, Clone)]
pub struct PluginContext {
    pub job_id: JobId,
    /// The job's opaque input
    pub input: Value,
    /// Output of the most recent plugin, if it produced one
    pub output: Option<Value>,
    pub start_time: DateTime<Utc>,
    pub storage: Arc<PluginStorage>,
}

impl PluginContext {
    pub fn new(job_id: JobId, input: Value, start_time: DateTime<Utc>) -> Self {
        Self {
            job_id,
            input,
            output: None,
            start_time,
            storage: Arc::new(PluginStorage::new()),
        }
    }

    /// The text form of the input: the string itself, or compact JSON.
    pub fn input_text(&self) -> String {
        match &self.input {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// A unit of per-page analysis for crawl jobs.
///
/// Only `evaluate` is required; every other hook defaults to a no-op.
#[async_trait]
pub trait CrawlPlugin: Send + Sync {
    /// Unique plugin name; keys metrics and summaries.
    fn name(&self) -> &str;

    /// Disabled plugins stay registered but never run.
    fn enabled(&self) -> bool {
        true
    }

    /// Called exactly once, at engine construction.
    async fn initialize(&self) -> PluginResult<()> {
        Ok(())
    }

    /// Entry to a crawl run.
    async fn before_crawl(&self, _job: &Job) -> PluginResult<()> {
        Ok(())
    }

    /// Before this plugin evaluates a page.
    async fn before_each(&self, _page: &PageSnapshot) -> PluginResult<()> {
        Ok(())
    }

    /// Produce metrics for one page.
    async fn evaluate(&self, page: &PageSnapshot, load_time_ms: u64) -> PluginResult<Value>;

    /// After this plugin evaluated a page.
    async fn after_each(&self, _page: &PageSnapshot) -> PluginResult<()> {
        Ok(())
    }

    /// After every page of the run has been visited.
    async fn after_crawl(&self, _job: &Job) -> PluginResult<()> {
        Ok(())
    }

    /// Fold this plugin's ordered metrics into a summary.
    async fn summarize(&self, _metrics: &[Value]) -> PluginResult<Option<Value>> {
        Ok(None)
    }

    /// Engine shutdown.
    async fn destroy(&self) -> PluginResult<()> {
        Ok(())
    }
}

/// A unit of analysis for playground jobs, run once per job.
///
/// Only `execute` is required.
#[async_trait]
pub trait InputPlugin: Send + Sync {
    fn name(&self) -> &str;

    fn enabled(&self) -> bool {
        true
    }

    /// Called exactly once, at engine construction.
    async fn initialize(&self) -> PluginResult<()> {
        Ok(())
    }

    /// Before execute.
    async fn before(&self, _ctx: &PluginContext) -> PluginResult<()> {
        Ok(())
    }

    /// Produce metrics for this job; may set `ctx.output`.
    async fn execute(&self, ctx: &mut PluginContext) -> PluginResult<Value>;

    /// After execute.
    async fn after(&self, _ctx: &PluginContext) -> PluginResult<()> {
        Ok(())
    }

    /// Fold this plugin's ordered metrics into a summary.
    async fn summarize(&self, _metrics: &[Value]) -> PluginResult<Option<Value>> {
        Ok(None)
    }

    /// Engine shutdown.
    async fn destroy(&self) -> PluginResult<()> {
        Ok(())
    }
}
