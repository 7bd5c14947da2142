//! Job data model and lifecycle
//!
//! A `Job` is one client-requested unit of work. Its status walks the strict
//! path `queued -> running -> (completed | failed)`; terminal jobs are frozen.

pub mod queue;
pub mod store;

pub use queue::{JobQueue, JobRunner, QueueError};
pub use store::JobStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::config::{CrawlConfig, PlaygroundConfig, WebhookConfig};

/// Job identifier
pub type JobId = Uuid;

/// Observable job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// The only legal transitions are queued -> running and
    /// running -> completed | failed.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Queued, JobStatus::Running)
                | (Self::Running, JobStatus::Completed)
                | (Self::Running, JobStatus::Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Crawl,
    Playground,
}

/// Frozen configuration snapshot attached to a job
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum JobConfig {
    Crawl(CrawlConfig),
    Playground(PlaygroundConfig),
}

impl JobConfig {
    pub fn webhook(&self) -> Option<&WebhookConfig> {
        match self {
            Self::Crawl(c) => c.webhook.as_ref(),
            Self::Playground(c) => c.webhook.as_ref(),
        }
    }

    /// Timeout budget for auxiliary requests (webhook deliveries included)
    pub fn request_timeout_ms(&self) -> u64 {
        match self {
            Self::Crawl(c) => c.timeout.request,
            Self::Playground(_) => 30_000,
        }
    }
}

/// Crawl-specific progress counters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlProgress {
    /// Pages fully analyzed by the pipeline
    pub pages_analyzed: u64,
    /// Best-effort estimate of the total page count
    pub total_pages: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_url: Option<String>,
    pub current_depth: u8,
    /// Distinct URLs accepted for crawling
    pub unique_urls: u64,
    /// URLs rejected by filters or robots.txt
    pub skipped_urls: u64,
    /// URLs whose fetch or load failed
    pub failed_urls: u64,
}

/// Playground-specific progress
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaygroundProgress {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_plugin: Option<String>,
    /// Plugin names in completion order, each at most once
    pub completed_plugins: Vec<String>,
}

/// Snapshot of a job's observable progress
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub status: JobStatus,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten, default)]
    pub crawl: Option<CrawlProgress>,
    #[serde(flatten, default)]
    pub playground: Option<PlaygroundProgress>,
}

impl Progress {
    fn new(kind: JobKind) -> Self {
        Self {
            status: JobStatus::Queued,
            start_time: Utc::now(),
            end_time: None,
            error: None,
            crawl: matches!(kind, JobKind::Crawl).then(CrawlProgress::default),
            playground: matches!(kind, JobKind::Playground).then(PlaygroundProgress::default),
        }
    }

    /// Milliseconds elapsed since the job started.
    pub fn elapsed_ms(&self) -> u64 {
        let end = self.end_time.unwrap_or_else(Utc::now);
        (end - self.start_time).num_milliseconds().max(0) as u64
    }
}

/// Error record attached to a job result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl JobError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            plugin: None,
            timestamp: Utc::now(),
        }
    }

    pub fn from_plugin(message: impl Into<String>, plugin: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            plugin: Some(plugin.into()),
            timestamp: Utc::now(),
        }
    }
}

/// Analysis of a single visited page
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageAnalysis {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_url: Option<String>,
    pub depth: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word_count: Option<usize>,
    pub load_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub discovered_urls: usize,
    /// Per-plugin metrics for this page, keyed by plugin name
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metrics: Map<String, Value>,
    pub analyzed_at: DateTime<Utc>,
}

/// Accumulated result of a run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pages: Vec<PageAnalysis>,
    /// One entry per page (crawl) or per plugin execution (playground),
    /// keyed by plugin name
    pub metrics: Vec<Map<String, Value>>,
    /// Per-plugin summaries, keyed by plugin name
    pub summary: Map<String, Value>,
    /// Most recent plugin error, if any (last writer wins)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
}

impl JobResult {
    /// Ordered metric values recorded for one plugin.
    pub fn metrics_for(&self, plugin: &str) -> Vec<Value> {
        self.metrics
            .iter()
            .filter_map(|entry| entry.get(plugin).cloned())
            .collect()
    }
}

/// Attempted transition that the state machine forbids
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("illegal job transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// Errors surfaced by engine entry points
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("job {0} not found")]
    NotFound(JobId),
    #[error("job {id} is {status}")]
    InvalidState { id: JobId, status: JobStatus },
    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// One client-requested unit of work
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub config: JobConfig,
    pub progress: Progress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    /// Reserved; all jobs currently dispatch FIFO at priority 0
    pub priority: i32,
    pub retries: u32,
    pub max_retries: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    fn new(kind: JobKind, config: JobConfig, max_retries: u32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind,
            config,
            progress: Progress::new(kind),
            result: None,
            priority: 0,
            retries: 0,
            max_retries,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn new_crawl(config: CrawlConfig) -> Self {
        Self::new(JobKind::Crawl, JobConfig::Crawl(config), 0)
    }

    pub fn new_playground(config: PlaygroundConfig) -> Self {
        let max_retries = config.retries.unwrap_or(0);
        Self::new(
            JobKind::Playground,
            JobConfig::Playground(config),
            max_retries,
        )
    }

    /// Move the job to `next`, stamping `endTime` on terminal entry.
    pub fn transition_to(&mut self, next: JobStatus) -> Result<(), InvalidTransition> {
        if !self.progress.status.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.progress.status,
                to: next,
            });
        }
        self.progress.status = next;
        if next.is_terminal() {
            self.progress.end_time = Some(Utc::now());
        }
        Ok(())
    }

    pub fn webhook(&self) -> Option<&WebhookConfig> {
        self.config.webhook()
    }

    pub fn is_terminal(&self) -> bool {
        self.progress.status.is_terminal()
    }
}
