//! Crawl engine
//!
//! Orchestrates one crawl job at a time: seeds the frontier from the start
//! URL (and sitemap, when configured), fans page fetches out over a bounded
//! worker pool behind a shared token bucket, runs the plugin pipeline over
//! every page, and keeps the job record and event bus up to date. Page and
//! plugin failures stay local; only a failure of the run itself fails the
//! job.

pub mod driver;
pub mod frontier;
pub mod ratelimit;
pub mod robots;
pub mod sitemap;

pub use driver::{DriverError, HttpPageDriver, PageDriver, PageRequest, PageSnapshot};

use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{CrawlConfig, DEFAULT_USER_AGENT};
use crate::events::{EventBus, JobEvent};
use crate::job::{
    EngineError, Job, JobError, JobId, JobQueue, JobResult, JobRunner, JobStatus, JobStore,
    PageAnalysis,
};
use crate::plugin::{CrawlPipeline, PageEvaluation, PluginRegistry};

use frontier::{AddOutcome, Frontier};
use ratelimit::TokenBucket;
use robots::RobotsCache;

/// In-process URL predicate; URLs it rejects are skipped, not visited.
pub type UrlFilter = Arc<dyn Fn(&Url) -> bool + Send + Sync>;

/// Options for job creation
#[derive(Default)]
pub struct CreateOptions {
    /// Register the job without handing it to the queue
    pub queued_only: bool,
    /// In-process URL predicate for this job
    pub url_filter: Option<UrlFilter>,
}

/// A freshly created job and where it landed in the queue
pub struct CreatedJob {
    pub job: Job,
    /// 1-based queue position; `None` in queued-only mode
    pub queue_position: Option<usize>,
}

/// Result of one page worker
enum PageOutcome {
    Analyzed {
        depth: u8,
        page: PageSnapshot,
        evaluation: PageEvaluation,
    },
    Failed {
        url: Url,
        depth: u8,
        status_code: Option<u16>,
        error: String,
        load_time_ms: u64,
    },
    RobotsDenied {
        url: Url,
        depth: u8,
    },
}

/// The crawl job engine
pub struct CrawlEngine {
    store: Arc<JobStore>,
    bus: EventBus,
    driver: Arc<dyn PageDriver>,
    pipeline: Arc<CrawlPipeline>,
    queue: OnceLock<JobQueue>,
    url_filters: DashMap<JobId, UrlFilter>,
    /// Client for robots.txt and sitemap fetches
    http: reqwest::Client,
    shutdown: broadcast::Sender<()>,
}

impl CrawlEngine {
    /// Construct the engine and initialize its plugins exactly once.
    pub async fn new(
        store: Arc<JobStore>,
        bus: EventBus,
        driver: Arc<dyn PageDriver>,
        registry: &PluginRegistry,
        shutdown: broadcast::Sender<()>,
    ) -> anyhow::Result<Arc<Self>> {
        let pipeline = Arc::new(CrawlPipeline::new(
            registry.crawl_plugins().to_vec(),
            bus.clone(),
        ));
        pipeline.initialize().await;

        let http = reqwest::Client::builder()
            .user_agent(DEFAULT_USER_AGENT)
            .build()?;

        Ok(Arc::new(Self {
            store,
            bus,
            driver,
            pipeline,
            queue: OnceLock::new(),
            url_filters: DashMap::new(),
            http,
            shutdown,
        }))
    }

    /// Attach the queue that dispatches this engine's jobs. Called once at
    /// bootstrap; the queue needs the engine as its runner, hence the
    /// two-step wiring.
    pub fn bind_queue(&self, queue: JobQueue) {
        if self.queue.set(queue).is_err() {
            warn!("crawl queue bound twice; keeping the first");
        }
    }

    fn queue(&self) -> &JobQueue {
        self.queue.get().expect("crawl queue bound at bootstrap")
    }

    /// Snapshot of the queue state for HTTP responses.
    pub fn queue_state(&self) -> (usize, bool) {
        let queue = self.queue();
        (queue.len(), queue.is_processing())
    }

    /// Register a new crawl job and, unless `queued_only`, hand it to the
    /// queue.
    pub fn create_job(
        &self,
        config: CrawlConfig,
        options: CreateOptions,
    ) -> Result<CreatedJob, EngineError> {
        self.store.sweep();

        let job = Job::new_crawl(config);
        let id = job.id;
        self.store.insert(job.clone());
        if let Some(filter) = options.url_filter {
            self.url_filters.insert(id, filter);
        }

        let queue_position = if options.queued_only {
            None
        } else {
            match self.queue().enqueue(id) {
                Ok(position) => Some(position),
                Err(e) => {
                    // Saturation must not leave a job behind
                    self.store.remove(&id);
                    self.url_filters.remove(&id);
                    return Err(e.into());
                }
            }
        };

        info!(job_id = %id, "crawl job created");
        Ok(CreatedJob {
            job,
            queue_position,
        })
    }

    pub fn get_job(&self, id: &JobId) -> Option<Job> {
        self.store.get(id)
    }

    pub fn get_progress(&self, id: &JobId) -> Option<crate::job::Progress> {
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

    /// Terminal transition to `failed`. Idempotent: a second call on a
    /// terminal job changes nothing and emits nothing.
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
            self.url_filters.remove(&id);
            self.bus.emit(JobEvent::JobError {
                job: job.clone(),
                error: message.to_string(),
            });
        }
        Some(job)
    }

    /// Terminal transition to `completed`.
    fn complete_job(&self, id: JobId) -> Option<Job> {
        let transitioned = self
            .store
            .update(&id, |job| job.transition_to(JobStatus::Completed).is_ok());

        let job = self.store.get(&id)?;
        if transitioned == Some(true) {
            self.url_filters.remove(&id);
            self.bus.emit(JobEvent::JobComplete { job: job.clone() });
        }
        Some(job)
    }

    /// Run a queued job to a terminal state.
    pub async fn start_job(&self, id: JobId) -> anyhow::Result<Job> {
        self.begin_job(id)?;

        match self.run_crawl(id).await {
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
        self.pipeline.destroy().await;
    }

    /// The crawl loop for one running job.
    async fn run_crawl(&self, id: JobId) -> anyhow::Result<()> {
        let job = self
            .store
            .get(&id)
            .ok_or_else(|| anyhow::anyhow!("job {} not found", id))?;
        let cfg = match &job.config {
            crate::job::JobConfig::Crawl(c) => c.clone(),
            _ => anyhow::bail!("job {} is not a crawl job", id),
        };
        let start_url = Url::parse(
            cfg.url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("crawl job has no start URL"))?,
        )?;

        info!(job_id = %id, url = %start_url, "starting crawl");
        self.pipeline.before_crawl(&job).await;

        let user_agent = cfg
            .user_agent
            .clone()
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        let url_filter = self.url_filters.get(&id).map(|f| Arc::clone(f.value()));
        let include = compile_patterns(&cfg.include_patterns);
        let exclude = compile_patterns(&cfg.exclude_patterns);

        let mut frontier = Frontier::new(cfg.max_depth);
        frontier.add_seed(start_url);
        if let Some(sitemap_url) = &cfg.sitemap_url {
            let timeout = Duration::from_millis(cfg.timeout.request);
            match sitemap::fetch_sitemap_urls(&self.http, sitemap_url, timeout).await {
                Ok(urls) => {
                    debug!(job_id = %id, "sitemap seeded {} URLs", urls.len());
                    for url in urls {
                        frontier.add(url, 0);
                    }
                }
                Err(e) => warn!(job_id = %id, "sitemap fetch failed: {}", e),
            }
        }

        let robots = cfg
            .respect_robots_txt
            .then(|| Arc::new(RobotsCache::new(self.http.clone(), user_agent.clone())));
        let bucket = Arc::new(TokenBucket::per_minute(cfg.max_requests_per_minute));
        let page_timeout = Duration::from_millis(cfg.timeout.page);

        let mut shutdown_rx = self.shutdown.subscribe();
        let period = Duration::from_secs(10);
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut join_set: JoinSet<PageOutcome> = JoinSet::new();
        let mut launched = 0usize;
        let mut analyzed = 0u64;
        let mut failed = 0u64;
        let mut skipped = 0u64;
        let mut pages_since_progress = 0u32;

        loop {
            while join_set.len() < cfg.max_concurrency && launched < cfg.max_pages {
                let Some(pending) = frontier.pop() else { break };
                launched += 1;

                let driver = Arc::clone(&self.driver);
                let pipeline = Arc::clone(&self.pipeline);
                let bus = self.bus.clone();
                let bucket = Arc::clone(&bucket);
                let robots = robots.clone();
                let snapshot = self.store.get(&id).unwrap_or_else(|| job.clone());
                let mut request = PageRequest::new(pending.url, page_timeout);
                request.headers = cfg.headers.clone();
                request.user_agent = Some(user_agent.clone());
                let depth = pending.depth;

                join_set.spawn(async move {
                    bucket.acquire().await;

                    if let Some(robots) = &robots {
                        if !robots.is_allowed(&request.url).await {
                            return PageOutcome::RobotsDenied {
                                url: request.url,
                                depth,
                            };
                        }
                    }

                    bus.emit(JobEvent::PageStart {
                        job: snapshot.clone(),
                        url: request.url.to_string(),
                    });

                    let started = std::time::Instant::now();
                    match driver.open(&request).await {
                        Ok(page) => {
                            let evaluation = pipeline.evaluate_page(&snapshot, &page).await;
                            PageOutcome::Analyzed {
                                depth,
                                page,
                                evaluation,
                            }
                        }
                        Err(e) => {
                            let status_code = match &e {
                                DriverError::Status(code) => Some(*code),
                                _ => None,
                            };
                            PageOutcome::Failed {
                                url: request.url,
                                depth,
                                status_code,
                                error: e.to_string(),
                                load_time_ms: started.elapsed().as_millis() as u64,
                            }
                        }
                    }
                });
            }

            if join_set.is_empty() {
                break;
            }

            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    join_set.abort_all();
                    anyhow::bail!("server shutting down");
                }
                _ = ticker.tick() => {
                    if let Some(job) = self.store.get(&id) {
                        self.bus.emit(JobEvent::Progress { job });
                    }
                }
                Some(joined) = join_set.join_next() => {
                    let outcome = match joined {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            warn!(job_id = %id, "page worker panicked: {}", e);
                            failed += 1;
                            continue;
                        }
                    };

                    match outcome {
                        PageOutcome::Analyzed { depth, page, evaluation } => {
                            analyzed += 1;
                            pages_since_progress += 1;

                            let mut discovered = 0usize;
                            for link in &page.links {
                                if link_allowed(link, &include, &exclude, &url_filter) {
                                    if frontier.add(link.clone(), depth + 1) == AddOutcome::Queued {
                                        discovered += 1;
                                    }
                                } else if frontier.mark_seen(link) {
                                    skipped += 1;
                                }
                            }

                            let analysis = PageAnalysis {
                                url: page.url.to_string(),
                                final_url: Some(page.final_url.to_string()),
                                depth,
                                status_code: Some(page.status_code),
                                title: page.title.clone(),
                                word_count: Some(page.word_count),
                                load_time_ms: page.load_time_ms(),
                                error: None,
                                discovered_urls: discovered,
                                metrics: evaluation.metrics.clone(),
                                analyzed_at: Utc::now(),
                            };

                            let _ = self.store.update(&id, |job| {
                                if let Some(c) = job.progress.crawl.as_mut() {
                                    c.pages_analyzed = analyzed;
                                    c.unique_urls = frontier.accepted();
                                    c.skipped_urls = skipped;
                                    c.failed_urls = failed;
                                    c.current_url = Some(analysis.url.clone());
                                    c.current_depth = depth;
                                    c.total_pages = c.unique_urls + c.skipped_urls + c.failed_urls;
                                }
                                if let Some(result) = job.result.as_mut() {
                                    result.metrics.push(evaluation.metrics.clone());
                                    for (plugin, error) in &evaluation.errors {
                                        result.error = Some(JobError::from_plugin(
                                            error.as_str(),
                                            plugin.as_str(),
                                        ));
                                    }
                                    result.pages.push(analysis.clone());
                                }
                            });

                            if let Some(job) = self.store.get(&id) {
                                self.bus.emit(JobEvent::PageComplete {
                                    job,
                                    page: analysis,
                                });
                            }

                            if pages_since_progress >= 10 {
                                pages_since_progress = 0;
                                if let Some(job) = self.store.get(&id) {
                                    self.bus.emit(JobEvent::Progress { job });
                                }
                            }
                        }
                        PageOutcome::Failed { url, depth, status_code, error, load_time_ms } => {
                            failed += 1;
                            debug!(job_id = %id, %url, "page failed: {}", error);

                            let analysis = PageAnalysis {
                                url: url.to_string(),
                                final_url: None,
                                depth,
                                status_code,
                                title: None,
                                word_count: None,
                                load_time_ms,
                                error: Some(error.clone()),
                                discovered_urls: 0,
                                metrics: serde_json::Map::new(),
                                analyzed_at: Utc::now(),
                            };

                            let _ = self.store.update(&id, |job| {
                                if let Some(c) = job.progress.crawl.as_mut() {
                                    c.failed_urls = failed;
                                    c.total_pages = c.unique_urls + c.skipped_urls + c.failed_urls;
                                }
                                if let Some(result) = job.result.as_mut() {
                                    result.pages.push(analysis.clone());
                                }
                            });

                            if let Some(job) = self.store.get(&id) {
                                self.bus.emit(JobEvent::PageError {
                                    job,
                                    url: url.to_string(),
                                    error,
                                });
                            }
                        }
                        PageOutcome::RobotsDenied { url, depth: _ } => {
                            skipped += 1;
                            debug!(job_id = %id, %url, "disallowed by robots.txt");
                            let _ = self.store.update(&id, |job| {
                                if let Some(c) = job.progress.crawl.as_mut() {
                                    c.skipped_urls = skipped;
                                    c.total_pages = c.unique_urls + c.skipped_urls + c.failed_urls;
                                }
                            });
                        }
                    }
                }
            }
        }

        let job = self
            .store
            .get(&id)
            .ok_or_else(|| anyhow::anyhow!("job {} vanished mid-crawl", id))?;
        self.pipeline.after_crawl(&job).await;

        if let Some(result) = &job.result {
            let summary = self.pipeline.summaries(result).await;
            let _ = self.store.update(&id, |job| {
                if let Some(r) = job.result.as_mut() {
                    r.summary = summary;
                }
                if let Some(c) = job.progress.crawl.as_mut() {
                    c.current_url = None;
                }
            });
        }

        info!(
            job_id = %id,
            analyzed, failed, skipped,
            "crawl finished"
        );
        Ok(())
    }
}

#[async_trait]
impl JobRunner for CrawlEngine {
    async fn start_job(&self, id: JobId) -> anyhow::Result<Job> {
        CrawlEngine::start_job(self, id).await
    }
}

fn compile_patterns(patterns: &[String]) -> Vec<regex::Regex> {
    patterns
        .iter()
        .filter_map(|p| match regex::Regex::new(p) {
            Ok(r) => Some(r),
            Err(e) => {
                warn!("invalid URL pattern '{}': {}", p, e);
                None
            }
        })
        .collect()
}

/// Whether a discovered link survives the job's URL filters.
fn link_allowed(
    url: &Url,
    include: &[regex::Regex],
    exclude: &[regex::Regex],
    custom: &Option<UrlFilter>,
) -> bool {
    let s = url.as_str();
    if exclude.iter().any(|p| p.is_match(s)) {
        return false;
    }
    if !include.is_empty() && !include.iter().any(|p| p.is_match(s)) {
        return false;
    }
    if let Some(filter) = custom {
        if !filter(url) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_filtering_applies_exclude_then_include_then_custom() {
        let include = compile_patterns(&["example\\.com".to_string()]);
        let exclude = compile_patterns(&["\\.pdf$".to_string()]);
        let custom: Option<UrlFilter> =
            Some(Arc::new(|url: &Url| !url.path().starts_with("/admin")));

        let ok = Url::parse("https://example.com/page").unwrap();
        let pdf = Url::parse("https://example.com/file.pdf").unwrap();
        let external = Url::parse("https://other.org/page").unwrap();
        let admin = Url::parse("https://example.com/admin/panel").unwrap();

        assert!(link_allowed(&ok, &include, &exclude, &custom));
        assert!(!link_allowed(&pdf, &include, &exclude, &custom));
        assert!(!link_allowed(&external, &include, &exclude, &custom));
        assert!(!link_allowed(&admin, &include, &exclude, &custom));
    }

    #[test]
    fn invalid_patterns_are_dropped_not_fatal() {
        let compiled = compile_patterns(&["(ok".to_string(), "fine".to_string()]);
        assert_eq!(compiled.len(), 1);
    }
}
