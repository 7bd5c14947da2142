//! Pipeline runners
//!
//! Drives plugin hooks with per-plugin error isolation: every hook call is
//! caught at this boundary, turned into a `pluginError` event, and never
//! propagated to sibling plugins or the surrounding job.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::crawler::driver::PageSnapshot;
use crate::events::{EventBus, JobEvent};
use crate::job::{Job, JobResult};

use super::registry::{RegisteredCrawlPlugin, RegisteredInputPlugin};
use super::PluginContext;

/// Outcome of one input plugin execution
#[derive(Debug, Clone)]
pub struct PluginRunOutcome {
    pub plugin: String,
    /// Metrics produced by a successful execute
    pub metrics: Option<Value>,
    /// Error message when the plugin failed
    pub error: Option<String>,
    /// Extra execute attempts consumed by retries
    pub retries_used: u32,
}

/// Metrics and failures gathered from all plugins for one page
#[derive(Debug, Clone, Default)]
pub struct PageEvaluation {
    /// Per-plugin metrics, keyed by plugin name
    pub metrics: Map<String, Value>,
    /// (plugin, error) pairs for plugins that failed on this page
    pub errors: Vec<(String, String)>,
}

/// Runs crawl plugins over visited pages
pub struct CrawlPipeline {
    plugins: Vec<RegisteredCrawlPlugin>,
    bus: EventBus,
}

impl CrawlPipeline {
    pub fn new(plugins: Vec<RegisteredCrawlPlugin>, bus: EventBus) -> Self {
        Self { plugins, bus }
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Initialize every plugin. Called exactly once, at engine construction.
    pub async fn initialize(&self) {
        for reg in &self.plugins {
            if let Err(e) = reg.plugin.initialize().await {
                warn!(plugin = reg.plugin.name(), "initialize failed: {}", e);
            }
        }
    }

    /// Entry hook for a crawl run.
    pub async fn before_crawl(&self, job: &Job) {
        for reg in self.enabled() {
            if let Err(e) = reg.plugin.before_crawl(job).await {
                self.plugin_error(job, reg.plugin.name(), e.to_string());
            }
        }
    }

    /// Run `beforeEach -> evaluate -> afterEach` for every enabled plugin on
    /// one page. A failing plugin contributes no metric for this page and is
    /// reported once via `pluginError`; the remaining plugins still run.
    pub async fn evaluate_page(&self, job: &Job, page: &PageSnapshot) -> PageEvaluation {
        let mut evaluation = PageEvaluation::default();
        let load_time_ms = page.load_time_ms();

        for reg in self.enabled() {
            let name = reg.plugin.name().to_string();
            self.bus.emit(JobEvent::PluginStart {
                job: job.clone(),
                plugin_name: name.clone(),
            });

            if let Err(e) = reg.plugin.before_each(page).await {
                self.plugin_error(job, &name, e.to_string());
                evaluation.errors.push((name, e.to_string()));
                continue;
            }

            match reg.plugin.evaluate(page, load_time_ms).await {
                Ok(metrics) => {
                    self.bus.emit(JobEvent::PluginComplete {
                        job: job.clone(),
                        plugin_name: name.clone(),
                        metrics: metrics.clone(),
                    });
                    evaluation.metrics.insert(name.clone(), metrics);
                }
                Err(e) => {
                    self.plugin_error(job, &name, e.to_string());
                    evaluation.errors.push((name.clone(), e.to_string()));
                }
            }

            if let Err(e) = reg.plugin.after_each(page).await {
                // evaluate already produced metrics; record the hook failure only
                self.plugin_error(job, &name, e.to_string());
            }
        }

        evaluation
    }

    /// Exit hook for a crawl run.
    pub async fn after_crawl(&self, job: &Job) {
        for reg in self.enabled() {
            if let Err(e) = reg.plugin.after_crawl(job).await {
                self.plugin_error(job, reg.plugin.name(), e.to_string());
            }
        }
    }

    /// Collect per-plugin summaries over the run's metrics.
    ///
    /// A throwing `summarize` is logged and omitted; other plugins'
    /// summaries are unaffected.
    pub async fn summaries(&self, result: &JobResult) -> Map<String, Value> {
        let mut summary = Map::new();
        for reg in self.enabled() {
            let name = reg.plugin.name();
            let metrics = result.metrics_for(name);
            match reg.plugin.summarize(&metrics).await {
                Ok(Some(value)) => {
                    summary.insert(name.to_string(), value);
                }
                Ok(None) => {}
                Err(e) => warn!(plugin = name, "summarize failed: {}", e),
            }
        }
        summary
    }

    /// Shutdown hook.
    pub async fn destroy(&self) {
        for reg in &self.plugins {
            if let Err(e) = reg.plugin.destroy().await {
                warn!(plugin = reg.plugin.name(), "destroy failed: {}", e);
            }
        }
    }

    fn enabled(&self) -> impl Iterator<Item = &RegisteredCrawlPlugin> {
        self.plugins.iter().filter(|r| r.plugin.enabled())
    }

    fn plugin_error(&self, job: &Job, plugin: &str, error: String) {
        debug!(plugin, job_id = %job.id, "plugin error: {}", error);
        self.bus.emit(JobEvent::PluginError {
            job: job.clone(),
            plugin_name: plugin.to_string(),
            error,
        });
    }
}

/// Runs input plugins for playground jobs
pub struct InputPipeline {
    bus: EventBus,
}

impl InputPipeline {
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }

    /// Initialize a set of input plugins. Called exactly once, at engine
    /// construction.
    pub async fn initialize(plugins: &[RegisteredInputPlugin]) {
        for reg in plugins {
            if let Err(e) = reg.plugin.initialize().await {
                warn!(plugin = reg.plugin.name(), "initialize failed: {}", e);
            }
        }
    }

    /// Run `before -> execute -> after` for one plugin.
    ///
    /// `execute` is retried up to `max_retries` extra times; hook failures
    /// are isolated and reported via `pluginError`.
    pub async fn run_plugin(
        &self,
        job: &Job,
        reg: &RegisteredInputPlugin,
        ctx: &mut PluginContext,
        max_retries: u32,
    ) -> PluginRunOutcome {
        let name = reg.plugin.name().to_string();
        ctx.storage = std::sync::Arc::clone(&reg.storage);

        self.bus.emit(JobEvent::PluginStart {
            job: job.clone(),
            plugin_name: name.clone(),
        });

        if let Err(e) = reg.plugin.before(ctx).await {
            self.plugin_error(job, &name, e.to_string());
            return PluginRunOutcome {
                plugin: name,
                metrics: None,
                error: Some(e.to_string()),
                retries_used: 0,
            };
        }

        let mut retries_used = 0;
        let mut last_error = None;
        let mut metrics = None;
        for attempt in 0..=max_retries {
            if attempt > 0 {
                retries_used += 1;
                debug!(plugin = %name, attempt, "retrying execute");
            }
            match reg.plugin.execute(ctx).await {
                Ok(value) => {
                    metrics = Some(value);
                    last_error = None;
                    break;
                }
                Err(e) => last_error = Some(e.to_string()),
            }
        }

        match (&metrics, &last_error) {
            (Some(value), _) => {
                self.bus.emit(JobEvent::PluginComplete {
                    job: job.clone(),
                    plugin_name: name.clone(),
                    metrics: value.clone(),
                });
            }
            (None, Some(error)) => {
                self.plugin_error(job, &name, error.clone());
            }
            (None, None) => unreachable!("execute loop yields metrics or an error"),
        }

        if let Err(e) = reg.plugin.after(ctx).await {
            self.plugin_error(job, &name, e.to_string());
        }

        PluginRunOutcome {
            plugin: name,
            metrics,
            error: last_error,
            retries_used,
        }
    }

    /// Collect per-plugin summaries for the executed plugins.
    pub async fn summaries(
        plugins: &[RegisteredInputPlugin],
        result: &JobResult,
    ) -> Map<String, Value> {
        let mut summary = Map::new();
        for reg in plugins {
            let name = reg.plugin.name();
            let metrics = result.metrics_for(name);
            if metrics.is_empty() {
                continue;
            }
            match reg.plugin.summarize(&metrics).await {
                Ok(Some(value)) => {
                    summary.insert(name.to_string(), value);
                }
                Ok(None) => {}
                Err(e) => warn!(plugin = name, "summarize failed: {}", e),
            }
        }
        summary
    }

    fn plugin_error(&self, job: &Job, plugin: &str, error: String) {
        debug!(plugin, job_id = %job.id, "plugin error: {}", error);
        self.bus.emit(JobEvent::PluginError {
            job: job.clone(),
            plugin_name: plugin.to_string(),
            error,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::{
        CrawlPlugin, InputPlugin, PluginError, PluginRegistry, PluginResult, PluginStorage,
    };
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use url::Url;

    fn page() -> PageSnapshot {
        PageSnapshot {
            url: Url::parse("https://example.com/a").unwrap(),
            final_url: Url::parse("https://example.com/a").unwrap(),
            status_code: 200,
            title: Some("A".to_string()),
            body: "<html><body>hello world</body></html>".to_string(),
            word_count: 2,
            links: vec![],
            load_time: std::time::Duration::from_millis(12),
        }
    }

    fn crawl_job() -> Job {
        Job::new_crawl(
            serde_json::from_value(json!({
                "webhook": { "url": "https://example.com/hook" }
            }))
            .unwrap(),
        )
    }

    fn playground_job() -> Job {
        Job::new_playground(serde_json::from_value(json!({ "input": "hi" })).unwrap())
    }

    struct FailingEvaluate;

    #[async_trait]
    impl CrawlPlugin for FailingEvaluate {
        fn name(&self) -> &str {
            "failing"
        }
        async fn evaluate(&self, _page: &PageSnapshot, _ms: u64) -> PluginResult<Value> {
            Err(PluginError::new("boom"))
        }
    }

    struct CountingEvaluate;

    #[async_trait]
    impl CrawlPlugin for CountingEvaluate {
        fn name(&self) -> &str {
            "counting"
        }
        async fn evaluate(&self, page: &PageSnapshot, ms: u64) -> PluginResult<Value> {
            Ok(json!({ "words": page.word_count, "loadTimeMs": ms }))
        }
    }

    struct DisabledPlugin;

    #[async_trait]
    impl CrawlPlugin for DisabledPlugin {
        fn name(&self) -> &str {
            "disabled"
        }
        fn enabled(&self) -> bool {
            false
        }
        async fn evaluate(&self, _page: &PageSnapshot, _ms: u64) -> PluginResult<Value> {
            panic!("disabled plugins never run");
        }
    }

    fn crawl_pipeline(plugins: Vec<Arc<dyn CrawlPlugin>>) -> (CrawlPipeline, EventBus) {
        let mut registry = PluginRegistry::new();
        for p in plugins {
            registry.register_crawl(move |_| p);
        }
        let bus = EventBus::default();
        (
            CrawlPipeline::new(registry.crawl_plugins().to_vec(), bus.clone()),
            bus,
        )
    }

    #[tokio::test]
    async fn failing_plugin_does_not_affect_siblings() {
        let (pipeline, bus) =
            crawl_pipeline(vec![Arc::new(FailingEvaluate), Arc::new(CountingEvaluate)]);
        let mut rx = bus.subscribe();

        let evaluation = pipeline.evaluate_page(&crawl_job(), &page()).await;

        assert_eq!(evaluation.metrics.len(), 1);
        assert!(evaluation.metrics.contains_key("counting"));
        assert_eq!(
            evaluation.errors,
            vec![("failing".to_string(), "boom".to_string())]
        );

        let mut names = Vec::new();
        while let Ok(event) = rx.try_recv() {
            names.push(event.event_name());
        }
        assert_eq!(
            names,
            vec!["pluginStart", "pluginError", "pluginStart", "pluginComplete"]
        );
    }

    #[tokio::test]
    async fn disabled_plugins_are_skipped() {
        let (pipeline, _bus) =
            crawl_pipeline(vec![Arc::new(DisabledPlugin), Arc::new(CountingEvaluate)]);
        let evaluation = pipeline.evaluate_page(&crawl_job(), &page()).await;
        assert_eq!(evaluation.metrics.len(), 1);
        assert!(evaluation.errors.is_empty());
    }

    struct SummarizingPlugin;

    #[async_trait]
    impl CrawlPlugin for SummarizingPlugin {
        fn name(&self) -> &str {
            "sum"
        }
        async fn evaluate(&self, _page: &PageSnapshot, _ms: u64) -> PluginResult<Value> {
            Ok(json!({ "n": 1 }))
        }
        async fn summarize(&self, metrics: &[Value]) -> PluginResult<Option<Value>> {
            Ok(Some(json!({ "count": metrics.len() })))
        }
    }

    struct BrokenSummarize;

    #[async_trait]
    impl CrawlPlugin for BrokenSummarize {
        fn name(&self) -> &str {
            "broken"
        }
        async fn evaluate(&self, _page: &PageSnapshot, _ms: u64) -> PluginResult<Value> {
            Ok(json!({ "n": 1 }))
        }
        async fn summarize(&self, _metrics: &[Value]) -> PluginResult<Option<Value>> {
            Err(PluginError::new("summary exploded"))
        }
    }

    #[tokio::test]
    async fn broken_summarize_is_omitted_not_fatal() {
        let (pipeline, _bus) =
            crawl_pipeline(vec![Arc::new(SummarizingPlugin), Arc::new(BrokenSummarize)]);

        let mut result = JobResult::default();
        let mut entry = Map::new();
        entry.insert("sum".to_string(), json!({ "n": 1 }));
        entry.insert("broken".to_string(), json!({ "n": 1 }));
        result.metrics.push(entry);

        let summary = pipeline.summaries(&result).await;
        assert_eq!(summary.get("sum"), Some(&json!({ "count": 1 })));
        assert!(!summary.contains_key("broken"));
    }

    struct FlakyExecute {
        failures_left: AtomicU32,
    }

    #[async_trait]
    impl InputPlugin for FlakyExecute {
        fn name(&self) -> &str {
            "flaky"
        }
        async fn execute(&self, _ctx: &mut PluginContext) -> PluginResult<Value> {
            if self.failures_left.fetch_sub(1, Ordering::SeqCst) > 0 {
                Err(PluginError::new("transient"))
            } else {
                Ok(json!({ "ok": true }))
            }
        }
    }

    fn registered(plugin: Arc<dyn InputPlugin>) -> RegisteredInputPlugin {
        RegisteredInputPlugin {
            plugin,
            storage: Arc::new(PluginStorage::new()),
        }
    }

    #[tokio::test]
    async fn execute_retries_until_success() {
        let bus = EventBus::default();
        let pipeline = InputPipeline::new(bus);
        let job = playground_job();
        let reg = registered(Arc::new(FlakyExecute {
            failures_left: AtomicU32::new(2),
        }));
        let mut ctx = PluginContext::new(job.id, json!("x"), chrono::Utc::now());

        let outcome = pipeline.run_plugin(&job, &reg, &mut ctx, 3).await;
        assert!(outcome.metrics.is_some());
        assert!(outcome.error.is_none());
        assert_eq!(outcome.retries_used, 2);
    }

    #[tokio::test]
    async fn execute_exhausts_retries_and_reports_error() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let pipeline = InputPipeline::new(bus);
        let job = playground_job();
        let reg = registered(Arc::new(FlakyExecute {
            failures_left: AtomicU32::new(10),
        }));
        let mut ctx = PluginContext::new(job.id, json!("x"), chrono::Utc::now());

        let outcome = pipeline.run_plugin(&job, &reg, &mut ctx, 1).await;
        assert!(outcome.metrics.is_none());
        assert_eq!(outcome.error.as_deref(), Some("transient"));
        assert_eq!(outcome.retries_used, 1);

        let mut error_events = 0;
        while let Ok(event) = rx.try_recv() {
            if event.event_name() == "pluginError" {
                error_events += 1;
            }
        }
        assert_eq!(error_events, 1, "pluginError emitted exactly once");
    }
}
