//! Outbound webhook payloads
//!
//! Maps internal bus events to the externally visible webhook statuses and
//! builds the JSON body for each. Every payload carries `status`, `jobId`,
//! and an ISO 8601 `timestamp`; the remaining fields depend on the status
//! and the job kind.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::events::JobEvent;
use crate::job::{Job, JobConfig, JobId, JobKind, JobResult, PageAnalysis, Progress};

/// A payload ready for delivery
#[derive(Debug, Clone)]
pub struct OutboundWebhook {
    /// External status name: started | progress | completed | failed
    pub status: &'static str,
    pub payload: Value,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<T: Serialize> {
    status: &'static str,
    job_id: JobId,
    timestamp: String,
    #[serde(flatten)]
    body: T,
}

fn envelope<T: Serialize>(status: &'static str, job: &Job, body: T) -> OutboundWebhook {
    let envelope = Envelope {
        status,
        job_id: job.id,
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        body,
    };
    OutboundWebhook {
        status,
        payload: serde_json::to_value(envelope).expect("webhook payloads serialize"),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StartedBody {
    config: StartedConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StartedConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    plugins: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_depth: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_pages: Option<usize>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CrawlProgressBody {
    progress: CrawlProgressFields,
    #[serde(skip_serializing_if = "Option::is_none")]
    current_page: Option<CurrentPage>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CrawlProgressFields {
    pages_analyzed: u64,
    total_pages: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    current_url: Option<String>,
    unique_urls: u64,
    skipped_urls: u64,
    failed_urls: u64,
    current_depth: u8,
    /// Milliseconds since the job started
    elapsed_time: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CurrentPage {
    url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    word_count: Option<usize>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PlaygroundProgressBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    plugin_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metrics: Option<Value>,
    progress: PlaygroundProgressFields,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PlaygroundProgressFields {
    status: crate::job::JobStatus,
    completed_plugins: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    current_plugin: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CompletedBody {
    result: JobResult,
    summary: CompletedSummary,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CompletedSummary {
    /// Milliseconds from start to terminal state
    duration: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    completed_plugins: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pages_analyzed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    unique_urls: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    skipped_urls: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    failed_urls: Option<u64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FailedBody {
    error: String,
    progress: Progress,
}

/// Map a bus event to its outbound webhook, if it has one.
///
/// `pageComplete` feeds crawl progress, `pluginComplete` feeds playground
/// progress; the remaining page/plugin events stay internal.
pub fn outbound(event: &JobEvent) -> Option<OutboundWebhook> {
    let job = event.job();
    match event {
        JobEvent::JobStart { .. } => Some(envelope("started", job, started_body(job))),
        JobEvent::JobComplete { .. } => Some(envelope("completed", job, completed_body(job))),
        JobEvent::JobError { error, .. } => Some(envelope(
            "failed",
            job,
            FailedBody {
                error: error.clone(),
                progress: job.progress.clone(),
            },
        )),
        JobEvent::PageComplete { page, .. } if job.kind == JobKind::Crawl => Some(envelope(
            "progress",
            job,
            crawl_progress_body(job, Some(page)),
        )),
        JobEvent::PluginComplete {
            plugin_name,
            metrics,
            ..
        } if job.kind == JobKind::Playground => Some(envelope(
            "progress",
            job,
            playground_progress_body(job, Some(plugin_name.clone()), Some(metrics.clone())),
        )),
        JobEvent::Progress { .. } => match job.kind {
            JobKind::Crawl => Some(envelope("progress", job, crawl_progress_body(job, None))),
            JobKind::Playground => Some(envelope(
                "progress",
                job,
                playground_progress_body(job, None, None),
            )),
        },
        _ => None,
    }
}

fn started_body(job: &Job) -> StartedBody {
    let config = match &job.config {
        JobConfig::Crawl(c) => StartedConfig {
            url: c.url.clone(),
            plugins: None,
            max_depth: Some(c.max_depth),
            max_pages: Some(c.max_pages),
        },
        JobConfig::Playground(c) => StartedConfig {
            url: None,
            plugins: c.plugins.clone(),
            max_depth: None,
            max_pages: None,
        },
    };
    StartedBody { config }
}

fn crawl_progress_body(job: &Job, page: Option<&PageAnalysis>) -> CrawlProgressBody {
    let c = job.progress.crawl.clone().unwrap_or_default();
    CrawlProgressBody {
        progress: CrawlProgressFields {
            pages_analyzed: c.pages_analyzed,
            total_pages: c.total_pages,
            current_url: c.current_url,
            unique_urls: c.unique_urls,
            skipped_urls: c.skipped_urls,
            failed_urls: c.failed_urls,
            current_depth: c.current_depth,
            elapsed_time: job.progress.elapsed_ms(),
        },
        current_page: page.map(|p| CurrentPage {
            url: p.url.clone(),
            title: p.title.clone(),
            word_count: p.word_count,
        }),
    }
}

fn playground_progress_body(
    job: &Job,
    plugin_name: Option<String>,
    metrics: Option<Value>,
) -> PlaygroundProgressBody {
    let p = job.progress.playground.clone().unwrap_or_default();
    PlaygroundProgressBody {
        plugin_name,
        metrics,
        progress: PlaygroundProgressFields {
            status: job.progress.status,
            completed_plugins: p.completed_plugins,
            current_plugin: p.current_plugin,
        },
    }
}

fn completed_body(job: &Job) -> CompletedBody {
    let result = job.result.clone().unwrap_or_default();
    let duration = job.progress.elapsed_ms();

    let summary = match job.kind {
        JobKind::Crawl => {
            let c = job.progress.crawl.clone().unwrap_or_default();
            CompletedSummary {
                duration,
                completed_plugins: None,
                pages_analyzed: Some(c.pages_analyzed),
                unique_urls: Some(c.unique_urls),
                skipped_urls: Some(c.skipped_urls),
                failed_urls: Some(c.failed_urls),
            }
        }
        JobKind::Playground => {
            let p = job.progress.playground.clone().unwrap_or_default();
            CompletedSummary {
                duration,
                completed_plugins: Some(p.completed_plugins),
                pages_analyzed: None,
                unique_urls: None,
                skipped_urls: None,
                failed_urls: None,
            }
        }
    };

    CompletedBody { result, summary }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn crawl_job() -> Job {
        let mut job = Job::new_crawl(
            serde_json::from_value(json!({
                "webhook": { "url": "https://example.com/hook" }
            }))
            .unwrap(),
        );
        if let JobConfig::Crawl(c) = &mut job.config {
            c.url = Some("https://example.com/".to_string());
        }
        job
    }

    fn playground_job() -> Job {
        Job::new_playground(
            serde_json::from_value(json!({
                "input": "hello",
                "plugins": ["reverse"],
                "webhook": { "url": "https://example.com/hook" }
            }))
            .unwrap(),
        )
    }

    #[test]
    fn job_start_maps_to_started_with_config() {
        let out = outbound(&JobEvent::JobStart { job: crawl_job() }).unwrap();
        assert_eq!(out.status, "started");
        assert_eq!(out.payload["status"], "started");
        assert_eq!(out.payload["config"]["url"], "https://example.com/");
        assert_eq!(out.payload["config"]["maxDepth"], 3);
        assert_eq!(out.payload["config"]["maxPages"], 100);
        assert!(out.payload["jobId"].is_string());
        assert!(out.payload["timestamp"].is_string());
    }

    #[test]
    fn playground_started_lists_plugins() {
        let out = outbound(&JobEvent::JobStart {
            job: playground_job(),
        })
        .unwrap();
        assert_eq!(out.payload["config"]["plugins"], json!(["reverse"]));
        assert!(out.payload["config"].get("maxDepth").is_none());
    }

    #[test]
    fn plugin_complete_maps_to_playground_progress() {
        let mut job = playground_job();
        job.progress.playground.as_mut().unwrap().completed_plugins =
            vec!["reverse".to_string()];

        let out = outbound(&JobEvent::PluginComplete {
            job,
            plugin_name: "reverse".to_string(),
            metrics: json!({"inputLength": 5}),
        })
        .unwrap();

        assert_eq!(out.status, "progress");
        assert_eq!(out.payload["pluginName"], "reverse");
        assert_eq!(out.payload["metrics"]["inputLength"], 5);
        assert_eq!(out.payload["progress"]["completedPlugins"], json!(["reverse"]));
    }

    #[test]
    fn plugin_complete_on_crawl_jobs_stays_internal() {
        let out = outbound(&JobEvent::PluginComplete {
            job: crawl_job(),
            plugin_name: "pageStats".to_string(),
            metrics: json!({}),
        });
        assert!(out.is_none());
    }

    #[test]
    fn page_complete_maps_to_crawl_progress_with_current_page() {
        let mut job = crawl_job();
        {
            let c = job.progress.crawl.as_mut().unwrap();
            c.pages_analyzed = 3;
            c.unique_urls = 5;
            c.total_pages = 5;
        }
        let page = PageAnalysis {
            url: "https://example.com/a".to_string(),
            final_url: None,
            depth: 1,
            status_code: Some(200),
            title: Some("A".to_string()),
            word_count: Some(40),
            load_time_ms: 12,
            error: None,
            discovered_urls: 2,
            metrics: serde_json::Map::new(),
            analyzed_at: Utc::now(),
        };

        let out = outbound(&JobEvent::PageComplete { job, page }).unwrap();
        assert_eq!(out.status, "progress");
        assert_eq!(out.payload["progress"]["pagesAnalyzed"], 3);
        assert_eq!(out.payload["progress"]["uniqueUrls"], 5);
        assert_eq!(out.payload["currentPage"]["title"], "A");
        assert_eq!(out.payload["currentPage"]["wordCount"], 40);
    }

    #[test]
    fn page_start_and_errors_stay_internal() {
        let job = crawl_job();
        assert!(outbound(&JobEvent::PageStart {
            job: job.clone(),
            url: "https://example.com/a".to_string(),
        })
        .is_none());
        assert!(outbound(&JobEvent::PluginError {
            job: job.clone(),
            plugin_name: "pageStats".to_string(),
            error: "x".to_string(),
        })
        .is_none());
        assert!(outbound(&JobEvent::PageError {
            job,
            url: "https://example.com/a".to_string(),
            error: "x".to_string(),
        })
        .is_none());
    }

    #[test]
    fn job_error_maps_to_failed_with_progress() {
        let mut job = crawl_job();
        job.progress.error = Some("driver exploded".to_string());

        let out = outbound(&JobEvent::JobError {
            job,
            error: "driver exploded".to_string(),
        })
        .unwrap();
        assert_eq!(out.status, "failed");
        assert_eq!(out.payload["error"], "driver exploded");
        assert_eq!(out.payload["progress"]["status"], "queued");
    }

    #[test]
    fn completed_crawl_summary_has_page_counters() {
        let mut job = crawl_job();
        {
            let c = job.progress.crawl.as_mut().unwrap();
            c.pages_analyzed = 7;
            c.unique_urls = 9;
            c.skipped_urls = 1;
            c.failed_urls = 2;
        }
        job.result = Some(JobResult::default());

        let out = outbound(&JobEvent::JobComplete { job }).unwrap();
        assert_eq!(out.payload["summary"]["pagesAnalyzed"], 7);
        assert_eq!(out.payload["summary"]["uniqueUrls"], 9);
        assert_eq!(out.payload["summary"]["skippedUrls"], 1);
        assert_eq!(out.payload["summary"]["failedUrls"], 2);
        assert!(out.payload["summary"].get("completedPlugins").is_none());
        assert!(out.payload["summary"]["duration"].is_u64());
    }

    #[test]
    fn completed_playground_summary_lists_plugins() {
        let mut job = playground_job();
        job.progress.playground.as_mut().unwrap().completed_plugins =
            vec!["reverse".to_string()];
        job.result = Some(JobResult::default());

        let out = outbound(&JobEvent::JobComplete { job }).unwrap();
        assert_eq!(
            out.payload["summary"]["completedPlugins"],
            json!(["reverse"])
        );
        assert!(out.payload["summary"].get("pagesAnalyzed").is_none());
    }

}
