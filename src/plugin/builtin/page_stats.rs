//! Page statistics plugin

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::crawler::driver::PageSnapshot;
use crate::plugin::{CrawlPlugin, PluginResult, PluginStorage};

/// Records size and timing stats for every visited page.
pub struct PageStatsPlugin {
    storage: Arc<PluginStorage>,
}

impl PageStatsPlugin {
    pub const NAME: &'static str = "pageStats";

    pub fn new(storage: Arc<PluginStorage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl CrawlPlugin for PageStatsPlugin {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn evaluate(&self, page: &PageSnapshot, load_time_ms: u64) -> PluginResult<Value> {
        self.storage.increment("pages");
        Ok(json!({
            "url": page.final_url.as_str(),
            "statusCode": page.status_code,
            "wordCount": page.word_count,
            "titleLength": page.title.as_ref().map(|t| t.chars().count()).unwrap_or(0),
            "bodyBytes": page.body.len(),
            "loadTimeMs": load_time_ms,
        }))
    }

    async fn summarize(&self, metrics: &[Value]) -> PluginResult<Option<Value>> {
        if metrics.is_empty() {
            return Ok(None);
        }
        let total_words: u64 = metrics
            .iter()
            .filter_map(|m| m.get("wordCount").and_then(Value::as_u64))
            .sum();
        let load_times: Vec<u64> = metrics
            .iter()
            .filter_map(|m| m.get("loadTimeMs").and_then(Value::as_u64))
            .collect();
        let avg_load = load_times.iter().sum::<u64>() / load_times.len().max(1) as u64;
        let max_load = load_times.iter().max().copied().unwrap_or(0);

        Ok(Some(json!({
            "pagesAnalyzed": metrics.len(),
            "totalWords": total_words,
            "avgLoadTimeMs": avg_load,
            "maxLoadTimeMs": max_load,
        })))
    }
}
