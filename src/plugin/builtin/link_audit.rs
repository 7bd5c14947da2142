//! Link audit plugin

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::crawler::driver::PageSnapshot;
use crate::plugin::{CrawlPlugin, PluginResult, PluginStorage};

/// Classifies the links found on each page as internal or external.
pub struct LinkAuditPlugin {
    storage: Arc<PluginStorage>,
}

impl LinkAuditPlugin {
    pub const NAME: &'static str = "linkAudit";

    pub fn new(storage: Arc<PluginStorage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl CrawlPlugin for LinkAuditPlugin {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn evaluate(&self, page: &PageSnapshot, _load_time_ms: u64) -> PluginResult<Value> {
        let page_host = page.final_url.host_str().unwrap_or_default();
        let internal = page
            .links
            .iter()
            .filter(|l| l.host_str() == Some(page_host))
            .count();
        let external = page.links.len() - internal;
        self.storage.increment("pages");

        Ok(json!({
            "links": page.links.len(),
            "internalLinks": internal,
            "externalLinks": external,
        }))
    }

    async fn summarize(&self, metrics: &[Value]) -> PluginResult<Option<Value>> {
        if metrics.is_empty() {
            return Ok(None);
        }
        let sum_of = |key: &str| -> u64 {
            metrics
                .iter()
                .filter_map(|m| m.get(key).and_then(Value::as_u64))
                .sum()
        };
        Ok(Some(json!({
            "totalLinks": sum_of("links"),
            "internalLinks": sum_of("internalLinks"),
            "externalLinks": sum_of("externalLinks"),
        })))
    }
}
