//! Uppercase plugin: uppercases the job input

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use crate::plugin::{InputPlugin, PluginContext, PluginResult, PluginStorage};

/// Uppercases the input string.
pub struct UppercasePlugin {
    storage: Arc<PluginStorage>,
}

impl UppercasePlugin {
    pub const NAME: &'static str = "uppercase";

    pub fn new(storage: Arc<PluginStorage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl InputPlugin for UppercasePlugin {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn execute(&self, ctx: &mut PluginContext) -> PluginResult<Value> {
        let started = Instant::now();
        let input = ctx.input_text();
        let upper = input.to_uppercase();
        let changed = input
            .chars()
            .zip(upper.chars())
            .filter(|(a, b)| a != b)
            .count();

        ctx.output = Some(Value::String(upper.clone()));
        self.storage.increment("processed");

        Ok(json!({
            "processedAt": Utc::now().to_rfc3339(),
            "inputLength": input.chars().count(),
            "outputLength": upper.chars().count(),
            "changedChars": changed,
            "processingTimeMs": started.elapsed().as_millis() as u64,
        }))
    }

    async fn summarize(&self, metrics: &[Value]) -> PluginResult<Option<Value>> {
        let changed: u64 = metrics
            .iter()
            .filter_map(|m| m.get("changedChars").and_then(Value::as_u64))
            .sum();
        Ok(Some(json!({
            "totalProcessed": metrics.len(),
            "totalChangedChars": changed,
        })))
    }
}
