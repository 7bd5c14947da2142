//! Reverse plugin: reverses the job input

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use crate::plugin::{InputPlugin, PluginContext, PluginResult, PluginStorage};

/// Reverses the input string and reports length/timing metrics.
pub struct ReversePlugin {
    storage: Arc<PluginStorage>,
}

impl ReversePlugin {
    pub const NAME: &'static str = "reverse";

    pub fn new(storage: Arc<PluginStorage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl InputPlugin for ReversePlugin {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn execute(&self, ctx: &mut PluginContext) -> PluginResult<Value> {
        let started = Instant::now();
        let input = ctx.input_text();
        let reversed: String = input.chars().rev().collect();

        ctx.output = Some(Value::String(reversed.clone()));
        self.storage.increment("processed");

        Ok(json!({
            "processedAt": Utc::now().to_rfc3339(),
            "inputLength": input.chars().count(),
            "outputLength": reversed.chars().count(),
            "processingTimeMs": started.elapsed().as_millis() as u64,
        }))
    }

    async fn summarize(&self, metrics: &[Value]) -> PluginResult<Option<Value>> {
        let total_input: u64 = metrics
            .iter()
            .filter_map(|m| m.get("inputLength").and_then(Value::as_u64))
            .sum();
        let total_time: u64 = metrics
            .iter()
            .filter_map(|m| m.get("processingTimeMs").and_then(Value::as_u64))
            .sum();
        Ok(Some(json!({
            "totalProcessed": metrics.len(),
            "totalInputLength": total_input,
            "totalProcessingTimeMs": total_time,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plugin() -> ReversePlugin {
        ReversePlugin::new(Arc::new(PluginStorage::new()))
    }

    #[tokio::test]
    async fn reverses_string_input() {
        let p = plugin();
        let mut ctx =
            PluginContext::new(uuid::Uuid::new_v4(), Value::String("hello".into()), Utc::now());

        let metrics = p.execute(&mut ctx).await.unwrap();

        assert_eq!(ctx.output, Some(Value::String("olleh".into())));
        assert_eq!(metrics["inputLength"], 5);
        assert_eq!(metrics["outputLength"], 5);
        assert!(metrics["processedAt"].is_string());
        assert!(metrics["processingTimeMs"].is_u64());
    }

    #[tokio::test]
    async fn handles_multibyte_input() {
        let p = plugin();
        let mut ctx =
            PluginContext::new(uuid::Uuid::new_v4(), Value::String("héllo".into()), Utc::now());
        let metrics = p.execute(&mut ctx).await.unwrap();
        assert_eq!(ctx.output, Some(Value::String("olléh".into())));
        assert_eq!(metrics["inputLength"], 5);
    }

    #[tokio::test]
    async fn non_string_input_uses_json_text() {
        let p = plugin();
        let mut ctx =
            PluginContext::new(uuid::Uuid::new_v4(), json!({"a": 1}), Utc::now());
        p.execute(&mut ctx).await.unwrap();
        assert_eq!(ctx.output, Some(Value::String("}1:\"a\"{".into())));
    }

    #[tokio::test]
    async fn summary_counts_executions() {
        let p = plugin();
        let metrics = vec![
            json!({"inputLength": 5, "processingTimeMs": 1}),
            json!({"inputLength": 3, "processingTimeMs": 2}),
        ];
        let summary = p.summarize(&metrics).await.unwrap().unwrap();
        assert_eq!(summary["totalProcessed"], 2);
        assert_eq!(summary["totalInputLength"], 8);
        assert_eq!(summary["totalProcessingTimeMs"], 3);
    }
}
