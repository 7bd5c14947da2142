//! Process wiring
//!
//! Builds the store, event bus, plugin registry, engines, queues, and
//! webhook emitter exactly once and hands them to the HTTP layer. Everything
//! shares one shutdown channel; dropping a job mid-flight on shutdown fails
//! that job but never corrupts the store.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::info;

use crate::config::Config;
use crate::crawler::{CrawlEngine, HttpPageDriver, PageDriver};
use crate::events::EventBus;
use crate::job::{JobQueue, JobStore};
use crate::playground::PlaygroundEngine;
use crate::plugin::PluginRegistry;
use crate::server::AppState;
use crate::webhook::WebhookEmitter;

/// A fully wired server core
pub struct App {
    pub state: AppState,
    pub shutdown: broadcast::Sender<()>,
}

/// Construct all components with the default plugin registry and page
/// driver.
pub async fn bootstrap(config: &Config) -> anyhow::Result<App> {
    let driver: Arc<dyn PageDriver> = Arc::new(HttpPageDriver::new()?);
    bootstrap_with(config, PluginRegistry::with_builtins(), driver).await
}

/// Construct all components around a caller-supplied registry and driver.
pub async fn bootstrap_with(
    config: &Config,
    registry: PluginRegistry,
    driver: Arc<dyn PageDriver>,
) -> anyhow::Result<App> {
    let (shutdown, _) = broadcast::channel(4);
    let retention = config.jobs.retention_secs.map(Duration::from_secs);
    let store = Arc::new(JobStore::new(retention));
    let bus = EventBus::default();
    let registry = Arc::new(registry);

    let crawler = CrawlEngine::new(
        Arc::clone(&store),
        bus.clone(),
        driver,
        &registry,
        shutdown.clone(),
    )
    .await?;
    let crawl_queue = JobQueue::new(
        Arc::clone(&crawler) as _,
        config.queue.max_pending,
        shutdown.subscribe(),
    );
    crawler.bind_queue(crawl_queue);

    let playground = PlaygroundEngine::new(
        Arc::clone(&store),
        bus.clone(),
        Arc::clone(&registry),
        shutdown.clone(),
    )
    .await;
    let playground_queue = JobQueue::new(
        Arc::clone(&playground) as _,
        config.queue.max_pending,
        shutdown.subscribe(),
    );
    playground.bind_queue(playground_queue);

    let _ = WebhookEmitter::new()?.spawn(&bus, shutdown.subscribe());

    // Plugin destroy hooks run once, on shutdown
    {
        let crawler = Arc::clone(&crawler);
        let playground = Arc::clone(&playground);
        let mut rx = shutdown.subscribe();
        tokio::spawn(async move {
            let _ = rx.recv().await;
            crawler.destroy().await;
            playground.destroy().await;
        });
    }

    info!("crawld core wired: queues, engines, webhook emitter ready");

    Ok(App {
        state: AppState {
            crawler,
            playground,
            store,
            bus,
        },
        shutdown,
    })
}
