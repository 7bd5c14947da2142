//! HTTP server runner

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::http::Method;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::HttpConfig;

use super::handlers::AppState;
use super::routes::create_router;

/// Serves the crawl and playground APIs until shutdown fires
pub struct HttpServer {
    config: HttpConfig,
    state: AppState,
}

impl HttpServer {
    pub fn new(config: HttpConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// The router with its middleware stack applied.
    fn router(&self) -> Router {
        let mut router = create_router(self.state.clone()).layer(TraceLayer::new_for_http());
        if self.config.cors_enabled {
            router = router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_headers(Any)
                    .allow_methods([Method::GET, Method::POST]),
            );
        }
        router
    }

    /// Bind the listener and serve requests until the shutdown channel
    /// fires.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        let addr: SocketAddr = self.config.listen_addr.parse().with_context(|| {
            format!(
                "listen address '{}' is not host:port",
                self.config.listen_addr
            )
        })?;

        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("cannot bind {}", addr))?;
        info!(%addr, "crawl API ready");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                info!("draining HTTP connections");
            })
            .await
            .context("HTTP serve loop ended abnormally")?;

        Ok(())
    }
}
