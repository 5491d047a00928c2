//! HTTP server for the metrics endpoint.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use junosight_ssh::{Dialer, SshDialer};
use serde::Deserialize;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::scrape::Scraper;

const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Application state shared across handlers.
struct AppState<D: Dialer> {
    scraper: Arc<Scraper<D>>,
}

impl<D: Dialer> Clone for AppState<D> {
    fn clone(&self) -> Self {
        Self {
            scraper: self.scraper.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct MetricsQuery {
    /// Restrict the scrape to one configured device.
    target: Option<String>,
}

/// Create the HTTP router.
fn create_router<D: Dialer>(scraper: Arc<Scraper<D>>, metrics_path: &str) -> Router {
    let state = AppState { scraper };

    Router::new()
        .route(metrics_path, get(metrics_handler::<D>))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Handler for the metrics endpoint. Every request runs one scrape cycle.
async fn metrics_handler<D: Dialer>(
    State(state): State<AppState<D>>,
    Query(query): Query<MetricsQuery>,
) -> Response {
    if let Some(target) = &query.target
        && !state.scraper.has_target(target)
    {
        debug!(device = %target, "Scrape requested for unknown target");
        return (
            StatusCode::NOT_FOUND,
            format!("unknown target: {}\n", target),
        )
            .into_response();
    }

    let sink = state.scraper.scrape(query.target.as_deref()).await;
    let body = sink.render();

    (StatusCode::OK, [("content-type", CONTENT_TYPE)], body).into_response()
}

/// Handler for the /health endpoint.
async fn health_handler() -> Response {
    (StatusCode::OK, "healthy\n").into_response()
}

/// HTTP server configuration.
pub struct HttpServer<D: Dialer = SshDialer> {
    scraper: Arc<Scraper<D>>,
    listen_addr: SocketAddr,
    metrics_path: String,
}

impl<D: Dialer> HttpServer<D> {
    /// Create a new HTTP server.
    pub fn new(scraper: Arc<Scraper<D>>, listen_addr: SocketAddr, metrics_path: String) -> Self {
        Self {
            scraper,
            listen_addr,
            metrics_path,
        }
    }

    /// Run the HTTP server until the shutdown signal is received.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let router = create_router(self.scraper, &self.metrics_path);

        let listener = tokio::net::TcpListener::bind(self.listen_addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", self.listen_addr, e))?;

        info!(
            addr = %self.listen_addr,
            path = %self.metrics_path,
            "HTTP server listening"
        );

        // Run server with graceful shutdown
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                loop {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                    if *shutdown.borrow() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

        info!("HTTP server stopped");
        Ok(())
    }
}
