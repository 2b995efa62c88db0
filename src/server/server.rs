use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{middleware, Router};
use http::StatusCode;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::timeout::{RequestBodyTimeoutLayer, TimeoutLayer};
use tracing::info;

use crate::observability::metrics::get_metrics;
use crate::observability::routes::MetricsState;
use crate::proxy::forwarder::{proxy_metrics_middleware, ProxyState};

/// Limits applied to the proxy server. `None` disables a limit.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServerTimeouts {
    /// Time allowed for reading the request body.
    pub read: Option<Duration>,
    /// Time allowed for producing the whole response.
    pub write: Option<Duration>,
}

/// Serve health checks and metrics until `shutdown` fires.
pub async fn start_internal(listen: &str, shutdown: CancellationToken) -> Result<()> {
    let metrics = get_metrics().await;
    let app = MetricsState::new(metrics.registry.clone()).router();

    let listener = bind(listen).await?;
    info!(address = %listener.local_addr()?, "starting internal HTTP server");
    serve(listener, app, shutdown).await
}

/// Serve the reverse proxy until `shutdown` fires.
pub async fn start_proxy(
    listen: &str,
    state: ProxyState,
    timeouts: ServerTimeouts,
    shutdown: CancellationToken,
) -> Result<()> {
    let listener = bind(listen).await?;
    info!(address = %listener.local_addr()?, "starting proxy server");
    serve(listener, proxy_router(state, timeouts), shutdown).await
}

pub fn proxy_router(state: ProxyState, timeouts: ServerTimeouts) -> Router {
    let mut app = state.router();
    if let Some(read) = timeouts.read {
        app = app.layer(RequestBodyTimeoutLayer::new(read));
    }
    if let Some(write) = timeouts.write {
        app = app.layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, write));
    }
    app.layer(middleware::from_fn(proxy_metrics_middleware))
}

async fn bind(listen: &str) -> Result<TcpListener> {
    TcpListener::bind(listen)
        .await
        .with_context(|| format!("failed to listen on {}", listen))
}

pub async fn serve(listener: TcpListener, app: Router, shutdown: CancellationToken) -> Result<()> {
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown.cancelled_owned())
    .await
    .context("HTTP server failed")
}
