//! Admin API: a separate HTTP listener over the pool registry.
//!
//! # Surface
//! ```text
//! GET    {prefix}/status    proxy liveness + pool count
//! GET    {prefix}/backends  pools → backend snapshots
//! POST   {prefix}/backends  {pool, url, healthy[, weight, max_conns]}
//!                           liveness override; unknown URLs are added
//! DELETE {prefix}/backends  ?pool=…&url=…
//! GET    {prefix}/metrics   Prometheus exposition
//! ```
//!
//! Membership and liveness overrides are the only runtime mutations the
//! proxy accepts; everything else is startup configuration.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::routing::get;
use axum::{middleware, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::load_balancer::PoolRegistry;
use auth::admin_auth_middleware;
use handlers::{delete_backends, get_backends, get_metrics, get_status, post_backends};

/// State shared by admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub registry: Arc<PoolRegistry>,
    pub prometheus: PrometheusHandle,
    pub api_key: String,
}

/// Build the admin router mounted under `prefix` (e.g. `/admin`).
pub fn admin_router(state: AdminState, prefix: &str) -> Router {
    let prefix = prefix.trim_end_matches('/');
    let routes = Router::new()
        .route("/status", get(get_status))
        .route("/backends", get(get_backends).post(post_backends).delete(delete_backends))
        .route("/metrics", get(get_metrics))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admin_auth_middleware,
        ))
        .with_state(state);

    if prefix.is_empty() {
        routes
    } else {
        Router::new().nest(prefix, routes)
    }
}

/// Serve the admin surface until shutdown.
pub async fn run_admin(
    router: Router,
    listener: TcpListener,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "Admin server starting");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    tracing::info!(address = %addr, "Admin server stopped");
    Ok(())
}
