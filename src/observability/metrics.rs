//! Metrics collection and exposition.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::http::{Method, StatusCode};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::sync::broadcast;

/// Install the Prometheus recorder. The returned handle renders the
/// exposition for the admin surface and the optional scrape listener.
/// When a recorder is already installed (several apps in one process,
/// as in tests) a detached handle is returned instead.
pub fn install_recorder() -> PrometheusHandle {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => handle,
        Err(_) => PrometheusBuilder::new().build_recorder().handle(),
    }
}

/// Serve the exposition on a dedicated scrape listener.
pub async fn serve_exposition(
    addr: SocketAddr,
    path: String,
    handle: PrometheusHandle,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), std::io::Error> {
    use axum::{routing::get, Router};

    let path = if path.starts_with('/') {
        path
    } else {
        format!("/{path}")
    };
    let app = Router::new().route(
        path.as_str(),
        get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(address = %addr, path = %path, "Metrics listener bound");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await
}

/// Record one completed client request.
pub fn record_request(method: &Method, route: &str, status: StatusCode, started: Instant) {
    let labels = [
        ("method", method.as_str().to_string()),
        ("route", route.to_string()),
        ("status", status.as_u16().to_string()),
    ];
    counter!("lb_requests_total", &labels).increment(1);
    histogram!("lb_request_duration_seconds").record(started.elapsed().as_secs_f64());
}

/// Record the upstream leg of one forwarded request.
pub fn record_upstream(pool: &str, backend: &str, elapsed: Duration) {
    let labels = [
        ("pool", pool.to_string()),
        ("backend", backend.to_string()),
    ];
    histogram!("lb_upstream_duration_seconds", &labels).record(elapsed.as_secs_f64());
}

/// Update the liveness gauge for a backend.
pub fn record_backend_health(pool: &str, backend: &str, healthy: bool) {
    let value = if healthy { 1.0 } else { 0.0 };
    gauge!(
        "lb_backend_healthy",
        "pool" => pool.to_string(),
        "backend" => backend.to_string()
    )
    .set(value);
}

/// Update the in-flight connection gauge for a backend.
pub fn record_active_connections(pool: &str, backend: &str, active: usize) {
    gauge!(
        "lb_backend_active_connections",
        "pool" => pool.to_string(),
        "backend" => backend.to_string()
    )
    .set(active as f64);
}

/// Count one policy denial.
pub fn record_policy_denial(policy_kind: &'static str, route: &str) {
    counter!(
        "lb_policy_denials_total",
        "policy" => policy_kind,
        "route" => route.to_string()
    )
    .increment(1);
}

/// Count one upstream error.
pub fn record_upstream_error(pool: &str, backend: &str, kind: &'static str) {
    counter!(
        "lb_upstream_errors_total",
        "pool" => pool.to_string(),
        "backend" => backend.to_string(),
        "kind" => kind
    )
    .increment(1);
}

/// Count one recovered handler panic.
pub fn record_internal_error() {
    counter!("lb_internal_errors_total").increment(1);
}
