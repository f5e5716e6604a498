//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the data-plane Axum router
//! - Wire up middleware (tracing, timeout, request ID, panic recovery)
//! - Serve the reserved `/health` and `/_lb_status` endpoints before
//!   routing engages
//! - Dispatch everything else to the proxy engine
//! - Serve with graceful shutdown on the ambient signal

use std::any::Any;
use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{any, get};
use axum::{Json, Router};
use bytes::Bytes;
use http_body_util::Full;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::http::proxy::{proxy_handler, ProxyState};
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::observability::metrics;
use crate::routing::{HEALTH_PATH, STATUS_PATH};

/// The data-plane HTTP server.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(state: ProxyState, config: &ServerConfig) -> Self {
        Self {
            router: build_router(state, config),
        }
    }

    /// Serve until the shutdown channel signals, then stop accepting and
    /// let in-flight requests finish (the caller bounds the drain).
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!(address = %addr, "HTTP server stopped");
        Ok(())
    }
}

/// Build the Axum router with all middleware layers.
fn build_router(state: ProxyState, config: &ServerConfig) -> Router {
    Router::new()
        .route(HEALTH_PATH, get(health))
        .route(STATUS_PATH, get(lb_status))
        .route("/", any(proxy_handler))
        .route("/{*path}", any(proxy_handler))
        .with_state(state)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TimeoutLayer::new(Duration::from_secs(config.write_timeout)))
        .layer(propagate_request_id_layer())
        .layer(set_request_id_layer())
        .layer(TraceLayer::new_for_http())
}

/// Reserved liveness endpoint; always answers before routing.
async fn health() -> &'static str {
    "OK"
}

/// Reserved status endpoint backed by the pool registry.
async fn lb_status(State(state): State<ProxyState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "operational",
        "version": env!("CARGO_PKG_VERSION"),
        "pools": state.registry.len(),
    }))
}

/// Global recovery wrapper: a panicking handler becomes a 500 and the
/// server keeps serving other requests.
fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response<Full<Bytes>> {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s
    } else {
        "unknown panic"
    };
    tracing::error!(detail = %detail, "Handler panicked");
    metrics::record_internal_error();

    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .body(Full::from("internal error"))
        .expect("static response")
}
