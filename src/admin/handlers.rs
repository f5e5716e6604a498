//! Admin API handlers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::admin::AdminState;
use crate::load_balancer::{Backend, BackendSnapshot};

#[derive(Serialize)]
pub struct SystemStatus {
    pub status: &'static str,
    pub version: &'static str,
    pub pools: usize,
}

#[derive(Serialize)]
pub struct PoolStatus {
    pub name: String,
    pub backends: Vec<BackendSnapshot>,
}

/// Body of `POST /backends`. An unknown URL is added to the pool first,
/// then marked; a known URL only has its liveness overridden.
#[derive(Deserialize)]
pub struct MarkBackendRequest {
    pub pool: String,
    pub url: String,
    pub healthy: bool,
    #[serde(default)]
    pub weight: Option<u32>,
    #[serde(default)]
    pub max_conns: Option<usize>,
}

/// Query of `DELETE /backends`.
#[derive(Deserialize)]
pub struct RemoveBackendQuery {
    pub pool: String,
    pub url: String,
}

/// `GET /status` — proxy liveness plus pool count.
pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        status: "operational",
        version: env!("CARGO_PKG_VERSION"),
        pools: state.registry.len(),
    })
}

/// `GET /backends` — every pool with its backend snapshots.
pub async fn get_backends(State(state): State<AdminState>) -> Json<Vec<PoolStatus>> {
    let mut pools: Vec<PoolStatus> = state
        .registry
        .iter()
        .map(|pool| PoolStatus {
            name: pool.name().to_string(),
            backends: pool.list(),
        })
        .collect();
    pools.sort_by(|a, b| a.name.cmp(&b.name));
    Json(pools)
}

/// `POST /backends` — liveness override, upserting unknown URLs.
pub async fn post_backends(
    State(state): State<AdminState>,
    Json(body): Json<MarkBackendRequest>,
) -> impl IntoResponse {
    let Some(pool) = state.registry.get(&body.pool) else {
        return (StatusCode::NOT_FOUND, format!("unknown pool '{}'", body.pool)).into_response();
    };

    if pool.mark_status(&body.url, body.healthy) {
        return (StatusCode::OK, "liveness updated").into_response();
    }

    let config = crate::config::BackendConfig {
        name: None,
        url: body.url.clone(),
        weight: body.weight.unwrap_or(1),
        max_conns: body.max_conns.unwrap_or(1024),
    };
    let backend = match Backend::from_config(&config) {
        Ok(backend) => Arc::new(backend),
        Err(e) => {
            return (StatusCode::BAD_REQUEST, format!("invalid url '{}': {e}", body.url))
                .into_response()
        }
    };
    pool.add(backend);
    pool.mark_status(&body.url, body.healthy);
    (StatusCode::CREATED, "backend added").into_response()
}

/// `DELETE /backends` — remove a backend from its pool.
pub async fn delete_backends(
    State(state): State<AdminState>,
    Query(query): Query<RemoveBackendQuery>,
) -> impl IntoResponse {
    let Some(pool) = state.registry.get(&query.pool) else {
        return (StatusCode::NOT_FOUND, format!("unknown pool '{}'", query.pool)).into_response();
    };
    if pool.remove(&query.url) {
        StatusCode::NO_CONTENT.into_response()
    } else {
        (StatusCode::NOT_FOUND, format!("unknown backend '{}'", query.url)).into_response()
    }
}

/// `GET /metrics` — Prometheus exposition.
pub async fn get_metrics(State(state): State<AdminState>) -> String {
    state.prometheus.render()
}
