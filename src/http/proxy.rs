//! The request forwarding engine.
//!
//! # Responsibilities
//! - Run the policy chain (request phase) for the matched rule
//! - Select and admit a backend, retrying admission races
//! - Rewrite the request onto the backend origin (hop-by-hop headers
//!   stripped, X-Forwarded-* appended)
//! - Dispatch with the per-request upstream deadline
//! - Record the outcome on the backend's circuit breaker and telemetry
//! - Stream the response, releasing the connection slot when the body
//!   finishes
//!
//! This is the single translation boundary from typed errors to HTTP
//! status codes: policy denials map to 403/429, an empty eligibility set
//! to 503, transport errors to 502, and upstream deadline misses to 504.

use std::net::SocketAddr;
use std::ops::Deref;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::header::{CONNECTION, HOST};
use axum::http::uri::{Authority, Scheme};
use axum::http::{HeaderMap, HeaderValue, Request, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use hyper::body::Incoming;
use hyper_util::client::legacy::{connect::HttpConnector, Client};

use crate::load_balancer::{Backend, ConnectionGuard, PoolError, PoolRegistry};
use crate::observability::metrics;
use crate::policy::{ClientIdentity, PolicyError};
use crate::routing::{Route, Router};

/// Headers that must not be forwarded (RFC 7230 §6.1).
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

pub type UpstreamClient = Client<HttpConnector, Body>;

/// State shared by every data-plane request task.
#[derive(Clone)]
pub struct ProxyState {
    pub router: Arc<Router>,
    pub registry: Arc<PoolRegistry>,
    pub client: UpstreamClient,
    pub upstream_timeout: Duration,
    pub admission_retries: u32,
    pub proto: &'static str,
}

/// Main proxy handler: route, admit, forward, record.
pub async fn proxy_handler(
    State(state): State<ProxyState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    mut request: Request<Body>,
) -> Response {
    let started = Instant::now();
    let method = request.method().clone();

    let Some(route) = state.router.route(&request) else {
        tracing::debug!(path = %request.uri().path(), "No route matched");
        let response = plain(StatusCode::NOT_FOUND, "no matching route");
        metrics::record_request(&method, "unmatched", response.status(), started);
        return response;
    };
    let route_label = route.path_template.clone();

    let client_id = ClientIdentity::from_request(request.headers(), remote);
    match route.policies.apply_request(&mut request, &client_id) {
        Ok(Ok(())) => {}
        Ok(Err((reason, kind))) => {
            metrics::record_policy_denial(kind, &route_label);
            let response = plain(reason.status(), reason.as_str());
            metrics::record_request(&method, &route_label, response.status(), started);
            return response;
        }
        Err(PolicyError::InvalidRewrite(detail)) => {
            tracing::error!(route = %route_label, detail = %detail, "Policy application failed");
            let response = plain(StatusCode::INTERNAL_SERVER_ERROR, "policy failure");
            metrics::record_request(&method, &route_label, response.status(), started);
            return response;
        }
    }

    let guard = match admit(route, state.admission_retries) {
        Some(guard) => TrackedGuard::new(route.pool.name(), guard),
        None => {
            let response = plain(StatusCode::SERVICE_UNAVAILABLE, "no available backend");
            metrics::record_request(&method, &route_label, response.status(), started);
            return response;
        }
    };

    let response = forward(&state, route, guard, request, remote).await;

    metrics::record_request(&method, &route_label, response.status(), started);
    response
}

/// Pool selection plus connection admission, retried a bounded number of
/// times to absorb the connection-cap race between `pick` and
/// `try_acquire`.
fn admit(route: &Route, attempts: u32) -> Option<ConnectionGuard> {
    let serve_unknown = route.pool.serve_unknown();

    for attempt in 0..attempts.max(1) {
        match route.pool.pick() {
            Ok(backend) => {
                if let Some(guard) = backend.try_acquire(serve_unknown) {
                    return Some(guard);
                }
                tracing::debug!(
                    pool = %route.pool.name(),
                    backend = %backend.name(),
                    attempt,
                    "Backend admission lost a capacity race"
                );
            }
            Err(PoolError::NoBackend(pool)) => {
                tracing::warn!(pool = %pool, "No eligible backend");
                return None;
            }
        }
    }
    None
}

async fn forward(
    state: &ProxyState,
    route: &Route,
    guard: TrackedGuard,
    request: Request<Body>,
    remote: SocketAddr,
) -> Response {
    let pool_name = route.pool.name().to_string();
    let backend_name = guard.name().to_string();

    let upstream_request = match build_upstream_request(request, &guard, remote, state.proto) {
        Ok(req) => req,
        Err(detail) => {
            tracing::error!(backend = %backend_name, detail = %detail, "Upstream URI rewrite failed");
            return plain(StatusCode::BAD_GATEWAY, "invalid backend address");
        }
    };

    let dispatched = Instant::now();
    match tokio::time::timeout(state.upstream_timeout, state.client.request(upstream_request)).await
    {
        Err(_elapsed) => {
            guard.record_failure();
            metrics::record_upstream_error(&pool_name, &backend_name, "timeout");
            tracing::warn!(
                pool = %pool_name,
                backend = %backend_name,
                timeout_secs = state.upstream_timeout.as_secs(),
                "Upstream request timed out"
            );
            plain(StatusCode::GATEWAY_TIMEOUT, "upstream timeout")
        }
        Ok(Err(error)) => {
            guard.record_failure();
            metrics::record_upstream_error(&pool_name, &backend_name, "transport");
            tracing::error!(
                pool = %pool_name,
                backend = %backend_name,
                error = %error,
                "Upstream request failed"
            );
            plain(StatusCode::BAD_GATEWAY, "upstream request failed")
        }
        Ok(Ok(upstream_response)) => {
            metrics::record_upstream(&pool_name, &backend_name, dispatched.elapsed());

            // Gateway-class statuses stream through unchanged but count
            // against the backend.
            match upstream_response.status() {
                StatusCode::BAD_GATEWAY
                | StatusCode::SERVICE_UNAVAILABLE
                | StatusCode::GATEWAY_TIMEOUT => {
                    guard.record_failure();
                    metrics::record_upstream_error(&pool_name, &backend_name, "gateway_status");
                }
                _ => guard.record_success(),
            }

            let (mut parts, body) = upstream_response.into_parts();
            strip_hop_by_hop(&mut parts.headers);
            route.policies.apply_response(parts.status, &parts.headers);

            // The connection slot stays claimed until the body finishes
            // streaming to the client.
            let body = Body::new(GuardedBody { inner: body, guard });
            Response::from_parts(parts, body)
        }
    }
}

/// Rewrite the client request onto the backend origin.
fn build_upstream_request(
    mut request: Request<Body>,
    guard: &TrackedGuard,
    remote: SocketAddr,
    proto: &'static str,
) -> Result<Request<Body>, String> {
    let original_host = request
        .headers()
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| request.uri().authority().map(|a| a.to_string()));

    strip_hop_by_hop(request.headers_mut());

    let forwarded_for = match request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        Some(existing) if !existing.is_empty() => format!("{existing}, {}", remote.ip()),
        _ => remote.ip().to_string(),
    };
    if let Ok(value) = HeaderValue::from_str(&forwarded_for) {
        request.headers_mut().insert("x-forwarded-for", value);
    }
    if let Some(host) = original_host {
        if let Ok(value) = HeaderValue::from_str(&host) {
            request.headers_mut().insert("x-forwarded-host", value);
        }
    }
    request
        .headers_mut()
        .insert("x-forwarded-proto", HeaderValue::from_static(proto));

    let backend_url = guard.url();
    let mut parts = request.uri().clone().into_parts();
    parts.scheme = Some(
        backend_url
            .scheme()
            .parse::<Scheme>()
            .map_err(|e| e.to_string())?,
    );
    let authority = match (backend_url.host_str(), backend_url.port_or_known_default()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        _ => return Err(format!("backend url '{backend_url}' has no authority")),
    };
    parts.authority = Some(Authority::try_from(authority.as_str()).map_err(|e| e.to_string())?);
    if parts.path_and_query.is_none() {
        parts.path_and_query = Some(axum::http::uri::PathAndQuery::from_static("/"));
    }
    *request.uri_mut() = Uri::from_parts(parts).map_err(|e| e.to_string())?;

    Ok(request)
}

/// Remove RFC 7230 §6.1 hop-by-hop headers, including any named by the
/// Connection header itself.
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let connection_named: Vec<String> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect();

    for name in connection_named {
        headers.remove(name.as_str());
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

fn plain(status: StatusCode, message: &'static str) -> Response {
    (status, message).into_response()
}

/// Connection guard plus the labels that keep the in-flight gauge honest.
/// The gauge is raised here at admission and lowered in `Drop`, so every
/// release path — streamed response, transport error, timeout — reports
/// the same way.
struct TrackedGuard {
    pool: String,
    guard: ConnectionGuard,
}

impl TrackedGuard {
    fn new(pool: &str, guard: ConnectionGuard) -> Self {
        metrics::record_active_connections(pool, guard.name(), guard.active_conns());
        Self {
            pool: pool.to_string(),
            guard,
        }
    }
}

impl Deref for TrackedGuard {
    type Target = Backend;

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

impl Drop for TrackedGuard {
    fn drop(&mut self) {
        metrics::record_active_connections(
            &self.pool,
            self.guard.name(),
            self.guard.active_conns().saturating_sub(1),
        );
    }
}

/// Response body wrapper that holds the backend's connection slot until
/// the stream completes, and logs mid-stream failures (the headers are
/// already on the wire, so there is nothing to retry).
struct GuardedBody {
    inner: Incoming,
    guard: TrackedGuard,
}

impl http_body::Body for GuardedBody {
    type Data = Bytes;
    type Error = hyper::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<http_body::Frame<Self::Data>, Self::Error>>> {
        let this = &mut *self;
        let polled = Pin::new(&mut this.inner).poll_frame(cx);
        if let Poll::Ready(Some(Err(error))) = &polled {
            tracing::warn!(
                pool = %this.guard.pool,
                backend = %this.guard.name(),
                error = %error,
                "Upstream body stream failed mid-response"
            );
        }
        polled
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> http_body::SizeHint {
        self.inner.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.append(
                axum::http::HeaderName::from_bytes(k.as_bytes()).unwrap(),
                v.parse().unwrap(),
            );
        }
        map
    }

    #[test]
    fn strips_static_hop_by_hop_set() {
        let mut h = headers(&[
            ("connection", "keep-alive"),
            ("keep-alive", "timeout=5"),
            ("transfer-encoding", "chunked"),
            ("upgrade", "h2c"),
            ("content-type", "text/plain"),
        ]);
        strip_hop_by_hop(&mut h);

        assert_eq!(h.len(), 1);
        assert!(h.contains_key("content-type"));
    }

    #[test]
    fn strips_headers_named_by_connection() {
        let mut h = headers(&[
            ("connection", "x-session-token, x-other"),
            ("x-session-token", "abc"),
            ("x-other", "1"),
            ("x-kept", "yes"),
        ]);
        strip_hop_by_hop(&mut h);

        assert!(!h.contains_key("x-session-token"));
        assert!(!h.contains_key("x-other"));
        assert!(h.contains_key("x-kept"));
    }
}
