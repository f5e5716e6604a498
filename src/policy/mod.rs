//! Request admission and mutation policies.
//!
//! # Data Flow
//! ```text
//! Rule matched:
//!     → chain request phase (before backend selection)
//!         rate_limit.rs (token bucket per client key)
//!         acl.rs (deny-first CIDR / host lists)
//!         transform.rs (header / path / query mutation)
//!     → first Denied or Error stops the chain
//!     → chain response phase (after dispatch, header view only)
//! ```
//!
//! # Design Decisions
//! - Policies are scoped per routing rule, not global
//! - The proxy engine owns the Denied → HTTP status mapping
//! - Client identity: first non-empty of X-Forwarded-For first hop,
//!   X-Real-IP, remote address host

pub mod acl;
pub mod rate_limit;
pub mod transform;

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use thiserror::Error;

use crate::config::schema::PolicyConfig;

/// Why a policy rejected a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    RateLimitExceeded,
    AclBlocked,
    InvalidClient,
}

impl DenyReason {
    pub fn status(self) -> StatusCode {
        match self {
            DenyReason::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            DenyReason::AclBlocked | DenyReason::InvalidClient => StatusCode::FORBIDDEN,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DenyReason::RateLimitExceeded => "rate limit exceeded",
            DenyReason::AclBlocked => "access denied",
            DenyReason::InvalidClient => "invalid client address",
        }
    }
}

/// Outcome of one policy's request phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Deny(DenyReason),
}

/// Internal policy failures, mapped to 500 by the proxy engine.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("request rewrite produced an invalid URI: {0}")]
    InvalidRewrite(String),
}

/// Identity of the requesting client, derived once per request.
#[derive(Debug, Clone)]
pub struct ClientIdentity {
    raw: String,
}

impl ClientIdentity {
    /// First non-empty of the X-Forwarded-For first hop, X-Real-IP, and
    /// the remote socket host.
    pub fn from_request(headers: &HeaderMap, remote: SocketAddr) -> Self {
        if let Some(xff) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
            if let Some(first) = xff.split(',').next() {
                let first = first.trim();
                if !first.is_empty() {
                    return Self { raw: first.to_string() };
                }
            }
        }
        if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
            let real_ip = real_ip.trim();
            if !real_ip.is_empty() {
                return Self { raw: real_ip.to_string() };
            }
        }
        Self {
            raw: remote.ip().to_string(),
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn ip(&self) -> Option<IpAddr> {
        self.raw.parse().ok()
    }
}

/// A pluggable request admission or mutation step.
pub trait Policy: Send + Sync {
    /// Stable kind label for metrics and logs.
    fn kind(&self) -> &'static str;

    /// Request phase, invoked before backend selection.
    fn apply_request(
        &self,
        request: &mut Request<Body>,
        client: &ClientIdentity,
    ) -> Result<Verdict, PolicyError>;

    /// Response phase, invoked after dispatch against an immutable view of
    /// the response headers. Header-only annotations; most policies have
    /// nothing to do here.
    fn apply_response(&self, _status: StatusCode, _headers: &HeaderMap) {}
}

/// Ordered list of policies scoped to one routing rule.
#[derive(Default)]
pub struct PolicyChain {
    policies: Vec<Arc<dyn Policy>>,
}

impl PolicyChain {
    /// Build the chain for one rule. Within one config entry the phases
    /// apply in rate_limit, acl, transform order. Rate limiters are also
    /// returned separately so the sweeper can reach them.
    pub fn from_config(
        configs: &[PolicyConfig],
    ) -> Result<(Self, Vec<Arc<rate_limit::RateLimit>>), String> {
        let mut policies: Vec<Arc<dyn Policy>> = Vec::new();
        let mut limiters = Vec::new();

        for config in configs {
            if let Some(rl) = &config.rate_limit {
                let limiter = Arc::new(rate_limit::RateLimit::new(rl.rate, rl.per()));
                limiters.push(Arc::clone(&limiter));
                policies.push(limiter);
            }
            if let Some(acl) = &config.acl {
                policies.push(Arc::new(acl::Acl::from_config(acl)?));
            }
            if let Some(tf) = &config.transform {
                policies.push(Arc::new(transform::Transform::from_config(tf)?));
            }
        }

        Ok((Self { policies }, limiters))
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Request phase. Evaluation stops at the first Denied or Error; the
    /// denying policy's kind is reported for telemetry.
    pub fn apply_request(
        &self,
        request: &mut Request<Body>,
        client: &ClientIdentity,
    ) -> Result<Result<(), (DenyReason, &'static str)>, PolicyError> {
        for policy in &self.policies {
            match policy.apply_request(request, client)? {
                Verdict::Allow => {}
                Verdict::Deny(reason) => return Ok(Err((reason, policy.kind()))),
            }
        }
        Ok(Ok(()))
    }

    /// Response phase, header view only.
    pub fn apply_response(&self, status: StatusCode, headers: &HeaderMap) {
        for policy in &self.policies {
            policy.apply_response(status, headers);
        }
    }
}

impl std::fmt::Debug for PolicyChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kinds: Vec<&str> = self.policies.iter().map(|p| p.kind()).collect();
        f.debug_struct("PolicyChain").field("policies", &kinds).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(
                axum::http::HeaderName::from_bytes(k.as_bytes()).unwrap(),
                v.parse().unwrap(),
            );
        }
        map
    }

    fn remote() -> SocketAddr {
        "192.0.2.7:55000".parse().unwrap()
    }

    #[test]
    fn identity_prefers_forwarded_for_first_hop() {
        let h = headers(&[
            ("x-forwarded-for", "203.0.113.9, 10.0.0.1"),
            ("x-real-ip", "198.51.100.2"),
        ]);
        let id = ClientIdentity::from_request(&h, remote());
        assert_eq!(id.raw(), "203.0.113.9");
        assert_eq!(id.ip(), "203.0.113.9".parse().ok());
    }

    #[test]
    fn identity_falls_back_to_real_ip_then_remote() {
        let h = headers(&[("x-real-ip", "198.51.100.2")]);
        assert_eq!(
            ClientIdentity::from_request(&h, remote()).raw(),
            "198.51.100.2"
        );

        let empty = HeaderMap::new();
        assert_eq!(ClientIdentity::from_request(&empty, remote()).raw(), "192.0.2.7");
    }

    #[test]
    fn empty_forwarded_for_hop_is_skipped() {
        let h = headers(&[("x-forwarded-for", " , 10.0.0.1")]);
        assert_eq!(ClientIdentity::from_request(&h, remote()).raw(), "192.0.2.7");
    }
}
