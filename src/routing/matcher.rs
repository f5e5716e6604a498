//! Route matching logic.
//!
//! # Responsibilities
//! - Compile glob patterns (`*` wildcard) into anchored regexes
//! - Match host, path, method, and header criteria with AND semantics
//!
//! # Design Decisions
//! - Host matching is case-insensitive (per HTTP spec)
//! - Path matching is case-sensitive
//! - Absent criterion = always matches (wildcard)
//! - Header values match as regexes, uniformly

use axum::body::Body;
use axum::http::{header::HOST, Method, Request};
use regex::{Regex, RegexBuilder};

use crate::config::schema::MatchConfig;

/// Compile a glob pattern into an anchored regex. `*` becomes `.*`; every
/// other metacharacter is quoted.
pub fn compile_glob(pattern: &str) -> Result<Regex, regex::Error> {
    let escaped = regex::escape(pattern).replace("\\*", ".*");
    Regex::new(&format!("^{escaped}$"))
}

fn compile_host_glob(pattern: &str) -> Result<Regex, regex::Error> {
    let escaped = regex::escape(pattern).replace("\\*", ".*");
    RegexBuilder::new(&format!("^{escaped}$"))
        .case_insensitive(true)
        .build()
}

/// Compiled match criteria for one routing rule.
#[derive(Debug)]
pub struct RouteMatch {
    host: Option<Regex>,
    path: Option<Regex>,
    method: Option<Method>,
    headers: Vec<(String, Regex)>,
}

impl RouteMatch {
    pub fn compile(config: &MatchConfig) -> Result<Self, String> {
        let host = config
            .host
            .as_deref()
            .map(compile_host_glob)
            .transpose()
            .map_err(|e| format!("bad host pattern: {e}"))?;
        let path = config
            .path
            .as_deref()
            .map(compile_glob)
            .transpose()
            .map_err(|e| format!("bad path pattern: {e}"))?;
        let method = config
            .method
            .as_deref()
            .map(|m| {
                m.to_ascii_uppercase()
                    .parse::<Method>()
                    .map_err(|e| format!("bad method '{m}': {e}"))
            })
            .transpose()?;
        let headers = config
            .headers
            .iter()
            .map(|(name, pattern)| {
                Regex::new(pattern)
                    .map(|re| (name.to_ascii_lowercase(), re))
                    .map_err(|e| format!("bad regex for header '{name}': {e}"))
            })
            .collect::<Result<Vec<_>, String>>()?;

        Ok(Self {
            host,
            path,
            method,
            headers,
        })
    }

    /// Whether every present criterion matches the request.
    pub fn matches(&self, request: &Request<Body>) -> bool {
        if let Some(pattern) = &self.host {
            let host = request
                .headers()
                .get(HOST)
                .and_then(|v| v.to_str().ok())
                .or_else(|| request.uri().host());
            // Ignore any port suffix when matching the host.
            let host = host.map(|h| h.rsplit_once(':').map_or(h, |(name, _)| name));
            match host {
                Some(host) if pattern.is_match(host) => {}
                _ => return false,
            }
        }

        if let Some(pattern) = &self.path {
            if !pattern.is_match(request.uri().path()) {
                return false;
            }
        }

        if let Some(method) = &self.method {
            if request.method() != method {
                return false;
            }
        }

        for (name, pattern) in &self.headers {
            match request.headers().get(name).and_then(|v| v.to_str().ok()) {
                Some(value) if pattern.is_match(value) => {}
                _ => return false,
            }
        }

        true
    }
}
