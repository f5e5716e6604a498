//! Configuration validation logic.

use std::collections::HashSet;
use std::fmt;

use url::Url;

use crate::config::schema::Config;
use crate::policy::acl::parse_entry;
use crate::policy::transform::Transform;
use crate::routing::matcher::compile_glob;

/// Error type for configuration validation failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError(pub String);

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Validate a Config for semantic correctness. All errors are collected so
/// an operator sees the whole picture in one startup failure.
pub fn validate_config(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.address.is_empty() {
        errors.push(ValidationError("server.address is required".to_string()));
    }

    match (&config.server.tls_cert, &config.server.tls_key) {
        (Some(_), None) => errors.push(ValidationError(
            "server.tls_cert set without server.tls_key".to_string(),
        )),
        (None, Some(_)) => errors.push(ValidationError(
            "server.tls_key set without server.tls_cert".to_string(),
        )),
        _ => {}
    }

    if !matches!(
        config.monitoring.logging.level.as_str(),
        "trace" | "debug" | "info" | "warn" | "error"
    ) {
        errors.push(ValidationError(format!(
            "unknown logging level '{}'",
            config.monitoring.logging.level
        )));
    }

    if config.monitoring.tracing.enabled
        && !(0.0..=1.0).contains(&config.monitoring.tracing.sampling_rate)
    {
        errors.push(ValidationError(format!(
            "tracing.sampling_rate {} out of [0, 1]",
            config.monitoring.tracing.sampling_rate
        )));
    }

    // Pools: unique names, non-empty membership, well-formed origins.
    let mut pool_names: HashSet<&str> = HashSet::new();
    if config.backend_pools.is_empty() {
        errors.push(ValidationError(
            "at least one backend pool is required".to_string(),
        ));
    }
    for pool in &config.backend_pools {
        if pool.name.is_empty() {
            errors.push(ValidationError("backend pool name is required".to_string()));
        }
        if !pool_names.insert(pool.name.as_str()) {
            errors.push(ValidationError(format!(
                "duplicate backend pool name '{}'",
                pool.name
            )));
        }
        if pool.backends.is_empty() {
            errors.push(ValidationError(format!(
                "pool '{}' has no backends",
                pool.name
            )));
        }
        if pool.health_check.interval <= 0.0 {
            errors.push(ValidationError(format!(
                "pool '{}': health_check.interval must be > 0",
                pool.name
            )));
        }
        for backend in &pool.backends {
            match Url::parse(&backend.url) {
                Ok(url) => {
                    if !matches!(url.scheme(), "http" | "https") {
                        errors.push(ValidationError(format!(
                            "pool '{}': backend url '{}' must use http or https",
                            pool.name, backend.url
                        )));
                    }
                    if url.host_str().is_none() {
                        errors.push(ValidationError(format!(
                            "pool '{}': backend url '{}' has no host",
                            pool.name, backend.url
                        )));
                    }
                }
                Err(e) => errors.push(ValidationError(format!(
                    "pool '{}': invalid backend url '{}': {e}",
                    pool.name, backend.url
                ))),
            }
            if backend.weight == 0 {
                errors.push(ValidationError(format!(
                    "pool '{}': backend '{}' weight must be >= 1",
                    pool.name, backend.url
                )));
            }
        }
    }

    // Rules: resolvable targets, compilable patterns, well-formed policies.
    if config.routing_rules.is_empty() {
        errors.push(ValidationError(
            "at least one routing rule is required".to_string(),
        ));
    }
    for (i, rule) in config.routing_rules.iter().enumerate() {
        if rule.target_pool.is_empty() {
            errors.push(ValidationError(format!(
                "routing rule #{i}: target_pool is required"
            )));
        } else if !pool_names.contains(rule.target_pool.as_str()) {
            errors.push(ValidationError(format!(
                "routing rule #{i}: unknown target pool '{}'",
                rule.target_pool
            )));
        }

        for glob in [&rule.matches.host, &rule.matches.path].into_iter().flatten() {
            if let Err(e) = compile_glob(glob) {
                errors.push(ValidationError(format!(
                    "routing rule #{i}: bad pattern '{glob}': {e}"
                )));
            }
        }
        for (name, pattern) in &rule.matches.headers {
            if let Err(e) = regex::Regex::new(pattern) {
                errors.push(ValidationError(format!(
                    "routing rule #{i}: bad regex for header '{name}': {e}"
                )));
            }
        }

        for policy in &rule.policies {
            if let Some(rl) = &policy.rate_limit {
                if rl.rate == 0 || rl.per == 0 {
                    errors.push(ValidationError(format!(
                        "routing rule #{i}: rate_limit rate and per must be > 0"
                    )));
                }
            }
            if let Some(acl) = &policy.acl {
                for entry in acl.allow.iter().chain(acl.deny.iter()) {
                    if let Err(e) = parse_entry(entry) {
                        errors.push(ValidationError(format!(
                            "routing rule #{i}: bad ACL entry '{entry}': {e}"
                        )));
                    }
                }
            }
            if let Some(tf) = &policy.transform {
                if let Err(e) = Transform::from_config(tf) {
                    errors.push(ValidationError(format!(
                        "routing rule #{i}: bad transform: {e}"
                    )));
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
