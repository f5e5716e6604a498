//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Compile the rule table at startup
//! - Look up the first matching rule for a request
//! - Return matched (pool, policies) or explicit NoRoute
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - Linear scan in declaration order; first match wins even when a later
//!   rule is more specific
//! - Explicit no-match rather than a silent default pool

use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;

use crate::config::schema::RoutingRuleConfig;
use crate::load_balancer::{Pool, PoolRegistry};
use crate::policy::{rate_limit::RateLimit, PolicyChain};
use crate::routing::matcher::RouteMatch;

/// Path always answered 200 by the data plane, before routing.
pub const HEALTH_PATH: &str = "/health";

/// Path reserved for the load balancer status payload.
pub const STATUS_PATH: &str = "/_lb_status";

/// One compiled routing rule.
#[derive(Debug)]
pub struct Route {
    matcher: RouteMatch,
    /// Path template used as the metrics label; the configured glob, so
    /// label cardinality stays bounded.
    pub path_template: String,
    pub pool: Arc<Pool>,
    pub policies: Arc<PolicyChain>,
}

/// Ordered rule table.
#[derive(Debug)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    /// Compile all rules against the pool registry. Also returns every
    /// rate limiter created, so the sweeper can reach them.
    pub fn from_config(
        rules: &[RoutingRuleConfig],
        registry: &PoolRegistry,
    ) -> Result<(Self, Vec<Arc<RateLimit>>), String> {
        let mut routes = Vec::with_capacity(rules.len());
        let mut limiters = Vec::new();

        for (i, rule) in rules.iter().enumerate() {
            let matcher = RouteMatch::compile(&rule.matches)
                .map_err(|e| format!("routing rule #{i}: {e}"))?;
            let pool = registry
                .get(&rule.target_pool)
                .ok_or_else(|| format!("routing rule #{i}: unknown pool '{}'", rule.target_pool))?;
            let (policies, rule_limiters) = PolicyChain::from_config(&rule.policies)
                .map_err(|e| format!("routing rule #{i}: {e}"))?;
            limiters.extend(rule_limiters);

            routes.push(Route {
                matcher,
                path_template: rule.matches.path.clone().unwrap_or_else(|| "*".to_string()),
                pool,
                policies: Arc::new(policies),
            });
        }

        Ok((Self { routes }, limiters))
    }

    /// First matching rule in declaration order, or None for 404.
    pub fn route(&self, request: &Request<Body>) -> Option<&Route> {
        self.routes.iter().find(|r| r.matcher.matches(request))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{
        AlgorithmKind, BackendConfig, BackendPoolConfig, HealthCheckConfig, MatchConfig,
    };

    fn registry(pools: &[&str]) -> PoolRegistry {
        let configs: Vec<BackendPoolConfig> = pools
            .iter()
            .map(|name| BackendPoolConfig {
                name: name.to_string(),
                algorithm: AlgorithmKind::RoundRobin,
                backends: vec![BackendConfig {
                    name: None,
                    url: "http://127.0.0.1:3000".into(),
                    weight: 1,
                    max_conns: 16,
                }],
                health_check: HealthCheckConfig::default(),
            })
            .collect();
        PoolRegistry::from_config(&configs).unwrap()
    }

    fn rule(path: &str, pool: &str) -> RoutingRuleConfig {
        RoutingRuleConfig {
            matches: MatchConfig {
                path: Some(path.to_string()),
                ..Default::default()
            },
            target_pool: pool.to_string(),
            policies: Vec::new(),
        }
    }

    fn get(path: &str) -> Request<Body> {
        Request::builder().uri(path).body(Body::empty()).unwrap()
    }

    #[test]
    fn first_match_wins_over_later_more_specific_rule() {
        let registry = registry(&["a", "b"]);
        let (router, _) =
            Router::from_config(&[rule("/api/*", "a"), rule("/api/users", "b")], &registry)
                .unwrap();

        let matched = router.route(&get("/api/users")).unwrap();
        assert_eq!(matched.pool.name(), "a");
    }

    #[test]
    fn no_match_yields_none() {
        let registry = registry(&["a"]);
        let (router, _) = Router::from_config(&[rule("/api/*", "a")], &registry).unwrap();

        assert!(router.route(&get("/other")).is_none());
    }

    #[test]
    fn unknown_pool_fails_compilation() {
        let registry = registry(&["a"]);
        let err = Router::from_config(&[rule("/x", "missing")], &registry).unwrap_err();
        assert!(err.contains("unknown pool"));
    }

    #[test]
    fn rate_limiters_are_collected_for_the_sweeper() {
        let registry = registry(&["a"]);
        let mut limited = rule("/api/*", "a");
        limited.policies.push(crate::config::schema::PolicyConfig {
            rate_limit: Some(crate::config::schema::RateLimitConfig { rate: 5, per: 1 }),
            ..Default::default()
        });

        let (_, limiters) = Router::from_config(&[limited], &registry).unwrap();
        assert_eq!(limiters.len(), 1);
    }
}
