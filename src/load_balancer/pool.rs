//! Backend pool management.
//!
//! # Responsibilities
//! - Own the backends of one named pool plus its algorithm binding
//! - Materialise the eligibility-filtered slice under a short read lock
//! - Expose the admin mutation surface (add, remove, mark_status)

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use thiserror::Error;

use crate::config::{BackendPoolConfig, HealthCheckConfig};
use crate::health::state::Liveness;
use crate::load_balancer::{algorithm_for, Algorithm, Backend, BackendSnapshot};

/// Pool-level selection failures.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("no eligible backend in pool '{0}'")]
    NoBackend(String),
}

/// A named, ordered set of backends with one selection algorithm.
#[derive(Debug)]
pub struct Pool {
    name: String,
    backends: RwLock<Vec<Arc<Backend>>>,
    algorithm: Box<dyn Algorithm>,
    health: HealthCheckConfig,
}

impl Pool {
    pub fn from_config(config: &BackendPoolConfig) -> Result<Self, url::ParseError> {
        let backends = config
            .backends
            .iter()
            .map(|b| Backend::from_config(b).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name: config.name.clone(),
            backends: RwLock::new(backends),
            algorithm: algorithm_for(config.algorithm),
            health: config.health_check.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn health(&self) -> &HealthCheckConfig {
        &self.health
    }

    pub fn serve_unknown(&self) -> bool {
        self.health.serve_unknown
    }

    /// Select an eligible backend.
    ///
    /// The read lock is held only long enough to copy out the eligible
    /// slice; the algorithm runs against that snapshot.
    pub fn pick(&self) -> Result<Arc<Backend>, PoolError> {
        let eligible: Vec<Arc<Backend>> = {
            let backends = self.read();
            backends
                .iter()
                .filter(|b| b.is_eligible(self.health.serve_unknown))
                .cloned()
                .collect()
        };

        self.algorithm
            .pick(&eligible)
            .ok_or_else(|| PoolError::NoBackend(self.name.clone()))
    }

    /// All backends, for the health checker.
    pub fn backends(&self) -> Vec<Arc<Backend>> {
        self.read().clone()
    }

    /// Snapshot of all backends, for admin and metrics.
    pub fn list(&self) -> Vec<BackendSnapshot> {
        self.read().iter().map(|b| b.snapshot()).collect()
    }

    pub fn add(&self, backend: Arc<Backend>) {
        let mut backends = self.write();
        tracing::info!(
            pool = %self.name,
            backend = %backend.url(),
            "Backend added"
        );
        backends.push(backend);
    }

    /// Remove a backend by URL. Returns whether anything was removed.
    pub fn remove(&self, url: &str) -> bool {
        let mut backends = self.write();
        let before = backends.len();
        backends.retain(|b| b.url().as_str() != url && b.url().as_str().trim_end_matches('/') != url);
        let removed = backends.len() < before;
        if removed {
            tracing::info!(pool = %self.name, backend = %url, "Backend removed");
        }
        removed
    }

    /// Find a backend by URL.
    pub fn find(&self, url: &str) -> Option<Arc<Backend>> {
        self.read()
            .iter()
            .find(|b| b.url().as_str() == url || b.url().as_str().trim_end_matches('/') == url)
            .cloned()
    }

    /// Admin liveness override. Does not reset the circuit breaker and
    /// closes the pre-first-probe window for the backend.
    pub fn mark_status(&self, url: &str, healthy: bool) -> bool {
        let Some(backend) = self.find(url) else {
            return false;
        };
        let state = if healthy {
            Liveness::Healthy
        } else {
            Liveness::Unhealthy
        };
        backend.set_liveness(state);
        backend.mark_probed();
        tracing::info!(
            pool = %self.name,
            backend = %url,
            liveness = %state,
            "Backend liveness overridden"
        );
        true
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Arc<Backend>>> {
        self.backends.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Arc<Backend>>> {
        self.backends.write().unwrap_or_else(|e| e.into_inner())
    }
}

/// Name-keyed registry of all pools. Shared by the router, the health
/// checker, and the admin surface; never an ownership cycle.
#[derive(Debug, Default)]
pub struct PoolRegistry {
    pools: HashMap<String, Arc<Pool>>,
}

impl PoolRegistry {
    pub fn from_config(configs: &[BackendPoolConfig]) -> Result<Self, url::ParseError> {
        let mut pools = HashMap::with_capacity(configs.len());
        for config in configs {
            let pool = Pool::from_config(config)?;
            pools.insert(config.name.clone(), Arc::new(pool));
        }
        Ok(Self { pools })
    }

    pub fn get(&self, name: &str) -> Option<Arc<Pool>> {
        self.pools.get(name).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Pool>> {
        self.pools.values()
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AlgorithmKind, BackendConfig};

    fn pool_config(urls: &[&str]) -> BackendPoolConfig {
        BackendPoolConfig {
            name: "web".into(),
            algorithm: AlgorithmKind::RoundRobin,
            backends: urls
                .iter()
                .map(|u| BackendConfig {
                    name: None,
                    url: u.to_string(),
                    weight: 1,
                    max_conns: 16,
                })
                .collect(),
            health_check: HealthCheckConfig::default(),
        }
    }

    #[test]
    fn pick_skips_unhealthy_backends() {
        let pool =
            Pool::from_config(&pool_config(&["http://127.0.0.1:3000", "http://127.0.0.1:3001"]))
                .unwrap();
        let backends = pool.backends();
        backends[0].set_liveness(Liveness::Unhealthy);
        backends[1].set_liveness(Liveness::Healthy);

        for _ in 0..4 {
            assert_eq!(pool.pick().unwrap().name(), backends[1].name());
        }
    }

    #[test]
    fn pick_fails_when_all_backends_unhealthy() {
        let pool = Pool::from_config(&pool_config(&["http://127.0.0.1:3000"])).unwrap();
        pool.backends()[0].set_liveness(Liveness::Unhealthy);

        assert!(matches!(pool.pick(), Err(PoolError::NoBackend(_))));
    }

    #[test]
    fn unknown_backends_serve_before_first_probe() {
        let pool = Pool::from_config(&pool_config(&["http://127.0.0.1:3000"])).unwrap();
        assert!(pool.pick().is_ok());

        pool.backends()[0].mark_probed();
        assert!(pool.pick().is_err(), "window closes with the first probe");
    }

    #[test]
    fn mark_status_overrides_liveness_without_touching_circuit() {
        let pool = Pool::from_config(&pool_config(&["http://127.0.0.1:3000"])).unwrap();
        let backend = pool.backends().remove(0);
        backend.record_failure();

        assert!(pool.mark_status("http://127.0.0.1:3000", false));
        assert_eq!(backend.liveness(), Liveness::Unhealthy);

        assert!(pool.mark_status("http://127.0.0.1:3000", true));
        assert_eq!(backend.liveness(), Liveness::Healthy);
        assert_eq!(backend.snapshot().total_failures, 1, "circuit untouched");
    }

    #[test]
    fn add_and_remove_mutate_membership() {
        let pool = Pool::from_config(&pool_config(&["http://127.0.0.1:3000"])).unwrap();
        let extra = Arc::new(Backend::new(
            url::Url::parse("http://127.0.0.1:4000").unwrap(),
            "extra".into(),
            1,
            16,
        ));
        pool.add(extra);
        assert_eq!(pool.list().len(), 2);

        assert!(pool.remove("http://127.0.0.1:4000"));
        assert!(!pool.remove("http://127.0.0.1:4000"));
        assert_eq!(pool.list().len(), 1);
    }

    #[test]
    fn registry_resolves_by_name() {
        let registry = PoolRegistry::from_config(&[pool_config(&["http://127.0.0.1:3000"])])
            .unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.get("web").is_some());
        assert!(registry.get("missing").is_none());
    }
}
