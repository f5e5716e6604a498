//! Active health checking.
//!
//! # Responsibilities
//! - Run one probe task per (pool, backend) pair at the pool's cadence
//! - Flip backend liveness on each outcome and update the liveness gauge
//! - Stop promptly on the ambient shutdown signal
//!
//! Probes track reachability only; the circuit breaker reacts to
//! production traffic. Both gate eligibility independently.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use rand::Rng;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::health::probes::Probe;
use crate::health::state::Liveness;
use crate::load_balancer::{Backend, Pool, PoolRegistry};
use crate::observability::metrics;

/// Spawns and owns the probe tasks for every backend in the registry.
pub struct HealthChecker {
    registry: Arc<PoolRegistry>,
    client: Client<HttpConnector, Body>,
}

impl HealthChecker {
    pub fn new(registry: Arc<PoolRegistry>, client: Client<HttpConnector, Body>) -> Self {
        Self { registry, client }
    }

    /// Spawn one probe loop per (pool, backend). The first tick fires
    /// immediately so a freshly started proxy learns liveness fast; loops
    /// end when the shutdown channel closes or signals.
    pub fn spawn(&self, shutdown: &broadcast::Sender<()>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();
        for pool in self.registry.iter() {
            for backend in pool.backends() {
                handles.push(tokio::spawn(probe_loop(
                    Arc::clone(pool),
                    backend,
                    Probe::from_config(pool.health(), self.client.clone()),
                    shutdown.subscribe(),
                )));
            }
        }
        tracing::info!(probes = handles.len(), "Health checker started");
        handles
    }
}

async fn probe_loop(
    pool: Arc<Pool>,
    backend: Arc<Backend>,
    probe: Probe,
    mut shutdown: broadcast::Receiver<()>,
) {
    let interval = pool.health().interval();
    let timeout = pool.health().timeout();

    // Spread probe start times so pools with many backends do not fire
    // every probe in the same instant.
    let jitter = rand::thread_rng().gen_range(0..interval.as_millis().max(1) / 4 + 1);
    tokio::select! {
        _ = tokio::time::sleep(Duration::from_millis(jitter as u64)) => {}
        _ = shutdown.recv() => return,
    }

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let healthy = probe.check(backend.url(), timeout).await;
                observe(&pool, &backend, healthy);
            }
            _ = shutdown.recv() => {
                tracing::debug!(
                    pool = %pool.name(),
                    backend = %backend.name(),
                    "Probe task stopping"
                );
                break;
            }
        }
    }
}

fn observe(pool: &Pool, backend: &Backend, healthy: bool) {
    let next = if healthy {
        Liveness::Healthy
    } else {
        Liveness::Unhealthy
    };
    let previous = backend.liveness();
    backend.set_liveness(next);
    backend.mark_probed();
    metrics::record_backend_health(pool.name(), backend.name(), healthy);

    if previous != next {
        tracing::info!(
            pool = %pool.name(),
            backend = %backend.name(),
            from = %previous,
            to = %next,
            "Backend liveness changed"
        );
    }
}
