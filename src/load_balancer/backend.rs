//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single upstream origin
//! - Track in-flight requests (for Least Connections and the soft cap)
//! - Carry the probe-driven liveness state and the per-backend circuit
//!   breaker that together gate eligibility

use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;
use url::Url;

use crate::config::BackendConfig;
use crate::health::state::Liveness;
use crate::resilience::{BreakerSettings, CircuitBreaker, CircuitState};

/// A single upstream origin server.
#[derive(Debug)]
pub struct Backend {
    url: Url,
    name: String,
    weight: u32,
    max_conns: usize,
    active_conns: AtomicUsize,
    total_requests: AtomicU64,
    total_failures: AtomicU64,
    liveness: AtomicU8,
    /// Whether any probe has completed. While false, Unknown liveness may
    /// serve traffic under the pool's `serve_unknown` knob.
    probed: AtomicBool,
    circuit: CircuitBreaker,
}

impl Backend {
    pub fn from_config(config: &BackendConfig) -> Result<Self, url::ParseError> {
        let url = Url::parse(&config.url)?;
        let name = config.name.clone().unwrap_or_else(|| {
            match (url.host_str(), url.port_or_known_default()) {
                (Some(host), Some(port)) => format!("{host}:{port}"),
                _ => config.url.clone(),
            }
        });
        Ok(Self::new(url, name, config.weight, config.max_conns))
    }

    pub fn new(url: Url, name: String, weight: u32, max_conns: usize) -> Self {
        Self {
            url,
            name,
            weight,
            max_conns,
            active_conns: AtomicUsize::new(0),
            total_requests: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
            liveness: AtomicU8::new(Liveness::Unknown.as_u8()),
            probed: AtomicBool::new(false),
            circuit: CircuitBreaker::new(BreakerSettings::default()),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn weight(&self) -> u32 {
        self.weight
    }

    pub fn active_conns(&self) -> usize {
        self.active_conns.load(Ordering::Relaxed)
    }

    /// Whether the soft connection cap still has room.
    pub fn has_capacity(&self) -> bool {
        self.active_conns.load(Ordering::Relaxed) < self.max_conns
    }

    pub fn liveness(&self) -> Liveness {
        Liveness::from_u8(self.liveness.load(Ordering::Relaxed))
    }

    /// Set liveness directly. Used by the health checker and by the admin
    /// override; the circuit breaker is deliberately untouched.
    pub fn set_liveness(&self, state: Liveness) {
        self.liveness.store(state.as_u8(), Ordering::Relaxed);
    }

    /// Record that a probe completed, ending the pre-first-probe window.
    pub fn mark_probed(&self) {
        self.probed.store(true, Ordering::Relaxed);
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.circuit.current_state()
    }

    /// Whether this backend may be handed a request right now.
    ///
    /// Eligible iff liveness permits, the connection cap has room, and the
    /// circuit is not Open. `serve_unknown` admits backends still in the
    /// pre-first-probe window.
    pub fn is_eligible(&self, serve_unknown: bool) -> bool {
        let live = match self.liveness() {
            Liveness::Healthy => true,
            Liveness::Unknown => serve_unknown && !self.probed.load(Ordering::Relaxed),
            Liveness::Unhealthy => false,
        };
        live
            && self.active_conns.load(Ordering::Relaxed) < self.max_conns
            && self.circuit.current_state() != CircuitState::Open
    }

    /// Atomically test eligibility and claim a connection slot.
    ///
    /// Returns a guard that releases the slot on drop, so every successful
    /// acquisition pairs with exactly one release on any exit path.
    pub fn try_acquire(self: &Arc<Self>, serve_unknown: bool) -> Option<ConnectionGuard> {
        let live = match self.liveness() {
            Liveness::Healthy => true,
            Liveness::Unknown => serve_unknown && !self.probed.load(Ordering::Relaxed),
            Liveness::Unhealthy => false,
        };
        if !live {
            return None;
        }

        // Half-Open admits a single probe request; the slot must be given
        // back if the connection cap races us out below.
        let probing = match self.circuit.current_state() {
            CircuitState::Open => return None,
            CircuitState::HalfOpen => {
                if !self.circuit.try_begin_probe() {
                    return None;
                }
                true
            }
            CircuitState::Closed => false,
        };

        let mut current = self.active_conns.load(Ordering::Relaxed);
        loop {
            if current >= self.max_conns {
                if probing {
                    self.circuit.abort_probe();
                }
                return None;
            }
            match self.active_conns.compare_exchange_weak(
                current,
                current + 1,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }

        self.total_requests.fetch_add(1, Ordering::Relaxed);
        Some(ConnectionGuard {
            backend: Arc::clone(self),
        })
    }

    /// Give back a connection slot. Never underflows.
    fn release(&self) {
        let _ = self
            .active_conns
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    pub fn record_success(&self) {
        self.circuit.record_success();
    }

    pub fn record_failure(&self) {
        self.total_failures.fetch_add(1, Ordering::Relaxed);
        self.circuit.record_failure();
    }

    /// Immutable view for the admin surface and metrics.
    pub fn snapshot(&self) -> BackendSnapshot {
        BackendSnapshot {
            name: self.name.clone(),
            url: self.url.to_string(),
            weight: self.weight,
            liveness: self.liveness(),
            circuit: self.circuit.current_state(),
            active_conns: self.active_conns(),
            max_conns: self.max_conns,
            total_requests: self.total_requests.load(Ordering::Relaxed),
            total_failures: self.total_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of one backend.
#[derive(Debug, Clone, Serialize)]
pub struct BackendSnapshot {
    pub name: String,
    pub url: String,
    pub weight: u32,
    pub liveness: Liveness,
    pub circuit: CircuitState,
    pub active_conns: usize,
    pub max_conns: usize,
    pub total_requests: u64,
    pub total_failures: u64,
}

/// RAII guard for a claimed connection slot.
#[derive(Debug)]
pub struct ConnectionGuard {
    backend: Arc<Backend>,
}

impl ConnectionGuard {
    pub fn backend(&self) -> &Arc<Backend> {
        &self.backend
    }
}

impl Deref for ConnectionGuard {
    type Target = Backend;

    fn deref(&self) -> &Self::Target {
        &self.backend
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.backend.release();
    }
}
