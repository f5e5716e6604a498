//! Circuit breaker for backend protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: backend assumed down, requests fail fast
//! - Half-Open: testing if backend recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive_failures >= open_threshold
//! Open → Half-Open: reset_timeout elapsed, observed on the next
//!                   selection attempt
//! Half-Open → Closed: probe request succeeds (counters zeroed)
//! Half-Open → Open: probe request fails (fresh opened_at)
//! ```
//!
//! # Design Decisions
//! - Per-backend breaker, not global
//! - Half-Open admits exactly one in-flight probe request; concurrent
//!   arrivals fail fast until the probe resolves
//! - State mutates only on completion of forwarded requests, never on
//!   policy denials or empty pools

use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;

/// Breaker state visible to eligibility checks and snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Trip and reset thresholds.
#[derive(Debug, Clone, Copy)]
pub struct BreakerSettings {
    /// Consecutive failures that trip the breaker.
    pub open_threshold: u32,

    /// Time spent Open before the next selection attempt sees Half-Open.
    pub reset_timeout: Duration,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            open_threshold: 5,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

/// Per-backend failure gate.
#[derive(Debug)]
pub struct CircuitBreaker {
    settings: BreakerSettings,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(settings: BreakerSettings) -> Self {
        Self {
            settings,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    /// Current state. An expired Open transitions to Half-Open here, so the
    /// next selection attempt after `reset_timeout` observes Half-Open.
    pub fn current_state(&self) -> CircuitState {
        let mut inner = self.lock();
        if inner.state == CircuitState::Open {
            let expired = inner
                .opened_at
                .is_some_and(|at| at.elapsed() >= self.settings.reset_timeout);
            if expired {
                inner.state = CircuitState::HalfOpen;
                inner.probe_in_flight = false;
            }
        }
        inner.state
    }

    /// Claim the single Half-Open probe slot. Returns false when the breaker
    /// is not Half-Open or another probe is already in flight.
    pub fn try_begin_probe(&self) -> bool {
        let mut inner = self.lock();
        if inner.state == CircuitState::HalfOpen && !inner.probe_in_flight {
            inner.probe_in_flight = true;
            true
        } else {
            false
        }
    }

    /// Release a claimed probe slot without an outcome. Used when admission
    /// fails after the slot was claimed (e.g. the connection cap raced).
    pub fn abort_probe(&self) {
        self.lock().probe_in_flight = false;
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures = 0;
        inner.state = CircuitState::Closed;
        inner.opened_at = None;
        inner.probe_in_flight = false;
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                inner.probe_in_flight = false;
            }
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.settings.open_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Consecutive failure count, for snapshots.
    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned breaker mutex means a panic mid-update; the state
        // itself is still a valid enum, so continue with it.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(BreakerSettings::default())
    }
}
