//! Backend liveness states.
//!
//! # States
//! - Unknown: never probed; serves traffic only while the pool's
//!   `serve_unknown` knob is on
//! - Healthy: backend receives traffic
//! - Unhealthy: backend excluded from selection
//!
//! # State Transitions
//! ```text
//! Unknown   → Healthy | Unhealthy: first probe outcome
//! Healthy   ↔ Unhealthy: subsequent probe outcomes
//! any       → Healthy | Unhealthy: admin mark_status override
//! ```
//!
//! Liveness is distinct from the circuit breaker: probes track
//! reachability, the breaker reacts to production traffic. Both gate
//! eligibility.

use serde::Serialize;

/// Probe-driven liveness of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Liveness {
    Unknown,
    Healthy,
    Unhealthy,
}

impl Liveness {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            Liveness::Unknown => 0,
            Liveness::Healthy => 1,
            Liveness::Unhealthy => 2,
        }
    }

    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Liveness::Healthy,
            2 => Liveness::Unhealthy,
            _ => Liveness::Unknown,
        }
    }

    pub fn is_healthy(self) -> bool {
        self == Liveness::Healthy
    }
}

impl std::fmt::Display for Liveness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Liveness::Unknown => "unknown",
            Liveness::Healthy => "healthy",
            Liveness::Unhealthy => "unhealthy",
        };
        f.write_str(s)
    }
}
