//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Forwarded request completes:
//!     → backend.record_success / record_failure
//!     → circuit_breaker.rs (track consecutive failures,
//!       open the circuit past the threshold)
//!
//! Selection attempt:
//!     → circuit state gates backend eligibility
//!     → an expired Open lazily becomes Half-Open
//! ```
//!
//! # Design Decisions
//! - The breaker reacts only to upstream outcomes; policy denials and
//!   empty pools never move it
//! - Probe liveness and circuit state stay separate signals; a tripped
//!   breaker does not mean the host is down

pub mod circuit_breaker;

pub use circuit_breaker::{BreakerSettings, CircuitBreaker, CircuitState};
