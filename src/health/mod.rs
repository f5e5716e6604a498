//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active probes (active.rs):
//!     per-(pool, backend) timer at the pool's cadence
//!     → probes.rs (HTTP status or TCP connect)
//!     → state.rs liveness flip + gauge update
//!
//! Production traffic (http/proxy.rs):
//!     upstream outcome → circuit breaker, NOT liveness
//! ```
//!
//! # Design Decisions
//! - Probe liveness and circuit state are deliberately separate signals
//! - Health state is per backend, not per pool
//! - Probe failures never surface to clients

pub mod active;
pub mod probes;
pub mod state;

pub use active::HealthChecker;
pub use state::Liveness;
