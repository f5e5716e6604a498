//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Rule matched → target pool identified
//!     → pool.rs (materialise eligibility-filtered slice under a
//!       short read lock)
//!     → Apply selection algorithm:
//!         - round_robin.rs (rotate through backends)
//!         - weighted.rs (smooth weighted round-robin)
//!         - least_conn.rs (fewest in-flight requests)
//!     → backend.rs (claim a connection slot, RAII release)
//!     → Return backend guard or NoBackend
//! ```
//!
//! # Design Decisions
//! - One algorithm instance per pool; WRR state lives inside its instance
//! - Algorithms see only the eligibility-filtered slice
//! - Backend counters are atomic; no lock on the hot path

pub mod backend;
pub mod least_conn;
pub mod pool;
pub mod round_robin;
pub mod weighted;

use std::fmt::Debug;
use std::sync::Arc;

use crate::config::AlgorithmKind;

pub use backend::{Backend, BackendSnapshot, ConnectionGuard};
pub use pool::{Pool, PoolError, PoolRegistry};

/// Selection algorithm over an eligibility-filtered backend slice.
///
/// Implementations may keep internal counters but are stateless with
/// respect to the request itself.
pub trait Algorithm: Debug + Send + Sync {
    fn pick(&self, backends: &[Arc<Backend>]) -> Option<Arc<Backend>>;
}

/// Construct the algorithm instance bound to one pool.
pub fn algorithm_for(kind: AlgorithmKind) -> Box<dyn Algorithm> {
    match kind {
        AlgorithmKind::RoundRobin => Box::new(round_robin::RoundRobin::new()),
        AlgorithmKind::Weighted => Box::new(weighted::SmoothWeighted::new()),
        AlgorithmKind::LeastConn => Box::new(least_conn::LeastConnections::new()),
    }
}
