//! Round-robin load balancing.
//!
//! # Algorithm
//! A monotonic atomic counter indexes into the slice; from that index the
//! selector scans forward up to N positions for a backend that is still
//! eligible, since eligibility can change between the pool's filter pass
//! and the pick.
//!
//! # Design Decisions
//! - Atomic counter, no locks
//! - Wraps around on overflow

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::load_balancer::{Algorithm, Backend};

/// Rotating selector. First eligible backend at or after the counter wins.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Algorithm for RoundRobin {
    fn pick(&self, backends: &[Arc<Backend>]) -> Option<Arc<Backend>> {
        if backends.is_empty() {
            return None;
        }

        let start = self.counter.fetch_add(1, Ordering::Relaxed);
        for offset in 0..backends.len() {
            let candidate = &backends[(start.wrapping_add(offset)) % backends.len()];
            if candidate.has_capacity() {
                return Some(Arc::clone(candidate));
            }
        }
        None
    }
}
