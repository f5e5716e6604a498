//! Smooth weighted round-robin.
//!
//! # Algorithm
//! Every pick adds each backend's configured weight to its running
//! `current_weight`, selects the backend with the maximum running weight,
//! then subtracts the sum of configured weights from the chosen one.
//! Over k·Σwᵢ picks each backend is emitted exactly k·wᵢ times, without
//! bursty runs of the heaviest backend.
//!
//! Running weights are keyed by backend URL rather than slice index, so
//! membership changes do not shuffle state between backends. Keys absent
//! from the slice are dropped on each pick: a backend removed through the
//! admin surface starts from zero if the same URL is ever re-added.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::Mutex;

use crate::load_balancer::{Algorithm, Backend};

/// Smooth WRR selector. Bound 1:1 to a pool; holds the running weights.
#[derive(Debug, Default)]
pub struct SmoothWeighted {
    current: Mutex<HashMap<String, i64>>,
}

impl SmoothWeighted {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    fn tracked_backends(&self) -> usize {
        self.current.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Algorithm for SmoothWeighted {
    fn pick(&self, backends: &[Arc<Backend>]) -> Option<Arc<Backend>> {
        if backends.is_empty() {
            return None;
        }

        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());

        // Shed state for backends no longer in the slice.
        if current.len() != backends.len() {
            let present: HashSet<&str> = backends.iter().map(|b| b.url().as_str()).collect();
            current.retain(|url, _| present.contains(url.as_str()));
        }

        let mut total: i64 = 0;
        let mut best: Option<usize> = None;
        let mut best_weight = i64::MIN;

        for (i, backend) in backends.iter().enumerate() {
            let weight = i64::from(backend.weight());
            total += weight;

            let running = current.entry(backend.url().to_string()).or_insert(0);
            *running += weight;
            if *running > best_weight {
                best_weight = *running;
                best = Some(i);
            }
        }

        let chosen = &backends[best?];
        if let Some(running) = current.get_mut(chosen.url().as_str()) {
            *running -= total;
        }
        Some(Arc::clone(chosen))
    }
}
