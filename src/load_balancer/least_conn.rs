//! Least Connections load balancing strategy.

use std::sync::Arc;

use crate::load_balancer::{Algorithm, Backend};

/// Least connections selector.
/// Selects the backend with the minimum number of in-flight requests.
#[derive(Debug, Default)]
pub struct LeastConnections;

impl LeastConnections {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Algorithm for LeastConnections {
    fn pick(&self, backends: &[Arc<Backend>]) -> Option<Arc<Backend>> {
        // In case of a tie, the first one is selected (determinism).
        backends
            .iter()
            .min_by_key(|b| b.active_conns())
            .cloned()
    }
}
