//! Request routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request
//!     → matcher.rs (host/path/method/header criteria per rule)
//!     → router.rs (linear scan, declaration order, first match wins)
//!     → (pool, policy chain) or NoRoute (404)
//! ```

pub mod matcher;
pub mod router;

pub use router::{Route, Router, HEALTH_PATH, STATUS_PATH};
