//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout/stderr, json or console)
//!     → Prometheus scrape (admin /metrics and the optional
//!       standalone listener)
//! ```
//!
//! # Design Decisions
//! - Metrics are cheap (atomic increments behind the `metrics` facade)
//! - Request ID flows through all subsystems via the tracing span
//! - Sink wiring stays outside; this module only instruments

pub mod logging;
pub mod metrics;
