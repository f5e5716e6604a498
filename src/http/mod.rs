//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, reserved endpoints, middleware)
//!     → request.rs (request ID minting and propagation)
//!     → proxy.rs (route → policy → pick → forward → record)
//!     → Response streamed to client
//! ```

pub mod proxy;
pub mod request;
pub mod server;

pub use proxy::{ProxyState, UpstreamClient};
pub use request::{MakeRequestUuid, X_REQUEST_ID};
pub use server::HttpServer;
