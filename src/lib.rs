//! Layer-7 HTTP reverse proxy and load balancer.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌─────────────────────────────────────────────────┐
//!                        │                   DRAWBRIDGE                    │
//!                        │                                                 │
//!   Client Request       │  ┌─────────┐   ┌──────────┐   ┌──────────────┐ │
//!   ─────────────────────┼─▶│  http   │──▶│ routing  │──▶│ policy chain │ │
//!                        │  │ server  │   │  engine  │   │ (limit/acl/  │ │
//!                        │  └─────────┘   └──────────┘   │  transform)  │ │
//!                        │                               └──────┬───────┘ │
//!                        │                                      ▼         │
//!                        │                              ┌──────────────┐  │
//!                        │                              │load_balancer │  │
//!                        │                              │ pool + algo  │  │
//!                        │                              └──────┬───────┘  │
//!                        │                                     │          │
//!   Client Response      │  ┌─────────┐   ┌──────────┐  ┌──────▼──────┐   │
//!   ◀────────────────────┼──│response │◀──│ upstream │◀─│   backend   │◀──┼── Backend
//!                        │  │ stream  │   │  client  │  │ connection  │   │    Server
//!                        │  └─────────┘   └──────────┘  └─────────────┘   │
//!                        │                                                │
//!                        │  ┌──────────────────────────────────────────┐  │
//!                        │  │          Cross-Cutting Concerns          │  │
//!                        │  │  ┌────────┐ ┌─────────┐ ┌─────────────┐  │  │
//!                        │  │  │ config │ │ health  │ │observability│  │  │
//!                        │  │  └────────┘ │ checks  │ └─────────────┘  │  │
//!                        │  │  ┌────────┐ └─────────┘ ┌─────────────┐  │  │
//!                        │  │  │ admin  │ ┌─────────┐ │  lifecycle  │  │  │
//!                        │  │  └────────┘ │ circuit │ └─────────────┘  │  │
//!                        │  │             │ breaker │                  │  │
//!                        │  │             └─────────┘                  │  │
//!                        │  └──────────────────────────────────────────┘  │
//!                        └─────────────────────────────────────────────────┘
//! ```

// Core subsystems
pub mod config;
pub mod http;
pub mod policy;
pub mod routing;

// Traffic management
pub mod health;
pub mod load_balancer;
pub mod resilience;

// Cross-cutting concerns
pub mod admin;
pub mod lifecycle;
pub mod observability;

pub use config::schema::Config;
pub use http::HttpServer;
pub use lifecycle::{App, Shutdown};
