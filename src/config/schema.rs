//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the load balancer.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct Config {
    /// Listener, admin surface, and timeout settings.
    pub server: ServerConfig,

    /// Named backend pools.
    pub backend_pools: Vec<BackendPoolConfig>,

    /// Ordered routing rules. First match wins.
    pub routing_rules: Vec<RoutingRuleConfig>,

    /// Metrics, tracing, and logging settings.
    pub monitoring: MonitoringConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address for the data plane (e.g., "0.0.0.0:8080").
    pub address: String,

    /// Path to a TLS certificate (PEM). Must be set together with `tls_key`.
    pub tls_cert: Option<String>,

    /// Path to a TLS private key (PEM).
    pub tls_key: Option<String>,

    /// Enable the admin listener.
    pub admin_enable: bool,

    /// Mount prefix for admin routes.
    pub admin_path: String,

    /// Bind address for the admin listener.
    pub admin_address: String,

    /// Bearer token required by the admin API. Empty disables auth.
    #[serde(default)]
    pub admin_api_key: String,

    /// Read timeout in seconds.
    pub read_timeout: u64,

    /// Write timeout in seconds. Bounds total handler time per request.
    pub write_timeout: u64,

    /// Idle timeout in seconds. Drives the upstream connection pool.
    pub idle_timeout: u64,

    /// Per-request upstream dispatch deadline in seconds.
    pub upstream_timeout: u64,

    /// How many times backend selection is retried when admission fails.
    pub admission_retries: u32,

    /// Grace window in seconds for draining in-flight requests on shutdown.
    pub shutdown_grace: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0:8080".to_string(),
            tls_cert: None,
            tls_key: None,
            admin_enable: false,
            admin_path: "/admin".to_string(),
            admin_address: "127.0.0.1:9901".to_string(),
            admin_api_key: String::new(),
            read_timeout: 30,
            write_timeout: 30,
            idle_timeout: 60,
            upstream_timeout: 30,
            admission_retries: 3,
            shutdown_grace: 30,
        }
    }
}

/// A named group of backends with one selection algorithm.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendPoolConfig {
    /// Pool name, unique across the registry.
    pub name: String,

    /// Selection algorithm for this pool.
    #[serde(default)]
    pub algorithm: AlgorithmKind,

    /// Backend servers in this pool.
    pub backends: Vec<BackendConfig>,

    /// Health check settings for this pool.
    #[serde(default)]
    pub health_check: HealthCheckConfig,
}

/// Load balancing algorithm selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AlgorithmKind {
    #[default]
    RoundRobin,
    Weighted,
    LeastConn,
}

/// Backend server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Display name for logging/metrics. Defaults to the URL host:port.
    #[serde(default)]
    pub name: Option<String>,

    /// Absolute origin (scheme://host:port).
    pub url: String,

    /// Selection weight for weighted round-robin (default: 1).
    #[serde(default = "default_weight")]
    pub weight: u32,

    /// Soft cap on concurrent in-flight requests to this backend.
    #[serde(default = "default_max_conns")]
    pub max_conns: usize,
}

fn default_weight() -> u32 {
    1
}

fn default_max_conns() -> usize {
    1024
}

/// Health check configuration, per pool.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Path probed for HTTP health checks.
    pub path: String,

    /// HTTP method used by the probe.
    pub method: String,

    /// Probe interval in seconds. Fractions are honored, so sub-second
    /// cadences are expressible.
    pub interval: f64,

    /// Per-probe timeout in seconds.
    pub timeout: f64,

    /// Probe variant.
    pub probe: ProbeKind,

    /// Whether a backend that has never been probed serves traffic.
    pub serve_unknown: bool,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            path: "/health".to_string(),
            method: "GET".to_string(),
            interval: 10.0,
            timeout: 5.0,
            probe: ProbeKind::Http,
            serve_unknown: true,
        }
    }
}

impl HealthCheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(self.interval.max(0.001))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout.max(0.001))
    }
}

/// Health probe variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProbeKind {
    #[default]
    Http,
    Tcp,
}

/// A routing rule: match criteria, target pool, and scoped policies.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RoutingRuleConfig {
    /// Match criteria, combined with AND semantics.
    #[serde(rename = "match", default)]
    pub matches: MatchConfig,

    /// Pool that receives matched requests.
    pub target_pool: String,

    /// Policies applied to matched requests, in order.
    #[serde(default)]
    pub policies: Vec<PolicyConfig>,
}

/// Request match criteria. Empty criteria always match.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct MatchConfig {
    /// Host glob (`*` is a wildcard).
    pub host: Option<String>,

    /// Path glob.
    pub path: Option<String>,

    /// Exact HTTP method.
    pub method: Option<String>,

    /// Header name to value-regex map. All listed headers must match.
    pub headers: BTreeMap<String, String>,
}

/// One policy instance. Exactly one variant should be set per entry;
/// when several are set they apply in field order.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct PolicyConfig {
    pub rate_limit: Option<RateLimitConfig>,
    pub acl: Option<AclConfig>,
    pub transform: Option<TransformConfig>,
}

/// Token bucket rate limit: `rate` tokens replenished every `per` seconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Bucket capacity and refill amount.
    pub rate: u32,

    /// Refill period in seconds.
    pub per: u64,
}

impl RateLimitConfig {
    pub fn per(&self) -> Duration {
        Duration::from_secs(self.per)
    }
}

/// Access control lists. Deny entries are checked first.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AclConfig {
    /// CIDRs or exact hosts that are permitted. Empty permits everyone
    /// not denied.
    pub allow: Vec<String>,

    /// CIDRs or exact hosts that are rejected.
    pub deny: Vec<String>,
}

/// Request mutations. All idempotent.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TransformConfig {
    /// Headers appended unless the exact value is already present.
    pub add_headers: BTreeMap<String, String>,

    /// Headers overwritten unconditionally.
    pub set_headers: BTreeMap<String, String>,

    /// Headers removed.
    pub remove_headers: Vec<String>,

    /// Literal path substring replacement, first occurrence.
    pub rewrite_path: Option<RewritePathConfig>,

    /// Query parameters appended unless already present.
    pub add_query: BTreeMap<String, String>,
}

/// Literal substring rewrite for the request path.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RewritePathConfig {
    pub from: String,
    pub to: String,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct MonitoringConfig {
    pub prometheus: PrometheusConfig,
    pub tracing: TracingConfig,
    pub logging: LoggingConfig,
}

/// Prometheus exposition settings for the standalone scrape listener.
/// The admin surface serves the same exposition regardless.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PrometheusConfig {
    pub enabled: bool,
    pub path: String,
    pub port: u16,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: "/metrics".to_string(),
            port: 9090,
        }
    }
}

/// Distributed tracing export settings. Validated and surfaced at startup;
/// exporter wiring is delegated to the deployment.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TracingConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub sampling_rate: f64,
    pub protocol: TracingProtocol,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: "localhost:4317".to_string(),
            sampling_rate: 1.0,
            protocol: TracingProtocol::Grpc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TracingProtocol {
    #[default]
    Grpc,
    Http,
}

/// Log emission settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,

    /// Output encoding.
    pub format: LogFormat,

    /// Output stream.
    pub output: LogOutput,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
            output: LogOutput::Stdout,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Json,
    Console,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
}
