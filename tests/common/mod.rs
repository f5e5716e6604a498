//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use drawbridge::config::schema::{
    AlgorithmKind, BackendConfig, BackendPoolConfig, HealthCheckConfig, MatchConfig, PolicyConfig,
    RoutingRuleConfig,
};
use drawbridge::{App, Config, Shutdown};

/// Start a simple mock backend that returns a fixed 200 response.
pub async fn start_mock_backend(addr: SocketAddr, response: &'static str) {
    start_programmable_backend(addr, move || async move { (200, response.to_string()) }).await;
}

/// Start a programmable mock backend whose closure decides each response.
pub async fn start_programmable_backend<F, Fut>(addr: SocketAddr, f: F)
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await.unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let mut buf = [0u8; 4096];
                        let _ = socket.read(&mut buf).await;

                        let (status, body) = f().await;
                        let status_text = match status {
                            200 => "200 OK",
                            404 => "404 Not Found",
                            429 => "429 Too Many Requests",
                            500 => "500 Internal Server Error",
                            502 => "502 Bad Gateway",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };

                        let response_str = format!(
                            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });
}

/// Start a backend that echoes the received request head (request line
/// plus headers) back as the response body.
pub async fn start_echo_backend(addr: SocketAddr) {
    let listener = TcpListener::bind(addr).await.unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let mut head = Vec::new();
                        let mut buf = [0u8; 1024];
                        loop {
                            let Ok(n) = socket.read(&mut buf).await else {
                                return;
                            };
                            if n == 0 {
                                break;
                            }
                            head.extend_from_slice(&buf[..n]);
                            if head.windows(4).any(|w| w == b"\r\n\r\n") {
                                break;
                            }
                        }

                        let body = String::from_utf8_lossy(&head).to_string();
                        let response_str = format!(
                            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });
}

/// Minimal config for one proxy under test. Probing is effectively
/// disabled (huge interval); tests that exercise health checks override
/// the pool's cadence.
pub fn base_config(proxy_addr: SocketAddr) -> Config {
    let mut config = Config::default();
    config.server.address = proxy_addr.to_string();
    config.server.upstream_timeout = 5;
    config
}

/// Health-check settings that keep probes out of the way.
pub fn no_probes() -> HealthCheckConfig {
    HealthCheckConfig {
        interval: 3600.0,
        ..Default::default()
    }
}

pub fn pool(
    name: &str,
    algorithm: AlgorithmKind,
    backends: &[(SocketAddr, u32)],
) -> BackendPoolConfig {
    BackendPoolConfig {
        name: name.to_string(),
        algorithm,
        backends: backends
            .iter()
            .map(|(addr, weight)| BackendConfig {
                name: None,
                url: format!("http://{addr}"),
                weight: *weight,
                max_conns: 64,
            })
            .collect(),
        health_check: no_probes(),
    }
}

pub fn rule(path_glob: &str, target_pool: &str) -> RoutingRuleConfig {
    RoutingRuleConfig {
        matches: MatchConfig {
            path: Some(path_glob.to_string()),
            ..Default::default()
        },
        target_pool: target_pool.to_string(),
        policies: Vec::new(),
    }
}

pub fn with_policies(mut rule: RoutingRuleConfig, policies: Vec<PolicyConfig>) -> RoutingRuleConfig {
    rule.policies = policies;
    rule
}

/// Build and run the proxy, returning the shutdown handle. The caller
/// triggers it when done.
pub async fn start_proxy(config: Config) -> Shutdown {
    let shutdown = Shutdown::new();
    let app = App::build(config).expect("app builds from test config");
    let run_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let _ = app.run(run_shutdown).await;
    });

    tokio::time::sleep(Duration::from_millis(300)).await;
    shutdown
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
