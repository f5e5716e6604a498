//! Application assembly and run loop.
//!
//! # Responsibilities
//! - Build every subsystem from validated configuration
//! - Bind the data-plane and admin listeners
//! - Spawn the background tasks (health probes, rate-limit sweeper,
//!   metrics listener, signal watcher)
//! - Drain in-flight requests within the grace window on shutdown
//!
//! Ordered startup: config first, then core state, then listeners.
//! Ordered shutdown: stop accepting, drain, abandon past the grace window.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::admin::{admin_router, run_admin, AdminState};
use crate::config::Config;
use crate::health::HealthChecker;
use crate::http::{HttpServer, ProxyState, UpstreamClient};
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals;
use crate::load_balancer::PoolRegistry;
use crate::observability::{logging, metrics};
use crate::policy::rate_limit::RateLimit;
use crate::routing::Router;

/// Errors that abort startup or end the run loop.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid backend url: {0}")]
    Backend(#[from] url::ParseError),

    #[error("routing table: {0}")]
    Routing(String),

    #[error("invalid listen address '{address}': {reason}")]
    Listen { address: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The assembled load balancer, ready to run.
pub struct App {
    config: Config,
    registry: Arc<PoolRegistry>,
    router: Arc<Router>,
    limiters: Vec<Arc<RateLimit>>,
    client: UpstreamClient,
    prometheus: metrics_exporter_prometheus::PrometheusHandle,
}

impl App {
    /// Construct all subsystems from a validated config.
    pub fn build(config: Config) -> Result<Self, StartupError> {
        let registry = Arc::new(PoolRegistry::from_config(&config.backend_pools)?);
        let (router, limiters) =
            Router::from_config(&config.routing_rules, &registry).map_err(StartupError::Routing)?;

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(config.server.idle_timeout))
            .build(HttpConnector::new());

        let prometheus = metrics::install_recorder();
        logging::announce_tracing(&config.monitoring.tracing);

        tracing::info!(
            pools = registry.len(),
            rules = router.len(),
            address = %config.server.address,
            "Configuration applied"
        );

        Ok(Self {
            config,
            registry,
            router: Arc::new(router),
            limiters,
            client,
            prometheus,
        })
    }

    /// Serve until a fatal error or the shutdown signal, then drain.
    pub async fn run(self, shutdown: Shutdown) -> Result<(), StartupError> {
        let server = self.config.server.clone();
        let proto: &'static str = if server.tls_cert.is_some() { "https" } else { "http" };

        let state = ProxyState {
            router: Arc::clone(&self.router),
            registry: Arc::clone(&self.registry),
            client: self.client.clone(),
            upstream_timeout: Duration::from_secs(server.upstream_timeout),
            admission_retries: server.admission_retries,
            proto,
        };

        // Background tasks, all ending on the shutdown broadcast.
        let checker = HealthChecker::new(Arc::clone(&self.registry), self.client.clone());
        let probe_handles = checker.spawn(shutdown.sender());
        spawn_rate_limit_sweeper(self.limiters.clone(), shutdown.subscribe());

        if self.config.monitoring.prometheus.enabled {
            let prometheus = self.config.monitoring.prometheus.clone();
            let addr = SocketAddr::from(([0, 0, 0, 0], prometheus.port));
            let handle = self.prometheus.clone();
            let rx = shutdown.subscribe();
            tokio::spawn(async move {
                if let Err(error) =
                    metrics::serve_exposition(addr, prometheus.path, handle, rx).await
                {
                    tracing::error!(error = %error, "Metrics listener failed");
                }
            });
        }

        let admin_handle = if server.admin_enable {
            let listener = bind(&server.admin_address).await?;
            let router = admin_router(
                AdminState {
                    registry: Arc::clone(&self.registry),
                    prometheus: self.prometheus.clone(),
                    api_key: server.admin_api_key.clone(),
                },
                &server.admin_path,
            );
            Some(tokio::spawn(run_admin(
                router,
                listener,
                shutdown.subscribe(),
            )))
        } else {
            None
        };

        // Signals feed the same ambient shutdown channel.
        let trigger = shutdown.sender().clone();
        tokio::spawn(async move {
            signals::shutdown_signal().await;
            let _ = trigger.send(());
        });

        let listener = bind(&server.address).await?;
        let http = HttpServer::new(state, &server);
        let mut data_plane = tokio::spawn(http.run(listener, shutdown.subscribe()));

        let mut rx = shutdown.subscribe();
        tokio::select! {
            result = &mut data_plane => {
                // The server ended without a shutdown signal: fatal.
                drain_admin(admin_handle).await;
                return match result {
                    Ok(serve_result) => serve_result.map_err(StartupError::Io),
                    Err(join_error) => Err(StartupError::Io(std::io::Error::other(join_error))),
                };
            }
            _ = rx.recv() => {
                let grace = Duration::from_secs(server.shutdown_grace);
                tracing::info!(grace_secs = server.shutdown_grace, "Draining in-flight requests");
                match tokio::time::timeout(grace, &mut data_plane).await {
                    Ok(_) => tracing::info!("In-flight requests drained"),
                    Err(_) => {
                        data_plane.abort();
                        tracing::warn!("Grace window expired; abandoning outstanding requests");
                    }
                }
            }
        }

        drain_admin(admin_handle).await;
        let _ = tokio::time::timeout(
            Duration::from_secs(5),
            futures_util::future::join_all(probe_handles),
        )
        .await;

        tracing::info!("Shutdown complete");
        Ok(())
    }
}

async fn bind(address: &str) -> Result<TcpListener, StartupError> {
    let addr: SocketAddr = address.parse().map_err(|e| StartupError::Listen {
        address: address.to_string(),
        reason: format!("{e}"),
    })?;
    Ok(TcpListener::bind(addr).await?)
}

async fn drain_admin(handle: Option<JoinHandle<Result<(), std::io::Error>>>) {
    if let Some(handle) = handle {
        if tokio::time::timeout(Duration::from_secs(5), handle).await.is_err() {
            tracing::warn!("Admin server did not stop within its drain window");
        }
    }
}

/// Periodically evict idle rate-limit buckets across every limiter.
fn spawn_rate_limit_sweeper(limiters: Vec<Arc<RateLimit>>, mut shutdown: broadcast::Receiver<()>) {
    if limiters.is_empty() {
        return;
    }

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    for limiter in &limiters {
                        limiter.sweep();
                    }
                    tracing::debug!(
                        limiters = limiters.len(),
                        tracked = limiters.iter().map(|l| l.tracked_keys()).sum::<usize>(),
                        "Rate-limit sweep completed"
                    );
                }
                _ = shutdown.recv() => break,
            }
        }
    });
}
