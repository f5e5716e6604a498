//! Health probe variants.

use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use tokio::net::TcpStream;
use url::Url;

use crate::config::schema::{HealthCheckConfig, ProbeKind};

/// A single backend probe. HTTP probes issue the configured method against
/// `url + path` and treat any status in [200, 400) as success; TCP probes
/// succeed when the connection establishes within the timeout.
#[derive(Clone)]
pub enum Probe {
    Http {
        client: Client<HttpConnector, Body>,
        method: Method,
        path: String,
    },
    Tcp,
}

impl Probe {
    pub fn from_config(config: &HealthCheckConfig, client: Client<HttpConnector, Body>) -> Self {
        match config.probe {
            ProbeKind::Http => Probe::Http {
                client,
                method: config
                    .method
                    .to_ascii_uppercase()
                    .parse()
                    .unwrap_or(Method::GET),
                path: config.path.clone(),
            },
            ProbeKind::Tcp => Probe::Tcp,
        }
    }

    /// Run one probe against `target` with the given deadline.
    pub async fn check(&self, target: &Url, timeout: Duration) -> bool {
        match self {
            Probe::Http {
                client,
                method,
                path,
            } => {
                let uri = format!(
                    "{}{}",
                    target.as_str().trim_end_matches('/'),
                    path.as_str()
                );
                let Ok(request) = Request::builder()
                    .method(method.clone())
                    .uri(&uri)
                    .body(Body::empty())
                else {
                    return false;
                };

                match tokio::time::timeout(timeout, client.request(request)).await {
                    Ok(Ok(response)) => {
                        let status = response.status().as_u16();
                        (200..400).contains(&status)
                    }
                    Ok(Err(_)) | Err(_) => false,
                }
            }
            Probe::Tcp => {
                let Some(host) = target.host_str() else {
                    return false;
                };
                let Some(port) = target.port_or_known_default() else {
                    return false;
                };
                matches!(
                    tokio::time::timeout(timeout, TcpStream::connect((host, port))).await,
                    Ok(Ok(_))
                )
            }
        }
    }
}
