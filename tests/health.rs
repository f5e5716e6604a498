//! Health probing and circuit breaking end to end.

mod common;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use drawbridge::config::schema::AlgorithmKind;

#[tokio::test]
async fn failing_probes_evict_and_recovery_reinstates() {
    let b1: SocketAddr = "127.0.0.1:29301".parse().unwrap();
    let b2: SocketAddr = "127.0.0.1:29302".parse().unwrap();
    let proxy: SocketAddr = "127.0.0.1:29303".parse().unwrap();

    common::start_mock_backend(b1, "b1").await;

    let b2_healthy = Arc::new(AtomicBool::new(true));
    let flag = b2_healthy.clone();
    common::start_programmable_backend(b2, move || {
        let flag = flag.clone();
        async move {
            if flag.load(Ordering::SeqCst) {
                (200, "b2".to_string())
            } else {
                (500, "dead".to_string())
            }
        }
    })
    .await;

    let mut config = common::base_config(proxy);
    let mut web = common::pool("web", AlgorithmKind::RoundRobin, &[(b1, 1), (b2, 1)]);
    web.health_check.interval = 0.2;
    web.health_check.timeout = 1.0;
    config.backend_pools.push(web);
    config.routing_rules.push(common::rule("/*", "web"));
    let shutdown = common::start_proxy(config).await;

    let client = common::client();
    let url = format!("http://{proxy}/");

    // Warm phase: both backends take traffic.
    let mut bodies = Vec::new();
    for _ in 0..8 {
        bodies.push(client.get(&url).send().await.unwrap().text().await.unwrap());
    }
    assert!(bodies.iter().any(|b| b == "b1"));
    assert!(bodies.iter().any(|b| b == "b2"));

    // Backend starts failing its probe; within a few intervals it leaves
    // the rotation.
    b2_healthy.store(false, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(800)).await;

    for _ in 0..10 {
        let body = client.get(&url).send().await.unwrap().text().await.unwrap();
        assert_eq!(body, "b1", "unhealthy backend must be skipped");
    }

    // Probe success flips it straight back in.
    b2_healthy.store(true, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(800)).await;

    let mut bodies = Vec::new();
    for _ in 0..8 {
        bodies.push(client.get(&url).send().await.unwrap().text().await.unwrap());
    }
    assert!(bodies.iter().any(|b| b == "b2"), "recovered backend rejoins");

    shutdown.trigger();
}

#[tokio::test]
async fn transport_failures_open_the_circuit() {
    // No listener on this port: every dispatch is a connection error.
    let dead: SocketAddr = "127.0.0.1:29311".parse().unwrap();
    let proxy: SocketAddr = "127.0.0.1:29312".parse().unwrap();

    let mut config = common::base_config(proxy);
    config
        .backend_pools
        .push(common::pool("web", AlgorithmKind::RoundRobin, &[(dead, 1)]));
    config.routing_rules.push(common::rule("/*", "web"));
    let shutdown = common::start_proxy(config).await;

    let client = common::client();
    let url = format!("http://{proxy}/");

    // The breaker trips after five consecutive transport failures.
    for _ in 0..5 {
        let status = client.get(&url).send().await.unwrap().status().as_u16();
        assert_eq!(status, 502, "transport errors surface as 502");
    }

    let status = client.get(&url).send().await.unwrap().status().as_u16();
    assert_eq!(status, 503, "open circuit leaves no eligible backend");

    shutdown.trigger();
}

#[tokio::test]
async fn empty_pool_of_unprobed_backends_still_serves() {
    // serve_unknown (default): a freshly started proxy forwards before
    // the first probe completes.
    let backend: SocketAddr = "127.0.0.1:29321".parse().unwrap();
    let proxy: SocketAddr = "127.0.0.1:29322".parse().unwrap();

    common::start_mock_backend(backend, "early").await;

    let mut config = common::base_config(proxy);
    config
        .backend_pools
        .push(common::pool("web", AlgorithmKind::RoundRobin, &[(backend, 1)]));
    config.routing_rules.push(common::rule("/*", "web"));
    let shutdown = common::start_proxy(config).await;

    let client = common::client();
    let response = client.get(format!("http://{proxy}/")).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.text().await.unwrap(), "early");

    shutdown.trigger();
}

#[tokio::test]
async fn unknown_backends_can_be_fenced_off() {
    // serve_unknown=false: nothing is eligible until a probe succeeds.
    let backend: SocketAddr = "127.0.0.1:29331".parse().unwrap();
    let proxy: SocketAddr = "127.0.0.1:29332".parse().unwrap();

    common::start_mock_backend(backend, "late").await;

    let mut config = common::base_config(proxy);
    let mut web = common::pool("web", AlgorithmKind::RoundRobin, &[(backend, 1)]);
    web.health_check.serve_unknown = false;
    web.health_check.interval = 0.2;
    config.backend_pools.push(web);
    config.routing_rules.push(common::rule("/*", "web"));
    let shutdown = common::start_proxy(config).await;

    let client = common::client();
    let url = format!("http://{proxy}/");

    // Wait out the probe; once Healthy, traffic flows.
    tokio::time::sleep(Duration::from_millis(600)).await;
    let response = client.get(&url).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.text().await.unwrap(), "late");

    shutdown.trigger();
}
