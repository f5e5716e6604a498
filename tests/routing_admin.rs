//! Rule ordering, reserved endpoints, and the admin read/write contract.

mod common;

use std::net::SocketAddr;

use drawbridge::config::schema::AlgorithmKind;
use serde_json::Value;

#[tokio::test]
async fn first_matching_rule_wins_and_no_match_is_404() {
    let a: SocketAddr = "127.0.0.1:29401".parse().unwrap();
    let b: SocketAddr = "127.0.0.1:29402".parse().unwrap();
    let proxy: SocketAddr = "127.0.0.1:29403".parse().unwrap();

    common::start_mock_backend(a, "pool-a").await;
    common::start_mock_backend(b, "pool-b").await;

    let mut config = common::base_config(proxy);
    config
        .backend_pools
        .push(common::pool("a", AlgorithmKind::RoundRobin, &[(a, 1)]));
    config
        .backend_pools
        .push(common::pool("b", AlgorithmKind::RoundRobin, &[(b, 1)]));
    // The generic rule is declared first; the more specific one after it
    // must never fire.
    config.routing_rules.push(common::rule("/api/*", "a"));
    config.routing_rules.push(common::rule("/api/users", "b"));
    let shutdown = common::start_proxy(config).await;

    let client = common::client();

    let body = client
        .get(format!("http://{proxy}/api/users"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "pool-a");

    let status = client
        .get(format!("http://{proxy}/elsewhere"))
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status.as_u16(), 404);

    shutdown.trigger();
}

#[tokio::test]
async fn reserved_endpoints_bypass_routing() {
    let proxy: SocketAddr = "127.0.0.1:29411".parse().unwrap();
    let backend: SocketAddr = "127.0.0.1:29412".parse().unwrap();

    common::start_mock_backend(backend, "app").await;

    let mut config = common::base_config(proxy);
    config
        .backend_pools
        .push(common::pool("web", AlgorithmKind::RoundRobin, &[(backend, 1)]));
    // No rule covers /health; it must answer regardless.
    config.routing_rules.push(common::rule("/app/*", "web"));
    let shutdown = common::start_proxy(config).await;

    let client = common::client();

    let health = client
        .get(format!("http://{proxy}/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(health.status().as_u16(), 200);
    assert_eq!(health.text().await.unwrap(), "OK");

    let status: Value = client
        .get(format!("http://{proxy}/_lb_status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["status"], "operational");
    assert_eq!(status["pools"], 1);

    shutdown.trigger();
}

#[tokio::test]
async fn admin_reads_pools_and_overrides_liveness() {
    let backend: SocketAddr = "127.0.0.1:29421".parse().unwrap();
    let proxy: SocketAddr = "127.0.0.1:29422".parse().unwrap();
    let admin: SocketAddr = "127.0.0.1:29423".parse().unwrap();

    common::start_mock_backend(backend, "app").await;

    let mut config = common::base_config(proxy);
    config.server.admin_enable = true;
    config.server.admin_address = admin.to_string();
    config
        .backend_pools
        .push(common::pool("web", AlgorithmKind::RoundRobin, &[(backend, 1)]));
    config.routing_rules.push(common::rule("/*", "web"));
    let shutdown = common::start_proxy(config).await;

    let client = common::client();
    let data_url = format!("http://{proxy}/");
    let admin_base = format!("http://{admin}/admin");

    let status: Value = client
        .get(format!("{admin_base}/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["pools"], 1);

    let pools: Value = client
        .get(format!("{admin_base}/backends"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(pools[0]["name"], "web");
    assert_eq!(pools[0]["backends"][0]["liveness"], "unknown");
    assert_eq!(pools[0]["backends"][0]["weight"], 1);

    // Mark the only backend down: the data plane must 503.
    let mark_down = client
        .post(format!("{admin_base}/backends"))
        .json(&serde_json::json!({
            "pool": "web",
            "url": format!("http://{backend}"),
            "healthy": false,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(mark_down.status().as_u16(), 200);
    assert_eq!(
        client.get(&data_url).send().await.unwrap().status().as_u16(),
        503
    );

    // And back up.
    client
        .post(format!("{admin_base}/backends"))
        .json(&serde_json::json!({
            "pool": "web",
            "url": format!("http://{backend}"),
            "healthy": true,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(
        client.get(&data_url).send().await.unwrap().status().as_u16(),
        200
    );

    // The exposition endpoint renders.
    let metrics = client
        .get(format!("{admin_base}/metrics"))
        .send()
        .await
        .unwrap();
    assert_eq!(metrics.status().as_u16(), 200);

    shutdown.trigger();
}

#[tokio::test]
async fn admin_upserts_and_removes_backends() {
    let original: SocketAddr = "127.0.0.1:29431".parse().unwrap();
    let extra: SocketAddr = "127.0.0.1:29432".parse().unwrap();
    let proxy: SocketAddr = "127.0.0.1:29433".parse().unwrap();
    let admin: SocketAddr = "127.0.0.1:29434".parse().unwrap();

    common::start_mock_backend(original, "original").await;
    common::start_mock_backend(extra, "extra").await;

    let mut config = common::base_config(proxy);
    config.server.admin_enable = true;
    config.server.admin_address = admin.to_string();
    config
        .backend_pools
        .push(common::pool("web", AlgorithmKind::RoundRobin, &[(original, 1)]));
    config.routing_rules.push(common::rule("/*", "web"));
    let shutdown = common::start_proxy(config).await;

    let client = common::client();
    let admin_base = format!("http://{admin}/admin");

    // Unknown URL: added to the pool, then marked healthy.
    let added = client
        .post(format!("{admin_base}/backends"))
        .json(&serde_json::json!({
            "pool": "web",
            "url": format!("http://{extra}"),
            "healthy": true,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(added.status().as_u16(), 201);

    let mut bodies = Vec::new();
    for _ in 0..6 {
        bodies.push(
            client
                .get(format!("http://{proxy}/"))
                .send()
                .await
                .unwrap()
                .text()
                .await
                .unwrap(),
        );
    }
    assert!(bodies.iter().any(|b| b == "extra"), "new backend takes traffic");

    // Remove it again.
    let removed = client
        .delete(format!(
            "{admin_base}/backends?pool=web&url=http://{extra}"
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(removed.status().as_u16(), 204);

    for _ in 0..4 {
        let body = client
            .get(format!("http://{proxy}/"))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, "original");
    }

    // Unknown pool is a 404.
    let missing = client
        .post(format!("{admin_base}/backends"))
        .json(&serde_json::json!({"pool": "nope", "url": "http://127.0.0.1:1", "healthy": true}))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status().as_u16(), 404);

    shutdown.trigger();
}

#[tokio::test]
async fn admin_auth_requires_the_bearer_token() {
    let backend: SocketAddr = "127.0.0.1:29441".parse().unwrap();
    let proxy: SocketAddr = "127.0.0.1:29442".parse().unwrap();
    let admin: SocketAddr = "127.0.0.1:29443".parse().unwrap();

    common::start_mock_backend(backend, "app").await;

    let mut config = common::base_config(proxy);
    config.server.admin_enable = true;
    config.server.admin_address = admin.to_string();
    config.server.admin_api_key = "sekrit".to_string();
    config
        .backend_pools
        .push(common::pool("web", AlgorithmKind::RoundRobin, &[(backend, 1)]));
    config.routing_rules.push(common::rule("/*", "web"));
    let shutdown = common::start_proxy(config).await;

    let client = common::client();
    let url = format!("http://{admin}/admin/status");

    assert_eq!(client.get(&url).send().await.unwrap().status().as_u16(), 401);
    assert_eq!(
        client
            .get(&url)
            .header("authorization", "Bearer wrong")
            .send()
            .await
            .unwrap()
            .status()
            .as_u16(),
        401
    );
    assert_eq!(
        client
            .get(&url)
            .header("authorization", "Bearer sekrit")
            .send()
            .await
            .unwrap()
            .status()
            .as_u16(),
        200
    );

    shutdown.trigger();
}
