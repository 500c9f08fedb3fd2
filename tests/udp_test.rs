//! End-to-end tests of the UDP data plane over loopback.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;
use udp_proxy::runtime::Status;

mod common;

use common::{guess_who, guess_who_from, start_whoami, Proxy, DROP_TIMEOUT, REPLY_TIMEOUT};

fn weighted_config(a: SocketAddr, b: SocketAddr, c: SocketAddr) -> String {
    format!(
        r#"
        [entry_points.udp]
        address = "127.0.0.1:0"

        [udp.routers.to-whoami]
        entryPoints = ["udp"]
        service = "whoami"

        [udp.services.whoami.weighted]
        services = [
            {{ name = "whoami-a", weight = 3 }},
            {{ name = "whoami-b", weight = 2 }},
            {{ name = "whoami-c", weight = 3 }},
        ]

        [udp.services.whoami-a.loadBalancer]
        servers = [{{ address = "{a}" }}]

        [udp.services.whoami-b.loadBalancer]
        servers = [{{ address = "{b}" }}]

        [udp.services.whoami-c.loadBalancer]
        servers = [{{ address = "{c}" }}]
        "#
    )
}

fn allow_list_config(idle_timeout_ms: u64, source_range: &str, backend: SocketAddr) -> String {
    format!(
        r#"
        [entry_points.udp]
        address = "127.0.0.1:0"
        idle_timeout_ms = {idle_timeout_ms}

        [udp.routers.gated]
        entryPoints = ["udp"]
        middlewares = ["allow"]
        service = "whoami"

        [udp.middlewares.allow.ipAllowList]
        sourceRange = ["{source_range}"]

        [udp.services.whoami.loadBalancer]
        servers = [{{ address = "{backend}" }}]
        "#
    )
}

fn single_backend_config(backend: SocketAddr) -> String {
    format!(
        r#"
        [entry_points.udp]
        address = "127.0.0.1:0"

        [udp.routers.to-whoami]
        entryPoints = ["udp"]
        service = "whoami"

        [udp.services.whoami.loadBalancer]
        servers = [{{ address = "{backend}" }}]
        "#
    )
}

#[tokio::test]
async fn weighted_round_robin_spreads_new_flows() {
    let a = start_whoami("whoami-a").await;
    let b = start_whoami("whoami-b").await;
    let c = start_whoami("whoami-c").await;
    let proxy = Proxy::start(&weighted_config(a, b, c)).await;
    let addr = proxy.addr("udp");

    let mut calls: HashMap<&str, usize> = HashMap::new();
    for _ in 0..8 {
        let out = guess_who(addr, REPLY_TIMEOUT).await.unwrap();
        let who = ["whoami-a", "whoami-b", "whoami-c"]
            .into_iter()
            .find(|name| out.contains(name))
            .unwrap_or("unknown");
        *calls.entry(who).or_default() += 1;
    }

    let expected: HashMap<&str, usize> =
        [("whoami-a", 3), ("whoami-b", 2), ("whoami-c", 3)].into_iter().collect();
    assert_eq!(calls, expected);

    proxy.stop().await;
}

#[tokio::test]
async fn allow_list_drops_clients_outside_the_ranges() {
    let a = start_whoami("whoami-a").await;
    let b = start_whoami("whoami-b").await;

    let config = format!(
        r#"
        [entry_points.udp-blocked]
        address = "127.0.0.1:0"

        [entry_points.udp-allowed]
        address = "127.0.0.1:0"

        [udp.routers.blocked]
        entryPoints = ["udp-blocked"]
        middlewares = ["private-only"]
        service = "whoami-a"

        [udp.routers.allowed]
        entryPoints = ["udp-allowed"]
        middlewares = ["loopback-only"]
        service = "whoami-b"

        [udp.middlewares.private-only.ipAllowList]
        sourceRange = ["10.0.0.0/8"]

        [udp.middlewares.loopback-only.ipAllowList]
        sourceRange = ["127.0.0.1"]

        [udp.services.whoami-a.loadBalancer]
        servers = [{{ address = "{a}" }}]

        [udp.services.whoami-b.loadBalancer]
        servers = [{{ address = "{b}" }}]
        "#
    );
    let proxy = Proxy::start(&config).await;

    let err = guess_who(proxy.addr("udp-blocked"), DROP_TIMEOUT)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::TimedOut);

    let out = guess_who(proxy.addr("udp-allowed"), REPLY_TIMEOUT).await.unwrap();
    assert!(out.contains("whoami-b"), "{out}");

    proxy.stop().await;
}

#[tokio::test]
async fn empty_allow_list_admits_nobody() {
    let backend = start_whoami("whoami-a").await;
    let config = allow_list_config(3_000, "127.0.0.1", backend).replace(r#"["127.0.0.1"]"#, "[]");
    let proxy = Proxy::start(&config).await;

    assert!(guess_who(proxy.addr("udp"), DROP_TIMEOUT).await.is_err());
    assert_eq!(
        proxy.handle.runtime().middlewares["allow@file"].state.status,
        Status::Warning
    );

    proxy.stop().await;
}

#[tokio::test]
async fn flow_keeps_its_backend_across_reload() {
    let a = start_whoami("whoami-a").await;
    let b = start_whoami("whoami-b").await;
    let proxy = Proxy::start(&single_backend_config(a)).await;
    let addr = proxy.addr("udp");

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let out = guess_who_from(&client, addr, REPLY_TIMEOUT).await.unwrap();
    assert!(out.contains("whoami-a"));

    proxy.reload(&single_backend_config(b));

    // Same client, live flow: still the old backend.
    let out = guess_who_from(&client, addr, REPLY_TIMEOUT).await.unwrap();
    assert!(out.contains("whoami-a"), "{out}");

    // New flow: the new configuration.
    let out = guess_who(addr, REPLY_TIMEOUT).await.unwrap();
    assert!(out.contains("whoami-b"), "{out}");

    proxy.stop().await;
}

#[tokio::test]
async fn expired_flow_reruns_the_middleware_chain() {
    let backend = start_whoami("whoami-a").await;
    let proxy = Proxy::start(&allow_list_config(100, "127.0.0.0/8", backend)).await;
    let addr = proxy.addr("udp");

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    assert!(guess_who_from(&client, addr, REPLY_TIMEOUT).await.is_ok());

    proxy.reload(&allow_list_config(100, "10.0.0.0/8", backend));

    // The allow list is not re-evaluated on a live flow.
    assert!(guess_who_from(&client, addr, REPLY_TIMEOUT).await.is_ok());

    // Once idle past the timeout, the next datagram starts a new flow that
    // the new allow list blocks.
    tokio::time::sleep(Duration::from_millis(400)).await;
    let err = guess_who_from(&client, addr, DROP_TIMEOUT).await.unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::TimedOut);

    proxy.stop().await;
}

#[tokio::test]
async fn broken_router_does_not_affect_other_entry_points() {
    let backend = start_whoami("whoami-a").await;
    let config = format!(
        r#"
        [entry_points.broken]
        address = "127.0.0.1:0"

        [entry_points.working]
        address = "127.0.0.1:0"

        [udp.routers.no-service]
        entryPoints = ["broken"]

        [udp.routers.ok]
        entryPoints = ["working"]
        service = "whoami"

        [udp.services.whoami.loadBalancer]
        servers = [{{ address = "{backend}" }}]
        "#
    );
    let proxy = Proxy::start(&config).await;

    let runtime = proxy.handle.runtime();
    assert_eq!(runtime.routers["no-service@file"].state.status, Status::Error);
    assert_eq!(runtime.routers["ok@file"].state.status, Status::Enabled);

    assert!(guess_who(proxy.addr("broken"), DROP_TIMEOUT).await.is_err());
    assert!(guess_who(proxy.addr("working"), REPLY_TIMEOUT).await.is_ok());

    proxy.stop().await;
}

#[tokio::test]
async fn config_updates_flow_through_the_server_loop() {
    let a = start_whoami("whoami-a").await;
    let b = start_whoami("whoami-b").await;
    let proxy = Proxy::start(&single_backend_config(a)).await;

    let mut next = proxy.config.clone();
    next.udp = udp_proxy::config::loader::parse_config(&single_backend_config(b), "toml")
        .unwrap()
        .udp;
    proxy.updates.send(next).unwrap();

    let addr = proxy.addr("udp");
    let mut switched = false;
    for _ in 0..20 {
        if guess_who(addr, REPLY_TIMEOUT).await.unwrap().contains("whoami-b") {
            switched = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(switched);

    proxy.stop().await;
}
