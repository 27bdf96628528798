//! End-to-end scenarios driving a [`SessionServer`] through its handle,
//! the same surface the RADIUS ingress adapter and HTTP query router use.

use std::time::Duration;

use session_store_core::actor::{SessionServer, UpdateOutcome};
use session_store_core::config::{IndexAttribute, PeerConfig, StoreConfig};
use session_store_core::ingress;
use session_store_core::packet::{PacketCode, RadiusPacket};
use session_store_core::query;
use session_store_core::wire;

fn base_config() -> StoreConfig {
    StoreConfig {
        id_attributes: vec!["Acct-Session-Id".to_string()],
        index_attributes: vec![IndexAttribute {
            name: "Framed-IP-Address".to_string(),
            unique: false,
        }],
        projected_attributes: vec!["Framed-IP-Address".to_string(), "Acct-Session-Id".to_string()],
        expiration_time: Duration::from_secs(3600),
        limbo_time: Duration::from_secs(120),
        purge_interval: Duration::from_secs(3600),
        receive_from: Vec::new(),
        send_to: Vec::new(),
        replication_timeout: Duration::from_secs(1),
        replication_tries: 1,
        default_origin_ports: vec![0],
        server_name: "test-server".to_string(),
    }
}

fn accept(session_id: &str, framed_ip: &str) -> RadiusPacket {
    RadiusPacket::new(PacketCode::AccessRequest, 1)
        .with_attr("Acct-Session-Id", session_id)
        .with_attr("Framed-IP-Address", framed_ip)
}

fn accounting(
    session_id: &str,
    framed_ip: &str,
    status: &str,
    acct_session_time: i64,
) -> RadiusPacket {
    RadiusPacket::new(PacketCode::AccountingRequest, 1)
        .with_attr("Acct-Session-Id", session_id)
        .with_attr("Framed-IP-Address", framed_ip)
        .with_attr("Acct-Status-Type", status)
        .with_attr("Acct-Session-Time", acct_session_time.to_string())
}

/// Accept -> Start -> Query by index.
#[tokio::test]
async fn accept_then_start_is_queryable_by_index() {
    let handle = SessionServer::spawn(base_config());

    let outcome = handle.update(accept("sess-1", "10.0.0.1")).await.unwrap();
    assert!(matches!(outcome, UpdateOutcome::Accepted));

    let outcome = handle
        .update(accounting("sess-1", "10.0.0.1", "Start", 0))
        .await
        .unwrap();
    assert!(matches!(outcome, UpdateOutcome::Accepted));

    let snapshots = handle
        .query("Framed-IP-Address".to_string(), "10.0.0.1".to_string(), true)
        .await
        .unwrap();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].attr("SessionStore-Id"), Some("sess-1"));

    handle.close().await;
}

/// A later Interim with a greater `Acct-Session-Time` supersedes a Start.
#[tokio::test]
async fn interim_with_greater_session_time_supersedes_start() {
    let handle = SessionServer::spawn(base_config());

    handle.update(accept("sess-2", "10.0.0.2")).await.unwrap();
    handle
        .update(accounting("sess-2", "10.0.0.2", "Start", 0))
        .await
        .unwrap();

    let outcome = handle
        .update(accounting("sess-2", "10.0.0.2", "Interim-Update", 300))
        .await
        .unwrap();
    assert!(matches!(outcome, UpdateOutcome::Accepted));

    let snapshots = handle
        .query("Framed-IP-Address".to_string(), "10.0.0.2".to_string(), true)
        .await
        .unwrap();
    assert_eq!(snapshots.len(), 1);

    // A stale retransmit of the Start (session-time 0) must not regress
    // the now-Interim state.
    let outcome = handle
        .update(accounting("sess-2", "10.0.0.2", "Start", 0))
        .await
        .unwrap();
    assert!(matches!(outcome, UpdateOutcome::Accepted));
    let snapshots = handle
        .query("Framed-IP-Address".to_string(), "10.0.0.2".to_string(), true)
        .await
        .unwrap();
    assert_eq!(
        snapshots.len(),
        1,
        "stale Start retransmit must not have been merged in"
    );

    handle.close().await;
}

/// A Stop moves the session to limbo, and it is purged once its limbo
/// TTL elapses.
#[tokio::test]
async fn stop_expires_out_of_the_store_after_limbo_time() {
    let mut config = base_config();
    config.limbo_time = Duration::from_millis(30);
    config.purge_interval = Duration::from_millis(10);
    let handle = SessionServer::spawn(config);

    handle.update(accept("sess-3", "10.0.0.3")).await.unwrap();
    handle
        .update(accounting("sess-3", "10.0.0.3", "Start", 0))
        .await
        .unwrap();
    let outcome = handle
        .update(accounting("sess-3", "10.0.0.3", "Stop", 10))
        .await
        .unwrap();
    assert!(matches!(outcome, UpdateOutcome::Accepted));

    let snapshots = handle
        .query("Framed-IP-Address".to_string(), "10.0.0.3".to_string(), false)
        .await
        .unwrap();
    assert_eq!(snapshots.len(), 1, "stopped session is visible until it expires");

    tokio::time::sleep(Duration::from_millis(150)).await;

    let snapshots = handle
        .query("Framed-IP-Address".to_string(), "10.0.0.3".to_string(), false)
        .await
        .unwrap();
    assert!(snapshots.is_empty(), "stopped session should have been purged");

    handle.close().await;
}

/// A unique index rejects a second `AcceptPending` for a value already
/// held by a different, still-live session.
#[tokio::test]
async fn unique_index_rejects_conflicting_accept() {
    let mut config = base_config();
    config.index_attributes = vec![IndexAttribute {
        name: "Framed-IP-Address".to_string(),
        unique: true,
    }];
    let handle = SessionServer::spawn(config);

    let outcome = handle.update(accept("sess-4a", "10.0.0.4")).await.unwrap();
    assert!(matches!(outcome, UpdateOutcome::Accepted));

    let outcome = handle.update(accept("sess-4b", "10.0.0.4")).await.unwrap();
    match outcome {
        UpdateOutcome::DuplicateIndex { index } => assert_eq!(index, "Framed-IP-Address"),
        other => panic!("expected DuplicateIndex, got {other:?}"),
    }

    handle.close().await;
}

/// Spawn a minimal ingress listener standing in for a node's RADIUS socket,
/// wired to its actor handle.
fn spawn_ingress_listener(
    socket: tokio::net::UdpSocket,
    handle: session_store_core::actor::SessionServerHandle,
    server_name: &'static str,
) {
    tokio::spawn(async move {
        let mut buf = [0u8; 4096];
        loop {
            let Ok((n, peer)) = socket.recv_from(&mut buf).await else {
                return;
            };
            let Some(packet) = wire::decode_request(&buf[..n]) else {
                continue;
            };
            if let Some(response) = ingress::handle_request(&handle, packet, server_name).await {
                let _ = socket.send_to(&wire::encode_response(&response), peer).await;
            }
        }
    });
}

/// Replication between two actors over loopback UDP avoids bouncing
/// the update back to its originator.
#[tokio::test]
async fn replication_avoids_echoing_back_to_originator() {
    let socket_a = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr_a = socket_a.local_addr().unwrap();
    let socket_b = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr_b = socket_b.local_addr().unwrap();

    let mut config_a = base_config();
    config_a.server_name = "server-a".to_string();
    config_a.send_to = vec![PeerConfig {
        name: "server-b".to_string(),
        address: addr_b.to_string(),
        secret: "shared-secret".to_string(),
        origin_ports: Vec::new(),
    }];
    let handle_a = SessionServer::spawn(config_a);

    let mut config_b = base_config();
    config_b.server_name = "server-b".to_string();
    // Bidirectional peering, the topology that would loop forever without
    // the `SessionStore-SeenBy` skip.
    config_b.send_to = vec![PeerConfig {
        name: "server-a".to_string(),
        address: addr_a.to_string(),
        secret: "shared-secret".to_string(),
        origin_ports: Vec::new(),
    }];
    let handle_b = SessionServer::spawn(config_b);

    spawn_ingress_listener(socket_a, handle_a.clone(), "server-a");
    spawn_ingress_listener(socket_b, handle_b.clone(), "server-b");

    // A simulated NAS sends the original Accounting-Start straight at
    // server A's RADIUS socket.
    let nas_socket = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    nas_socket.connect(addr_a).await.unwrap();
    nas_socket
        .send(&wire::encode_request(&accounting("sess-5", "10.0.0.5", "Start", 0)))
        .await
        .unwrap();
    let mut buf = [0u8; 4096];
    let n = tokio::time::timeout(Duration::from_secs(1), nas_socket.recv(&mut buf))
        .await
        .expect("server A should answer the NAS directly")
        .unwrap();
    assert!(wire::decode_response(&buf[..n]).is_some());

    // Give the spawned replication task and B's ingress loop time to run.
    tokio::time::sleep(Duration::from_millis(300)).await;

    let snapshots = handle_b
        .query("Framed-IP-Address".to_string(), "10.0.0.5".to_string(), true)
        .await
        .unwrap();
    assert_eq!(snapshots.len(), 1, "server-b should have received the replicated session");
    let seen_by: Vec<&str> = snapshots[0]
        .attributes
        .iter()
        .filter(|a| a.name == "SessionStore-SeenBy")
        .map(|a| a.value.as_str())
        .collect();
    assert!(seen_by.contains(&"server-a"));
    assert!(seen_by.contains(&"server-b"));
    // Loop avoidance: B must not have bounced a third copy back to A,
    // which would otherwise show up as a second, later SeenBy entry for A.
    assert_eq!(
        seen_by.iter().filter(|&&s| s == "server-a").count(),
        1,
        "server-a should appear exactly once in SeenBy"
    );

    handle_a.close().await;
    handle_b.close().await;
}

/// An Interim arriving with no prior Start for its id still creates a
/// live session, rather than being rejected as out of order.
#[tokio::test]
async fn interim_with_no_prior_start_creates_a_session() {
    let handle = SessionServer::spawn(base_config());

    let outcome = handle
        .update(accounting("sess-6", "10.0.0.6", "Interim-Update", 120))
        .await
        .unwrap();
    assert!(matches!(outcome, UpdateOutcome::Accepted));

    let snapshots = handle
        .query("Framed-IP-Address".to_string(), "10.0.0.6".to_string(), true)
        .await
        .unwrap();
    assert_eq!(snapshots.len(), 1);

    handle.close().await;
}

/// A `Stop` for an id the store has never seen still creates an entry (in
/// limbo), rather than being dropped as malformed.
#[tokio::test]
async fn stop_for_unknown_id_creates_a_stopped_session() {
    let handle = SessionServer::spawn(base_config());

    let outcome = handle
        .update(accounting("sess-7", "10.0.0.7", "Stop", 0))
        .await
        .unwrap();
    assert!(matches!(outcome, UpdateOutcome::Accepted));

    let snapshots = handle
        .query("Framed-IP-Address".to_string(), "10.0.0.7".to_string(), false)
        .await
        .unwrap();
    assert_eq!(snapshots.len(), 1);
    let snapshots_active_only = handle
        .query("Framed-IP-Address".to_string(), "10.0.0.7".to_string(), true)
        .await
        .unwrap();
    assert!(
        snapshots_active_only.is_empty(),
        "a Stopped session must not be returned by an active_only query"
    );

    handle.close().await;
}

/// Empty query parameters land on the fast path the HTTP handler uses, not
/// the actor's index lookup.
#[tokio::test]
async fn http_query_with_empty_params_returns_empty_items() {
    let handle = SessionServer::spawn(base_config());
    handle.update(accept("sess-8", "10.0.0.8")).await.unwrap();

    let router = query::router(handle.clone());
    let request = axum::http::Request::builder()
        .uri("/sessionserver/v1/sessions")
        .body(axum::body::Body::empty())
        .unwrap();

    use tower::util::ServiceExt;
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["Items"].as_array().unwrap().len(), 0);

    handle.close().await;
}
