//! Standalone RADIUS session store server binary.
//!
//! Loads a JSON config, spawns the actor, and drives two adapters against
//! it: a UDP RADIUS ingress loop and an HTTP query server. `Ctrl-C` runs
//! the two-phase shutdown (`SetDown` then `Close`) before exiting.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::UdpSocket;

use session_store_core::actor::{SessionServer, SessionServerHandle};
use session_store_core::config::ServerConfigJson;
use session_store_core::{ingress, query, wire};

#[derive(Parser)]
#[command(name = "session-store-server", about = "Standalone RADIUS session store server")]
struct Args {
    /// Path to the JSON configuration document.
    #[arg(long, short, default_value = "config.json")]
    config: PathBuf,

    /// This server's own name, used in `SessionStore-SeenBy`.
    #[arg(long, default_value = "session-store")]
    name: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let config_json = ServerConfigJson::load(&args.config)
        .with_context(|| format!("loading {:?}", args.config))?;
    let radius_addr: SocketAddr = format!(
        "{}:{}",
        config_json.radius_bind_address, config_json.radius_bind_port
    )
    .parse()
    .context("parsing RADIUS bind address")?;
    let http_addr: SocketAddr = format!(
        "{}:{}",
        config_json.http_bind_address, config_json.http_bind_port
    )
    .parse()
    .context("parsing HTTP bind address")?;

    let server_name = args.name;
    let store_config = config_json.into_store_config(server_name.clone());
    let receive_from = store_config.receive_from.clone();

    let handle = SessionServer::spawn(store_config);

    let radius_handle = handle.clone();
    tokio::spawn(run_radius_ingress(radius_handle, radius_addr, server_name, receive_from));

    let http_handle = handle.clone();
    tokio::spawn(async move {
        let router = query::router(http_handle);
        let listener = tokio::net::TcpListener::bind(http_addr).await?;
        tracing::info!(addr = %http_addr, "query endpoint listening");
        axum::serve(listener, router).await
    });

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    tracing::info!("shutdown requested");
    handle.set_down().await;
    handle.close().await;

    Ok(())
}

/// UDP ingress loop: decode, submit to the actor, encode and send the
/// response. Uses the same text-transcoding stand-in as the replicator
/// (`session_store_core::wire`) rather than a real RFC 2865 codec.
async fn run_radius_ingress(
    handle: SessionServerHandle,
    addr: SocketAddr,
    server_name: String,
    receive_from: Vec<String>,
) {
    let socket = match UdpSocket::bind(addr).await {
        Ok(s) => Arc::new(s),
        Err(e) => {
            tracing::error!(%addr, error = %e, "failed to bind RADIUS ingress socket");
            return;
        }
    };
    tracing::info!(%addr, "RADIUS ingress listening");

    let mut buf = [0u8; 4096];
    loop {
        let (n, peer) = match socket.recv_from(&mut buf).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "RADIUS ingress recv failed");
                continue;
            }
        };

        // RADIUS client allow-list: an empty list accepts from anywhere;
        // otherwise the sending peer's address must appear in it.
        if !receive_from.is_empty() && !receive_from.iter().any(|a| a == &peer.ip().to_string()) {
            tracing::warn!(%peer, "dropping datagram from unlisted RADIUS client");
            continue;
        }

        let Some(packet) = wire::decode_request(&buf[..n]) else {
            tracing::warn!(%peer, "dropping unparseable RADIUS datagram");
            continue;
        };

        // Submitted inline, not from a spawned task: the actor's ordering
        // guarantee — that updates become visible in the same order their
        // Update messages were enqueued — depends on producers enqueueing
        // synchronously on the receive path. Only the response send, which
        // touches no shared state, is dispatched to a background task.
        let response = ingress::handle_request(&handle, packet, &server_name).await;

        if let Some(response) = response {
            let socket = socket.clone();
            tokio::spawn(async move {
                let bytes = wire::encode_response(&response);
                if let Err(e) = socket.send_to(&bytes, peer).await {
                    tracing::warn!(%peer, error = %e, "failed to send RADIUS response");
                }
            });
        }
    }
}
