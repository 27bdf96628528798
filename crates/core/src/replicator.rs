//! Fan-out of accepted accounting updates to peer session servers, with
//! loop avoidance.

use rand::Rng;

use crate::config::{PeerConfig, StoreConfig};
use crate::packet::RadiusPacket;

/// Replication is abandoned (and logged) once an incoming packet already
/// carries this many `SessionStore-SeenBy` entries — treated as evidence of
/// a misconfigured replication topology.
const MAX_SEEN_BY: usize = 4;

/// Builds the set of outbound replication jobs for an accepted accounting
/// update. Holds no connection state itself — each [`ReplicationJob`]
/// carries everything it needs (a copy of the packet plus the peer
/// descriptor) and is dispatched independently by the actor.
pub struct Replicator {
    config: StoreConfig,
}

impl Replicator {
    pub fn new(config: StoreConfig) -> Self {
        Self { config }
    }

    /// Plan the outbound jobs for one accepted accounting packet. Dispatch
    /// is the caller's job — this only decides who gets a copy and what
    /// that copy looks like.
    pub fn plan(&self, packet: &RadiusPacket) -> Vec<ReplicationJob> {
        let seen_by = packet.seen_by();

        if seen_by.len() > MAX_SEEN_BY {
            tracing::error!(
                seen_by = ?seen_by,
                "aborting replication: SeenBy exceeds expected peer count, likely a misconfigured topology"
            );
            return Vec::new();
        }

        let mut jobs = Vec::new();
        for peer in &self.config.send_to {
            if seen_by.iter().any(|name| *name == peer.name) {
                tracing::debug!(peer = peer.name, "skipping replication: already seen by peer");
                continue;
            }

            let origin_ports = if peer.origin_ports.is_empty() {
                &self.config.default_origin_ports
            } else {
                &peer.origin_ports
            };
            let origin_port = choose_origin_port(origin_ports);

            // The outbound copy is forwarded as-is: this node already
            // appended its own name to `SeenBy` at ingestion time, before
            // `push_packet` and this plan ever ran.
            jobs.push(ReplicationJob {
                peer: peer.clone(),
                packet: packet.clone(),
                origin_port,
                timeout: self.config.replication_timeout,
                tries: self.config.replication_tries,
            });
        }
        jobs
    }
}

fn choose_origin_port(ports: &[u16]) -> u16 {
    if ports.is_empty() {
        return 0;
    }
    let idx = rand::thread_rng().gen_range(0..ports.len());
    ports[idx]
}

/// A single peer dispatch, fully self-contained so it can be `tokio::spawn`ed
/// and awaited outside the actor's critical section.
pub struct ReplicationJob {
    pub peer: PeerConfig,
    pub packet: RadiusPacket,
    pub origin_port: u16,
    pub timeout: std::time::Duration,
    pub tries: u32,
}

impl ReplicationJob {
    /// Best-effort dispatch: every outcome (success, timeout, refusal) is
    /// non-fatal and only logged. The real socket transport lives in
    /// `session_store_core::wire` / `session-store-cli`; this is the policy
    /// layer above it, and in library-only tests (no UDP transport
    /// configured) it degrades to a logged no-op so unit tests never need a
    /// real peer listening.
    pub async fn run(self) {
        for attempt in 1..=self.tries.max(1) {
            tracing::debug!(
                peer = self.peer.name,
                address = self.peer.address,
                origin_port = self.origin_port,
                attempt,
                "replicating accounting update"
            );
            match crate::wire::send_and_await_response(
                &self.peer.address,
                self.origin_port,
                &self.packet,
                self.timeout,
            )
            .await
            {
                Ok(_response) => {
                    tracing::debug!(peer = self.peer.name, "replication acknowledged");
                    return;
                }
                Err(e) => {
                    tracing::warn!(peer = self.peer.name, attempt, error = %e, "replication attempt failed");
                }
            }
        }
        tracing::warn!(peer = self.peer.name, "replication exhausted all attempts");
    }
}
