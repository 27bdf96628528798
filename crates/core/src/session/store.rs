//! The primary session map, secondary indices, and expiration lists.

use std::collections::{HashMap, HashSet};
use std::time::SystemTime;

use crate::config::StoreConfig;
use crate::packet::{Avp, PacketType, RadiusPacket};
use crate::session::{Arena, ArenaIndex, ListKind, SessionEntry, SessionSnapshot};

/// Outcome of [`SessionStore::push_packet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// The update superseded the prior state and was merged in.
    Accepted,
    /// Missing id attribute, or an unrecognized code/status — the packet
    /// never reached the merge/admission logic.
    Malformed,
    /// Supersession check failed: state-ordinal and both timestamps were
    /// all `<=` the stored value. Idempotent — not an error.
    StaleIgnored,
    /// A unique index already holds a live session under this value.
    DuplicateIndex(String),
}

/// Owns the primary map, the secondary indices, and the three expiration
/// lists. Every mutator is called exclusively from the
/// [`SessionServer`](crate::actor::SessionServer) actor loop — no locking
/// is needed because access is already serialized by the mailbox.
pub struct SessionStore {
    config: StoreConfig,
    arena: Arena,
    /// Composite id -> arena index.
    primary: HashMap<String, ArenaIndex>,
    /// index name -> index value -> set of ids.
    indexes: HashMap<String, HashMap<String, HashSet<String>>>,
}

impl SessionStore {
    pub fn new(config: StoreConfig) -> Self {
        let mut indexes = HashMap::new();
        for idx in &config.index_attributes {
            indexes.insert(idx.name.clone(), HashMap::new());
        }
        Self {
            config,
            arena: Arena::default(),
            primary: HashMap::new(),
            indexes,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Derive the composite id from the packet's `id_attributes`.
    fn derive_id(&self, packet: &RadiusPacket) -> Option<String> {
        let mut parts = Vec::with_capacity(self.config.id_attributes.len());
        for name in &self.config.id_attributes {
            parts.push(packet.attr(name)?.to_string());
        }
        Some(parts.join("/"))
    }

    /// The sole mutator.
    pub fn push_packet(&mut self, packet: &RadiusPacket, now: SystemTime) -> PushOutcome {
        let Some(id) = self.derive_id(packet) else {
            tracing::warn!("rejecting packet: missing id attribute");
            return PushOutcome::Malformed;
        };

        let Some(packet_type) = packet.packet_type() else {
            tracing::warn!(id, "rejecting packet: unrecognized code/status");
            return PushOutcome::Malformed;
        };

        let acct_session_time = packet
            .attr("Acct-Session-Time")
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0);
        let event_timestamp = packet
            .attr("Event-Timestamp")
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0);

        let existing_idx = self.primary.get(&id).copied();
        let prior_packet_type = existing_idx.and_then(|idx| self.arena.get(idx)).map(|e| e.packet_type);

        if let Some(idx) = existing_idx {
            let existing = self.arena.get(idx).expect("primary map points at live entry");
            let supersedes = packet_type.state_ordinal() > existing.packet_type.state_ordinal()
                || acct_session_time > existing.acct_session_time
                || event_timestamp > existing.event_timestamp;

            if !supersedes {
                tracing::warn!(
                    id,
                    incoming = packet_type.as_str(),
                    stored = existing.packet_type.as_str(),
                    "stale or duplicate update ignored"
                );
                return PushOutcome::StaleIgnored;
            }
        }

        // Admission-time unique-index check: AcceptPending packets only,
        // and only against non-Stopped sessions other than this id itself
        // (a replay of the same AcceptPending for the same id is handled
        // by the supersession check above, not this one).
        if packet_type == PacketType::AcceptPending {
            for idx_conf in &self.config.index_attributes {
                if !idx_conf.unique {
                    continue;
                }
                let Some(value) = packet.attr(&idx_conf.name) else {
                    continue;
                };
                if let Some(holders) = self.indexes.get(&idx_conf.name).and_then(|m| m.get(value)) {
                    for holder_id in holders {
                        if holder_id == &id {
                            continue;
                        }
                        let holder_idx = self.primary.get(holder_id).copied();
                        let is_live_non_stopped = holder_idx
                            .and_then(|i| self.arena.get(i))
                            .is_some_and(|e| e.packet_type != PacketType::Stopped);
                        if is_live_non_stopped {
                            tracing::info!(
                                id,
                                index = idx_conf.name,
                                value,
                                "rejected: unique index violation"
                            );
                            return PushOutcome::DuplicateIndex(idx_conf.name.clone());
                        }
                    }
                }
            }
        }

        let ttl = match packet_type {
            PacketType::AcceptPending | PacketType::Stopped => self.config.limbo_time,
            PacketType::Started | PacketType::Interim => self.config.expiration_time,
        };
        let expires_at = now + ttl;

        let projected = self.project_attributes(packet, &id, now, expires_at);

        let new_entry = SessionEntry {
            id: id.clone(),
            packet_type,
            attributes: projected,
            last_updated: now,
            expires_at,
            seen_by: packet.seen_by().into_iter().map(str::to_string).collect(),
            acct_session_time,
            event_timestamp,
        };

        let list_kind = ListKind::for_packet_type(packet_type);

        match existing_idx {
            Some(idx) => {
                // Indices added by a prior AcceptPending are kept when the
                // prior state was AcceptPending (attributes
                // not yet known at Access-Request time may first appear on
                // the Start). Any other transition re-derives fully from
                // this packet's attributes, so stale index entries from a
                // since-changed attribute value don't linger.
                if prior_packet_type != Some(PacketType::AcceptPending) {
                    let prior_attrs = self.arena.get(idx).unwrap().attributes.clone();
                    self.remove_from_indexes(&id, &prior_attrs);
                }
                self.arena.replace_and_relink(idx, new_entry, list_kind);
            }
            None => {
                let idx = self.arena.insert(new_entry, list_kind);
                self.primary.insert(id.clone(), idx);
            }
        }

        self.insert_into_indexes(&id, packet);

        PushOutcome::Accepted
    }

    /// Project a packet onto the configured attribute allow-list plus the
    /// four synthetic `SessionStore-*` attributes.
    fn project_attributes(
        &self,
        packet: &RadiusPacket,
        id: &str,
        now: SystemTime,
        expires_at: SystemTime,
    ) -> Vec<Avp> {
        let mut out = Vec::new();
        for name in &self.config.projected_attributes {
            for avp in packet.attributes.iter().filter(|a| &a.name == name) {
                out.push(avp.clone());
            }
        }
        // Acct-Status-Type is synthesized from packet_type on Accounting
        // requests, but projecting the literal attribute (when configured)
        // also covers Acct-Status-Type appearing verbatim in Attributes.
        out.push(Avp::new("SessionStore-Id", id));
        out.push(Avp::new(
            "SessionStore-LastUpdated",
            millis_since_epoch(now).to_string(),
        ));
        out.push(Avp::new(
            "SessionStore-Expires",
            millis_since_epoch(expires_at).to_string(),
        ));
        for peer in packet.seen_by() {
            out.push(Avp::new("SessionStore-SeenBy", peer));
        }
        out
    }

    fn insert_into_indexes(&mut self, id: &str, packet: &RadiusPacket) {
        for idx_conf in &self.config.index_attributes {
            let Some(value) = packet.attr(&idx_conf.name) else {
                continue;
            };
            self.indexes
                .entry(idx_conf.name.clone())
                .or_default()
                .entry(value.to_string())
                .or_default()
                .insert(id.to_string());
        }
    }

    fn remove_from_indexes(&mut self, id: &str, attributes: &[Avp]) {
        for idx_conf in &self.config.index_attributes {
            let Some(value) = attributes.iter().find(|a| a.name == idx_conf.name) else {
                continue;
            };
            if let Some(values) = self.indexes.get_mut(&idx_conf.name) {
                if let Some(ids) = values.get_mut(&value.value) {
                    ids.remove(id);
                    if ids.is_empty() {
                        values.remove(&value.value);
                    }
                }
            }
        }
    }

    /// Look up sessions by a secondary index value.
    pub fn find_by_index(&self, name: &str, value: &str, active_only: bool) -> Vec<SessionSnapshot> {
        let Some(ids) = self.indexes.get(name).and_then(|m| m.get(value)) else {
            tracing::warn!(index = name, "query on unknown index name or value");
            return Vec::new();
        };

        ids.iter()
            .filter_map(|id| self.primary.get(id).copied())
            .filter_map(|idx| self.arena.get(idx))
            .filter(|e| !active_only || e.packet_type != PacketType::Stopped)
            .map(SessionSnapshot::from)
            .collect()
    }

    /// Purge expired sessions from each state's list. Distinct cutoffs allow
    /// tests to force per-state expiration independently.
    pub fn expire(
        &mut self,
        cutoff_accept: SystemTime,
        cutoff_active: SystemTime,
        cutoff_stopped: SystemTime,
    ) -> usize {
        let mut expired = 0;
        for (kind, cutoff) in [
            (ListKind::Accept, cutoff_accept),
            (ListKind::Active, cutoff_active),
            (ListKind::Stopped, cutoff_stopped),
        ] {
            expired += self.expire_list(kind, cutoff);
        }
        expired
    }

    fn expire_list(&mut self, kind: ListKind, cutoff: SystemTime) -> usize {
        let mut removed = 0;
        let mut cursor = self.arena.list_head(kind);

        while let Some(idx) = cursor {
            let Some(entry) = self.arena.get(idx) else {
                cursor = self.arena.next_in_list(idx);
                continue;
            };
            if entry.expires_at > cutoff {
                // List is only approximately ordered: scan on, don't stop —
                // a later-inserted-but-earlier-expiring entry can still
                // follow.
                cursor = self.arena.next_in_list(idx);
                continue;
            }

            let id = entry.id.clone();
            let attributes = entry.attributes.clone();
            let next = self.arena.next_in_list(idx);

            // Indices before primary map: indices must never point to an
            // absent id.
            self.remove_from_indexes(&id, &attributes);
            self.primary.remove(&id);
            self.arena.remove(idx);
            removed += 1;

            cursor = next;
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.primary.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primary.is_empty()
    }
}

fn millis_since_epoch(t: SystemTime) -> u128 {
    t.duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexAttribute;
    use crate::packet::PacketCode;
    use std::time::Duration;

    fn config(unique_index: bool) -> StoreConfig {
        StoreConfig {
            id_attributes: vec!["Acct-Session-Id".to_string()],
            index_attributes: vec![IndexAttribute {
                name: "User-Name".to_string(),
                unique: unique_index,
            }],
            projected_attributes: vec!["User-Name".to_string(), "Framed-IP-Address".to_string()],
            expiration_time: Duration::from_secs(3600),
            limbo_time: Duration::from_secs(120),
            purge_interval: Duration::from_secs(30),
            receive_from: Vec::new(),
            send_to: Vec::new(),
            replication_timeout: Duration::from_secs(2),
            replication_tries: 1,
            default_origin_ports: vec![0],
            server_name: "test".to_string(),
        }
    }

    fn access_request(id: &str, user: &str) -> RadiusPacket {
        RadiusPacket::new(PacketCode::AccessRequest, 1)
            .with_attr("Acct-Session-Id", id)
            .with_attr("User-Name", user)
    }

    fn start(id: &str, user: &str, session_time: i64) -> RadiusPacket {
        RadiusPacket::new(PacketCode::AccountingRequest, 1)
            .with_attr("Acct-Session-Id", id)
            .with_attr("User-Name", user)
            .with_attr("Acct-Status-Type", "Start")
            .with_attr("Acct-Session-Time", session_time.to_string())
    }

    fn stop(id: &str, user: &str, session_time: i64) -> RadiusPacket {
        RadiusPacket::new(PacketCode::AccountingRequest, 1)
            .with_attr("Acct-Session-Id", id)
            .with_attr("User-Name", user)
            .with_attr("Acct-Status-Type", "Stop")
            .with_attr("Acct-Session-Time", session_time.to_string())
    }

    /// Index consistency: a live session is listed under exactly the
    /// (name, value) pairs its projected attributes carry.
    #[test]
    fn index_consistency() {
        let mut store = SessionStore::new(config(false));
        let now = SystemTime::now();
        store.push_packet(&access_request("s1", "alice"), now);

        let found = store.find_by_index("User-Name", "alice", false);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].attr("SessionStore-Id"), Some("s1"));

        assert!(store.find_by_index("User-Name", "bob", false).is_empty());
    }

    /// A session transitions between exactly one expiration list at a time,
    /// and distinct ids never collide.
    #[test]
    fn list_membership_and_id_uniqueness() {
        let mut store = SessionStore::new(config(false));
        let now = SystemTime::now();

        assert_eq!(store.push_packet(&access_request("s1", "alice"), now), PushOutcome::Accepted);
        assert_eq!(store.len(), 1);
        assert_eq!(
            store.push_packet(&start("s1", "alice", 0), now),
            PushOutcome::Accepted
        );
        // Same id transitioning state must not create a second entry.
        assert_eq!(store.len(), 1);

        assert_eq!(store.push_packet(&access_request("s2", "bob"), now), PushOutcome::Accepted);
        assert_eq!(store.len(), 2);
    }

    /// A unique index admits at most one non-`Stopped` session per value, but
    /// a `Stopped` holder frees the value back up.
    #[test]
    fn unique_index_constraint() {
        let mut store = SessionStore::new(config(true));
        let now = SystemTime::now();

        assert_eq!(
            store.push_packet(&access_request("s1", "alice"), now),
            PushOutcome::Accepted
        );
        assert_eq!(
            store.push_packet(&access_request("s2", "alice"), now),
            PushOutcome::DuplicateIndex("User-Name".to_string())
        );

        assert_eq!(store.push_packet(&stop("s1", "alice", 10), now), PushOutcome::Accepted);
        assert_eq!(
            store.push_packet(&access_request("s2", "alice"), now),
            PushOutcome::Accepted
        );
    }

    /// Monotone merge: an update with a lesser `Acct-Session-Time` than the
    /// stored value is ignored, not merged in.
    #[test]
    fn monotone_merge_rejects_regression() {
        let mut store = SessionStore::new(config(false));
        let now = SystemTime::now();

        store.push_packet(&access_request("s1", "alice"), now);
        store.push_packet(&start("s1", "alice", 100), now);
        assert_eq!(
            store.push_packet(&start("s1", "alice", 50), now),
            PushOutcome::StaleIgnored
        );

        let found = store.find_by_index("User-Name", "alice", false);
        assert_eq!(found[0].attr("SessionStore-Id"), Some("s1"));
    }

    /// Resubmitting the exact same packet twice is idempotent.
    #[test]
    fn idempotent_resubmission() {
        let mut store = SessionStore::new(config(false));
        let now = SystemTime::now();

        let packet = start("s1", "alice", 100);
        store.push_packet(&access_request("s1", "alice"), now);
        assert_eq!(store.push_packet(&packet, now), PushOutcome::Accepted);
        assert_eq!(store.push_packet(&packet, now), PushOutcome::StaleIgnored);
        assert_eq!(store.len(), 1);
        assert_eq!(store.find_by_index("User-Name", "alice", false).len(), 1);
    }

    /// After `expire` with cutoffs equal to every `expires_at`, every
    /// affected session is gone from both the primary map and its indices.
    #[test]
    fn expire_boundary_removes_from_primary_and_indexes() {
        let mut store = SessionStore::new(config(false));
        let now = SystemTime::now();
        store.push_packet(&access_request("s1", "alice"), now);

        let cutoff = now + store.config().limbo_time;
        let removed = store.expire(cutoff, cutoff, cutoff);
        assert_eq!(removed, 1);
        assert!(store.is_empty());
        assert!(store.find_by_index("User-Name", "alice", false).is_empty());
    }

    /// A Stop for an id the store has never seen still creates a session, in
    /// the `Stopped` state with a limbo-length TTL.
    #[test]
    fn stop_for_unknown_id_creates_stopped_session() {
        let mut store = SessionStore::new(config(false));
        let now = SystemTime::now();

        assert_eq!(store.push_packet(&stop("s1", "alice", 0), now), PushOutcome::Accepted);
        assert_eq!(store.len(), 1);

        let found = store.find_by_index("User-Name", "alice", false);
        assert_eq!(found.len(), 1);
        assert!(store.find_by_index("User-Name", "alice", true).is_empty());
    }

    /// Malformed packets (missing id attribute) never reach the merge logic.
    #[test]
    fn malformed_packet_missing_id_is_rejected() {
        let mut store = SessionStore::new(config(false));
        let now = SystemTime::now();
        let packet = RadiusPacket::new(PacketCode::AccessRequest, 1).with_attr("User-Name", "alice");
        assert_eq!(store.push_packet(&packet, now), PushOutcome::Malformed);
        assert!(store.is_empty());
    }

    /// A composite id joins every configured `id_attributes` value with
    /// `/`, in order: `Acct-Session-Id = "session1"` and
    /// `NAS-IP-Address = "1.1.1.1"` produce `SessionStore-Id =
    /// "session1/1.1.1.1"`.
    #[test]
    fn composite_id_joins_configured_attributes_with_slash() {
        let mut store = SessionStore::new(StoreConfig {
            id_attributes: vec!["Acct-Session-Id".to_string(), "NAS-IP-Address".to_string()],
            index_attributes: vec![IndexAttribute {
                name: "User-Name".to_string(),
                unique: false,
            }],
            projected_attributes: vec!["User-Name".to_string()],
            expiration_time: Duration::from_secs(3600),
            limbo_time: Duration::from_secs(120),
            purge_interval: Duration::from_secs(30),
            receive_from: Vec::new(),
            send_to: Vec::new(),
            replication_timeout: Duration::from_secs(2),
            replication_tries: 1,
            default_origin_ports: vec![0],
            server_name: "test".to_string(),
        });
        let now = SystemTime::now();

        let packet = RadiusPacket::new(PacketCode::AccessRequest, 1)
            .with_attr("Acct-Session-Id", "session1")
            .with_attr("NAS-IP-Address", "1.1.1.1")
            .with_attr("User-Name", "user1");
        assert_eq!(store.push_packet(&packet, now), PushOutcome::Accepted);

        let found = store.find_by_index("User-Name", "user1", false);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].attr("SessionStore-Id"), Some("session1/1.1.1.1"));
    }
}
