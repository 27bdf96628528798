//! Configuration.
//!
//! [`ServerConfigJson`] mirrors the on-disk JSON shape byte-for-byte
//! (`PascalCase` keys, millis/secs as the wire unit). [`StoreConfig`] is the
//! internal, duration-typed form the store and actor actually consume;
//! `StoreConfig::from` converts one to the other once at startup so the
//! rest of the crate never re-parses raw integers.

use std::time::Duration;

use serde::Deserialize;

/// One entry of `IndexConf`.
#[derive(Debug, Clone)]
pub struct IndexAttribute {
    pub name: String,
    pub unique: bool,
}

/// One replication peer.
#[derive(Debug, Clone)]
pub struct PeerConfig {
    pub name: String,
    pub address: String,
    pub secret: String,
    pub origin_ports: Vec<u16>,
}

/// The internal, duration-typed configuration consumed by
/// [`SessionStore`](crate::session::SessionStore) and
/// [`SessionServer`](crate::actor::SessionServer).
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub id_attributes: Vec<String>,
    pub index_attributes: Vec<IndexAttribute>,
    pub projected_attributes: Vec<String>,
    pub expiration_time: Duration,
    pub limbo_time: Duration,
    pub purge_interval: Duration,
    /// RADIUS client allow-list. Empty means "accept from anywhere"; a
    /// non-empty list is matched against the sending UDP peer's address by
    /// the RADIUS ingress loop before a datagram ever reaches the actor.
    pub receive_from: Vec<String>,
    pub send_to: Vec<PeerConfig>,
    pub replication_timeout: Duration,
    pub replication_tries: u32,
    pub default_origin_ports: Vec<u16>,
    pub server_name: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            id_attributes: vec!["Acct-Session-Id".to_string(), "NAS-IP-Address".to_string()],
            index_attributes: Vec::new(),
            projected_attributes: Vec::new(),
            expiration_time: Duration::from_secs(3600),
            limbo_time: Duration::from_secs(120),
            purge_interval: Duration::from_secs(30),
            receive_from: Vec::new(),
            send_to: Vec::new(),
            replication_timeout: Duration::from_secs(2),
            replication_tries: 1,
            default_origin_ports: vec![0],
            server_name: "session-store".to_string(),
        }
    }
}

/// Wire shape of the `IndexConf` array entries.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexConfJson {
    #[serde(rename = "IndexName")]
    pub index_name: String,
    #[serde(rename = "IsUnique")]
    pub is_unique: bool,
}

/// Wire shape of one `SendTo` peer entry.
#[derive(Debug, Clone, Deserialize)]
pub struct SendToJson {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Address")]
    pub address: String,
    #[serde(rename = "Secret")]
    pub secret: String,
    #[serde(rename = "OriginPorts", default)]
    pub origin_ports: Vec<u16>,
}

/// Wire shape of `ReplicationParams`.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplicationParamsJson {
    #[serde(rename = "TimeoutSecs", default = "default_replication_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(rename = "ServerTries", default = "default_replication_tries")]
    pub server_tries: u32,
    #[serde(rename = "OriginPorts", default)]
    pub origin_ports: Vec<u16>,
}

fn default_replication_timeout_secs() -> u64 {
    2
}

fn default_replication_tries() -> u32 {
    1
}

/// The full on-disk JSON configuration document.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfigJson {
    #[serde(rename = "RadiusBindAddress")]
    pub radius_bind_address: String,
    #[serde(rename = "RadiusBindPort")]
    pub radius_bind_port: u16,
    #[serde(rename = "HttpBindAddress")]
    pub http_bind_address: String,
    #[serde(rename = "HttpBindPort")]
    pub http_bind_port: u16,
    #[serde(rename = "Attributes")]
    pub attributes: Vec<String>,
    #[serde(rename = "IdAttributes")]
    pub id_attributes: Vec<String>,
    #[serde(rename = "IndexConf", default)]
    pub index_conf: Vec<IndexConfJson>,
    #[serde(rename = "ExpirationTime")]
    pub expiration_time_secs: u64,
    #[serde(rename = "LimboTime")]
    pub limbo_time_secs: u64,
    #[serde(rename = "PurgeIntervalMillis")]
    pub purge_interval_millis: u64,
    #[serde(rename = "ReceiveFrom", default)]
    pub receive_from: Vec<String>,
    #[serde(rename = "SendTo", default)]
    pub send_to: Vec<SendToJson>,
    #[serde(rename = "ReplicationParams", default)]
    pub replication_params: Option<ReplicationParamsJson>,
}

impl ServerConfigJson {
    pub fn load(path: &std::path::Path) -> crate::error::Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| crate::error::StoreError::Config(format!("reading {path:?}: {e}")))?;
        serde_json::from_str(&text)
            .map_err(|e| crate::error::StoreError::Config(format!("parsing {path:?}: {e}")))
    }

    pub fn into_store_config(self, server_name: String) -> StoreConfig {
        let replication = self.replication_params.unwrap_or(ReplicationParamsJson {
            timeout_secs: default_replication_timeout_secs(),
            server_tries: default_replication_tries(),
            origin_ports: Vec::new(),
        });

        StoreConfig {
            id_attributes: self.id_attributes,
            index_attributes: self
                .index_conf
                .into_iter()
                .map(|c| IndexAttribute {
                    name: c.index_name,
                    unique: c.is_unique,
                })
                .collect(),
            projected_attributes: self.attributes,
            expiration_time: Duration::from_secs(self.expiration_time_secs),
            limbo_time: Duration::from_secs(self.limbo_time_secs),
            purge_interval: Duration::from_millis(self.purge_interval_millis),
            receive_from: self.receive_from,
            send_to: self
                .send_to
                .into_iter()
                .map(|p| PeerConfig {
                    name: p.name,
                    address: p.address,
                    secret: p.secret,
                    origin_ports: p.origin_ports,
                })
                .collect(),
            replication_timeout: Duration::from_secs(replication.timeout_secs),
            replication_tries: replication.server_tries,
            default_origin_ports: replication.origin_ports,
            server_name,
        }
    }
}
