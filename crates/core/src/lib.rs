//! # session-store-core — in-memory RADIUS subscriber session store
//!
//! The authoritative, indexable view of who is currently connected to a
//! broadband/access network, fed by RADIUS accounting and authentication
//! traffic and queried over HTTP. Sessions are indexed by arbitrary
//! subscriber attributes (IP address, username, session id, NAS port,
//! etc.), expire with bounded staleness, and replicate across server
//! instances on a best-effort, eventually-consistent basis.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │  Adapters (UDP ingress / HTTP query / CLI)│
//! ├──────────────────────────────────────────┤
//! │  actor          — mailbox, single owner  │
//! │  replicator     — peer fan-out           │
//! ├──────────────────────────────────────────┤
//! │  session::store — primary map, indices,  │
//! │                    expiration lists      │
//! │  packet          — decoded RADIUS model  │
//! └──────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use session_store_core::actor::SessionServer;
//! use session_store_core::config::StoreConfig;
//!
//! # async fn run() {
//! let handle = SessionServer::spawn(StoreConfig::default());
//! handle.set_down().await;
//! handle.close().await;
//! # }
//! ```
//!
//! ## Crate layout
//!
//! - [`actor`] — [`actor::SessionServer`] mailbox loop and [`actor::SessionServerHandle`].
//! - [`session`] — [`session::SessionStore`], [`session::SessionEntry`], expiration lists.
//! - [`replicator`] — peer fan-out planning and dispatch.
//! - [`ingress`] — RADIUS-packet-to-command translation, response construction.
//! - [`query`] — HTTP query router (`axum`).
//! - [`packet`] — decoded RADIUS packet/response model.
//! - [`wire`] — minimal text transcoding stand-in for the RADIUS codec collaborator.
//! - [`config`] — on-disk JSON configuration and its typed, duration-based form.
//! - [`metrics`] — ambient observability counters.
//! - [`error`] — [`error::StoreError`] and [`error::Result`].

pub mod actor;
pub mod config;
pub mod error;
pub mod ingress;
pub mod metrics;
pub mod packet;
pub mod query;
pub mod replicator;
pub mod session;
pub mod wire;

pub use error::{Result, StoreError};
