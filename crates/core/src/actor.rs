//! The single-threaded event loop serializing all store mutation and
//! query access.
//!
//! Mirrors the handle-around-shared-state shape the session manager in this
//! crate's lineage uses (a cheap `Clone` wrapping an `Arc`), except the
//! thing being shared is a channel rather than a lock: every
//! [`SessionServerHandle`] clone sends `Command`s into the same
//! `tokio::sync::mpsc` mailbox, and the store itself is touched only by the
//! one task draining it.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::metrics::StoreMetrics;
use crate::metrics::StoreMetricsSnapshot;
use crate::packet::RadiusPacket;
use crate::replicator::{ReplicationJob, Replicator};
use crate::session::store::PushOutcome;
use crate::session::{SessionSnapshot, SessionStore};

/// Outcome of an `Update` command, handed back to the ingress adapter so it
/// can build the right RADIUS response.
#[derive(Debug, Clone)]
pub enum UpdateOutcome {
    Accepted,
    DuplicateIndex { index: String },
    /// Missing id attribute or unrecognized code/status — the ingress
    /// adapter drops the packet silently.
    Malformed,
}

enum Command {
    Tick,
    Update {
        packet: RadiusPacket,
        reply: oneshot::Sender<Result<UpdateOutcome>>,
    },
    Query {
        index_name: String,
        index_value: String,
        active_only: bool,
        reply: oneshot::Sender<Result<Vec<SessionSnapshot>>>,
    },
    SetDown,
    Close {
        reply: oneshot::Sender<()>,
    },
}

/// Actor lifecycle state. One-way: `Operational -> Terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ActorState {
    Operational,
    Terminated,
}

/// Cloneable handle to a running [`SessionServer`]. The unit of sharing
/// across the ingress loop, the HTTP query handler, and the periodic
/// ticker.
#[derive(Clone)]
pub struct SessionServerHandle {
    tx: mpsc::Sender<Command>,
    metrics: Arc<StoreMetrics>,
}

impl SessionServerHandle {
    pub async fn update(&self, packet: RadiusPacket) -> Result<UpdateOutcome> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Command::Update {
                packet,
                reply: reply_tx,
            })
            .await
            .map_err(|_| StoreError::Terminated)?;
        reply_rx.await.map_err(|_| StoreError::Terminated)?
    }

    pub async fn query(
        &self,
        index_name: String,
        index_value: String,
        active_only: bool,
    ) -> Result<Vec<SessionSnapshot>> {
        StoreMetrics::incr(&self.metrics.queries_total);
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Command::Query {
                index_name,
                index_value,
                active_only,
                reply: reply_tx,
            })
            .await
            .map_err(|_| StoreError::Terminated)?;
        reply_rx.await.map_err(|_| StoreError::Terminated)?
    }

    /// Empty `index_name`/`index_value` query parameters never reach the
    /// actor — they answer `200 OK` with an empty body and count a metric,
    /// for health probes. The query handler calls this directly on that
    /// fast path.
    pub fn record_empty_params_query(&self) {
        StoreMetrics::incr(&self.metrics.queries_total);
        StoreMetrics::incr(&self.metrics.queries_empty_params);
    }

    pub fn metrics_snapshot(&self) -> StoreMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Two-phase shutdown, phase one: stop accepting new work.
    pub async fn set_down(&self) {
        let _ = self.tx.send(Command::SetDown).await;
    }

    /// Two-phase shutdown, phase two: drain in-flight replication and exit
    /// the loop. Returns once the actor task has actually stopped.
    pub async fn close(&self) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.tx.send(Command::Close { reply: reply_tx }).await.is_ok() {
            let _ = reply_rx.await;
        }
    }
}

/// The actor loop itself. Spawned with [`SessionServer::spawn`], which
/// returns a [`SessionServerHandle`] and leaves the loop running as a
/// detached `tokio::task`.
pub struct SessionServer {
    store: SessionStore,
    replicator: Replicator,
    state: ActorState,
    rx: mpsc::Receiver<Command>,
    replication_tasks: JoinSet<()>,
    metrics: Arc<StoreMetrics>,
}

/// Mailbox capacity. Backpressure is applied by producers awaiting the
/// send, never by silent drops.
const MAILBOX_CAPACITY: usize = 1024;

impl SessionServer {
    /// Spawn the actor loop as a detached task and return a handle to it.
    pub fn spawn(config: StoreConfig) -> SessionServerHandle {
        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        let replicator = Replicator::new(config.clone());
        let metrics = Arc::new(StoreMetrics::default());
        let server = SessionServer {
            store: SessionStore::new(config),
            replicator,
            state: ActorState::Operational,
            rx,
            replication_tasks: JoinSet::new(),
            metrics: metrics.clone(),
        };
        tokio::spawn(server.run());
        SessionServerHandle { tx, metrics }
    }

    async fn run(mut self) {
        let purge_interval = self.store.config().purge_interval;
        let mut ticker = tokio::time::interval(purge_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tracing::info!(server = self.store.config().server_name, "actor started");

        loop {
            tokio::select! {
                Some(cmd) = self.rx.recv() => {
                    if self.handle_command(cmd).await {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.handle_command(Command::Tick).await;
                }
                else => break,
            }
        }

        self.drain_replication(Duration::from_secs(5)).await;
        tracing::info!("actor stopped");
    }

    /// Returns `true` when the loop should exit.
    async fn handle_command(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::Tick => {
                self.handle_tick();
                false
            }
            Command::Update { packet, reply } => {
                self.handle_update(packet, reply).await;
                false
            }
            Command::Query {
                index_name,
                index_value,
                active_only,
                reply,
            } => {
                let result = if self.state == ActorState::Terminated {
                    Err(StoreError::Terminated)
                } else {
                    Ok(self.store.find_by_index(&index_name, &index_value, active_only))
                };
                let _ = reply.send(result);
                false
            }
            Command::SetDown => {
                self.log_metrics_snapshot("actor transitioning to Terminated");
                self.state = ActorState::Terminated;
                false
            }
            Command::Close { reply } => {
                self.log_metrics_snapshot("actor closing");
                let _ = reply.send(());
                true
            }
        }
    }

    fn log_metrics_snapshot(&self, msg: &str) {
        let snapshot = self.metrics.snapshot();
        tracing::info!(
            accepted = snapshot.accepted,
            rejected_duplicate = snapshot.rejected_duplicate,
            rejected_malformed = snapshot.rejected_malformed,
            stale_ignored = snapshot.stale_ignored,
            expired = snapshot.expired,
            queries_total = snapshot.queries_total,
            queries_empty_params = snapshot.queries_empty_params,
            "{msg}"
        );
    }

    fn handle_tick(&mut self) {
        let now = SystemTime::now();
        let expired = self.store.expire(now, now, now);
        if expired > 0 {
            tracing::debug!(expired, "purge tick");
            self.metrics
                .expired
                .fetch_add(expired as u64, std::sync::atomic::Ordering::Relaxed);
        }
    }

    async fn handle_update(
        &mut self,
        packet: RadiusPacket,
        reply: oneshot::Sender<Result<UpdateOutcome>>,
    ) {
        if self.state == ActorState::Terminated {
            let _ = reply.send(Err(StoreError::Terminated));
            return;
        }

        let now = SystemTime::now();
        let is_accounting = matches!(packet.code, crate::packet::PacketCode::AccountingRequest);

        let outcome = self.store.push_packet(&packet, now);
        let (update_outcome, accepted) = match outcome {
            PushOutcome::Accepted => {
                StoreMetrics::incr(&self.metrics.accepted);
                (UpdateOutcome::Accepted, true)
            }
            PushOutcome::StaleIgnored => {
                StoreMetrics::incr(&self.metrics.stale_ignored);
                // Idempotent: the caller still gets the success response,
                // but there is nothing to replicate.
                (UpdateOutcome::Accepted, false)
            }
            PushOutcome::DuplicateIndex(index) => {
                StoreMetrics::incr(&self.metrics.rejected_duplicate);
                (UpdateOutcome::DuplicateIndex { index }, false)
            }
            PushOutcome::Malformed => {
                StoreMetrics::incr(&self.metrics.rejected_malformed);
                (UpdateOutcome::Malformed, false)
            }
        };

        // Reply before launching replication: the originating update must
        // never block on fan-out.
        let _ = reply.send(Ok(update_outcome));

        if accepted && is_accounting {
            for job in self.replicator.plan(&packet) {
                self.dispatch_replication(job);
            }
        }
    }

    /// Launch one peer dispatch as a tracked background task. The actor
    /// does not await it inline — it remains free to process the next
    /// mailbox message immediately.
    fn dispatch_replication(&mut self, job: ReplicationJob) {
        self.replication_tasks.spawn(async move {
            job.run().await;
        });
    }

    /// `Close` awaits outstanding replication up to `grace`, then gives up
    /// and logs — in-flight jobs are allowed to finish or time out on
    /// their own.
    async fn drain_replication(&mut self, grace: Duration) {
        let deadline = tokio::time::Instant::now() + grace;
        loop {
            if self.replication_tasks.is_empty() {
                return;
            }
            tokio::select! {
                joined = self.replication_tasks.join_next() => {
                    if joined.is_none() {
                        return;
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {
                    tracing::warn!(
                        outstanding = self.replication_tasks.len(),
                        "replication drain timed out; abandoning outstanding tasks"
                    );
                    return;
                }
            }
        }
    }
}
