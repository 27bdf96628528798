//! Error types for the session store library.

/// Errors that can occur while operating the session store and its actor.
///
/// Variants map to specific failure modes across the stack:
///
/// - **Ingestion**: [`MalformedPacket`](Self::MalformedPacket) — a RADIUS
///   packet missing an id attribute or carrying an unrecognized code/status.
/// - **Lifecycle**: [`Terminated`](Self::Terminated) — the actor has begun
///   (or completed) shutdown and rejects new work.
/// - **Transport/config**: [`Io`](Self::Io), [`Config`](Self::Config).
///
/// Duplicate-index admission failures are not a [`StoreError`] — they are
/// reported through [`PushOutcome::DuplicateIndex`](crate::session::store::PushOutcome::DuplicateIndex)
/// and [`UpdateOutcome::DuplicateIndex`](crate::actor::UpdateOutcome::DuplicateIndex),
/// since a duplicate is a normal, store-unchanged outcome, not a failure of
/// the operation itself.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The packet was missing an id attribute, or carried an unrecognized
    /// RADIUS code / `Acct-Status-Type`.
    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    /// The actor has transitioned to `Terminated` and rejects new work.
    #[error("session server terminated")]
    Terminated,

    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration failed to load or parse.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Convenience alias for `Result<T, StoreError>`.
pub type Result<T> = std::result::Result<T, StoreError>;
