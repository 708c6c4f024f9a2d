use thiserror::Error;

/// Errors surfaced by the session subsystem.
///
/// `Clone` because a single renewal outcome fans out to every waiter
/// attached to the same pending renewal.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    /// The credential's claims could not be decoded or lack an expiry.
    /// An unreadable credential is treated as expired, not as a retryable fault.
    #[error("malformed credential: {0}")]
    MalformedCredential(String),

    /// The renewal endpoint could not be reached or answered abnormally.
    /// Retryable: the durable credential's validity is unknown, only unreachable.
    #[error("renewal transport failure: {0}")]
    Transport(String),

    /// The renewal endpoint explicitly rejected the durable credential.
    /// Terminal: drives the coordinator to signed-out.
    #[error("renewal rejected: {0}")]
    RenewalRejected(String),

    /// The coordinator is already signed out; re-authenticate to continue.
    #[error("session expired — sign in again")]
    SessionExpired,

    /// The durable credential store failed to read or write.
    #[error("credential store error: {0}")]
    StoreError(String),
}

impl SessionError {
    /// Whether this failure must drive the coordinator to the terminal
    /// signed-out state. Transport faults are the only retryable kind.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Transport(_))
    }
}
