//! Error taxonomy for the replication provider (spec §7), layered over
//! [`dirsync_core::CoreError`] exactly as `cortex-storage` layers its own
//! error variants over `cortex_core::CortexError`.

use dirsync_core::CoreError;

/// Result type alias used throughout `dirsync-provider`.
pub type Result<T> = std::result::Result<T, SyncProvError>;

/// Errors raised by the replication provider itself, distinct from the
/// shared [`CoreError`] taxonomy so session- and context-scoped failures
/// (spec §7) can be told apart from collaborator failures at the call site.
#[derive(Debug, thiserror::Error)]
pub enum SyncProvError {
    /// A collaborator (store, ACL, schema) failed; see [`CoreError`] for the
    /// specific category.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The session's search base no longer resolves to the identity it was
    /// registered with (spec §4.3, invariant 4). Terminates only that
    /// session with a "no such object" final message.
    #[error("base invalidated for session {session_id}")]
    BaseInvalidated { session_id: String },

    /// The session's backlog exceeded the configured limit before the
    /// refresh→persist drain could catch up (spec §10 "Session lag").
    #[error("session {session_id} exceeded max backlog ({len} queued results)")]
    BacklogOverflow { session_id: String, len: usize },

    /// The session was abandoned or cancelled and no longer exists.
    #[error("session {session_id} no longer exists")]
    SessionGone { session_id: String },
}

impl SyncProvError {
    /// True if this failure should terminate only the named session rather
    /// than the request or the process (spec §7).
    pub fn is_session_scoped(&self) -> bool {
        match self {
            Self::Core(e) => e.is_session_scoped(),
            Self::BaseInvalidated { .. }
            | Self::BacklogOverflow { .. }
            | Self::SessionGone { .. } => true,
        }
    }

    /// True if the failure is transient and the caller may retry with
    /// backoff (spec §7: `BUSY`/`LOCK_RETRY`).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Core(e) if e.is_retryable())
    }
}
