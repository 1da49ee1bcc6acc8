//! Error types shared by the directory-sync provider crates.

/// Result type alias used across `dirsync-core` and its dependents.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Error taxonomy for the replication provider (spec §7).
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Malformed synchronization control or cookie.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Collaborator reported the caller is not authenticated.
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    /// Collaborator reported insufficient access for the requested entry/attribute.
    #[error("insufficient access: {0}")]
    InsufficientAccess(String),

    /// A search base or affected entry no longer resolves.
    #[error("not found: {resource} {id}")]
    NotFound { resource: String, id: String },

    /// Store reported it is busy; caller may retry with backoff.
    #[error("store busy: {0}")]
    Busy(String),

    /// Store reported a transient lock conflict; caller may retry with backoff.
    #[error("lock retry: {0}")]
    LockRetry(String),

    /// The consumer's cookie CSN is no longer representable; it must refresh from empty.
    #[error("stale cookie: {0}")]
    StaleCookie(String),

    /// Configuration could not be parsed or loaded.
    #[error("configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO failure (configuration file, WAL, etc).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding failures and assertion violations; surfaces as `LDAP_OTHER`.
    #[error("internal error: {0}")]
    Internal(String),

    /// Wrapped collaborator errors that do not fit a more specific variant.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CoreError {
    /// Build a [`CoreError::Protocol`] error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Build a [`CoreError::InvalidCredentials`] error.
    pub fn invalid_credentials(msg: impl Into<String>) -> Self {
        Self::InvalidCredentials(msg.into())
    }

    /// Build a [`CoreError::InsufficientAccess`] error.
    pub fn insufficient_access(msg: impl Into<String>) -> Self {
        Self::InsufficientAccess(msg.into())
    }

    /// Build a [`CoreError::NotFound`] error.
    pub fn not_found(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    /// Build a [`CoreError::Busy`] error.
    pub fn busy(msg: impl Into<String>) -> Self {
        Self::Busy(msg.into())
    }

    /// Build a [`CoreError::LockRetry`] error.
    pub fn lock_retry(msg: impl Into<String>) -> Self {
        Self::LockRetry(msg.into())
    }

    /// Build a [`CoreError::StaleCookie`] error.
    pub fn stale_cookie(msg: impl Into<String>) -> Self {
        Self::StaleCookie(msg.into())
    }

    /// Build a [`CoreError::Config`] error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Build a [`CoreError::Internal`] error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// True if this error means the caller should retry with backoff (spec §7: `BUSY`/`LOCK_RETRY`).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy(_) | Self::LockRetry(_))
    }

    /// True if this error terminates only the affected session, not the whole request.
    pub fn is_session_scoped(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::StaleCookie(_))
    }
}
