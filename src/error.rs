use thiserror::Error;

/// Failures reported by a messaging backend.
///
/// Backends translate their native error codes into these variants so the
/// provisioning layer can classify them without knowing the wire protocol.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The resource being created already exists.
    #[error("resource already exists: {0}")]
    AlreadyExists(String),

    /// The resource addressed by the call does not exist.
    #[error("resource not found: {0}")]
    NotFound(String),

    /// Credentials were rejected or lack the required permission.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The backend refused the call because a quota was exhausted.
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    /// The backend is temporarily unreachable or overloaded.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// Any other transport-level failure.
    #[error("transport error: {0}")]
    Transport(String),
}

impl BackendError {
    /// True when the failure says the resource is already there.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, BackendError::AlreadyExists(_))
    }

    /// True for failures of the connection or the caller's standing with
    /// the backend (network, auth, quota) rather than of the call itself.
    ///
    /// These are propagated as [`MessengerError::Backend`] whichever
    /// operation hit them.
    pub fn is_transport_level(&self) -> bool {
        matches!(
            self,
            BackendError::PermissionDenied(_)
                | BackendError::QuotaExceeded(_)
                | BackendError::Unavailable(_)
                | BackendError::Transport(_)
        )
    }
}

/// Errors returned by messenger and provisioning operations.
#[derive(Error, Debug)]
pub enum MessengerError {
    /// The named topic does not exist. Topics are never created by this
    /// crate and must be provisioned out of band.
    #[error(
        "topic '{topic}' does not exist, any published messages will be lost; \
         please create the topic manually"
    )]
    TopicNotFound { topic: String },

    /// The backend rejected the creation of a missing subscription itself,
    /// e.g. because the topic disappeared in the meantime. Transport-level
    /// failures during creation surface as [`MessengerError::Backend`].
    #[error("failed to create subscription '{subscription}' on topic '{topic}': {source}")]
    SubscriptionCreation {
        topic: String,
        subscription: String,
        #[source]
        source: BackendError,
    },

    /// Transport-level backend failure (network, auth, quota) during an
    /// existence probe, subscription creation, or publish, unchanged.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Messenger configuration was rejected at build time.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl MessengerError {
    /// Whether retrying the same call later could succeed.
    ///
    /// Only transient backend failures (unavailable, quota, transport) are
    /// retryable. Everything else, including a rejected subscription
    /// creation, is fatal. The messenger itself does not retry; this is a
    /// hint for callers that own a retry policy.
    pub fn is_retryable(&self) -> bool {
        // ---
        match self {
            MessengerError::Backend(err) => matches!(
                err,
                BackendError::Unavailable(_)
                    | BackendError::QuotaExceeded(_)
                    | BackendError::Transport(_)
            ),
            MessengerError::SubscriptionCreation { .. }
            | MessengerError::TopicNotFound { .. }
            | MessengerError::InvalidConfig(_) => false,
        }
    }
}

/// Result type alias for messenger operations
pub type Result<T> = std::result::Result<T, MessengerError>;

/// Result type alias for backend calls
pub type BackendResult<T> = std::result::Result<T, BackendError>;
