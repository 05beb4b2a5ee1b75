use thiserror::Error;

/// Failures of the document store and the local key-value store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The live feed reported an error. The message is surfaced to the operator.
    #[error("subscription error: {0}")]
    Subscription(String),

    /// A document exists but its top level is not a field map.
    #[error("malformed document: {0}")]
    Malformed(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to persist state file: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error("file watcher error: {0}")]
    Watch(#[from] notify::Error),
}

/// The platform cannot synthesize a tone; callers fall back to bell signals.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AudioError {
    #[error("tone synthesis unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotificationError {
    #[error("notifications unsupported: {0}")]
    Unsupported(String),
}

/// Errors returned to the presentation layer by controller operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    #[error("notification permission was denied")]
    PermissionDenied,

    #[error("notifications are not supported here: {0}")]
    NotificationsUnsupported(String),

    #[error("a permission request is already in progress")]
    Busy,

    #[error("failed to persist background mode: {0}")]
    Persist(String),

    #[error("the watcher has stopped")]
    Closed,
}
