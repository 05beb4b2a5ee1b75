use std::path::PathBuf;

/// Watch events for a single document file, after classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// The document file was written (created or modified).
    Changed(PathBuf),
    /// The document file no longer exists.
    Removed,
    /// The OS watcher reported an error.
    Failed(String),
}
