use std::path::{Path, PathBuf};

use tokio::sync::mpsc;
use tracing::debug;

use super::{DocumentStore, FEED_CAPACITY, Subscription};
use crate::error::StoreError;
use crate::snapshot::{DocumentPath, Snapshot, SnapshotEvent};
use crate::watcher::event::WatchEvent;
use crate::watcher::start_watcher;

/// A document store backed by JSON files: `<root>/<collection>/<document>.json`.
///
/// Subscriptions watch the document file and re-deliver it whenever it changes.
#[derive(Debug, Clone)]
pub struct FileDocumentStore {
    root: PathBuf,
}

impl FileDocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// File holding the document at `path`.
    pub fn document_file(&self, path: &DocumentPath) -> PathBuf {
        self.root
            .join(path.collection())
            .join(format!("{}.json", path.document()))
    }

    /// One-shot read of the document at `path`.
    pub fn read(&self, path: &DocumentPath) -> Result<Snapshot, StoreError> {
        load_snapshot(&self.document_file(path))
    }
}

/// Read a document file. A missing file is an absent document.
fn load_snapshot(file: &Path) -> Result<Snapshot, StoreError> {
    let contents = match std::fs::read_to_string(file) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Snapshot::Absent),
        Err(err) => return Err(err.into()),
    };
    let value: serde_json::Value = serde_json::from_str(&contents)?;
    Snapshot::from_json(value)
}

fn load_event(file: &Path) -> SnapshotEvent {
    match load_snapshot(file) {
        Ok(snapshot) => SnapshotEvent::Snapshot(snapshot),
        Err(err) => SnapshotEvent::Error(err),
    }
}

impl DocumentStore for FileDocumentStore {
    /// Must be called from within a tokio runtime.
    fn subscribe(&self, path: &DocumentPath) -> Result<Subscription, StoreError> {
        let file = self.document_file(path);
        if let Some(dir) = file.parent() {
            std::fs::create_dir_all(dir)?;
        }

        let (tx, rx) = mpsc::channel(FEED_CAPACITY);
        let (handle, mut events) = start_watcher(&file)?;
        let _ = tx.try_send(load_event(&file));

        let forward = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let delivered = match event {
                    WatchEvent::Changed(changed) => load_event(&changed),
                    WatchEvent::Removed => SnapshotEvent::Snapshot(Snapshot::Absent),
                    WatchEvent::Failed(message) => {
                        SnapshotEvent::Error(StoreError::Subscription(message))
                    }
                };
                if tx.send(delivered).await.is_err() {
                    return;
                }
            }
        });

        debug!(file = %file.display(), "subscribed to document file");
        Ok(Subscription::new(path.clone(), rx, move || {
            forward.abort();
            drop(handle);
        }))
    }
}
