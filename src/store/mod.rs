pub mod file_document;
pub mod file_kv;
pub mod memory;

use tokio::sync::mpsc;

use crate::error::StoreError;
use crate::snapshot::{DocumentPath, SnapshotEvent};

pub use file_document::FileDocumentStore;
pub use file_kv::FileKeyValueStore;
pub use memory::{MemoryDocumentStore, MemoryKeyValueStore};

/// Capacity of a subscription's snapshot queue.
pub const FEED_CAPACITY: usize = 256;

/// Key under which the background-mode flag is persisted.
pub const BACKGROUND_MODE_KEY: &str = "uidWatch.backgroundMode";

type ReleaseFn = Box<dyn FnOnce() + Send>;

/// A live feed of snapshots for one document.
///
/// Events arrive in delivery order. Releasing stops the feed at the store; release runs
/// at most once, whether called explicitly or on drop.
pub struct Subscription {
    path: DocumentPath,
    events: mpsc::Receiver<SnapshotEvent>,
    release: Option<ReleaseFn>,
}

impl Subscription {
    pub fn new(
        path: DocumentPath,
        events: mpsc::Receiver<SnapshotEvent>,
        release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            path,
            events,
            release: Some(Box::new(release)),
        }
    }

    pub fn path(&self) -> &DocumentPath {
        &self.path
    }

    /// Wait for the next event. Returns `None` once released or when the store closes the feed.
    pub async fn next(&mut self) -> Option<SnapshotEvent> {
        if self.release.is_none() {
            return None;
        }
        self.events.recv().await
    }

    /// Release the feed. Returns `false` if it was already released.
    pub fn release(&mut self) -> bool {
        match self.release.take() {
            Some(release) => {
                self.events.close();
                release();
                true
            }
            None => false,
        }
    }

    pub fn is_released(&self) -> bool {
        self.release.is_none()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

/// A remote document store offering live subscriptions.
pub trait DocumentStore: Send + Sync {
    /// Open a live feed on `path`. The first event is the document's current state.
    fn subscribe(&self, path: &DocumentPath) -> Result<Subscription, StoreError>;
}

/// A small persistent string store (the local-storage port).
pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&mut self, key: &str) -> Result<(), StoreError>;
}
