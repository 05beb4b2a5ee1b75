use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tracing::warn;

use super::{DocumentStore, FEED_CAPACITY, KeyValueStore, Subscription};
use crate::error::StoreError;
use crate::snapshot::{DocumentPath, Snapshot, SnapshotEvent};

#[derive(Default)]
struct Feeds {
    documents: HashMap<DocumentPath, Snapshot>,
    subscribers: HashMap<DocumentPath, Vec<(u64, mpsc::Sender<SnapshotEvent>)>>,
    next_id: u64,
    releases: usize,
}

/// An in-process document store whose feeds are driven by `publish` calls.
#[derive(Clone, Default)]
pub struct MemoryDocumentStore {
    feeds: Arc<Mutex<Feeds>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Feeds> {
        self.feeds.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace the document at `path` and deliver the new state to every subscriber.
    pub fn publish(&self, path: &DocumentPath, snapshot: Snapshot) {
        let mut feeds = self.lock();
        feeds.documents.insert(path.clone(), snapshot.clone());
        if let Some(subscribers) = feeds.subscribers.get(path) {
            for (id, tx) in subscribers {
                if tx.try_send(SnapshotEvent::Snapshot(snapshot.clone())).is_err() {
                    warn!(subscriber = id, %path, "dropping snapshot for a full or closed feed");
                }
            }
        }
    }

    /// Convenience for publishing a document whose `field` holds `identifiers`.
    pub fn publish_identifiers(&self, path: &DocumentPath, field: &str, identifiers: &[&str]) {
        let mut fields = serde_json::Map::new();
        fields.insert(field.to_owned(), serde_json::json!(identifiers));
        self.publish(path, Snapshot::Exists(fields));
    }

    /// Deliver a subscription error to every subscriber of `path`.
    pub fn publish_error(&self, path: &DocumentPath, message: &str) {
        let feeds = self.lock();
        if let Some(subscribers) = feeds.subscribers.get(path) {
            for (_, tx) in subscribers {
                let _ = tx.try_send(SnapshotEvent::Error(StoreError::Subscription(
                    message.to_owned(),
                )));
            }
        }
    }

    /// Number of live subscriptions on `path`.
    pub fn subscriber_count(&self, path: &DocumentPath) -> usize {
        self.lock().subscribers.get(path).map_or(0, Vec::len)
    }

    /// Total number of releases performed across all subscriptions.
    pub fn release_count(&self) -> usize {
        self.lock().releases
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn subscribe(&self, path: &DocumentPath) -> Result<Subscription, StoreError> {
        let (tx, rx) = mpsc::channel(FEED_CAPACITY);
        let id = {
            let mut feeds = self.lock();
            let current = feeds.documents.get(path).cloned().unwrap_or(Snapshot::Absent);
            // Live listeners start with the current state of the document.
            let _ = tx.try_send(SnapshotEvent::Snapshot(current));
            let id = feeds.next_id;
            feeds.next_id += 1;
            feeds.subscribers.entry(path.clone()).or_default().push((id, tx));
            id
        };

        let store = self.clone();
        let key = path.clone();
        Ok(Subscription::new(path.clone(), rx, move || {
            let mut feeds = store.lock();
            feeds.releases += 1;
            if let Some(subscribers) = feeds.subscribers.get_mut(&key) {
                subscribers.retain(|(sub_id, _)| *sub_id != id);
            }
        }))
    }
}

/// An in-process key-value store. Clones share the same map.
#[derive(Clone, Default, Debug)]
pub struct MemoryKeyValueStore {
    values: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.values.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.lock().insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.lock().remove(key);
        Ok(())
    }
}
