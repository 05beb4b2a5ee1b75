pub mod event;

use std::path::Path;
use std::time::Duration;

use notify::RecursiveMode;
use notify_debouncer_mini::{DebounceEventResult, new_debouncer};
use tokio::sync::mpsc as tokio_mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use event::WatchEvent;

/// Handle to a running watcher. Keeps the debouncer alive (dropping stops watching).
pub struct WatcherHandle {
    /// Keep alive: dropping the debouncer stops the OS watcher, which ends the bridge task.
    _debouncer: notify_debouncer_mini::Debouncer<notify::RecommendedWatcher>,
    _bridge_task: JoinHandle<()>,
}

/// Debounce window for filesystem events.
const DEBOUNCE: Duration = Duration::from_millis(75);

/// Capacity of the classified event channel.
const EVENT_CAPACITY: usize = 256;

/// Start a debounced watcher on a single document file.
///
/// The file's parent directory is watched non-recursively so that the file can be
/// created, replaced by rename, or deleted while watched. Must be called from within
/// a tokio runtime.
///
/// Returns a `WatcherHandle` (must be kept alive) and a tokio mpsc receiver that yields
/// at most one classified `WatchEvent` per debounced batch.
pub fn start_watcher(
    document_file: &Path,
) -> Result<(WatcherHandle, tokio_mpsc::Receiver<WatchEvent>), notify::Error> {
    let watch_dir = document_file
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or(Path::new("."))
        .to_path_buf();

    let (std_tx, std_rx) = std::sync::mpsc::channel::<DebounceEventResult>();

    let mut debouncer = new_debouncer(DEBOUNCE, move |res| {
        let _ = std_tx.send(res);
    })?;
    debouncer
        .watcher()
        .watch(&watch_dir, RecursiveMode::NonRecursive)?;

    let (tokio_tx, tokio_rx) = tokio_mpsc::channel::<WatchEvent>(EVENT_CAPACITY);

    // Bridge: receive from the std channel on a blocking thread, classify, forward to tokio.
    let target = document_file.to_path_buf();
    let bridge_task = tokio::task::spawn_blocking(move || {
        while let Ok(result) = std_rx.recv() {
            let event = match result {
                Ok(events) => {
                    let touched = events
                        .iter()
                        .any(|debounced| is_document_event(&debounced.path, &target));
                    if !touched {
                        continue;
                    }
                    classify_document(&target)
                }
                Err(err) => {
                    warn!(error = ?err, "file watcher error");
                    WatchEvent::Failed(err.to_string())
                }
            };
            debug!(?event, "document file event");
            if tokio_tx.blocking_send(event).is_err() {
                return; // receiver dropped, shutdown
            }
        }
    });

    Ok((
        WatcherHandle {
            _debouncer: debouncer,
            _bridge_task: bridge_task,
        },
        tokio_rx,
    ))
}

/// Whether a raw event path refers to the watched document.
///
/// Only the file name is compared: the directory is watched non-recursively, and the
/// OS may report the directory under a different (canonical) prefix.
fn is_document_event(path: &Path, target: &Path) -> bool {
    match (path.file_name(), target.file_name()) {
        (Some(seen), Some(wanted)) => seen == wanted,
        _ => false,
    }
}

/// Classify the document's current state after a change.
fn classify_document(target: &Path) -> WatchEvent {
    if target.exists() {
        WatchEvent::Changed(target.to_path_buf())
    } else {
        WatchEvent::Removed
    }
}
