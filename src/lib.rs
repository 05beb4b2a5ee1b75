pub mod audio;
pub mod config;
pub mod controller;
pub mod diff;
pub mod error;
pub mod notification;
pub mod output;
pub mod snapshot;
pub mod store;
pub mod telemetry;
pub mod watcher;

pub use config::WatchConfig;
pub use controller::{ControllerHandle, Platform, WidgetState, spawn};
pub use error::{ControlError, StoreError};
pub use snapshot::{DocumentPath, Snapshot, SnapshotEvent};
