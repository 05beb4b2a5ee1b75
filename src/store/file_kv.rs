use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::warn;

use super::KeyValueStore;
use crate::error::StoreError;

/// Current state file format version. Bump when the envelope layout changes.
pub const STATE_VERSION: u32 = 1;

/// State directory name (created in the watched root).
pub const STATE_DIR: &str = ".uid-watch";
/// State file name within STATE_DIR.
pub const STATE_FILE: &str = "state.json";

/// Envelope wrapping the stored values with a format version.
#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
struct StateEnvelope {
    version: u32,
    values: BTreeMap<String, String>,
}

/// Build the state file path for a watched root: `<root>/.uid-watch/state.json`
pub fn state_path(root: &Path) -> PathBuf {
    root.join(STATE_DIR).join(STATE_FILE)
}

/// A key-value store persisted as a JSON file. Every write replaces the file atomically.
#[derive(Debug)]
pub struct FileKeyValueStore {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl FileKeyValueStore {
    /// Open the store at `path`. A missing file is an empty store. A corrupt file or a
    /// version mismatch is logged and treated as empty; the next write replaces it.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = match load_state(&path) {
            Ok(Some(values)) => values,
            Ok(None) => BTreeMap::new(),
            Err(err) => {
                warn!(path = %path.display(), %err, "ignoring unreadable state file");
                BTreeMap::new()
            }
        };
        Self { path, values }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the values to disk: temp file in the same directory, then rename.
    fn save(&self) -> Result<(), StoreError> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let envelope = StateEnvelope {
            version: STATE_VERSION,
            values: self.values.clone(),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut tmp, &envelope)?;
        tmp.as_file().flush()?;
        tmp.persist(&self.path)?;
        Ok(())
    }
}

/// Read the state file. `Ok(None)` if it does not exist or has another version.
fn load_state(path: &Path) -> Result<Option<BTreeMap<String, String>>, StoreError> {
    if !path.exists() {
        return Ok(None);
    }
    let bytes = std::fs::read(path)?;
    let envelope: StateEnvelope = serde_json::from_slice(&bytes)?;
    if envelope.version != STATE_VERSION {
        warn!(
            path = %path.display(),
            found = envelope.version,
            expected = STATE_VERSION,
            "state file version mismatch, starting empty"
        );
        return Ok(None);
    }
    Ok(Some(envelope.values))
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.values.insert(key.to_owned(), value.to_owned());
        self.save()
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        if self.values.remove(key).is_some() {
            self.save()?;
        }
        Ok(())
    }
}
