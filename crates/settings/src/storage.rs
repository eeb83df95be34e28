//! Key-value storage for client-local state.
//!
//! Values are plain strings, the way a browser's local storage holds them.
//! [`JsonFileStore`] keeps them in memory and persists to a JSON file;
//! [`MemoryStore`] is the in-process variant.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use rand::Rng;
use tracing::{debug, warn};

/// Key under which the persistent session id is stored.
pub const KEY_SESSION_ID: &str = "zher_uid";
/// Key under which the dark mode flag is stored.
pub const KEY_DARK_MODE: &str = "zher_dark_mode";

/// Errors from storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// String key-value storage.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Storage persisted to a JSON object on disk.
pub struct JsonFileStore {
    path: PathBuf,
    values: RwLock<HashMap<String, String>>,
}

impl JsonFileStore {
    /// Opens the store, loading existing values from disk. An unparsable
    /// file is logged and replaced on the next write.
    pub fn open(path: PathBuf) -> Result<Self, StorageError> {
        let values = load_values(&path)?;
        Ok(Self {
            path,
            values: RwLock::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the current values to disk through a temp file and a rename,
    /// so a crash mid-write leaves the previous file intact.
    fn persist(&self) -> Result<(), StorageError> {
        let map = self.values.read().unwrap();
        let json = serde_json::to_string_pretty(&*map)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!("persisted {} value(s) to {:?}", map.len(), self.path);
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.read().unwrap().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        {
            let mut map = self.values.write().unwrap();
            map.insert(key.to_string(), value.to_string());
        }
        self.persist()
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        {
            let mut map = self.values.write().unwrap();
            if map.remove(key).is_none() {
                return Ok(());
            }
        }
        self.persist()
    }
}

/// Loads values from a JSON file on disk.
fn load_values(path: &Path) -> Result<HashMap<String, String>, StorageError> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let data = std::fs::read_to_string(path)?;
    match serde_json::from_str::<HashMap<String, String>>(&data) {
        Ok(values) => {
            debug!("loaded {} value(s) from {:?}", values.len(), path);
            Ok(values)
        }
        Err(e) => {
            warn!("ignoring unparsable storage file {:?}: {e}", path);
            Ok(HashMap::new())
        }
    }
}

/// Storage that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.read().unwrap().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.values
            .write()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.values.write().unwrap().remove(key);
        Ok(())
    }
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".into();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

/// Generates a fresh session id: random base36 followed by the current time
/// in base36 milliseconds.
pub fn generate_session_id() -> String {
    let random: u64 = rand::thread_rng().gen_range(36u64.pow(9)..36u64.pow(11));
    let millis = u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default();
    format!("{}{}", to_base36(random), to_base36(millis))
}

/// Returns the stored session id, creating and storing one on first use.
pub fn session_id(store: &dyn KeyValueStore) -> Result<String, StorageError> {
    if let Some(id) = store.get(KEY_SESSION_ID).filter(|id| !id.is_empty()) {
        return Ok(id);
    }
    let id = generate_session_id();
    store.set(KEY_SESSION_ID, &id)?;
    debug!(session_id = %id, "created session id");
    Ok(id)
}
