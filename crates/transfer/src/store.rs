use std::collections::HashMap;
use std::sync::RwLock;

use rand::Rng;
use tracing::debug;

use crate::entry::FileHandle;

const FILE_ID_LEN: usize = 9;
const FILE_ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Returns a random 9-character lowercase alphanumeric file id.
pub fn generate_file_id() -> String {
    let mut rng = rand::thread_rng();
    (0..FILE_ID_LEN)
        .map(|_| FILE_ID_ALPHABET[rng.gen_range(0..FILE_ID_ALPHABET.len())] as char)
        .collect()
}

/// Files this client has offered in the current chat session, by file id.
#[derive(Debug, Default)]
pub struct SharedFileStore {
    files: RwLock<HashMap<String, FileHandle>>,
}

impl SharedFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `file` under a fresh id and returns the id.
    pub fn register(&self, file: FileHandle) -> String {
        let mut map = self.files.write().unwrap();
        let mut id = generate_file_id();
        while map.contains_key(&id) {
            id = generate_file_id();
        }
        debug!(file_id = %id, name = file.name(), "registered shared file");
        map.insert(id.clone(), file);
        id
    }

    pub fn get(&self, file_id: &str) -> Option<FileHandle> {
        self.files.read().unwrap().get(file_id).cloned()
    }

    pub fn remove(&self, file_id: &str) -> Option<FileHandle> {
        self.files.write().unwrap().remove(file_id)
    }

    pub fn len(&self) -> usize {
        self.files.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every registered file, releasing spooled archives.
    pub fn clear(&self) {
        self.files.write().unwrap().clear();
    }
}
