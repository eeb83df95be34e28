//! Tree walker: expands selection roots into a flat, path-addressed set of
//! archive entries.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures_util::TryStreamExt;
use futures_util::future::try_join_all;
use tracing::debug;

use crate::TransferError;
use crate::entry::{BoxFuture, DirectoryHandle, Entry, FileHandle};
use crate::validation::validate_entry_path;

/// One entry of an archive.
#[derive(Debug, Clone)]
pub enum ArchiveEntry {
    File { path: String, file: FileHandle },
    /// Path always ends with `/`.
    Directory { path: String },
}

impl ArchiveEntry {
    pub fn path(&self) -> &str {
        match self {
            ArchiveEntry::File { path, .. } | ArchiveEntry::Directory { path } => path,
        }
    }
}

/// Entries collected during one aggregation pass, in insertion order.
#[derive(Debug, Default)]
pub struct EntrySet {
    entries: Vec<ArchiveEntry>,
    index: HashMap<String, usize>,
}

impl EntrySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file under `path`. A file already present under the same path
    /// is replaced in place.
    pub fn add_file(&mut self, path: &str, file: FileHandle) -> Result<(), TransferError> {
        validate_entry_path(path)?;
        let entry = ArchiveEntry::File {
            path: path.to_string(),
            file,
        };
        match self.index.get(path) {
            Some(&pos) => {
                debug!(path, "replacing duplicate archive entry");
                self.entries[pos] = entry;
            }
            None => {
                self.index.insert(path.to_string(), self.entries.len());
                self.entries.push(entry);
            }
        }
        Ok(())
    }

    /// Adds a directory entry. Duplicates are ignored.
    pub fn add_directory(&mut self, path: &str) -> Result<(), TransferError> {
        let path = format!("{}/", path.trim_end_matches('/'));
        validate_entry_path(&path)?;
        if !self.index.contains_key(&path) {
            self.index.insert(path.clone(), self.entries.len());
            self.entries.push(ArchiveEntry::Directory { path });
        }
        Ok(())
    }

    /// Number of file entries. Directory entries do not count.
    pub fn file_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, ArchiveEntry::File { .. }))
            .count()
    }

    /// Sum of all file sizes.
    pub fn total_bytes(&self) -> u64 {
        self.entries
            .iter()
            .map(|e| match e {
                ArchiveEntry::File { file, .. } => file.size(),
                ArchiveEntry::Directory { .. } => 0,
            })
            .sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<ArchiveEntry> {
        self.entries
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}

/// Walks `dir` into `set` under `prefix/<dir name>/`.
///
/// The directory's enumeration is drained completely before its children are
/// processed; sibling subdirectories are then walked concurrently.
pub fn walk_directory(
    dir: DirectoryHandle,
    prefix: String,
    set: Arc<Mutex<EntrySet>>,
) -> BoxFuture<'static, Result<(), TransferError>> {
    Box::pin(async move {
        let path = join_path(&prefix, dir.name());
        set.lock().unwrap().add_directory(&path)?;

        let children: Vec<Entry> = dir.entries().try_collect().await?;
        debug!(path = %path, children = children.len(), "directory read");

        let mut subdirs = Vec::new();
        for child in children {
            match child {
                Entry::File(file) => {
                    let file_path = join_path(&path, file.name());
                    set.lock().unwrap().add_file(&file_path, file)?;
                }
                Entry::Directory(sub) => {
                    subdirs.push(walk_directory(sub, path.clone(), Arc::clone(&set)));
                }
            }
        }

        try_join_all(subdirs).await?;
        Ok(())
    })
}

/// Expands selection roots into an [`EntrySet`].
///
/// Root files go under their relative path when they have one, else under
/// their name. Root directories are walked.
pub async fn collect_entries(roots: Vec<Entry>) -> Result<EntrySet, TransferError> {
    let set = Arc::new(Mutex::new(EntrySet::new()));

    let mut walks = Vec::new();
    for root in roots {
        match root {
            Entry::File(file) => {
                let path = file
                    .relative_path()
                    .unwrap_or_else(|| file.name())
                    .to_string();
                set.lock().unwrap().add_file(&path, file)?;
            }
            Entry::Directory(dir) => {
                walks.push(walk_directory(dir, String::new(), Arc::clone(&set)));
            }
        }
    }
    try_join_all(walks).await?;

    let mutex = Arc::try_unwrap(set)
        .map_err(|_| TransferError::Task("entry set still shared after walk".into()))?;
    Ok(mutex.into_inner().unwrap())
}
