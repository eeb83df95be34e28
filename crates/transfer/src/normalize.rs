//! Raw input shapes to a resolved [`Selection`].

use std::path::Path;

use tracing::debug;

use crate::entry::{Entry, FileHandle};

/// Kind reported for a clipboard item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipboardKind {
    File,
    String,
}

/// One item of a paste payload.
#[derive(Debug, Clone)]
pub struct ClipboardItem {
    pub kind: ClipboardKind,
    /// The item may not resolve to a filesystem entry.
    pub entry: Option<Entry>,
}

impl ClipboardItem {
    pub fn file(entry: Entry) -> Self {
        Self {
            kind: ClipboardKind::File,
            entry: Some(entry),
        }
    }

    pub fn text() -> Self {
        Self {
            kind: ClipboardKind::String,
            entry: None,
        }
    }
}

/// The three input shapes a send can start from.
#[derive(Debug, Clone)]
pub enum RawSelection {
    /// File picker result (possibly a folder picker, with relative paths).
    Picked(Vec<FileHandle>),
    /// Drag-and-drop items; an item may fail to resolve to an entry.
    Dropped(Vec<Option<Entry>>),
    /// Paste payload.
    Clipboard(Vec<ClipboardItem>),
}

impl RawSelection {
    /// Builds a drop payload from filesystem paths. Paths that cannot be
    /// stat'ed become unresolved items.
    pub async fn dropped_paths<P: AsRef<Path>>(paths: &[P]) -> Self {
        let mut items = Vec::with_capacity(paths.len());
        for path in paths {
            match Entry::from_path(path).await {
                Ok(entry) => items.push(Some(entry)),
                Err(e) => {
                    debug!(path = %path.as_ref().display(), error = %e, "unresolved drop item");
                    items.push(None);
                }
            }
        }
        RawSelection::Dropped(items)
    }
}

/// How an archive built from a tree selection gets its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveNaming {
    /// A single dropped or pasted directory.
    Directory(String),
    /// Folder-picker listing; carries the folder segment of the first file.
    FolderPicker(String),
    /// Anything else; named from the wall clock.
    Loose,
}

/// Selection resolved once per aggregation pass.
#[derive(Debug, Clone)]
pub enum Selection {
    Empty,
    SingleFile(FileHandle),
    Tree {
        roots: Vec<Entry>,
        naming: ArchiveNaming,
    },
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        matches!(self, Selection::Empty)
    }
}

/// Normalizer output.
#[derive(Debug, Clone)]
pub struct Normalized {
    pub selection: Selection,
    /// The caller must suppress the default paste behavior.
    pub suppress_default: bool,
}

/// Converts a raw input shape into a [`Selection`], preserving order.
pub fn normalize(raw: RawSelection) -> Normalized {
    match raw {
        RawSelection::Picked(files) => Normalized {
            selection: resolve_picked(files),
            suppress_default: false,
        },
        RawSelection::Dropped(items) => Normalized {
            selection: resolve_entries(items.into_iter().flatten().collect()),
            suppress_default: false,
        },
        RawSelection::Clipboard(items) => {
            let roots: Vec<Entry> = items
                .into_iter()
                .filter(|item| item.kind == ClipboardKind::File)
                .filter_map(|item| item.entry)
                .collect();
            Normalized {
                suppress_default: !roots.is_empty(),
                selection: resolve_entries(roots),
            }
        }
    }
}

fn resolve_picked(files: Vec<FileHandle>) -> Selection {
    let Some(first) = files.first() else {
        return Selection::Empty;
    };

    let folder = first.relative_path().and_then(folder_segment);
    if files.len() == 1 && first.relative_path().is_none() {
        return files
            .into_iter()
            .next()
            .map_or(Selection::Empty, Selection::SingleFile);
    }

    Selection::Tree {
        naming: folder.map_or(ArchiveNaming::Loose, ArchiveNaming::FolderPicker),
        roots: files.into_iter().map(Entry::File).collect(),
    }
}

fn resolve_entries(mut roots: Vec<Entry>) -> Selection {
    match roots.len() {
        0 => Selection::Empty,
        1 => match roots.remove(0) {
            Entry::File(file) => Selection::SingleFile(file),
            Entry::Directory(dir) => Selection::Tree {
                naming: ArchiveNaming::Directory(dir.name().to_string()),
                roots: vec![Entry::Directory(dir)],
            },
        },
        _ => Selection::Tree {
            roots,
            naming: ArchiveNaming::Loose,
        },
    }
}

/// Second-to-last segment of a relative path with more than one segment.
fn folder_segment(relative_path: &str) -> Option<String> {
    let segments: Vec<&str> = relative_path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.len() > 1 {
        Some(segments[segments.len() - 2].to_string())
    } else {
        None
    }
}
