//! File and directory handles.
//!
//! A [`FileHandle`] is an immutable reference to one file's bytes, either on
//! disk or in memory. A [`DirectoryHandle`] enumerates its children through a
//! [`BatchReader`], the way browser directory entries hand out children in
//! batches until an empty batch signals exhaustion.

use std::collections::VecDeque;
use std::future::Future;
use std::io::{Read, SeekFrom};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use futures_util::stream::{self, BoxStream, StreamExt, TryStreamExt};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt};
use tracing::debug;

use crate::archive::SpooledFile;
use crate::range::ByteRange;
use crate::{DIRECTORY_BATCH_SIZE, TransferError};

/// Boxed future used at the trait seams of this crate.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Async reader over a byte range of a file.
pub type RangeReader = Box<dyn AsyncRead + Send + Sync + Unpin>;

// ---------------------------------------------------------------------------
// FileHandle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum FileSource {
    Path(PathBuf),
    Memory(Arc<[u8]>),
}

/// Reference to a single file.
#[derive(Debug, Clone)]
pub struct FileHandle {
    name: String,
    size: u64,
    relative_path: Option<String>,
    content_type: String,
    source: FileSource,
    /// Keeps a spooled archive on disk for as long as any clone is alive.
    _spool: Option<Arc<SpooledFile>>,
}

impl FileHandle {
    /// Creates a handle over in-memory bytes.
    pub fn from_bytes(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        let name = name.into();
        let data: Arc<[u8]> = data.into().into();
        Self {
            content_type: detect_content_type(&name).unwrap_or_default().to_string(),
            size: data.len() as u64,
            name,
            relative_path: None,
            source: FileSource::Memory(data),
            _spool: None,
        }
    }

    /// Creates a handle for a regular file on disk.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, TransferError> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(TransferError::NotAFile(path.display().to_string()));
        }
        Ok(Self::from_path_with_size(path, metadata.len()))
    }

    /// Creates a handle for a file whose size is already known.
    pub(crate) fn from_path_with_size(path: &Path, size: u64) -> Self {
        let name = file_name_of(path);
        Self {
            content_type: detect_content_type(&name).unwrap_or_default().to_string(),
            name,
            size,
            relative_path: None,
            source: FileSource::Path(path.to_path_buf()),
            _spool: None,
        }
    }

    /// Creates a handle that owns a spooled temp file.
    pub(crate) fn from_spool(name: &str, size: u64, content_type: &str, spool: SpooledFile) -> Self {
        Self {
            name: name.to_string(),
            size,
            relative_path: None,
            content_type: content_type.to_string(),
            source: FileSource::Path(spool.path().to_path_buf()),
            _spool: Some(Arc::new(spool)),
        }
    }

    /// Attaches folder-picker metadata (`Folder/sub/file.txt`).
    ///
    /// An empty path is treated as no path.
    pub fn with_relative_path(mut self, relative_path: impl Into<String>) -> Self {
        let rel = relative_path.into().replace('\\', "/");
        self.relative_path = if rel.is_empty() { None } else { Some(rel) };
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Length in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Folder-picker relative path, if any.
    pub fn relative_path(&self) -> Option<&str> {
        self.relative_path.as_deref()
    }

    /// MIME type, empty when unknown.
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Path on disk, for handles backed by the filesystem.
    pub fn path(&self) -> Option<&Path> {
        match &self.source {
            FileSource::Path(p) => Some(p),
            FileSource::Memory(_) => None,
        }
    }

    /// Reads the whole content.
    pub async fn read_all(&self) -> Result<Vec<u8>, TransferError> {
        let mut reader = self.open_range(ByteRange::full(self.size)).await?;
        let mut buf = Vec::with_capacity(self.size as usize);
        reader.read_to_end(&mut buf).await?;
        Ok(buf)
    }

    /// Opens an async reader over `range` (clamped to the file size).
    pub async fn open_range(
        &self,
        range: ByteRange,
    ) -> Result<RangeReader, TransferError> {
        let range = range.clamp(self.size);
        match &self.source {
            FileSource::Path(path) => {
                let mut file = tokio::fs::File::open(path).await?;
                file.seek(SeekFrom::Start(range.start)).await?;
                Ok(Box::new(file.take(range.len())))
            }
            FileSource::Memory(data) => {
                let mut cursor = std::io::Cursor::new(Arc::clone(data));
                cursor.set_position(range.start);
                Ok(Box::new(AsyncReadExt::take(cursor, range.len())))
            }
        }
    }

    /// Opens a blocking reader over the whole content, for the zip writer.
    pub(crate) fn open_blocking(&self) -> Result<Box<dyn Read + Send>, TransferError> {
        match &self.source {
            FileSource::Path(path) => Ok(Box::new(std::fs::File::open(path)?)),
            FileSource::Memory(data) => Ok(Box::new(std::io::Cursor::new(Arc::clone(data)))),
        }
    }
}

// ---------------------------------------------------------------------------
// DirectoryHandle
// ---------------------------------------------------------------------------

/// Produces batch readers over one directory's immediate children.
///
/// Every call to [`open_reader`](Self::open_reader) starts a fresh
/// enumeration, which makes [`DirectoryHandle::entries`] restartable.
pub trait DirectorySource: Send + Sync {
    fn open_reader(&self) -> BoxFuture<'_, Result<Box<dyn BatchReader>, TransferError>>;
}

/// One in-progress enumeration of a directory.
pub trait BatchReader: Send {
    /// Returns the next batch of children. An empty batch means the
    /// enumeration is complete.
    fn read_batch(&mut self) -> BoxFuture<'_, Result<Vec<Entry>, TransferError>>;
}

/// Reference to a folder.
#[derive(Clone)]
pub struct DirectoryHandle {
    name: String,
    source: Arc<dyn DirectorySource>,
}

impl std::fmt::Debug for DirectoryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryHandle")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

enum ReaderState {
    Unopened(Arc<dyn DirectorySource>),
    Open(Box<dyn BatchReader>),
}

impl DirectoryHandle {
    pub fn new(name: impl Into<String>, source: impl DirectorySource + 'static) -> Self {
        Self {
            name: name.into(),
            source: Arc::new(source),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lazily enumerates the immediate children, batch by batch, until the
    /// reader returns an empty batch.
    pub fn entries(&self) -> BoxStream<'static, Result<Entry, TransferError>> {
        let batches = stream::try_unfold(
            ReaderState::Unopened(Arc::clone(&self.source)),
            |state| async move {
                let mut reader = match state {
                    ReaderState::Unopened(source) => source.open_reader().await?,
                    ReaderState::Open(reader) => reader,
                };
                let batch = reader.read_batch().await?;
                if batch.is_empty() {
                    Ok::<_, TransferError>(None)
                } else {
                    Ok(Some((batch, ReaderState::Open(reader))))
                }
            },
        );

        batches
            .map_ok(|batch| stream::iter(batch.into_iter().map(Ok)))
            .try_flatten()
            .boxed()
    }
}

/// A file or directory handle.
#[derive(Debug, Clone)]
pub enum Entry {
    File(FileHandle),
    Directory(DirectoryHandle),
}

impl Entry {
    /// Stats `path` and returns a file or directory entry for it.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, TransferError> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await?;
        if metadata.is_dir() {
            Ok(Entry::Directory(DirectoryHandle::new(
                file_name_of(path),
                FsDirectory::new(path),
            )))
        } else if metadata.is_file() {
            Ok(Entry::File(FileHandle::from_path_with_size(path, metadata.len())))
        } else {
            Err(TransferError::NotAFile(path.display().to_string()))
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Entry::File(f) => f.name(),
            Entry::Directory(d) => d.name(),
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Entry::File(_))
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, Entry::Directory(_))
    }
}

// ---------------------------------------------------------------------------
// Filesystem directories
// ---------------------------------------------------------------------------

/// Directory backed by `tokio::fs::read_dir`.
#[derive(Debug, Clone)]
pub struct FsDirectory {
    path: PathBuf,
    batch_size: usize,
}

impl FsDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            batch_size: DIRECTORY_BATCH_SIZE,
        }
    }

    /// Sets the number of children returned per batch (minimum 1).
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

impl DirectorySource for FsDirectory {
    fn open_reader(&self) -> BoxFuture<'_, Result<Box<dyn BatchReader>, TransferError>> {
        Box::pin(async move {
            let read_dir = tokio::fs::read_dir(&self.path).await?;
            Ok(Box::new(FsBatchReader {
                read_dir,
                batch_size: self.batch_size,
            }) as Box<dyn BatchReader>)
        })
    }
}

struct FsBatchReader {
    read_dir: tokio::fs::ReadDir,
    batch_size: usize,
}

impl BatchReader for FsBatchReader {
    fn read_batch(&mut self) -> BoxFuture<'_, Result<Vec<Entry>, TransferError>> {
        Box::pin(async move {
            let mut batch = Vec::with_capacity(self.batch_size);
            while batch.len() < self.batch_size {
                let Some(dir_entry) = self.read_dir.next_entry().await? else {
                    break;
                };
                let path = dir_entry.path();
                // Follows symlinks, like a browser drop does.
                let metadata = tokio::fs::metadata(&path).await?;
                if metadata.is_dir() {
                    batch.push(Entry::Directory(DirectoryHandle::new(
                        file_name_of(&path),
                        FsDirectory::new(&path).with_batch_size(self.batch_size),
                    )));
                } else if metadata.is_file() {
                    batch.push(Entry::File(FileHandle::from_path_with_size(
                        &path,
                        metadata.len(),
                    )));
                } else {
                    debug!(path = %path.display(), "skipping special file");
                }
            }
            Ok(batch)
        })
    }
}

// ---------------------------------------------------------------------------
// In-memory directories
// ---------------------------------------------------------------------------

/// Directory whose children are held in memory, handed out in batches.
#[derive(Debug, Clone)]
pub struct MemoryDirectory {
    children: Vec<Entry>,
    batch_size: usize,
}

impl MemoryDirectory {
    pub fn new(children: Vec<Entry>) -> Self {
        Self {
            children,
            batch_size: DIRECTORY_BATCH_SIZE,
        }
    }

    /// Sets the number of children returned per batch (minimum 1).
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

impl DirectorySource for MemoryDirectory {
    fn open_reader(&self) -> BoxFuture<'_, Result<Box<dyn BatchReader>, TransferError>> {
        let reader = MemoryBatchReader {
            remaining: self.children.iter().cloned().collect(),
            batch_size: self.batch_size,
        };
        Box::pin(async move { Ok(Box::new(reader) as Box<dyn BatchReader>) })
    }
}

struct MemoryBatchReader {
    remaining: VecDeque<Entry>,
    batch_size: usize,
}

impl BatchReader for MemoryBatchReader {
    fn read_batch(&mut self) -> BoxFuture<'_, Result<Vec<Entry>, TransferError>> {
        let n = self.batch_size.min(self.remaining.len());
        let batch: Vec<Entry> = self.remaining.drain(..n).collect();
        Box::pin(async move { Ok(batch) })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Guesses a MIME type from a file name's extension.
pub fn detect_content_type(name: &str) -> Option<&'static str> {
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());

    match ext.as_deref() {
        Some("png") => Some("image/png"),
        Some("jpg" | "jpeg") => Some("image/jpeg"),
        Some("webp") => Some("image/webp"),
        Some("gif") => Some("image/gif"),
        Some("svg") => Some("image/svg+xml"),
        Some("mp4") => Some("video/mp4"),
        Some("mov") => Some("video/quicktime"),
        Some("mp3") => Some("audio/mpeg"),
        Some("txt") => Some("text/plain"),
        Some("pdf") => Some("application/pdf"),
        Some("json") => Some("application/json"),
        Some("zip") => Some("application/zip"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn names(entries: &[Entry]) -> Vec<String> {
        let mut names: Vec<String> = entries.iter().map(|e| e.name().to_string()).collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn memory_file_reads_back() {
        let file = FileHandle::from_bytes("note.txt", b"hello".to_vec());
        assert_eq!(file.size(), 5);
        assert_eq!(file.content_type(), "text/plain");
        assert_eq!(file.read_all().await.unwrap(), b"hello");
        assert!(file.path().is_none());
    }

    #[tokio::test]
    async fn file_range_is_clamped() {
        let file = FileHandle::from_bytes("a.bin", b"0123456789".to_vec());
        let mut reader = file
            .open_range(ByteRange { start: 6, end: 100 })
            .await
            .unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"6789");
    }

    #[tokio::test]
    async fn disk_file_handle() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, b"{}").unwrap();

        let file = FileHandle::from_path(&path).await.unwrap();
        assert_eq!(file.name(), "data.json");
        assert_eq!(file.size(), 2);
        assert_eq!(file.content_type(), "application/json");
        assert_eq!(file.path(), Some(path.as_path()));
        assert_eq!(file.read_all().await.unwrap(), b"{}");
    }

    #[tokio::test]
    async fn from_path_rejects_directory() {
        let dir = TempDir::new().unwrap();
        let result = FileHandle::from_path(dir.path()).await;
        assert!(matches!(result, Err(TransferError::NotAFile(_))));
    }

    #[test]
    fn empty_relative_path_is_none() {
        let file = FileHandle::from_bytes("a", Vec::new()).with_relative_path("");
        assert!(file.relative_path().is_none());

        let file = FileHandle::from_bytes("a", Vec::new()).with_relative_path("Dir\\a");
        assert_eq!(file.relative_path(), Some("Dir/a"));
    }

    #[tokio::test]
    async fn memory_directory_drains_all_batches() {
        let children: Vec<Entry> = (0..7)
            .map(|i| Entry::File(FileHandle::from_bytes(format!("f{i}"), vec![i as u8])))
            .collect();
        let dir = DirectoryHandle::new("d", MemoryDirectory::new(children).with_batch_size(3));

        let entries: Vec<Entry> = dir.entries().try_collect().await.unwrap();
        assert_eq!(entries.len(), 7);
        assert_eq!(entries[0].name(), "f0");
        assert_eq!(entries[6].name(), "f6");
    }

    #[tokio::test]
    async fn entries_are_restartable() {
        let children = vec![
            Entry::File(FileHandle::from_bytes("a", Vec::new())),
            Entry::File(FileHandle::from_bytes("b", Vec::new())),
        ];
        let dir = DirectoryHandle::new("d", MemoryDirectory::new(children).with_batch_size(1));

        let first: Vec<Entry> = dir.entries().try_collect().await.unwrap();
        let second: Vec<Entry> = dir.entries().try_collect().await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 2);
    }

    #[tokio::test]
    async fn empty_directory_yields_nothing() {
        let dir = DirectoryHandle::new("empty", MemoryDirectory::new(Vec::new()));
        let entries: Vec<Entry> = dir.entries().try_collect().await.unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn fs_directory_lists_children_in_small_batches() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.txt"), b"a").unwrap();
        std::fs::write(tmp.path().join("b.txt"), b"bb").unwrap();
        std::fs::create_dir(tmp.path().join("sub")).unwrap();

        let dir = DirectoryHandle::new("root", FsDirectory::new(tmp.path()).with_batch_size(1));
        let entries: Vec<Entry> = dir.entries().try_collect().await.unwrap();
        assert_eq!(names(&entries), vec!["a.txt", "b.txt", "sub"]);

        let sub = entries.iter().find(|e| e.name() == "sub").unwrap();
        assert!(sub.is_directory());
    }

    #[tokio::test]
    async fn entry_from_path_detects_kind() {
        let tmp = TempDir::new().unwrap();
        let file_path = tmp.path().join("x.png");
        std::fs::write(&file_path, b"png").unwrap();

        let entry = Entry::from_path(&file_path).await.unwrap();
        assert!(entry.is_file());
        assert_eq!(entry.name(), "x.png");

        let entry = Entry::from_path(tmp.path()).await.unwrap();
        assert!(entry.is_directory());
    }

    #[tokio::test]
    async fn entry_from_missing_path_fails() {
        let result = Entry::from_path("/nonexistent/zher/path").await;
        assert!(matches!(result, Err(TransferError::Io(_))));
    }

    #[test]
    fn detect_content_type_known() {
        assert_eq!(detect_content_type("image.png"), Some("image/png"));
        assert_eq!(detect_content_type("photo.JPG"), Some("image/jpeg"));
        assert_eq!(detect_content_type("bundle.zip"), Some("application/zip"));
    }

    #[test]
    fn detect_content_type_unknown() {
        assert_eq!(detect_content_type("archive.7z"), None);
        assert_eq!(detect_content_type("noext"), None);
        assert_eq!(detect_content_type(""), None);
    }
}
