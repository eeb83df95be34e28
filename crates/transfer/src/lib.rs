//! File aggregation and transfer for the zher chat client.
//!
//! Turns picked, dropped or pasted entries into a single artifact that can
//! be offered to the room (the file itself, or a stored zip of everything),
//! keeps track of offered artifacts, and streams them to the server's upload
//! endpoint on request.
//!
//! # Pipeline
//!
//! 1. **Normalize**: raw input shape to a [`Selection`]
//! 2. **Walk**: expand directories into an [`EntrySet`]
//! 3. **Select**: passthrough or archive, and the archive name
//! 4. **Archive**: stored zip spooled to a temp file, with progress

mod archive;
mod entry;
mod http;
mod job;
mod normalize;
mod picker;
mod pipeline;
mod range;
mod selector;
mod store;
mod validation;
mod walker;

pub use archive::{ArchiveProgress, ProgressCallback, build_archive};
pub use entry::{
    BatchReader, BoxFuture, DirectoryHandle, DirectorySource, Entry, FileHandle, FsDirectory,
    MemoryDirectory, RangeReader, detect_content_type,
};
pub use http::{Downloader, Uploader};
pub use job::{ArchiveJob, JobSnapshot, JobStatus};
pub use normalize::{
    ArchiveNaming, ClipboardItem, ClipboardKind, Normalized, RawSelection, Selection, normalize,
};
pub use picker::pick_folder;
pub use pipeline::{Aggregated, Aggregator};
pub use range::{ByteRange, range_stream};
pub use selector::{TransferArtifact, archive_name, timestamp_archive_name};
pub use store::{SharedFileStore, generate_file_id};
pub use validation::validate_entry_path;
pub use walker::{ArchiveEntry, EntrySet, collect_entries, walk_directory};

/// Content type given to synthesized archives.
pub const ARCHIVE_CONTENT_TYPE: &str = "application/zip";

/// Entries returned per directory read, matching what browsers hand out per
/// `readEntries` call.
pub const DIRECTORY_BATCH_SIZE: usize = 100;

/// Read size used when streaming an artifact to the upload endpoint: 256 KiB.
pub const UPLOAD_CHUNK_SIZE: usize = 256 * 1024;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status: {0}")]
    HttpStatus(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("not a regular file: {0}")]
    NotAFile(String),

    #[error("background task failed: {0}")]
    Task(String),
}

/// Formats a byte count for display: `0 B`, `512 B`, `1.5 KB`, `2.25 MB`.
///
/// Two decimals at most, trailing zeros trimmed, capped at TB.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    if bytes == 0 {
        return "0 B".into();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let fixed = format!("{value:.2}");
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    format!("{trimmed} {}", UNITS[unit])
}
