//! Archive builder.
//!
//! Writes an [`EntrySet`] into a stored (uncompressed) zip spooled to a temp
//! file, on the blocking pool, reporting progress as it goes.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;
use zip::write::SimpleFileOptions;

use crate::entry::FileHandle;
use crate::walker::{ArchiveEntry, EntrySet};
use crate::{ARCHIVE_CONTENT_TYPE, TransferError};

const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Temp file removed when dropped.
#[derive(Debug)]
pub struct SpooledFile {
    path: PathBuf,
}

impl SpooledFile {
    fn create(temp_dir: &Path) -> Result<(Self, File), TransferError> {
        let path = temp_dir.join(format!("zher-{}.zip", Uuid::new_v4()));
        let file = File::create(&path)?;
        Ok((Self { path }, file))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SpooledFile {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %err, "failed to remove temp zip archive");
            }
        }
    }
}

/// Progress report emitted while an archive is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveProgress {
    /// 0–100, non-decreasing within one build.
    pub percent: u8,
    pub current_entry: String,
}

/// Callback invoked with archive progress, from the blocking writer thread.
pub type ProgressCallback = Arc<dyn Fn(ArchiveProgress) + Send + Sync>;

struct Reporter {
    callback: ProgressCallback,
    total_bytes: u64,
    total_entries: u64,
    done_bytes: u64,
    done_entries: u64,
    last_percent: Option<u8>,
    last_entry: String,
}

impl Reporter {
    fn new(callback: ProgressCallback, set: &EntrySet) -> Self {
        Self {
            callback,
            total_bytes: set.total_bytes(),
            total_entries: set.len() as u64,
            done_bytes: 0,
            done_entries: 0,
            last_percent: None,
            last_entry: String::new(),
        }
    }

    /// Progress from bytes, or from entry count when there are no bytes.
    /// Held below 100 until the archive is finalized.
    fn percent(&self) -> u8 {
        let pct = if self.total_bytes > 0 {
            self.done_bytes * 100 / self.total_bytes
        } else if self.total_entries > 0 {
            self.done_entries * 100 / self.total_entries
        } else {
            0
        };
        pct.min(99) as u8
    }

    fn report(&mut self, entry: &str) {
        let percent = self.percent().max(self.last_percent.unwrap_or(0));
        if self.last_percent == Some(percent) && self.last_entry == entry {
            return;
        }
        self.last_percent = Some(percent);
        self.last_entry = entry.to_string();
        (self.callback)(ArchiveProgress {
            percent,
            current_entry: entry.to_string(),
        });
    }

    fn finish(&mut self) {
        let entry = std::mem::take(&mut self.last_entry);
        self.last_percent = Some(100);
        (self.callback)(ArchiveProgress {
            percent: 100,
            current_entry: entry,
        });
    }
}

/// Builds a stored zip named `name` from `set` inside `temp_dir`.
///
/// The returned handle owns the spooled file; it is deleted when the last
/// clone of the handle is dropped. On failure the partial file is removed.
pub async fn build_archive(
    set: EntrySet,
    name: String,
    temp_dir: PathBuf,
    on_progress: ProgressCallback,
) -> Result<FileHandle, TransferError> {
    tokio::task::spawn_blocking(move || write_archive(set, &name, &temp_dir, on_progress))
        .await
        .map_err(|e| TransferError::Task(e.to_string()))?
}

fn write_archive(
    set: EntrySet,
    name: &str,
    temp_dir: &Path,
    on_progress: ProgressCallback,
) -> Result<FileHandle, TransferError> {
    let mut reporter = Reporter::new(on_progress, &set);
    let (spool, file) = SpooledFile::create(temp_dir)?;
    debug!(archive = name, path = %spool.path().display(), entries = set.len(), "writing archive");

    let mut writer = zip::ZipWriter::new(BufWriter::new(file));
    let options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored)
        .large_file(set.total_bytes() >= u32::MAX as u64);

    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    for entry in set.into_entries() {
        match entry {
            ArchiveEntry::Directory { path } => {
                reporter.report(&path);
                writer.add_directory(path.as_str(), options)?;
            }
            ArchiveEntry::File { path, file } => {
                reporter.report(&path);
                writer.start_file(path.as_str(), options)?;
                let mut source = file.open_blocking()?;
                loop {
                    let n = source.read(&mut buf)?;
                    if n == 0 {
                        break;
                    }
                    writer.write_all(&buf[..n])?;
                    reporter.done_bytes += n as u64;
                    reporter.report(&path);
                }
            }
        }
        reporter.done_entries += 1;
    }

    let mut out = writer.finish()?;
    out.flush()?;
    drop(out);

    let size = std::fs::metadata(spool.path())?.len();
    reporter.finish();
    info!(archive = name, size, "archive ready");

    Ok(FileHandle::from_spool(name, size, ARCHIVE_CONTENT_TYPE, spool))
}
