use tokio_util::io::ReaderStream;

use crate::entry::{FileHandle, RangeReader};
use crate::{TransferError, UPLOAD_CHUNK_SIZE};

/// Half-open byte range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// The whole file.
    pub fn full(size: u64) -> Self {
        Self {
            start: 0,
            end: size,
        }
    }

    /// Resolves an upload request against a file of `size` bytes.
    ///
    /// `end` is inclusive. The request is a slice when `offset > 0` or when
    /// `end` is given and stops before the last byte; a slice covers
    /// `[offset, end + 1)`, or `[offset, size)` without an end. Anything else
    /// is the whole file.
    pub fn resolve(offset: u64, end: Option<u64>, size: u64) -> Self {
        let is_slice = offset > 0 || end.is_some_and(|e| e < size.saturating_sub(1));
        if !is_slice {
            return Self::full(size);
        }
        let stop = end.map_or(size, |e| e.saturating_add(1));
        Self {
            start: offset,
            end: stop,
        }
        .clamp(size)
    }

    /// Restricts the range to `[0, size)`, never inverted.
    pub fn clamp(self, size: u64) -> Self {
        let end = self.end.min(size);
        Self {
            start: self.start.min(end),
            end,
        }
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self, size: u64) -> bool {
        self.start == 0 && self.end >= size
    }
}

/// Streams `range` of `file` in chunks of [`UPLOAD_CHUNK_SIZE`].
pub async fn range_stream(
    file: &FileHandle,
    range: ByteRange,
) -> Result<ReaderStream<RangeReader>, TransferError> {
    let reader = file.open_range(range).await?;
    Ok(ReaderStream::with_capacity(reader, UPLOAD_CHUNK_SIZE))
}
