//! Upload and download endpoints of the room server.

use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::TransferError;
use crate::entry::FileHandle;
use crate::range::{ByteRange, range_stream};
use crate::validation::sanitize_file_name;

fn endpoint(base_url: &str, path: &str, id: &str) -> String {
    format!("{}/api/{path}/{id}", base_url.trim_end_matches('/'))
}

fn check_status(response: &reqwest::Response, url: &str) -> Result<(), TransferError> {
    if response.status().is_success() {
        Ok(())
    } else {
        Err(TransferError::HttpStatus(format!(
            "{url} returned status {}",
            response.status()
        )))
    }
}

/// Streams offered files to `POST {base}/api/upload/{transfer_id}`.
#[derive(Debug, Clone)]
pub struct Uploader {
    client: reqwest::Client,
    base_url: String,
}

impl Uploader {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Uploads `file`, or the slice selected by `offset` and inclusive `end`.
    ///
    /// Returns the number of bytes sent.
    pub async fn upload(
        &self,
        transfer_id: &str,
        file: &FileHandle,
        offset: u64,
        end: Option<u64>,
    ) -> Result<u64, TransferError> {
        let range = ByteRange::resolve(offset, end, file.size());
        let url = endpoint(&self.base_url, "upload", transfer_id);
        debug!(
            transfer_id,
            name = file.name(),
            start = range.start,
            end = range.end,
            sliced = !range.is_full(file.size()),
            "starting upload"
        );

        let body = reqwest::Body::wrap_stream(range_stream(file, range).await?);
        let response = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()
            .await?;
        check_status(&response, &url)?;

        info!(transfer_id, bytes = range.len(), "upload finished");
        Ok(range.len())
    }
}

/// Fetches offered files from `GET {base}/api/download/{file_id}` into a
/// local directory.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: reqwest::Client,
    base_url: String,
}

impl Downloader {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Downloads `file_id` into `dest_dir` under `file_name`, picking a free
    /// name (`a (1).txt`) when one is taken. Returns the written path.
    ///
    /// A partially written file is removed on failure.
    pub async fn download(
        &self,
        file_id: &str,
        file_name: &str,
        dest_dir: &Path,
    ) -> Result<PathBuf, TransferError> {
        let url = endpoint(&self.base_url, "download", file_id);
        let response = self.client.get(&url).send().await?;
        check_status(&response, &url)?;

        tokio::fs::create_dir_all(dest_dir).await?;
        let dest = unique_destination(dest_dir, &sanitize_file_name(file_name));
        debug!(file_id, dest = %dest.display(), "downloading");

        match write_body(response, &dest).await {
            Ok(bytes) => {
                info!(file_id, bytes, dest = %dest.display(), "download finished");
                Ok(dest)
            }
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_file(&dest).await {
                    warn!(dest = %dest.display(), error = %rm, "failed to remove partial download");
                }
                Err(e)
            }
        }
    }
}

async fn write_body(response: reqwest::Response, dest: &Path) -> Result<u64, TransferError> {
    let mut out = tokio::fs::File::create(dest).await?;
    let mut stream = response.bytes_stream();
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        out.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    out.flush().await?;
    Ok(written)
}

/// Returns `dir/name`, or `dir/stem (n).ext` for the first free `n`.
fn unique_destination(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !candidate.exists() {
        return candidate;
    }

    let path = Path::new(name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string());
    let ext = path.extension().map(|e| e.to_string_lossy().into_owned());

    let mut n = 1usize;
    loop {
        let file_name = match &ext {
            Some(ext) => format!("{stem} ({n}).{ext}"),
            None => format!("{stem} ({n})"),
        };
        let candidate = dir.join(file_name);
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}
