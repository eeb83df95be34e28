//! One aggregation pass: raw selection in, at most one artifact out.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::TransferError;
use crate::archive::{ProgressCallback, build_archive};
use crate::job::ArchiveJob;
use crate::normalize::{Normalized, RawSelection, Selection, normalize};
use crate::selector::{TransferArtifact, archive_name, local_now};
use crate::walker::collect_entries;

/// Result of an aggregation pass.
#[derive(Debug)]
pub struct Aggregated {
    /// The caller must suppress the default paste behavior.
    pub suppress_default: bool,
    /// `None` when the selection was empty, expanded to no files, or failed.
    pub artifact: Option<TransferArtifact>,
}

/// Runs aggregation passes, publishing archive progress on its [`ArchiveJob`].
#[derive(Debug, Clone)]
pub struct Aggregator {
    temp_dir: PathBuf,
    job: ArchiveJob,
}

impl Aggregator {
    /// Creates an aggregator that spools archives into `temp_dir`.
    pub fn new(temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            temp_dir: temp_dir.into(),
            job: ArchiveJob::new(),
        }
    }

    pub fn job(&self) -> &ArchiveJob {
        &self.job
    }

    /// Runs one pass. Failures are logged and yield no artifact.
    pub async fn aggregate(&self, raw: RawSelection) -> Aggregated {
        let Normalized {
            selection,
            suppress_default,
        } = normalize(raw);

        let artifact = match self.resolve(selection).await {
            Ok(artifact) => artifact,
            Err(e) => {
                error!(error = %e, "aggregation failed");
                self.job.fail();
                None
            }
        };

        Aggregated {
            suppress_default,
            artifact,
        }
    }

    async fn resolve(
        &self,
        selection: Selection,
    ) -> Result<Option<TransferArtifact>, TransferError> {
        match selection {
            Selection::Empty => {
                debug!("empty selection");
                Ok(None)
            }
            Selection::SingleFile(file) => {
                debug!(name = file.name(), size = file.size(), "single file passthrough");
                Ok(Some(TransferArtifact::Passthrough(file)))
            }
            Selection::Tree { roots, naming } => {
                let name = archive_name(&naming, local_now());
                let set = collect_entries(roots).await?;
                if set.file_count() == 0 {
                    debug!(archive = %name, "selection expanded to no files");
                    return Ok(None);
                }

                info!(
                    archive = %name,
                    files = set.file_count(),
                    bytes = set.total_bytes(),
                    "zipping selection"
                );
                self.job.start(&name);
                let job = self.job.clone();
                let on_progress: ProgressCallback =
                    Arc::new(move |p| job.update(p.percent, &p.current_entry));

                let file = build_archive(set, name, self.temp_dir.clone(), on_progress).await?;
                self.job.complete();
                Ok(Some(TransferArtifact::Archive(file)))
            }
        }
    }
}
