use std::sync::Arc;

use tokio::sync::watch;

/// State of an aggregation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobStatus {
    #[default]
    Idle,
    Zipping,
    Completed,
    Failed,
}

/// What a UI renders: "zipping X.zip, 42%, current file".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobSnapshot {
    pub archive_name: String,
    pub percent: u8,
    pub current_entry: String,
    pub status: JobStatus,
}

/// Observable archive job state.
///
/// Cloning shares the same state. Observers subscribe to a
/// [`watch::Receiver`] and see every transition.
#[derive(Debug, Clone)]
pub struct ArchiveJob {
    tx: Arc<watch::Sender<JobSnapshot>>,
}

impl Default for ArchiveJob {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveJob {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(JobSnapshot::default());
        Self { tx: Arc::new(tx) }
    }

    pub fn subscribe(&self) -> watch::Receiver<JobSnapshot> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> JobSnapshot {
        self.tx.borrow().clone()
    }

    /// Begins a new pass for `archive_name`, resetting progress.
    pub fn start(&self, archive_name: &str) {
        self.tx.send_replace(JobSnapshot {
            archive_name: archive_name.to_string(),
            percent: 0,
            current_entry: String::new(),
            status: JobStatus::Zipping,
        });
    }

    /// Records progress. A percent lower than the current one is ignored.
    pub fn update(&self, percent: u8, current_entry: &str) {
        let percent = percent.min(100);
        self.tx.send_if_modified(|state| {
            if state.status != JobStatus::Zipping || percent < state.percent {
                return false;
            }
            let changed = state.percent != percent || state.current_entry != current_entry;
            state.percent = percent;
            if state.current_entry != current_entry {
                state.current_entry = current_entry.to_string();
            }
            changed
        });
    }

    pub fn complete(&self) {
        self.tx.send_modify(|state| {
            state.percent = 100;
            state.status = JobStatus::Completed;
        });
    }

    pub fn fail(&self) {
        self.tx.send_modify(|state| state.status = JobStatus::Failed);
    }
}
