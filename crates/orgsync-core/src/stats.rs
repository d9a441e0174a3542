use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

/// Immutable copy of the run counters handed to reporting code.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub cloned: u32,
    pub pulled: u32,
    pub remote_updated: u32,
    pub untouched_pruned: u32,
    pub new_commits: usize,
    pub total_duration_secs: u64,
    pub infos: Vec<String>,
    pub errors: Vec<String>,
    pub untouched: Vec<PathBuf>,
}

/// Run-wide counters shared by every worker. Each mutation takes the lock
/// once and never performs I/O while holding it.
#[derive(Debug, Default)]
pub struct SyncStats {
    inner: Mutex<StatsSnapshot>,
}

impl SyncStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_info(&self, message: impl Into<String>) {
        self.lock().infos.push(message.into());
    }

    pub fn add_error(&self, message: impl Into<String>) {
        self.lock().errors.push(message.into());
    }

    pub fn record_clone(&self) {
        self.lock().cloned += 1;
    }

    pub fn record_pull(&self) {
        self.lock().pulled += 1;
    }

    pub fn record_remote_update(&self) {
        self.lock().remote_updated += 1;
    }

    pub fn add_new_commits(&self, count: usize) {
        self.lock().new_commits += count;
    }

    pub fn mark_untouched(&self, path: PathBuf) {
        self.lock().untouched.push(path);
    }

    pub fn set_total_duration(&self, secs: u64) {
        self.lock().total_duration_secs = secs;
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, StatsSnapshot> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
