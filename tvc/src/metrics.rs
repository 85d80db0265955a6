//! Counters for reconciliation passes and pulls

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::detector::RehashReason;

/// A file left out of a pass or pull because of a recoverable error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFailure {
    pub path: PathBuf,
    pub message: String,
}

/// Statistics for one reconciliation pass over a data root
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileMetrics {
    /// Which root the pass covered ("local" or "remote")
    pub role: String,
    pub start_time: SystemTime,
    pub end_time: Option<SystemTime>,
    pub duration: Duration,
    /// Tracked files found by the scanner
    pub scanned: usize,
    /// Entries in the previous snapshot
    pub previous_entries: usize,
    /// Hashes computed for paths absent from the previous snapshot
    pub hashed_new: usize,
    /// Hashes recomputed because timestamps moved past the checkpoint
    pub hashed_altered: usize,
    /// Hashes carried over from the previous snapshot
    pub reused: usize,
    /// Files dropped because of recoverable errors
    pub failures: Vec<FileFailure>,
}

impl ReconcileMetrics {
    pub fn new(role: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            start_time: SystemTime::now(),
            end_time: None,
            duration: Duration::default(),
            scanned: 0,
            previous_entries: 0,
            hashed_new: 0,
            hashed_altered: 0,
            reused: 0,
            failures: Vec::new(),
        }
    }

    /// Total hash computations in this pass
    pub fn hashed(&self) -> usize {
        self.hashed_new + self.hashed_altered
    }

    pub fn skipped(&self) -> usize {
        self.failures.len()
    }

    pub fn record_hashed(&mut self, reason: RehashReason) {
        match reason {
            RehashReason::New => self.hashed_new += 1,
            RehashReason::Altered => self.hashed_altered += 1,
        }
    }

    pub fn record_reused(&mut self) {
        self.reused += 1;
    }

    pub fn record_failure(&mut self, path: impl Into<PathBuf>, message: impl Into<String>) {
        let failure = FileFailure {
            path: path.into(),
            message: message.into(),
        };
        warn!(
            role = %self.role,
            path = %failure.path.display(),
            message = %failure.message,
            "Skipping file, it will be missing from the snapshot"
        );
        self.failures.push(failure);
    }

    pub fn complete(&mut self) {
        let end_time = SystemTime::now();
        self.duration = end_time.duration_since(self.start_time).unwrap_or_default();
        self.end_time = Some(end_time);

        info!(
            role = %self.role,
            duration_secs = self.duration.as_secs_f64(),
            scanned = self.scanned,
            previous_entries = self.previous_entries,
            hashed_new = self.hashed_new,
            hashed_altered = self.hashed_altered,
            reused = self.reused,
            skipped = self.skipped(),
            "Reconciliation pass completed"
        );
    }

    pub fn summary(&self) -> String {
        format!(
            "{}: {} tracked files, {} hashed ({} new, {} altered), {} reused, {} skipped",
            self.role,
            self.scanned,
            self.hashed(),
            self.hashed_new,
            self.hashed_altered,
            self.reused,
            self.skipped()
        )
    }
}

/// Statistics for a pull
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PullMetrics {
    /// Local entries considered
    pub considered: usize,
    /// Files copied (or that would be copied in a dry run)
    pub copied: usize,
    /// Bytes copied
    pub bytes_copied: u64,
    /// Local entries without a remote entry of the same hash
    pub unmatched: usize,
    /// Copies that failed while continuing on error
    pub failures: Vec<FileFailure>,
}

impl PullMetrics {
    pub fn record_copy(&mut self, bytes: u64) {
        self.copied += 1;
        self.bytes_copied += bytes;
    }

    pub fn record_failure(&mut self, path: impl Into<PathBuf>, message: impl Into<String>) {
        self.failures.push(FileFailure {
            path: path.into(),
            message: message.into(),
        });
    }

    pub fn is_successful(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "pull: {} entries, {} copied ({} bytes), {} without remote match, {} failed",
            self.considered,
            self.copied,
            self.bytes_copied,
            self.unmatched,
            self.failures.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconcile_counters() {
        let mut metrics = ReconcileMetrics::new("local");
        metrics.scanned = 4;
        metrics.record_hashed(RehashReason::New);
        metrics.record_hashed(RehashReason::Altered);
        metrics.record_reused();
        metrics.record_failure("/data/gone.mp4", "vanished");
        metrics.complete();

        assert_eq!(metrics.hashed(), 2);
        assert_eq!(metrics.skipped(), 1);
        assert!(metrics.end_time.is_some());
        assert_eq!(
            metrics.summary(),
            "local: 4 tracked files, 2 hashed (1 new, 1 altered), 1 reused, 1 skipped"
        );
    }

    #[test]
    fn test_pull_counters() {
        let mut metrics = PullMetrics::default();
        metrics.considered = 3;
        metrics.record_copy(10);
        metrics.unmatched = 1;
        assert!(metrics.is_successful());

        metrics.record_failure("/local/x.mp4", "permission denied");
        assert!(!metrics.is_successful());
        assert_eq!(metrics.bytes_copied, 10);
    }
}
