//! tvc: minimal data version control
//!
//! Tracks files with chosen extensions in a local data root and a remote one,
//! records their content hashes in flat CSV logs, and pulls remote files onto
//! local paths whose logged hash they match:
//! - Directory scanning filtered by tracked extension
//! - Streaming content hashing (MD5 by default)
//! - Timestamp-based change detection against a single checkpoint
//! - Incremental log reconciliation with bounded concurrent hashing
//! - Hash-matched pulls from remote to local

pub mod config;
pub mod detector;
pub mod error;
pub mod fsutil;
pub mod hasher;
pub mod metrics;
pub mod pull;
pub mod reconciler;
pub mod repository;
pub mod scanner;
pub mod snapshot;

// Re-export main types and functions
pub use config::{validate_extension, Config, CHECKPOINT_FORMAT};
pub use detector::{ChangeDetector, FileTimes, HashDecision, RehashReason};
pub use error::{Result, TvcError};
pub use hasher::{ContentHasher, HashAlgorithm};
pub use metrics::{FileFailure, PullMetrics, ReconcileMetrics};
pub use pull::{PullCopy, PullOptions};
pub use reconciler::{PassContext, PassRole, ReconcileOptions, ReconcileOutcome, Reconciler};
pub use repository::{PullReport, Repository, UpdateReport, TVC_DIR};
pub use scanner::{DirectoryScanner, ScanOptions, TrackedFile};
pub use snapshot::{Snapshot, SnapshotEntry};

/// Scan a directory and return its tracked files
pub fn scan_directory(
    path: impl AsRef<std::path::Path>,
    options: ScanOptions,
) -> Result<Vec<TrackedFile>> {
    DirectoryScanner::new(options).scan(path)
}

/// Run a single reconciliation pass with default options
pub async fn reconcile(ctx: &PassContext) -> Result<ReconcileOutcome> {
    Reconciler::default().reconcile(ctx).await
}
