//! Copy remote files onto local paths whose logged hash they match

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use filetime::FileTime;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{info, warn};

use crate::error::{Result, TvcError};
use crate::metrics::PullMetrics;
use crate::snapshot::{Snapshot, SnapshotEntry};

/// Options for pull operations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PullOptions {
    /// Log the copies without touching any file
    pub dry_run: bool,
    /// Record failed copies and keep going instead of stopping at the first one
    pub continue_on_error: bool,
}

/// A planned copy from the remote root to the local root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullCopy {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub content_hash: String,
}

/// Pair every local entry with the first remote entry of the same hash.
///
/// Entries whose path would leave their data root are never copied from or to.
/// Returns the copies and the number of local entries with no match.
pub fn plan_pull(
    local_root: &Path,
    remote_root: &Path,
    local: &Snapshot,
    remote: &Snapshot,
) -> (Vec<PullCopy>, usize) {
    let mut by_hash: HashMap<&str, &SnapshotEntry> = HashMap::with_capacity(remote.len());
    for entry in remote.iter() {
        if entry.is_contained() {
            by_hash.entry(entry.content_hash.as_str()).or_insert(entry);
        } else {
            warn!("Ignoring remote entry '{}': outside the remote root", entry.relative_path());
        }
    }

    let mut copies = Vec::new();
    let mut unmatched = 0;

    for entry in local.iter() {
        if !entry.is_contained() {
            warn!("Refusing to write '{}': outside the local root", entry.relative_path());
            continue;
        }

        match by_hash.get(entry.content_hash.as_str()) {
            Some(source) => copies.push(PullCopy {
                source: remote_root.join(source.relative_path()),
                destination: local_root.join(entry.relative_path()),
                content_hash: entry.content_hash.clone(),
            }),
            None => {
                warn!(
                    "{} with hash {} has no corresponding hash in the remote log",
                    entry.relative_path(),
                    entry.content_hash
                );
                unmatched += 1;
            }
        }
    }

    (copies, unmatched)
}

/// Execute a pull between two roots using their snapshots
pub async fn pull(
    local_root: &Path,
    remote_root: &Path,
    local: &Snapshot,
    remote: &Snapshot,
    options: &PullOptions,
) -> Result<PullMetrics> {
    let (copies, unmatched) = plan_pull(local_root, remote_root, local, remote);

    let mut metrics = PullMetrics {
        considered: local.len(),
        unmatched,
        ..Default::default()
    };

    for copy in copies {
        if options.dry_run {
            info!("DRY RUN: Would copy {} to {}", copy.source.display(), copy.destination.display());
            metrics.record_copy(0);
            continue;
        }

        info!("Copying {} to {}", copy.source.display(), copy.destination.display());
        match copy_file(&copy.source, &copy.destination).await {
            Ok(bytes) => metrics.record_copy(bytes),
            Err(e) if options.continue_on_error => {
                warn!("{}", e);
                metrics.record_failure(&copy.destination, e.to_string());
            }
            Err(e) => return Err(e),
        }
    }

    info!("{}", metrics.summary());
    Ok(metrics)
}

/// Copy a file, creating parent directories and keeping the source timestamps
async fn copy_file(source: &Path, destination: &Path) -> Result<u64> {
    if same_file(source, destination).await {
        return Ok(0);
    }

    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).await.map_err(|e| {
            TvcError::copy_error(source, destination, format!("Failed to create parent directory: {}", e))
        })?;
    }

    let bytes = fs::copy(source, destination).await.map_err(|e| {
        TvcError::copy_error(source, destination, format!("Failed to copy file: {}", e))
    })?;

    // Timestamps are best effort, the content is already in place
    if let Err(e) = preserve_times(source, destination).await {
        warn!("Failed to preserve timestamps for '{}': {}", destination.display(), e);
    }

    Ok(bytes)
}

async fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a).await, fs::canonicalize(b).await) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

async fn preserve_times(source: &Path, destination: &Path) -> std::io::Result<()> {
    let metadata = fs::metadata(source).await?;
    let atime = FileTime::from_last_access_time(&metadata);
    let mtime = FileTime::from_last_modification_time(&metadata);
    let destination = destination.to_path_buf();

    tokio::task::spawn_blocking(move || filetime::set_file_times(&destination, atime, mtime))
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?
}
