//! Change detection against the last-update checkpoint
//!
//! A file counts as recently altered when its modification time or its
//! metadata-change time is strictly after the checkpoint. The second timestamp
//! catches files moved or copied into place with an old mtime.

use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, FixedOffset};
use tokio::fs;

use crate::error::{Result, TvcError};
use crate::snapshot::SnapshotEntry;

/// Timestamps consulted for change detection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileTimes {
    /// Last content modification
    pub modified: SystemTime,
    /// Last metadata change (ctime on unix, creation time elsewhere)
    pub changed: Option<SystemTime>,
}

impl FileTimes {
    pub fn from_metadata(metadata: &std::fs::Metadata) -> Self {
        Self {
            modified: metadata.modified().unwrap_or(UNIX_EPOCH),
            changed: metadata_change_time(metadata),
        }
    }

    /// True if either timestamp is strictly after `checkpoint`; always true without one
    pub fn altered_since(&self, checkpoint: Option<&DateTime<FixedOffset>>) -> bool {
        let Some(checkpoint) = checkpoint else {
            return true;
        };
        let checkpoint = SystemTime::from(*checkpoint);

        self.modified > checkpoint || self.changed.map_or(false, |changed| changed > checkpoint)
    }
}

#[cfg(unix)]
fn metadata_change_time(metadata: &std::fs::Metadata) -> Option<SystemTime> {
    use std::os::unix::fs::MetadataExt;

    let secs = u64::try_from(metadata.ctime()).ok()?;
    let nanos = u32::try_from(metadata.ctime_nsec()).unwrap_or(0);
    Some(UNIX_EPOCH + Duration::new(secs, nanos))
}

#[cfg(not(unix))]
fn metadata_change_time(metadata: &std::fs::Metadata) -> Option<SystemTime> {
    metadata.created().ok()
}

/// What to do with one discovered file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashDecision {
    /// Keep the hash recorded in the previous snapshot
    Reuse(String),
    /// Compute a fresh hash
    Rehash(RehashReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RehashReason {
    /// No entry for this relative path in the previous snapshot
    New,
    /// Timestamps moved past the checkpoint
    Altered,
}

/// Judges files against a single checkpoint passed in by the caller
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeDetector {
    checkpoint: Option<DateTime<FixedOffset>>,
}

impl ChangeDetector {
    pub fn new(checkpoint: Option<DateTime<FixedOffset>>) -> Self {
        Self { checkpoint }
    }

    pub fn checkpoint(&self) -> Option<&DateTime<FixedOffset>> {
        self.checkpoint.as_ref()
    }

    /// Read the file's timestamps and compare them with the checkpoint
    pub async fn recently_altered<P: AsRef<Path>>(&self, path: P) -> Result<bool> {
        let path = path.as_ref();
        let metadata = fs::metadata(path).await.map_err(|e| {
            TvcError::metadata_error(path, format!("Failed to read metadata: {}", e))
        })?;

        Ok(FileTimes::from_metadata(&metadata).altered_since(self.checkpoint()))
    }

    /// Reuse the previous hash only for a known path whose timestamps are unchanged
    pub async fn decide<P: AsRef<Path>>(
        &self,
        path: P,
        previous: Option<&SnapshotEntry>,
    ) -> Result<HashDecision> {
        let Some(previous) = previous else {
            return Ok(HashDecision::Rehash(RehashReason::New));
        };

        if self.recently_altered(path).await? {
            Ok(HashDecision::Rehash(RehashReason::Altered))
        } else {
            Ok(HashDecision::Reuse(previous.content_hash.clone()))
        }
    }
}
