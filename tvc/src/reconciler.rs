//! Reconciler that refreshes a snapshot log against the files under a data root

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, FixedOffset};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info_span, Instrument};

use crate::detector::{ChangeDetector, HashDecision, RehashReason};
use crate::error::{Result, TvcError};
use crate::hasher::{ContentHasher, HashAlgorithm, DEFAULT_CHUNK_SIZE};
use crate::metrics::ReconcileMetrics;
use crate::scanner::{DirectoryScanner, ScanOptions, TrackedFile};
use crate::snapshot::{Snapshot, SnapshotEntry};

/// Options for reconciliation passes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileOptions {
    /// Digest used for recomputed hashes
    pub hash_algorithm: HashAlgorithm,
    /// Maximum number of files hashed concurrently within one pass
    pub max_concurrency: usize,
    /// Bytes read per chunk while hashing
    pub chunk_size: usize,
    /// Follow symbolic links while scanning
    pub follow_links: bool,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            hash_algorithm: HashAlgorithm::default(),
            max_concurrency: 4,
            chunk_size: DEFAULT_CHUNK_SIZE,
            follow_links: false,
        }
    }
}

/// Which data root a pass covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PassRole {
    Local,
    Remote,
}

impl fmt::Display for PassRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PassRole::Local => write!(f, "local"),
            PassRole::Remote => write!(f, "remote"),
        }
    }
}

/// Everything one pass needs; the reconciler itself holds no per-repository state
#[derive(Debug, Clone)]
pub struct PassContext {
    pub role: PassRole,
    /// Root of the files to track
    pub data_dir: PathBuf,
    /// Snapshot log read as the previous state and rewritten with the new one
    pub log_path: PathBuf,
    pub tracked_extensions: Vec<String>,
    /// Directories under `data_dir` to leave out, such as the metadata directory
    pub exclude_dirs: Vec<PathBuf>,
    /// Checkpoint the timestamps are judged against; `None` forces a full re-hash
    pub last_update: Option<DateTime<FixedOffset>>,
}

/// Result of a pass: the snapshot that was written and its statistics
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    pub snapshot: Snapshot,
    pub metrics: ReconcileMetrics,
}

/// Scans, detects changes, hashes what changed and rewrites the log
pub struct Reconciler {
    options: ReconcileOptions,
    hasher: ContentHasher,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(ReconcileOptions::default())
    }
}

impl Reconciler {
    pub fn new(options: ReconcileOptions) -> Self {
        let hasher = ContentHasher::with_chunk_size(options.hash_algorithm, options.chunk_size);
        Self { options, hasher }
    }

    pub fn options(&self) -> &ReconcileOptions {
        &self.options
    }

    /// Run one pass. The new snapshot holds one entry per tracked file in scan
    /// order, minus files that failed with a recoverable error.
    pub async fn reconcile(&self, ctx: &PassContext) -> Result<ReconcileOutcome> {
        let span = info_span!("reconcile", role = %ctx.role, data_dir = %ctx.data_dir.display());
        self.reconcile_inner(ctx).instrument(span).await
    }

    async fn reconcile_inner(&self, ctx: &PassContext) -> Result<ReconcileOutcome> {
        let mut metrics = ReconcileMetrics::new(ctx.role.to_string());

        // Phase 1: scan the data root
        let files = self.scan(ctx).await?;
        metrics.scanned = files.len();

        // Phase 2: load the previous state
        let previous = Snapshot::load(&ctx.log_path)?;
        metrics.previous_entries = previous.len();

        // Phase 3: resolve hashes
        let detector = ChangeDetector::new(ctx.last_update);
        let entries = self.resolve_all(files, &previous, &detector, &mut metrics).await;

        // Phase 4: replace the log only once every file is resolved
        let snapshot = Snapshot::new(entries);
        snapshot.save(&ctx.log_path)?;

        metrics.complete();
        Ok(ReconcileOutcome { snapshot, metrics })
    }

    /// Reuse or compute a hash for every file, keeping the input order no matter
    /// which hash finishes first. Files failing with a recoverable error are
    /// recorded in `metrics` and left out.
    pub(crate) async fn resolve_all(
        &self,
        files: Vec<TrackedFile>,
        previous: &Snapshot,
        detector: &ChangeDetector,
        metrics: &mut ReconcileMetrics,
    ) -> Vec<SnapshotEntry> {
        let index = previous.index_by_path();

        let resolved: Vec<(TrackedFile, Result<(String, Option<RehashReason>)>)> =
            stream::iter(files.into_iter().map(|file| {
                let previous = index.get(&file.relative_path).copied();
                async move {
                    let resolution = self.resolve(detector, &file, previous).await;
                    (file, resolution)
                }
            }))
            .buffered(self.options.max_concurrency.max(1))
            .collect()
            .await;

        let mut entries = Vec::with_capacity(resolved.len());
        for (file, resolution) in resolved {
            match resolution {
                Ok((hash, reason)) => {
                    match reason {
                        Some(reason) => metrics.record_hashed(reason),
                        None => metrics.record_reused(),
                    }
                    entries.push(SnapshotEntry::new(hash, file.filename, file.directory));
                }
                Err(e) => metrics.record_failure(&file.path, e.to_string()),
            }
        }
        entries
    }

    async fn scan(&self, ctx: &PassContext) -> Result<Vec<TrackedFile>> {
        let scanner = DirectoryScanner::new(ScanOptions {
            tracked_extensions: ctx.tracked_extensions.clone(),
            exclude_dirs: ctx.exclude_dirs.clone(),
            follow_links: self.options.follow_links,
        });
        let data_dir = ctx.data_dir.clone();

        tokio::task::spawn_blocking(move || scanner.scan(&data_dir))
            .await
            .map_err(|e| TvcError::Task(format!("Scan task failed: {}", e)))?
    }

    /// Returns the hash and, when it was computed, why
    async fn resolve(
        &self,
        detector: &ChangeDetector,
        file: &TrackedFile,
        previous: Option<&SnapshotEntry>,
    ) -> Result<(String, Option<RehashReason>)> {
        match detector.decide(&file.path, previous).await? {
            HashDecision::Reuse(hash) => {
                debug!(path = %file.relative_path, "Reusing previous hash");
                Ok((hash, None))
            }
            HashDecision::Rehash(reason) => {
                debug!(path = %file.relative_path, ?reason, "Hashing");
                let hash = self.hasher.hash_file(&file.path).await?;
                Ok((hash, Some(reason)))
            }
        }
    }
}
