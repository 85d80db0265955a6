//! A tvc repository: the local data root with its `.tvc` metadata directory

use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use crate::config::{checkpoint_now, format_checkpoint, Config};
use crate::error::{Result, TvcError};
use crate::metrics::{PullMetrics, ReconcileMetrics};
use crate::pull::{self, PullOptions};
use crate::reconciler::{PassContext, PassRole, ReconcileOptions, Reconciler};
use crate::snapshot::Snapshot;

/// Name of the metadata directory inside the repository root
pub const TVC_DIR: &str = ".tvc";
pub const CONFIG_FILE: &str = "config";
pub const LOCAL_LOG: &str = "local_log.csv";
pub const REMOTE_LOG: &str = "remote_log.csv";

/// Outcome of an update: both passes and the checkpoint that was recorded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateReport {
    pub session_id: Uuid,
    pub checkpoint: DateTime<FixedOffset>,
    pub local: ReconcileMetrics,
    pub remote: ReconcileMetrics,
}

/// Outcome of a pull
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullReport {
    pub session_id: Uuid,
    pub metrics: PullMetrics,
}

pub struct Repository {
    root: PathBuf,
    config: Config,
}

impl Repository {
    /// Create `.tvc` under `root` with an empty config and empty logs.
    ///
    /// `remote` must be an existing directory; it is stored as an absolute path.
    pub fn init(root: impl Into<PathBuf>, remote: impl AsRef<Path>) -> Result<Self> {
        let root = root.into();
        let remote = remote.as_ref();

        if !remote.is_dir() {
            return Err(TvcError::directory_error(remote, "Not an accessible directory location"));
        }
        let remote = std::fs::canonicalize(remote).map_err(|e| {
            TvcError::directory_error(remote, format!("Failed to resolve remote path: {}", e))
        })?;

        let tvc_dir = root.join(TVC_DIR);
        if tvc_dir.exists() {
            return Err(TvcError::AlreadyInitialized(root));
        }
        std::fs::create_dir_all(&tvc_dir).map_err(|e| {
            TvcError::directory_error(&tvc_dir, format!("Failed to create metadata directory: {}", e))
        })?;

        let repository = Self {
            root,
            config: Config::new(remote),
        };
        repository.config.save(repository.config_path())?;
        Snapshot::create_empty(repository.local_log_path())?;
        Snapshot::create_empty(repository.remote_log_path())?;

        info!(
            "Initialized tvc repository at {} tracking remote {}",
            repository.root.display(),
            repository.config.remote.display()
        );
        Ok(repository)
    }

    /// Open an existing repository rooted at `root`
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let config_path = root.join(TVC_DIR).join(CONFIG_FILE);
        if !config_path.exists() {
            return Err(TvcError::NotInitialized(root));
        }

        let config = Config::load(&config_path)?;
        Ok(Self { root, config })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn tvc_dir(&self) -> PathBuf {
        self.root.join(TVC_DIR)
    }

    pub fn config_path(&self) -> PathBuf {
        self.tvc_dir().join(CONFIG_FILE)
    }

    pub fn local_log_path(&self) -> PathBuf {
        self.tvc_dir().join(LOCAL_LOG)
    }

    pub fn remote_log_path(&self) -> PathBuf {
        self.tvc_dir().join(REMOTE_LOG)
    }

    /// Remote data root; a relative path in the config is taken from the repository root
    pub fn remote_root(&self) -> PathBuf {
        if self.config.remote.is_absolute() {
            self.config.remote.clone()
        } else {
            self.root.join(&self.config.remote)
        }
    }

    /// Track a new extension and persist the config. Returns false if already tracked.
    pub fn add_extension(&mut self, extension: &str) -> Result<bool> {
        let added = self.config.add_extension(extension)?;
        if added {
            self.config.save(self.config_path())?;
            info!("Now tracking {} files", extension);
        }
        Ok(added)
    }

    /// Build the context for one pass, with the checkpoint passed explicitly
    pub fn pass_context(&self, role: PassRole, last_update: Option<DateTime<FixedOffset>>) -> PassContext {
        let (data_dir, log_path) = match role {
            PassRole::Local => (self.root.clone(), self.local_log_path()),
            PassRole::Remote => (self.remote_root(), self.remote_log_path()),
        };

        PassContext {
            role,
            exclude_dirs: vec![data_dir.join(TVC_DIR)],
            data_dir,
            log_path,
            tracked_extensions: self.config.tracked_extensions.clone(),
            last_update,
        }
    }

    /// Refresh both logs concurrently, then advance the checkpoint.
    ///
    /// The checkpoint recorded is the time this call started, truncated to the
    /// second, so anything modified while the passes run is re-hashed next time.
    /// If either pass fails the checkpoint stays where it was.
    pub async fn update(&mut self, options: ReconcileOptions) -> Result<UpdateReport> {
        let session_id = Uuid::new_v4();
        let started = checkpoint_now();

        self.config = Config::load(self.config_path())?;
        let last_update = self.config.last_update;
        info!(
            %session_id,
            last_update = %last_update.as_ref().map(format_checkpoint).unwrap_or_default(),
            "Updating logs"
        );

        let reconciler = Reconciler::new(options);
        let local_ctx = self.pass_context(PassRole::Local, last_update);
        let remote_ctx = self.pass_context(PassRole::Remote, last_update);

        let (local, remote) = tokio::join!(
            reconciler.reconcile(&local_ctx),
            reconciler.reconcile(&remote_ctx)
        );

        let (local, remote) = match (local, remote) {
            (Ok(local), Ok(remote)) => (local, remote),
            (Err(e), Ok(_)) | (Ok(_), Err(e)) => return Err(e),
            (Err(e), Err(other)) => {
                error!("Remote pass failed as well: {}", other);
                return Err(e);
            }
        };

        self.config.advance_checkpoint(started);
        self.config.save(self.config_path())?;
        let checkpoint = self.config.last_update.unwrap_or(started);

        Ok(UpdateReport {
            session_id,
            checkpoint,
            local: local.metrics,
            remote: remote.metrics,
        })
    }

    /// Copy remote files over local paths with the same logged hash
    pub async fn pull(&self, options: PullOptions) -> Result<PullReport> {
        let session_id = Uuid::new_v4();
        let local = Snapshot::load(self.local_log_path())?;
        let remote = Snapshot::load(self.remote_log_path())?;

        info!(%session_id, local_entries = local.len(), remote_entries = remote.len(), "Pulling");
        let metrics = pull::pull(&self.root, &self.remote_root(), &local, &remote, &options).await?;

        Ok(PullReport { session_id, metrics })
    }
}
