//! Repository configuration stored as JSON in `.tvc/config`

use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, TvcError};
use crate::fsutil;

/// strftime layout of the `last_update` checkpoint, e.g. `2024-03-01T12:30:00+0000`
pub const CHECKPOINT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%z";

/// Contents of `.tvc/config`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Root of the remote data directory
    pub remote: PathBuf,
    /// Tracked extensions in insertion order, each starting with '.'
    #[serde(default)]
    pub tracked_extensions: Vec<String>,
    /// Checkpoint of the last successful update; empty string on disk when unset
    #[serde(default, with = "checkpoint_serde")]
    pub last_update: Option<DateTime<FixedOffset>>,
}

impl Config {
    /// Fresh config as written by `init`: no extensions, no checkpoint
    pub fn new(remote: impl Into<PathBuf>) -> Self {
        Self {
            remote: remote.into(),
            tracked_extensions: Vec::new(),
            last_update: None,
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            TvcError::config_error(path, format!("Failed to read config: {}", e))
        })?;
        let config: Config = serde_json::from_str(&content).map_err(|e| {
            TvcError::config_error(path, format!("Failed to parse config: {}", e))
        })?;
        config.validate(path)?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_vec_pretty(self)?;
        fsutil::atomic_write(path, &content).map_err(|e| {
            TvcError::config_error(path, format!("Failed to write config: {}", e))
        })
    }

    fn validate(&self, path: &Path) -> Result<()> {
        for ext in &self.tracked_extensions {
            validate_extension(ext).map_err(|_| {
                TvcError::config_error(path, format!("Invalid tracked extension '{}'", ext))
            })?;
        }
        Ok(())
    }

    /// Add a tracked extension. Returns false if it was already tracked.
    pub fn add_extension(&mut self, extension: &str) -> Result<bool> {
        validate_extension(extension)?;

        if self.tracked_extensions.iter().any(|e| e == extension) {
            info!("Extension {} is already tracked", extension);
            return Ok(false);
        }

        self.tracked_extensions.push(extension.to_string());
        Ok(true)
    }

    /// Move the checkpoint to `at`, never backwards
    pub fn advance_checkpoint(&mut self, at: DateTime<FixedOffset>) {
        self.last_update = Some(match self.last_update {
            Some(previous) if previous > at => previous,
            _ => at,
        });
    }
}

/// An extension is a single '.' followed by at least one character, with no path separators.
/// Files are matched on the text after their last '.'.
pub fn validate_extension(extension: &str) -> Result<()> {
    let valid = match extension.strip_prefix('.') {
        Some(rest) => !rest.is_empty() && !rest.contains(['.', '/', '\\']),
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(TvcError::InvalidExtension(extension.to_string()))
    }
}

/// Current time in UTC, truncated to the one-second resolution of the stored checkpoint
pub fn checkpoint_now() -> DateTime<FixedOffset> {
    Utc::now().trunc_subsecs(0).fixed_offset()
}

pub fn format_checkpoint(at: &DateTime<FixedOffset>) -> String {
    at.format(CHECKPOINT_FORMAT).to_string()
}

pub fn parse_checkpoint(value: &str) -> std::result::Result<DateTime<FixedOffset>, chrono::ParseError> {
    DateTime::parse_from_str(value, CHECKPOINT_FORMAT)
}

mod checkpoint_serde {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<DateTime<FixedOffset>>, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(at) => serializer.serialize_str(&format_checkpoint(at)),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<Option<DateTime<FixedOffset>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        if raw.trim().is_empty() {
            return Ok(None);
        }
        parse_checkpoint(raw.trim())
            .map(Some)
            .map_err(|e| serde::de::Error::custom(format!("invalid last_update '{}': {}", raw, e)))
    }
}
