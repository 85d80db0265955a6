//! Snapshot logs: flat `md5,filename,directory` tables, one per data root

use std::collections::HashMap;
use std::path::{Component, Path};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, TvcError};
use crate::fsutil;

/// Fixed header row of every snapshot log
pub const LOG_HEADER: [&str; 3] = ["md5", "filename", "directory"];

/// One row of a snapshot log
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotEntry {
    /// Hex digest of the file content
    pub content_hash: String,
    /// Bare file name
    pub filename: String,
    /// Directory relative to the data root, '/'-separated, empty for the root itself
    pub directory: String,
}

impl SnapshotEntry {
    pub fn new(
        content_hash: impl Into<String>,
        filename: impl Into<String>,
        directory: impl Into<String>,
    ) -> Self {
        Self {
            content_hash: content_hash.into(),
            filename: filename.into(),
            directory: directory.into(),
        }
    }

    /// `directory/filename`, or just `filename` for entries in the root
    pub fn relative_path(&self) -> String {
        join_relative(&self.directory, &self.filename)
    }

    /// Whether the relative path stays inside the data root: a bare file name
    /// and only normal components, so no absolute prefix or `..`
    pub fn is_contained(&self) -> bool {
        !self.filename.is_empty()
            && !self.filename.contains('/')
            && Path::new(&self.relative_path())
                .components()
                .all(|component| matches!(component, Component::Normal(_)))
    }
}

/// Join a relative directory and a file name with '/'
pub fn join_relative(directory: &str, filename: &str) -> String {
    if directory.is_empty() {
        filename.to_string()
    } else {
        format!("{}/{}", directory, filename)
    }
}

/// Ordered list of entries describing one data root
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub entries: Vec<SnapshotEntry>,
}

impl Snapshot {
    pub fn new(entries: Vec<SnapshotEntry>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SnapshotEntry> {
        self.entries.iter()
    }

    /// Index entries by relative path. The first occurrence of a duplicated path wins.
    pub fn index_by_path(&self) -> HashMap<String, &SnapshotEntry> {
        let mut index = HashMap::with_capacity(self.entries.len());
        for entry in &self.entries {
            index.entry(entry.relative_path()).or_insert(entry);
        }
        index
    }

    /// Read a snapshot log. A log that does not exist yet reads as empty.
    ///
    /// The header row and blank rows are skipped. Rows with fewer than three
    /// columns, fields that are not UTF-8, or paths escaping the data root are
    /// logged and dropped, so the files they describe get re-hashed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let file = match std::fs::File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No snapshot log at {}, starting empty", path.display());
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(TvcError::snapshot_error(path, format!("Failed to open log: {}", e)));
            }
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(file);

        let mut entries = Vec::new();
        for (index, record) in reader.byte_records().enumerate() {
            let record = record.map_err(|e| {
                TvcError::snapshot_error(path, format!("Failed to read log: {}", e))
            })?;
            // +2: one for the header, one for 1-based numbering
            let row = index + 2;

            if record.iter().all(|field| field.is_empty()) {
                continue;
            }

            if record.len() < LOG_HEADER.len() {
                warn!(
                    "Skipping malformed row {} in {}: expected {} columns, found {}",
                    row,
                    path.display(),
                    LOG_HEADER.len(),
                    record.len()
                );
                continue;
            }

            let fields = (
                std::str::from_utf8(&record[0]),
                std::str::from_utf8(&record[1]),
                std::str::from_utf8(&record[2]),
            );
            let entry = match fields {
                (Ok(hash), Ok(filename), Ok(directory)) => SnapshotEntry::new(hash, filename, directory),
                _ => {
                    warn!("Skipping row {} in {}: not valid UTF-8", row, path.display());
                    continue;
                }
            };

            if !entry.is_contained() {
                warn!(
                    "Skipping row {} in {}: '{}' is not a path inside the data root",
                    row,
                    path.display(),
                    entry.relative_path()
                );
                continue;
            }

            entries.push(entry);
        }

        Ok(Self { entries })
    }

    /// Replace the log at `path` with this snapshot, header first
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        fsutil::atomic_write_with(path, |file| {
            let mut writer = csv::Writer::from_writer(file);
            writer.write_record(LOG_HEADER)?;
            for entry in &self.entries {
                writer.write_record([&entry.content_hash, &entry.filename, &entry.directory])?;
            }
            writer.flush()
        })
        .map_err(|e| TvcError::snapshot_error(path, format!("Failed to write log: {}", e)))
    }

    /// Write an empty log holding only the header row
    pub fn create_empty<P: AsRef<Path>>(path: P) -> Result<()> {
        Self::default().save(path)
    }
}

impl FromIterator<SnapshotEntry> for Snapshot {
    fn from_iter<I: IntoIterator<Item = SnapshotEntry>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn sample() -> Snapshot {
        Snapshot::new(vec![
            SnapshotEntry::new("d41d8cd98f00b204e9800998ecf8427e", "a.mp4", ""),
            SnapshotEntry::new("0cc175b9c0f1b6a831c399e269772661", "b.mp4", "videos/2024"),
        ])
    }

    #[test]
    fn test_missing_log_is_empty_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        let snapshot = Snapshot::load(temp_dir.path().join("local_log.csv")).unwrap();
        assert!(snapshot.is_empty());
    }

    #[test]
    fn test_save_writes_header_then_rows() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("remote_log.csv");

        sample().save(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "md5,filename,directory");
        assert_eq!(lines[1], "d41d8cd98f00b204e9800998ecf8427e,a.mp4,");
        assert_eq!(lines[2], "0cc175b9c0f1b6a831c399e269772661,b.mp4,videos/2024");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_empty_log_has_header_only() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("local_log.csv");

        Snapshot::create_empty(&path).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "md5,filename,directory\n");
        assert!(Snapshot::load(&path).unwrap().is_empty());
    }

    #[test]
    fn test_load_skips_blank_and_malformed_rows() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("local_log.csv");
        std::fs::write(
            &path,
            "md5,filename,directory\n\
             aaa,one.mp4,\n\
             \n\
             bbb,two.mp4\n\
             ccc,three.mp4,clips\n",
        )
        .unwrap();

        let snapshot = Snapshot::load(&path).unwrap();
        assert_eq!(
            snapshot.entries,
            vec![
                SnapshotEntry::new("aaa", "one.mp4", ""),
                SnapshotEntry::new("ccc", "three.mp4", "clips"),
            ]
        );
    }

    #[test]
    fn test_load_skips_rows_that_are_not_utf8() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("local_log.csv");
        std::fs::write(
            &path,
            b"md5,filename,directory\n\
              abc,caf\xe9.mp4,\n\
              0cc175b9c0f1b6a831c399e269772661,a.mp4,\n",
        )
        .unwrap();

        let snapshot = Snapshot::load(&path).unwrap();
        assert_eq!(
            snapshot.entries,
            vec![SnapshotEntry::new("0cc175b9c0f1b6a831c399e269772661", "a.mp4", "")]
        );
    }

    #[test]
    fn test_load_skips_paths_outside_the_root() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("remote_log.csv");
        std::fs::write(
            &path,
            "md5,filename,directory\n\
             aaa,evil.mp4,../..\n\
             bbb,abs.mp4,/etc\n\
             ccc,..,clips\n\
             ddd,ok.mp4,clips/2024\n",
        )
        .unwrap();

        let snapshot = Snapshot::load(&path).unwrap();
        assert_eq!(snapshot.entries, vec![SnapshotEntry::new("ddd", "ok.mp4", "clips/2024")]);
    }

    #[test]
    fn test_is_contained() {
        assert!(SnapshotEntry::new("h", "a.mp4", "").is_contained());
        assert!(SnapshotEntry::new("h", "a.mp4", "x/y").is_contained());
        assert!(!SnapshotEntry::new("h", "a.mp4", "x/../..").is_contained());
        assert!(!SnapshotEntry::new("h", "a.mp4", "./x").is_contained());
        assert!(!SnapshotEntry::new("h", "a/b.mp4", "").is_contained());
        assert!(!SnapshotEntry::new("h", "", "x").is_contained());
    }

    #[test]
    fn test_names_with_commas_survive() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("log.csv");
        let snapshot = Snapshot::new(vec![SnapshotEntry::new("h", "take 1, final.wav", "a \"b\"")]);

        snapshot.save(&path).unwrap();
        assert_eq!(Snapshot::load(&path).unwrap(), snapshot);
    }

    #[test]
    fn test_index_by_path_prefers_first_duplicate() {
        let snapshot = Snapshot::new(vec![
            SnapshotEntry::new("first", "x.mp4", "d"),
            SnapshotEntry::new("second", "x.mp4", "d"),
            SnapshotEntry::new("other", "x.mp4", ""),
        ]);

        let index = snapshot.index_by_path();
        assert_eq!(index.len(), 2);
        assert_eq!(index["d/x.mp4"].content_hash, "first");
        assert_eq!(index["x.mp4"].content_hash, "other");
    }

    fn entry_strategy() -> impl Strategy<Value = SnapshotEntry> {
        (
            "[0-9a-f]{32}",
            "[A-Za-z0-9 ,_\\-\"]{1,12}\\.[a-z0-9]{1,4}",
            prop_oneof![Just(String::new()), "[A-Za-z0-9_]{1,8}(/[A-Za-z0-9_]{1,8}){0,2}"],
        )
            .prop_map(|(hash, filename, directory)| SnapshotEntry::new(hash, filename, directory))
    }

    proptest! {
        #[test]
        fn prop_save_load_save_is_stable(entries in prop::collection::vec(entry_strategy(), 0..16)) {
            let temp_dir = TempDir::new().unwrap();
            let first = temp_dir.path().join("first.csv");
            let second = temp_dir.path().join("second.csv");
            let snapshot = Snapshot::new(entries);

            snapshot.save(&first).unwrap();
            let loaded = Snapshot::load(&first).unwrap();
            loaded.save(&second).unwrap();

            prop_assert_eq!(&loaded, &snapshot);
            prop_assert_eq!(std::fs::read(&first).unwrap(), std::fs::read(&second).unwrap());
        }
    }
}
