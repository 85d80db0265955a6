//! Directory scanning for tracked files using walkdir

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{Result, TvcError};
use crate::snapshot::join_relative;

/// Options for directory scanning
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanOptions {
    /// Extensions to keep, each including the leading '.'; matched case-sensitively
    pub tracked_extensions: Vec<String>,
    /// Directories (as joined onto the scan root) that are never descended into
    pub exclude_dirs: Vec<PathBuf>,
    /// Follow symbolic links
    pub follow_links: bool,
}

/// A tracked file found under a scan root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedFile {
    /// Path to the file, the scan root joined with the relative path
    pub path: PathBuf,
    /// Bare file name
    pub filename: String,
    /// Parent directory relative to the scan root, '/'-separated, empty for the root
    pub directory: String,
    /// `directory/filename`
    pub relative_path: String,
}

/// Scanner producing the tracked files under a root, in a stable order
pub struct DirectoryScanner {
    options: ScanOptions,
}

impl DirectoryScanner {
    /// Create a new directory scanner with options
    pub fn new(options: ScanOptions) -> Self {
        Self { options }
    }

    /// Walk `root_path` and return every regular file with a tracked extension.
    ///
    /// Entries are visited in file-name order at each level. A missing or
    /// unreadable root is fatal; unreadable entries below it are skipped.
    pub fn scan<P: AsRef<Path>>(&self, root_path: P) -> Result<Vec<TrackedFile>> {
        let root_path = root_path.as_ref();

        if !root_path.exists() {
            return Err(TvcError::directory_error(root_path, "Directory does not exist"));
        }

        if !root_path.is_dir() {
            return Err(TvcError::directory_error(root_path, "Path is not a directory"));
        }

        if self.options.tracked_extensions.is_empty() {
            debug!("No tracked extensions, nothing to scan in {}", root_path.display());
            return Ok(Vec::new());
        }

        let walker = WalkDir::new(root_path)
            .follow_links(self.options.follow_links)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                !(entry.file_type().is_dir()
                    && self.options.exclude_dirs.iter().any(|dir| entry.path() == dir))
            });

        let mut files = Vec::new();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => {
                    return Err(TvcError::directory_error(
                        root_path,
                        format!("Failed to read directory: {}", e),
                    ));
                }
                Err(e) => {
                    warn!("Skipping unreadable entry under {}: {}", root_path.display(), e);
                    continue;
                }
            };

            if !entry.file_type().is_file() || !self.is_tracked(entry.path()) {
                continue;
            }

            match tracked_file(root_path, entry.path()) {
                Some(file) => files.push(file),
                None => warn!("Skipping non UTF-8 path {}", entry.path().display()),
            }
        }

        debug!("Found {} tracked files under {}", files.len(), root_path.display());
        Ok(files)
    }

    /// Whether the file's extension, with its leading '.', is tracked
    pub fn is_tracked(&self, path: &Path) -> bool {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) => self
                .options
                .tracked_extensions
                .iter()
                .any(|tracked| tracked.strip_prefix('.') == Some(ext)),
            None => false,
        }
    }
}

fn tracked_file(root_path: &Path, path: &Path) -> Option<TrackedFile> {
    let relative = path.strip_prefix(root_path).ok()?;
    let filename = relative.file_name()?.to_str()?.to_string();

    let mut parts = Vec::new();
    if let Some(parent) = relative.parent() {
        for component in parent.components() {
            if let Component::Normal(part) = component {
                parts.push(part.to_str()?);
            }
        }
    }
    let directory = parts.join("/");
    let relative_path = join_relative(&directory, &filename);

    Some(TrackedFile {
        path: path.to_path_buf(),
        filename,
        directory,
        relative_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use std::fs;

    fn scanner(extensions: &[&str]) -> DirectoryScanner {
        DirectoryScanner::new(ScanOptions {
            tracked_extensions: extensions.iter().map(|e| e.to_string()).collect(),
            ..Default::default()
        })
    }

    #[test]
    fn test_scan_filters_by_extension() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        fs::write(root.join("a.mp4"), b"video").unwrap();
        fs::write(root.join("b.txt"), b"text").unwrap();
        fs::write(root.join("c.MP4"), b"shouty").unwrap();
        fs::write(root.join(".mp4"), b"dotfile").unwrap();
        fs::write(root.join("d.mp4x"), b"almost").unwrap();

        let files = scanner(&[".mp4"]).scan(root).unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(names, vec!["a.mp4"]);
    }

    #[test]
    fn test_scan_recurses_with_relative_directories() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        fs::create_dir_all(root.join("videos").join("2024")).unwrap();
        fs::write(root.join("top.wav"), b"1").unwrap();
        fs::write(root.join("videos").join("clip.mp4"), b"2").unwrap();
        fs::write(root.join("videos").join("2024").join("deep.mp4"), b"3").unwrap();

        let files = scanner(&[".mp4", ".wav"]).scan(root).unwrap();
        let rel: Vec<(&str, &str, &str)> = files
            .iter()
            .map(|f| (f.directory.as_str(), f.filename.as_str(), f.relative_path.as_str()))
            .collect();

        assert_eq!(
            rel,
            vec![
                ("", "top.wav", "top.wav"),
                ("videos/2024", "deep.mp4", "videos/2024/deep.mp4"),
                ("videos", "clip.mp4", "videos/clip.mp4"),
            ]
        );
        assert_eq!(files[0].path, root.join("top.wav"));
    }

    #[test]
    fn test_scan_order_is_deterministic() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        for name in ["z.mp4", "m.mp4", "a.mp4"] {
            fs::write(root.join(name), name).unwrap();
        }

        let scanner = scanner(&[".mp4"]);
        let first = scanner.scan(root).unwrap();
        let second = scanner.scan(root).unwrap();

        assert_eq!(first, second);
        assert_eq!(first[0].filename, "a.mp4");
        assert_eq!(first[2].filename, "z.mp4");
    }

    #[test]
    fn test_excluded_directories_are_not_walked() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir(root.join(".tvc")).unwrap();
        fs::write(root.join(".tvc").join("cached.mp4"), b"x").unwrap();
        fs::write(root.join("kept.mp4"), b"y").unwrap();

        let scanner = DirectoryScanner::new(ScanOptions {
            tracked_extensions: vec![".mp4".to_string()],
            exclude_dirs: vec![root.join(".tvc")],
            ..Default::default()
        });

        let files = scanner.scan(root).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].filename, "kept.mp4");
    }

    #[test]
    fn test_empty_extension_list_matches_nothing() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("a.mp4"), b"x").unwrap();

        assert!(scanner(&[]).scan(temp_dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_missing_root_is_directory_error() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("nope");

        let result = scanner(&[".mp4"]).scan(&missing);
        assert!(matches!(result, Err(TvcError::Directory { .. })));
    }

    #[test]
    fn test_file_root_is_directory_error() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("a.mp4");
        fs::write(&file, b"x").unwrap();

        let result = scanner(&[".mp4"]).scan(&file);
        assert!(matches!(result, Err(TvcError::Directory { .. })));
    }
}
