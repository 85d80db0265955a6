//! Streaming content hashing for tracked files

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use md5::Md5;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Result, TvcError};

/// Bytes read per chunk; matches the block size existing logs were produced with
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Hash algorithms supported for content digests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// MD5, the on-disk format of existing logs
    #[default]
    Md5,
    /// SHA-256 hash
    Sha256,
    /// Blake3 hash (faster)
    Blake3,
}

impl std::str::FromStr for HashAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "md5" => Ok(Self::Md5),
            "sha256" => Ok(Self::Sha256),
            "blake3" => Ok(Self::Blake3),
            other => Err(format!("unknown hash algorithm '{}'", other)),
        }
    }
}

enum RunningDigest {
    Md5(Md5),
    Sha256(Sha256),
    Blake3(Box<blake3::Hasher>),
}

impl RunningDigest {
    fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Md5 => Self::Md5(Md5::new()),
            HashAlgorithm::Sha256 => Self::Sha256(Sha256::new()),
            HashAlgorithm::Blake3 => Self::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    fn update(&mut self, chunk: &[u8]) {
        match self {
            Self::Md5(hasher) => hasher.update(chunk),
            Self::Sha256(hasher) => hasher.update(chunk),
            Self::Blake3(hasher) => {
                hasher.update(chunk);
            }
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            Self::Md5(hasher) => format!("{:x}", hasher.finalize()),
            Self::Sha256(hasher) => format!("{:x}", hasher.finalize()),
            Self::Blake3(hasher) => hasher.finalize().to_hex().to_string(),
        }
    }
}

/// Computes hex digests by streaming files in fixed-size chunks
#[derive(Debug, Clone, Copy)]
pub struct ContentHasher {
    algorithm: HashAlgorithm,
    chunk_size: usize,
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new(HashAlgorithm::default())
    }
}

impl ContentHasher {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self {
            algorithm,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(algorithm: HashAlgorithm, chunk_size: usize) -> Self {
        Self {
            algorithm,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Hash the file at `path`; memory use is bounded by the chunk size.
    ///
    /// The whole read loop runs on one blocking task.
    pub async fn hash_file<P: AsRef<Path>>(&self, path: P) -> Result<String> {
        let path = path.as_ref().to_path_buf();
        let hasher = *self;

        tokio::task::spawn_blocking(move || hasher.hash_file_blocking(&path))
            .await
            .map_err(|e| TvcError::Task(format!("Hash task failed: {}", e)))?
    }

    /// Synchronous counterpart of [`ContentHasher::hash_file`]
    pub fn hash_file_blocking(&self, path: &Path) -> Result<String> {
        let mut file = File::open(path).map_err(|e| {
            TvcError::hash_error(path, format!("Failed to open file: {}", e))
        })?;

        let mut digest = RunningDigest::new(self.algorithm);
        let mut buffer = vec![0u8; self.chunk_size];

        loop {
            let bytes_read = match file.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(TvcError::hash_error(path, format!("Failed to read file: {}", e)));
                }
            };

            digest.update(&buffer[..bytes_read]);
        }

        Ok(digest.finalize_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::fs;

    #[tokio::test]
    async fn test_md5_known_digests() {
        let temp_dir = TempDir::new().unwrap();
        let empty = temp_dir.path().join("empty.mp4");
        let hello = temp_dir.path().join("hello.mp4");
        fs::write(&empty, b"").await.unwrap();
        fs::write(&hello, b"hello world").await.unwrap();

        let hasher = ContentHasher::default();
        assert_eq!(hasher.hash_file(&empty).await.unwrap(), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(hasher.hash_file(&hello).await.unwrap(), "5eb63bbbe01eeed093cb22bb8f5acdc3");
    }

    #[tokio::test]
    async fn test_other_algorithms() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("hello.mp4");
        fs::write(&path, b"hello world").await.unwrap();

        let sha = ContentHasher::new(HashAlgorithm::Sha256).hash_file(&path).await.unwrap();
        assert_eq!(sha, "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9");

        let blake = ContentHasher::new(HashAlgorithm::Blake3).hash_file(&path).await.unwrap();
        assert_eq!(blake, blake3::hash(b"hello world").to_hex().to_string());
    }

    #[tokio::test]
    async fn test_chunk_boundaries_do_not_change_digest() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("big.mp4");
        let data: Vec<u8> = (0..(DEFAULT_CHUNK_SIZE * 3 + 17)).map(|i| (i % 251) as u8).collect();
        fs::write(&path, &data).await.unwrap();

        let expected = format!("{:x}", Md5::digest(&data));
        let default = ContentHasher::default().hash_file(&path).await.unwrap();
        let tiny = ContentHasher::with_chunk_size(HashAlgorithm::Md5, 7).hash_file(&path).await.unwrap();

        assert_eq!(default, expected);
        assert_eq!(tiny, expected);
    }

    #[test]
    fn test_blocking_hash_matches_large_file_digest() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("large.mp4");
        let data: Vec<u8> = (0..(1 << 20) + 5).map(|i| (i % 253) as u8).collect();
        std::fs::write(&path, &data).unwrap();

        let digest = ContentHasher::default().hash_file_blocking(&path).unwrap();
        assert_eq!(digest, format!("{:x}", Md5::digest(&data)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_hashes_on_multi_thread_runtime() {
        let temp_dir = TempDir::new().unwrap();
        let mut paths = Vec::new();
        for i in 0..8u8 {
            let path = temp_dir.path().join(format!("{}.mp4", i));
            fs::write(&path, vec![i; DEFAULT_CHUNK_SIZE * 2 + usize::from(i)]).await.unwrap();
            paths.push(path);
        }

        let hasher = ContentHasher::default();
        let digests = futures::future::try_join_all(paths.iter().map(|p| hasher.hash_file(p)))
            .await
            .unwrap();

        for (i, digest) in digests.iter().enumerate() {
            let expected = vec![i as u8; DEFAULT_CHUNK_SIZE * 2 + i];
            assert_eq!(digest, &format!("{:x}", Md5::digest(&expected)));
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_hash_error() {
        let temp_dir = TempDir::new().unwrap();
        let result = ContentHasher::default().hash_file(temp_dir.path().join("gone.mp4")).await;

        match result {
            Err(e @ TvcError::Hash { .. }) => assert!(e.is_recoverable()),
            other => panic!("Expected hash error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_algorithm() {
        assert_eq!("MD5".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Md5);
        assert_eq!("blake3".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Blake3);
        assert!("crc32".parse::<HashAlgorithm>().is_err());
    }
}
