//! Content identity derivation.
//!
//! Every uploaded file is keyed by the SHA-256 of its bytes, so the same
//! content always lands on the same artifact paths no matter what the file
//! was called or when it arrived.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::AsyncReadExt;

/// Read chunk size for hashing. Not part of the contract.
const HASH_CHUNK_BYTES: usize = 64 * 1024;

/// Content identifier: lowercase hex SHA-256 of the full file bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentIdentity(String);

impl ContentIdentity {
    /// Hash a file's bytes into its content identity.
    ///
    /// Streams the file in chunks; never holds the whole file in memory.
    /// A read failure mid-stream is fatal for the invocation and surfaces
    /// to the caller.
    pub async fn from_file(path: &Path) -> Result<Self, std::io::Error> {
        let mut file = File::open(path).await?;
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; HASH_CHUNK_BYTES];

        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }

        Ok(Self(hex::encode(hasher.finalize())))
    }

    /// Get the raw hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ContentIdentity {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let s = s.trim();
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            anyhow::bail!("not a content identity (expected 64 hex chars): {}", s);
        }
        Ok(Self(s.to_ascii_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_known_digest() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("abc.bin");
        tokio::fs::write(&path, b"abc").await.unwrap();

        let id = ContentIdentity::from_file(&path).await.unwrap();
        assert_eq!(
            id.as_str(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn test_identity_ignores_file_name() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("song.wav");
        let b = temp.path().join("copy.wav");
        tokio::fs::write(&a, b"same bytes").await.unwrap();
        tokio::fs::write(&b, b"same bytes").await.unwrap();

        let id_a = ContentIdentity::from_file(&a).await.unwrap();
        let id_b = ContentIdentity::from_file(&b).await.unwrap();
        assert_eq!(id_a, id_b);
        assert_eq!(id_a.as_str().len(), 64);
    }

    #[tokio::test]
    async fn test_distinct_content_distinct_identity() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a");
        let b = temp.path().join("b");
        tokio::fs::write(&a, b"one").await.unwrap();
        tokio::fs::write(&b, b"two").await.unwrap();

        let id_a = ContentIdentity::from_file(&a).await.unwrap();
        let id_b = ContentIdentity::from_file(&b).await.unwrap();
        assert_ne!(id_a, id_b);
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("nope.wav");
        assert!(ContentIdentity::from_file(&missing).await.is_err());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("abc123".parse::<ContentIdentity>().is_err());
        assert!("zz".repeat(32).parse::<ContentIdentity>().is_err());

        let valid = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";
        assert_eq!(valid.parse::<ContentIdentity>().unwrap().as_str(), valid);
    }
}
