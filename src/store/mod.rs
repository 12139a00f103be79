//! Hash-keyed artifact storage.
//!
//! Maps a content identity to the canonical paths of its derived artifacts
//! inside a single storage root, and answers the existence query that drives
//! deduplication. The root is always threaded in explicitly so tests can run
//! against a throwaway directory.

use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::debug;

use crate::identity::ContentIdentity;

/// The pair of artifact paths derived from one content identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSet {
    /// Canonical encoded audio artifact (`<root>/<identity>.mp3`).
    pub encoded: PathBuf,

    /// Binary waveform artifact (`<root>/waveform-<identity>`).
    pub waveform: PathBuf,
}

/// Artifact namespace rooted at the upload directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Create a store over the given root directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The storage root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root directory if it does not exist yet.
    pub async fn ensure_root(&self) -> Result<(), std::io::Error> {
        tokio::fs::create_dir_all(&self.root).await
    }

    /// Canonical path of the encoded audio artifact.
    pub fn encoded_path(&self, identity: &ContentIdentity) -> PathBuf {
        self.root.join(format!("{}.mp3", identity))
    }

    /// Canonical path of the waveform artifact.
    pub fn waveform_path(&self, identity: &ContentIdentity) -> PathBuf {
        self.root.join(format!("waveform-{}", identity))
    }

    /// Both artifact paths for an identity.
    pub fn artifact_set(&self, identity: &ContentIdentity) -> ArtifactSet {
        ArtifactSet {
            encoded: self.encoded_path(identity),
            waveform: self.waveform_path(identity),
        }
    }

    /// Hidden staging path for an upload being processed
    /// (`<root>/.<display-name>`).
    ///
    /// Only the final path component of the display name is used, so a
    /// hostile name cannot escape the root.
    pub fn staging_path(&self, display_name: &str) -> PathBuf {
        let name = Path::new(display_name)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| display_name.to_string());
        self.root.join(format!(".{}", name))
    }

    /// True only if BOTH artifacts exist.
    ///
    /// A half-complete prior run (one artifact present, one missing) counts
    /// as absent, which forces both production steps to re-run.
    pub fn exists(&self, identity: &ContentIdentity) -> bool {
        let set = self.artifact_set(identity);
        let present = set.encoded.exists() && set.waveform.exists();
        debug!(%identity, present, "artifact existence check");
        present
    }

    /// Take the advisory lock for an identity.
    ///
    /// Conversions of byte-identical content serialize on this lock, so the
    /// loser of a concurrent race observes the winner's published artifacts
    /// and takes the dedup path instead of re-encoding. The lock is released
    /// when the returned guard is dropped; the `.lock-<identity>` file stays
    /// behind as the in-progress marker.
    pub async fn lock_identity(
        &self,
        identity: &ContentIdentity,
    ) -> Result<IdentityLock, std::io::Error> {
        let path = self.root.join(format!(".lock-{}", identity));

        let file = tokio::task::spawn_blocking(move || {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .write(true)
                .open(&path)?;
            file.lock_exclusive()?;
            Ok::<_, std::io::Error>(file)
        })
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))??;

        Ok(IdentityLock { _file: file })
    }
}

/// Guard for a held identity lock. Dropping it releases the lock.
#[derive(Debug)]
pub struct IdentityLock {
    _file: std::fs::File,
}
