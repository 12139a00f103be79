//! Conversion pipeline orchestration.
//!
//! One invocation runs strictly sequentially: quarantine the upload under a
//! hidden staging name, hash its bytes, resolve the hash-keyed artifact
//! paths, and either reuse existing artifacts or produce fresh ones through
//! the encoder and waveform adapters. Metadata is refreshed either way, and
//! the staging file is removed no matter which stage failed.
//!
//! Concurrent invocations over byte-identical content serialize on a
//! per-identity advisory lock, and artifacts are published with a
//! temp-write-then-rename so a canonical path never holds a partial file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::{
    AudioEncoder, EncodeError, LameEncoder, WaveformCli, WaveformError, WaveformExtractor,
};
use crate::config::ConversionConfig;
use crate::identity::ContentIdentity;
use crate::metadata::{read_metadata, TrackMetadata};
use crate::store::{ArtifactSet, ArtifactStore};

/// An upload handed over by the transport layer: bytes already written to a
/// temporary location inside the upload root, plus the name the user gave it.
///
/// The pipeline consumes the file: it is renamed into staging and deleted
/// before the call returns.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub path: PathBuf,
    pub display_name: String,
}

/// Errors a conversion attempt can surface through [`ConversionPipeline::try_convert`].
///
/// Metadata failures never appear here; they are swallowed at the source.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encode failed: {0}")]
    Encode(#[from] EncodeError),

    #[error("waveform extraction failed: {0}")]
    Waveform(#[from] WaveformError),
}

/// Outcome of one pipeline invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionResult {
    /// Content identity of the upload. Empty when hashing itself failed.
    pub hash: String,

    /// Canonical encoded artifact path.
    pub file_name: Option<PathBuf>,

    /// Waveform artifact path.
    pub waveform_location: Option<PathBuf>,

    /// Best-effort descriptive metadata.
    pub metadata: Option<TrackMetadata>,

    /// True when existing artifacts were reused instead of freshly produced.
    #[serde(rename = "sharedFile")]
    pub shared_file: bool,
}

impl ConversionResult {
    /// Degraded result returned by the always-respond facade on hard
    /// failure: callers detect it by the empty hash and unset paths.
    fn failed() -> Self {
        Self {
            hash: String::new(),
            file_name: None,
            waveform_location: None,
            metadata: None,
            shared_file: false,
        }
    }
}

/// The conversion orchestrator. Stateless between invocations apart from the
/// shared artifact namespace on disk.
pub struct ConversionPipeline {
    store: ArtifactStore,
    encoder: Box<dyn AudioEncoder>,
    waveform: Box<dyn WaveformExtractor>,
    config: ConversionConfig,
}

impl ConversionPipeline {
    /// Build a pipeline over the real subprocess adapters.
    pub fn new(config: ConversionConfig) -> Self {
        let encoder = Box::new(LameEncoder::with_binary_path(&config.lame_path));
        let waveform = Box::new(WaveformCli::with_binary_path(&config.waveform_path));
        Self::with_adapters(config, encoder, waveform)
    }

    /// Build a pipeline with explicit adapters. Tests use this to substitute
    /// in-process fakes.
    pub fn with_adapters(
        config: ConversionConfig,
        encoder: Box<dyn AudioEncoder>,
        waveform: Box<dyn WaveformExtractor>,
    ) -> Self {
        Self {
            store: ArtifactStore::new(config.root.clone()),
            encoder,
            waveform,
            config,
        }
    }

    /// The artifact store backing this pipeline.
    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Convert an upload, never failing.
    ///
    /// Any error from the fallible path is logged and mapped to a degraded
    /// result with empty fields; callers distinguish success from partial
    /// failure by inspecting which fields are populated. The staging file is
    /// cleaned up on every path.
    #[instrument(skip(self, upload), fields(file = %upload.display_name))]
    pub async fn convert(&self, upload: UploadedFile) -> ConversionResult {
        match self.try_convert(upload).await {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "conversion failed");
                ConversionResult::failed()
            }
        }
    }

    /// Convert an upload, surfacing failures as typed errors.
    ///
    /// The staging file is removed whether or not the conversion succeeds.
    #[instrument(skip(self, upload), fields(file = %upload.display_name))]
    pub async fn try_convert(
        &self,
        upload: UploadedFile,
    ) -> Result<ConversionResult, ConvertError> {
        self.store.ensure_root().await?;

        // Quarantine: move the upload out of the transport layer's naming
        // scheme onto a single throwaway path.
        let staged = self.store.staging_path(&upload.display_name);
        tokio::fs::rename(&upload.path, &staged).await?;

        let result = self.run_staged(&staged).await;

        // Guaranteed cleanup: the staging file must never outlive the
        // invocation, regardless of which stage failed.
        match tokio::fs::remove_file(&staged).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                staged = %staged.display(),
                error = %e,
                "failed to remove staging file"
            ),
        }

        result
    }

    /// Steps 2-5: identify, dedup-check, produce, enrich.
    async fn run_staged(&self, staged: &Path) -> Result<ConversionResult, ConvertError> {
        let identity = ContentIdentity::from_file(staged).await?;
        let artifacts = self.store.artifact_set(&identity);

        // Hold the identity lock across the check and the writes so a
        // concurrent upload of the same bytes waits here and then takes the
        // reuse path.
        let _lock = self.store.lock_identity(&identity).await?;

        let shared_file = self.store.exists(&identity);
        if shared_file {
            info!(%identity, "artifacts already present, skipping conversion");
        } else {
            self.produce(staged, &artifacts).await?;
            info!(%identity, "artifacts produced");
        }

        // Always refresh metadata from the encoded artifact, reused or not.
        let metadata = read_metadata(&artifacts.encoded).await;

        Ok(ConversionResult {
            hash: identity.to_string(),
            file_name: Some(artifacts.encoded),
            waveform_location: Some(artifacts.waveform),
            metadata,
            shared_file,
        })
    }

    /// Run the encoder and the waveform extractor, publishing each artifact
    /// atomically (temp sibling + rename) only after its adapter succeeds.
    async fn produce(&self, staged: &Path, artifacts: &ArtifactSet) -> Result<(), ConvertError> {
        let encode_tmp = temp_sibling(&artifacts.encoded);
        match self
            .encoder
            .encode(staged, &encode_tmp, self.config.bitrate)
            .await
        {
            Ok(()) => tokio::fs::rename(&encode_tmp, &artifacts.encoded).await?,
            Err(e) => {
                discard(&encode_tmp).await;
                return Err(e.into());
            }
        }

        // The waveform reads the freshly published encode, not the upload:
        // both artifacts must derive from the same canonical bytes.
        let waveform_tmp = temp_sibling(&artifacts.waveform);
        match self
            .waveform
            .extract(&artifacts.encoded, &waveform_tmp, &self.config.waveform)
            .await
        {
            Ok(hex) => {
                debug!(sample_bytes = hex.len() / 2, "waveform extracted");
                tokio::fs::rename(&waveform_tmp, &artifacts.waveform).await?;
            }
            Err(e) => {
                // The published encode stays in place; the partial artifact
                // set fails the existence check, so a later upload of the
                // same bytes redoes both steps.
                discard(&waveform_tmp).await;
                return Err(e.into());
            }
        }

        Ok(())
    }
}

/// A request-unique sibling of `path`, used as the write target before the
/// atomic rename into the canonical location.
fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{}.tmp", Uuid::new_v4().simple()));
    path.with_file_name(name)
}

/// Best-effort removal of an abandoned temp file.
async fn discard(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove temp file"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_sibling_stays_in_directory() {
        let path = PathBuf::from("/data/uploads/abc.mp3");
        let tmp = temp_sibling(&path);

        assert_eq!(tmp.parent(), path.parent());
        assert_ne!(tmp, path);
        assert!(tmp.to_string_lossy().ends_with(".tmp"));
    }

    #[test]
    fn test_temp_siblings_are_unique() {
        let path = PathBuf::from("/data/uploads/abc.mp3");
        assert_ne!(temp_sibling(&path), temp_sibling(&path));
    }

    #[test]
    fn test_failed_result_is_empty() {
        let result = ConversionResult::failed();
        assert!(result.hash.is_empty());
        assert!(result.file_name.is_none());
        assert!(result.waveform_location.is_none());
        assert!(result.metadata.is_none());
        assert!(!result.shared_file);
    }

    #[test]
    fn test_result_wire_names() {
        let result = ConversionResult {
            hash: "abc".to_string(),
            file_name: Some(PathBuf::from("/u/abc.mp3")),
            waveform_location: Some(PathBuf::from("/u/waveform-abc")),
            metadata: None,
            shared_file: true,
        };

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["sharedFile"], true);
        assert_eq!(json["file_name"], "/u/abc.mp3");
        assert!(json["metadata"].is_null());
    }
}
