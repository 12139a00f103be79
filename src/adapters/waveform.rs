//! Waveform extractor adapter.
//!
//! Shells out to the `audiowaveform` CLI, which writes a binary sample
//! buffer to the output path. The adapter reads that buffer back and returns
//! it hex-encoded; the binary file stays on disk as the durable artifact.
//!
//! Runs against the encoded MP3, never the raw upload, so the waveform and
//! the audio a consumer plays are derived from the same canonical bytes.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::{WaveformError, WaveformExtractor};
use crate::config::WaveformPolicy;

/// Waveform extractor backed by the `audiowaveform` binary.
pub struct WaveformCli {
    binary_path: String,
}

impl Default for WaveformCli {
    fn default() -> Self {
        Self::new()
    }
}

impl WaveformCli {
    /// Create an extractor that resolves `audiowaveform` from PATH.
    pub fn new() -> Self {
        Self {
            binary_path: "audiowaveform".to_string(),
        }
    }

    /// Create an extractor with a custom binary path.
    pub fn with_binary_path(binary_path: impl Into<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
        }
    }
}

#[async_trait]
impl WaveformExtractor for WaveformCli {
    fn name(&self) -> &str {
        "audiowaveform"
    }

    async fn extract(
        &self,
        source: &Path,
        dest: &Path,
        policy: &WaveformPolicy,
    ) -> Result<String, WaveformError> {
        debug!(
            source = %source.display(),
            dest = %dest.display(),
            bits = policy.bits,
            width = policy.width,
            "spawning waveform extractor"
        );

        // The artifact path carries no extension, so the output format must
        // be stated explicitly.
        let output = Command::new(&self.binary_path)
            .arg("-i")
            .arg(source)
            .arg("-o")
            .arg(dest)
            .arg("--output-format")
            .arg("dat")
            .arg("-b")
            .arg(policy.bits.to_string())
            .arg("-w")
            .arg(policy.width.to_string())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(WaveformError::Failed {
                status: output.status.code().unwrap_or(-1),
                stderr: stderr.trim().to_string(),
            });
        }

        let samples = tokio::fs::read(dest).await?;
        Ok(hex::encode(samples))
    }
}
