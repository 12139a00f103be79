//! MP3 encoder adapter.
//!
//! Shells out to the `lame` CLI. The binary path is configurable so packaged
//! installs and tests can point somewhere other than PATH.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::{AudioEncoder, EncodeError};

/// MP3 encoder backed by the `lame` binary.
pub struct LameEncoder {
    binary_path: String,
}

impl Default for LameEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl LameEncoder {
    /// Create an encoder that resolves `lame` from PATH.
    pub fn new() -> Self {
        Self {
            binary_path: "lame".to_string(),
        }
    }

    /// Create an encoder with a custom binary path.
    pub fn with_binary_path(binary_path: impl Into<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
        }
    }
}

#[async_trait]
impl AudioEncoder for LameEncoder {
    fn name(&self) -> &str {
        "lame"
    }

    async fn encode(&self, source: &Path, dest: &Path, bitrate: u32) -> Result<(), EncodeError> {
        debug!(
            source = %source.display(),
            dest = %dest.display(),
            bitrate,
            "spawning encoder"
        );

        let output = Command::new(&self.binary_path)
            .arg("--silent")
            .arg("-b")
            .arg(bitrate.to_string())
            .arg(source)
            .arg(dest)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EncodeError::Failed {
                status: output.status.code().unwrap_or(-1),
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(())
    }
}
