//! Adapter interfaces for external media tooling.
//!
//! The encoder and the waveform extractor are capability providers invoked
//! through narrow contracts; their internals (bitstream encoding, sample
//! extraction) are not this crate's concern. Both are modeled as traits so
//! tests can substitute in-process fakes for the real subprocess adapters.

pub mod lame;
pub mod waveform;

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::WaveformPolicy;

pub use lame::LameEncoder;
pub use waveform::WaveformCli;

/// External encoder failure.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("encoder exited with status {status}: {stderr}")]
    Failed { status: i32, stderr: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// External waveform extractor failure.
#[derive(Debug, Error)]
pub enum WaveformError {
    #[error("waveform extractor exited with status {status}: {stderr}")]
    Failed { status: i32, stderr: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Transforms a source file into an encoded MP3 at `dest`.
///
/// Implementations write to exactly the path they are given and may leave a
/// partial file behind on failure; atomic publication (temp path + rename)
/// is the caller's responsibility.
#[async_trait]
pub trait AudioEncoder: Send + Sync {
    /// Human-readable adapter name
    fn name(&self) -> &str;

    /// Encode `source` into an MP3 at `dest` at the given bitrate (kbps).
    async fn encode(&self, source: &Path, dest: &Path, bitrate: u32) -> Result<(), EncodeError>;
}

/// Extracts a binary waveform representation from encoded audio.
#[async_trait]
pub trait WaveformExtractor: Send + Sync {
    /// Human-readable adapter name
    fn name(&self) -> &str;

    /// Derive the waveform of `source`, persisting the binary artifact at
    /// `dest` and returning the sample buffer as a lowercase hex string.
    async fn extract(
        &self,
        source: &Path,
        dest: &Path,
        policy: &WaveformPolicy,
    ) -> Result<String, WaveformError>;
}
