//! Conversion Pipeline Integration Tests
//!
//! Exercises the full pipeline against a temporary root with in-process
//! adapter fakes: first-conversion behavior, guaranteed staging cleanup,
//! and metadata resilience.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use audiopress::adapters::{AudioEncoder, EncodeError, WaveformError, WaveformExtractor};
use audiopress::config::{ConversionConfig, WaveformPolicy};
use audiopress::pipeline::{ConversionPipeline, UploadedFile};

/// Encoder fake: counts invocations and copies the source bytes to the
/// destination, or fails without writing anything.
struct CountingEncoder {
    calls: Arc<AtomicUsize>,
    fail: bool,
}

#[async_trait]
impl AudioEncoder for CountingEncoder {
    fn name(&self) -> &str {
        "counting-encoder"
    }

    async fn encode(&self, source: &Path, dest: &Path, _bitrate: u32) -> Result<(), EncodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(EncodeError::Failed {
                status: 1,
                stderr: "simulated encoder failure".to_string(),
            });
        }
        tokio::fs::copy(source, dest).await?;
        Ok(())
    }
}

/// Waveform fake: counts invocations and writes a fixed sample buffer.
struct CountingWaveform {
    calls: Arc<AtomicUsize>,
    fail: bool,
}

const FAKE_SAMPLES: [u8; 4] = [0x01, 0x02, 0x03, 0x04];

#[async_trait]
impl WaveformExtractor for CountingWaveform {
    fn name(&self) -> &str {
        "counting-waveform"
    }

    async fn extract(
        &self,
        _source: &Path,
        dest: &Path,
        _policy: &WaveformPolicy,
    ) -> Result<String, WaveformError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(WaveformError::Failed {
                status: 1,
                stderr: "simulated waveform failure".to_string(),
            });
        }
        tokio::fs::write(dest, FAKE_SAMPLES).await?;
        Ok(hex::encode(FAKE_SAMPLES))
    }
}

struct TestPipeline {
    pipeline: ConversionPipeline,
    encoder_calls: Arc<AtomicUsize>,
    waveform_calls: Arc<AtomicUsize>,
}

fn pipeline_with(root: &Path, encoder_fails: bool, waveform_fails: bool) -> TestPipeline {
    let encoder_calls = Arc::new(AtomicUsize::new(0));
    let waveform_calls = Arc::new(AtomicUsize::new(0));

    let pipeline = ConversionPipeline::with_adapters(
        ConversionConfig::for_root(root),
        Box::new(CountingEncoder {
            calls: encoder_calls.clone(),
            fail: encoder_fails,
        }),
        Box::new(CountingWaveform {
            calls: waveform_calls.clone(),
            fail: waveform_fails,
        }),
    );

    TestPipeline {
        pipeline,
        encoder_calls,
        waveform_calls,
    }
}

/// Write an upload into the root the way the transport layer would.
async fn make_upload(root: &Path, scratch: &str, display_name: &str, bytes: &[u8]) -> UploadedFile {
    let path = root.join(scratch);
    tokio::fs::write(&path, bytes).await.unwrap();
    UploadedFile {
        path,
        display_name: display_name.to_string(),
    }
}

/// A minimal mono 16-bit PCM WAV, one second at 8 kHz.
fn wav_bytes() -> Vec<u8> {
    let sample_rate = 8000u32;
    let num_samples = 8000u32;
    let data_len = num_samples * 2;

    let mut v = Vec::with_capacity(44 + data_len as usize);
    v.extend_from_slice(b"RIFF");
    v.extend_from_slice(&(36 + data_len).to_le_bytes());
    v.extend_from_slice(b"WAVE");
    v.extend_from_slice(b"fmt ");
    v.extend_from_slice(&16u32.to_le_bytes());
    v.extend_from_slice(&1u16.to_le_bytes()); // PCM
    v.extend_from_slice(&1u16.to_le_bytes()); // mono
    v.extend_from_slice(&sample_rate.to_le_bytes());
    v.extend_from_slice(&(sample_rate * 2).to_le_bytes());
    v.extend_from_slice(&2u16.to_le_bytes());
    v.extend_from_slice(&16u16.to_le_bytes());
    v.extend_from_slice(b"data");
    v.extend_from_slice(&data_len.to_le_bytes());
    for i in 0..num_samples {
        v.extend_from_slice(&((i % 128) as i16).to_le_bytes());
    }
    v
}

#[tokio::test]
async fn test_first_conversion_produces_both_artifacts() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    let t = pipeline_with(root, false, false);

    let upload = make_upload(root, "upload-1", "song.wav", &wav_bytes()).await;
    let result = t.pipeline.convert(upload).await;

    assert!(!result.shared_file);
    assert_eq!(result.hash.len(), 64);
    assert_eq!(t.encoder_calls.load(Ordering::SeqCst), 1);
    assert_eq!(t.waveform_calls.load(Ordering::SeqCst), 1);

    let encoded = root.join(format!("{}.mp3", result.hash));
    let waveform = root.join(format!("waveform-{}", result.hash));
    assert_eq!(result.file_name, Some(encoded.clone()));
    assert_eq!(result.waveform_location, Some(waveform.clone()));
    assert!(encoded.exists());
    assert!(waveform.exists());

    // The staging file is gone.
    assert!(!root.join(".song.wav").exists());
}

#[tokio::test]
async fn test_metadata_extracted_from_encoded_artifact() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    let t = pipeline_with(root, false, false);

    let upload = make_upload(root, "upload-1", "tone.wav", &wav_bytes()).await;
    let result = t.pipeline.convert(upload).await;

    // The fake encoder preserved the WAV bytes, so the probe can read a
    // duration out of the encoded artifact.
    let metadata = result.metadata.expect("metadata should be readable");
    let duration = metadata.duration_secs.expect("duration should be present");
    assert!((duration - 1.0).abs() < 0.05, "duration was {}", duration);
}

#[tokio::test]
async fn test_unreadable_tags_do_not_fail_the_conversion() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    let t = pipeline_with(root, false, false);

    let upload = make_upload(root, "upload-1", "noise.wav", b"not audio at all").await;
    let result = t.pipeline.convert(upload).await;

    assert!(!result.hash.is_empty());
    assert_eq!(result.metadata, None);
    assert!(result.file_name.unwrap().exists());
}

#[tokio::test]
async fn test_encoder_failure_yields_degraded_result_and_cleans_up() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    let t = pipeline_with(root, true, false);

    let upload = make_upload(root, "upload-1", "song.wav", &wav_bytes()).await;
    let source = upload.path.clone();
    let result = t.pipeline.convert(upload).await;

    assert!(result.hash.is_empty());
    assert_eq!(result.file_name, None);
    assert_eq!(result.waveform_location, None);
    assert!(!result.shared_file);

    // The waveform step never ran.
    assert_eq!(t.waveform_calls.load(Ordering::SeqCst), 0);

    // Staging file and upload are both gone, and nothing half-written
    // remains at a canonical or temporary path.
    assert!(!root.join(".song.wav").exists());
    assert!(!source.exists());
    assert!(!dir_has_suffix(root, ".tmp").await);
    assert!(!dir_has_suffix(root, ".mp3").await);
}

#[tokio::test]
async fn test_waveform_failure_keeps_encode_for_overwrite() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    let bytes = wav_bytes();

    let failing = pipeline_with(root, false, true);
    let upload = make_upload(root, "upload-1", "song.wav", &bytes).await;
    let result = failing.pipeline.convert(upload).await;

    // Degraded result, staging cleaned up.
    assert!(result.hash.is_empty());
    assert!(!root.join(".song.wav").exists());

    // The encoded artifact stays behind, but without its waveform it does
    // not count as done: a second upload of the same bytes redoes both
    // steps and completes the set.
    assert!(dir_has_suffix(root, ".mp3").await);

    let working = pipeline_with(root, false, false);
    let upload = make_upload(root, "upload-2", "song.wav", &bytes).await;
    let result = working.pipeline.convert(upload).await;

    assert!(!result.shared_file);
    assert_eq!(working.encoder_calls.load(Ordering::SeqCst), 1);
    assert_eq!(working.waveform_calls.load(Ordering::SeqCst), 1);
    assert!(result.file_name.unwrap().exists());
    assert!(result.waveform_location.unwrap().exists());
}

async fn dir_has_suffix(dir: &Path, suffix: &str) -> bool {
    let mut entries = tokio::fs::read_dir(dir).await.unwrap();
    while let Some(entry) = entries.next_entry().await.unwrap() {
        if entry.file_name().to_string_lossy().ends_with(suffix) {
            return true;
        }
    }
    false
}

#[tokio::test]
async fn test_try_convert_surfaces_typed_errors() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    let t = pipeline_with(root, true, false);

    let upload = make_upload(root, "upload-1", "song.wav", &wav_bytes()).await;
    let err = t.pipeline.try_convert(upload).await.unwrap_err();

    assert!(matches!(
        err,
        audiopress::pipeline::ConvertError::Encode(_)
    ));

    // Cleanup ran on the error path too.
    assert!(!root.join(".song.wav").exists());
}

#[tokio::test]
async fn test_missing_upload_is_a_failure_not_a_panic() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    let t = pipeline_with(root, false, false);

    let result = t
        .pipeline
        .convert(UploadedFile {
            path: PathBuf::from(root.join("never-written.wav")),
            display_name: "never-written.wav".to_string(),
        })
        .await;

    assert!(result.hash.is_empty());
    assert_eq!(t.encoder_calls.load(Ordering::SeqCst), 0);
}
