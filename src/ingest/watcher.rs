//! Inbox watcher.
//!
//! Watches the inbox directory for new audio files and converts them when
//! they are stable (the uploader has finished writing).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{DateTime, Utc};
use notify::RecursiveMode;
use notify_debouncer_mini::new_debouncer;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::pipeline::{ConversionPipeline, ConversionResult, UploadedFile};

/// Errors that can occur with the watcher
#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("Inbox directory does not exist: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("Notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration for the inbox watcher
#[derive(Debug, Clone)]
pub struct InboxConfig {
    /// Directory to watch for new uploads
    pub inbox: PathBuf,

    /// How long a file must be size-stable before converting (seconds)
    pub stability_delay_secs: u64,

    /// File extensions to pick up
    pub extensions: Vec<String>,
}

impl InboxConfig {
    /// Default inbox under the upload root: `<root>/incoming`.
    pub fn for_root(root: &Path) -> Self {
        Self {
            inbox: root.join("incoming"),
            stability_delay_secs: 2,
            extensions: ["wav", "mp3", "flac", "ogg", "m4a", "aiff"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    /// Check that the inbox exists
    pub fn validate(&self) -> Result<(), WatcherError> {
        if !self.inbox.exists() {
            return Err(WatcherError::DirectoryNotFound(self.inbox.clone()));
        }
        Ok(())
    }
}

/// Emitted after a detected file has gone through the pipeline
#[derive(Debug, Clone)]
pub struct ConvertedEvent {
    /// The inbox path the file arrived at
    pub source: PathBuf,

    /// What the pipeline made of it
    pub result: ConversionResult,

    /// When the file was detected
    pub detected_at: DateTime<Utc>,
}

/// Result of a one-shot inbox scan
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    pub converted: usize,
    pub reused: usize,
    pub failed: usize,
}

impl ScanResult {
    pub fn total(&self) -> usize {
        self.converted + self.reused + self.failed
    }
}

/// Watches an inbox directory and feeds stable files into the pipeline
pub struct InboxWatcher {
    config: InboxConfig,
}

impl InboxWatcher {
    /// Create a watcher over the given inbox configuration
    pub fn new(config: InboxConfig) -> Self {
        Self { config }
    }

    /// Get the current configuration
    pub fn config(&self) -> &InboxConfig {
        &self.config
    }

    /// Convert everything already sitting in the inbox.
    pub async fn scan_once(&self, pipeline: &ConversionPipeline) -> Result<ScanResult> {
        self.config.validate()?;

        let mut result = ScanResult::default();
        let mut entries = tokio::fs::read_dir(&self.config.inbox).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();

            if !self.is_audio_file(&path) {
                continue;
            }

            let metadata = match tokio::fs::metadata(&path).await {
                Ok(m) => m,
                Err(_) => continue,
            };
            if !metadata.is_file() {
                continue;
            }

            let converted = pipeline.convert(upload_for(&path)).await;
            tally(&mut result, &converted);
        }

        Ok(result)
    }

    /// Watch the inbox and emit an event per converted file.
    /// Runs until stopped via the returned handle.
    pub async fn watch(
        &self,
        pipeline: Arc<ConversionPipeline>,
    ) -> Result<(mpsc::Receiver<ConvertedEvent>, WatchHandle)> {
        self.config.validate()?;

        let (event_tx, event_rx) = mpsc::channel::<ConvertedEvent>(100);
        let (stop_tx, mut stop_rx) = mpsc::channel::<()>(1);

        let config = self.config.clone();

        let handle = tokio::spawn(async move {
            if let Err(e) = run_watcher(config, pipeline, event_tx, &mut stop_rx).await {
                tracing::error!("Watcher error: {}", e);
            }
        });

        Ok((
            event_rx,
            WatchHandle {
                stop_tx,
                task: handle,
            },
        ))
    }

    /// Check if a path has an extension we pick up
    fn is_audio_file(&self, path: &Path) -> bool {
        has_watched_extension(path, &self.config.extensions)
    }
}

/// Handle to control the watcher
pub struct WatchHandle {
    stop_tx: mpsc::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

impl WatchHandle {
    /// Stop the watcher
    pub async fn stop(self) -> Result<()> {
        let _ = self.stop_tx.send(()).await;
        self.task.await?;
        Ok(())
    }
}

fn has_watched_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

fn upload_for(path: &Path) -> UploadedFile {
    let display_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    UploadedFile {
        path: path.to_path_buf(),
        display_name,
    }
}

fn tally(result: &mut ScanResult, converted: &ConversionResult) {
    if converted.hash.is_empty() {
        result.failed += 1;
    } else if converted.shared_file {
        result.reused += 1;
    } else {
        result.converted += 1;
    }
}

/// Internal watcher loop
async fn run_watcher(
    config: InboxConfig,
    pipeline: Arc<ConversionPipeline>,
    event_tx: mpsc::Sender<ConvertedEvent>,
    stop_rx: &mut mpsc::Receiver<()>,
) -> Result<()> {
    // Track files being stabilized (path -> (size, last_seen))
    let mut pending: HashMap<PathBuf, (u64, Instant)> = HashMap::new();

    let (tx, rx) = std::sync::mpsc::channel();

    let mut debouncer = new_debouncer(Duration::from_secs(1), tx)?;
    debouncer
        .watcher()
        .watch(&config.inbox, RecursiveMode::NonRecursive)?;

    let stability_delay = Duration::from_secs(config.stability_delay_secs);

    info!("Watching {} for audio files", config.inbox.display());

    loop {
        if stop_rx.try_recv().is_ok() {
            info!("Watcher stopping...");
            break;
        }

        match rx.recv_timeout(Duration::from_millis(500)) {
            Ok(Ok(events)) => {
                for event in events {
                    let path = event.path;

                    if !has_watched_extension(&path, &config.extensions) {
                        continue;
                    }

                    if let Ok(metadata) = std::fs::metadata(&path) {
                        if metadata.is_file() {
                            pending.insert(path, (metadata.len(), Instant::now()));
                        }
                    }
                }
            }
            Ok(Err(e)) => {
                warn!("Watcher error: {:?}", e);
            }
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                // Expected - continue to stability check
            }
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                tracing::error!("Watcher channel disconnected");
                break;
            }
        }

        // Promote files whose size has not changed for the stability window.
        let now = Instant::now();
        let mut stable = Vec::new();

        for (path, (last_size, last_seen)) in pending.iter() {
            if now.duration_since(*last_seen) >= stability_delay {
                if let Ok(metadata) = std::fs::metadata(path) {
                    if metadata.len() == *last_size && metadata.len() > 0 {
                        stable.push(path.clone());
                    }
                }
            }
        }

        for path in stable {
            pending.remove(&path);

            let detected_at = Utc::now();
            let result = pipeline.convert(upload_for(&path)).await;

            if result.hash.is_empty() {
                warn!("Conversion failed for {}", path.display());
            } else if result.shared_file {
                info!("Duplicate content detected: {} ({})", path.display(), result.hash);
            } else {
                info!("Converted {} ({})", path.display(), result.hash);
            }

            let _ = event_tx
                .send(ConvertedEvent {
                    source: path,
                    result,
                    detected_at,
                })
                .await;
        }

        // Small sleep to prevent busy loop
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    Ok(())
}
