//! Inbox ingestion.
//!
//! Watches an inbox directory for freshly dropped audio files and feeds each
//! one through the conversion pipeline once its size has been stable long
//! enough to assume the writer is done.
//!
//! ```text
//! <root>/incoming/ → watcher → ConversionPipeline → <root>/<hash>.mp3
//! ```

pub mod watcher;

pub use watcher::{ConvertedEvent, InboxConfig, InboxWatcher, ScanResult, WatchHandle, WatcherError};
