//! audiopress - content-addressed audio conversion pipeline
//!
//! Given an uploaded audio file, audiopress derives a canonical identity
//! from a streaming hash of its bytes, converts it to a normalized MP3,
//! extracts a waveform representation and descriptive metadata, and skips
//! the expensive transcoding work entirely when byte-identical content has
//! already been processed.
//!
//! # Architecture
//!
//! Everything is keyed by content, not by name:
//! - identity = SHA-256 of the file bytes
//! - artifacts live at `<root>/<identity>.mp3` and `<root>/waveform-<identity>`
//! - a second upload of the same bytes finds both artifacts and reuses them
//!
//! # Modules
//!
//! - `identity`: streaming content hashing
//! - `store`: hash-keyed artifact paths, existence, identity locks
//! - `adapters`: external encoder and waveform extractor subprocesses
//! - `metadata`: best-effort tag and duration extraction
//! - `pipeline`: the conversion orchestrator
//! - `ingest`: inbox watcher feeding the pipeline
//! - `cli`: command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Convert one file
//! audiopress convert song.wav
//!
//! # Drain the inbox
//! audiopress scan
//!
//! # Keep converting as files arrive
//! audiopress watch
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod identity;
pub mod ingest;
pub mod metadata;
pub mod pipeline;
pub mod store;

// Re-export main types at crate root for convenience
pub use config::{ConversionConfig, WaveformPolicy};
pub use identity::ContentIdentity;
pub use metadata::TrackMetadata;
pub use pipeline::{ConversionPipeline, ConversionResult, ConvertError, UploadedFile};
pub use store::{ArtifactSet, ArtifactStore, IdentityLock};

// Inbox ingestion
pub use ingest::{ConvertedEvent, InboxConfig, InboxWatcher, ScanResult, WatchHandle};
