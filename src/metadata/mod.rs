//! Best-effort metadata extraction.
//!
//! Reads tags and duration from the encoded artifact via a symphonia probe.
//! Metadata is enrichment, never a correctness requirement: a file that
//! transcodes fine but has unreadable tags is still a valid conversion, so
//! every failure here maps to `None` instead of propagating.

use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::{MetadataOptions, MetadataRevision, StandardTagKey};
use symphonia::core::probe::Hint;
use tracing::debug;

/// Descriptive fields extracted from an encoded file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub duration_secs: Option<f64>,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub year: Option<String>,
}

/// Read metadata from an audio file, swallowing every failure.
///
/// The probe is blocking I/O, so it runs on the blocking pool.
pub async fn read_metadata(path: &Path) -> Option<TrackMetadata> {
    let path = path.to_path_buf();

    let result = tokio::task::spawn_blocking(move || extract(&path)).await;

    match result {
        Ok(Ok(metadata)) => Some(metadata),
        Ok(Err(e)) => {
            debug!(error = %e, "metadata extraction failed, continuing without");
            None
        }
        Err(e) => {
            debug!(error = %e, "metadata task failed, continuing without");
            None
        }
    }
}

fn extract(path: &Path) -> Result<TrackMetadata> {
    let file = std::fs::File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(extension);
    }

    let mut probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;

    let mut format = probed.format;
    let mut metadata = TrackMetadata::default();

    if let Some(track) = format.default_track() {
        let params = &track.codec_params;
        if let (Some(time_base), Some(n_frames)) = (params.time_base, params.n_frames) {
            let time = time_base.calc_time(n_frames);
            metadata.duration_secs = Some(time.seconds as f64 + time.frac);
        }
    }

    // ID3v2 tags usually land in the probe's metadata, container tags in the
    // format reader's. Take whichever revision is present.
    if let Some(revision) = format.metadata().current() {
        apply_tags(revision, &mut metadata);
    } else if let Some(revision) = probed.metadata.get().as_ref().and_then(|m| m.current()) {
        apply_tags(revision, &mut metadata);
    }

    Ok(metadata)
}

fn apply_tags(revision: &MetadataRevision, metadata: &mut TrackMetadata) {
    for tag in revision.tags() {
        match tag.std_key {
            Some(StandardTagKey::TrackTitle) => {
                metadata.title = Some(tag.value.to_string());
            }
            Some(StandardTagKey::Artist) => {
                metadata.artist = Some(tag.value.to_string());
            }
            Some(StandardTagKey::Album) => {
                metadata.album = Some(tag.value.to_string());
            }
            Some(StandardTagKey::Genre) => {
                metadata.genre = Some(tag.value.to_string());
            }
            Some(StandardTagKey::Date) => {
                metadata.year = Some(tag.value.to_string());
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_unparseable_file_yields_none() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("garbage.mp3");
        tokio::fs::write(&path, b"this is not an mp3 at all")
            .await
            .unwrap();

        assert_eq!(read_metadata(&path).await, None);
    }

    #[tokio::test]
    async fn test_missing_file_yields_none() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("missing.mp3");

        assert_eq!(read_metadata(&path).await, None);
    }
}
