//! Configuration for the conversion pipeline.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (AUDIOPRESS_ROOT, AUDIOPRESS_BITRATE,
//!    AUDIOPRESS_LAME, AUDIOPRESS_WAVEFORM)
//! 2. Config file (.audiopress/config.yaml, discovered by walking up from
//!    the current directory)
//! 3. Defaults (~/.audiopress/uploads, 128 kbps, lame/audiowaveform on PATH)
//!
//! The resolved value is a plain struct handed to the pipeline constructor;
//! nothing inside the pipeline reads process-global state.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Bitrates the MP3 encoder accepts (MPEG layer III).
pub const ALLOWED_BITRATES: [u32; 18] = [
    8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160, 192, 224, 256, 320,
];

/// Single quality tier for the whole system.
pub const DEFAULT_BITRATE: u32 = 128;

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub paths: PathsSection,
    #[serde(default)]
    pub encoder: EncoderSection,
    #[serde(default)]
    pub waveform: WaveformSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsSection {
    /// Upload root (relative paths resolve against the config file's parent)
    pub root: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EncoderSection {
    pub binary: Option<String>,
    pub bitrate: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WaveformSection {
    pub binary: Option<String>,
    pub bits: Option<u32>,
    pub width: Option<u32>,
}

/// Fixed waveform rendering policy (sample width and target pixel width).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaveformPolicy {
    /// Sample resolution in bits (8 or 16).
    pub bits: u32,

    /// Target width of the rendered waveform in pixels.
    pub width: u32,
}

impl Default for WaveformPolicy {
    fn default() -> Self {
        Self {
            bits: 8,
            width: 1024,
        }
    }
}

/// Resolved configuration handed to the pipeline constructor.
#[derive(Debug, Clone)]
pub struct ConversionConfig {
    /// Upload root: staging files and both artifacts live here.
    pub root: PathBuf,

    /// Encode bitrate in kbps. One quality tier for the whole system.
    pub bitrate: u32,

    /// Waveform rendering policy.
    pub waveform: WaveformPolicy,

    /// Path to the MP3 encoder binary.
    pub lame_path: String,

    /// Path to the waveform extractor binary.
    pub waveform_path: String,
}

impl ConversionConfig {
    /// Build a config with defaults over an explicit root. The entry point
    /// for tests, which pass a temporary directory.
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            bitrate: DEFAULT_BITRATE,
            waveform: WaveformPolicy::default(),
            lame_path: "lame".to_string(),
            waveform_path: "audiowaveform".to_string(),
        }
    }

    /// Load configuration from all sources.
    pub fn load() -> Result<Self> {
        let mut config = match find_config_file() {
            Some(path) => {
                let file = load_config_file(&path)?;
                // Base for relative paths is the config file's grandparent
                // (the directory holding .audiopress/).
                let base = path
                    .parent()
                    .and_then(|p| p.parent())
                    .unwrap_or(Path::new("."))
                    .to_path_buf();
                Self::from_file(file, &base)
            }
            None => Self::for_root(default_root()),
        };

        if let Ok(root) = std::env::var("AUDIOPRESS_ROOT") {
            config.root = PathBuf::from(root);
        }
        if let Ok(bitrate) = std::env::var("AUDIOPRESS_BITRATE") {
            config.bitrate = bitrate
                .parse()
                .with_context(|| format!("AUDIOPRESS_BITRATE is not a number: {}", bitrate))?;
        }
        if let Ok(lame) = std::env::var("AUDIOPRESS_LAME") {
            config.lame_path = lame;
        }
        if let Ok(waveform) = std::env::var("AUDIOPRESS_WAVEFORM") {
            config.waveform_path = waveform;
        }

        validate_bitrate(config.bitrate)?;
        Ok(config)
    }

    fn from_file(file: ConfigFile, base: &Path) -> Self {
        let mut config = Self::for_root(
            file.paths
                .root
                .map(|r| resolve_path(base, &r))
                .unwrap_or_else(default_root),
        );

        if let Some(binary) = file.encoder.binary {
            config.lame_path = binary;
        }
        if let Some(bitrate) = file.encoder.bitrate {
            config.bitrate = bitrate;
        }
        if let Some(binary) = file.waveform.binary {
            config.waveform_path = binary;
        }
        if let Some(bits) = file.waveform.bits {
            config.waveform.bits = bits;
        }
        if let Some(width) = file.waveform.width {
            config.waveform.width = width;
        }

        config
    }
}

/// Reject bitrates the encoder would refuse.
pub fn validate_bitrate(bitrate: u32) -> Result<()> {
    if !ALLOWED_BITRATES.contains(&bitrate) {
        anyhow::bail!(
            "bitrate {} kbps is not a valid MP3 bitrate (allowed: {:?})",
            bitrate,
            ALLOWED_BITRATES
        );
    }
    Ok(())
}

fn default_root() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".audiopress").join("uploads"))
        .unwrap_or_else(|| PathBuf::from("uploads"))
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".audiopress").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's base directory
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path_str)
    }
}
