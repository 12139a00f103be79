//! Command-line interface for audiopress.
//!
//! Provides commands for converting single files, scanning and watching the
//! inbox, querying artifact existence, and inspecting metadata and the
//! resolved configuration.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::config::ConversionConfig;
use crate::identity::ContentIdentity;
use crate::ingest::{InboxConfig, InboxWatcher};
use crate::metadata::read_metadata;
use crate::pipeline::{ConversionPipeline, UploadedFile};
use crate::store::ArtifactStore;

/// audiopress - content-addressed audio conversion pipeline
#[derive(Parser, Debug)]
#[command(name = "audiopress")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Convert an audio file into the content-addressed store
    Convert {
        /// File to convert
        file: PathBuf,

        /// Display name to process the upload under (defaults to the file name)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Convert everything currently sitting in the inbox
    Scan {
        /// Inbox directory (defaults to <root>/incoming)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Watch the inbox and convert new files as they arrive
    Watch {
        /// Inbox directory (defaults to <root>/incoming)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Check whether artifacts exist for a content hash
    Exists {
        /// Content hash (64 hex chars)
        hash: String,
    },

    /// Print the metadata of an audio file
    Metadata {
        /// File to inspect
        file: PathBuf,
    },

    /// Show resolved configuration
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let config = ConversionConfig::load()?;

        match self.command {
            Commands::Convert { file, name } => convert_file(config, file, name).await,
            Commands::Scan { dir } => scan_inbox(config, dir).await,
            Commands::Watch { dir } => watch_inbox(config, dir).await,
            Commands::Exists { hash } => show_exists(config, &hash),
            Commands::Metadata { file } => show_metadata(&file).await,
            Commands::Config => show_config(&config),
        }
    }
}

/// Play the upload layer for a single file: copy it into the root the way a
/// transport would, then hand it to the pipeline.
async fn convert_file(
    config: ConversionConfig,
    file: PathBuf,
    name: Option<String>,
) -> Result<()> {
    let display_name = name.unwrap_or_else(|| {
        file.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string())
    });

    let pipeline = ConversionPipeline::new(config);
    pipeline.store().ensure_root().await?;

    let scratch = pipeline
        .store()
        .root()
        .join(format!("upload-{}", Uuid::new_v4().simple()));
    tokio::fs::copy(&file, &scratch)
        .await
        .with_context(|| format!("Failed to read input file: {}", file.display()))?;

    let result = pipeline
        .convert(UploadedFile {
            path: scratch,
            display_name,
        })
        .await;

    println!("{}", serde_json::to_string_pretty(&result)?);

    if result.hash.is_empty() {
        anyhow::bail!("conversion failed, see log for details");
    }
    Ok(())
}

async fn scan_inbox(config: ConversionConfig, dir: Option<PathBuf>) -> Result<()> {
    let (pipeline, inbox_config) = inbox_setup(config, dir).await?;
    let watcher = InboxWatcher::new(inbox_config);

    let result = watcher.scan_once(&pipeline).await?;
    println!(
        "Scanned {} file(s): {} converted, {} reused, {} failed",
        result.total(),
        result.converted,
        result.reused,
        result.failed
    );
    Ok(())
}

async fn watch_inbox(config: ConversionConfig, dir: Option<PathBuf>) -> Result<()> {
    let (pipeline, inbox_config) = inbox_setup(config, dir).await?;
    let inbox = inbox_config.inbox.clone();
    let watcher = InboxWatcher::new(inbox_config);

    let (mut events, handle) = watcher.watch(Arc::new(pipeline)).await?;
    println!("Watching {} (ctrl-c to stop)", inbox.display());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Some(event) => {
                    if event.result.hash.is_empty() {
                        println!("failed   {}", event.source.display());
                    } else if event.result.shared_file {
                        println!("reused   {} -> {}", event.source.display(), event.result.hash);
                    } else {
                        println!("converted {} -> {}", event.source.display(), event.result.hash);
                    }
                }
                None => break,
            },
        }
    }

    handle.stop().await
}

async fn inbox_setup(
    config: ConversionConfig,
    dir: Option<PathBuf>,
) -> Result<(ConversionPipeline, InboxConfig)> {
    let mut inbox_config = InboxConfig::for_root(&config.root);
    if let Some(dir) = dir {
        inbox_config.inbox = dir;
    }

    tokio::fs::create_dir_all(&inbox_config.inbox)
        .await
        .with_context(|| format!("Failed to create inbox: {}", inbox_config.inbox.display()))?;

    let pipeline = ConversionPipeline::new(config);
    pipeline.store().ensure_root().await?;

    Ok((pipeline, inbox_config))
}

fn show_exists(config: ConversionConfig, hash: &str) -> Result<()> {
    let identity: ContentIdentity = hash.parse()?;
    let store = ArtifactStore::new(config.root);

    if store.exists(&identity) {
        println!("present");
        println!("  encoded:  {}", store.encoded_path(&identity).display());
        println!("  waveform: {}", store.waveform_path(&identity).display());
    } else {
        println!("absent");
    }
    Ok(())
}

async fn show_metadata(file: &PathBuf) -> Result<()> {
    match read_metadata(file).await {
        Some(metadata) => println!("{}", serde_json::to_string_pretty(&metadata)?),
        None => println!("no readable metadata"),
    }
    Ok(())
}

fn show_config(config: &ConversionConfig) -> Result<()> {
    println!("root:            {}", config.root.display());
    println!("bitrate:         {} kbps", config.bitrate);
    println!("waveform bits:   {}", config.waveform.bits);
    println!("waveform width:  {}", config.waveform.width);
    println!("encoder binary:  {}", config.lame_path);
    println!("waveform binary: {}", config.waveform_path);
    Ok(())
}
