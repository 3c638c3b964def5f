//! albumsync CLI - upload an export folder to Google Photos albums.
//!
//! Every immediate subfolder of the export directory becomes an album named
//! after it. Files already uploaded are remembered in a ledger inside the
//! export directory, so repeated runs only upload what is new.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use albumsync_photos::{authenticate, PhotosClient};
use albumsync_sync::{
    find_album_folders, DecisionProvider, DuplicatePolicy, FixedPolicy, Pacing, SyncConfig,
    SyncPipeline, TerminalPrompt,
};

#[derive(Parser)]
#[command(name = "albumsync")]
#[command(about = "Upload photo and video folders to Google Photos, one album per folder")]
#[command(version)]
struct Cli {
    /// Export directory whose subfolders become albums.
    export_dir: PathBuf,

    /// Show the plan without uploading anything.
    #[arg(long)]
    dry_run: bool,

    /// Upload files even if the ledger lists them as uploaded.
    #[arg(long)]
    no_skip_existing: bool,

    /// OAuth client credentials file.
    #[arg(long, default_value = "credentials.json")]
    credentials: PathBuf,

    /// Token file, created on first authorization.
    #[arg(long, default_value = "token.json")]
    token: PathBuf,

    /// What to do when a file name already exists in the album.
    #[arg(long, value_enum, default_value_t = OnDuplicate::Prompt)]
    on_duplicate: OnDuplicate,

    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum OnDuplicate {
    /// Ask for every collision.
    Prompt,
    /// Keep the remote item.
    Skip,
    /// Remove the remote item and upload again.
    Replace,
}

impl From<OnDuplicate> for DuplicatePolicy {
    fn from(value: OnDuplicate) -> Self {
        match value {
            OnDuplicate::Prompt => DuplicatePolicy::Prompt,
            OnDuplicate::Skip => DuplicatePolicy::Skip,
            OnDuplicate::Replace => DuplicatePolicy::Replace,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let root = std::path::absolute(&cli.export_dir)
        .with_context(|| format!("Invalid export directory: {}", cli.export_dir.display()))?;
    if !root.is_dir() {
        anyhow::bail!("Export directory not found: {}", root.display());
    }

    let config = SyncConfig {
        skip_existing: !cli.no_skip_existing,
        dry_run: cli.dry_run,
        duplicate_policy: cli.on_duplicate.into(),
        pacing: Pacing::default(),
    };

    let folders = find_album_folders(&root)
        .await
        .context("Failed to read export directory")?;

    println!("📂 Export:   {}", root.display());
    println!("📁 Albums:   {}", folders.len());
    if config.dry_run {
        println!("🔍 Mode:     DRY RUN (nothing is uploaded)");
    }
    println!();

    if folders.is_empty() {
        println!("No subfolders to upload.");
        return Ok(());
    }

    let decisions: Box<dyn DecisionProvider> = match config.duplicate_policy {
        DuplicatePolicy::Prompt => Box::new(TerminalPrompt::new(
            std::io::stdin().lock(),
            std::io::stdout(),
        )),
        policy => Box::new(FixedPolicy(policy)),
    };

    let between_batches = config.pacing.between_batches;
    let dry_run = config.dry_run;
    let mut pipeline = SyncPipeline::new(config, decisions);

    if !dry_run {
        info!("Authorizing with {}", cli.credentials.display());
        let tokens = authenticate(&cli.credentials, &cli.token)
            .await
            .context("Authorization failed")?;
        let client = PhotosClient::new(Arc::new(tokens))
            .context("Failed to create Photos client")?
            .with_batch_pause(between_batches);
        pipeline = pipeline.with_library(Arc::new(client));
    }

    let summary = pipeline.run(&root).await.context("Sync failed")?;

    println!();
    if dry_run {
        println!("📊 Summary (DRY RUN):");
    } else {
        println!("📊 Summary:");
        println!("   ✅ Uploaded: {} files", summary.added);
    }
    println!("   ⏭️  Skipped:  {} files", summary.skipped);
    if summary.failed_folders > 0 {
        warn!("{} folders failed", summary.failed_folders);
        println!("   ⚠️  Failed:   {} folders", summary.failed_folders);
    }

    Ok(())
}
