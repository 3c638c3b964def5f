//! Folder-by-folder upload pipeline.
//!
//! Each immediate subfolder of the export root becomes one album. Per folder
//! the pipeline filters files already in the ledger, resolves the album,
//! checks the album for filename collisions, uploads the remaining files one
//! at a time and attaches them in batches. Only attaches confirmed by the
//! service reach the ledger.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use albumsync_common::{AlbumTitle, Error, Result};
use albumsync_photos::{get_or_create_album, AlbumCache, PhotosLibrary, UploadToken};

use crate::config::SyncConfig;
use crate::duplicate::{Decision, DecisionProvider, DuplicateInfo};
use crate::ledger::UploadLedger;
use crate::media::{find_album_folders, find_media_files, format_size, LocalFile};

/// Mutable state shared by all folders of one run.
#[derive(Debug)]
pub struct RunState {
    pub ledger: UploadLedger,
    /// Album title → id, live listing plus albums created during the run.
    pub albums: AlbumCache,
    /// False when album listing was forbidden; duplicate checks are skipped.
    pub can_list_remote: bool,
}

impl RunState {
    pub fn new(ledger: UploadLedger) -> Self {
        Self {
            ledger,
            albums: AlbumCache::new(),
            can_list_remote: true,
        }
    }
}

/// Counts for one folder.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FolderReport {
    pub added: usize,
    pub skipped: usize,
}

/// Aggregate counts for a run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub added: usize,
    pub skipped: usize,
    pub failed_folders: usize,
}

/// Drives a sync run against a [`PhotosLibrary`].
pub struct SyncPipeline {
    library: Option<Arc<dyn PhotosLibrary>>,
    decisions: Box<dyn DecisionProvider>,
    config: SyncConfig,
}

impl SyncPipeline {
    /// Create a pipeline. A library is only required outside dry-run.
    pub fn new(config: SyncConfig, decisions: Box<dyn DecisionProvider>) -> Self {
        Self {
            library: None,
            decisions,
            config,
        }
    }

    /// Attach the remote library.
    pub fn with_library(mut self, library: Arc<dyn PhotosLibrary>) -> Self {
        self.library = Some(library);
        self
    }

    fn library(&self) -> Result<Arc<dyn PhotosLibrary>> {
        self.library
            .clone()
            .ok_or_else(|| Error::InvalidInput("No photo library configured".to_string()))
    }

    /// Sync every album folder under `root`.
    ///
    /// Folder failures are logged and counted; the run goes on. Only a
    /// failed ledger load, a non-permission album listing failure or an
    /// authentication failure stops the run. The ledger is written once at
    /// the end, never in dry-run.
    pub async fn run(&mut self, root: &Path) -> Result<RunSummary> {
        let folders = find_album_folders(root).await?;
        let ledger = UploadLedger::load(root).await?;
        let mut state = RunState::new(ledger);

        if !self.config.dry_run {
            let library = self.library()?;
            println!("📋 Loading existing albums...");
            match library.list_albums().await {
                Ok(albums) => state.albums = albums,
                Err(e) if e.is_forbidden() => {
                    warn!("Album listing forbidden, duplicate checks disabled: {}", e);
                    println!("  ⚠️  No access to the album list, continuing without duplicate checks");
                    state.can_list_remote = false;
                }
                Err(e) => return Err(e),
            }

            if !state.can_list_remote {
                let merged = state.ledger.merge_cached_albums(&mut state.albums);
                if merged > 0 {
                    println!("📝 Loaded {} albums from the ledger cache", merged);
                }
            }
        }

        if !state.ledger.is_empty() {
            println!("📝 {} files recorded as uploaded", state.ledger.len());
        }

        let mut summary = RunSummary::default();
        let mut fatal = None;

        for folder in &folders {
            let mut report = FolderReport::default();
            let outcome = self.sync_folder(folder, &mut state, &mut report).await;
            summary.added += report.added;
            summary.skipped += report.skipped;

            match outcome {
                Ok(()) => {}
                Err(e @ Error::Authentication(_)) => {
                    fatal = Some(e);
                    break;
                }
                Err(e) => {
                    error!("Folder {} failed: {}", folder.display(), e);
                    println!("  ⚠️  Error: {}", e);
                    summary.failed_folders += 1;
                }
            }
        }

        if !self.config.dry_run {
            state.ledger.set_albums(state.albums.clone());
            state.ledger.save(root).await?;
            debug!("Saved ledger with {} entries", state.ledger.len());
        }

        match fatal {
            Some(e) => Err(e),
            None => {
                info!(
                    "Run finished: {} added, {} skipped, {} failed folders",
                    summary.added, summary.skipped, summary.failed_folders
                );
                Ok(summary)
            }
        }
    }

    /// Sync one folder into the album named after it.
    pub async fn process_folder(
        &mut self,
        folder: &Path,
        state: &mut RunState,
    ) -> Result<FolderReport> {
        let mut report = FolderReport::default();
        self.sync_folder(folder, state, &mut report).await?;
        Ok(report)
    }

    /// Counts land in `report` as they are known, so a caller still sees the
    /// skips of a folder that fails later.
    async fn sync_folder(
        &mut self,
        folder: &Path,
        state: &mut RunState,
        report: &mut FolderReport,
    ) -> Result<()> {
        let title = AlbumTitle::from_folder(folder)?;
        let files = find_media_files(folder).await?;
        if files.is_empty() {
            return Ok(());
        }

        let total_size: u64 = files.iter().map(|f| f.size).sum();

        let candidates: Vec<LocalFile> = if self.config.skip_existing {
            let (done, pending): (Vec<_>, Vec<_>) =
                files.into_iter().partition(|f| state.ledger.contains(&f.path));
            report.skipped = done.len();
            pending
        } else {
            files
        };

        println!("\n  📁 {}", title);
        let skipped_note = if report.skipped > 0 {
            format!(" ({} uploaded earlier)", report.skipped)
        } else {
            String::new()
        };
        println!(
            "     {} files ({}){}",
            candidates.len(),
            format_size(total_size),
            skipped_note
        );

        if candidates.is_empty() {
            return Ok(());
        }

        if self.config.dry_run {
            for file in &candidates {
                println!("     → {} ({})", file.filename, format_size(file.size));
            }
            return Ok(());
        }

        let library = self.library()?;
        let mut album_id = get_or_create_album(library.as_ref(), title.as_str(), &mut state.albums)
            .await?;

        let remote_items = if state.can_list_remote {
            let items = library.list_album_items(&album_id).await?;
            if !items.is_empty() {
                println!("     📋 Album already holds {} items", items.len());
            }
            Some(items)
        } else {
            None
        };

        let total = candidates.len();
        let mut uploads: Vec<(UploadToken, PathBuf)> = Vec::new();

        for (idx, file) in candidates.iter().enumerate() {
            let mut upload_name = None;

            if let Some(remote) = remote_items.as_ref().and_then(|m| m.get(&file.filename)) {
                let duplicate = DuplicateInfo {
                    local: file,
                    remote,
                };
                match self.decisions.decide(&duplicate)? {
                    Decision::Skip => {
                        report.skipped += 1;
                        continue;
                    }
                    Decision::Replace => {
                        match library
                            .remove_from_album(&album_id, std::slice::from_ref(&remote.id))
                            .await
                        {
                            Ok(()) => println!("       ✓ Old item removed from album"),
                            Err(e) => {
                                warn!("Could not remove {} from album: {}", remote.id, e);
                                println!("       ⚠️  Could not remove: {}", e);
                            }
                        }
                    }
                    Decision::Rename(name) => upload_name = Some(name),
                }
            }

            let display_name = upload_name.as_deref().unwrap_or(&file.filename);
            match library.upload_file(&file.path, upload_name.as_deref()).await {
                Ok(token) => {
                    println!("     ⬆️  [{}/{}] {} ✓", idx + 1, total, display_name);
                    uploads.push((token, file.path.clone()));
                }
                Err(e) => {
                    println!("     ⬆️  [{}/{}] {} ✗", idx + 1, total, display_name);
                    warn!("Upload of {} failed: {}", file.path.display(), e);
                }
            }

            if self.config.pacing.pause_after(idx + 1, total) {
                tokio::time::sleep(self.config.pacing.file_pause).await;
            }
        }

        if uploads.is_empty() {
            println!("     ⚠️  No file was uploaded");
            return Ok(());
        }

        let tokens: Vec<UploadToken> = uploads.iter().map(|(token, _)| token.clone()).collect();
        println!("     📎 Adding {} files to the album...", tokens.len());
        let mut attach = library.add_to_album(&tokens, &album_id).await;

        if attach.is_total_failure() {
            if let Some(e) = &attach.failure {
                warn!("Attach to album {} failed, recreating it: {}", album_id, e);
            }
            println!("     🔄 Album not found, creating it again");
            state.albums.remove(title.as_str());
            album_id =
                get_or_create_album(library.as_ref(), title.as_str(), &mut state.albums).await?;
            attach = library.add_to_album(&tokens, &album_id).await;
        }

        for idx in &attach.succeeded {
            if let Some((_, path)) = uploads.get(*idx) {
                state.ledger.record(path);
            }
        }
        report.added = attach.added();

        match attach.failure {
            Some(e) if report.added == 0 => Err(e),
            Some(e) => {
                warn!(
                    "Album {} only received {} of {} files: {}",
                    title,
                    report.added,
                    tokens.len(),
                    e
                );
                println!("     ⚠️  {} added, remaining batches failed", report.added);
                Ok(())
            }
            None => {
                println!("     ✓ {} added", report.added);
                Ok(())
            }
        }
    }
}
