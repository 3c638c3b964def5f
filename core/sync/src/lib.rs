//! Album sync pipeline for albumsync.
//!
//! This crate provides:
//! - Discovery of album folders and supported media files
//! - The upload ledger that makes repeated runs idempotent
//! - Duplicate resolution (interactive prompt or fixed policy)
//! - The per-folder pipeline and the multi-folder run driver

pub mod config;
pub mod duplicate;
pub mod ledger;
pub mod media;
pub mod pipeline;

// Re-export main types
pub use config::{DuplicatePolicy, Pacing, SyncConfig};
pub use duplicate::{
    format_remote_date, Decision, DecisionProvider, DuplicateInfo, FixedPolicy, TerminalPrompt,
};
pub use ledger::{UploadLedger, LEDGER_FILE};
pub use media::{
    find_album_folders, find_media_files, format_size, LocalDetails, LocalFile, MAX_FILE_SIZE,
    SUPPORTED_EXTENSIONS,
};
pub use pipeline::{FolderReport, RunState, RunSummary, SyncPipeline};
