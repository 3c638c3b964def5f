//! In-memory photo library for testing.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use albumsync_common::{ApiOperation, Error, Result};

use crate::library::{
    AlbumCache, AttachReport, PhotosLibrary, RemoteMediaItem, UploadToken, MAX_BATCH_CREATE,
};

#[derive(Debug, Default)]
struct Album {
    title: String,
    items: Vec<RemoteMediaItem>,
}

#[derive(Debug, Default)]
struct State {
    albums: BTreeMap<String, Album>,
    /// Upload token → filename the bytes were tagged with.
    uploads: HashMap<String, String>,
    uploaded_filenames: Vec<String>,
    calls: HashMap<ApiOperation, usize>,
    forbid_listing: bool,
    rejected_filenames: HashSet<String>,
    failing_attaches: usize,
}

/// In-memory photo library.
///
/// Records every call per [`ApiOperation`] and supports a few injected
/// failures, so pipeline behavior can be checked without a network.
/// Attach batching follows [`MAX_BATCH_CREATE`] like the real service.
pub struct MemoryLibrary {
    state: Mutex<State>,
}

impl MemoryLibrary {
    /// Create an empty library.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Seed an album and return its id. Not counted as a call.
    pub fn insert_album(&self, title: &str) -> String {
        let id = Uuid::new_v4().to_string();
        self.state().albums.insert(
            id.clone(),
            Album {
                title: title.to_string(),
                items: Vec::new(),
            },
        );
        id
    }

    /// Seed an item into an existing album.
    pub fn insert_item(&self, album_id: &str, item: RemoteMediaItem) {
        if let Some(album) = self.state().albums.get_mut(album_id) {
            album.items.push(item);
        }
    }

    /// Answer album listing with HTTP 403.
    pub fn forbid_album_listing(&self) {
        self.state().forbid_listing = true;
    }

    /// Uploads tagged with `filename` are accepted but never attach.
    pub fn reject_filename(&self, filename: &str) {
        self.state().rejected_filenames.insert(filename.to_string());
    }

    /// Make the next `count` attach calls fail with HTTP 404 before any batch.
    pub fn fail_next_attaches(&self, count: usize) {
        self.state().failing_attaches = count;
    }

    /// Number of calls made for `operation`. Attach counts once per batch.
    pub fn call_count(&self, operation: ApiOperation) -> usize {
        self.state().calls.get(&operation).copied().unwrap_or(0)
    }

    /// Total number of remote calls made.
    pub fn total_calls(&self) -> usize {
        self.state().calls.values().sum()
    }

    /// Filenames of every upload, in call order.
    pub fn uploaded_filenames(&self) -> Vec<String> {
        self.state().uploaded_filenames.clone()
    }

    /// Titles of all albums, including created ones.
    pub fn album_titles(&self) -> Vec<String> {
        self.state()
            .albums
            .values()
            .map(|album| album.title.clone())
            .collect()
    }

    /// Filenames currently in an album.
    pub fn album_filenames(&self, album_id: &str) -> Vec<String> {
        self.state()
            .albums
            .get(album_id)
            .map(|album| album.items.iter().map(|i| i.filename.clone()).collect())
            .unwrap_or_default()
    }

    fn record(state: &mut State, operation: ApiOperation) {
        *state.calls.entry(operation).or_insert(0) += 1;
    }
}

impl Default for MemoryLibrary {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PhotosLibrary for MemoryLibrary {
    async fn list_albums(&self) -> Result<AlbumCache> {
        let mut state = self.state();
        Self::record(&mut state, ApiOperation::ListAlbums);

        if state.forbid_listing {
            return Err(Error::api(
                ApiOperation::ListAlbums,
                403,
                "Request had insufficient authentication scopes.",
            ));
        }

        Ok(state
            .albums
            .iter()
            .map(|(id, album)| (album.title.clone(), id.clone()))
            .collect())
    }

    async fn create_album(&self, title: &str) -> Result<String> {
        Self::record(&mut self.state(), ApiOperation::CreateAlbum);
        Ok(self.insert_album(title))
    }

    async fn list_album_items(&self, album_id: &str) -> Result<BTreeMap<String, RemoteMediaItem>> {
        let mut state = self.state();
        Self::record(&mut state, ApiOperation::SearchItems);

        let album = state
            .albums
            .get(album_id)
            .ok_or_else(|| Error::api(ApiOperation::SearchItems, 404, "album not found"))?;

        Ok(album
            .items
            .iter()
            .map(|item| (item.filename.clone(), item.clone()))
            .collect())
    }

    async fn remove_from_album(&self, album_id: &str, media_item_ids: &[String]) -> Result<()> {
        let mut state = self.state();
        Self::record(&mut state, ApiOperation::RemoveItems);

        let album = state
            .albums
            .get_mut(album_id)
            .ok_or_else(|| Error::api(ApiOperation::RemoveItems, 404, "album not found"))?;
        album.items.retain(|item| !media_item_ids.contains(&item.id));
        Ok(())
    }

    async fn upload_file(
        &self,
        path: &Path,
        filename_override: Option<&str>,
    ) -> Result<UploadToken> {
        // Missing files fail like a real upload.
        tokio::fs::metadata(path).await?;

        let filename = match filename_override {
            Some(name) => name.to_string(),
            None => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| Error::InvalidInput(format!("No file name in {}", path.display())))?,
        };

        let mut state = self.state();
        Self::record(&mut state, ApiOperation::Upload);

        let token = Uuid::new_v4().to_string();
        state.uploads.insert(token.clone(), filename.clone());
        state.uploaded_filenames.push(filename);
        Ok(UploadToken::new(token))
    }

    async fn add_to_album(&self, tokens: &[UploadToken], album_id: &str) -> AttachReport {
        let mut report = AttachReport::default();
        let mut state = self.state();

        for (batch_no, batch) in tokens.chunks(MAX_BATCH_CREATE).enumerate() {
            Self::record(&mut state, ApiOperation::BatchCreate);

            if state.failing_attaches > 0 || !state.albums.contains_key(album_id) {
                state.failing_attaches = state.failing_attaches.saturating_sub(1);
                report.failure = Some(Error::api(
                    ApiOperation::BatchCreate,
                    404,
                    "Requested entity was not found.",
                ));
                return report;
            }

            let offset = batch_no * MAX_BATCH_CREATE;
            for (i, token) in batch.iter().enumerate() {
                let Some(filename) = state.uploads.get(token.as_str()).cloned() else {
                    continue;
                };
                if state.rejected_filenames.contains(&filename) {
                    continue;
                }

                let item = RemoteMediaItem {
                    id: Uuid::new_v4().to_string(),
                    filename,
                    creation_time: Some(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
                    width: None,
                    height: None,
                };
                if let Some(album) = state.albums.get_mut(album_id) {
                    album.items.push(item);
                    report.succeeded.insert(offset + i);
                }
            }
        }

        report
    }
}
