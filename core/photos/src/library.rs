//! Photo library trait definition.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

use albumsync_common::{Error, Result};

/// Hard remote limit on items per `mediaItems:batchCreate` call.
pub const MAX_BATCH_CREATE: usize = 50;

/// Album title → remote album id, shared across one run.
pub type AlbumCache = BTreeMap<String, String>;

/// A media item already present in a remote album.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteMediaItem {
    /// Remote media item id.
    pub id: String,
    /// Filename as shown by the service.
    pub filename: String,
    /// RFC 3339 creation time, when reported.
    pub creation_time: Option<String>,
    /// Pixel width (the service reports dimensions as strings).
    pub width: Option<String>,
    /// Pixel height.
    pub height: Option<String>,
}

/// Opaque handle returned by a raw upload, consumed by one attach call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UploadToken(String);

impl UploadToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UploadToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of attaching upload tokens to an album.
///
/// A single call may partially succeed: `succeeded` holds the indices (into
/// the token slice) the service accepted, `failure` the error that stopped
/// the remaining batches, if any.
#[derive(Debug, Default)]
pub struct AttachReport {
    pub succeeded: BTreeSet<usize>,
    pub failure: Option<Error>,
}

impl AttachReport {
    /// The call failed without attaching anything.
    pub fn is_total_failure(&self) -> bool {
        self.succeeded.is_empty() && self.failure.is_some()
    }

    /// Number of attached items.
    pub fn added(&self) -> usize {
        self.succeeded.len()
    }
}

/// Remote album/media service used by the sync pipeline.
///
/// Implementations handle their own authentication and rate limiting
/// between attach batches.
#[async_trait]
pub trait PhotosLibrary: Send + Sync {
    /// List all albums as title → id. Later duplicates of a title win.
    async fn list_albums(&self) -> Result<AlbumCache>;

    /// Create an album and return its id.
    async fn create_album(&self, title: &str) -> Result<String>;

    /// List an album's items keyed by filename. Later duplicates win.
    async fn list_album_items(&self, album_id: &str) -> Result<BTreeMap<String, RemoteMediaItem>>;

    /// Remove items from an album. There is no undo.
    async fn remove_from_album(&self, album_id: &str, media_item_ids: &[String]) -> Result<()>;

    /// Upload raw bytes of `path`, tagged with `filename_override` or the
    /// file's base name.
    async fn upload_file(&self, path: &Path, filename_override: Option<&str>)
        -> Result<UploadToken>;

    /// Attach upload tokens to an album in batches of at most
    /// [`MAX_BATCH_CREATE`].
    async fn add_to_album(&self, tokens: &[UploadToken], album_id: &str) -> AttachReport;
}

/// Return the cached id for `title`, creating the album when missing.
///
/// A newly created id is inserted into `cache`, so later folders with the
/// same title in this run reuse it.
pub async fn get_or_create_album<L: PhotosLibrary + ?Sized>(
    library: &L,
    title: &str,
    cache: &mut AlbumCache,
) -> Result<String> {
    if let Some(id) = cache.get(title) {
        return Ok(id.clone());
    }
    let id = library.create_album(title).await?;
    cache.insert(title.to_string(), id.clone());
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryLibrary;
    use albumsync_common::ApiOperation;

    #[tokio::test]
    async fn test_get_or_create_album_existing() {
        let library = MemoryLibrary::new();
        let mut cache = AlbumCache::from([("Existing".to_string(), "eid".to_string())]);

        let id = get_or_create_album(&library, "Existing", &mut cache)
            .await
            .unwrap();
        assert_eq!(id, "eid");
        assert_eq!(library.call_count(ApiOperation::CreateAlbum), 0);
    }

    #[tokio::test]
    async fn test_get_or_create_album_creates_once() {
        let library = MemoryLibrary::new();
        let mut cache = AlbumCache::new();

        let first = get_or_create_album(&library, "New", &mut cache).await.unwrap();
        let second = get_or_create_album(&library, "New", &mut cache).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(cache.get("New"), Some(&first));
        assert_eq!(library.call_count(ApiOperation::CreateAlbum), 1);
    }

    #[test]
    fn test_attach_report_total_failure() {
        let mut report = AttachReport::default();
        assert!(!report.is_total_failure());

        report.failure = Some(Error::api(ApiOperation::BatchCreate, 404, "gone"));
        assert!(report.is_total_failure());

        report.succeeded.insert(0);
        assert!(!report.is_total_failure());
        assert_eq!(report.added(), 1);
    }
}
