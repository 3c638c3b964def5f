//! Google Photos Library API client.

use async_trait::async_trait;
use reqwest::{header, Body, Client};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use albumsync_common::{ApiOperation, Error, Result};

use crate::auth::AccessTokenSource;
use crate::library::{
    AlbumCache, AttachReport, PhotosLibrary, RemoteMediaItem, UploadToken, MAX_BATCH_CREATE,
};

/// Photos Library API base URL.
pub const API_BASE: &str = "https://photoslibrary.googleapis.com/v1";

/// Albums requested per listing page.
const ALBUM_PAGE_SIZE: &str = "50";
/// Media items requested per search page.
const SEARCH_PAGE_SIZE: u32 = 100;
/// Pause between consecutive batchCreate calls.
const DEFAULT_BATCH_PAUSE: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AlbumListResponse {
    #[serde(default)]
    albums: Vec<AlbumEntry>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AlbumEntry {
    id: String,
    #[serde(default)]
    title: String,
}

#[derive(Debug, Deserialize)]
struct CreatedAlbum {
    id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    album_id: &'a str,
    page_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    page_token: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    media_items: Vec<MediaItemEntry>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MediaItemEntry {
    id: String,
    #[serde(default)]
    filename: String,
    #[serde(default)]
    media_metadata: MediaMetadata,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MediaMetadata {
    creation_time: Option<String>,
    width: Option<String>,
    height: Option<String>,
}

impl From<MediaItemEntry> for RemoteMediaItem {
    fn from(entry: MediaItemEntry) -> Self {
        Self {
            id: entry.id,
            filename: entry.filename,
            creation_time: entry.media_metadata.creation_time,
            width: entry.media_metadata.width,
            height: entry.media_metadata.height,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchCreateResponse {
    #[serde(default)]
    new_media_item_results: Vec<NewMediaItemResult>,
}

#[derive(Debug, Deserialize)]
struct NewMediaItemResult {
    #[serde(default)]
    status: ItemStatus,
}

/// Per-item status of a batchCreate result.
#[derive(Debug, Default, Deserialize)]
pub struct ItemStatus {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: String,
}

impl ItemStatus {
    /// `"Success"`, `"OK"` or a zero (or absent) code count as attached.
    pub fn is_success(&self) -> bool {
        self.message == "Success" || self.message == "OK" || self.code.unwrap_or(0) == 0
    }
}

/// Photos Library API client.
pub struct PhotosClient {
    http: Client,
    tokens: Arc<dyn AccessTokenSource>,
    base_url: String,
    batch_pause: Duration,
}

impl PhotosClient {
    /// Create a client against the public API.
    pub fn new(tokens: Arc<dyn AccessTokenSource>) -> Result<Self> {
        Self::with_base_url(tokens, API_BASE)
    }

    /// Create a client against another base URL (a mock server in tests).
    pub fn with_base_url(
        tokens: Arc<dyn AccessTokenSource>,
        base_url: impl Into<String>,
    ) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("albumsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            tokens,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            batch_pause: DEFAULT_BATCH_PAUSE,
        })
    }

    /// Override the pause between batchCreate calls.
    pub fn with_batch_pause(mut self, pause: Duration) -> Self {
        self.batch_pause = pause;
        self
    }

    /// Get authorization header.
    async fn auth_header(&self) -> Result<String> {
        let token = self.tokens.access_token().await?;
        Ok(format!("Bearer {}", token))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Post one batch of upload tokens.
    async fn batch_create(
        &self,
        tokens: &[UploadToken],
        album_id: &str,
    ) -> Result<Vec<NewMediaItemResult>> {
        let items: Vec<_> = tokens
            .iter()
            .map(|t| serde_json::json!({ "simpleMediaItem": { "uploadToken": t.as_str() } }))
            .collect();
        let body = serde_json::json!({ "albumId": album_id, "newMediaItems": items });

        let response = self
            .http
            .post(self.url("/mediaItems:batchCreate"))
            .header(header::AUTHORIZATION, self.auth_header().await?)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Network(format!("batchCreate request failed: {}", e)))?;

        let parsed: BatchCreateResponse =
            handle_response(response, ApiOperation::BatchCreate).await?;
        Ok(parsed.new_media_item_results)
    }
}

/// Check status and decode a JSON body.
async fn handle_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    operation: ApiOperation,
) -> Result<T> {
    let response = check_status(response, operation).await?;
    let text = response
        .text()
        .await
        .map_err(|e| Error::Network(format!("Failed to read {} response: {}", operation, e)))?;
    serde_json::from_str(&text).map_err(|e| {
        Error::Serialization(format!("Failed to decode {} response: {}", operation, e))
    })
}

/// Turn a non-success status into [`Error::Api`].
async fn check_status(
    response: reqwest::Response,
    operation: ApiOperation,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::api(operation, status.as_u16(), body))
}

#[async_trait]
impl PhotosLibrary for PhotosClient {
    async fn list_albums(&self) -> Result<AlbumCache> {
        let mut albums = AlbumCache::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .http
                .get(self.url("/albums"))
                .header(header::AUTHORIZATION, self.auth_header().await?)
                .query(&[("pageSize", ALBUM_PAGE_SIZE)]);

            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let response = request
                .send()
                .await
                .map_err(|e| Error::Network(format!("List albums request failed: {}", e)))?;

            let page: AlbumListResponse = handle_response(response, ApiOperation::ListAlbums).await?;
            for album in page.albums {
                albums.insert(album.title, album.id);
            }

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!("Listed {} albums", albums.len());
        Ok(albums)
    }

    async fn create_album(&self, title: &str) -> Result<String> {
        let response = self
            .http
            .post(self.url("/albums"))
            .header(header::AUTHORIZATION, self.auth_header().await?)
            .json(&serde_json::json!({ "album": { "title": title } }))
            .send()
            .await
            .map_err(|e| Error::Network(format!("Create album request failed: {}", e)))?;

        let created: CreatedAlbum = handle_response(response, ApiOperation::CreateAlbum).await?;
        debug!("Created album '{}' ({})", title, created.id);
        Ok(created.id)
    }

    async fn list_album_items(&self, album_id: &str) -> Result<BTreeMap<String, RemoteMediaItem>> {
        let mut items = BTreeMap::new();
        let mut page_token: Option<String> = None;

        loop {
            let body = SearchRequest {
                album_id,
                page_size: SEARCH_PAGE_SIZE,
                page_token: page_token.as_deref(),
            };

            let response = self
                .http
                .post(self.url("/mediaItems:search"))
                .header(header::AUTHORIZATION, self.auth_header().await?)
                .json(&body)
                .send()
                .await
                .map_err(|e| Error::Network(format!("Search request failed: {}", e)))?;

            let page: SearchResponse = handle_response(response, ApiOperation::SearchItems).await?;
            for entry in page.media_items {
                let item = RemoteMediaItem::from(entry);
                items.insert(item.filename.clone(), item);
            }

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(items)
    }

    async fn remove_from_album(&self, album_id: &str, media_item_ids: &[String]) -> Result<()> {
        let response = self
            .http
            .post(self.url(&format!("/albums/{}:batchRemoveMediaItems", album_id)))
            .header(header::AUTHORIZATION, self.auth_header().await?)
            .json(&serde_json::json!({ "mediaItemIds": media_item_ids }))
            .send()
            .await
            .map_err(|e| Error::Network(format!("Remove from album request failed: {}", e)))?;

        check_status(response, ApiOperation::RemoveItems).await?;
        Ok(())
    }

    async fn upload_file(
        &self,
        path: &Path,
        filename_override: Option<&str>,
    ) -> Result<UploadToken> {
        let filename = match filename_override {
            Some(name) => name.to_string(),
            None => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| {
                    Error::InvalidInput(format!("No file name in {}", path.display()))
                })?,
        };

        let file = tokio::fs::File::open(path).await?;
        let body = Body::wrap_stream(ReaderStream::new(file));

        let response = self
            .http
            .post(self.url("/uploads"))
            .header(header::AUTHORIZATION, self.auth_header().await?)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .header("X-Goog-Upload-Protocol", "raw")
            .header("X-Goog-Upload-File-Name", filename.as_str())
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Network(format!("Upload of {} failed: {}", filename, e)))?;

        let response = check_status(response, ApiOperation::Upload).await?;
        let token = response
            .text()
            .await
            .map_err(|e| Error::Network(format!("Failed to read upload token: {}", e)))?;
        Ok(UploadToken::new(token))
    }

    async fn add_to_album(&self, tokens: &[UploadToken], album_id: &str) -> AttachReport {
        let mut report = AttachReport::default();
        let batch_count = tokens.len().div_ceil(MAX_BATCH_CREATE);

        for (batch_no, batch) in tokens.chunks(MAX_BATCH_CREATE).enumerate() {
            let offset = batch_no * MAX_BATCH_CREATE;

            match self.batch_create(batch, album_id).await {
                Ok(results) => {
                    for (i, result) in results.iter().take(batch.len()).enumerate() {
                        if result.status.is_success() {
                            report.succeeded.insert(offset + i);
                        } else {
                            warn!(
                                "Item {} not added: code {:?} {}",
                                offset + i,
                                result.status.code,
                                result.status.message
                            );
                        }
                    }
                }
                // The next batch gets its own attempt.
                Err(e @ (Error::Network(_) | Error::Serialization(_))) => {
                    warn!("batchCreate batch {} failed: {}", batch_no + 1, e);
                }
                Err(e) => {
                    report.failure = Some(e);
                    return report;
                }
            }

            if batch_no + 1 < batch_count {
                tokio::time::sleep(self.batch_pause).await;
            }
        }

        report
    }
}
