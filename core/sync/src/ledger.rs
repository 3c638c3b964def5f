//! Persistent record of uploaded files and known album ids.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use albumsync_common::{Error, Result};
use albumsync_photos::AlbumCache;

/// Ledger file name inside the export root.
pub const LEDGER_FILE: &str = ".gphotos_uploaded.json";

/// Uploaded absolute paths plus the album cache from the last run.
///
/// A path is only recorded after the service confirmed its attach. The
/// album map is a hint; the live listing wins whenever it is available.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadLedger {
    #[serde(default)]
    uploaded: BTreeSet<String>,
    #[serde(default)]
    albums: AlbumCache,
}

impl UploadLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Path of the ledger file for `root`.
    pub fn path(root: &Path) -> PathBuf {
        root.join(LEDGER_FILE)
    }

    /// Load the ledger of `root`. A missing file is an empty ledger.
    pub async fn load(root: &Path) -> Result<Self> {
        let path = Self::path(root);
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => return Err(e.into()),
        };

        serde_json::from_slice(&data)
            .map_err(|e| Error::Serialization(format!("{}: {}", path.display(), e)))
    }

    /// Write the ledger as pretty JSON with a trailing newline.
    pub async fn save(&self, root: &Path) -> Result<()> {
        let mut data =
            serde_json::to_vec_pretty(self).map_err(|e| Error::Serialization(e.to_string()))?;
        data.push(b'\n');
        tokio::fs::write(Self::path(root), data).await?;
        Ok(())
    }

    /// Whether `path` was uploaded by an earlier run.
    pub fn contains(&self, path: &Path) -> bool {
        self.uploaded.contains(path.to_string_lossy().as_ref())
    }

    /// Record a confirmed upload.
    pub fn record(&mut self, path: &Path) {
        self.uploaded.insert(path.to_string_lossy().into_owned());
    }

    /// Number of recorded uploads.
    pub fn len(&self) -> usize {
        self.uploaded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uploaded.is_empty()
    }

    /// Cached album ids.
    pub fn albums(&self) -> &AlbumCache {
        &self.albums
    }

    /// Replace the cached album ids.
    pub fn set_albums(&mut self, albums: AlbumCache) {
        self.albums = albums;
    }

    /// Fill titles missing from `albums` with cached ids. Returns how many
    /// were added.
    pub fn merge_cached_albums(&self, albums: &mut AlbumCache) -> usize {
        let mut merged = 0;
        for (title, id) in &self.albums {
            if !albums.contains_key(title) {
                albums.insert(title.clone(), id.clone());
                merged += 1;
            }
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_ledger_is_empty() {
        let dir = TempDir::new().unwrap();
        let ledger = UploadLedger::load(dir.path()).await.unwrap();
        assert!(ledger.is_empty());
        assert!(ledger.albums().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_ledger_is_an_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(LEDGER_FILE), "{not json").unwrap();

        assert!(matches!(
            UploadLedger::load(dir.path()).await,
            Err(Error::Serialization(_))
        ));
    }

    #[tokio::test]
    async fn test_save_is_sorted_and_pretty() {
        let dir = TempDir::new().unwrap();
        let mut ledger = UploadLedger::new();
        ledger.record(Path::new("/export/b/2.jpg"));
        ledger.record(Path::new("/export/a/1.jpg"));
        ledger.set_albums(AlbumCache::from([("a".to_string(), "id-a".to_string())]));

        ledger.save(dir.path()).await.unwrap();

        let raw = std::fs::read_to_string(dir.path().join(LEDGER_FILE)).unwrap();
        assert!(raw.ends_with("}\n"));
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(
            value["uploaded"],
            serde_json::json!(["/export/a/1.jpg", "/export/b/2.jpg"])
        );
        assert_eq!(value["albums"]["a"], "id-a");
    }

    #[tokio::test]
    async fn test_missing_fields_default() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(LEDGER_FILE), r#"{"uploaded":["/x.jpg"]}"#).unwrap();

        let ledger = UploadLedger::load(dir.path()).await.unwrap();
        assert!(ledger.contains(Path::new("/x.jpg")));
        assert!(ledger.albums().is_empty());
    }

    #[test]
    fn test_merge_cached_albums_keeps_live_ids() {
        let mut ledger = UploadLedger::new();
        ledger.set_albums(AlbumCache::from([
            ("Trip".to_string(), "cached-trip".to_string()),
            ("Home".to_string(), "cached-home".to_string()),
        ]));
        let mut live = AlbumCache::from([("Trip".to_string(), "live-trip".to_string())]);

        assert_eq!(ledger.merge_cached_albums(&mut live), 1);
        assert_eq!(live["Trip"], "live-trip");
        assert_eq!(live["Home"], "cached-home");
    }

    proptest! {
        #[test]
        fn test_round_trip_preserves_membership(
            paths in proptest::collection::btree_set("/[a-z]{1,8}/[a-z0-9]{1,8}\\.jpg", 0..20),
            albums in proptest::collection::btree_map("[A-Za-z ]{1,10}", "[a-z0-9]{4,12}", 0..5),
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let dir = TempDir::new().unwrap();

            let mut ledger = UploadLedger::new();
            for path in &paths {
                ledger.record(Path::new(path));
            }
            ledger.set_albums(albums.clone());
            rt.block_on(ledger.save(dir.path())).unwrap();

            let loaded = rt.block_on(UploadLedger::load(dir.path())).unwrap();
            prop_assert_eq!(&loaded, &ledger);
            prop_assert_eq!(loaded.albums(), &albums);

            let raw = std::fs::read_to_string(dir.path().join(LEDGER_FILE)).unwrap();
            let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
            let saved: Vec<String> = serde_json::from_value(value["uploaded"].clone()).unwrap();
            let mut sorted = saved.clone();
            sorted.sort();
            prop_assert_eq!(saved, sorted);
        }
    }
}
