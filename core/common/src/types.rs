//! Common types used throughout albumsync.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Remote call a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApiOperation {
    ListAlbums,
    CreateAlbum,
    SearchItems,
    RemoveItems,
    Upload,
    BatchCreate,
}

impl fmt::Display for ApiOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ApiOperation::ListAlbums => "list albums",
            ApiOperation::CreateAlbum => "create album",
            ApiOperation::SearchItems => "search album items",
            ApiOperation::RemoveItems => "remove from album",
            ApiOperation::Upload => "upload",
            ApiOperation::BatchCreate => "batchCreate",
        };
        f.write_str(name)
    }
}

/// Title of a remote album, taken from the base name of a local folder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AlbumTitle(String);

impl AlbumTitle {
    /// Create a title from a string.
    ///
    /// # Errors
    /// - Returns error if the title is empty
    pub fn new(title: impl Into<String>) -> crate::Result<Self> {
        let title = title.into();
        if title.is_empty() {
            return Err(crate::Error::InvalidInput(
                "Album title cannot be empty".to_string(),
            ));
        }
        Ok(Self(title))
    }

    /// Derive the title from a folder path (its last component).
    pub fn from_folder(folder: &Path) -> crate::Result<Self> {
        let name = folder
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                crate::Error::InvalidInput(format!(
                    "Folder has no base name: {}",
                    folder.display()
                ))
            })?;
        Self::new(name)
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AlbumTitle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
