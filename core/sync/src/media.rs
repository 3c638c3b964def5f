//! Local media discovery and inspection.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};

use albumsync_common::Result;

/// Extensions (lowercase, without dot) picked up for upload.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    // Images
    "jpg", "jpeg", "png", "gif", "webp", "heic", "heif", "bmp", "tiff", "tif", "avif", "ico",
    // RAW
    "raw", "raf", "cr2", "cr3", "nef", "arw", "dng", "orf", "rw2", "pef", "srw",
    // Video
    "mp4", "mov", "avi", "mkv", "m4v", "3gp", "wmv", "mpg",
];

/// Largest file the service accepts (200 MB).
pub const MAX_FILE_SIZE: u64 = 200 * 1024 * 1024;

/// Whether `path` has a supported extension (case-insensitive).
pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// A candidate file as seen at discovery time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    /// Absolute path; the file's identity.
    pub path: PathBuf,
    /// Base name, also the default upload name.
    pub filename: String,
    pub size: u64,
    pub modified: Option<SystemTime>,
}

/// Capture details read lazily for a duplicate prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalDetails {
    /// EXIF capture time, falling back to the modification time.
    pub captured: Option<DateTime<Local>>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl LocalFile {
    /// Snapshot `path` (made absolute) with its size and mtime.
    pub async fn from_path(path: &Path) -> Result<Self> {
        let path = std::path::absolute(path)?;
        let metadata = tokio::fs::metadata(&path).await?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self {
            filename,
            size: metadata.len(),
            modified: metadata.modified().ok(),
            path,
        })
    }

    /// Read EXIF capture time and pixel dimensions.
    ///
    /// Files without readable EXIF keep the modification time and no
    /// dimensions.
    pub fn inspect(&self) -> LocalDetails {
        let mut details = LocalDetails {
            captured: self.modified.map(DateTime::<Local>::from),
            width: None,
            height: None,
        };

        let file = match std::fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) => {
                debug!("Cannot open {}: {}", self.path.display(), e);
                return details;
            }
        };

        let exif_data = match exif::Reader::new().read_from_container(&mut BufReader::new(file)) {
            Ok(data) => data,
            Err(e) => {
                debug!("No EXIF data in {}: {}", self.path.display(), e);
                return details;
            }
        };

        if let Some(captured) = exif_data
            .get_field(exif::Tag::DateTimeOriginal, exif::In::PRIMARY)
            .and_then(|field| exif_datetime(&field.value))
        {
            details.captured = Some(captured);
        }
        details.width = exif_data
            .get_field(exif::Tag::PixelXDimension, exif::In::PRIMARY)
            .and_then(|field| field.value.get_uint(0));
        details.height = exif_data
            .get_field(exif::Tag::PixelYDimension, exif::In::PRIMARY)
            .and_then(|field| field.value.get_uint(0));

        details
    }
}

/// EXIF timestamps carry no zone; they are local camera time.
fn exif_datetime(value: &exif::Value) -> Option<DateTime<Local>> {
    let exif::Value::Ascii(parts) = value else {
        return None;
    };
    let raw = std::str::from_utf8(parts.first()?).ok()?;
    let naive = NaiveDateTime::parse_from_str(raw.trim_end_matches('\0'), "%Y:%m:%d %H:%M:%S").ok()?;
    Local.from_local_datetime(&naive).earliest()
}

/// Immediate, non-hidden subdirectories of `root`, sorted by path.
pub async fn find_album_folders(root: &Path) -> Result<Vec<PathBuf>> {
    let mut folders = Vec::new();
    let mut entries = tokio::fs::read_dir(root).await?;

    while let Some(entry) = entries.next_entry().await? {
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        if entry.file_type().await?.is_dir() {
            folders.push(entry.path());
        }
    }

    folders.sort();
    Ok(folders)
}

/// Supported regular files directly inside `folder`, sorted by full path.
pub async fn find_media_files(folder: &Path) -> Result<Vec<LocalFile>> {
    let mut paths = Vec::new();
    let mut entries = tokio::fs::read_dir(folder).await?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_dir() || !is_supported(&path) {
            continue;
        }
        paths.push(path);
    }
    paths.sort();

    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let file = LocalFile::from_path(&path).await?;
        if file.size > MAX_FILE_SIZE {
            warn!(
                "{} is {} and exceeds the {} upload limit",
                file.filename,
                format_size(file.size),
                format_size(MAX_FILE_SIZE)
            );
        }
        files.push(file);
    }
    Ok(files)
}

/// Human-readable size: `B`, `KB`, `MB` (one decimal) or `GB` (two).
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    match bytes {
        b if b < KB => format!("{} B", b),
        b if b < MB => format!("{:.1} KB", b as f64 / KB as f64),
        b if b < GB => format!("{:.1} MB", b as f64 / MB as f64),
        b => format!("{:.2} GB", b as f64 / GB as f64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1024), "1.0 KB");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.00 GB");
    }

    #[test]
    fn test_supported_extensions_case_insensitive() {
        assert!(is_supported(Path::new("a.JPG")));
        assert!(is_supported(Path::new("clip.Mov")));
        assert!(is_supported(Path::new("raw.cr3")));
        assert!(!is_supported(Path::new("notes.txt")));
        assert!(!is_supported(Path::new("noext")));
    }

    #[tokio::test]
    async fn test_find_album_folders() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("Zoo")).unwrap();
        std::fs::create_dir(dir.path().join("Album1")).unwrap();
        std::fs::create_dir(dir.path().join(".hidden")).unwrap();
        std::fs::write(dir.path().join("file.jpg"), b"x").unwrap();

        let folders = find_album_folders(dir.path()).await.unwrap();
        let names: Vec<_> = folders
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["Album1", "Zoo"]);
    }

    #[tokio::test]
    async fn test_find_media_files_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.png"), b"image").unwrap();
        std::fs::write(dir.path().join("a.jpg"), b"photo").unwrap();
        std::fs::write(dir.path().join("readme.txt"), b"text").unwrap();
        std::fs::create_dir(dir.path().join("nested.jpg")).unwrap();

        let files = find_media_files(dir.path()).await.unwrap();
        let names: Vec<_> = files.iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(names, vec!["a.jpg", "b.png"]);
        assert!(files[0].path.is_absolute());
        assert_eq!(files[0].size, 5);
    }

    #[tokio::test]
    async fn test_inspect_without_exif_uses_mtime() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plain.jpg");
        std::fs::write(&path, b"not really a jpeg").unwrap();

        let file = LocalFile::from_path(&path).await.unwrap();
        let details = file.inspect();
        assert!(details.captured.is_some());
        assert_eq!(details.width, None);
        assert_eq!(details.height, None);
    }

    #[test]
    fn test_exif_datetime_parsing() {
        let value = exif::Value::Ascii(vec![b"2024:06:01 10:30:00".to_vec()]);
        let parsed = exif_datetime(&value).unwrap();
        assert_eq!(parsed.format("%Y-%m-%d %H:%M").to_string(), "2024-06-01 10:30");

        assert!(exif_datetime(&exif::Value::Ascii(vec![b"garbage".to_vec()])).is_none());
        assert!(exif_datetime(&exif::Value::Short(vec![1])).is_none());
    }
}
