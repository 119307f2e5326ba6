//! Media store: the on-disk directory holding acquired assets
//!
//! Every asset lives at `<identifier>.<ext>`. Payloads are streamed into a
//! hidden `.<identifier>.part` staging file and renamed into place once
//! complete, so a final name never points at a truncated file.

use crate::types::{AssetId, MediaKind};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Extensions written for still images
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "heic"];

/// Extensions written for videos
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "webm", "mkv", "avi"];

/// Extensions that are neither, but can still be produced by a fetch
pub const OTHER_EXTENSIONS: &[&str] = &["zip"];

const STAGING_SUFFIX: &str = "part";

/// Kind implied by a file extension (case-insensitive)
pub fn kind_for_extension(ext: &str) -> Option<MediaKind> {
    let ext = ext.to_ascii_lowercase();
    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaKind::Image)
    } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaKind::Video)
    } else {
        None
    }
}

fn known_extensions() -> impl Iterator<Item = &'static str> {
    IMAGE_EXTENSIONS
        .iter()
        .chain(VIDEO_EXTENSIONS)
        .chain(OTHER_EXTENSIONS)
        .copied()
}

/// A file found in the media store
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredAsset {
    /// Full path
    pub path: PathBuf,
    /// File stem (the asset identifier for files written by this crate)
    pub stem: String,
    /// Lower-cased extension
    pub extension: String,
    /// Kind implied by the extension, if it is a media file
    pub kind: Option<MediaKind>,
}

/// Handle to the media store directory
#[derive(Clone, Debug)]
pub struct MediaStore {
    dir: PathBuf,
}

impl MediaStore {
    /// Store rooted at `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the directory if it does not exist
    pub async fn ensure_dir(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await
    }

    /// Staging file used while an asset is being written
    pub fn staging_path(&self, id: &AssetId) -> PathBuf {
        self.dir.join(format!(".{id}.{STAGING_SUFFIX}"))
    }

    /// Final location of an asset
    pub fn destination(&self, id: &AssetId, extension: &str) -> PathBuf {
        self.dir.join(format!("{id}.{extension}"))
    }

    /// Existing file for an identifier, under any known extension
    pub async fn existing(&self, id: &AssetId) -> Option<PathBuf> {
        for ext in known_extensions() {
            let candidate = self.destination(id, ext);
            if tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
                return Some(candidate);
            }
        }
        None
    }

    /// Move a completed staging file to its final name
    ///
    /// Files for the same identifier under a different known extension are
    /// removed afterwards, so one identifier never maps to two files.
    pub async fn commit(
        &self,
        staging: &Path,
        id: &AssetId,
        extension: &str,
    ) -> std::io::Result<PathBuf> {
        let destination = self.destination(id, extension);
        tokio::fs::rename(staging, &destination).await?;

        for ext in known_extensions().filter(|ext| *ext != extension) {
            let sibling = self.destination(id, ext);
            match tokio::fs::remove_file(&sibling).await {
                Ok(()) => {
                    debug!(path = %sibling.display(), "removed stale copy with other extension")
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %sibling.display(), error = %e, "failed to remove stale copy")
                }
            }
        }

        Ok(destination)
    }

    /// Every regular, non-hidden file in the store, ordered by file name
    ///
    /// A missing directory lists as empty.
    pub async fn list(&self) -> std::io::Result<Vec<StoredAsset>> {
        let mut read_dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut assets = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or(name)
                .to_string();
            let extension = path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("")
                .to_ascii_lowercase();
            let kind = kind_for_extension(&extension);
            assets.push(StoredAsset {
                path,
                stem,
                extension,
                kind,
            });
        }

        assets.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(assets)
    }
}
