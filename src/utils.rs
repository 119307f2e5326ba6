//! Utility functions for file operations

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::AsyncWriteExt;

static STAGING_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Write `bytes` to `path` so readers see either the old or the new content
///
/// The data goes to a hidden sibling file first, is flushed to disk, and is
/// then renamed over `path`. The parent directory is created if needed. On
/// failure the staging file is removed and `path` is untouched.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "path must have parent")
    })?;
    if !parent.as_os_str().is_empty() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let staging = staging_path_for(path)?;
    let result = async {
        let mut file = tokio::fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&staging)
            .await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&staging, path).await
    }
    .await;

    if result.is_err() {
        tokio::fs::remove_file(&staging).await.ok();
    }
    result
}

/// Hidden, process-unique sibling of `path` used as a staging file
fn staging_path_for(path: &Path) -> std::io::Result<PathBuf> {
    let file_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "bad filename"))?;
    let suffix = format!(
        "tmp.{}.{}.{}",
        std::process::id(),
        unix_time_ms(),
        STAGING_COUNTER.fetch_add(1, Ordering::Relaxed)
    );
    Ok(path.with_file_name(format!(".{file_name}.{suffix}")))
}

pub(crate) fn unix_time_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .min(u64::MAX as u128) as u64
}

/// Path of `target` relative to `base` when `target` lives under it
///
/// Used to emit links that keep working when the output directory is moved.
/// Falls back to `target` unchanged.
pub fn relative_to(target: &Path, base: &Path) -> PathBuf {
    target
        .strip_prefix(base)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| target.to_path_buf())
}

/// Forward-slash form of a path for use in URLs
pub fn to_url_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            std::path::Component::CurDir => None,
            std::path::Component::RootDir => Some(String::new()),
            other => Some(other.as_os_str().to_string_lossy().into_owned()),
        })
        .collect::<Vec<_>>()
        .join("/")
}
