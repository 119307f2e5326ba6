//! Video thumbnails for the gallery
//!
//! Frame extraction sits behind the [`ThumbnailTool`] trait. The default
//! implementation shells out to `ffmpeg`; [`NoOpThumbnailer`] is used when no
//! binary can be found so the rest of the pipeline still runs.

use crate::config::ToolsConfig;
use crate::error::{Error, Result};
use crate::store::MediaStore;
use crate::types::MediaKind;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Extension of generated thumbnails
pub const THUMBNAIL_EXTENSION: &str = "jpg";

/// Something that can turn a video into a still frame
#[async_trait]
pub trait ThumbnailTool: Send + Sync {
    /// Write a single frame of `video` to `thumbnail`, overwriting it
    async fn extract_frame(&self, video: &Path, thumbnail: &Path) -> Result<()>;

    /// Short name used in log lines
    fn name(&self) -> &'static str;
}

/// Thumbnail tool backed by the `ffmpeg` binary
#[derive(Clone, Debug)]
pub struct FfmpegThumbnailer {
    binary_path: PathBuf,
    seek: String,
}

impl FfmpegThumbnailer {
    /// Use an explicit binary, grabbing the frame at `seek` (e.g. `00:00:01`)
    pub fn new(binary_path: PathBuf, seek: impl Into<String>) -> Self {
        Self {
            binary_path,
            seek: seek.into(),
        }
    }

    /// Find `ffmpeg` in PATH
    pub fn from_path(seek: impl Into<String>) -> Option<Self> {
        which::which("ffmpeg").ok().map(|path| Self::new(path, seek))
    }

    /// Pick the thumbnail tool described by the configuration
    ///
    /// An explicit `ffmpeg_path` wins, then a PATH lookup if `search_path` is
    /// set. Falls back to [`NoOpThumbnailer`].
    pub fn from_config(tools: &ToolsConfig) -> Box<dyn ThumbnailTool> {
        if let Some(path) = &tools.ffmpeg_path {
            return Box::new(Self::new(path.clone(), tools.thumbnail_seek.clone()));
        }
        if tools.search_path {
            if let Some(tool) = Self::from_path(tools.thumbnail_seek.clone()) {
                debug!(path = %tool.binary_path.display(), "found ffmpeg");
                return Box::new(tool);
            }
        }
        warn!("ffmpeg not found, video thumbnails will not be generated");
        Box::new(NoOpThumbnailer)
    }

    /// Binary that will be executed
    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }
}

#[async_trait]
impl ThumbnailTool for FfmpegThumbnailer {
    async fn extract_frame(&self, video: &Path, thumbnail: &Path) -> Result<()> {
        let staging = staging_thumbnail_path(thumbnail);
        let result = match self.run(video, &staging).await {
            Ok(()) => tokio::fs::rename(&staging, thumbnail).await.map_err(Error::from),
            Err(e) => Err(e),
        };
        if result.is_err() {
            tokio::fs::remove_file(&staging).await.ok();
        }
        result
    }

    fn name(&self) -> &'static str {
        "ffmpeg"
    }
}

impl FfmpegThumbnailer {
    async fn run(&self, video: &Path, output_path: &Path) -> Result<()> {
        let output = Command::new(&self.binary_path)
            .arg("-y")
            .arg("-i")
            .arg(video)
            .arg("-ss")
            .arg(&self.seek)
            .arg("-vframes")
            .arg("1")
            .arg(output_path)
            .output()
            .await
            .map_err(|e| Error::ExternalTool(format!("failed to execute ffmpeg: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let last_line = stderr.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("");
            return Err(Error::ExternalTool(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                last_line.trim()
            )));
        }
        Ok(())
    }
}

/// Thumbnail tool used when no extractor is available
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpThumbnailer;

#[async_trait]
impl ThumbnailTool for NoOpThumbnailer {
    async fn extract_frame(&self, video: &Path, _thumbnail: &Path) -> Result<()> {
        Err(Error::ExternalTool(format!(
            "thumbnail missing for {}: no frame extractor available. \
             Configure tools.ffmpeg_path or ensure ffmpeg is in PATH.",
            video.display()
        )))
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}

/// What a thumbnail pass did
#[must_use]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ThumbnailReport {
    /// Thumbnails written in this pass
    pub generated: usize,
    /// Videos that already had a thumbnail
    pub existing: usize,
    /// Videos whose extraction failed
    pub failed: usize,
}

/// Thumbnail location for a media file stem
pub fn thumbnail_path(thumb_dir: &Path, stem: &str) -> PathBuf {
    thumb_dir.join(format!("{stem}.{THUMBNAIL_EXTENSION}"))
}

/// Hidden sibling ffmpeg writes into before the thumbnail is renamed in place
///
/// Keeps the image extension so ffmpeg still picks the right muxer.
fn staging_thumbnail_path(thumbnail: &Path) -> PathBuf {
    let stem = thumbnail
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    thumbnail.with_file_name(format!(".{stem}.part.{THUMBNAIL_EXTENSION}"))
}

/// Create a thumbnail for every video in the store that lacks one
///
/// Extraction failures are logged and counted, never returned. An error is
/// returned only if the store cannot be listed or the thumbnail directory
/// cannot be created.
pub async fn generate_thumbnails(
    store: &MediaStore,
    thumb_dir: &Path,
    tool: &dyn ThumbnailTool,
) -> Result<ThumbnailReport> {
    tokio::fs::create_dir_all(thumb_dir).await?;

    let mut report = ThumbnailReport::default();
    for asset in store.list().await? {
        if asset.kind != Some(MediaKind::Video) {
            continue;
        }
        let thumbnail = thumbnail_path(thumb_dir, &asset.stem);
        if tokio::fs::try_exists(&thumbnail).await.unwrap_or(false) {
            report.existing += 1;
            continue;
        }

        match tool.extract_frame(&asset.path, &thumbnail).await {
            Ok(()) => {
                debug!(
                    video = %asset.path.display(),
                    thumbnail = %thumbnail.display(),
                    "thumbnail created"
                );
                report.generated += 1;
            }
            Err(e) => {
                warn!(
                    video = %asset.path.display(),
                    tool = tool.name(),
                    error = %e,
                    "thumbnail failed"
                );
                report.failed += 1;
            }
        }
    }

    info!(
        generated = report.generated,
        existing = report.existing,
        failed = report.failed,
        "thumbnails done"
    );
    Ok(report)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Writes a marker file and remembers which videos it was asked about
    #[derive(Default)]
    struct RecordingTool {
        calls: Mutex<Vec<PathBuf>>,
        fail_on: Option<&'static str>,
    }

    #[async_trait]
    impl ThumbnailTool for RecordingTool {
        async fn extract_frame(&self, video: &Path, thumbnail: &Path) -> Result<()> {
            self.calls.lock().unwrap().push(video.to_path_buf());
            if let Some(stem) = self.fail_on {
                if video.file_stem().and_then(|s| s.to_str()) == Some(stem) {
                    return Err(Error::ExternalTool("corrupt video".into()));
                }
            }
            tokio::fs::write(thumbnail, b"frame").await?;
            Ok(())
        }

        fn name(&self) -> &'static str {
            "recording"
        }
    }

    #[tokio::test]
    async fn only_videos_without_thumbnails_are_processed() {
        let dir = tempfile::tempdir().unwrap();
        let media = dir.path().join("media");
        let thumbs = dir.path().join("thumbnails");
        std::fs::create_dir_all(&media).unwrap();
        std::fs::create_dir_all(&thumbs).unwrap();
        std::fs::write(media.join("20220101_000000.mp4"), b"v").unwrap();
        std::fs::write(media.join("20220102_000000.mov"), b"v").unwrap();
        std::fs::write(media.join("20220103_000000.jpg"), b"i").unwrap();
        std::fs::write(thumbs.join("20220102_000000.jpg"), b"old").unwrap();

        let tool = RecordingTool::default();
        let report = generate_thumbnails(&MediaStore::new(&media), &thumbs, &tool)
            .await
            .unwrap();

        assert_eq!(
            report,
            ThumbnailReport {
                generated: 1,
                existing: 1,
                failed: 0
            }
        );
        assert_eq!(
            *tool.calls.lock().unwrap(),
            vec![media.join("20220101_000000.mp4")]
        );
        assert!(thumbs.join("20220101_000000.jpg").exists());
        assert_eq!(std::fs::read(thumbs.join("20220102_000000.jpg")).unwrap(), b"old");
    }

    #[tokio::test]
    async fn failures_are_counted_not_returned() {
        let dir = tempfile::tempdir().unwrap();
        let media = dir.path().join("media");
        let thumbs = dir.path().join("thumbnails");
        std::fs::create_dir_all(&media).unwrap();
        std::fs::write(media.join("a.mp4"), b"v").unwrap();
        std::fs::write(media.join("b.mp4"), b"v").unwrap();

        let tool = RecordingTool {
            fail_on: Some("a"),
            ..Default::default()
        };
        let report = generate_thumbnails(&MediaStore::new(&media), &thumbs, &tool)
            .await
            .unwrap();

        assert_eq!(report.generated, 1);
        assert_eq!(report.failed, 1);
        assert!(!thumbs.join("a.jpg").exists());
        assert!(thumbs.join("b.jpg").exists());
    }

    #[tokio::test]
    async fn noop_tool_reports_every_video_as_failed() {
        let dir = tempfile::tempdir().unwrap();
        let media = dir.path().join("media");
        std::fs::create_dir_all(&media).unwrap();
        std::fs::write(media.join("a.mp4"), b"v").unwrap();

        let report = generate_thumbnails(
            &MediaStore::new(&media),
            &dir.path().join("thumbnails"),
            &NoOpThumbnailer,
        )
        .await
        .unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.generated, 0);
    }

    #[tokio::test]
    async fn missing_binary_is_an_external_tool_error() {
        let tool = FfmpegThumbnailer::new(
            PathBuf::from("/nonexistent/ffmpeg-binary-xyz"),
            "00:00:01",
        );
        let err = tool
            .extract_frame(Path::new("in.mp4"), Path::new("out.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ExternalTool(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_an_error() {
        let Ok(false_bin) = which::which("false") else {
            return;
        };
        let tool = FfmpegThumbnailer::new(false_bin, "00:00:01");
        let err = tool
            .extract_frame(Path::new("in.mp4"), Path::new("out.jpg"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("ffmpeg exited"), "{err}");
    }

    #[test]
    fn staging_path_is_hidden_sibling_with_image_extension() {
        let staging = staging_thumbnail_path(Path::new("/srv/thumbnails/20220101_000000.jpg"));
        assert_eq!(
            staging,
            PathBuf::from("/srv/thumbnails/.20220101_000000.part.jpg")
        );
    }

    #[cfg(unix)]
    fn fake_ffmpeg(dir: &Path, exit_code: i32) -> FfmpegThumbnailer {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.join(format!("ffmpeg-{exit_code}"));
        let body = format!(
            "#!/bin/sh\nfor last; do :; done\nprintf frame > \"$last\"\nexit {exit_code}\n"
        );
        std::fs::write(&script, body).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        FfmpegThumbnailer::new(script, "00:00:01")
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn frame_is_renamed_into_place_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let thumbnail = dir.path().join("clip.jpg");

        fake_ffmpeg(dir.path(), 0)
            .extract_frame(Path::new("clip.mp4"), &thumbnail)
            .await
            .unwrap();

        assert_eq!(std::fs::read(&thumbnail).unwrap(), b"frame");
        assert!(!staging_thumbnail_path(&thumbnail).exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failed_extraction_leaves_no_partial_thumbnail() {
        let dir = tempfile::tempdir().unwrap();
        let thumbnail = dir.path().join("clip.jpg");

        let err = fake_ffmpeg(dir.path(), 1)
            .extract_frame(Path::new("clip.mp4"), &thumbnail)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::ExternalTool(_)));
        assert!(!thumbnail.exists());
        assert!(!staging_thumbnail_path(&thumbnail).exists());
    }

    #[test]
    fn explicit_path_wins_over_lookup() {
        let tools = ToolsConfig {
            ffmpeg_path: Some(PathBuf::from("/opt/ffmpeg/bin/ffmpeg")),
            search_path: true,
            thumbnail_seek: "00:00:02".into(),
        };
        assert_eq!(FfmpegThumbnailer::from_config(&tools).name(), "ffmpeg");

        let tools = ToolsConfig {
            ffmpeg_path: None,
            search_path: false,
            ..Default::default()
        };
        assert_eq!(FfmpegThumbnailer::from_config(&tools).name(), "noop");
    }

    #[test]
    fn from_path_matches_which() {
        let found = which::which("ffmpeg").ok();
        let tool = FfmpegThumbnailer::from_path("00:00:01");
        assert_eq!(found, tool.map(|t| t.binary_path().to_path_buf()));
    }
}
