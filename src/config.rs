//! Configuration types for memories-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Filesystem layout of an archive run
///
/// Relative `media_dir`, `thumbnail_dir`, `ledger_path` and `gallery_path`
/// are resolved against `output_dir`; absolute paths are used as-is.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Exported manifest to read (default: "memories_history.json")
    #[serde(default = "default_manifest_path")]
    pub manifest_path: PathBuf,

    /// Root directory for everything the pipeline writes (default: ".")
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Media store directory (default: "media")
    #[serde(default = "default_media_dir")]
    pub media_dir: PathBuf,

    /// Video thumbnail directory (default: "thumbnails")
    #[serde(default = "default_thumbnail_dir")]
    pub thumbnail_dir: PathBuf,

    /// Failure ledger file (default: "failed.jsonl")
    #[serde(default = "default_ledger_path")]
    pub ledger_path: PathBuf,

    /// Generated gallery page (default: "memories_gallery.html")
    #[serde(default = "default_gallery_path")]
    pub gallery_path: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            manifest_path: default_manifest_path(),
            output_dir: default_output_dir(),
            media_dir: default_media_dir(),
            thumbnail_dir: default_thumbnail_dir(),
            ledger_path: default_ledger_path(),
            gallery_path: default_gallery_path(),
        }
    }
}

/// Network fetch behavior
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Maximum number of assets fetched at the same time (default: 4)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_fetches: usize,

    /// Timeout for a single request, including link resolution (default: 60 seconds)
    #[serde(default = "default_fetch_timeout", with = "duration_serde")]
    pub timeout: Duration,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// In full runs, do not re-fetch identifiers that already have a file (default: true)
    #[serde(default = "default_true")]
    pub skip_existing: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: default_max_concurrent(),
            timeout: default_fetch_timeout(),
            user_agent: default_user_agent(),
            skip_existing: true,
        }
    }
}

/// Retry configuration for transient failures
///
/// `max_attempts` is the total number of attempts for one asset within a run,
/// including the first one.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per asset (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between attempts (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// External tool configuration (ffmpeg)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Path to ffmpeg executable (auto-detected if None)
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Whether to search PATH for ffmpeg if no explicit path is set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,

    /// Offset into the video used for the thumbnail frame (default: "00:00:01")
    #[serde(default = "default_thumbnail_seek")]
    pub thumbnail_seek: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            search_path: true,
            thumbnail_seek: default_thumbnail_seek(),
        }
    }
}

/// Main configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Input and output locations
    #[serde(default)]
    pub paths: PathsConfig,

    /// Network fetch settings
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Retry policy for transient failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// External tool paths
    #[serde(default)]
    pub tools: ToolsConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing keys fall back to their defaults, so an empty file is valid.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read {}: {}", path.display(), e),
            key: None,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(|e| Error::Config {
            message: e.to_string(),
            key: None,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make a run hang or do nothing
    pub fn validate(&self) -> Result<()> {
        if self.fetch.max_concurrent_fetches == 0 {
            return Err(Error::Config {
                message: "max_concurrent_fetches must be at least 1".into(),
                key: Some("fetch.max_concurrent_fetches".into()),
            });
        }
        if self.fetch.timeout.is_zero() {
            return Err(Error::Config {
                message: "timeout must be greater than zero".into(),
                key: Some("fetch.timeout".into()),
            });
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::Config {
                message: "max_attempts must be at least 1".into(),
                key: Some("retry.max_attempts".into()),
            });
        }
        let multiplier = self.retry.backoff_multiplier;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(Error::Config {
                message: "backoff_multiplier must be a finite number >= 1.0".into(),
                key: Some("retry.backoff_multiplier".into()),
            });
        }
        Ok(())
    }

    /// Media store directory
    pub fn media_dir(&self) -> PathBuf {
        self.resolve(&self.paths.media_dir)
    }

    /// Thumbnail directory
    pub fn thumbnail_dir(&self) -> PathBuf {
        self.resolve(&self.paths.thumbnail_dir)
    }

    /// Failure ledger file
    pub fn ledger_path(&self) -> PathBuf {
        self.resolve(&self.paths.ledger_path)
    }

    /// Gallery page
    pub fn gallery_path(&self) -> PathBuf {
        self.resolve(&self.paths.gallery_path)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.paths.output_dir.join(path)
        }
    }
}

fn default_manifest_path() -> PathBuf {
    PathBuf::from("memories_history.json")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_media_dir() -> PathBuf {
    PathBuf::from("media")
}

fn default_thumbnail_dir() -> PathBuf {
    PathBuf::from("thumbnails")
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("failed.jsonl")
}

fn default_gallery_path() -> PathBuf {
    PathBuf::from("memories_gallery.html")
}

fn default_max_concurrent() -> usize {
    4
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_user_agent() -> String {
    "Mozilla/5.0".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_thumbnail_seek() -> String {
    "00:00:01".to_string()
}

// Durations are written as whole seconds
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
