//! # memories-dl
//!
//! Resumable downloader for exported photo/video memories archives.
//!
//! A run reads the export manifest, fetches every asset into a media store
//! with bounded concurrency and retries, and records whatever failed
//! transiently in a failure ledger. A later run in
//! [`RunMode::FailedOnly`] retries exactly those assets. Permanent failures
//! (404 and friends) are logged and dropped.
//!
//! Two downstream stages work on the media store: video thumbnails through
//! `ffmpeg`, and a static HTML gallery grouped by year and month.
//!
//! ## Quick Start
//!
//! ```no_run
//! use memories_dl::{Config, Orchestrator, RunMode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let orchestrator = Orchestrator::from_config(&config)?;
//!
//!     let summary = orchestrator.run(RunMode::Full).await?;
//!     println!("{summary}");
//!
//!     if summary.pending > 0 {
//!         let retry = orchestrator.run(RunMode::FailedOnly).await?;
//!         println!("{retry}");
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Asset fetching with retry and atomic placement
pub mod fetch;
/// Static HTML gallery
pub mod gallery;
/// Persistent record of transiently failed assets
pub mod ledger;
/// Export manifest parsing
pub mod manifest;
/// Run orchestration
pub mod orchestrator;
/// Retry logic with exponential backoff
pub mod retry;
/// Payload type detection
pub mod sniff;
/// On-disk media store
pub mod store;
/// Video thumbnail generation
pub mod thumbnail;
/// Core types
pub mod types;
/// Utility functions
pub mod utils;

pub use config::{Config, FetchConfig, PathsConfig, RetryConfig, ToolsConfig};
pub use error::{Error, FetchError, ManifestFormatError, Result};
pub use fetch::{FetchExecutor, FetchOutcome};
pub use gallery::{GalleryItem, render_gallery, scan_media, write_gallery};
pub use ledger::{FailureLedger, FailureSet, LedgerEntry};
pub use manifest::{load_manifest, parse_manifest};
pub use orchestrator::{Orchestrator, RunSummary, fold_outcome};
pub use retry::{IsRetryable, with_retry};
pub use sniff::classify_extension;
pub use store::MediaStore;
pub use thumbnail::{
    FfmpegThumbnailer, NoOpThumbnailer, ThumbnailReport, ThumbnailTool, generate_thumbnails,
};
pub use types::{AcquisitionRecord, AssetId, Locator, MediaKind, RunMode};
