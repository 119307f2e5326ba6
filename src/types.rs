//! Core types for memories-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable identifier of an asset
///
/// Derived from the capture time (`YYYYMMDD_HHMMSS`) plus a `_n` suffix for
/// the n-th additional asset captured in the same second. It is also the
/// file stem of the asset in the media store.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(String);

impl AssetId {
    /// Wrap an already-derived identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive the identifier for the `sequence`-th asset captured at `captured_at`
    ///
    /// Sequence 0 has no suffix.
    pub fn derive(captured_at: DateTime<Utc>, sequence: usize) -> Self {
        let stamp = captured_at.format("%Y%m%d_%H%M%S");
        if sequence == 0 {
            Self(stamp.to_string())
        } else {
            Self(format!("{stamp}_{sequence}"))
        }
    }

    /// Identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AssetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Declared kind of an asset
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    /// Still image
    Image,
    /// Video clip
    Video,
}

impl MediaKind {
    /// Interpret a manifest "Media Type" marker
    pub fn from_marker(marker: &str) -> Option<Self> {
        let marker = marker.trim().to_ascii_lowercase();
        if marker.contains("video") {
            Some(MediaKind::Video)
        } else if marker.contains("image") || marker.contains("photo") || marker.contains("picture")
        {
            Some(MediaKind::Image)
        } else {
            None
        }
    }

    /// Extension used when neither the payload nor the headers say more
    pub fn default_extension(&self) -> &'static str {
        match self {
            MediaKind::Image => "jpg",
            MediaKind::Video => "mp4",
        }
    }

    /// Label shown in the gallery
    pub fn label(&self) -> &'static str {
        match self {
            MediaKind::Image => "Picture",
            MediaKind::Video => "Video",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Image => f.write_str("image"),
            MediaKind::Video => f.write_str("video"),
        }
    }
}

/// How to obtain the bytes of an asset
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "url", rename_all = "snake_case")]
pub enum Locator {
    /// The URL serves the payload directly
    Direct(String),
    /// The URL must be POSTed to first; the response body is the payload URL
    Resolve(String),
}

impl Locator {
    /// The URL carried by this locator
    pub fn url(&self) -> &str {
        match self {
            Locator::Direct(url) | Locator::Resolve(url) => url,
        }
    }
}

/// One manifest entry normalized into fetchable form
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquisitionRecord {
    /// Stable identifier, also the destination file stem
    pub id: AssetId,
    /// Declared kind
    pub kind: MediaKind,
    /// Capture time
    pub captured_at: DateTime<Utc>,
    /// Where the bytes come from
    pub locator: Locator,
}

/// Which records a run attempts
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RunMode {
    /// Every record in the manifest
    #[default]
    Full,
    /// Only records listed in the failure ledger
    FailedOnly,
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunMode::Full => f.write_str("full"),
            RunMode::FailedOnly => f.write_str("failed-only"),
        }
    }
}
