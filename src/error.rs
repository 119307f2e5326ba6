//! Error types for memories-dl
//!
//! This module provides the error taxonomy for the acquisition pipeline:
//! - Per-entry manifest problems (recovered by skipping the entry)
//! - Fetch failures split into transient and permanent classes
//! - Ledger corruption (fatal to a run, prior ledger preserved)
//! - Storage write failures, classified by I/O error kind

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for memories-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for memories-dl
///
/// Only a few variants abort a run: an unreadable manifest, an unreadable or
/// corrupt ledger, and invalid configuration. Everything that concerns a single
/// asset is folded into a [`FetchOutcome`](crate::fetch::FetchOutcome) instead.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "fetch.max_concurrent_fetches")
        key: Option<String>,
    },

    /// The manifest document as a whole could not be read or understood
    #[error("manifest error: {0}")]
    Manifest(String),

    /// A single manifest entry is missing a field or carries a malformed one
    #[error("manifest entry error: {0}")]
    ManifestFormat(#[from] ManifestFormatError),

    /// The failure ledger exists but cannot be parsed
    #[error("ledger {path} is corrupt at line {line}: {reason}")]
    LedgerCorruption {
        /// Ledger file that failed to parse
        path: PathBuf,
        /// 1-based line number of the offending entry, 0 when the file as a
        /// whole is unreadable text
        line: usize,
        /// Parser message
        reason: String,
    },

    /// Fetching an asset failed
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Writing an asset into the media store failed
    #[error("failed to write {path}: {source}")]
    StorageWrite {
        /// Destination or staging path being written
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// External tool execution failed (ffmpeg)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// A manifest entry that cannot be turned into an acquisition record
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManifestFormatError {
    /// None of the accepted aliases for a required field are present
    #[error("entry {index} in {category:?} is missing {field}")]
    MissingField {
        /// Category (top-level key) the entry belongs to
        category: String,
        /// Position of the entry within its category
        index: usize,
        /// Logical field name ("capture time", "media kind", "locator")
        field: &'static str,
    },

    /// A field is present but its value cannot be interpreted
    #[error("entry {index} in {category:?} has malformed {field}: {value:?}")]
    Malformed {
        /// Category (top-level key) the entry belongs to
        category: String,
        /// Position of the entry within its category
        index: usize,
        /// Logical field name
        field: &'static str,
        /// Offending raw value
        value: String,
    },

    /// The entry is not a JSON object
    #[error("entry {index} in {category:?} is not an object")]
    NotAnObject {
        /// Category (top-level key) the entry belongs to
        category: String,
        /// Position of the entry within its category
        index: usize,
    },
}

/// Classified failure of a single fetch attempt
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Network, timeout, 5xx-class or recoverable storage failure
    #[error("transient failure: {0}")]
    Transient(String),

    /// 4xx-class, malformed locator or unrecoverable storage failure
    #[error("permanent failure: {0}")]
    Permanent(String),
}

impl FetchError {
    /// Classify an HTTP status that is not a success
    ///
    /// 408 (request timeout), 429 (rate limited) and every 5xx are transient;
    /// any other client or unexpected status is permanent.
    pub fn from_status(status: reqwest::StatusCode, url: &str) -> Self {
        let message = format!("HTTP {status} from {url}");
        if status == reqwest::StatusCode::REQUEST_TIMEOUT
            || status == reqwest::StatusCode::TOO_MANY_REQUESTS
            || status.is_server_error()
        {
            FetchError::Transient(message)
        } else {
            FetchError::Permanent(message)
        }
    }

    /// Classify a transport-level reqwest error
    ///
    /// Builder errors mean the request could never be sent (bad URL), everything
    /// else (connect, timeout, body read, redirect loops) is treated as transient.
    pub fn from_transport(err: &reqwest::Error, url: &str) -> Self {
        if err.is_builder() {
            FetchError::Permanent(format!("invalid request for {url}: {err}"))
        } else if err.is_timeout() {
            FetchError::Transient(format!("timeout fetching {url}"))
        } else if err.is_connect() {
            FetchError::Transient(format!("connection failed for {url}: {err}"))
        } else {
            FetchError::Transient(format!("failed to fetch {url}: {err}"))
        }
    }

    /// Classify a storage write failure by its I/O error kind
    ///
    /// A full disk, an interrupted write or a store directory removed while
    /// the run was active can succeed on a later run. Missing permissions or
    /// a read-only filesystem will not fix themselves.
    pub fn from_storage(err: &std::io::Error, path: &std::path::Path) -> Self {
        use std::io::ErrorKind;

        let message = format!("failed to write {}: {}", path.display(), err);
        match err.kind() {
            ErrorKind::StorageFull
            | ErrorKind::NotFound
            | ErrorKind::Interrupted
            | ErrorKind::WouldBlock
            | ErrorKind::TimedOut
            | ErrorKind::ResourceBusy => FetchError::Transient(message),
            _ => FetchError::Permanent(message),
        }
    }

    /// Human-readable reason without the classification prefix
    pub fn reason(&self) -> &str {
        match self {
            FetchError::Transient(reason) | FetchError::Permanent(reason) => reason,
        }
    }
}
