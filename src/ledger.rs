//! Failure ledger
//!
//! The ledger is the durable list of assets that still need to be fetched.
//! It is stored as JSON Lines (one [`LedgerEntry`] per line) so it can be
//! inspected and edited by hand. It is only ever replaced as a whole, via a
//! staging file and a rename, so a crash mid-write leaves the previous ledger
//! readable.

use crate::error::{Error, Result};
use crate::types::{AcquisitionRecord, AssetId, Locator, MediaKind};
use crate::utils::write_atomic;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One pending asset, with enough context to fetch it without the manifest
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Asset identifier (ledger key)
    pub id: AssetId,
    /// Declared kind
    pub kind: MediaKind,
    /// Capture time
    pub captured_at: DateTime<Utc>,
    /// Where the bytes come from
    pub locator: Locator,
    /// Runs that ended with this asset deferred
    #[serde(default)]
    pub failed_runs: u32,
    /// Reason of the most recent failure
    #[serde(default)]
    pub last_error: Option<String>,
    /// When the most recent failure was recorded
    #[serde(default)]
    pub last_failed_at: Option<DateTime<Utc>>,
}

impl LedgerEntry {
    /// New entry for a record that just failed
    pub fn from_failure(record: &AcquisitionRecord, reason: impl Into<String>) -> Self {
        Self {
            id: record.id.clone(),
            kind: record.kind,
            captured_at: record.captured_at,
            locator: record.locator.clone(),
            failed_runs: 1,
            last_error: Some(reason.into()),
            last_failed_at: Some(Utc::now()),
        }
    }

    /// Rebuild the acquisition record this entry stands for
    pub fn to_record(&self) -> AcquisitionRecord {
        AcquisitionRecord {
            id: self.id.clone(),
            kind: self.kind,
            captured_at: self.captured_at,
            locator: self.locator.clone(),
        }
    }
}

/// Set of pending entries keyed by identifier
///
/// Iteration is ordered by identifier, so the persisted ledger does not
/// depend on the order in which failures were recorded.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FailureSet {
    entries: BTreeMap<AssetId, LedgerEntry>,
}

impl FailureSet {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry, or update the existing one for the same identifier
    ///
    /// An update keeps the latest record data and reason and bumps the
    /// failed-run counter.
    pub fn upsert(&mut self, entry: LedgerEntry) {
        match self.entries.get_mut(&entry.id) {
            Some(existing) => {
                existing.failed_runs =
                    existing.failed_runs.saturating_add(entry.failed_runs.max(1));
                existing.kind = entry.kind;
                existing.captured_at = entry.captured_at;
                existing.locator = entry.locator;
                existing.last_error = entry.last_error;
                existing.last_failed_at = entry.last_failed_at;
            }
            None => {
                self.entries.insert(entry.id.clone(), entry);
            }
        }
    }

    /// Remove an identifier, returning its entry if it was present
    pub fn remove(&mut self, id: &AssetId) -> Option<LedgerEntry> {
        self.entries.remove(id)
    }

    /// Whether an identifier is pending
    pub fn contains(&self, id: &AssetId) -> bool {
        self.entries.contains_key(id)
    }

    /// Entry for an identifier
    pub fn get(&self, id: &AssetId) -> Option<&LedgerEntry> {
        self.entries.get(id)
    }

    /// Number of pending identifiers
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is pending
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in identifier order
    pub fn iter(&self) -> impl Iterator<Item = &LedgerEntry> {
        self.entries.values()
    }

    /// Pending identifiers in order
    pub fn ids(&self) -> impl Iterator<Item = &AssetId> {
        self.entries.keys()
    }
}

impl FromIterator<LedgerEntry> for FailureSet {
    fn from_iter<I: IntoIterator<Item = LedgerEntry>>(iter: I) -> Self {
        let mut set = FailureSet::new();
        for entry in iter {
            set.entries.insert(entry.id.clone(), entry);
        }
        set
    }
}

/// Persistent failure ledger file
#[derive(Clone, Debug)]
pub struct FailureLedger {
    path: PathBuf,
}

impl FailureLedger {
    /// Ledger stored at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the ledger file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the ledger
    ///
    /// A missing file is an empty ledger. A line that does not parse is
    /// reported as [`Error::LedgerCorruption`] and the file is left alone, as
    /// is a file that is not valid UTF-8 (reported with line 0).
    /// If an identifier appears twice, the later line wins.
    pub async fn load(&self) -> Result<FailureSet> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no failure ledger yet");
                return Ok(FailureSet::new());
            }
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                return Err(Error::LedgerCorruption {
                    path: self.path.clone(),
                    line: 0,
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(Error::Io(e)),
        };

        let mut entries = Vec::new();
        for (index, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let entry: LedgerEntry =
                serde_json::from_str(line).map_err(|e| Error::LedgerCorruption {
                    path: self.path.clone(),
                    line: index + 1,
                    reason: e.to_string(),
                })?;
            entries.push(entry);
        }

        let set: FailureSet = entries.into_iter().collect();
        info!(path = %self.path.display(), pending = set.len(), "loaded failure ledger");
        Ok(set)
    }

    /// Replace the ledger contents with exactly `entries`
    ///
    /// An empty set removes the ledger file.
    pub async fn rewrite(&self, entries: &FailureSet) -> Result<()> {
        if entries.is_empty() {
            match tokio::fs::remove_file(&self.path).await {
                Ok(()) => info!(path = %self.path.display(), "failure ledger cleared"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(Error::Io(e)),
            }
            return Ok(());
        }

        let mut content = String::new();
        for entry in entries.iter() {
            content.push_str(&serde_json::to_string(entry)?);
            content.push('\n');
        }

        write_atomic(&self.path, content.as_bytes()).await?;
        info!(
            path = %self.path.display(),
            pending = entries.len(),
            "failure ledger written"
        );
        Ok(())
    }
}
