//! Inspection helpers for the media store and ledger

use memories_dl::{Config, FailureLedger};
use std::collections::BTreeSet;

/// Every file name in the media store, hidden staging files included
pub fn media_files(config: &Config) -> BTreeSet<String> {
    match std::fs::read_dir(config.media_dir()) {
        Ok(entries) => entries
            .map(|e| {
                e.expect("Failed to read dir entry")
                    .file_name()
                    .to_string_lossy()
                    .into_owned()
            })
            .collect(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeSet::new(),
        Err(e) => panic!("Failed to list media dir: {e}"),
    }
}

/// Identifiers currently recorded in the failure ledger
pub async fn ledger_ids(config: &Config) -> Vec<String> {
    FailureLedger::new(config.ledger_path())
        .load()
        .await
        .expect("Failed to load ledger")
        .ids()
        .map(|id| id.as_str().to_string())
        .collect()
}

/// Build a sorted set of names from string literals
pub fn names(list: &[&str]) -> BTreeSet<String> {
    list.iter().map(|s| s.to_string()).collect()
}
