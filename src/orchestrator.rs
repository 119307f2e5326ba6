//! Acquisition orchestrator
//!
//! Drives one run: loads the failure ledger, selects the records to attempt
//! (the whole manifest, or only what the ledger lists), fetches them through
//! a bounded worker pool, folds the outcomes into the working failure set and
//! rewrites the ledger once at the end.
//!
//! The ledger rewrite is the only persistence point. A run that dies before
//! it leaves the previous ledger in place, so a `FailedOnly` run can always
//! pick up where things stood (some assets may be fetched twice).

use crate::config::Config;
use crate::error::Result;
use crate::fetch::{FetchExecutor, FetchOutcome};
use crate::ledger::{FailureLedger, FailureSet, LedgerEntry};
use crate::manifest::load_manifest;
use crate::store::MediaStore;
use crate::types::{AcquisitionRecord, AssetId, RunMode};
use futures::StreamExt;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Counts reported at the end of a run
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Mode the run used
    pub mode: RunMode,
    /// Records selected for the run (after de-duplication)
    pub selected: usize,
    /// Assets written to the media store
    pub succeeded: usize,
    /// Assets already present and not fetched again
    pub skipped: usize,
    /// Assets that failed transiently and are kept in the ledger
    pub deferred: usize,
    /// Assets that failed permanently and were dropped
    pub dropped: usize,
    /// Ledger size after the run
    pub pending: usize,
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} run: {} selected, {} succeeded, {} skipped, {} deferred, {} dropped, {} pending",
            self.mode,
            self.selected,
            self.succeeded,
            self.skipped,
            self.deferred,
            self.dropped,
            self.pending
        )
    }
}

/// Fold one fetch outcome into the working failure set
///
/// Success and permanent failure remove the identifier, a transient failure
/// inserts or updates it. Because the fold is keyed by identifier, the final
/// set does not depend on the order outcomes arrive in.
pub fn fold_outcome(
    failures: &mut FailureSet,
    summary: &mut RunSummary,
    record: &AcquisitionRecord,
    outcome: &FetchOutcome,
) {
    match outcome {
        FetchOutcome::Success { .. } => {
            if failures.remove(&record.id).is_some() {
                debug!(asset_id = %record.id, "previously failed asset recovered");
            }
            summary.succeeded += 1;
        }
        FetchOutcome::Transient { reason } => {
            failures.upsert(LedgerEntry::from_failure(record, reason.clone()));
            summary.deferred += 1;
        }
        FetchOutcome::Permanent { reason } => {
            warn!(asset_id = %record.id, %reason, "dropping asset permanently");
            failures.remove(&record.id);
            summary.dropped += 1;
        }
    }
}

/// Collapse records sharing an identifier, keeping the last one
///
/// The surviving record takes the position of the first occurrence.
pub fn dedup_by_identifier(records: Vec<AcquisitionRecord>) -> Vec<AcquisitionRecord> {
    let mut positions: HashMap<AssetId, usize> = HashMap::new();
    let mut unique: Vec<AcquisitionRecord> = Vec::with_capacity(records.len());
    for record in records {
        match positions.get(&record.id) {
            Some(&index) => {
                debug!(asset_id = %record.id, "duplicate identifier, keeping the later record");
                unique[index] = record;
            }
            None => {
                positions.insert(record.id.clone(), unique.len());
                unique.push(record);
            }
        }
    }
    unique
}

/// Runs acquisition passes against one manifest, ledger and media store
#[derive(Clone, Debug)]
pub struct Orchestrator {
    manifest_path: PathBuf,
    ledger: FailureLedger,
    executor: FetchExecutor,
    max_concurrent: usize,
    skip_existing: bool,
}

impl Orchestrator {
    /// Assemble an orchestrator from its parts
    pub fn new(
        manifest_path: impl Into<PathBuf>,
        ledger: FailureLedger,
        executor: FetchExecutor,
        max_concurrent: usize,
        skip_existing: bool,
    ) -> Self {
        Self {
            manifest_path: manifest_path.into(),
            ledger,
            executor,
            max_concurrent: max_concurrent.max(1),
            skip_existing,
        }
    }

    /// Build everything from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let store = MediaStore::new(config.media_dir());
        let executor = FetchExecutor::new(store, &config.fetch, config.retry.clone())?;
        Ok(Self::new(
            config.paths.manifest_path.clone(),
            FailureLedger::new(config.ledger_path()),
            executor,
            config.fetch.max_concurrent_fetches,
            config.fetch.skip_existing,
        ))
    }

    /// The ledger this orchestrator maintains
    pub fn ledger(&self) -> &FailureLedger {
        &self.ledger
    }

    /// Execute one run
    ///
    /// Returns an error only if the ledger or manifest cannot be read, the
    /// media store cannot be created, or the final ledger rewrite fails.
    /// Per-asset failures are reported through the summary and the ledger.
    pub async fn run(&self, mode: RunMode) -> Result<RunSummary> {
        let mut failures = self.ledger.load().await?;

        let records = match mode {
            RunMode::Full => load_manifest(&self.manifest_path).await?,
            RunMode::FailedOnly => failures.iter().map(LedgerEntry::to_record).collect(),
        };
        let records = dedup_by_identifier(records);

        let store = self.executor.store();
        store.ensure_dir().await?;

        let mut summary = RunSummary {
            mode,
            selected: records.len(),
            ..Default::default()
        };

        let mut to_fetch = Vec::with_capacity(records.len());
        for record in records {
            if mode == RunMode::Full && self.skip_existing {
                if let Some(existing) = store.existing(&record.id).await {
                    debug!(asset_id = %record.id, path = %existing.display(), "already present");
                    failures.remove(&record.id);
                    summary.skipped += 1;
                    continue;
                }
            }
            to_fetch.push(record);
        }

        info!(
            %mode,
            selected = summary.selected,
            to_fetch = to_fetch.len(),
            skipped = summary.skipped,
            concurrency = self.max_concurrent,
            "starting acquisition"
        );

        let total = to_fetch.len();
        let executor = &self.executor;
        let outcomes: Vec<(AcquisitionRecord, FetchOutcome)> =
            futures::stream::iter(to_fetch.into_iter().enumerate())
                .map(|(index, record)| async move {
                    info!(asset_id = %record.id, "[{}/{}] {}", index + 1, total, record.kind);
                    let outcome = executor.fetch(&record).await;
                    (record, outcome)
                })
                .buffer_unordered(self.max_concurrent)
                .collect()
                .await;

        for (record, outcome) in &outcomes {
            fold_outcome(&mut failures, &mut summary, record, outcome);
        }

        self.ledger.rewrite(&failures).await?;
        summary.pending = failures.len();

        info!(
            succeeded = summary.succeeded,
            skipped = summary.skipped,
            deferred = summary.deferred,
            dropped = summary.dropped,
            pending = summary.pending,
            "acquisition finished"
        );
        Ok(summary)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Locator, MediaKind};
    use chrono::{TimeZone, Utc};

    fn record(id: &str) -> AcquisitionRecord {
        AcquisitionRecord {
            id: AssetId::new(id),
            kind: MediaKind::Image,
            captured_at: Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap(),
            locator: Locator::Direct(format!("https://example.com/{id}")),
        }
    }

    fn success(id: &str) -> FetchOutcome {
        FetchOutcome::Success {
            bytes: 1,
            path: PathBuf::from(format!("media/{id}.jpg")),
        }
    }

    fn transient() -> FetchOutcome {
        FetchOutcome::Transient {
            reason: "timeout".into(),
        }
    }

    fn permanent() -> FetchOutcome {
        FetchOutcome::Permanent {
            reason: "HTTP 404".into(),
        }
    }

    fn fold_all(
        initial: &FailureSet,
        outcomes: &[(AcquisitionRecord, FetchOutcome)],
    ) -> (Vec<AssetId>, RunSummary) {
        let mut failures = initial.clone();
        let mut summary = RunSummary::default();
        for (record, outcome) in outcomes {
            fold_outcome(&mut failures, &mut summary, record, outcome);
        }
        (failures.ids().cloned().collect(), summary)
    }

    #[test]
    fn success_clears_previous_failure() {
        let mut failures: FailureSet =
            std::iter::once(LedgerEntry::from_failure(&record("a"), "old")).collect();
        let mut summary = RunSummary::default();
        fold_outcome(&mut failures, &mut summary, &record("a"), &success("a"));
        assert!(failures.is_empty());
        assert_eq!(summary.succeeded, 1);
    }

    #[test]
    fn permanent_failure_is_dropped_even_if_pending() {
        let mut failures: FailureSet =
            std::iter::once(LedgerEntry::from_failure(&record("a"), "old")).collect();
        let mut summary = RunSummary::default();
        fold_outcome(&mut failures, &mut summary, &record("a"), &permanent());
        assert!(failures.is_empty());
        assert_eq!(summary.dropped, 1);
    }

    #[test]
    fn transient_failure_is_recorded() {
        let mut failures = FailureSet::new();
        let mut summary = RunSummary::default();
        fold_outcome(&mut failures, &mut summary, &record("a"), &transient());
        assert!(failures.contains(&AssetId::new("a")));
        assert_eq!(summary.deferred, 1);
    }

    #[test]
    fn fold_is_independent_of_completion_order() {
        let initial: FailureSet = [
            LedgerEntry::from_failure(&record("b"), "old"),
            LedgerEntry::from_failure(&record("z"), "untouched"),
        ]
        .into_iter()
        .collect();

        let outcomes = vec![
            (record("a"), transient()),
            (record("b"), success("b")),
            (record("c"), permanent()),
            (record("d"), transient()),
        ];

        let (expected_ids, expected_summary) = fold_all(&initial, &outcomes);
        assert_eq!(
            expected_ids,
            vec![AssetId::new("a"), AssetId::new("d"), AssetId::new("z")]
        );

        // Every permutation of four outcomes
        let mut indices = [0usize, 1, 2, 3];
        let mut permutations = 0;
        loop {
            let permuted: Vec<_> = indices.iter().map(|&i| outcomes[i].clone()).collect();
            let (ids, summary) = fold_all(&initial, &permuted);
            assert_eq!(ids, expected_ids, "order {indices:?}");
            assert_eq!(summary, expected_summary, "order {indices:?}");
            permutations += 1;
            if !next_permutation(&mut indices) {
                break;
            }
        }
        assert_eq!(permutations, 24);
    }

    fn next_permutation(values: &mut [usize]) -> bool {
        let Some(pivot) = (0..values.len().saturating_sub(1))
            .rev()
            .find(|&i| values[i] < values[i + 1])
        else {
            return false;
        };
        let successor = (pivot + 1..values.len())
            .rev()
            .find(|&j| values[j] > values[pivot])
            .unwrap();
        values.swap(pivot, successor);
        values[pivot + 1..].reverse();
        true
    }

    #[test]
    fn dedup_keeps_last_record_at_first_position() {
        let mut later_a = record("a");
        later_a.locator = Locator::Direct("https://example.com/a-v2".into());
        let unique = dedup_by_identifier(vec![record("a"), record("b"), later_a.clone()]);
        assert_eq!(unique, vec![later_a, record("b")]);
    }

    #[test]
    fn summary_display_lists_counts() {
        let summary = RunSummary {
            mode: RunMode::FailedOnly,
            selected: 3,
            succeeded: 1,
            skipped: 0,
            deferred: 1,
            dropped: 1,
            pending: 1,
        };
        assert_eq!(
            summary.to_string(),
            "failed-only run: 3 selected, 1 succeeded, 0 skipped, 1 deferred, 1 dropped, 1 pending"
        );
    }
}
