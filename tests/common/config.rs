//! Test configuration helpers

use memories_dl::{Config, Orchestrator, RetryConfig};
use std::time::Duration;
use tempfile::TempDir;

/// Per-request timeout used by tests that provoke timeouts
pub const TEST_TIMEOUT: Duration = Duration::from_millis(300);

/// An output directory plus a configuration pointing into it
pub struct TestArchive {
    /// Keeps the directory alive for the duration of the test
    pub dir: TempDir,
    /// Configuration rooted at `dir`
    pub config: Config,
}

impl TestArchive {
    /// Fresh archive with fast retries and a short request timeout
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mut config = Config::default();
        config.paths.output_dir = dir.path().to_path_buf();
        config.paths.manifest_path = dir.path().join("memories_history.json");
        config.fetch.timeout = TEST_TIMEOUT;
        config.fetch.max_concurrent_fetches = 4;
        config.retry = fast_retry();
        Self { dir, config }
    }

    /// Orchestrator built from the current configuration
    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::from_config(&self.config).expect("Failed to build orchestrator")
    }
}

/// Default attempt budget with millisecond delays
pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 5,
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        backoff_multiplier: 2.0,
        jitter: false,
    }
}
