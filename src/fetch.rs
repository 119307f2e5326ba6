//! Fetch executor
//!
//! Retrieves one asset with bounded retry and classifies the result as a
//! [`FetchOutcome`]. The executor keeps no state between calls; everything it
//! writes goes through the [`MediaStore`] staging-then-rename path.

use crate::config::{FetchConfig, RetryConfig};
use crate::error::{Error, FetchError, Result};
use crate::retry::with_retry;
use crate::sniff::{SNIFF_LEN, classify_extension};
use crate::store::MediaStore;
use crate::types::{AcquisitionRecord, Locator};
use reqwest::header::CONTENT_TYPE;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use url::Url;

/// Terminal result of fetching one asset
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The asset was written to the media store
    Success {
        /// Payload size
        bytes: u64,
        /// Final location in the media store
        path: PathBuf,
    },
    /// Every attempt failed with a retryable error; try again on a later run
    Transient {
        /// Last failure reason
        reason: String,
    },
    /// The asset cannot be fetched; do not try again
    Permanent {
        /// Failure reason
        reason: String,
    },
}

impl FetchOutcome {
    /// Whether the asset is now in the media store
    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Success { .. })
    }
}

impl From<std::result::Result<(u64, PathBuf), FetchError>> for FetchOutcome {
    fn from(result: std::result::Result<(u64, PathBuf), FetchError>) -> Self {
        match result {
            Ok((bytes, path)) => FetchOutcome::Success { bytes, path },
            Err(FetchError::Transient(reason)) => FetchOutcome::Transient { reason },
            Err(FetchError::Permanent(reason)) => FetchOutcome::Permanent { reason },
        }
    }
}

/// Downloads assets into a media store
#[derive(Clone, Debug)]
pub struct FetchExecutor {
    client: reqwest::Client,
    store: MediaStore,
    retry: RetryConfig,
}

impl FetchExecutor {
    /// Build an executor with its own HTTP client
    ///
    /// Every request carries `fetch.timeout` and `fetch.user_agent`.
    pub fn new(store: MediaStore, fetch: &FetchConfig, retry: RetryConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(fetch.timeout)
            .user_agent(fetch.user_agent.clone())
            .build()
            .map_err(|e| Error::Config {
                message: format!("failed to create HTTP client: {e}"),
                key: Some("fetch".into()),
            })?;
        Ok(Self::with_client(client, store, retry))
    }

    /// Build an executor around an existing client
    pub fn with_client(client: reqwest::Client, store: MediaStore, retry: RetryConfig) -> Self {
        Self {
            client,
            store,
            retry,
        }
    }

    /// Media store this executor writes to
    pub fn store(&self) -> &MediaStore {
        &self.store
    }

    /// Fetch one asset, retrying transient failures up to the configured budget
    pub async fn fetch(&self, record: &AcquisitionRecord) -> FetchOutcome {
        self.fetch_with_attempts(record, self.retry.max_attempts).await
    }

    /// Fetch one asset with an explicit attempt budget
    ///
    /// The delay schedule still comes from the executor's retry policy.
    pub async fn fetch_with_attempts(
        &self,
        record: &AcquisitionRecord,
        max_attempts: u32,
    ) -> FetchOutcome {
        let policy = RetryConfig {
            max_attempts,
            ..self.retry.clone()
        };
        let result = with_retry(&policy, |attempt| async move {
            debug!(asset_id = %record.id, attempt, "fetching");
            self.attempt(record).await
        })
        .await;

        let outcome = FetchOutcome::from(result);
        match &outcome {
            FetchOutcome::Success { bytes, path } => {
                info!(asset_id = %record.id, bytes, path = %path.display(), "fetched");
            }
            FetchOutcome::Transient { reason } => {
                warn!(asset_id = %record.id, %reason, "deferring asset to a later run");
            }
            FetchOutcome::Permanent { reason } => {
                warn!(asset_id = %record.id, %reason, "asset cannot be fetched");
            }
        }
        outcome
    }

    /// One attempt: resolve, download to staging, commit
    async fn attempt(
        &self,
        record: &AcquisitionRecord,
    ) -> std::result::Result<(u64, PathBuf), FetchError> {
        let url = self.resolve(&record.locator).await?;

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| FetchError::from_transport(&e, url.as_str()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::from_status(status, url.as_str()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let staging = self.store.staging_path(&record.id);
        let (bytes, head) = match stream_to_file(response, &staging, url.as_str()).await {
            Ok(written) => written,
            Err(e) => {
                tokio::fs::remove_file(&staging).await.ok();
                return Err(e);
            }
        };

        if bytes == 0 {
            tokio::fs::remove_file(&staging).await.ok();
            return Err(FetchError::Transient(format!("empty payload from {url}")));
        }

        let extension = classify_extension(record.kind, content_type.as_deref(), &head);
        let path = match self.store.commit(&staging, &record.id, extension).await {
            Ok(path) => path,
            Err(e) => {
                tokio::fs::remove_file(&staging).await.ok();
                return Err(FetchError::from_storage(
                    &e,
                    &self.store.destination(&record.id, extension),
                ));
            }
        };

        Ok((bytes, path))
    }

    /// Turn a locator into the URL that serves the payload
    ///
    /// A locator that is not an http(s) URL is a permanent failure. Failures of
    /// the resolution request itself are transient, whatever the status code.
    async fn resolve(&self, locator: &Locator) -> std::result::Result<Url, FetchError> {
        let url = parse_http_url(locator.url())?;
        match locator {
            Locator::Direct(_) => Ok(url),
            Locator::Resolve(_) => self.resolve_link(url).await,
        }
    }

    /// POST the link's query to its base URL; the response body is the payload URL
    async fn resolve_link(&self, link: Url) -> std::result::Result<Url, FetchError> {
        let body = link.query().unwrap_or_default().to_string();
        let mut endpoint = link.clone();
        endpoint.set_query(None);

        let response = self
            .client
            .post(endpoint)
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body(body)
            .send()
            .await
            .map_err(|e| {
                FetchError::Transient(
                    FetchError::from_transport(&e, link.as_str())
                        .reason()
                        .to_string(),
                )
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Transient(format!(
                "link resolution returned HTTP {status} for {link}"
            )));
        }

        let text = response
            .text()
            .await
            .map_err(|e| FetchError::Transient(format!("failed to read resolved link: {e}")))?;
        let resolved = text.trim();
        let url = Url::parse(resolved).map_err(|_| {
            FetchError::Transient(format!("link resolution did not return a URL for {link}"))
        })?;
        debug!(link = %link, resolved = %url, "resolved download link");
        Ok(url)
    }
}

fn parse_http_url(raw: &str) -> std::result::Result<Url, FetchError> {
    let url = Url::parse(raw)
        .map_err(|e| FetchError::Permanent(format!("malformed locator {raw:?}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(FetchError::Permanent(format!(
            "unsupported locator scheme {other:?} in {raw:?}"
        ))),
    }
}

/// Stream a response body into `path`, returning its size and leading bytes
async fn stream_to_file(
    mut response: reqwest::Response,
    path: &Path,
    url: &str,
) -> std::result::Result<(u64, Vec<u8>), FetchError> {
    let storage = |e: std::io::Error| FetchError::from_storage(&e, path);

    let mut file = tokio::fs::File::create(path).await.map_err(storage)?;
    let mut head = Vec::with_capacity(SNIFF_LEN);
    let mut bytes = 0u64;

    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| FetchError::from_transport(&e, url))?
    {
        if head.len() < SNIFF_LEN {
            let take = (SNIFF_LEN - head.len()).min(chunk.len());
            head.extend_from_slice(&chunk[..take]);
        }
        file.write_all(&chunk).await.map_err(storage)?;
        bytes += chunk.len() as u64;
    }

    file.flush().await.map_err(storage)?;
    file.sync_all().await.map_err(storage)?;
    Ok((bytes, head))
}
