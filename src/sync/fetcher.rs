//! Retrying fetcher
//!
//! Wraps a [`RecordSource`] with the shared rate limiter and the retry
//! policy. Every attempt takes a limiter permit first.
//!
//! # Retry Logic
//!
//! | Outcome | Action |
//! |---------|--------|
//! | `NotFound` | Immediate, terminal |
//! | `RateLimited` | Sleep `Retry-After` (or the fallback) plus padding, retry without using an attempt |
//! | `Transient` | Retry after a fixed delay, up to `max_attempts` attempts |
//! | `Malformed` | Immediate, terminal |

use crate::config::SyncConfig;
use crate::storage::WorkItem;
use crate::sync::rate_limiter::RateLimiter;
use crate::sync::source::{RawRecord, RecordSource, MAX_RETRY_AFTER};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Classified result of a fetch
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome<T = RawRecord> {
    /// The payload was retrieved and validated
    Success(T),

    /// The item does not exist remotely
    NotFound,

    /// The service asked us to slow down
    RateLimited {
        /// Server-provided hint, if any
        retry_after: Option<Duration>,
    },

    /// Timeout, connection failure or unexpected status
    Transient { cause: String },

    /// The response decoded but failed validation
    Malformed { cause: String },
}

impl<T> FetchOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Short outcome name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::NotFound => "not-found",
            Self::RateLimited { .. } => "rate-limited",
            Self::Transient { .. } => "transient",
            Self::Malformed { .. } => "malformed",
        }
    }
}

/// Retry settings for one kind of request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub rate_limit_fallback: Duration,
    pub rate_limit_padding: Duration,
}

impl RetryPolicy {
    /// Policy for record requests
    pub fn for_records(config: &SyncConfig) -> Self {
        Self::with_attempts(config, config.request_retries)
    }

    /// Policy for asset downloads
    pub fn for_assets(config: &SyncConfig) -> Self {
        Self::with_attempts(config, config.download_retries)
    }

    fn with_attempts(config: &SyncConfig, attempts: u32) -> Self {
        Self {
            max_attempts: attempts.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            rate_limit_fallback: Duration::from_secs(config.rate_limit_fallback_secs),
            rate_limit_padding: Duration::from_millis(config.rate_limit_padding_ms),
        }
    }
}

/// Rate-limited, retrying access to a record source
pub struct RetryingFetcher {
    source: Arc<dyn RecordSource>,
    limiter: Arc<RateLimiter>,
    record_policy: RetryPolicy,
    asset_policy: RetryPolicy,
    cancel: CancellationToken,
    rate_limited_hits: AtomicU64,
}

impl RetryingFetcher {
    pub fn new(
        source: Arc<dyn RecordSource>,
        limiter: Arc<RateLimiter>,
        record_policy: RetryPolicy,
        asset_policy: RetryPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            limiter,
            record_policy,
            asset_policy,
            cancel,
            rate_limited_hits: AtomicU64::new(0),
        }
    }

    /// Builds a fetcher with both policies taken from the sync settings
    pub fn from_config(
        source: Arc<dyn RecordSource>,
        limiter: Arc<RateLimiter>,
        config: &SyncConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self::new(
            source,
            limiter,
            RetryPolicy::for_records(config),
            RetryPolicy::for_assets(config),
            cancel,
        )
    }

    /// Fetches the record of a work item
    pub async fn fetch_record(&self, item: &WorkItem) -> FetchOutcome<RawRecord> {
        let source = &self.source;
        self.run_with_retry(&self.record_policy, &item.query_key, || {
            source.fetch_record_once(item)
        })
        .await
    }

    /// Downloads an asset
    pub async fn fetch_asset(&self, asset_ref: &str) -> FetchOutcome<Vec<u8>> {
        let source = &self.source;
        self.run_with_retry(&self.asset_policy, asset_ref, || {
            source.fetch_asset_once(asset_ref)
        })
        .await
    }

    /// Number of 429 responses absorbed so far
    pub fn rate_limited_hits(&self) -> u64 {
        self.rate_limited_hits.load(Ordering::Relaxed)
    }

    async fn run_with_retry<T, F, Fut>(
        &self,
        policy: &RetryPolicy,
        what: &str,
        mut attempt: F,
    ) -> FetchOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = FetchOutcome<T>>,
    {
        let mut attempts = 0u32;

        loop {
            self.limiter.acquire().await;

            match attempt().await {
                FetchOutcome::RateLimited { retry_after } => {
                    self.rate_limited_hits.fetch_add(1, Ordering::Relaxed);
                    let wait = retry_after
                        .unwrap_or(policy.rate_limit_fallback)
                        .min(MAX_RETRY_AFTER)
                        .saturating_add(policy.rate_limit_padding);
                    tracing::warn!("Rate limited on {}, backing off {:?}", what, wait);

                    tokio::select! {
                        _ = self.cancel.cancelled() => {
                            return FetchOutcome::Transient {
                                cause: "cancelled while rate limited".to_string(),
                            };
                        }
                        _ = tokio::time::sleep(wait) => {}
                    }
                }

                FetchOutcome::Transient { cause } => {
                    attempts += 1;
                    if attempts >= policy.max_attempts {
                        tracing::warn!(
                            "Giving up on {} after {} attempts: {}",
                            what,
                            attempts,
                            cause
                        );
                        return FetchOutcome::Transient { cause };
                    }

                    tracing::warn!(
                        "Attempt {}/{} for {} failed: {}",
                        attempts,
                        policy.max_attempts,
                        what,
                        cause
                    );
                    tokio::select! {
                        _ = self.cancel.cancelled() => {
                            return FetchOutcome::Transient { cause };
                        }
                        _ = tokio::time::sleep(policy.retry_delay) => {}
                    }
                }

                other => return other,
            }
        }
    }
}
