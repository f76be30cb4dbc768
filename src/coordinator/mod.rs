//! Refresh Coordinator Module
//!
//! Decides for every read whether to serve the cached entry, answer "not
//! modified", or fetch from upstream, and makes sure concurrent readers of
//! one key share a single upstream fetch.

mod claims;
mod decision;
mod outcome;
mod stats;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::cache::{CacheEntry, CacheKey, CacheStore, PutOutcome};
use crate::clock::Clock;
use crate::config::Config;
use crate::error::{FetchError, Result};
use crate::limiter::RateLimiter;
use crate::upstream::{Fetched, UpstreamFetcher};

pub use claims::{Claim, ClaimGuard, ClaimRegistry, ClaimResult, ClaimWaiter};
pub use decision::{decide, Decision, RequestMode};
pub use outcome::{ReadOutcome, ReadStatus};
pub use stats::{CoordinatorStats, StatsSnapshot};

// == Refresh Settings ==
/// Tuning of the fetch path.
#[derive(Debug, Clone)]
pub struct RefreshSettings {
    /// Lifetime given to every stored entry
    pub ttl_seconds: u64,
    /// Bound on a single upstream attempt
    pub fetch_timeout: Duration,
    /// Extra attempts after a timeout
    pub max_retries: u32,
    /// Delay before the first retry, doubled on each further retry
    pub retry_backoff: Duration,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for RefreshSettings {
    fn from(config: &Config) -> Self {
        Self {
            ttl_seconds: config.ttl_seconds,
            fetch_timeout: Duration::from_millis(config.fetch_timeout_ms),
            max_retries: config.max_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }
}

// == Refresh Coordinator ==
/// Cheap to clone; clones share the store, limiter and claim registry.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn CacheStore>,
    fetcher: Arc<dyn UpstreamFetcher>,
    limiter: RateLimiter,
    clock: Arc<dyn Clock>,
    claims: ClaimRegistry,
    settings: RefreshSettings,
    stats: CoordinatorStats,
}

impl RefreshCoordinator {
    // == Constructor ==
    pub fn new(
        store: Arc<dyn CacheStore>,
        fetcher: Arc<dyn UpstreamFetcher>,
        limiter: RateLimiter,
        clock: Arc<dyn Clock>,
        settings: RefreshSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                fetcher,
                limiter,
                clock,
                claims: ClaimRegistry::new(),
                settings,
                stats: CoordinatorStats::new(),
            }),
        }
    }

    /// Wires a coordinator from configuration, building the rate limiter.
    pub fn from_config(
        config: &Config,
        store: Arc<dyn CacheStore>,
        fetcher: Arc<dyn UpstreamFetcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let limiter = RateLimiter::new(
            config.rate_limit_per_key,
            config.rate_limit_window_ms,
            clock.clone(),
        );
        Self::new(store, fetcher, limiter, clock, RefreshSettings::from(config))
    }

    // == Read ==
    /// Answers a read for `key` on behalf of `caller`.
    ///
    /// Always returns a definite outcome; `ReadStatus::Error` only when no
    /// usable entry exists and no fresh one could be fetched.
    pub async fn read(&self, key: &CacheKey, mode: RequestMode, caller: &str) -> ReadOutcome {
        let mode = mode.normalized();
        let cached = self.inner.load(key).await;
        let now = self.inner.clock.now();

        match decide(mode, cached, now) {
            Decision::ServeCached(entry) => {
                debug!("Cache hit for {}", key);
                self.inner.stats.record_hit();
                ReadOutcome::fresh(entry)
            }
            Decision::NotModified(entry) => {
                debug!("Not modified for {} since {:?}", key, mode.watermark());
                self.inner.stats.record_not_modified();
                ReadOutcome::not_modified(entry.fetched_at)
            }
            Decision::Fetch(prior) => {
                self.inner.stats.record_miss();
                self.fetch_and_store(key, mode, caller, prior).await
            }
        }
    }

    async fn fetch_and_store(
        &self,
        key: &CacheKey,
        mode: RequestMode,
        caller: &str,
        prior: Option<CacheEntry>,
    ) -> ReadOutcome {
        let waiter = match self.inner.claims.claim(key) {
            Claim::Leader(guard, waiter) => {
                info!("Fetching {} for {} ({:?})", key, caller, mode);
                let inner = self.inner.clone();
                let key = key.clone();
                let caller = caller.to_string();
                let forced = mode == RequestMode::Forced;
                // Runs detached: a caller that goes away never cancels the shared fetch.
                tokio::spawn(async move {
                    let result = inner.refresh(&key, &caller, forced).await;
                    guard.complete(result);
                });
                waiter
            }
            Claim::Attached(waiter) => {
                debug!("Attached to in-flight fetch for {}", key);
                self.inner.stats.record_coalesced();
                waiter
            }
        };

        match waiter.wait().await {
            Ok(entry) => self.inner.answer_fetched(mode, entry),
            Err(err) => self.inner.fall_back(key, prior, err).await,
        }
    }

    // == Invalidate ==
    /// Removes the stored entry for `key`. Returns whether one existed.
    pub async fn invalidate(&self, key: &CacheKey) -> Result<bool> {
        let removed = self.inner.store.invalidate(key).await?;
        if removed {
            info!("Invalidated {}", key);
        }
        Ok(removed)
    }

    // == Maintenance ==
    /// Drops entries fetched more than `retention` ago and idle limiter buckets.
    ///
    /// Returns `(entries_removed, buckets_removed)`.
    pub async fn purge(&self, retention: chrono::Duration) -> Result<(usize, usize)> {
        let cutoff = self
            .inner
            .clock
            .now()
            .checked_sub_signed(retention)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let entries = self.inner.store.purge_older_than(cutoff).await?;
        let buckets = self.inner.limiter.prune_idle();
        Ok((entries, buckets))
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Number of stored entries, `None` if the store cannot be read.
    pub async fn entry_count(&self) -> Option<usize> {
        self.inner.store.len().await.ok()
    }

    /// Number of upstream fetches currently in flight.
    pub fn in_flight(&self) -> usize {
        self.inner.claims.in_flight()
    }
}

impl Inner {
    /// Store read; a failing store counts as an absent entry.
    async fn load(&self, key: &CacheKey) -> Option<CacheEntry> {
        match self.store.get(key).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Cache read failed for {}, treating as absent: {}", key, e);
                None
            }
        }
    }

    /// Leader path: rate limit, fetch with retries, publish to the store.
    async fn refresh(&self, key: &CacheKey, caller: &str, forced: bool) -> ClaimResult {
        // A claim released between this caller's store read and its claim
        // may already have stored a fresh entry.
        if !forced {
            if let Some(entry) = self.load(key).await {
                if entry.is_fresh(self.clock.now()) {
                    debug!("Fresh entry appeared for {}, skipping fetch", key);
                    return Ok(entry);
                }
            }
        }

        if !self.limiter.allow(key, caller) {
            self.stats.record_rate_limited();
            return Err(FetchError::RateLimited);
        }

        let fetched = self.fetch_with_retries(key).await?;
        self.stats.record_fetch();

        let entry = CacheEntry::new(
            key.clone(),
            fetched.payload,
            fetched.fetched_at,
            self.settings.ttl_seconds,
        );

        match self.store.put(entry.clone()).await {
            Ok(PutOutcome::Stored) => Ok(entry),
            Ok(PutOutcome::Rejected) => {
                debug!("Newer entry already stored for {}", key);
                match self.store.get(key).await {
                    Ok(Some(newer)) => Ok(newer),
                    _ => Ok(entry),
                }
            }
            Err(e) => {
                // Best effort: the caller still gets the data it waited for.
                warn!("Cache write failed for {}: {}", key, e);
                Ok(entry)
            }
        }
    }

    async fn fetch_with_retries(&self, key: &CacheKey) -> std::result::Result<Fetched, FetchError> {
        let mut backoff = self.settings.retry_backoff;

        for attempt in 0..=self.settings.max_retries {
            let result =
                tokio::time::timeout(self.settings.fetch_timeout, self.fetcher.fetch(key)).await;

            match result {
                Ok(Ok(fetched)) => return Ok(fetched),
                Ok(Err(FetchError::Timeout)) | Err(_) => {
                    warn!(
                        "Upstream timeout for {} (attempt {}/{})",
                        key,
                        attempt + 1,
                        self.settings.max_retries + 1
                    );
                    if attempt < self.settings.max_retries && !backoff.is_zero() {
                        tokio::time::sleep(backoff).await;
                        backoff = backoff.saturating_mul(2);
                    }
                }
                Ok(Err(err)) => {
                    warn!("Upstream error for {}: {}", key, err);
                    return Err(err);
                }
            }
        }

        Err(FetchError::Timeout)
    }

    /// Re-evaluates a shared fetch result against this caller's mode.
    fn answer_fetched(&self, mode: RequestMode, entry: CacheEntry) -> ReadOutcome {
        match mode.watermark() {
            Some(watermark) if entry.fetched_at <= watermark && entry.is_fresh(self.clock.now()) => {
                self.stats.record_not_modified();
                ReadOutcome::not_modified(entry.fetched_at)
            }
            _ => ReadOutcome::fresh(entry),
        }
    }

    async fn fall_back(
        &self,
        key: &CacheKey,
        prior: Option<CacheEntry>,
        err: FetchError,
    ) -> ReadOutcome {
        // Another writer may have filled the key while this read was waiting.
        let prior = match prior {
            Some(entry) => Some(entry),
            None => self.load(key).await,
        };

        match prior {
            Some(entry) => {
                info!("Serving stale {} after fetch failure: {}", key, err);
                self.stats.record_stale_fallback();
                ReadOutcome::stale(entry)
            }
            None => {
                warn!("No data for {}: {}", key, err);
                self.stats.record_error();
                ReadOutcome::error(err.kind())
            }
        }
    }
}
