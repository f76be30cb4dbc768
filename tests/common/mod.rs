//! Shared test doubles for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;

use weather_cache::cache::{CacheEntry, CacheKey, CacheStore, MemoryStore, PutOutcome};
use weather_cache::clock::{Clock, ManualClock};
use weather_cache::coordinator::{RefreshCoordinator, RefreshSettings};
use weather_cache::error::{CacheError, FetchError};
use weather_cache::limiter::RateLimiter;
use weather_cache::upstream::{Fetched, UpstreamFetcher};

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

pub fn key(raw: &str) -> CacheKey {
    CacheKey::normalize(raw).unwrap()
}

/// What the scripted fetcher does on its next call.
#[derive(Debug, Clone)]
pub enum Step {
    Succeed,
    /// Never answers within any test timeout
    Hang,
    Fail(String),
}

/// Fetcher that follows a script and records concurrency.
///
/// Once the script is exhausted every call succeeds. Successful payloads
/// carry the call number so callers can tell fetches apart.
pub struct ScriptedFetcher {
    clock: Arc<ManualClock>,
    delay: Duration,
    script: Mutex<VecDeque<Step>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            clock,
            delay: Duration::ZERO,
            script: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_script(self, steps: impl IntoIterator<Item = Step>) -> Self {
        self.script.lock().unwrap().extend(steps);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl UpstreamFetcher for ScriptedFetcher {
    async fn fetch(&self, key: &CacheKey) -> Result<Fetched, FetchError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _in_flight = InFlight(&self.in_flight);
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);

        let step = self.script.lock().unwrap().pop_front().unwrap_or(Step::Succeed);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match step {
            Step::Succeed => Ok(Fetched {
                payload: json!({ "location": key.as_str(), "call": call }),
                fetched_at: self.clock.now(),
            }),
            Step::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Err(FetchError::Timeout)
            }
            Step::Fail(msg) => Err(FetchError::Upstream(msg)),
        }
    }
}

/// Store whose reads and/or writes fail.
pub struct FailingStore {
    inner: MemoryStore,
    fail_reads: bool,
    fail_writes: bool,
}

impl FailingStore {
    pub fn new(fail_reads: bool, fail_writes: bool) -> Self {
        Self {
            inner: MemoryStore::new(),
            fail_reads,
            fail_writes,
        }
    }
}

#[async_trait]
impl CacheStore for FailingStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        if self.fail_reads {
            return Err(CacheError::Unavailable("read failure".to_string()));
        }
        self.inner.get(key).await
    }

    async fn put(&self, entry: CacheEntry) -> Result<PutOutcome, CacheError> {
        if self.fail_writes {
            return Err(CacheError::Unavailable("write failure".to_string()));
        }
        self.inner.put(entry).await
    }

    async fn invalidate(&self, key: &CacheKey) -> Result<bool, CacheError> {
        self.inner.invalidate(key).await
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, CacheError> {
        self.inner.purge_older_than(cutoff).await
    }

    async fn len(&self) -> Result<usize, CacheError> {
        self.inner.len().await
    }
}

/// Store whose first `lagging_reads` reads miss, as if they ran just before
/// another writer's put landed.
pub struct LaggingStore {
    inner: MemoryStore,
    lagging_reads: AtomicUsize,
}

impl LaggingStore {
    pub fn new(lagging_reads: usize) -> Self {
        Self {
            inner: MemoryStore::new(),
            lagging_reads: AtomicUsize::new(lagging_reads),
        }
    }
}

#[async_trait]
impl CacheStore for LaggingStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        let lagging = self
            .lagging_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if lagging {
            return Ok(None);
        }
        self.inner.get(key).await
    }

    async fn put(&self, entry: CacheEntry) -> Result<PutOutcome, CacheError> {
        self.inner.put(entry).await
    }

    async fn invalidate(&self, key: &CacheKey) -> Result<bool, CacheError> {
        self.inner.invalidate(key).await
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, CacheError> {
        self.inner.purge_older_than(cutoff).await
    }

    async fn len(&self) -> Result<usize, CacheError> {
        self.inner.len().await
    }
}

/// Settings with a short attempt bound and no backoff.
pub fn test_settings() -> RefreshSettings {
    RefreshSettings {
        ttl_seconds: 300,
        fetch_timeout: Duration::from_millis(500),
        max_retries: 2,
        retry_backoff: Duration::ZERO,
    }
}

/// Everything a coordinator test needs to drive and observe.
pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub store: Arc<dyn CacheStore>,
    pub fetcher: Arc<ScriptedFetcher>,
    pub coordinator: RefreshCoordinator,
}

pub struct HarnessBuilder {
    clock: Arc<ManualClock>,
    store: Arc<dyn CacheStore>,
    fetcher: Option<ScriptedFetcher>,
    rate_limit: usize,
    settings: RefreshSettings,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            clock: Arc::new(ManualClock::new(t0())),
            store: Arc::new(MemoryStore::new()),
            fetcher: None,
            rate_limit: 100,
            settings: test_settings(),
        }
    }

    pub fn clock(&self) -> Arc<ManualClock> {
        self.clock.clone()
    }

    pub fn store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.store = store;
        self
    }

    pub fn fetcher(mut self, fetcher: ScriptedFetcher) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn rate_limit(mut self, limit: usize) -> Self {
        self.rate_limit = limit;
        self
    }

    pub fn settings(mut self, settings: RefreshSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> Harness {
        let fetcher = Arc::new(
            self.fetcher
                .unwrap_or_else(|| ScriptedFetcher::new(self.clock.clone())),
        );
        let limiter = RateLimiter::new(self.rate_limit, 60_000, self.clock.clone());
        let coordinator = RefreshCoordinator::new(
            self.store.clone(),
            fetcher.clone(),
            limiter,
            self.clock.clone(),
            self.settings,
        );

        Harness {
            clock: self.clock,
            store: self.store,
            fetcher,
            coordinator,
        }
    }
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self::new()
    }
}
