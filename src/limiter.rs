//! Rate Limiter Module
//!
//! Caps upstream fetches per (location, caller) with a keyed GCRA limiter.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use governor::middleware::NoOpMiddleware;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter as GovLimiter};
use tracing::debug;

use crate::cache::CacheKey;
use crate::clock::Clock;

type BucketKey = (CacheKey, String);
type KeyedLimiter =
    GovLimiter<BucketKey, DefaultKeyedStateStore<BucketKey>, LimiterClock, NoOpMiddleware<Instant>>;

// == Clock Adapter ==
/// Presents the injected wall clock to governor as a monotonic instant.
///
/// Time before the limiter was created reads as its creation instant.
#[derive(Clone)]
struct LimiterClock {
    clock: Arc<dyn Clock>,
    origin: DateTime<Utc>,
    base: Instant,
}

impl LimiterClock {
    fn new(clock: Arc<dyn Clock>) -> Self {
        let origin = clock.now();
        Self {
            clock,
            origin,
            base: Instant::now(),
        }
    }
}

impl governor::clock::Clock for LimiterClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        let elapsed = (self.clock.now() - self.origin)
            .to_std()
            .unwrap_or(Duration::ZERO);
        self.base + elapsed
    }
}

// == Rate Limiter ==
/// Non-blocking limiter consulted before every upstream fetch.
///
/// Each bucket allows a burst of `limit` fetches and regains one every
/// `window / limit`. Exhaustion is reported as `false`, never as an error.
pub struct RateLimiter {
    /// `None` when the limit is zero: every fetch is refused
    limiter: Option<KeyedLimiter>,
}

impl RateLimiter {
    /// Creates a limiter allowing `limit` fetches per `window_ms` per bucket.
    ///
    /// A limit of zero refuses every fetch. A window too short to divide
    /// among `limit` fetches leaves fetches unlimited.
    pub fn new(limit: usize, window_ms: u64, clock: Arc<dyn Clock>) -> Self {
        let limiter = NonZeroU32::new(u32::try_from(limit).unwrap_or(u32::MAX)).map(|burst| {
            let period = Duration::from_millis(window_ms) / burst.get();
            let quota = Quota::with_period(period)
                .map(|quota| quota.allow_burst(burst))
                .unwrap_or_else(|| Quota::per_second(NonZeroU32::MAX));
            KeyedLimiter::dashmap_with_clock(quota, &LimiterClock::new(clock))
        });

        Self { limiter }
    }

    // == Allow ==
    /// Takes a fetch slot from the bucket if one is free; returns immediately.
    pub fn allow(&self, key: &CacheKey, caller: &str) -> bool {
        let allowed = match &self.limiter {
            Some(limiter) => limiter
                .check_key(&(key.clone(), caller.to_string()))
                .is_ok(),
            None => false,
        };

        if !allowed {
            debug!("Rate limit reached for {} (caller {})", key, caller);
        }
        allowed
    }

    // == Prune ==
    /// Drops buckets that have fully refilled.
    ///
    /// Returns the number of buckets removed.
    pub fn prune_idle(&self) -> usize {
        let Some(limiter) = &self.limiter else {
            return 0;
        };
        let before = limiter.len();
        limiter.retain_recent();
        limiter.shrink_to_fit();
        before.saturating_sub(limiter.len())
    }

    /// Number of tracked buckets.
    pub fn bucket_count(&self) -> usize {
        self.limiter.as_ref().map_or(0, |limiter| limiter.len())
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{Duration, TimeZone};

    fn setup(limit: usize, window_ms: u64) -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
        ));
        (RateLimiter::new(limit, window_ms, clock.clone()), clock)
    }

    fn key(raw: &str) -> CacheKey {
        CacheKey::normalize(raw).unwrap()
    }

    #[test]
    fn test_allows_up_to_limit() {
        let (limiter, _) = setup(2, 60_000);

        assert!(limiter.allow(&key("paris"), "alice"));
        assert!(limiter.allow(&key("paris"), "alice"));
        assert!(!limiter.allow(&key("paris"), "alice"));
    }

    #[test]
    fn test_buckets_are_per_key_and_caller() {
        let (limiter, _) = setup(1, 60_000);

        assert!(limiter.allow(&key("paris"), "alice"));
        assert!(limiter.allow(&key("paris"), "bob"));
        assert!(limiter.allow(&key("berlin"), "alice"));
        assert!(!limiter.allow(&key("paris"), "alice"));
    }

    #[test]
    fn test_window_slides() {
        let (limiter, clock) = setup(1, 1_000);

        assert!(limiter.allow(&key("paris"), "alice"));
        clock.advance(Duration::milliseconds(999));
        assert!(!limiter.allow(&key("paris"), "alice"));
        clock.advance(Duration::milliseconds(1));
        assert!(limiter.allow(&key("paris"), "alice"));
    }

    #[test]
    fn test_zero_limit_refuses() {
        let (limiter, _) = setup(0, 1_000);
        assert!(!limiter.allow(&key("paris"), "alice"));
    }

    #[test]
    fn test_budget_refills_gradually() {
        let (limiter, clock) = setup(3, 3_000);

        for _ in 0..3 {
            assert!(limiter.allow(&key("paris"), "alice"));
        }
        assert!(!limiter.allow(&key("paris"), "alice"));

        // One slot comes back every window / limit.
        clock.advance(Duration::milliseconds(1_000));
        assert!(limiter.allow(&key("paris"), "alice"));
        assert!(!limiter.allow(&key("paris"), "alice"));
    }

    #[test]
    fn test_clock_set_back_does_not_refill() {
        let (limiter, clock) = setup(1, 1_000);

        assert!(limiter.allow(&key("paris"), "alice"));
        clock.advance(Duration::milliseconds(-5_000));
        assert!(!limiter.allow(&key("paris"), "alice"));
    }

    #[test]
    fn test_prune_idle() {
        let (limiter, clock) = setup(1, 1_000);

        limiter.allow(&key("paris"), "alice");
        clock.advance(Duration::milliseconds(500));
        limiter.allow(&key("berlin"), "alice");
        clock.advance(Duration::milliseconds(600));

        assert_eq!(limiter.prune_idle(), 1);
        assert_eq!(limiter.bucket_count(), 1);
    }

    #[test]
    fn test_zero_limit_tracks_nothing() {
        let (limiter, _) = setup(0, 1_000);
        limiter.allow(&key("paris"), "alice");
        assert_eq!(limiter.bucket_count(), 0);
        assert_eq!(limiter.prune_idle(), 0);
    }
}
