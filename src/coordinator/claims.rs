//! Fetch claim registry.
//!
//! At most one claim exists per key. The first caller to need a fetch becomes
//! the leader and owns a [`ClaimGuard`]; later callers attach to the same
//! watch channel and observe the leader's result.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::watch;

use crate::cache::{CacheEntry, CacheKey};
use crate::error::FetchError;

/// Outcome published to every caller attached to a claim.
pub type ClaimResult = Result<CacheEntry, FetchError>;

type Slot = watch::Receiver<Option<ClaimResult>>;

/// Result of trying to claim a key.
pub enum Claim {
    /// No fetch was running; the caller must perform it
    Leader(ClaimGuard, ClaimWaiter),
    /// A fetch is already running; wait for it
    Attached(ClaimWaiter),
}

// == Claim Registry ==
#[derive(Debug, Default, Clone)]
pub struct ClaimRegistry {
    claims: Arc<DashMap<CacheKey, Slot>>,
}

impl ClaimRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches to the running claim for `key` or creates one.
    ///
    /// Check and create happen under the key's shard lock.
    pub fn claim(&self, key: &CacheKey) -> Claim {
        match self.claims.entry(key.clone()) {
            Entry::Occupied(occupied) => Claim::Attached(ClaimWaiter {
                rx: occupied.get().clone(),
            }),
            Entry::Vacant(vacant) => {
                let (tx, rx) = watch::channel(None);
                vacant.insert(rx.clone());
                let guard = ClaimGuard {
                    registry: self.claims.clone(),
                    key: key.clone(),
                    tx: Some(tx),
                };
                Claim::Leader(guard, ClaimWaiter { rx })
            }
        }
    }

    /// Number of fetches currently in flight.
    pub fn in_flight(&self) -> usize {
        self.claims.len()
    }
}

// == Claim Guard ==
/// Ownership of an in-flight fetch. Releasing it removes the claim.
pub struct ClaimGuard {
    registry: Arc<DashMap<CacheKey, Slot>>,
    key: CacheKey,
    tx: Option<watch::Sender<Option<ClaimResult>>>,
}

impl ClaimGuard {
    /// Releases the claim and hands `result` to every attached caller.
    ///
    /// The result must already be published to the store: once the claim is
    /// gone, new readers go back to the store instead.
    pub fn complete(mut self, result: ClaimResult) {
        self.registry.remove(&self.key);
        if let Some(tx) = self.tx.take() {
            // send_replace keeps the value even with no receiver left.
            tx.send_replace(Some(result));
        }
    }
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        // Dropped without completing (task panicked or was aborted).
        if self.tx.is_some() {
            self.registry.remove(&self.key);
        }
    }
}

// == Claim Waiter ==
pub struct ClaimWaiter {
    rx: Slot,
}

impl ClaimWaiter {
    /// Waits for the claim to resolve.
    pub async fn wait(mut self) -> ClaimResult {
        match self.rx.wait_for(Option::is_some).await {
            Ok(result) => result
                .clone()
                .unwrap_or_else(|| Err(FetchError::Upstream("fetch produced no result".to_string()))),
            Err(_) => Err(FetchError::Upstream("fetch task ended without a result".to_string())),
        }
    }
}
