//! TTL caches for rate-limited account endpoints.
//!
//! One decision cycle reads balances and positions many times; the venues
//! rate-limit those endpoints aggressively. Each trader instance therefore
//! keeps an independent cache per query with a short TTL. There is no
//! invalidation on local writes: a read immediately after a trade may return
//! pre-trade data until the TTL expires.

use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct CacheEntry<T> {
    value: T,
    fetched_at: Instant,
}

/// Single-value cache with a fixed TTL. Readers never block each other;
/// writers are exclusive.
#[derive(Debug)]
pub struct TtlCache<T> {
    entry: RwLock<Option<CacheEntry<T>>>,
    ttl: Duration,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entry: RwLock::new(None),
            ttl,
        }
    }

    /// Returns the cached value iff it is still within the TTL.
    pub async fn get(&self) -> Option<T> {
        let guard = self.entry.read().await;
        match guard.as_ref() {
            Some(entry) if entry.fetched_at.elapsed() < self.ttl => Some(entry.value.clone()),
            _ => None,
        }
    }

    pub async fn put(&self, value: T) {
        let mut guard = self.entry.write().await;
        *guard = Some(CacheEntry {
            value,
            fetched_at: Instant::now(),
        });
    }
}
