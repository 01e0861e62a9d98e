use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use super::clock::{Clock, SystemClock};
use super::{Backend, CounterStore, WindowHit};
use crate::errors::StoreError;
use crate::middleware::rate_limit::MAX_WINDOW_SECONDS;

/// Per-key counter state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRecord {
    pub count: u64,
    pub window_reset_at: Instant,
}

/// Process-local fixed-window counters.
///
/// Lives for the whole process and is only cleared by [`reset`](Self::reset).
/// Records whose window has passed stay in the map until the key is hit again
/// (which restarts the window) or [`sweep_expired`](Self::sweep_expired) is
/// called; nothing evicts them automatically, so memory grows with the number
/// of distinct identifiers seen.
pub struct MemoryCounterStore {
    records: DashMap<String, RateLimitRecord>,
    clock: Arc<dyn Clock>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: DashMap::new(),
            clock,
        }
    }

    pub fn record(&self, key: &str) -> Option<RateLimitRecord> {
        self.records.get(key).map(|r| *r)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn reset(&self) {
        self.records.clear();
    }

    /// Drops records whose window has already rolled over. Not called by the
    /// limiter itself; wire it to a periodic task to bound memory.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.records.len();
        self.records.retain(|_, r| r.window_reset_at > now);
        before - self.records.len()
    }

    fn hit_at(&self, key: &str, window: Duration, now: Instant) -> WindowHit {
        // the entry guard holds the shard lock, so reset and increment are one step per key
        let mut record = self
            .records
            .entry(key.to_string())
            .or_insert(RateLimitRecord {
                count: 0,
                window_reset_at: now,
            });

        if now >= record.window_reset_at {
            record.count = 0;
            let window = window.min(Duration::from_secs(MAX_WINDOW_SECONDS));
            record.window_reset_at = now.checked_add(window).unwrap_or(now);
        }
        record.count += 1;

        WindowHit {
            count: record.count,
            reset_in: record.window_reset_at - now,
        }
    }
}

impl Default for MemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn hit(&self, key: &str, window: Duration) -> Result<WindowHit, StoreError> {
        Ok(self.hit_at(key, window, self.clock.now()))
    }

    fn backend(&self) -> Backend {
        Backend::InProcess
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::clock::MockClock;

    const MINUTE: Duration = Duration::from_secs(60);

    fn store() -> (MemoryCounterStore, MockClock) {
        let clock = MockClock::new();
        (MemoryCounterStore::with_clock(Arc::new(clock.clone())), clock)
    }

    #[tokio::test]
    async fn test_counts_within_window() {
        let (store, clock) = store();
        assert_eq!(store.hit("k", MINUTE).await.unwrap().count, 1);
        clock.advance(Duration::from_secs(10));
        let hit = store.hit("k", MINUTE).await.unwrap();
        assert_eq!(hit.count, 2);
        assert_eq!(hit.reset_in, Duration::from_secs(50));
    }

    #[tokio::test]
    async fn test_window_rolls_over() {
        let (store, clock) = store();
        for _ in 0..3 {
            store.hit("k", MINUTE).await.unwrap();
        }
        clock.advance(MINUTE);
        let hit = store.hit("k", MINUTE).await.unwrap();
        assert_eq!(hit.count, 1);
        assert_eq!(hit.reset_in, MINUTE);
    }

    #[tokio::test]
    async fn test_oversized_window_is_capped() {
        let (store, _) = store();
        let hit = store.hit("k", Duration::MAX).await.unwrap();
        assert_eq!(hit.count, 1);
        assert_eq!(hit.reset_in, Duration::from_secs(MAX_WINDOW_SECONDS));
        assert_eq!(store.hit("k", Duration::MAX).await.unwrap().count, 2);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let (store, _) = store();
        store.hit("a", MINUTE).await.unwrap();
        store.hit("a", MINUTE).await.unwrap();
        assert_eq!(store.hit("b", MINUTE).await.unwrap().count, 1);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_expired_records_are_kept_until_swept() {
        let (store, clock) = store();
        store.hit("a", MINUTE).await.unwrap();
        store.hit("b", Duration::from_secs(300)).await.unwrap();
        clock.advance(Duration::from_secs(120));

        assert_eq!(store.len(), 2);
        assert_eq!(store.sweep_expired(), 1);
        assert!(store.record("a").is_none());
        assert_eq!(store.record("b").unwrap().count, 1);

        store.reset();
        assert!(store.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_hits_never_double_count() {
        let store = Arc::new(MemoryCounterStore::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                for _ in 0..50 {
                    seen.push(store.hit("shared", MINUTE).await.unwrap().count);
                }
                seen
            }));
        }

        let mut all = Vec::new();
        for h in handles {
            all.extend(h.await.unwrap());
        }
        all.sort_unstable();
        let expected: Vec<u64> = (1..=400).collect();
        assert_eq!(all, expected);
    }
}
