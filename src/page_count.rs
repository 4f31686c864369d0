//! Page-count cache with adaptive staleness
//!
//! Small counts expire quickly because a document with few pages is likely
//! still being produced page by page. Larger counts are kept for minutes.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::clock::Clock;
use crate::discovery::{PageUrls, discover_page_count};
use crate::probe::ExistenceProbe;
use crate::registry::DocumentEntry;
use crate::store::{KeyValueStore, page_count_key};

/// Counts below this are re-checked on the short TTL
pub const CACHE_RECHECK_THRESHOLD: usize = 10;
/// TTL for counts below the threshold
pub const CACHE_RECHECK_MS: i64 = 30_000;
/// TTL for counts at or above the threshold
pub const CACHE_VALIDITY_MS: i64 = 300_000;

/// Stored page count for one document
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub page_count: usize,
    pub discovered_at_ms: i64,
}

impl CacheRecord {
    /// Whether the record can be trusted at `now_ms`. A timestamp from the
    /// future is never trusted.
    #[must_use]
    pub fn is_fresh(&self, now_ms: i64) -> bool {
        let age = now_ms - self.discovered_at_ms;
        if age < 0 {
            return false;
        }
        let ttl = if self.page_count < CACHE_RECHECK_THRESHOLD {
            CACHE_RECHECK_MS
        } else {
            CACHE_VALIDITY_MS
        };
        age < ttl
    }
}

/// Cache policy over a key-value store
#[derive(Clone)]
pub struct PageCountCache {
    clock: Arc<dyn Clock>,
}

impl PageCountCache {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    #[must_use]
    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    #[must_use]
    pub fn record(&self, store: &dyn KeyValueStore, entry: &DocumentEntry) -> Option<CacheRecord> {
        let raw = store.get(&page_count_key(&entry.storage_key))?;
        match serde_json::from_str(&raw) {
            Ok(record) => Some(record),
            Err(e) => {
                debug!("Ignoring unreadable page count for {}: {e}", entry.storage_key);
                None
            }
        }
    }

    /// Cached count if the record is still fresh. No network.
    #[must_use]
    pub fn lookup(&self, store: &dyn KeyValueStore, entry: &DocumentEntry) -> Option<usize> {
        self.record(store, entry)
            .filter(|record| record.is_fresh(self.now_ms()))
            .map(|record| record.page_count)
    }

    /// Remember a discovered count. Zero is never cached.
    pub fn remember(&self, store: &mut dyn KeyValueStore, entry: &DocumentEntry, page_count: usize) {
        if page_count == 0 {
            return;
        }
        let record = CacheRecord {
            page_count,
            discovered_at_ms: self.now_ms(),
        };
        let result = serde_json::to_string(&record)
            .map_err(crate::store::StoreError::from)
            .and_then(|json| store.set(&page_count_key(&entry.storage_key), &json));
        if let Err(e) = result {
            warn!("Failed to cache page count for {}: {e}", entry.storage_key);
        }
    }

    /// Drop the record so the next lookup misses
    pub fn evict(&self, store: &mut dyn KeyValueStore, entry: &DocumentEntry) {
        if let Err(e) = store.remove(&page_count_key(&entry.storage_key)) {
            warn!("Failed to evict page count for {}: {e}", entry.storage_key);
        }
    }

    /// Cached count, or discover and cache it
    pub fn get_count<P>(
        &self,
        store: &mut dyn KeyValueStore,
        entry: &DocumentEntry,
        urls: &PageUrls,
        probe: &P,
        max_scan: usize,
    ) -> usize
    where
        P: ExistenceProbe + ?Sized,
    {
        if let Some(count) = self.lookup(store, entry) {
            debug!("Page count cache hit for {}: {count}", entry.storage_key);
            return count;
        }
        let count = discover_page_count(urls, probe, max_scan);
        self.remember(store, entry, count);
        count
    }

    /// Evict, then discover again
    pub fn refresh<P>(
        &self,
        store: &mut dyn KeyValueStore,
        entry: &DocumentEntry,
        urls: &PageUrls,
        probe: &P,
        max_scan: usize,
    ) -> usize
    where
        P: ExistenceProbe + ?Sized,
    {
        self.evict(store, entry);
        self.get_count(store, entry, urls, probe, max_scan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::discovery::MAX_PAGE_SCAN;
    use crate::probe::ProbeOutcome;
    use crate::registry::register_document;
    use crate::store::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProbe {
        pages: AtomicUsize,
        calls: AtomicUsize,
    }

    impl CountingProbe {
        fn new(pages: usize) -> Self {
            Self {
                pages: AtomicUsize::new(pages),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl ExistenceProbe for CountingProbe {
        fn probe(&self, url: &str) -> ProbeOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let page: usize = url
                .rsplit('_')
                .next()
                .and_then(|t| t.split('.').next())
                .and_then(|n| n.parse().ok())
                .unwrap_or(0);
            if page >= 1 && page <= self.pages.load(Ordering::SeqCst) {
                ProbeOutcome::Exists
            } else {
                ProbeOutcome::Absent
            }
        }
    }

    #[test]
    fn small_count_expires_after_thirty_seconds() {
        let record = CacheRecord {
            page_count: 5,
            discovered_at_ms: 0,
        };
        assert!(record.is_fresh(29_000));
        assert!(!record.is_fresh(30_000));
    }

    #[test]
    fn large_count_expires_after_five_minutes() {
        let record = CacheRecord {
            page_count: 50,
            discovered_at_ms: 0,
        };
        assert!(record.is_fresh(299_000));
        assert!(!record.is_fresh(301_000));
    }

    #[test]
    fn threshold_count_uses_long_ttl() {
        let record = CacheRecord {
            page_count: CACHE_RECHECK_THRESHOLD,
            discovered_at_ms: 0,
        };
        assert!(record.is_fresh(60_000));
    }

    #[test]
    fn future_timestamp_is_stale() {
        let record = CacheRecord {
            page_count: 50,
            discovered_at_ms: 10_000,
        };
        assert!(!record.is_fresh(5_000));
    }

    #[test]
    fn fresh_record_skips_the_network() {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let cache = PageCountCache::new(clock.clone());
        let mut store = MemoryStore::new();
        let entry = register_document("book.pdf", "pages");
        let urls = PageUrls::new("http://h", &entry, "png");
        let probe = CountingProbe::new(20);

        assert_eq!(cache.get_count(&mut store, &entry, &urls, &probe, MAX_PAGE_SCAN), 20);
        let first_calls = probe.calls.load(Ordering::SeqCst);
        assert!(first_calls > 0);

        clock.advance(120_000);
        assert_eq!(cache.get_count(&mut store, &entry, &urls, &probe, MAX_PAGE_SCAN), 20);
        assert_eq!(probe.calls.load(Ordering::SeqCst), first_calls);
    }

    #[test]
    fn growing_document_is_rechecked() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = PageCountCache::new(clock.clone());
        let mut store = MemoryStore::new();
        let entry = register_document("draft.pdf", "pages");
        let urls = PageUrls::new("http://h", &entry, "png");
        let probe = CountingProbe::new(3);

        assert_eq!(cache.get_count(&mut store, &entry, &urls, &probe, MAX_PAGE_SCAN), 3);
        probe.pages.store(6, Ordering::SeqCst);
        clock.advance(10_000);
        assert_eq!(cache.get_count(&mut store, &entry, &urls, &probe, MAX_PAGE_SCAN), 3);
        clock.advance(25_000);
        assert_eq!(cache.get_count(&mut store, &entry, &urls, &probe, MAX_PAGE_SCAN), 6);
    }

    #[test]
    fn zero_is_not_cached() {
        let cache = PageCountCache::new(Arc::new(ManualClock::new(0)));
        let mut store = MemoryStore::new();
        let entry = register_document("pending.pdf", "pages");
        let urls = PageUrls::new("http://h", &entry, "png");
        let probe = CountingProbe::new(0);

        assert_eq!(cache.get_count(&mut store, &entry, &urls, &probe, MAX_PAGE_SCAN), 0);
        assert!(store.is_empty());
        assert_eq!(cache.get_count(&mut store, &entry, &urls, &probe, MAX_PAGE_SCAN), 0);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn refresh_ignores_fresh_record() {
        let cache = PageCountCache::new(Arc::new(ManualClock::new(0)));
        let mut store = MemoryStore::new();
        let entry = register_document("book.pdf", "pages");
        let urls = PageUrls::new("http://h", &entry, "png");
        let probe = CountingProbe::new(12);

        assert_eq!(cache.get_count(&mut store, &entry, &urls, &probe, MAX_PAGE_SCAN), 12);
        probe.pages.store(15, Ordering::SeqCst);
        assert_eq!(cache.refresh(&mut store, &entry, &urls, &probe, MAX_PAGE_SCAN), 15);
        assert_eq!(cache.lookup(&store, &entry), Some(15));
    }

    #[test]
    fn corrupt_record_is_a_miss() {
        let cache = PageCountCache::new(Arc::new(ManualClock::new(0)));
        let mut store = MemoryStore::new();
        let entry = register_document("book.pdf", "pages");
        store.set(&page_count_key(&entry.storage_key), "garbage").unwrap();
        assert_eq!(cache.lookup(&store, &entry), None);
    }
}
