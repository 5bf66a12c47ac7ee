//! Keyed cache for repeated graph lookups.
//!
//! Strictly a performance layer: every entry can be recomputed from the
//! simulation aggregate, and disabling the cache never changes observable
//! behavior. Explicitly constructed and injected — no globals.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use uuid::Uuid;

/// Accesses after which a lookup pattern is considered worth caching.
const CACHE_WORTHY_ACCESSES: u64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PatternKey {
    pub simulation_id: Uuid,
    pub predecessor: u64,
}

struct CacheEntry {
    node_keys: Vec<u64>,
    stored_at: Instant,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheStatistics {
    pub hits: u64,
    pub misses: u64,
    pub hit_ratio: f64,
    pub entries: usize,
    pub tracked_patterns: usize,
}

/// TTL-bounded cache of candidate-node keys per (simulation, predecessor).
pub struct FlowPatternCache {
    ttl: Duration,
    entries: Mutex<HashMap<PatternKey, CacheEntry>>,
    access_counts: Mutex<HashMap<PatternKey, u64>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl FlowPatternCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
            access_counts: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Cached node keys for a pattern, if fresh. Records hit/miss counters
    /// and the access frequency used by [`Self::should_cache`].
    pub fn get(&self, key: PatternKey) -> Option<Vec<u64>> {
        {
            let mut counts = self.access_counts.lock().unwrap_or_else(|e| e.into_inner());
            *counts.entry(key).or_insert(0) += 1;
        }

        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get(&key) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.node_keys.clone())
            }
            Some(_) => {
                entries.remove(&key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn put(&self, key: PatternKey, node_keys: Vec<u64>) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            key,
            CacheEntry {
                node_keys,
                stored_at: Instant::now(),
            },
        );
    }

    /// A pattern earns a cache slot once it has been looked up often enough.
    pub fn should_cache(&self, key: PatternKey) -> bool {
        let counts = self.access_counts.lock().unwrap_or_else(|e| e.into_inner());
        counts.get(&key).copied().unwrap_or(0) >= CACHE_WORTHY_ACCESSES
    }

    pub fn invalidate_simulation(&self, simulation_id: Uuid) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.retain(|key, _| key.simulation_id != simulation_id);
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.access_counts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    pub fn statistics(&self) -> CacheStatistics {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStatistics {
            hits,
            misses,
            hit_ratio: if total > 0 {
                hits as f64 / total as f64
            } else {
                0.0
            },
            entries: self.entries.lock().unwrap_or_else(|e| e.into_inner()).len(),
            tracked_patterns: self
                .access_counts
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .len(),
        }
    }
}
