//! Render cache with LRU and TTL eviction
//!
//! Maps fingerprints to rendered artifacts. Capacity is bounded both by
//! entry count and by total artifact bytes; the least recently used entries
//! go first. Entries older than the configured TTL are dropped on access and
//! by [`RenderCache::purge_expired`], which the server runs periodically.
//!
//! # Thread Safety
//!
//! All state sits behind one `parking_lot::Mutex`. No lock is held across an
//! `.await`, so the cache is safe to call from any task or thread.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;

use crate::diagram::{Fingerprint, RenderedDiagram};

/// Cache configuration options
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of cached artifacts
    pub max_entries: usize,
    /// Maximum total artifact size in bytes
    pub max_bytes: usize,
    /// Maximum entry age regardless of use
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 500,
            max_bytes: 64 * 1024 * 1024,
            ttl: Duration::from_secs(3600),
        }
    }
}

struct CacheEntry {
    rendered: Arc<RenderedDiagram>,
    inserted_at: Instant,
    size: usize,
}

impl CacheEntry {
    fn is_expired(&self, ttl: Duration, now: Instant) -> bool {
        now.duration_since(self.inserted_at) >= ttl
    }
}

struct CacheState {
    entries: LruCache<Fingerprint, CacheEntry>,
    total_bytes: usize,
}

impl CacheState {
    fn remove(&mut self, fingerprint: &Fingerprint) -> Option<CacheEntry> {
        let entry = self.entries.pop(fingerprint)?;
        self.total_bytes -= entry.size;
        Some(entry)
    }
}

#[derive(Default)]
struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

/// Thread-safe render cache
#[derive(Clone)]
pub struct RenderCache {
    state: Arc<Mutex<CacheState>>,
    counters: Arc<CacheCounters>,
    config: CacheConfig,
}

impl Default for RenderCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl RenderCache {
    /// Create a new render cache with the given configuration
    pub fn new(config: CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_entries).unwrap_or(NonZeroUsize::MIN);

        Self {
            state: Arc::new(Mutex::new(CacheState {
                entries: LruCache::new(capacity),
                total_bytes: 0,
            })),
            counters: Arc::new(CacheCounters::default()),
            config,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Look up a rendered artifact, refreshing its LRU position
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<Arc<RenderedDiagram>> {
        let mut state = self.state.lock();

        let expired = match state.entries.peek(fingerprint) {
            Some(entry) => entry.is_expired(self.config.ttl, Instant::now()),
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        if expired {
            state.remove(fingerprint);
            self.counters.expirations.fetch_add(1, Ordering::Relaxed);
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(fingerprint = %fingerprint.short(), "Cache entry expired");
            return None;
        }

        self.counters.hits.fetch_add(1, Ordering::Relaxed);
        state
            .entries
            .get(fingerprint)
            .map(|entry| Arc::clone(&entry.rendered))
    }

    /// Check for a live entry without touching LRU order or counters
    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        let state = self.state.lock();
        state
            .entries
            .peek(fingerprint)
            .is_some_and(|entry| !entry.is_expired(self.config.ttl, Instant::now()))
    }

    /// Store a rendered artifact, replacing any previous entry
    ///
    /// Returns `false` when the artifact alone exceeds the byte budget and
    /// was therefore not cached.
    pub fn put(&self, fingerprint: Fingerprint, rendered: Arc<RenderedDiagram>) -> bool {
        let size = rendered.size();
        if size > self.config.max_bytes {
            tracing::debug!(
                fingerprint = %fingerprint.short(),
                size,
                max_bytes = self.config.max_bytes,
                "Artifact larger than cache budget, not cached"
            );
            return false;
        }

        let mut state = self.state.lock();
        state.remove(&fingerprint);

        let entry = CacheEntry {
            rendered,
            inserted_at: Instant::now(),
            size,
        };
        state.total_bytes += size;

        if let Some((evicted, old)) = state.entries.push(fingerprint, entry) {
            state.total_bytes -= old.size;
            self.record_eviction(&evicted, "entry limit");
        }

        self.evict(&mut state);
        true
    }

    /// Drop least recently used entries until the byte budget holds
    fn evict(&self, state: &mut CacheState) {
        while state.total_bytes > self.config.max_bytes {
            match state.entries.pop_lru() {
                Some((evicted, entry)) => {
                    state.total_bytes -= entry.size;
                    self.record_eviction(&evicted, "byte limit");
                }
                None => break,
            }
        }
    }

    fn record_eviction(&self, fingerprint: &Fingerprint, reason: &'static str) {
        self.counters.evictions.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(fingerprint = %fingerprint.short(), reason, "Evicted cache entry");
    }

    /// Remove every entry older than the TTL, returning how many were dropped
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut state = self.state.lock();

        let expired: Vec<Fingerprint> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(self.config.ttl, now))
            .map(|(fingerprint, _)| *fingerprint)
            .collect();

        for fingerprint in &expired {
            state.remove(fingerprint);
        }

        let count = expired.len();
        if count > 0 {
            self.counters
                .expirations
                .fetch_add(count as u64, Ordering::Relaxed);
        }
        count
    }

    /// Remove one entry
    pub fn remove(&self, fingerprint: &Fingerprint) -> bool {
        self.state.lock().remove(fingerprint).is_some()
    }

    /// Clear all entries
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.total_bytes = 0;
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let (entries, bytes) = {
            let state = self.state.lock();
            (state.entries.len(), state.total_bytes)
        };

        CacheStats {
            entries,
            bytes,
            max_entries: self.config.max_entries,
            max_bytes: self.config.max_bytes,
            ttl_secs: self.config.ttl.as_secs(),
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            expirations: self.counters.expirations.load(Ordering::Relaxed),
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub entries: usize,
    pub bytes: usize,
    pub max_entries: usize,
    pub max_bytes: usize,
    pub ttl_secs: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}
