//! Warm handle cache keyed by feed position.
//!
//! Structure: IndexMap<usize, CacheEntry>
//! - one live entry per index; insertion order kept for stable iteration
//! - retention is proximity-based (keep-set complement), not LRU: access
//!   recency is irrelevant when navigation is sequential in both directions
//!
//! # Prefetch order
//!
//! Proximate indices are enumerated offset by offset, next before previous:
//! `+1, -1, +2, -2, +3, -3` (wrapped modulo the item count, self and repeats
//! dropped). That sequence is already sorted by distance, so the very next
//! swipe target is always constructed and primed first.
//!
//! # Priming
//!
//! New handles get a best-effort prime on a worker: a near-zero seek then a
//! reset to start, so the host decodes the first frames before play is asked
//! for. Prefetch primes run under the current epoch and are skipped if the
//! user has moved on before a worker picks them up.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use indexmap::IndexMap;
use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::core::signals::SignalSink;
use crate::entities::media::{MediaBackend, SharedHandle};
use crate::entities::{Feed, WorkerPool};
use crate::error::{FeedError, FeedResult};

/// Forward buffer requested while priming, seconds
const PRIME_FORWARD_BUFFER_SECS: f64 = 1.0;

/// How strictly the warm-entry bound is enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BoundPolicy {
    /// Keep the current index plus the `bound - 1` nearest proximate indices.
    #[default]
    Strict,
    /// Keep the full proximate window regardless of bound (up to `1 + 2 * radius`).
    Window,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheConfig {
    /// Maximum warm entries after a prefetch cycle (Strict policy)
    pub bound: usize,
    /// Offsets `1..=radius` each side are proximate
    pub radius: usize,
    /// Proximate indices within this distance are primed on prefetch
    pub prime_radius: usize,
    /// First seek of the prime step
    pub prime_offset_secs: f64,
    pub policy: BoundPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            bound: 5,
            radius: 3,
            prime_radius: 1,
            prime_offset_secs: 0.01,
            policy: BoundPolicy::Strict,
        }
    }
}

/// An index near the current position, with its wrapped distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Proximate {
    pub index: usize,
    pub distance: usize,
}

/// Indices within `radius` of `around` in a feed of `item_count`, nearest first.
///
/// Empty if the feed is empty or `around` is outside it.
pub fn proximate(around: usize, item_count: usize, radius: usize) -> Vec<Proximate> {
    if item_count == 0 || around >= item_count {
        return Vec::new();
    }
    // past half the feed every offset wraps onto an index already listed
    let radius = radius.min(item_count / 2);
    let mut out: Vec<Proximate> = Vec::with_capacity(radius * 2);
    for offset in 1..=radius {
        let step = offset % item_count;
        let next = (around + step) % item_count;
        let prev = (around + item_count - step) % item_count;
        for index in [next, prev] {
            if index != around && !out.iter().any(|p| p.index == index) {
                out.push(Proximate { index, distance: offset });
            }
        }
    }
    out
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub index: usize,
    pub handle: SharedHandle,
    /// Wall-clock creation time, for logs and stats only
    pub created_at: Instant,
}

/// Cache counters
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    created: AtomicU64,
    evicted: AtomicU64,
    failures: AtomicU64,
}

impl CacheStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, warm: usize) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            created: self.created.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            warm,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub created: u64,
    pub evicted: u64,
    pub failures: u64,
    pub warm: usize,
}

impl CacheStatsSnapshot {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 { 0.0 } else { self.hits as f64 / total as f64 }
    }
}

/// Sole owner of handle lifetime.
///
/// Handles are created only through [`acquire`](Self::acquire) and
/// [`prefetch`](Self::prefetch), and destroyed only by eviction or
/// [`clear`](Self::clear).
pub struct CacheStore {
    feed: Arc<Feed>,
    backend: Arc<dyn MediaBackend>,
    workers: Arc<dyn WorkerPool>,
    sink: SignalSink,
    entries: IndexMap<usize, CacheEntry>,
    config: CacheConfig,
    stats: CacheStats,
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("warm", &self.indices())
            .field("config", &self.config)
            .finish()
    }
}

impl CacheStore {
    pub fn new(
        feed: Arc<Feed>,
        backend: Arc<dyn MediaBackend>,
        workers: Arc<dyn WorkerPool>,
        sink: SignalSink,
        config: CacheConfig,
    ) -> Self {
        let config = CacheConfig {
            bound: config.bound.max(1),
            radius: config.radius.max(1),
            ..config
        };
        debug!(
            "CacheStore created: bound={}, radius={}, policy={:?}, feed={} items",
            config.bound,
            config.radius,
            config.policy,
            feed.len()
        );
        Self {
            entries: IndexMap::with_capacity(config.bound + 1),
            feed,
            backend,
            workers,
            sink,
            config,
            stats: CacheStats::default(),
        }
    }

    pub fn feed(&self) -> &Arc<Feed> {
        &self.feed
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn is_warm(&self, index: usize) -> bool {
        self.entries.contains_key(&index)
    }

    pub fn get(&self, index: usize) -> Option<&CacheEntry> {
        self.entries.get(&index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Warm indices, ascending.
    pub fn indices(&self) -> Vec<usize> {
        let mut out: Vec<usize> = self.entries.keys().copied().collect();
        out.sort_unstable();
        out
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot(self.entries.len())
    }

    /// Handle for `index`, constructing and priming one if the index is cold.
    ///
    /// An existing entry wins even if `url` differs from the one it was built with.
    pub fn acquire(&mut self, index: usize, url: &Url) -> FeedResult<SharedHandle> {
        if let Some(entry) = self.entries.get(&index) {
            CacheStats::bump(&self.stats.hits);
            if entry.handle.url() != url {
                debug!(
                    "CacheStore: index {} cached for {}, ignoring requested {}",
                    index,
                    entry.handle.url(),
                    url
                );
            }
            debug!("CacheStore: using cached handle {} for index {}", entry.handle.id(), index);
            return Ok(Arc::clone(&entry.handle));
        }

        CacheStats::bump(&self.stats.misses);
        let handle = self.open_entry(index, url)?;
        self.prime(&handle, None);
        Ok(handle)
    }

    /// Warm the neighbourhood of `around`, then evict everything outside it.
    pub fn prefetch(&mut self, around: usize, item_count: usize) {
        let epoch = self.workers.increment_epoch();
        let targets = self.targets(around, item_count);
        trace!(
            "CacheStore: prefetch around {} (epoch {}): {:?}",
            around,
            epoch,
            targets.iter().map(|p| p.index).collect::<Vec<_>>()
        );

        for target in targets {
            if self.is_warm(target.index) {
                continue;
            }
            let Some(url) = self.feed.url_of(target.index).cloned() else {
                warn!("CacheStore: no feed item at index {}, skipping prefetch", target.index);
                continue;
            };
            match self.open_entry(target.index, &url) {
                Ok(handle) if target.distance <= self.config.prime_radius => {
                    self.prime(&handle, Some(epoch));
                }
                Ok(_) => {}
                // absorbed: the slot stays cold and acquire will retry on activation
                Err(e) => warn!("CacheStore: prefetch failed: {}", e),
            }
        }

        self.evict_stale(around, item_count);
    }

    /// Stop and drop every entry outside `{around} ∪ proximate(around)`.
    /// Returns the evicted indices.
    pub fn evict_stale(&mut self, around: usize, item_count: usize) -> Vec<usize> {
        let mut keep: Vec<usize> = self.targets(around, item_count).iter().map(|p| p.index).collect();
        keep.push(around);

        let mut evicted = Vec::new();
        self.entries.retain(|index, entry| {
            if keep.contains(index) {
                return true;
            }
            stop(entry);
            evicted.push(*index);
            false
        });

        for _ in &evicted {
            CacheStats::bump(&self.stats.evicted);
        }
        if !evicted.is_empty() {
            debug!("CacheStore: evicted {:?} (around {})", evicted, around);
        }
        evicted
    }

    /// Stop and drop the entry for `index` so the next acquire builds a
    /// fresh handle. Returns false if the index was cold.
    pub fn discard(&mut self, index: usize) -> bool {
        let Some(entry) = self.entries.shift_remove(&index) else {
            return false;
        };
        stop(&entry);
        CacheStats::bump(&self.stats.evicted);
        debug!("CacheStore: discarded handle {} for index {}", entry.handle.id(), index);
        true
    }

    /// Stop and drop every entry. Safe to call repeatedly.
    pub fn clear(&mut self) {
        // pending primes are for handles about to die
        self.workers.increment_epoch();
        if self.entries.is_empty() {
            return;
        }
        let count = self.entries.len();
        for (_, entry) in self.entries.drain(..) {
            stop(&entry);
        }
        debug!("CacheStore: cleared {} entries", count);
    }

    /// Proximate indices that should be warm, under the bound policy.
    fn targets(&self, around: usize, item_count: usize) -> Vec<Proximate> {
        let mut targets = proximate(around, item_count, self.config.radius);
        if self.config.policy == BoundPolicy::Strict {
            targets.truncate(self.config.bound - 1);
        }
        targets
    }

    fn open_entry(&mut self, index: usize, url: &Url) -> FeedResult<SharedHandle> {
        let handle = self.backend.open(url, self.sink.clone()).map_err(|reason| {
            CacheStats::bump(&self.stats.failures);
            FeedError::MediaBinding {
                index,
                url: url.to_string(),
                reason,
            }
        })?;
        debug!("CacheStore: created handle {} for index {}", handle.id(), index);
        CacheStats::bump(&self.stats.created);
        self.entries.insert(
            index,
            CacheEntry {
                index,
                handle: Arc::clone(&handle),
                created_at: Instant::now(),
            },
        );
        Ok(handle)
    }

    fn prime(&self, handle: &SharedHandle, epoch: Option<u64>) {
        let handle = Arc::clone(handle);
        let offset = self.config.prime_offset_secs;
        let job = Box::new(move || {
            handle.set_forward_buffer(PRIME_FORWARD_BUFFER_SECS);
            handle.seek(offset);
            handle.seek(0.0);
        });
        match epoch {
            Some(epoch) => self.workers.execute_with_epoch(epoch, job),
            None => self.workers.execute(job),
        }
    }
}

fn stop(entry: &CacheEntry) {
    trace!("CacheStore: stopping handle {} (index {})", entry.handle.id(), entry.index);
    entry.handle.pause();
    entry.handle.unbind();
}

impl Drop for CacheStore {
    fn drop(&mut self) {
        self.clear();
    }
}
