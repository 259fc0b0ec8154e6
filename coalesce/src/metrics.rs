use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crossbeam_utils::CachePadded;

/// A thread-safe, internal metrics collector for the cache.
/// All fields are atomic to allow for lock-free updates.
#[derive(Debug)]
pub struct Metrics {
  // --- Coalescing ---
  pub(crate) hits: CachePadded<AtomicU64>,
  pub(crate) misses: CachePadded<AtomicU64>,

  // --- Outcomes ---
  pub(crate) failures: CachePadded<AtomicU64>,
  pub(crate) cancellations: CachePadded<AtomicU64>,
  pub(crate) retries: CachePadded<AtomicU64>,
  pub(crate) timeouts: CachePadded<AtomicU64>,

  // --- Throughput ---
  pub(crate) inserts: CachePadded<AtomicU64>,
  pub(crate) invalidations: CachePadded<AtomicU64>,
  pub(crate) dead_purged: CachePadded<AtomicU64>,

  created_at: Instant,
}

impl Default for Metrics {
  fn default() -> Self {
    Self {
      hits: CachePadded::new(AtomicU64::new(0)),
      misses: CachePadded::new(AtomicU64::new(0)),
      failures: CachePadded::new(AtomicU64::new(0)),
      cancellations: CachePadded::new(AtomicU64::new(0)),
      retries: CachePadded::new(AtomicU64::new(0)),
      timeouts: CachePadded::new(AtomicU64::new(0)),
      inserts: CachePadded::new(AtomicU64::new(0)),
      invalidations: CachePadded::new(AtomicU64::new(0)),
      dead_purged: CachePadded::new(AtomicU64::new(0)),
      created_at: Instant::now(),
    }
  }
}

impl Metrics {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  #[inline]
  pub(crate) fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
  }

  /// Creates a point-in-time snapshot of the current metrics.
  ///
  /// `entries` and `evictions` come from the backing store.
  pub(crate) fn snapshot(&self, entries: usize, evictions: u64) -> MetricsSnapshot {
    let hits = self.hits.load(Ordering::Relaxed);
    let misses = self.misses.load(Ordering::Relaxed);
    let total_lookups = hits + misses;

    MetricsSnapshot {
      hits,
      misses,
      hit_ratio: if total_lookups == 0 {
        0.0
      } else {
        hits as f64 / total_lookups as f64
      },
      failures: self.failures.load(Ordering::Relaxed),
      cancellations: self.cancellations.load(Ordering::Relaxed),
      retries: self.retries.load(Ordering::Relaxed),
      timeouts: self.timeouts.load(Ordering::Relaxed),
      inserts: self.inserts.load(Ordering::Relaxed),
      invalidations: self.invalidations.load(Ordering::Relaxed),
      dead_purged: self.dead_purged.load(Ordering::Relaxed),
      evictions,
      entries,
      uptime_secs: self.created_at.elapsed().as_secs(),
    }
  }
}

/// A point-in-time, public-facing snapshot of the cache's metrics.
#[derive(Clone)]
pub struct MetricsSnapshot {
  /// Lookups that joined an existing computation, pending or settled.
  pub hits: u64,
  /// Lookups that installed a new computation.
  pub misses: u64,
  /// The cache hit ratio (hits / (hits + misses)).
  pub hit_ratio: f64,
  /// Computations whose builder returned an error.
  pub failures: u64,
  /// Computations dropped by their executor before finishing.
  pub cancellations: u64,
  /// Times a caller restarted after finding its computation cancelled.
  pub retries: u64,
  /// Callers that gave up at their own deadline.
  pub timeouts: u64,
  /// Values installed directly with `put`.
  pub inserts: u64,
  /// Entries removed by `invalidate` and friends.
  pub invalidations: u64,
  /// Dead entries removed by housekeeping.
  pub dead_purged: u64,
  /// Entries evicted by the backing store's own policy.
  pub evictions: u64,
  /// Entries currently held by the backing store.
  pub entries: usize,
  /// The number of seconds the cache has been running.
  pub uptime_secs: u64,
}

impl fmt::Debug for MetricsSnapshot {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MetricsSnapshot")
      .field("hits", &self.hits)
      .field("misses", &self.misses)
      .field("hit_ratio", &format!("{:.2}%", self.hit_ratio * 100.0))
      .field("failures", &self.failures)
      .field("cancellations", &self.cancellations)
      .field("retries", &self.retries)
      .field("timeouts", &self.timeouts)
      .field("inserts", &self.inserts)
      .field("invalidations", &self.invalidations)
      .field("dead_purged", &self.dead_purged)
      .field("evictions", &self.evictions)
      .field("entries", &self.entries)
      .field("uptime_secs", &self.uptime_secs)
      .finish()
  }
}
