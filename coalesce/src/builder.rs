use crate::config::CacheConfig;
use crate::error::BuildError;
use crate::handles::{BlockingCache, CoalescingCache};
use crate::metrics::Metrics;
use crate::policy::Eviction;
use crate::runtime::ThreadSpawner;
use crate::shared::{CacheShared, SharedStore, Slot};
use crate::store::{BackingStore, ShardedStore};
use crate::task::janitor::Janitor;
use crate::TaskSpawner;

use core::fmt;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;
use std::time::Duration;

/// How many times a single `get` restarts after its computation was cancelled.
pub const DEFAULT_MAX_COMPUTATION_RETRIES: u32 = 3;

/// A builder for creating `CoalescingCache` and `BlockingCache` instances.
pub struct CacheBuilder<K, V, E, H = ahash::RandomState> {
  capacity: u64,
  shards: usize,
  hasher: H,
  eviction: Eviction,
  spawner: Option<Arc<dyn TaskSpawner>>,
  backing_store: Option<SharedStore<K, V, E>>,
  max_computation_retries: u32,
  maintenance_interval: Option<Duration>,
}

// Manual Debug implementation for CacheBuilder.
impl<K, V, E, H> fmt::Debug for CacheBuilder<K, V, E, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheBuilder")
      .field("capacity", &self.capacity)
      .field("shards", &self.shards)
      .field("eviction", &self.eviction)
      .field("max_computation_retries", &self.max_computation_retries)
      .field("maintenance_interval", &self.maintenance_interval)
      .field("has_spawner", &self.spawner.is_some())
      .field("has_backing_store", &self.backing_store.is_some())
      .finish_non_exhaustive()
  }
}

// --- General Configuration Methods ---
// This impl block has no restrictive bounds on K, V or E.
impl<K, V, E, H> CacheBuilder<K, V, E, H> {
  /// Sets the maximum number of entries held by the default store.
  pub fn capacity(mut self, capacity: u64) -> Self {
    self.capacity = capacity;
    self
  }

  /// Sets the cache to be "unbounded".
  pub fn unbounded(mut self) -> Self {
    self.capacity = u64::MAX;
    self
  }

  /// Sets the number of concurrent shards to use. Rounded up to a power of two on build.
  pub fn shards(mut self, shards: usize) -> Self {
    self.shards = shards;
    self
  }

  /// Sets the eviction strategy of the default store. Defaults to LRU.
  ///
  /// Only consulted when the cache is bounded.
  pub fn eviction(mut self, eviction: Eviction) -> Self {
    self.eviction = eviction;
    self
  }

  /// Sets the executor that runs async builders.
  ///
  /// Without one, `build` uses the Tokio runtime that is current at build time.
  pub fn spawner(mut self, spawner: Arc<dyn TaskSpawner>) -> Self {
    self.spawner = Some(spawner);
    self
  }

  /// Replaces the default `ShardedStore` with a custom backing store.
  ///
  /// `capacity`, `shards`, `eviction` and `hasher` are ignored when one is set.
  pub fn backing_store<S>(mut self, store: S) -> Self
  where
    S: BackingStore<K, Slot<V, E>> + 'static,
  {
    self.backing_store = Some(Arc::new(store));
    self
  }

  /// Bounds how often one `get` call restarts after finding its computation
  /// cancelled by the executor. Once exhausted the call returns `Error::Cancelled`.
  ///
  /// Defaults to 3.
  pub fn max_computation_retries(mut self, retries: u32) -> Self {
    self.max_computation_retries = retries;
    self
  }

  /// Enables a background thread that calls `clean_up` on every interval.
  pub fn maintenance_interval(mut self, interval: Duration) -> Self {
    self.maintenance_interval = Some(interval);
    self
  }

  /// Sets the hasher used to pick shards and hash keys in the default store.
  pub fn hasher(mut self, hasher: H) -> Self {
    self.hasher = hasher;
    self
  }
}

// --- Default Constructor ---
impl<K, V, E, H: BuildHasher + Default> CacheBuilder<K, V, E, H> {
  /// Creates a new `CacheBuilder` with default settings.
  pub fn new() -> Self {
    Self {
      capacity: u64::MAX,
      shards: (num_cpus::get() * 4).max(1).next_power_of_two(),
      hasher: H::default(),
      eviction: Eviction::default(),
      spawner: None,
      backing_store: None,
      max_computation_retries: DEFAULT_MAX_COMPUTATION_RETRIES,
      maintenance_interval: None,
    }
  }

  /// Creates a builder from plain settings. Unset fields keep their defaults.
  pub fn from_config(config: &CacheConfig) -> Self {
    let mut builder = Self::new().eviction(config.eviction);
    if let Some(capacity) = config.capacity {
      builder = builder.capacity(capacity);
    }
    if let Some(shards) = config.shards {
      builder = builder.shards(shards);
    }
    if let Some(retries) = config.max_computation_retries {
      builder = builder.max_computation_retries(retries);
    }
    if let Some(millis) = config.maintenance_interval_ms {
      builder = builder.maintenance_interval(Duration::from_millis(millis));
    }
    builder
  }
}

impl<K, V, E> Default for CacheBuilder<K, V, E, ahash::RandomState> {
  fn default() -> Self {
    Self::new()
  }
}

// --- Build Methods ---
impl<K, V, E, H> CacheBuilder<K, V, E, H>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  E: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  /// Builds an asynchronous `CoalescingCache`.
  ///
  /// Needs either a configured spawner or a current Tokio runtime.
  pub fn build(mut self) -> Result<CoalescingCache<K, V, E>, BuildError> {
    self.validate()?;
    let spawner = match self.spawner.take().or_else(current_runtime) {
      Some(spawner) => spawner,
      None => return Err(BuildError::SpawnerRequired),
    };
    let shared = self.build_shared_core(spawner)?;
    Ok(CoalescingCache { shared })
  }

  /// Builds a `BlockingCache` for callers outside of any async runtime.
  ///
  /// Blocking builders always run on their own thread. The spawner, used only
  /// after `to_async`, falls back to one thread per computation.
  pub fn build_blocking(mut self) -> Result<BlockingCache<K, V, E>, BuildError> {
    self.validate()?;
    let spawner = self
      .spawner
      .take()
      .or_else(current_runtime)
      .unwrap_or_else(|| Arc::new(ThreadSpawner));
    let shared = self.build_shared_core(spawner)?;
    Ok(BlockingCache { shared })
  }

  /// Central logic to construct the shared core of the cache.
  fn build_shared_core(self, spawner: Arc<dyn TaskSpawner>) -> Result<Arc<CacheShared<K, V, E>>, BuildError> {
    let store: SharedStore<K, V, E> = match self.backing_store {
      Some(store) => store,
      None => {
        let shards = self.shards.next_power_of_two();
        if self.capacity == u64::MAX {
          Arc::new(ShardedStore::unbounded(shards, self.hasher))
        } else {
          let capacity = usize::try_from(self.capacity).unwrap_or(usize::MAX);
          Arc::new(ShardedStore::bounded(shards, capacity, self.hasher, self.eviction))
        }
      }
    };
    let metrics = Arc::new(Metrics::new());

    let janitor = match self.maintenance_interval {
      Some(interval) => Some(Janitor::spawn(store.clone(), metrics.clone(), interval)?),
      None => None,
    };

    tracing::debug!(
      capacity = self.capacity,
      max_computation_retries = self.max_computation_retries,
      janitor = janitor.is_some(),
      "built coalescing cache"
    );

    Ok(Arc::new(CacheShared {
      store,
      metrics,
      spawner,
      max_computation_retries: self.max_computation_retries,
      janitor,
    }))
  }

  /// Validates the builder configuration.
  pub(crate) fn validate(&self) -> Result<(), BuildError> {
    if self.capacity == 0 {
      return Err(BuildError::ZeroCapacity);
    }
    if self.shards == 0 {
      return Err(BuildError::ZeroShards);
    }
    if self.maintenance_interval.is_some_and(|interval| interval.is_zero()) {
      return Err(BuildError::ZeroMaintenanceInterval);
    }
    Ok(())
  }
}

#[cfg(feature = "tokio")]
fn current_runtime() -> Option<Arc<dyn TaskSpawner>> {
  crate::runtime::TokioSpawner::try_current().map(|spawner| Arc::new(spawner) as Arc<dyn TaskSpawner>)
}

#[cfg(not(feature = "tokio"))]
fn current_runtime() -> Option<Arc<dyn TaskSpawner>> {
  None
}
