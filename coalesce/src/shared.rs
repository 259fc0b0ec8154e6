use crate::computation::{Computation, Outcome};
use crate::error::Error;
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::store::BackingStore;
use crate::task::janitor::Janitor;
use crate::TaskSpawner;

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// The handle type stored for every key.
pub(crate) type Slot<V, E> = Arc<Computation<V, E>>;

/// A type-erased backing store holding computation handles.
pub(crate) type SharedStore<K, V, E> = Arc<dyn BackingStore<K, Slot<V, E>>>;

/// The internal, thread-safe core of the cache.
pub(crate) struct CacheShared<K, V, E> {
  pub(crate) store: SharedStore<K, V, E>,
  pub(crate) metrics: Arc<Metrics>,
  pub(crate) spawner: Arc<dyn TaskSpawner>,
  pub(crate) max_computation_retries: u32,
  pub(crate) janitor: Option<Janitor>,
}

impl<K, V, E> fmt::Debug for CacheShared<K, V, E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheShared")
      .field("max_computation_retries", &self.max_computation_retries)
      .field("metrics", &self.metrics.snapshot(self.store.len(), self.store.evictions()))
      .field("has_janitor", &self.janitor.is_some())
      .finish_non_exhaustive()
  }
}

impl<K, V, E> Drop for CacheShared<K, V, E> {
  fn drop(&mut self) {
    if let Some(janitor) = self.janitor.take() {
      janitor.stop();
    }
  }
}

impl<K, V, E> CacheShared<K, V, E>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  E: Send + Sync + 'static,
{
  /// Fetches the computation for `key`, installing a fresh pending one if absent.
  ///
  /// Returns `true` alongside the handle when this call installed it, in which
  /// case the caller is responsible for scheduling its builder.
  pub(crate) fn claim(&self, key: &K) -> (Slot<V, E>, bool) {
    let (computation, installed) = self
      .store
      .get_or_insert_with(key, &mut || Arc::new(Computation::new()));
    if installed {
      Metrics::bump(&self.metrics.misses);
    } else {
      Metrics::bump(&self.metrics.hits);
      tracing::trace!("joined an existing computation");
    }
    (computation, installed)
  }

  /// Hands the builder's future to `spawner`, detached from every caller.
  ///
  /// The spawned task settles `computation` when the future finishes. If the
  /// executor drops the task first, the computation settles as cancelled.
  pub(crate) fn schedule<Fut>(&self, key: K, computation: Slot<V, E>, future: Fut, spawner: &dyn TaskSpawner)
  where
    Fut: Future<Output = Result<V, E>> + Send + 'static,
  {
    let guard = SettleGuard {
      key: Some(key),
      computation,
      store: self.store.clone(),
      metrics: self.metrics.clone(),
    };
    tracing::debug!("scheduling a new computation");
    spawner.spawn(Box::pin(async move {
      let result = future.await;
      guard.finish(result);
    }));
  }

  /// Removes `computation` from the store, but only if it is still the entry for `key`.
  pub(crate) fn evict_dead(&self, key: &K, computation: &Slot<V, E>) -> bool {
    remove_identical(&*self.store, key, computation)
  }

  /// Consumes one retry from a caller's budget after a cancelled computation.
  pub(crate) fn begin_retry(&self, retries: &mut u32) -> Result<(), Error<E>> {
    if *retries >= self.max_computation_retries {
      tracing::warn!(
        attempts = *retries + 1,
        "computation was cancelled on every attempt, giving up"
      );
      return Err(Error::Cancelled);
    }
    *retries += 1;
    Metrics::bump(&self.metrics.retries);
    tracing::debug!(retry = *retries, "computation was cancelled, retrying");
    Ok(())
  }

  /// Settles a caller's view of a joined outcome.
  ///
  /// `Ok(Some(value))` ends the caller's loop, `Ok(None)` asks for another
  /// attempt, and `Err` is final.
  pub(crate) fn resolve(
    &self,
    key: &K,
    computation: &Slot<V, E>,
    outcome: Outcome<V, E>,
    retries: &mut u32,
  ) -> Result<Option<Arc<V>>, Error<E>> {
    match outcome {
      Outcome::Success(value) => Ok(Some(value)),
      Outcome::Failure(error) => {
        // The settling task already removed it; this covers stores that did not.
        self.evict_dead(key, computation);
        Err(Error::Build(error))
      }
      Outcome::Cancelled => {
        self.evict_dead(key, computation);
        self.begin_retry(retries).map(|()| None)
      }
    }
  }

  /// Looks up a live computation without ever creating one.
  ///
  /// Cancelled entries are removed on sight.
  pub(crate) fn live(&self, key: &K) -> Option<Slot<V, E>> {
    let computation = self.store.get(key)?;
    if computation.is_cancelled() {
      self.evict_dead(key, &computation);
      return None;
    }
    Some(computation)
  }

  pub(crate) fn contains(&self, key: &K) -> bool {
    self.store.peek(key).is_some_and(|computation| !computation.is_dead())
  }

  pub(crate) fn put(&self, key: K, value: V) {
    self.store.insert(key, Arc::new(Computation::ready(Arc::new(value))));
    Metrics::bump(&self.metrics.inserts);
  }

  pub(crate) fn invalidate(&self, key: &K) -> bool {
    let removed = self.store.remove(key).is_some();
    if removed {
      Metrics::bump(&self.metrics.invalidations);
    }
    removed
  }

  pub(crate) fn invalidate_all(&self) {
    let removed = self.store.clear();
    self
      .metrics
      .invalidations
      .fetch_add(removed as u64, Ordering::Relaxed);
  }

  pub(crate) fn entries(&self) -> Vec<(K, Slot<V, E>)> {
    self.store.entries()
  }

  pub(crate) fn pending_map(&self) -> HashMap<K, Slot<V, E>> {
    self.store.entries().into_iter().collect()
  }

  pub(crate) fn len(&self) -> usize {
    self.store.len()
  }

  pub(crate) fn is_empty(&self) -> bool {
    self.store.is_empty()
  }

  pub(crate) fn clean_up(&self) -> usize {
    purge_dead(&*self.store, &self.metrics)
  }

  pub(crate) fn snapshot(&self) -> MetricsSnapshot {
    self.metrics.snapshot(self.store.len(), self.store.evictions())
  }
}

fn remove_identical<K, V, E>(store: &dyn BackingStore<K, Slot<V, E>>, key: &K, computation: &Slot<V, E>) -> bool {
  store
    .remove_if(key, &mut |current| Arc::ptr_eq(current, computation))
    .is_some()
}

/// Removes every dead entry, then lets the store run its own maintenance.
///
/// Returns the number of dead entries removed.
pub(crate) fn purge_dead<K, V, E>(store: &dyn BackingStore<K, Slot<V, E>>, metrics: &Metrics) -> usize {
  let mut purged = 0;
  for (key, computation) in store.entries() {
    if computation.is_dead() && remove_identical(store, &key, &computation) {
      purged += 1;
    }
  }
  metrics.dead_purged.fetch_add(purged as u64, Ordering::Relaxed);
  store.run_maintenance();
  if purged > 0 {
    tracing::debug!(purged, "housekeeping removed dead entries");
  }
  purged
}

/// Owned by a spawned computation. Settles it exactly once, even if the task is dropped.
struct SettleGuard<K, V, E> {
  // `None` once the builder has returned.
  key: Option<K>,
  computation: Slot<V, E>,
  store: SharedStore<K, V, E>,
  metrics: Arc<Metrics>,
}

impl<K, V, E> SettleGuard<K, V, E> {
  fn finish(mut self, result: Result<V, E>) {
    let Some(key) = self.key.take() else {
      return;
    };
    match result {
      Ok(value) => {
        self.computation.settle(Outcome::Success(Arc::new(value)));
      }
      Err(error) => {
        // The entry goes first so no new caller can join a failure.
        remove_identical(&*self.store, &key, &self.computation);
        Metrics::bump(&self.metrics.failures);
        tracing::debug!("computation failed, entry invalidated");
        self.computation.settle(Outcome::Failure(Arc::new(error)));
      }
    }
  }
}

impl<K, V, E> Drop for SettleGuard<K, V, E> {
  fn drop(&mut self) {
    if let Some(key) = self.key.take() {
      remove_identical(&*self.store, &key, &self.computation);
      Metrics::bump(&self.metrics.cancellations);
      tracing::debug!("computation dropped before completion, marked cancelled");
      self.computation.settle(Outcome::Cancelled);
    }
  }
}
