use crate::computation::{Computation, Outcome};
use crate::error::Error;
use crate::shared::CacheShared;
use crate::{BlockingCache, MetricsSnapshot};

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
#[cfg(feature = "tokio")]
use std::time::Duration;

use futures_util::future;

// --- CoalescingCache Implementation ---

/// A thread-safe, asynchronous coalescing cache.
///
/// At most one computation runs per key. Every caller asking for that key
/// while it runs joins it and receives the same `Arc<V>` or `Arc<E>`. Failed
/// and cancelled computations are never served; the next caller starts anew.
#[derive(Debug)]
pub struct CoalescingCache<K, V, E> {
  pub(crate) shared: Arc<CacheShared<K, V, E>>,
}

impl<K, V, E> Clone for CoalescingCache<K, V, E> {
  fn clone(&self) -> Self {
    Self {
      shared: self.shared.clone(),
    }
  }
}

impl<K, V, E> CoalescingCache<K, V, E>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  E: Send + Sync + 'static,
{
  /// Converts this cache into a `BlockingCache` sharing the same state.
  /// This is a zero-cost conversion.
  pub fn to_blocking(&self) -> BlockingCache<K, V, E> {
    BlockingCache {
      shared: self.shared.clone(),
    }
  }

  pub fn metrics(&self) -> MetricsSnapshot {
    self.shared.snapshot()
  }

  /// Returns the value for `key`, computing it with `builder` if no live
  /// computation exists.
  ///
  /// The builder's future runs on the cache's spawner, detached from this
  /// call: dropping the returned future only stops this caller from waiting.
  /// If the executor drops the computation, the call starts a fresh one, up to
  /// the configured retry limit.
  pub async fn get<F, Fut>(&self, key: K, builder: F) -> Result<Arc<V>, Error<E>>
  where
    F: Fn(K) -> Fut,
    Fut: Future<Output = Result<V, E>> + Send + 'static,
  {
    let mut retries = 0;
    loop {
      let (computation, installed) = self.shared.claim(&key);
      if installed {
        self.shared.schedule(
          key.clone(),
          computation.clone(),
          builder(key.clone()),
          &*self.shared.spawner,
        );
      } else if computation.is_cancelled() {
        self.shared.evict_dead(&key, &computation);
        self.shared.begin_retry(&mut retries)?;
        continue;
      }

      let outcome = computation.wait().await;
      if let Some(value) = self.shared.resolve(&key, &computation, outcome, &mut retries)? {
        return Ok(value);
      }
    }
  }

  /// Like `get`, but this caller gives up after `timeout`.
  ///
  /// Expiry returns `Error::TimedOut` to this caller only. The computation
  /// keeps running and stays cached for everyone else.
  #[cfg(feature = "tokio")]
  pub async fn get_with_timeout<F, Fut>(&self, key: K, timeout: Duration, builder: F) -> Result<Arc<V>, Error<E>>
  where
    F: Fn(K) -> Fut,
    Fut: Future<Output = Result<V, E>> + Send + 'static,
  {
    match tokio::time::timeout(timeout, self.get(key, builder)).await {
      Ok(result) => result,
      Err(_) => {
        crate::metrics::Metrics::bump(&self.shared.metrics.timeouts);
        tracing::debug!(?timeout, "caller timed out waiting for a computation");
        Err(Error::TimedOut(timeout))
      }
    }
  }

  /// Waits for an existing live computation, never starting one.
  ///
  /// Returns `Ok(None)` if there is none, or if it turns out to be cancelled.
  pub async fn get_if_present(&self, key: &K) -> Result<Option<Arc<V>>, Error<E>> {
    let computation = match self.shared.live(key) {
      Some(computation) => computation,
      None => return Ok(None),
    };
    match computation.wait().await {
      Outcome::Success(value) => Ok(Some(value)),
      Outcome::Failure(error) => {
        self.shared.evict_dead(key, &computation);
        Err(Error::Build(error))
      }
      Outcome::Cancelled => {
        self.shared.evict_dead(key, &computation);
        Ok(None)
      }
    }
  }

  /// Returns `true` if `key` has a pending or successful computation.
  pub fn contains(&self, key: &K) -> bool {
    self.shared.contains(key)
  }

  /// Installs an already computed value, replacing any existing entry.
  pub fn put(&self, key: K, value: V) {
    self.shared.put(key, value);
  }

  /// Removes the entry for `key`.
  ///
  /// A computation that is still running is not stopped. Callers already
  /// joined to it still receive its outcome; later callers start a new one.
  pub fn invalidate(&self, key: &K) -> bool {
    self.shared.invalidate(key)
  }

  /// Removes multiple entries from the cache.
  pub fn invalidate_many<I, Q>(&self, keys: I)
  where
    I: IntoIterator<Item = Q>,
    K: From<Q>,
  {
    for key in keys.into_iter().map(K::from) {
      self.shared.invalidate(&key);
    }
  }

  /// Removes every entry from the cache.
  pub fn invalidate_all(&self) {
    self.shared.invalidate_all();
  }

  /// Waits for every current entry and returns the successful values.
  ///
  /// Failed and cancelled computations are left out. The cache is not modified.
  pub async fn as_map(&self) -> HashMap<K, Arc<V>> {
    let entries = self.shared.entries();
    let joins = entries
      .iter()
      .map(|(key, computation)| async move { (key, computation.wait().await) });

    future::join_all(joins)
      .await
      .into_iter()
      .filter_map(|(key, outcome)| match outcome {
        Outcome::Success(value) => Some((key.clone(), value)),
        _ => None,
      })
      .collect()
  }

  /// Returns the computation handle of every current entry, settled or not.
  pub fn as_pending_map(&self) -> HashMap<K, Arc<Computation<V, E>>> {
    self.shared.pending_map()
  }

  /// Removes dead entries and runs the backing store's maintenance.
  ///
  /// Returns the number of dead entries removed.
  pub fn clean_up(&self) -> usize {
    self.shared.clean_up()
  }

  /// The number of entries, including pending and not yet purged dead ones.
  pub fn len(&self) -> usize {
    self.shared.len()
  }

  pub fn is_empty(&self) -> bool {
    self.shared.is_empty()
  }
}
