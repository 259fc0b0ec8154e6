use crate::computation::{Computation, Outcome};
use crate::error::Error;
use crate::metrics::Metrics;
use crate::runtime::ThreadSpawner;
use crate::shared::CacheShared;
use crate::{CoalescingCache, MetricsSnapshot};

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A thread-safe, blocking view of a coalescing cache.
///
/// It shares state with `CoalescingCache`, so blocking threads and async tasks
/// asking for the same key join the same computation. Builders installed from
/// here run on a dedicated thread each.
#[derive(Debug)]
pub struct BlockingCache<K, V, E> {
  pub(crate) shared: Arc<CacheShared<K, V, E>>,
}

impl<K, V, E> Clone for BlockingCache<K, V, E> {
  fn clone(&self) -> Self {
    Self {
      shared: self.shared.clone(),
    }
  }
}

impl<K, V, E> BlockingCache<K, V, E>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  E: Send + Sync + 'static,
{
  /// Converts this cache into an asynchronous `CoalescingCache`.
  /// This is a zero-cost conversion.
  pub fn to_async(&self) -> CoalescingCache<K, V, E> {
    CoalescingCache {
      shared: self.shared.clone(),
    }
  }

  pub fn metrics(&self) -> MetricsSnapshot {
    self.shared.snapshot()
  }

  /// Returns the value for `key`, computing it with `builder` if needed.
  ///
  /// Blocks the current thread until the computation settles.
  pub fn get<F>(&self, key: K, builder: F) -> Result<Arc<V>, Error<E>>
  where
    F: Fn(K) -> Result<V, E> + Send + Sync + 'static,
  {
    self.get_until(key, builder, None)
  }

  /// Like `get`, but this thread stops waiting after `timeout`.
  pub fn get_with_timeout<F>(&self, key: K, timeout: Duration, builder: F) -> Result<Arc<V>, Error<E>>
  where
    F: Fn(K) -> Result<V, E> + Send + Sync + 'static,
  {
    // A deadline past the end of `Instant` can never be reached.
    let deadline = Instant::now().checked_add(timeout).map(|at| (at, timeout));
    self.get_until(key, builder, deadline)
  }

  fn get_until<F>(&self, key: K, builder: F, deadline: Option<(Instant, Duration)>) -> Result<Arc<V>, Error<E>>
  where
    F: Fn(K) -> Result<V, E> + Send + Sync + 'static,
  {
    let builder = Arc::new(builder);
    let mut retries = 0;
    loop {
      let (computation, installed) = self.shared.claim(&key);
      if installed {
        let builder = builder.clone();
        let build_key = key.clone();
        self.shared.schedule(
          key.clone(),
          computation.clone(),
          async move { builder(build_key) },
          &ThreadSpawner,
        );
      } else if computation.is_cancelled() {
        self.shared.evict_dead(&key, &computation);
        self.shared.begin_retry(&mut retries)?;
        continue;
      }

      let outcome = match deadline {
        None => computation.wait_blocking(),
        Some((at, timeout)) => {
          match computation.wait_blocking_timeout(at.saturating_duration_since(Instant::now())) {
            Some(outcome) => outcome,
            None => {
              Metrics::bump(&self.shared.metrics.timeouts);
              tracing::debug!(?timeout, "caller timed out waiting for a computation");
              return Err(Error::TimedOut(timeout));
            }
          }
        }
      };
      if let Some(value) = self.shared.resolve(&key, &computation, outcome, &mut retries)? {
        return Ok(value);
      }
    }
  }

  /// Waits for an existing live computation, never starting one.
  pub fn get_if_present(&self, key: &K) -> Result<Option<Arc<V>>, Error<E>> {
    let computation = match self.shared.live(key) {
      Some(computation) => computation,
      None => return Ok(None),
    };
    match computation.wait_blocking() {
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

  pub fn contains(&self, key: &K) -> bool {
    self.shared.contains(key)
  }

  pub fn put(&self, key: K, value: V) {
    self.shared.put(key, value);
  }

  pub fn invalidate(&self, key: &K) -> bool {
    self.shared.invalidate(key)
  }

  pub fn invalidate_many<I, Q>(&self, keys: I)
  where
    I: IntoIterator<Item = Q>,
    K: From<Q>,
  {
    for key in keys.into_iter().map(K::from) {
      self.shared.invalidate(&key);
    }
  }

  pub fn invalidate_all(&self) {
    self.shared.invalidate_all();
  }

  /// Blocks on every current entry and returns the successful values.
  pub fn as_map(&self) -> HashMap<K, Arc<V>> {
    self
      .shared
      .entries()
      .into_iter()
      .filter_map(|(key, computation)| match computation.wait_blocking() {
        Outcome::Success(value) => Some((key, value)),
        _ => None,
      })
      .collect()
  }

  pub fn as_pending_map(&self) -> HashMap<K, Arc<Computation<V, E>>> {
    self.shared.pending_map()
  }

  pub fn clean_up(&self) -> usize {
    self.shared.clean_up()
  }

  pub fn len(&self) -> usize {
    self.shared.len()
  }

  pub fn is_empty(&self) -> bool {
    self.shared.is_empty()
  }
}
