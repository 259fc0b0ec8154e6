#![allow(dead_code)]

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use fibre_coalesce::{BackingStore, BlockingCache, CacheBuilder, CoalescingCache, ShardedStore, TaskSpawner, TokioSpawner};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestError(pub String);

impl fmt::Display for TestError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "test error: {}", self.0)
  }
}

impl std::error::Error for TestError {}

pub fn build_test_cache(shards: usize) -> CoalescingCache<i32, String, TestError> {
  CacheBuilder::default().shards(shards).build().unwrap()
}

pub fn build_test_blocking_cache(shards: usize) -> BlockingCache<i32, String, TestError> {
  CacheBuilder::default().shards(shards).build_blocking().unwrap()
}

// A spawner that throws away the first `drops` futures it is handed, the way a
// shutting down runtime would, and hands the rest to the current Tokio runtime.
pub struct DroppingSpawner {
  remaining_drops: AtomicUsize,
  dropped: AtomicUsize,
  inner: Option<TokioSpawner>,
}

impl DroppingSpawner {
  pub fn dropping_first(drops: usize) -> Self {
    Self {
      remaining_drops: AtomicUsize::new(drops),
      dropped: AtomicUsize::new(0),
      inner: TokioSpawner::try_current(),
    }
  }

  pub fn dropping_all() -> Self {
    Self::dropping_first(usize::MAX)
  }

  pub fn dropped(&self) -> usize {
    self.dropped.load(Ordering::SeqCst)
  }
}

impl TaskSpawner for DroppingSpawner {
  fn spawn(&self, future: Pin<Box<dyn Future<Output = ()> + Send>>) {
    let should_drop = self
      .remaining_drops
      .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
      .is_ok();
    if should_drop {
      self.dropped.fetch_add(1, Ordering::SeqCst);
      drop(future);
      return;
    }
    match &self.inner {
      Some(spawner) => spawner.spawn(future),
      None => drop(future),
    }
  }
}

// A store that ignores conditional removals while `leaking` is set, so dead
// entries stay behind the way they would with a store that missed a removal.
pub struct LeakyStore<C> {
  inner: ShardedStore<i32, C>,
  pub leaking: Arc<AtomicBool>,
}

impl<C> LeakyStore<C> {
  pub fn new(leaking: Arc<AtomicBool>) -> Self {
    Self {
      inner: ShardedStore::unbounded(4, ahash::RandomState::new()),
      leaking,
    }
  }
}

impl<C: Clone + Send + Sync> BackingStore<i32, C> for LeakyStore<C> {
  fn get_or_insert_with(&self, key: &i32, make: &mut dyn FnMut() -> C) -> (C, bool) {
    self.inner.get_or_insert_with(key, make)
  }

  fn get(&self, key: &i32) -> Option<C> {
    self.inner.get(key)
  }

  fn peek(&self, key: &i32) -> Option<C> {
    self.inner.peek(key)
  }

  fn insert(&self, key: i32, entry: C) -> Option<C> {
    self.inner.insert(key, entry)
  }

  fn remove(&self, key: &i32) -> Option<C> {
    self.inner.remove(key)
  }

  fn remove_if(&self, key: &i32, predicate: &mut dyn FnMut(&C) -> bool) -> Option<C> {
    if self.leaking.load(Ordering::SeqCst) {
      return None;
    }
    self.inner.remove_if(key, predicate)
  }

  fn clear(&self) -> usize {
    self.inner.clear()
  }

  fn entries(&self) -> Vec<(i32, C)> {
    self.inner.entries()
  }

  fn len(&self) -> usize {
    self.inner.len()
  }

  fn run_maintenance(&self) {
    self.inner.run_maintenance()
  }
}
