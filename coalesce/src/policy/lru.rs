use super::key_queue::KeyQueue;
use super::EvictionPolicy;

use parking_lot::Mutex;
use std::fmt;
use std::hash::Hash;

/// Evicts the least recently used keys. Reads and writes both count as use.
pub struct Lru<K> {
  recency: Mutex<KeyQueue<K>>,
}

impl<K: Eq + Hash + Clone> Lru<K> {
  pub fn new() -> Self {
    Self {
      recency: Mutex::new(KeyQueue::new()),
    }
  }
}

impl<K: Eq + Hash + Clone> Default for Lru<K> {
  fn default() -> Self {
    Self::new()
  }
}

impl<K> fmt::Debug for Lru<K> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Lru").finish_non_exhaustive()
  }
}

impl<K> EvictionPolicy<K> for Lru<K>
where
  K: Eq + Hash + Clone + Send + Sync,
{
  fn on_insert(&self, key: &K) {
    self.recency.lock().touch(key);
  }

  fn on_access(&self, key: &K) {
    self.recency.lock().refresh(key);
  }

  fn on_remove(&self, key: &K) {
    self.recency.lock().forget(key);
  }

  fn evict(&self, count: usize) -> Vec<K> {
    self.recency.lock().drain_oldest(count)
  }

  fn clear(&self) {
    self.recency.lock().clear();
  }
}
