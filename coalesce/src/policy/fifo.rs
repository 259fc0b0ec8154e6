use super::key_queue::KeyQueue;
use super::EvictionPolicy;

use parking_lot::Mutex;
use std::fmt;
use std::hash::Hash;

/// Evicts keys in insertion order, ignoring reads.
///
/// Overwriting a key keeps its original position in the queue.
pub struct Fifo<K> {
  arrivals: Mutex<KeyQueue<K>>,
}

impl<K: Eq + Hash + Clone> Fifo<K> {
  pub fn new() -> Self {
    Self {
      arrivals: Mutex::new(KeyQueue::new()),
    }
  }
}

impl<K: Eq + Hash + Clone> Default for Fifo<K> {
  fn default() -> Self {
    Self::new()
  }
}

impl<K> fmt::Debug for Fifo<K> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Fifo").finish_non_exhaustive()
  }
}

impl<K> EvictionPolicy<K> for Fifo<K>
where
  K: Eq + Hash + Clone + Send + Sync,
{
  fn on_insert(&self, key: &K) {
    self.arrivals.lock().enqueue(key);
  }

  fn on_access(&self, _key: &K) {}

  fn on_remove(&self, key: &K) {
    self.arrivals.lock().forget(key);
  }

  fn evict(&self, count: usize) -> Vec<K> {
    self.arrivals.lock().drain_oldest(count)
  }

  fn clear(&self) {
    self.arrivals.lock().clear();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_reads_do_not_reorder() {
    let policy = Fifo::<i32>::new();
    policy.on_insert(&1);
    policy.on_insert(&2);
    policy.on_access(&1);
    assert_eq!(policy.evict(1), vec![1]);
  }

  #[test]
  fn test_overwrite_keeps_arrival_order() {
    let policy = Fifo::<i32>::new();
    policy.on_insert(&1);
    policy.on_insert(&2);
    policy.on_insert(&1);
    assert_eq!(policy.evict(2), vec![1, 2]);
  }

  #[test]
  fn test_remove_then_reinsert_moves_to_back() {
    let policy = Fifo::<i32>::new();
    policy.on_insert(&1);
    policy.on_insert(&2);
    policy.on_remove(&1);
    policy.on_insert(&1);
    assert_eq!(policy.evict(2), vec![2, 1]);
  }
}
