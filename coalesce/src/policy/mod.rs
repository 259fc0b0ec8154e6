pub mod fifo;
pub mod lru;
mod key_queue;
pub mod null;

use std::hash::Hash;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A trait for implementing the eviction policy of a bounded `ShardedStore`.
///
/// Each shard owns one policy instance. Every method is called while that
/// shard's write lock is held, except `on_access`, which runs under the read
/// lock and must therefore tolerate concurrent calls.
pub trait EvictionPolicy<K>: Send + Sync {
  /// Called when a key is installed or overwritten.
  fn on_insert(&self, key: &K);

  /// Called when an existing key is read.
  fn on_access(&self, key: &K);

  /// Called when a key is removed for any reason other than `evict`.
  fn on_remove(&self, key: &K);

  /// Picks up to `count` victims and stops tracking them.
  fn evict(&self, count: usize) -> Vec<K>;

  /// Clears all state from the policy.
  fn clear(&self);
}

/// The built-in eviction strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Eviction {
  /// Evict the least recently used key.
  #[default]
  Lru,
  /// Evict the oldest inserted key, ignoring reads.
  Fifo,
}

impl Eviction {
  /// Creates a fresh policy instance for one shard.
  pub(crate) fn instantiate<K>(self) -> Arc<dyn EvictionPolicy<K>>
  where
    K: Eq + Hash + Clone + Send + Sync + 'static,
  {
    match self {
      Eviction::Lru => Arc::new(lru::Lru::new()),
      Eviction::Fifo => Arc::new(fifo::Fifo::new()),
    }
  }
}
