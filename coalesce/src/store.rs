use crate::policy::null::NullPolicy;
use crate::policy::{Eviction, EvictionPolicy};

use core::fmt;
use std::collections::HashMap;
use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_utils::CachePadded;
use parking_lot::RwLock;

/// The storage contract a coalescing cache is layered on.
///
/// `C` is the stored handle type; the coalescing cache stores
/// `Arc<Computation<V, E>>`. Implementations must be linearizable per key:
/// `get_or_insert_with` installs at most one entry among all concurrent
/// callers, and every loser receives the winner's handle.
pub trait BackingStore<K, C>: Send + Sync {
  /// Returns the entry for `key`, installing the one produced by `make` if absent.
  ///
  /// The second element is `true` when this call performed the install.
  /// `make` must be cheap; it may run while the store holds internal locks.
  fn get_or_insert_with(&self, key: &K, make: &mut dyn FnMut() -> C) -> (C, bool);

  /// Returns the entry for `key`. Counts as a read for the eviction policy.
  fn get(&self, key: &K) -> Option<C>;

  /// Returns the entry for `key` without informing the eviction policy.
  ///
  /// Stores without a policy can rely on the default, which calls `get`.
  fn peek(&self, key: &K) -> Option<C> {
    self.get(key)
  }

  /// Installs `entry`, returning the entry it replaced.
  fn insert(&self, key: K, entry: C) -> Option<C>;

  fn remove(&self, key: &K) -> Option<C>;

  /// Removes the entry for `key` only if `predicate` accepts it.
  fn remove_if(&self, key: &K, predicate: &mut dyn FnMut(&C) -> bool) -> Option<C>;

  /// Removes every entry, returning how many were removed.
  fn clear(&self) -> usize;

  /// A point-in-time copy of every entry.
  fn entries(&self) -> Vec<(K, C)>;

  fn len(&self) -> usize;

  fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Runs the store's own policy-driven cleanup, such as capacity eviction.
  fn run_maintenance(&self);

  /// The number of entries this store has evicted on its own.
  fn evictions(&self) -> u64 {
    0
  }
}

/// A helper function to hash a key using a `BuildHasher`.
#[inline]
pub(crate) fn hash_key<K: Hash + ?Sized, H: BuildHasher>(hasher: &H, key: &K) -> u64 {
  let mut state = hasher.build_hasher();
  key.hash(&mut state);
  state.finish()
}

/// One independently locked partition of the store.
struct Shard<K, C, H> {
  map: RwLock<HashMap<K, C, H>>,
  policy: Arc<dyn EvictionPolicy<K>>,
  // This shard's share of the store capacity, at least 1.
  capacity: usize,
}

/// A store that is partitioned into multiple, independently locked shards.
///
/// Operations on different keys are unlikely to contend for the same lock.
/// When bounded, capacity is an entry count split exactly across shards and
/// each shard evicts through its own policy instance as soon as it overflows.
pub struct ShardedStore<K, C, H = ahash::RandomState> {
  shards: Box<[CachePadded<Shard<K, C, H>>]>,
  hasher: H,
  capacity: Option<usize>,
  evictions: AtomicU64,
}

impl<K, C, H> fmt::Debug for ShardedStore<K, C, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ShardedStore")
      .field("num_shards", &self.shards.len())
      .field("capacity", &self.capacity)
      .field("evictions", &self.evictions.load(Ordering::Relaxed))
      .finish()
  }
}

impl<K, C, H> ShardedStore<K, C, H>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  H: BuildHasher + Clone,
{
  /// Creates a store that never evicts.
  pub fn unbounded(num_shards: usize, hasher: H) -> Self {
    Self::with_policies(num_shards, None, hasher, || {
      Arc::new(NullPolicy) as Arc<dyn EvictionPolicy<K>>
    })
  }

  /// Creates a store holding at most `capacity` entries.
  pub fn bounded(num_shards: usize, capacity: usize, hasher: H, eviction: Eviction) -> Self {
    Self::with_policies(num_shards, Some(capacity), hasher, || eviction.instantiate())
  }

  /// Creates a store with a custom policy per shard.
  ///
  /// `num_shards` is rounded up to a power of two. `capacity` of `None` means unbounded.
  /// A bounded store never has more shards than the largest power of two not
  /// above `capacity`, and the shard shares add up to exactly `capacity`.
  pub fn with_policies<F>(num_shards: usize, capacity: Option<usize>, hasher: H, mut make_policy: F) -> Self
  where
    F: FnMut() -> Arc<dyn EvictionPolicy<K>>,
  {
    let capacity = capacity.map(|capacity| capacity.max(1));
    let mut num_shards = num_shards.max(1).next_power_of_two();
    if let Some(capacity) = capacity {
      // Largest power of two <= capacity, so every shard holds at least one entry.
      let fitting = 1usize << (usize::BITS - 1 - capacity.leading_zeros());
      num_shards = num_shards.min(fitting);
    }

    let mut shards = Vec::with_capacity(num_shards);
    for index in 0..num_shards {
      let shard_capacity = match capacity {
        Some(capacity) => capacity / num_shards + usize::from(index < capacity % num_shards),
        None => usize::MAX,
      };
      shards.push(CachePadded::new(Shard {
        map: RwLock::new(HashMap::with_hasher(hasher.clone())),
        policy: make_policy(),
        capacity: shard_capacity,
      }));
    }

    Self {
      shards: shards.into_boxed_slice(),
      hasher,
      capacity,
      evictions: AtomicU64::new(0),
    }
  }

  /// The total entry limit, or `None` when unbounded.
  pub fn capacity(&self) -> Option<usize> {
    self.capacity
  }

  pub fn num_shards(&self) -> usize {
    self.shards.len()
  }

  #[inline]
  fn shard_for(&self, key: &K) -> &Shard<K, C, H> {
    let hash = hash_key(&self.hasher, key);
    // Shard count is a power of two.
    let index = hash as usize & (self.shards.len() - 1);
    &self.shards[index]
  }

  /// Evicts policy victims until the shard is back within its share of capacity.
  fn enforce_capacity(&self, shard: &Shard<K, C, H>, map: &mut HashMap<K, C, H>) {
    if map.len() <= shard.capacity {
      return;
    }
    let overflow = map.len() - shard.capacity;
    let mut evicted = 0;
    for victim in shard.policy.evict(overflow) {
      if map.remove(&victim).is_some() {
        evicted += 1;
      }
    }
    if evicted > 0 {
      self.evictions.fetch_add(evicted, Ordering::Relaxed);
      tracing::trace!(evicted, "shard over capacity, evicted entries");
    }
  }
}

impl<K, C, H> BackingStore<K, C> for ShardedStore<K, C, H>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  C: Clone + Send + Sync,
  H: BuildHasher + Clone + Send + Sync,
{
  fn get_or_insert_with(&self, key: &K, make: &mut dyn FnMut() -> C) -> (C, bool) {
    let shard = self.shard_for(key);

    // Optimistic read lock for the common hit path.
    if let Some(existing) = shard.map.read().get(key) {
      shard.policy.on_access(key);
      return (existing.clone(), false);
    }

    let mut guard = shard.map.write();
    // Another caller may have installed it between the two locks.
    if let Some(existing) = guard.get(key) {
      shard.policy.on_access(key);
      return (existing.clone(), false);
    }

    let entry = make();
    guard.insert(key.clone(), entry.clone());
    shard.policy.on_insert(key);
    self.enforce_capacity(shard, &mut guard);
    (entry, true)
  }

  fn get(&self, key: &K) -> Option<C> {
    let shard = self.shard_for(key);
    let guard = shard.map.read();
    let entry = guard.get(key).cloned();
    if entry.is_some() {
      shard.policy.on_access(key);
    }
    entry
  }

  fn peek(&self, key: &K) -> Option<C> {
    self.shard_for(key).map.read().get(key).cloned()
  }

  fn insert(&self, key: K, entry: C) -> Option<C> {
    let shard = self.shard_for(&key);
    let mut guard = shard.map.write();
    shard.policy.on_insert(&key);
    let old_entry = guard.insert(key, entry);
    self.enforce_capacity(shard, &mut guard);
    old_entry
  }

  fn remove(&self, key: &K) -> Option<C> {
    let shard = self.shard_for(key);
    let mut guard = shard.map.write();
    let removed = guard.remove(key);
    if removed.is_some() {
      shard.policy.on_remove(key);
    }
    removed
  }

  fn remove_if(&self, key: &K, predicate: &mut dyn FnMut(&C) -> bool) -> Option<C> {
    let shard = self.shard_for(key);
    let mut guard = shard.map.write();
    if !guard.get(key).is_some_and(|entry| predicate(entry)) {
      return None;
    }
    shard.policy.on_remove(key);
    guard.remove(key)
  }

  /// A "stop-the-world" clear: every shard lock is held until all are empty.
  fn clear(&self) -> usize {
    let mut guards = self.shards.iter().map(|shard| shard.map.write()).collect::<Vec<_>>();
    let mut removed = 0;
    for (shard, guard) in self.shards.iter().zip(guards.iter_mut()) {
      removed += guard.len();
      guard.clear();
      shard.policy.clear();
    }
    removed
  }

  fn entries(&self) -> Vec<(K, C)> {
    let mut entries = Vec::new();
    for shard in self.shards.iter() {
      let guard = shard.map.read();
      entries.extend(guard.iter().map(|(key, entry)| (key.clone(), entry.clone())));
    }
    entries
  }

  fn len(&self) -> usize {
    self.shards.iter().map(|shard| shard.map.read().len()).sum()
  }

  fn run_maintenance(&self) {
    for shard in self.shards.iter() {
      let mut guard = shard.map.write();
      self.enforce_capacity(shard, &mut guard);
    }
  }

  fn evictions(&self) -> u64 {
    self.evictions.load(Ordering::Relaxed)
  }
}
