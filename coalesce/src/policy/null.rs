use crate::policy::EvictionPolicy;

/// A default "no-op" eviction policy for unbounded stores.
/// It does nothing and never evicts anything.
#[derive(Debug, Default)]
pub struct NullPolicy;

impl<K> EvictionPolicy<K> for NullPolicy
where
  K: Send + Sync,
{
  fn on_insert(&self, _key: &K) {}

  fn on_access(&self, _key: &K) {}

  fn on_remove(&self, _key: &K) {}

  fn evict(&self, _count: usize) -> Vec<K> {
    Vec::new()
  }

  fn clear(&self) {}
}
