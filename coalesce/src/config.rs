use crate::policy::Eviction;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Plain scalar settings for a cache, suitable for loading from a config file.
///
/// Every field is optional; missing fields keep the builder's defaults.
/// Convert with [`CacheBuilder::from_config`](crate::CacheBuilder::from_config).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CacheConfig {
  /// Maximum number of entries. `None` means unbounded.
  pub capacity: Option<u64>,
  pub shards: Option<usize>,
  pub eviction: Eviction,
  pub max_computation_retries: Option<u32>,
  /// Janitor interval in milliseconds. `None` disables the janitor.
  pub maintenance_interval_ms: Option<u64>,
}
