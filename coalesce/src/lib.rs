//! A concurrent coalescing cache: at most one in-flight computation per key,
//! with the result shared by every caller that asked for it.
//!
//! # Features
//! - **Request Coalescing**: Concurrent `get` calls for the same key join a
//!   single computation instead of each running the builder.
//! - **Failure Awareness**: A failed computation is never cached. Every caller
//!   joined to it receives the identical error, and the next call retries.
//! - **Cancellation Safety**: Dropping a caller's future never stops the
//!   computation. If the executor drops the computation itself, callers start
//!   a fresh one, up to a configurable retry limit.
//! - **Sync & Async**: `CoalescingCache` and `BlockingCache` share state, so
//!   threads and tasks coalesce with each other.
//! - **Pluggable Storage**: Any `BackingStore` works; the default
//!   `ShardedStore` is lock-striped with optional LRU or FIFO capacity.
//!
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use fibre_coalesce::CacheBuilder;
//!
//! let cache = CacheBuilder::<u64, String, std::io::Error>::new()
//!   .capacity(10_000)
//!   .build()?;
//!
//! let value = cache
//!   .get(7, |id| async move { Ok(format!("user-{}", id)) })
//!   .await?;
//! assert_eq!(*value, "user-7");
//! # Ok(())
//! # }
//! ```

// Public modules that form the API
pub mod builder;
pub mod computation;
pub mod config;
pub mod error;
pub mod handles;
pub mod metrics;
pub mod policy;
pub mod runtime;
pub mod store;

// Internal, crate-only modules
mod shared;
mod task;

// Re-export the primary user-facing types for convenience
pub use builder::CacheBuilder;
pub use computation::{Computation, Outcome};
pub use config::CacheConfig;
pub use error::{BuildError, Error};
pub use handles::{BlockingCache, CoalescingCache};
pub use metrics::MetricsSnapshot;
pub use policy::{Eviction, EvictionPolicy};
pub use runtime::{TaskSpawner, ThreadSpawner};
#[cfg(feature = "tokio")]
pub use runtime::TokioSpawner;
pub use store::{BackingStore, ShardedStore};
