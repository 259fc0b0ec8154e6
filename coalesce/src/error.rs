use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Errors that can occur when building a cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
  /// The cache was configured with a capacity of zero, which is not allowed
  /// for a bounded cache. Use `unbounded()` for an unbounded cache.
  ZeroCapacity,
  /// The cache was configured with zero shards.
  ZeroShards,
  /// A maintenance interval of zero was requested.
  ZeroMaintenanceInterval,
  /// An async cache was built without a spawner and outside of any runtime.
  SpawnerRequired,
  /// The background maintenance thread could not be started.
  JanitorUnavailable(String),
}

impl fmt::Display for BuildError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      BuildError::ZeroCapacity => write!(f, "bounded cache capacity cannot be zero"),
      BuildError::ZeroShards => write!(f, "number of shards cannot be zero"),
      BuildError::ZeroMaintenanceInterval => write!(f, "maintenance interval cannot be zero"),
      BuildError::SpawnerRequired => {
        write!(f, "an async cache needs a TaskSpawner when no Tokio runtime is current")
      }
      BuildError::JanitorUnavailable(reason) => {
        write!(f, "failed to start the maintenance thread: {}", reason)
      }
    }
  }
}

impl std::error::Error for BuildError {}

/// Errors returned to a caller of `get` and friends.
///
/// `E` is the builder's own error type. It is shared behind an `Arc` so that
/// every caller joined to a failed computation receives the identical error.
#[derive(Debug)]
pub enum Error<E> {
  /// The builder failed. The entry was invalidated before this was reported.
  Build(Arc<E>),
  /// This caller's deadline passed. The computation keeps running for others.
  TimedOut(Duration),
  /// The computation was torn down by its executor and the retry budget ran out.
  Cancelled,
}

impl<E> Error<E> {
  /// Returns the builder's error, if this is a build failure.
  pub fn build_error(&self) -> Option<&Arc<E>> {
    match self {
      Error::Build(error) => Some(error),
      _ => None,
    }
  }

  pub fn is_cancelled(&self) -> bool {
    matches!(self, Error::Cancelled)
  }

  pub fn is_timed_out(&self) -> bool {
    matches!(self, Error::TimedOut(_))
  }
}

impl<E> Clone for Error<E> {
  fn clone(&self) -> Self {
    match self {
      Error::Build(error) => Error::Build(error.clone()),
      Error::TimedOut(duration) => Error::TimedOut(*duration),
      Error::Cancelled => Error::Cancelled,
    }
  }
}

impl<E: fmt::Display> fmt::Display for Error<E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Error::Build(error) => write!(f, "computation failed: {}", error),
      Error::TimedOut(duration) => write!(f, "gave up waiting after {:?}", duration),
      Error::Cancelled => write!(f, "computation was cancelled by its executor"),
    }
  }
}

impl<E> std::error::Error for Error<E>
where
  E: std::error::Error + 'static,
{
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    match self {
      Error::Build(error) => Some(&**error),
      _ => None,
    }
  }
}
