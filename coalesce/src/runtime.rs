use std::{future::Future, pin::Pin, thread};

/// A trait for spawning a future onto an asynchronous runtime.
///
/// The spawned future owns its computation. If the runtime drops it before it
/// completes (shutdown, abort, or refusing the task), the computation settles
/// as cancelled and waiting callers retry.
pub trait TaskSpawner: Send + Sync + 'static {
  /// Spawns a type-erased future.
  fn spawn(&self, future: Pin<Box<dyn Future<Output = ()> + Send>>);
}

/// Runs every future to completion on a dedicated OS thread.
///
/// Used when no other executor is available, and for blocking builders.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSpawner;

impl TaskSpawner for ThreadSpawner {
  fn spawn(&self, future: Pin<Box<dyn Future<Output = ()> + Send>>) {
    let spawned = thread::Builder::new()
      .name("fibre-coalesce-compute".to_string())
      .spawn(move || futures_executor::block_on(future));

    // On failure the closure, and with it the future, is dropped here.
    if let Err(error) = spawned {
      tracing::warn!(%error, "failed to start a computation thread");
    }
  }
}

#[cfg(feature = "tokio")]
#[derive(Debug, Clone)]
pub struct TokioSpawner(tokio::runtime::Handle);

#[cfg(feature = "tokio")]
impl TokioSpawner {
  /// Creates a spawner that uses the current Tokio runtime context.
  /// Panics if called outside of a Tokio runtime.
  pub fn new() -> Self {
    Self(tokio::runtime::Handle::current())
  }

  /// Creates a spawner for the current runtime, if there is one.
  pub fn try_current() -> Option<Self> {
    tokio::runtime::Handle::try_current().ok().map(Self)
  }

  /// Creates a spawner that targets a specific runtime.
  pub fn from_handle(handle: tokio::runtime::Handle) -> Self {
    Self(handle)
  }
}

#[cfg(feature = "tokio")]
impl TaskSpawner for TokioSpawner {
  fn spawn(&self, future: Pin<Box<dyn Future<Output = ()> + Send>>) {
    // The JoinHandle is dropped on purpose; the task is detached from every caller.
    drop(self.0.spawn(future));
  }
}
