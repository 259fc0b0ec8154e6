use crate::error::BuildError;
use crate::metrics::Metrics;
use crate::shared::{purge_dead, SharedStore};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// The background thread that periodically purges dead entries and runs the
/// backing store's maintenance.
pub(crate) struct Janitor {
  handle: JoinHandle<()>,
  stop_flag: Arc<AtomicBool>,
}

impl Janitor {
  /// Spawns a new janitor thread that ticks every `tick_interval`.
  pub(crate) fn spawn<K, V, E>(
    store: SharedStore<K, V, E>,
    metrics: Arc<Metrics>,
    tick_interval: Duration,
  ) -> Result<Self, BuildError>
  where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
    E: Send + Sync + 'static,
  {
    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_clone = stop_flag.clone();

    let handle = thread::Builder::new()
      .name("fibre-coalesce-janitor".to_string())
      .spawn(move || {
        tracing::debug!(?tick_interval, "janitor started");
        loop {
          let tick_start = Instant::now();
          // Sleep out the rest of the tick; `stop` unparks us early.
          while let Some(remaining) = tick_interval.checked_sub(tick_start.elapsed()) {
            if stop_clone.load(Ordering::Acquire) {
              tracing::debug!("janitor stopped");
              return;
            }
            thread::park_timeout(remaining);
          }
          if stop_clone.load(Ordering::Acquire) {
            tracing::debug!("janitor stopped");
            return;
          }
          purge_dead(&*store, &metrics);
        }
      })
      .map_err(|error| BuildError::JanitorUnavailable(error.to_string()))?;

    Ok(Self { handle, stop_flag })
  }

  /// Signals the janitor thread to stop and waits for it to exit.
  pub(crate) fn stop(self) {
    self.stop_flag.store(true, Ordering::Release);
    self.handle.thread().unpark();
    if self.handle.join().is_err() {
      tracing::warn!("janitor thread panicked");
    }
  }
}
