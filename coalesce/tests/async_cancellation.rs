mod common;

use common::{DroppingSpawner, LeakyStore, TestError};
use fibre_coalesce::{CacheBuilder, Error, TokioSpawner};
use std::sync::{
  atomic::{AtomicBool, AtomicUsize, Ordering},
  Arc,
};
use std::thread;
use std::time::Duration;

fn counting_builder(
  build_count: &Arc<AtomicUsize>,
) -> impl Fn(i32) -> std::future::Ready<Result<String, TestError>> + Clone {
  let build_count = build_count.clone();
  move |key| {
    build_count.fetch_add(1, Ordering::SeqCst);
    std::future::ready(Ok(format!("value-{}", key)))
  }
}

#[tokio::test]
async fn test_cancelled_computation_is_retried() {
  let build_count = Arc::new(AtomicUsize::new(0));
  let spawner = Arc::new(DroppingSpawner::dropping_first(1));
  let cache = CacheBuilder::<i32, String, TestError>::new()
    .spawner(spawner.clone())
    .build()
    .unwrap();

  let value = cache.get(1, counting_builder(&build_count)).await.unwrap();

  assert_eq!(*value, "value-1");
  assert_eq!(spawner.dropped(), 1);
  assert_eq!(build_count.load(Ordering::SeqCst), 2, "One dropped attempt plus one retry");

  let metrics = cache.metrics();
  assert_eq!(metrics.cancellations, 1);
  assert_eq!(metrics.retries, 1);
  assert!(cache.contains(&1));
}

#[tokio::test]
async fn test_retry_budget_is_bounded() {
  let build_count = Arc::new(AtomicUsize::new(0));
  let cache = CacheBuilder::<i32, String, TestError>::new()
    .spawner(Arc::new(DroppingSpawner::dropping_all()))
    .max_computation_retries(2)
    .build()
    .unwrap();

  let result = cache.get(1, counting_builder(&build_count)).await;

  assert!(matches!(result, Err(Error::Cancelled)));
  assert_eq!(build_count.load(Ordering::SeqCst), 3, "Initial attempt plus two retries");
  let metrics = cache.metrics();
  assert_eq!(metrics.retries, 2);
  assert_eq!(metrics.cancellations, 3);
  assert!(cache.is_empty(), "Cancelled computations must not stay cached");
}

#[test]
fn test_runtime_shutdown_cancels_pending_computation() {
  let runtime = tokio::runtime::Builder::new_multi_thread()
    .worker_threads(1)
    .build()
    .unwrap();
  let cache = CacheBuilder::<i32, String, TestError>::new()
    .spawner(Arc::new(TokioSpawner::from_handle(runtime.handle().clone())))
    .max_computation_retries(0)
    .build()
    .unwrap();

  let waiter = {
    let cache = cache.clone();
    thread::spawn(move || {
      futures_executor::block_on(cache.get(1, |_key| std::future::pending::<Result<String, TestError>>()))
    })
  };

  while !cache.contains(&1) {
    thread::sleep(Duration::from_millis(5));
  }
  runtime.shutdown_background();

  let result = waiter.join().unwrap();
  assert!(matches!(result, Err(Error::Cancelled)));
  assert!(!cache.contains(&1));
  assert_eq!(cache.metrics().cancellations, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_builder_panic_is_treated_as_cancellation() {
  let build_count = Arc::new(AtomicUsize::new(0));
  let cache = CacheBuilder::<i32, String, TestError>::new().build().unwrap();

  let builder = {
    let build_count = build_count.clone();
    move |key: i32| {
      let attempt = build_count.fetch_add(1, Ordering::SeqCst);
      async move {
        if attempt == 0 {
          panic!("builder blew up");
        }
        Ok::<_, TestError>(format!("value-{}", key))
      }
    }
  };

  let value = cache.get(4, builder).await.unwrap();
  assert_eq!(*value, "value-4");
  assert_eq!(build_count.load(Ordering::SeqCst), 2);
  assert_eq!(cache.metrics().cancellations, 1);
}

#[tokio::test]
async fn test_dead_entries_are_replaced_and_purged() {
  let leaking = Arc::new(AtomicBool::new(true));
  let build_count = Arc::new(AtomicUsize::new(0));
  let cache = CacheBuilder::<i32, String, TestError>::new()
    .backing_store(LeakyStore::new(leaking.clone()))
    .spawner(Arc::new(DroppingSpawner::dropping_first(2)))
    .max_computation_retries(1)
    .build()
    .unwrap();

  // Both attempts leave a cancelled entry behind that the store refuses to drop.
  for key in [1, 2] {
    let result = cache.get(key, counting_builder(&build_count)).await;
    assert!(matches!(result, Err(Error::Cancelled)));
  }
  assert_eq!(cache.len(), 2);
  assert!(!cache.contains(&1), "A cancelled entry is never reported as present");

  leaking.store(false, Ordering::SeqCst);

  // Found dead on fetch: removed, then computed afresh.
  let value = cache.get(2, counting_builder(&build_count)).await.unwrap();
  assert_eq!(*value, "value-2");
  assert!(cache.contains(&2));

  // Key 1 had no traffic; housekeeping removes it.
  assert_eq!(cache.clean_up(), 1);
  assert_eq!(cache.len(), 1);
  assert_eq!(cache.metrics().dead_purged, 1);
  assert_eq!(build_count.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_janitor_purges_dead_entries() {
  let leaking = Arc::new(AtomicBool::new(true));
  let build_count = Arc::new(AtomicUsize::new(0));
  let cache = CacheBuilder::<i32, String, TestError>::new()
    .backing_store(LeakyStore::new(leaking.clone()))
    .spawner(Arc::new(DroppingSpawner::dropping_first(1)))
    .max_computation_retries(0)
    .maintenance_interval(Duration::from_millis(20))
    .build()
    .unwrap();

  let result = cache.get(1, counting_builder(&build_count)).await;
  assert!(matches!(result, Err(Error::Cancelled)));
  assert_eq!(cache.len(), 1);

  leaking.store(false, Ordering::SeqCst);
  tokio::time::sleep(Duration::from_millis(200)).await;

  assert!(cache.is_empty(), "Janitor should have removed the dead entry");
  assert!(cache.metrics().dead_purged >= 1);
}

fn runtime_backed_cache(runtime: &tokio::runtime::Runtime, retries: u32) -> fibre_coalesce::CoalescingCache<i32, String, TestError> {
  CacheBuilder::<i32, String, TestError>::new()
    .spawner(Arc::new(TokioSpawner::from_handle(runtime.handle().clone())))
    .max_computation_retries(retries)
    .build()
    .unwrap()
}

#[test]
fn test_late_cancellation_keeps_newer_put() {
  let runtime = tokio::runtime::Builder::new_multi_thread()
    .worker_threads(1)
    .build()
    .unwrap();
  let cache = runtime_backed_cache(&runtime, 1);

  let waiter = {
    let cache = cache.clone();
    thread::spawn(move || {
      futures_executor::block_on(cache.get(1, |_key| std::future::pending::<Result<String, TestError>>()))
    })
  };
  while !cache.contains(&1) {
    thread::sleep(Duration::from_millis(5));
  }

  cache.put(1, "fresh".to_string());
  runtime.shutdown_background();

  // The waiter's retry lands on the stored value instead of building again.
  let value = waiter.join().unwrap().unwrap();
  assert_eq!(*value, "fresh");
  assert!(cache.contains(&1), "The cancelled computation must only remove itself");
  assert_eq!(cache.metrics().cancellations, 1);
}

#[test]
fn test_get_if_present_reports_cancellation_as_absent() {
  let runtime = tokio::runtime::Builder::new_multi_thread()
    .worker_threads(1)
    .build()
    .unwrap();
  let cache = runtime_backed_cache(&runtime, 0);

  let owner = {
    let cache = cache.clone();
    thread::spawn(move || {
      futures_executor::block_on(cache.get(1, |_key| std::future::pending::<Result<String, TestError>>()))
    })
  };
  while !cache.contains(&1) {
    thread::sleep(Duration::from_millis(5));
  }

  let observer = {
    let cache = cache.clone();
    thread::spawn(move || futures_executor::block_on(cache.get_if_present(&1)))
  };
  thread::sleep(Duration::from_millis(20));
  runtime.shutdown_background();

  assert!(observer.join().unwrap().unwrap().is_none());
  assert!(owner.join().unwrap().unwrap_err().is_cancelled());
  assert!(cache.is_empty());
}
