mod common;

use common::{build_test_blocking_cache, build_test_cache, TestError};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::time::{sleep, Duration};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_as_map_waits_for_pending_and_skips_failures() {
  let cache = build_test_cache(4);
  let gate = Arc::new(Notify::new());

  cache.put(1, "stored".to_string());
  cache
    .get(2, |_key| async { Ok::<_, TestError>("built".to_string()) })
    .await
    .unwrap();
  assert!(cache
    .get(3, |_key| async { Err::<String, _>(TestError("nope".to_string())) })
    .await
    .is_err());

  let pending = {
    let cache = cache.clone();
    let gate = gate.clone();
    tokio::spawn(async move {
      cache
        .get(4, move |_key| {
          let gate = gate.clone();
          async move {
            gate.notified().await;
            Ok::<_, TestError>("late".to_string())
          }
        })
        .await
    })
  };
  sleep(Duration::from_millis(20)).await;

  // Handles come back immediately, the pending one unsettled.
  let handles = cache.as_pending_map();
  assert_eq!(handles.len(), 3);
  assert!(!handles.contains_key(&3), "Failed entries are already gone");
  assert!(handles[&4].is_pending());
  assert!(!handles[&1].is_pending());

  let snapshot = {
    let cache = cache.clone();
    tokio::spawn(async move { cache.as_map().await })
  };
  sleep(Duration::from_millis(20)).await;
  assert!(!snapshot.is_finished(), "as_map should wait for key 4");

  gate.notify_one();
  let map = snapshot.await.unwrap();
  pending.await.unwrap().unwrap();

  assert_eq!(map.len(), 3);
  assert_eq!(*map[&1], "stored");
  assert_eq!(*map[&2], "built");
  assert_eq!(*map[&4], "late");
  assert_eq!(cache.len(), 3, "as_map must not modify the cache");
}

#[test]
fn test_blocking_as_map() {
  let cache = build_test_blocking_cache(2);
  cache.put(1, "a".to_string());
  cache.get(2, |_key| Ok::<_, TestError>("b".to_string())).unwrap();

  let map = cache.as_map();
  assert_eq!(map.len(), 2);
  assert_eq!(*map[&2], "b");
  assert_eq!(cache.as_pending_map().len(), 2);
}
