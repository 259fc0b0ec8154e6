use fibre_coalesce::{CacheBuilder, Error};
use std::fmt;
use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};
use tokio::time::{sleep, Duration};
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
struct DatabaseError(String);

impl fmt::Display for DatabaseError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "database error: {}", self.0)
  }
}

impl std::error::Error for DatabaseError {}

// A simulated database or slow external service.
async fn fetch_from_database(key: i32, query_count: Arc<AtomicUsize>) -> Result<String, DatabaseError> {
  let attempt = query_count.fetch_add(1, Ordering::SeqCst);
  println!(
    "--- Database: query #{} for key {}. Simulating slow query...",
    attempt + 1,
    key
  );
  sleep(Duration::from_millis(300)).await;
  if key < 0 {
    return Err(DatabaseError(format!("no row for key {}", key)));
  }
  Ok(format!("value_for_{}", key))
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fibre_coalesce=debug")))
    .init();

  let query_count = Arc::new(AtomicUsize::new(0));
  let cache = CacheBuilder::<i32, String, DatabaseError>::new()
    .capacity(100)
    .maintenance_interval(Duration::from_secs(1))
    .build()
    .expect("Failed to build coalescing cache");

  let loader = {
    let query_count = query_count.clone();
    move |key: i32| fetch_from_database(key, query_count.clone())
  };

  println!("--- Thundering Herd Demonstration ---");
  println!("Spawning 10 tasks to request the same key '42' at once.\n");

  let mut tasks = Vec::new();
  for i in 0..10 {
    let cache = cache.clone();
    let loader = loader.clone();
    tasks.push(tokio::spawn(async move {
      let value = cache.get(42, loader).await.expect("lookup failed");
      println!("[Task {}] Received value: {}", i, value);
    }));
  }
  for task in tasks {
    task.await.unwrap();
  }
  println!("\nDatabase queries for key 42: {}", query_count.load(Ordering::SeqCst));

  println!("\n--- Failures are shared, then forgotten ---");
  let (first, second) = tokio::join!(cache.get(-1, loader.clone()), cache.get(-1, loader.clone()));
  if let (Err(Error::Build(a)), Err(Error::Build(b))) = (&first, &second) {
    println!("Both callers saw '{}' (same instance: {})", a, Arc::ptr_eq(a, b));
  }
  println!("Key -1 cached after failure: {}", cache.contains(&-1));

  println!("\n--- Final Metrics ---");
  println!("{:#?}", cache.metrics());
}
