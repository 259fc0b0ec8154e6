use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::thread::{self, Thread};
use std::time::{Duration, Instant};

/// Represents a waiter in the queue of a pending `Computation`.
enum Waiter {
  Sync(Thread),
  Async(Waker),
}

impl Waiter {
  fn wake(self) {
    match self {
      Waiter::Sync(thread) => thread.unpark(),
      Waiter::Async(waker) => waker.wake(),
    }
  }
}

/// The settled result of a `Computation`.
///
/// Values and errors are shared behind an `Arc`, so every waiter observes the
/// very same value or error instance.
pub enum Outcome<V, E> {
  /// The builder returned a value.
  Success(Arc<V>),
  /// The builder returned an error.
  Failure(Arc<E>),
  /// The computation was dropped by its executor before the builder returned.
  Cancelled,
}

impl<V, E> Clone for Outcome<V, E> {
  fn clone(&self) -> Self {
    match self {
      Outcome::Success(value) => Outcome::Success(value.clone()),
      Outcome::Failure(error) => Outcome::Failure(error.clone()),
      Outcome::Cancelled => Outcome::Cancelled,
    }
  }
}

impl<V, E> fmt::Debug for Outcome<V, E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Outcome::Success(_) => f.write_str("Success(..)"),
      Outcome::Failure(_) => f.write_str("Failure(..)"),
      Outcome::Cancelled => f.write_str("Cancelled"),
    }
  }
}

/// The internal state of a computation.
enum State<V, E> {
  Pending,
  Settled(Outcome<V, E>),
}

/// The internal, mutex-protected core of the Computation.
struct Inner<V, E> {
  state: State<V, E>,
  // Each registration carries an id so a waiter can withdraw only its own entry.
  waiters: VecDeque<(u64, Waiter)>,
  next_waiter_id: u64,
}

impl<V, E> Inner<V, E> {
  fn register(&mut self, waiter: Waiter) -> u64 {
    let id = self.next_waiter_id;
    self.next_waiter_id += 1;
    self.waiters.push_back((id, waiter));
    id
  }

  fn deregister(&mut self, id: u64) {
    self.waiters.retain(|(waiter_id, _)| *waiter_id != id);
  }

  fn outcome(&self) -> Option<Outcome<V, E>> {
    match &self.state {
      State::Pending => None,
      State::Settled(outcome) => Some(outcome.clone()),
    }
  }
}

/// A single unit of work that produces a value for one key.
///
/// It can be awaited by multiple sync threads and async tasks simultaneously.
/// A computation settles exactly once; waiters that go away before it settles
/// simply withdraw, which never affects the work itself or the other waiters.
pub struct Computation<V, E> {
  inner: Mutex<Inner<V, E>>,
}

impl<V, E> fmt::Debug for Computation<V, E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let inner = self.inner.lock();
    let state = match &inner.state {
      State::Pending => "Pending",
      State::Settled(Outcome::Success(_)) => "Success",
      State::Settled(Outcome::Failure(_)) => "Failure",
      State::Settled(Outcome::Cancelled) => "Cancelled",
    };
    f.debug_struct("Computation")
      .field("state", &state)
      .field("waiters", &inner.waiters.len())
      .finish()
  }
}

impl<V, E> Computation<V, E> {
  /// Creates a new `Computation` in the "Pending" state.
  pub(crate) fn new() -> Self {
    Self::with_state(State::Pending)
  }

  /// Creates a computation that has already succeeded with `value`.
  pub(crate) fn ready(value: Arc<V>) -> Self {
    Self::with_state(State::Settled(Outcome::Success(value)))
  }

  fn with_state(state: State<V, E>) -> Self {
    Self {
      inner: Mutex::new(Inner {
        state,
        waiters: VecDeque::new(),
        next_waiter_id: 0,
      }),
    }
  }

  /// Settles the computation, waking every waiter.
  ///
  /// Returns `false` if it was already settled; the first outcome wins.
  pub(crate) fn settle(&self, outcome: Outcome<V, E>) -> bool {
    let waiters = {
      let mut inner = self.inner.lock();
      if let State::Settled(_) = inner.state {
        return false;
      }
      inner.state = State::Settled(outcome);
      std::mem::take(&mut inner.waiters)
    };
    for (_, waiter) in waiters {
      waiter.wake();
    }
    true
  }

  /// Returns the outcome if the computation has settled, without waiting.
  pub fn peek(&self) -> Option<Outcome<V, E>> {
    self.inner.lock().outcome()
  }

  pub fn is_pending(&self) -> bool {
    matches!(self.inner.lock().state, State::Pending)
  }

  /// Returns `true` if the executor dropped this computation before it finished.
  pub fn is_cancelled(&self) -> bool {
    matches!(self.inner.lock().state, State::Settled(Outcome::Cancelled))
  }

  /// Returns `true` if the computation settled as a failure or a cancellation.
  /// Such a computation must never be served as a cache hit.
  pub fn is_dead(&self) -> bool {
    matches!(
      self.inner.lock().state,
      State::Settled(Outcome::Cancelled) | State::Settled(Outcome::Failure(_))
    )
  }

  /// Returns a future that resolves with the outcome once the computation settles.
  ///
  /// Dropping the returned future only withdraws this waiter.
  pub fn wait(&self) -> Join<'_, V, E> {
    Join {
      computation: self,
      registration: None,
    }
  }

  /// Blocks the current thread until the computation settles.
  pub fn wait_blocking(&self) -> Outcome<V, E> {
    let mut registration = None;
    loop {
      {
        let mut inner = self.inner.lock();
        if let Some(outcome) = inner.outcome() {
          return outcome;
        }
        if registration.is_none() {
          registration = Some(inner.register(Waiter::Sync(thread::current())));
        }
      }
      // Spurious unparks are handled by re-checking the state.
      thread::park();
    }
  }

  /// Blocks the current thread until the computation settles or `timeout` elapses.
  ///
  /// Returns `None` on timeout.
  pub fn wait_blocking_timeout(&self, timeout: Duration) -> Option<Outcome<V, E>> {
    let Some(deadline) = Instant::now().checked_add(timeout) else {
      return Some(self.wait_blocking());
    };
    let mut registration = None;
    loop {
      {
        let mut inner = self.inner.lock();
        if let Some(outcome) = inner.outcome() {
          return Some(outcome);
        }
        let now = Instant::now();
        if now >= deadline {
          if let Some(id) = registration {
            inner.deregister(id);
          }
          return None;
        }
        if registration.is_none() {
          registration = Some(inner.register(Waiter::Sync(thread::current())));
        }
      }
      thread::park_timeout(deadline.saturating_duration_since(Instant::now()));
    }
  }
}

/// A future that waits for a `Computation` to settle.
#[must_use = "futures do nothing unless you .await or poll them"]
pub struct Join<'a, V, E> {
  computation: &'a Computation<V, E>,
  registration: Option<u64>,
}

impl<'a, V, E> Future for Join<'a, V, E> {
  type Output = Outcome<V, E>;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    let this = self.get_mut();
    let mut inner = this.computation.inner.lock();

    if let Some(outcome) = inner.outcome() {
      // Settling drained the queue, nothing left to withdraw.
      this.registration = None;
      return Poll::Ready(outcome);
    }

    match this.registration {
      Some(id) => {
        // Already queued. Refresh the waker if the task moved.
        if let Some((_, waiter)) = inner.waiters.iter_mut().find(|(waiter_id, _)| *waiter_id == id) {
          match waiter {
            Waiter::Async(waker) if waker.will_wake(cx.waker()) => {}
            _ => *waiter = Waiter::Async(cx.waker().clone()),
          }
        } else {
          this.registration = Some(inner.register(Waiter::Async(cx.waker().clone())));
        }
      }
      None => {
        this.registration = Some(inner.register(Waiter::Async(cx.waker().clone())));
      }
    }

    Poll::Pending
  }
}

impl<'a, V, E> Drop for Join<'a, V, E> {
  fn drop(&mut self) {
    if let Some(id) = self.registration.take() {
      self.computation.inner.lock().deregister(id);
    }
  }
}

impl<'a, V, E> fmt::Debug for Join<'a, V, E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Join")
      .field("computation", self.computation)
      .field("registered", &self.registration.is_some())
      .finish()
  }
}
