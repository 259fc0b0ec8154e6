//! The user-facing cache handles. Both are cheap `Arc` wrappers around the same
//! shared core and convert into each other for free.

mod futures;
mod sync;

pub use futures::CoalescingCache;
pub use sync::BlockingCache;
