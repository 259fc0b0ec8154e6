//! Background tasks for the cache, currently just the janitor that purges
//! dead entries on a fixed interval.

pub(crate) mod janitor;
