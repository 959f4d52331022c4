//! Containers backing the transform manager's state.
//!
//! Both containers pair a keyed index with an intrusive chronological
//! list, giving O(1) access to the oldest entry and O(1) erase given a
//! handle. [`TimedCache`] keys are unique (the content cache);
//! [`KeyedQueue`] holds multiple values per key (the pending and
//! in-progress request queues).

mod keyed_queue;
mod timed_cache;

pub use keyed_queue::{KeyedQueue, QueueHandle};
pub use timed_cache::{CacheHandle, TimedCache};
