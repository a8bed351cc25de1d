//! Subscription cache.
//!
//! Records are indexed twice: by fingerprint, to deduplicate requests, and
//! by server-correlation id, to match acknowledgments back to a record.

mod index;

pub use index::{CacheKey, SubscriptionCache};
