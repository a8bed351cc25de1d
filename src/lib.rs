//! # livesub
//!
//! Client-side bookkeeping for named, parameterized subscriptions over a
//! single connection that may drop and come back.
//!
//! ## Core Concepts
//!
//! - **Fingerprints**: identical name + parameters map to one subscription
//! - **Cache**: records indexed by fingerprint and by server-correlation id
//! - **Manager**: sends requests, correlates acknowledgments, and replays
//!   every subscription after a reconnect (the protocol cannot resume)
//! - **Transport**: the connection, supplied by the caller
//!
//! ## Example
//!
//! ```ignore
//! use livesub::{SubscriptionManager, TransportEvent};
//! use serde_json::json;
//!
//! let manager = SubscriptionManager::new(connection.clone());
//!
//! let posts = manager.subscribe("posts", vec![json!("rust"), json!(20)]);
//! let watcher = posts.watch();
//!
//! // Same name and parameters: same record, no second request.
//! let again = manager.subscribe("posts", vec![json!("rust"), json!(20)]);
//! assert!(std::sync::Arc::ptr_eq(&posts, &again));
//!
//! manager.handle_event(TransportEvent::Ready { subs: vec![posts.id().clone()] });
//! ```

pub mod cache;
pub mod error;
pub mod subscriptions;
pub mod transport;
pub mod types;

// Re-exports
pub use cache::{CacheKey, SubscriptionCache};
pub use error::{Error, Result};
pub use subscriptions::{
    ManagerConfig, ManagerStats, Subscription, SubscriptionEvent, SubscriptionManager,
    SubscriptionState, SubscriptionWatcher,
};
pub use transport::{Transport, TransportEvent};
pub use types::{Fingerprint, ServerError, SubscriptionId};
