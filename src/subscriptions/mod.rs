//! Subscription tracking for a reconnecting pub/sub connection.
//!
//! This module provides:
//! - Deduplication of identical requests (same name and parameters)
//! - Correlation of server `ready`/`nosub` acknowledgments to records
//! - Replay of every live subscription after a reconnect
//!
//! # Example
//!
//! ```ignore
//! let manager = SubscriptionManager::new(transport);
//!
//! let feed = manager.subscribe("feed", vec![json!(1)]);
//! feed.on_ready(|| println!("feed is live"));
//! feed.on_error(|err| eprintln!("feed rejected: {}", err));
//!
//! // Hand every event the connection reports to the manager.
//! manager.run_events(&events);
//! ```

mod manager;
mod types;

pub use manager::{ManagerStats, SubscriptionManager};
pub use types::{
    ManagerConfig, Subscription, SubscriptionEvent, SubscriptionState, SubscriptionWatcher,
};
