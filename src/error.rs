//! Error types for subscription bookkeeping.
//!
//! Subscription outcomes (a server rejecting a request) are not errors of
//! this crate: they travel through the record's watchers as
//! [`ServerError`](crate::types::ServerError) values. The variants here
//! cover the few local operations that can actually fail.

use thiserror::Error;

/// Main error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Watcher closed: subscription {0} no longer delivers events")]
    WatcherClosed(String),

    #[error("Timed out waiting for subscription {0}")]
    WatchTimeout(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Result type for fallible operations.
pub type Result<T> = std::result::Result<T, Error>;
