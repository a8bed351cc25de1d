//! Boundary with the connection that carries subscription traffic.
//!
//! The connection itself (connecting, reconnecting, buffering requests while
//! offline, framing) lives outside this crate. It is reached through the
//! [`Transport`] trait, and reports what the server said through
//! [`TransportEvent`] values fed to the manager.

use crate::types::{ServerError, SubscriptionId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Outbound side of a connection.
pub trait Transport: Send + Sync {
    /// Issue a subscribe request.
    ///
    /// With `id = None` the transport allocates a fresh correlation id; with
    /// `Some(id)` it reuses it (reconnection replay). Returns the id in both
    /// cases. When the connection is down the transport is expected to
    /// buffer the request and flush it on reconnect.
    fn sub(&self, name: &str, params: &[Value], id: Option<&SubscriptionId>) -> SubscriptionId;

    /// Issue a teardown request.
    fn unsub(&self, id: &SubscriptionId);

    /// Whether the connection is active right now.
    fn is_connected(&self) -> bool;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn sub(&self, name: &str, params: &[Value], id: Option<&SubscriptionId>) -> SubscriptionId {
        (**self).sub(name, params, id)
    }

    fn unsub(&self, id: &SubscriptionId) {
        (**self).unsub(id)
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }
}

impl<T: Transport + ?Sized> Transport for &T {
    fn sub(&self, name: &str, params: &[Value], id: Option<&SubscriptionId>) -> SubscriptionId {
        (**self).sub(name, params, id)
    }

    fn unsub(&self, id: &SubscriptionId) {
        (**self).unsub(id)
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }
}

/// Subscription-related events emitted by a connection.
///
/// The serde shape matches the message objects of the protocol
/// (`{"msg":"ready","subs":[...]}` and friends), so a transport can decode
/// straight into this type. Unrelated fields are ignored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "msg", rename_all = "snake_case")]
pub enum TransportEvent {
    /// The listed subscriptions have sent their initial data.
    Ready { subs: Vec<SubscriptionId> },

    /// The subscription was torn down, optionally because of an error.
    #[serde(rename = "nosub")]
    NoSub {
        id: SubscriptionId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<ServerError>,
    },

    /// The connection became active (initial connect or reconnect).
    Connected,
}
