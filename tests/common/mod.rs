//! Recording transport shared by the integration tests.

#![allow(dead_code)]

use livesub::{SubscriptionId, Transport};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Route `tracing` output through the test harness.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init();
}

/// A call made by the manager.
#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Sub {
        name: String,
        params: Vec<Value>,
        id: SubscriptionId,
        reused: bool,
    },
    Unsub {
        id: SubscriptionId,
    },
}

/// Transport stub that records every call.
///
/// `drop_after_next_sub` simulates the connection dropping between a send
/// and the status check that follows it.
pub struct RecordingTransport {
    calls: Mutex<Vec<Call>>,
    next_id: AtomicU64,
    connected: AtomicBool,
    drop_after_next_sub: AtomicBool,
}

impl RecordingTransport {
    pub fn connected() -> Self {
        Self::with_state(true)
    }

    pub fn disconnected() -> Self {
        Self::with_state(false)
    }

    fn with_state(connected: bool) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            connected: AtomicBool::new(connected),
            drop_after_next_sub: AtomicBool::new(false),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn drop_after_next_sub(&self) {
        self.drop_after_next_sub.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn sub_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Sub { .. }))
            .collect()
    }

    pub fn sub_count(&self) -> usize {
        self.sub_calls().len()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

impl Transport for RecordingTransport {
    fn sub(&self, name: &str, params: &[Value], id: Option<&SubscriptionId>) -> SubscriptionId {
        let reused = id.is_some();
        let id = match id {
            Some(id) => id.clone(),
            None => SubscriptionId::new(self.next_id.fetch_add(1, Ordering::SeqCst).to_string()),
        };

        self.calls.lock().push(Call::Sub {
            name: name.to_string(),
            params: params.to_vec(),
            id: id.clone(),
            reused,
        });

        if self.drop_after_next_sub.swap(false, Ordering::SeqCst) {
            self.connected.store(false, Ordering::SeqCst);
        }

        id
    }

    fn unsub(&self, id: &SubscriptionId) {
        self.calls.lock().push(Call::Unsub { id: id.clone() });
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
