//! Subscription records and the watcher plumbing attached to them.

use crate::error::{Error, Result};
use crate::types::{Fingerprint, ServerError, SubscriptionId};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Configuration for a subscription manager.
#[derive(Clone, Debug)]
pub struct ManagerConfig {
    /// Capacity of each [`SubscriptionWatcher`] channel. A watcher that
    /// falls this far behind, or whose receiver was dropped, is removed.
    /// Values below 1 are treated as 1.
    /// Default: 64
    pub watch_buffer: usize,

    /// Log ids the manager does not know about at `warn` instead of `debug`.
    /// Default: true
    pub warn_on_unknown_ids: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            watch_buffer: 64,
            warn_on_unknown_ids: true,
        }
    }
}

/// Lifecycle of a subscription as seen by the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Request sent or queued, no `ready` yet (also the state after a replay).
    Requested,
    /// The server reported the subscription ready.
    Ready,
    /// The server rejected or killed the subscription with an error.
    Failed,
    /// The server confirmed teardown without an error.
    Stopped,
}

impl SubscriptionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SubscriptionState::Failed | SubscriptionState::Stopped)
    }
}

/// Outcome delivered to watchers.
#[derive(Clone, Debug, PartialEq)]
pub enum SubscriptionEvent {
    Ready,
    Error(ServerError),
    Stopped,
}

type ReadyCallback = Arc<dyn Fn() + Send + Sync>;
type ErrorCallback = Arc<dyn Fn(&ServerError) + Send + Sync>;

/// Mutable part of a record, guarded by one lock.
struct Observers {
    state: SubscriptionState,
    on_ready: Vec<ReadyCallback>,
    on_error: Vec<ErrorCallback>,
    on_stop: Vec<ReadyCallback>,
    watchers: Vec<Sender<SubscriptionEvent>>,
}

impl Observers {
    /// Deliver to channel watchers, pruning the ones that cannot take it.
    fn send_to_watchers(&mut self, id: &SubscriptionId, event: &SubscriptionEvent) {
        let before = self.watchers.len();
        self.watchers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => false,
        });
        let dropped = before - self.watchers.len();
        if dropped > 0 {
            tracing::warn!(id = %id, dropped, "dropped slow or closed subscription watchers");
        }
    }
}

/// A subscription known to the client.
///
/// Records are created by [`SubscriptionManager::subscribe`] and shared as
/// `Arc<Subscription>`: repeated requests for the same name and parameters
/// return the same `Arc`. Everything except the queue flag and the
/// observers is immutable.
///
/// [`SubscriptionManager::subscribe`]: crate::SubscriptionManager::subscribe
pub struct Subscription {
    fingerprint: Fingerprint,
    id: SubscriptionId,
    name: String,
    params: Vec<Value>,
    still_in_queue: AtomicBool,
    watch_buffer: usize,
    observers: Mutex<Observers>,
}

impl Subscription {
    pub(crate) fn new(
        fingerprint: Fingerprint,
        id: SubscriptionId,
        name: String,
        params: Vec<Value>,
        still_in_queue: bool,
        watch_buffer: usize,
    ) -> Self {
        Self {
            fingerprint,
            id,
            name,
            params,
            still_in_queue: AtomicBool::new(still_in_queue),
            watch_buffer,
            observers: Mutex::new(Observers {
                state: SubscriptionState::Requested,
                on_ready: Vec::new(),
                on_error: Vec::new(),
                on_stop: Vec::new(),
                watchers: Vec::new(),
            }),
        }
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    pub fn id(&self) -> &SubscriptionId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    pub fn state(&self) -> SubscriptionState {
        self.observers.lock().state
    }

    pub fn is_ready(&self) -> bool {
        self.state() == SubscriptionState::Ready
    }

    /// True while the request may still sit unsent in the transport's buffer.
    pub fn is_still_in_queue(&self) -> bool {
        self.still_in_queue.load(Ordering::SeqCst)
    }

    pub(crate) fn set_still_in_queue(&self, queued: bool) {
        self.still_in_queue.store(queued, Ordering::SeqCst);
    }

    /// Clear the queue flag, returning whether it was set.
    pub(crate) fn take_still_in_queue(&self) -> bool {
        self.still_in_queue.swap(false, Ordering::SeqCst)
    }

    // --- Observer registration ---

    /// Run `f` every time the server reports this subscription ready.
    ///
    /// Fires again after each reconnection replay. Registration after the
    /// fact is not replayed; check [`is_ready`](Self::is_ready) first.
    pub fn on_ready<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.observers.lock().on_ready.push(Arc::new(f));
    }

    /// Run `f` once if the server rejects or kills this subscription.
    pub fn on_error<F>(&self, f: F)
    where
        F: Fn(&ServerError) + Send + Sync + 'static,
    {
        self.observers.lock().on_error.push(Arc::new(f));
    }

    /// Run `f` once when the server confirms teardown without an error.
    pub fn on_stop<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.observers.lock().on_stop.push(Arc::new(f));
    }

    /// Open a channel that receives every outcome from now on.
    ///
    /// The channel closes after a terminal outcome (error or stop). On a
    /// record that already reached one, the returned watcher is closed.
    pub fn watch(&self) -> SubscriptionWatcher {
        // A zero-capacity channel would reject every non-blocking send.
        let (sender, receiver) = bounded(self.watch_buffer.max(1));
        let mut observers = self.observers.lock();
        if !observers.state.is_terminal() {
            observers.watchers.push(sender);
        }
        SubscriptionWatcher {
            id: self.id.clone(),
            receiver,
        }
    }

    // --- Notification (manager only) ---

    pub(crate) fn notify_ready(&self) {
        let callbacks = {
            let mut observers = self.observers.lock();
            if observers.state.is_terminal() {
                return;
            }
            observers.state = SubscriptionState::Ready;
            observers.send_to_watchers(&self.id, &SubscriptionEvent::Ready);
            observers.on_ready.clone()
        };
        for callback in callbacks {
            callback();
        }
    }

    pub(crate) fn notify_error(&self, error: &ServerError) {
        let callbacks = {
            let mut observers = self.observers.lock();
            if observers.state.is_terminal() {
                return;
            }
            observers.state = SubscriptionState::Failed;
            observers.send_to_watchers(&self.id, &SubscriptionEvent::Error(error.clone()));
            observers.watchers.clear();
            std::mem::take(&mut observers.on_error)
        };
        for callback in callbacks {
            callback(error);
        }
    }

    pub(crate) fn notify_stopped(&self) {
        let callbacks = {
            let mut observers = self.observers.lock();
            if observers.state.is_terminal() {
                return;
            }
            observers.state = SubscriptionState::Stopped;
            observers.send_to_watchers(&self.id, &SubscriptionEvent::Stopped);
            observers.watchers.clear();
            std::mem::take(&mut observers.on_stop)
        };
        for callback in callbacks {
            callback();
        }
    }

    /// Back to `Requested` after a replay; terminal states are kept.
    pub(crate) fn mark_requested(&self) {
        let mut observers = self.observers.lock();
        if !observers.state.is_terminal() {
            observers.state = SubscriptionState::Requested;
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("params", &self.params)
            .field("fingerprint", &self.fingerprint)
            .field("still_in_queue", &self.is_still_in_queue())
            .field("state", &self.state())
            .finish()
    }
}

/// Channel end returned by [`Subscription::watch`].
pub struct SubscriptionWatcher {
    pub id: SubscriptionId,
    receiver: Receiver<SubscriptionEvent>,
}

impl SubscriptionWatcher {
    /// Receive the next outcome (blocking).
    pub fn recv(&self) -> Result<SubscriptionEvent> {
        self.receiver
            .recv()
            .map_err(|_| Error::WatcherClosed(self.id.to_string()))
    }

    /// Receive an outcome if one is pending (non-blocking).
    pub fn try_recv(&self) -> Result<Option<SubscriptionEvent>> {
        match self.receiver.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(crossbeam_channel::TryRecvError::Empty) => Ok(None),
            Err(crossbeam_channel::TryRecvError::Disconnected) => {
                Err(Error::WatcherClosed(self.id.to_string()))
            }
        }
    }

    /// Receive with timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<SubscriptionEvent> {
        self.receiver.recv_timeout(timeout).map_err(|e| match e {
            crossbeam_channel::RecvTimeoutError::Timeout => Error::WatchTimeout(self.id.to_string()),
            crossbeam_channel::RecvTimeoutError::Disconnected => {
                Error::WatcherClosed(self.id.to_string())
            }
        })
    }
}
