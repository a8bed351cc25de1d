//! Subscription manager: dedup, acknowledgment correlation and replay.

use crate::cache::{CacheKey, SubscriptionCache};
use crate::error::Result;
use crate::transport::{Transport, TransportEvent};
use crate::types::{Fingerprint, ServerError, SubscriptionId};
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

use super::types::{ManagerConfig, Subscription};

/// Counters exposed through [`SubscriptionManager::stats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ManagerStats {
    /// Fresh subscribe requests handed to the transport.
    pub requests_sent: u64,
    /// Subscribe requests re-sent after a reconnect.
    pub replays_sent: u64,
    /// `subscribe` calls answered from the cache.
    pub dedup_hits: u64,
    /// `ready`/`nosub` entries naming an id with no record.
    pub unknown_ids: u64,
}

#[derive(Default)]
struct Counters {
    requests_sent: AtomicU64,
    replays_sent: AtomicU64,
    dedup_hits: AtomicU64,
    unknown_ids: AtomicU64,
}

/// Tracks the subscriptions of one connection.
///
/// Construct one per connection-owning instance, before any `subscribe`
/// call, and feed it every [`TransportEvent`] the connection produces.
///
/// Event handlers never hold a lock while calling watchers, so callbacks may
/// call back into the manager. The transport must not call `subscribe`
/// from inside [`Transport::sub`].
pub struct SubscriptionManager<T: Transport> {
    transport: T,
    cache: SubscriptionCache,
    config: ManagerConfig,
    /// Serializes the fingerprint check with the insert in `subscribe`.
    subscribe_lock: Mutex<()>,
    counters: Counters,
}

impl<T: Transport> SubscriptionManager<T> {
    /// Create a manager with the default configuration.
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, ManagerConfig::default())
    }

    pub fn with_config(transport: T, config: ManagerConfig) -> Self {
        Self {
            transport,
            cache: SubscriptionCache::new(),
            config,
            subscribe_lock: Mutex::new(()),
            counters: Counters::default(),
        }
    }

    /// Subscribe to `name` with `params`, or join an identical subscription.
    ///
    /// When a record with the same name and parameters exists it is
    /// returned as is and nothing is sent. Otherwise one request goes to
    /// the transport and a new record is cached. Outcomes arrive later
    /// through the record's watchers.
    pub fn subscribe(&self, name: &str, params: Vec<Value>) -> Arc<Subscription> {
        let fingerprint = Fingerprint::compute(name, &params);

        let _guard = self.subscribe_lock.lock();

        // A terminal record is only still cached while its nosub is being
        // dispatched; a new request replaces it.
        let existing = self
            .cache
            .get_by_fingerprint(&fingerprint)
            .filter(|record| !record.state().is_terminal());
        if let Some(existing) = existing {
            self.counters.dedup_hits.fetch_add(1, Ordering::Relaxed);
            trace!(id = %existing.id(), publication = name, "joined existing subscription");
            return existing;
        }

        let id = self.transport.sub(name, &params, None);
        // The transport buffers requests while offline; if it is not
        // connected right after the send the request may still be queued.
        let still_in_queue = !self.transport.is_connected();
        self.counters.requests_sent.fetch_add(1, Ordering::Relaxed);

        debug!(id = %id, publication = name, still_in_queue, "sent subscribe request");

        let record = Arc::new(Subscription::new(
            fingerprint,
            id,
            name.to_string(),
            params,
            still_in_queue,
            self.config.watch_buffer,
        ));
        self.cache.add(Arc::clone(&record));
        record
    }

    /// Like [`subscribe`](Self::subscribe), serializing each parameter first.
    pub fn subscribe_serialized<P: Serialize>(
        &self,
        name: &str,
        params: &[P],
    ) -> Result<Arc<Subscription>> {
        let values = params
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(self.subscribe(name, values))
    }

    /// Ask the server to tear down `id`.
    ///
    /// The record stays cached until the server answers with `nosub`. Ids
    /// are passed through without checking that this manager owns them.
    pub fn unsubscribe(&self, id: &SubscriptionId) {
        debug!(id = %id, "sent unsubscribe request");
        self.transport.unsub(id);
    }

    // --- Transport events ---

    /// Apply one event from the transport.
    pub fn handle_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Ready { subs } => {
                for id in &subs {
                    self.on_ready(id);
                }
            }
            TransportEvent::NoSub { id, error } => self.on_nosub(&id, error),
            TransportEvent::Connected => self.on_connected(),
        }
    }

    /// Apply every event already waiting on `events`. Returns how many.
    pub fn pump_events(&self, events: &Receiver<TransportEvent>) -> usize {
        let mut handled = 0;
        for event in events.try_iter() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Apply events as they arrive until every sender is dropped.
    pub fn run_events(&self, events: &Receiver<TransportEvent>) {
        for event in events.iter() {
            self.handle_event(event);
        }
        debug!("transport event channel closed");
    }

    fn on_ready(&self, id: &SubscriptionId) {
        match self.cache.get_by_id(id) {
            Some(record) => {
                debug!(id = %id, publication = record.name(), "subscription ready");
                record.notify_ready();
            }
            None => self.unknown_id("ready", id),
        }
    }

    fn on_nosub(&self, id: &SubscriptionId, error: Option<ServerError>) {
        let Some(record) = self.cache.get_by_id(id) else {
            self.unknown_id("nosub", id);
            return;
        };

        match error {
            Some(ref error) => {
                debug!(id = %id, publication = record.name(), error = %error, "subscription failed");
                record.notify_error(error);
            }
            None => {
                debug!(id = %id, publication = record.name(), "subscription stopped");
                record.notify_stopped();
            }
        }

        self.cache.del(id);
    }

    /// Replay the cache after the connection became active.
    ///
    /// There is no session resumption, so every request that actually went
    /// out must be sent again. Requests still sitting in the transport's
    /// buffer are flushed by the transport itself and only lose their flag.
    fn on_connected(&self) {
        let mut replayed = 0usize;
        let mut flushed = 0usize;

        self.cache.for_each(|record| {
            if record.take_still_in_queue() {
                trace!(id = %record.id(), "queued request flushed by reconnect");
                flushed += 1;
                return;
            }

            record.mark_requested();
            let id = self
                .transport
                .sub(record.name(), record.params(), Some(record.id()));
            if id != *record.id() {
                warn!(expected = %record.id(), got = %id, "transport changed id on replay");
            }
            // The connection may drop again between the event and this send.
            record.set_still_in_queue(!self.transport.is_connected());
            self.counters.replays_sent.fetch_add(1, Ordering::Relaxed);
            replayed += 1;
        });

        debug!(replayed, flushed, "replayed subscriptions after connect");
    }

    fn unknown_id(&self, event: &str, id: &SubscriptionId) {
        self.counters.unknown_ids.fetch_add(1, Ordering::Relaxed);
        if self.config.warn_on_unknown_ids {
            warn!(id = %id, event, "event for unknown subscription ignored");
        } else {
            debug!(id = %id, event, "event for unknown subscription ignored");
        }
    }

    // --- Inspection ---

    /// Look up a cached record by fingerprint or id.
    pub fn get(&self, key: impl Into<CacheKey>) -> Option<Arc<Subscription>> {
        self.cache.get(key)
    }

    /// Snapshot of all cached records.
    pub fn subscriptions(&self) -> Vec<Arc<Subscription>> {
        self.cache.snapshot()
    }

    /// Get subscription count.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn stats(&self) -> ManagerStats {
        ManagerStats {
            requests_sent: self.counters.requests_sent.load(Ordering::Relaxed),
            replays_sent: self.counters.replays_sent.load(Ordering::Relaxed),
            dedup_hits: self.counters.dedup_hits.load(Ordering::Relaxed),
            unknown_ids: self.counters.unknown_ids.load(Ordering::Relaxed),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}
