//! Dual-key index over subscription records.

use crate::subscriptions::Subscription;
use crate::types::{Fingerprint, SubscriptionId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Either of the two keys a record is stored under.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Fingerprint(Fingerprint),
    Id(SubscriptionId),
}

impl From<Fingerprint> for CacheKey {
    fn from(fp: Fingerprint) -> Self {
        CacheKey::Fingerprint(fp)
    }
}

impl From<&Fingerprint> for CacheKey {
    fn from(fp: &Fingerprint) -> Self {
        CacheKey::Fingerprint(*fp)
    }
}

impl From<SubscriptionId> for CacheKey {
    fn from(id: SubscriptionId) -> Self {
        CacheKey::Id(id)
    }
}

impl From<&SubscriptionId> for CacheKey {
    fn from(id: &SubscriptionId) -> Self {
        CacheKey::Id(id.clone())
    }
}

#[derive(Default)]
struct Indexes {
    by_fingerprint: HashMap<Fingerprint, Arc<Subscription>>,
    by_id: HashMap<SubscriptionId, Arc<Subscription>>,
}

impl Indexes {
    fn remove_record(&mut self, record: &Subscription) -> Option<Arc<Subscription>> {
        let removed = self.by_id.remove(record.id());
        self.by_fingerprint.remove(&record.fingerprint());
        removed
    }
}

/// Subscription records addressable by fingerprint and by id.
///
/// Both indexes always point at the same `Arc`. The cache applies no
/// policy: duplicate adds replace, missing deletes are no-ops.
#[derive(Default)]
pub struct SubscriptionCache {
    indexes: RwLock<Indexes>,
}

impl SubscriptionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record under its fingerprint and its id.
    ///
    /// A record already stored under either key is evicted from both
    /// indexes first, so the two never disagree.
    pub fn add(&self, record: Arc<Subscription>) {
        let mut indexes = self.indexes.write();

        if let Some(old) = indexes.by_fingerprint.get(&record.fingerprint()).cloned() {
            indexes.remove_record(&old);
        }
        if let Some(old) = indexes.by_id.get(record.id()).cloned() {
            indexes.remove_record(&old);
        }

        indexes
            .by_fingerprint
            .insert(record.fingerprint(), Arc::clone(&record));
        indexes.by_id.insert(record.id().clone(), record);
    }

    /// Look up a record by either key.
    pub fn get(&self, key: impl Into<CacheKey>) -> Option<Arc<Subscription>> {
        match key.into() {
            CacheKey::Fingerprint(fp) => self.get_by_fingerprint(&fp),
            CacheKey::Id(id) => self.get_by_id(&id),
        }
    }

    pub fn get_by_fingerprint(&self, fingerprint: &Fingerprint) -> Option<Arc<Subscription>> {
        self.indexes.read().by_fingerprint.get(fingerprint).cloned()
    }

    pub fn get_by_id(&self, id: &SubscriptionId) -> Option<Arc<Subscription>> {
        self.indexes.read().by_id.get(id).cloned()
    }

    /// Remove the record stored under `key` from both indexes.
    pub fn del(&self, key: impl Into<CacheKey>) -> Option<Arc<Subscription>> {
        let mut indexes = self.indexes.write();
        let record = match key.into() {
            CacheKey::Fingerprint(fp) => indexes.by_fingerprint.get(&fp).cloned(),
            CacheKey::Id(id) => indexes.by_id.get(&id).cloned(),
        }?;
        indexes.remove_record(&record)
    }

    /// Call `f` once per record present when the call started.
    ///
    /// Runs on a snapshot without holding the lock, so `f` may add, delete
    /// or mutate records.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&Arc<Subscription>),
    {
        for record in self.snapshot() {
            f(&record);
        }
    }

    /// All records, in unspecified order.
    pub fn snapshot(&self) -> Vec<Arc<Subscription>> {
        self.indexes.read().by_id.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.indexes.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
