//! InMemorySubscriberIndex - map-backed subscriber index
//!
//! Reference index for nodes that run without a session layer, with
//! re-subscription tracking.

use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use contracts::{ResubscribeTracker, Scope, Subscriber, SubscriberGroups, SubscriberIndex};

/// Subscriber index backed by a map, with re-subscription tracking
#[derive(Default)]
pub struct InMemorySubscriberIndex {
    /// (data_info_id, scope) -> address groups
    groups: RwLock<HashMap<(String, Scope), SubscriberGroups>>,
    /// register ids waiting for a re-subscription retry
    pending: Mutex<HashSet<String>>,
    /// answer `None` from `resubscribe_tracker`
    without_tracker: bool,
}

impl InMemorySubscriberIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index that exposes no re-subscription capability
    pub fn without_tracker() -> Self {
        Self {
            without_tracker: true,
            ..Self::default()
        }
    }

    pub fn add(&self, subscriber: Arc<Subscriber>) {
        let key = (subscriber.data_info_id.to_string(), subscriber.scope);
        self.groups
            .write()
            .entry(key)
            .or_default()
            .entry(subscriber.source_address)
            .or_default()
            .insert(subscriber.register_id.clone(), subscriber);
    }

    pub fn remove(&self, subscriber: &Subscriber) -> bool {
        let key = (subscriber.data_info_id.to_string(), subscriber.scope);
        let mut groups = self.groups.write();
        let Some(by_address) = groups.get_mut(&key) else {
            return false;
        };
        let removed = by_address
            .get_mut(&subscriber.source_address)
            .and_then(|g| g.remove(&subscriber.register_id))
            .is_some();
        by_address.retain(|_, g| !g.is_empty());
        if by_address.is_empty() {
            groups.remove(&key);
        }
        removed
    }

    pub fn mark_pending_resubscribe(&self, register_id: impl Into<String>) {
        self.pending.lock().insert(register_id.into());
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

impl SubscriberIndex for InMemorySubscriberIndex {
    fn query(&self, data_info_id: &str, scope: Scope) -> SubscriberGroups {
        self.groups
            .read()
            .get(&(data_info_id.to_string(), scope))
            .cloned()
            .unwrap_or_default()
    }

    fn resubscribe_tracker(&self) -> Option<&dyn ResubscribeTracker> {
        if self.without_tracker {
            None
        } else {
            Some(self)
        }
    }
}

impl ResubscribeTracker for InMemorySubscriberIndex {
    fn is_pending_resubscribe(&self, subscriber: &Subscriber) -> bool {
        self.pending.lock().contains(&subscriber.register_id)
    }

    fn clear_pending(&self, subscriber: &Subscriber) {
        self.pending.lock().remove(&subscriber.register_id);
    }
}
