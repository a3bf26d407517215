//! Interest-side collaborator contracts
//!
//! The subscriber index and the assembly strategy live in the session layer;
//! the push pipeline only queries them.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::{AssembleType, Datum, Scope, Subscriber};

/// client address -> register_id -> subscriber
pub type SubscriberGroups = HashMap<SocketAddr, HashMap<String, Arc<Subscriber>>>;

/// Read access to the session's subscriber index
pub trait SubscriberIndex: Send + Sync {
    /// Subscribers of `data_info_id` registered with `scope`, grouped by
    /// client address. Empty when nobody is interested.
    fn query(&self, data_info_id: &str, scope: Scope) -> SubscriberGroups;

    /// Optional re-subscription capability.
    ///
    /// Index implementations that schedule re-subscription retries return
    /// themselves here; the default has no such capability.
    fn resubscribe_tracker(&self) -> Option<&dyn ResubscribeTracker> {
        None
    }
}

/// Tracks subscribers waiting for a scheduled re-subscription retry
pub trait ResubscribeTracker: Send + Sync {
    fn is_pending_resubscribe(&self, subscriber: &Subscriber) -> bool;

    fn clear_pending(&self, subscriber: &Subscriber);
}

/// Builds the data view a subscriber should receive
pub trait AssemblyStrategy: Send + Sync {
    /// `None` when no data could be assembled for this subscriber.
    fn assemble(
        &self,
        assemble_type: AssembleType,
        data_center: &str,
        subscriber: &Subscriber,
    ) -> Option<Datum>;
}
