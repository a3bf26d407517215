//! Slot ownership contracts
//!
//! A slot is the shard unit: every dataInfoId hashes to exactly one slot, and
//! a node either owns a slot completely or not at all.

use serde::{Deserialize, Serialize};

/// Slot identifier
pub type SlotId = u32;

/// Role this node plays for an owned slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotRole {
    Leader,
    Follower,
}

impl std::fmt::Display for SlotRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Leader => f.write_str("leader"),
            Self::Follower => f.write_str("follower"),
        }
    }
}

/// Callback surface of the cluster's slot-ownership manager.
///
/// Both notifications must be idempotent: adding a present slot keeps its
/// contents, removing an absent slot does nothing.
pub trait SlotChangeListener: Send + Sync {
    fn on_slot_add(&self, slot_id: SlotId, role: SlotRole);

    fn on_slot_remove(&self, slot_id: SlotId, role: SlotRole);
}
