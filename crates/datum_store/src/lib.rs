//! # Datum Store
//!
//! Slot-sharded, versioned storage of publisher groups.
//!
//! Every dataInfoId maps to one slot through a [`SlotFunction`]; each locally
//! owned slot has a [`SlotStore`] holding its [`PublisherGroup`]s. Operations
//! against a slot this node does not own return `None` or an empty
//! collection, never an error.
//!
//! ## Versioning
//! All groups draw their [`DatumVersion`](contracts::DatumVersion) from one
//! store-wide counter, so a group removed and recreated (or a slot dropped and
//! re-added) never repeats a version it already handed out.

mod assembly;
mod error;
mod group;
mod slot_function;
mod slot_store;
mod store;

pub use assembly::StoreAssembly;
pub use error::StoreError;
pub use group::{PublisherGroup, VersionSource};
pub use slot_function::{Fnv1aSlotFunction, SlotFunction, DEFAULT_SLOT_COUNT};
pub use slot_store::SlotStore;
pub use store::DatumStore;
