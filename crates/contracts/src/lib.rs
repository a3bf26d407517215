//! # Contracts
//!
//! Frozen interface contracts shared by the registry node crates: data model,
//! collaborator traits and configuration.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Version Model
//! - `DatumVersion` is node-local and strictly increasing per group
//! - `PublisherVersion` is client supplied (counter, register timestamp)

mod data_info_id;
mod datum;
mod error;
mod interest;
mod job;
mod publisher;
mod push;
mod registry_config;
mod slot;
mod subscriber;

pub use data_info_id::{DataInfoId, DATA_INFO_SEPARATOR};
pub use datum::*;
pub use error::*;
pub use interest::*;
pub use job::*;
pub use publisher::*;
pub use push::*;
pub use registry_config::*;
pub use slot::*;
pub use subscriber::*;
