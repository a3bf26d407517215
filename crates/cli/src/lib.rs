//! # Registry Node
//!
//! Composition root of a registry data node: the datum store, the execution
//! fabric and the push dispatcher, plus the supervised jobs tying them
//! together.

pub mod node;

pub use node::{NodeOptions, NodeStats, RegistryNode};
