//! # Dispatcher
//!
//! Change-driven push dispatch.
//!
//! Responsible for:
//! - consuming data-change notifications on the data-change lane
//! - selecting the subscribers that still need the notified version
//! - pushing assembled data through a [`PushTransport`]
//! - reconciling acknowledged versions once a push closure finishes

pub mod closure;
pub mod dispatcher;
pub mod error;
pub mod index;
pub mod metrics;
pub mod mock;
pub mod transports;

pub use closure::{PushClosure, PushOutcome};
pub use contracts::{DataChange, PushTransport};
pub use dispatcher::{PushDispatcher, PushDispatcherBuilder};
pub use error::DispatchError;
pub use index::InMemorySubscriberIndex;
pub use metrics::{DispatchMetrics, DispatchSnapshot};
pub use transports::LogPushTransport;
