//! Push transports shipped with the dispatcher

mod log;

pub use log::LogPushTransport;
