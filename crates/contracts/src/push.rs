//! PushTransport trait and completion handle
//!
//! Pushes are fire-and-forget; the transport reports the outcome through the
//! `PushCompletion` it was handed, exactly once.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::{Datum, Scope, Subscriber};

/// Outcome reported by a transport
pub type PushResult = Result<(), PushFailure>;

/// Why a push did not succeed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushFailure {
    /// Transport-level error (connection lost, client error reply, ...)
    Transport(String),
    /// The push task could not be scheduled
    Rejected,
    /// Handle dropped without an outcome
    Abandoned,
}

impl fmt::Display for PushFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::Rejected => f.write_str("push task rejected"),
            Self::Abandoned => f.write_str("completion dropped without outcome"),
        }
    }
}

/// One-shot completion handle for a single push.
///
/// `complete` consumes the handle. Dropping it uncompleted reports
/// `PushFailure::Abandoned`, so every registered push resolves.
pub struct PushCompletion {
    callback: Option<Box<dyn FnOnce(PushResult) + Send>>,
}

impl PushCompletion {
    pub fn new(callback: impl FnOnce(PushResult) + Send + 'static) -> Self {
        Self {
            callback: Some(Box::new(callback)),
        }
    }

    pub fn complete(mut self, result: PushResult) {
        if let Some(callback) = self.callback.take() {
            callback(result);
        }
    }

    pub fn succeed(self) {
        self.complete(Ok(()));
    }

    pub fn fail(self, failure: PushFailure) {
        self.complete(Err(failure));
    }
}

impl Drop for PushCompletion {
    fn drop(&mut self) {
        if let Some(callback) = self.callback.take() {
            callback(Err(PushFailure::Abandoned));
        }
    }
}

impl fmt::Debug for PushCompletion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushCompletion")
            .field("pending", &self.callback.is_some())
            .finish()
    }
}

/// Client push transport
pub trait PushTransport: Send + Sync {
    /// Legacy path: one push carrying `datum` for the subscribers of one
    /// client address.
    fn push_single(
        &self,
        address: SocketAddr,
        datum: Arc<Datum>,
        subscribers: Vec<Arc<Subscriber>>,
        completion: PushCompletion,
        scope: Scope,
    );

    /// Consolidated path: one push for many register ids, anchored on a
    /// representative subscriber.
    fn push_multi(
        &self,
        datum: Arc<Datum>,
        register_ids: Vec<String>,
        subscribers: Vec<Arc<Subscriber>>,
        scope: Scope,
        anchor: Arc<Subscriber>,
        completion: PushCompletion,
    );
}
