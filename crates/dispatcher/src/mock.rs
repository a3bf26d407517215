//! Test doubles for the assembly strategy and the client transport
//!
//! Both record what they were asked and allow injecting failures.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use contracts::{
    AssembleType, AssemblyStrategy, Datum, PushCompletion, PushFailure, PushTransport, Scope,
    Subscriber,
};

/// Assembly returning a fixed datum per assemble type
#[derive(Default)]
pub struct StaticAssembly {
    datums: HashMap<AssembleType, Datum>,
    calls: Mutex<Vec<(AssembleType, String, String)>>,
}

impl StaticAssembly {
    /// Same datum for every assemble type
    pub fn new(datum: Datum) -> Self {
        Self {
            datums: AssembleType::ALL
                .into_iter()
                .map(|t| (t, datum.clone()))
                .collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Assembly that never produces data
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with(mut self, assemble_type: AssembleType, datum: Datum) -> Self {
        self.datums.insert(assemble_type, datum);
        self
    }

    pub fn without(mut self, assemble_type: AssembleType) -> Self {
        self.datums.remove(&assemble_type);
        self
    }

    /// (assemble type, data center, representative register id) per call
    pub fn calls(&self) -> Vec<(AssembleType, String, String)> {
        self.calls.lock().clone()
    }
}

impl AssemblyStrategy for StaticAssembly {
    fn assemble(
        &self,
        assemble_type: AssembleType,
        data_center: &str,
        subscriber: &Subscriber,
    ) -> Option<Datum> {
        self.calls.lock().push((
            assemble_type,
            data_center.to_string(),
            subscriber.register_id.clone(),
        ));
        self.datums.get(&assemble_type).cloned()
    }
}

/// What a recorded transport does with completions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TransportBehavior {
    #[default]
    Succeed,
    Fail(String),
    /// Keep the completion until [`RecordingTransport::release_held`]
    Hold,
}

/// One push seen by [`RecordingTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedPush {
    Single {
        address: SocketAddr,
        scope: Scope,
        version: u64,
        subscribers: Vec<String>,
    },
    Multi {
        scope: Scope,
        version: u64,
        register_ids: Vec<String>,
        subscribers: Vec<String>,
        anchor: String,
    },
}

impl RecordedPush {
    /// Register ids of the subscribers the push covered
    pub fn subscribers(&self) -> &[String] {
        match self {
            Self::Single { subscribers, .. } | Self::Multi { subscribers, .. } => subscribers,
        }
    }
}

/// Transport recording every push
#[derive(Default)]
pub struct RecordingTransport {
    behavior: Mutex<TransportBehavior>,
    pushes: Mutex<Vec<RecordedPush>>,
    held: Mutex<Vec<PushCompletion>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_behavior(behavior: TransportBehavior) -> Self {
        Self {
            behavior: Mutex::new(behavior),
            ..Self::default()
        }
    }

    pub fn set_behavior(&self, behavior: TransportBehavior) {
        *self.behavior.lock() = behavior;
    }

    pub fn pushes(&self) -> Vec<RecordedPush> {
        self.pushes.lock().clone()
    }

    pub fn push_count(&self) -> usize {
        self.pushes.lock().len()
    }

    /// Complete every held push with success
    pub fn release_held(&self) -> usize {
        let held: Vec<_> = self.held.lock().drain(..).collect();
        let n = held.len();
        held.into_iter().for_each(PushCompletion::succeed);
        n
    }

    fn finish(&self, push: RecordedPush, completion: PushCompletion) {
        self.pushes.lock().push(push);
        let behavior = self.behavior.lock().clone();
        match behavior {
            TransportBehavior::Succeed => completion.succeed(),
            TransportBehavior::Fail(msg) => completion.fail(PushFailure::Transport(msg)),
            TransportBehavior::Hold => self.held.lock().push(completion),
        }
    }
}

fn register_ids(subscribers: &[Arc<Subscriber>]) -> Vec<String> {
    subscribers.iter().map(|s| s.register_id.clone()).collect()
}

impl PushTransport for RecordingTransport {
    fn push_single(
        &self,
        address: SocketAddr,
        datum: Arc<Datum>,
        subscribers: Vec<Arc<Subscriber>>,
        completion: PushCompletion,
        scope: Scope,
    ) {
        let push = RecordedPush::Single {
            address,
            scope,
            version: datum.version.value(),
            subscribers: register_ids(&subscribers),
        };
        self.finish(push, completion);
    }

    fn push_multi(
        &self,
        datum: Arc<Datum>,
        register_ids_all: Vec<String>,
        subscribers: Vec<Arc<Subscriber>>,
        scope: Scope,
        anchor: Arc<Subscriber>,
        completion: PushCompletion,
    ) {
        let push = RecordedPush::Multi {
            scope,
            version: datum.version.value(),
            register_ids: register_ids_all,
            subscribers: register_ids(&subscribers),
            anchor: anchor.register_id.clone(),
        };
        self.finish(push, completion);
    }
}
