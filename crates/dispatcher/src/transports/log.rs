//! LogPushTransport - logs push summaries via tracing and acknowledges them

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, instrument};

use contracts::{Datum, PushCompletion, PushTransport, Scope, Subscriber};

/// Transport that logs every push and reports success immediately.
///
/// Used by the node binary when no client connection layer is attached.
pub struct LogPushTransport {
    name: String,
    pushed: AtomicU64,
}

impl LogPushTransport {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pushed: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pushes logged so far
    pub fn pushed(&self) -> u64 {
        self.pushed.load(Ordering::Relaxed)
    }
}

impl PushTransport for LogPushTransport {
    #[instrument(
        name = "log_push_single",
        skip_all,
        fields(transport = %self.name, data_info_id = %datum.data_info_id)
    )]
    fn push_single(
        &self,
        address: SocketAddr,
        datum: Arc<Datum>,
        subscribers: Vec<Arc<Subscriber>>,
        completion: PushCompletion,
        scope: Scope,
    ) {
        self.pushed.fetch_add(1, Ordering::Relaxed);
        info!(
            %address,
            %scope,
            version = %datum.version,
            publishers = datum.publisher_count(),
            subscribers = subscribers.len(),
            "Legacy push"
        );
        completion.succeed();
    }

    #[instrument(
        name = "log_push_multi",
        skip_all,
        fields(transport = %self.name, data_info_id = %datum.data_info_id)
    )]
    fn push_multi(
        &self,
        datum: Arc<Datum>,
        register_ids: Vec<String>,
        subscribers: Vec<Arc<Subscriber>>,
        scope: Scope,
        anchor: Arc<Subscriber>,
        completion: PushCompletion,
    ) {
        self.pushed.fetch_add(1, Ordering::Relaxed);
        info!(
            address = %anchor.source_address,
            %scope,
            version = %datum.version,
            publishers = datum.publisher_count(),
            register_ids = register_ids.len(),
            subscribers = subscribers.len(),
            "Multi push"
        );
        completion.succeed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{AssembleType, DataInfoId, DatumVersion, ProtocolVersion, PushResult};
    use std::sync::Mutex;

    fn datum() -> Arc<Datum> {
        Arc::new(Datum::empty(DataInfoId::new("foo"), "DC1", DatumVersion(3)))
    }

    fn subscriber() -> Arc<Subscriber> {
        Arc::new(Subscriber::new(
            "s1",
            "foo",
            Scope::Global,
            AssembleType::Interface,
            ProtocolVersion::StoreData,
            "10.0.0.1:5000".parse().unwrap(),
        ))
    }

    fn completion() -> (PushCompletion, Arc<Mutex<Vec<PushResult>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (PushCompletion::new(move |r| sink.lock().unwrap().push(r)), seen)
    }

    #[test]
    fn test_log_transport_acknowledges() {
        let transport = LogPushTransport::new("log");
        let (c1, seen1) = completion();
        transport.push_single(
            "10.0.0.1:5000".parse().unwrap(),
            datum(),
            vec![subscriber()],
            c1,
            Scope::Zone,
        );
        let (c2, seen2) = completion();
        let anchor = subscriber();
        transport.push_multi(datum(), vec!["s1".into()], vec![Arc::clone(&anchor)], Scope::Global, anchor, c2);

        assert_eq!(*seen1.lock().unwrap(), vec![Ok(())]);
        assert_eq!(*seen2.lock().unwrap(), vec![Ok(())]);
        assert_eq!(transport.pushed(), 2);
        assert_eq!(transport.name(), "log");
    }
}
