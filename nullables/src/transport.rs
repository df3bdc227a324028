//! Nullable transport: records topic membership and lets tests deliver connections.

use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use seedswarm_network::{
    ConnectionInfo, Duplex, JoinOptions, NetworkError, Transport, TransportEvents,
    TransportFactory, TransportOptions,
};
use seedswarm_types::{ConnectionId, DiscoveryKey, PublicKey};
use tokio::io::DuplexStream;

/// Buffer size of the in-memory socket pairs handed out by [`NullTransportFactory::connect`].
const SOCKET_BUFFER: usize = 64 * 1024;

/// Everything the networker asked of the transport.
#[derive(Default)]
pub struct TransportRecord {
    /// Number of transports created.
    pub created: usize,
    /// Options passed to the latest `create`.
    pub options: Option<TransportOptions>,
    pub joins: Vec<(DiscoveryKey, JoinOptions)>,
    pub leaves: Vec<DiscoveryKey>,
    pub deduplicated: Vec<(ConnectionId, PublicKey, PublicKey)>,
    pub destroyed: bool,
    /// When set, `destroy` fails with this [`NetworkError::Transport`] message.
    pub fail_destroy: Option<String>,
    events: Option<TransportEvents>,
    next_connection: u64,
}

/// Factory handing out [`NullTransport`]s that share one [`TransportRecord`].
#[derive(Clone, Default)]
pub struct NullTransportFactory {
    record: Arc<Mutex<TransportRecord>>,
}

impl NullTransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect the record.
    pub fn with_record<R>(&self, f: impl FnOnce(&TransportRecord) -> R) -> R {
        f(&self.record.lock().unwrap())
    }

    pub fn joins(&self) -> Vec<(DiscoveryKey, JoinOptions)> {
        self.with_record(|r| r.joins.clone())
    }

    pub fn leaves(&self) -> Vec<DiscoveryKey> {
        self.with_record(|r| r.leaves.clone())
    }

    pub fn deduplicated(&self) -> Vec<(ConnectionId, PublicKey, PublicKey)> {
        self.with_record(|r| r.deduplicated.clone())
    }

    pub fn created(&self) -> usize {
        self.with_record(|r| r.created)
    }

    pub fn is_destroyed(&self) -> bool {
        self.with_record(|r| r.destroyed)
    }

    pub fn options(&self) -> Option<TransportOptions> {
        self.with_record(|r| r.options.clone())
    }

    /// Simulate the swarm dying on its own: the live transport reports
    /// `is_destroyed()` without the networker having called `destroy`.
    pub fn mark_destroyed(&self) {
        self.record.lock().unwrap().destroyed = true;
    }

    /// Make the next `destroy` fail.
    pub fn fail_destroy(&self, message: &str) {
        self.record.lock().unwrap().fail_destroy = Some(message.to_string());
    }

    /// Allocate a connection id, unique for the factory's lifetime.
    pub fn next_connection_id(&self) -> ConnectionId {
        let mut record = self.record.lock().unwrap();
        record.next_connection += 1;
        ConnectionId(record.next_connection)
    }

    /// Events handle of the latest transport, if one was created.
    pub fn events(&self) -> Option<TransportEvents> {
        self.with_record(|r| r.events.clone())
    }

    /// Deliver `socket` as a new connection. Returns `false` if no transport exists.
    pub fn deliver(&self, socket: Box<dyn Duplex>, info: ConnectionInfo) -> bool {
        match self.events() {
            Some(events) => {
                events.connection(socket, info);
                true
            }
            None => false,
        }
    }

    /// Deliver one end of an in-memory socket pair and return the other, the
    /// remote peer's end.
    pub fn connect(&self, info: ConnectionInfo) -> DuplexStream {
        let (local, remote) = tokio::io::duplex(SOCKET_BUFFER);
        self.deliver(Box::new(local), info);
        remote
    }

    /// Report that the peer on `connection` shares `topic`.
    pub fn announce_topic(&self, connection: ConnectionId, topic: DiscoveryKey) {
        if let Some(events) = self.events() {
            events.topic(connection, topic);
        }
    }

    /// Report a swarm-level failure.
    pub fn fail(&self, message: &str) {
        if let Some(events) = self.events() {
            events.error(NetworkError::Transport(message.to_string()));
        }
    }
}

impl TransportFactory for NullTransportFactory {
    fn create(
        &self,
        options: TransportOptions,
        events: TransportEvents,
    ) -> Result<Box<dyn Transport>, NetworkError> {
        let mut record = self.record.lock().unwrap();
        record.created += 1;
        record.destroyed = false;
        record.options = Some(options);
        record.events = Some(events);
        Ok(Box::new(NullTransport {
            record: Arc::clone(&self.record),
        }))
    }
}

/// A transport that only records.
pub struct NullTransport {
    record: Arc<Mutex<TransportRecord>>,
}

impl Transport for NullTransport {
    fn join(&mut self, topic: &DiscoveryKey, options: JoinOptions) {
        self.record.lock().unwrap().joins.push((*topic, options));
    }

    fn leave(&mut self, topic: &DiscoveryKey) {
        self.record.lock().unwrap().leaves.push(*topic);
    }

    fn deduplicate(&mut self, connection: ConnectionId, local: &PublicKey, remote: &PublicKey) {
        self.record
            .lock()
            .unwrap()
            .deduplicated
            .push((connection, *local, *remote));
    }

    fn is_destroyed(&self) -> bool {
        self.record.lock().unwrap().destroyed
    }

    fn destroy(&mut self) -> BoxFuture<'static, Result<(), NetworkError>> {
        let mut record = self.record.lock().unwrap();
        record.destroyed = true;
        record.events = None;
        let result = match record.fail_destroy.take() {
            Some(message) => Err(NetworkError::Transport(message)),
            None => Ok(()),
        };
        Box::pin(std::future::ready(result))
    }
}
