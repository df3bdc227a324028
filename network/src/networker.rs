//! The swarm networker.
//!
//! Owns the seeding set, one protocol stream per swarm connection, and the
//! index of which streams currently replicate which discovery key. Inbound
//! channel requests reach the [`Replicator`] only for keys seeded at the
//! moment the request is handled.
//!
//! Collaborators never touch this state directly: they post messages to the
//! networker's inbox, and the task that owns the networker applies them
//! through [`SwarmNetworker::tick`] or [`SwarmNetworker::process_pending`].
//! Both must run inside a tokio runtime, since every accepted connection
//! spawns a task that splices its bytes.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use seedswarm_types::{ConnectionId, DiscoveryKey, IntoDiscoveryKey, NetworkIdentity};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::{NetworkerConfig, SeedOptions};
use crate::connection::{ConnectionInfo, Duplex};
use crate::event::{EventBus, NetworkerEvent};
use crate::inbox::{Envelope, InboxSender, Inbound};
use crate::protocol::{ProtocolFactory, ProtocolStream, StreamEvents, WrappedStream};
use crate::replication::{ReplicationOptions, Replicator};
use crate::transport::{Transport, TransportEvents, TransportFactory, TransportOptions};
use crate::NetworkError;

/// A connection's protocol stream plus the task pumping its bytes.
struct ActiveStream {
    /// Position in creation order.
    seq: u64,
    stream: Box<dyn ProtocolStream>,
    pipe: JoinHandle<()>,
}

impl ActiveStream {
    fn destroy(mut self) {
        self.stream.destroy();
        self.pipe.abort();
    }
}

/// Mutable bookkeeping, touched only from the task driving the networker.
#[derive(Default)]
struct SwarmState {
    seeding: HashSet<DiscoveryKey>,
    streams: HashMap<ConnectionId, ActiveStream>,
    /// Sequence number for the next accepted stream.
    next_seq: u64,
    /// Streams with an open channel per key, in channel-open order. A key with
    /// no open channel has no entry.
    by_key: HashMap<DiscoveryKey, Vec<ConnectionId>>,
}

impl SwarmState {
    fn insert_stream(
        &mut self,
        connection: ConnectionId,
        stream: Box<dyn ProtocolStream>,
        pipe: JoinHandle<()>,
    ) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.streams.insert(connection, ActiveStream { seq, stream, pipe });
    }

    /// Destroy every stream and forget every open channel.
    fn drop_streams(&mut self) {
        for (_, active) in self.streams.drain() {
            active.destroy();
        }
        self.by_key.clear();
    }

    fn index(&mut self, key: DiscoveryKey, connection: ConnectionId) {
        self.by_key.entry(key).or_default().push(connection);
    }

    fn is_indexed(&self, key: &DiscoveryKey, connection: ConnectionId) -> bool {
        self.by_key
            .get(key)
            .is_some_and(|streams| streams.contains(&connection))
    }

    /// Remove `connection` from `key`'s entry, dropping the entry once empty.
    fn unindex(&mut self, key: &DiscoveryKey, connection: ConnectionId) {
        if let Entry::Occupied(mut entry) = self.by_key.entry(*key) {
            entry.get_mut().retain(|c| *c != connection);
            if entry.get().is_empty() {
                entry.remove();
            }
        }
    }

    /// Remove `connection` from every key's entry.
    fn unindex_all(&mut self, connection: ConnectionId) {
        self.by_key.retain(|_, streams| {
            streams.retain(|c| *c != connection);
            !streams.is_empty()
        });
    }
}

/// Replicates seeded resources to whichever swarm peers ask for them.
pub struct SwarmNetworker {
    identity: NetworkIdentity,
    config: NetworkerConfig,
    replicator: Arc<dyn Replicator>,
    protocol: Arc<dyn ProtocolFactory>,
    transport_factory: Arc<dyn TransportFactory>,
    /// `Some` between `listen()` and `close()`.
    transport: Option<Box<dyn Transport>>,
    /// Bumped on every `listen()` and `close()`; inbox messages from any other
    /// session are stale.
    session: u64,
    state: SwarmState,
    events: EventBus,
    inbox_tx: mpsc::UnboundedSender<Envelope>,
    inbox_rx: mpsc::UnboundedReceiver<Envelope>,
}

impl SwarmNetworker {
    /// Create an unstarted networker.
    ///
    /// Fails only if no identity is configured and the OS random source is
    /// unavailable.
    pub fn new(
        replicator: Arc<dyn Replicator>,
        protocol: Arc<dyn ProtocolFactory>,
        transport_factory: Arc<dyn TransportFactory>,
        config: NetworkerConfig,
    ) -> Result<Self, NetworkError> {
        let identity = match config.identity {
            Some(identity) => identity,
            None => NetworkIdentity::random()?,
        };
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        Ok(Self {
            identity,
            config,
            replicator,
            protocol,
            transport_factory,
            transport: None,
            session: 0,
            state: SwarmState::default(),
            events: EventBus::new(),
            inbox_tx,
            inbox_rx,
        })
    }

    /// Register an observer for `error` and `replication-error` notifications.
    pub fn subscribe(&mut self, listener: Box<dyn Fn(&NetworkerEvent) + Send + Sync>) {
        self.events.subscribe(listener);
    }

    // -- Lifecycle -------------------------------------------------------------

    /// Create the swarm handle. Connections start arriving through the inbox.
    ///
    /// A transport that was destroyed underneath the networker is replaced;
    /// its streams and seeding set are discarded with it.
    pub fn listen(&mut self) -> Result<(), NetworkError> {
        if self.is_listening() {
            return Err(NetworkError::AlreadyListening);
        }
        if self.transport.take().is_some() {
            tracing::warn!("transport was destroyed externally, starting a new swarm");
            self.state.seeding.clear();
            self.state.drop_streams();
        }

        self.session += 1;
        let events = TransportEvents::new(self.inbox());
        let options = TransportOptions {
            identity: self.identity,
            multiplex: true,
            extra: self.config.transport.clone(),
        };
        self.transport = Some(self.transport_factory.create(options, events)?);

        tracing::info!(identity = %self.identity, "swarm ready and listening");
        Ok(())
    }

    /// Unseed everything, destroy every stream, then destroy the transport.
    ///
    /// Local bookkeeping is cleared and the transport handle dropped even when
    /// teardown fails; the failure is returned as [`NetworkError::Teardown`].
    /// A no-op when not listening.
    pub async fn close(&mut self) -> Result<(), NetworkError> {
        if self.transport.is_none() {
            return Ok(());
        }

        let seeded: Vec<DiscoveryKey> = self.state.seeding.iter().copied().collect();
        for key in &seeded {
            self.withdraw(key);
        }
        self.state.drop_streams();

        self.session += 1;
        let Some(mut transport) = self.transport.take() else {
            return Ok(());
        };
        let result = transport.destroy().await;
        match result {
            Ok(()) => {
                tracing::info!("swarm closed");
                Ok(())
            }
            Err(err) => {
                tracing::warn!(error = %err, "swarm teardown failed");
                Err(match err {
                    NetworkError::Teardown(_) => err,
                    other => NetworkError::Teardown(other.to_string()),
                })
            }
        }
    }

    // -- Seeding ---------------------------------------------------------------

    /// Offer `key` for replication to any peer, now or later connected, and
    /// join its topic.
    ///
    /// Replication itself starts lazily, when some stream requests a channel
    /// for the key. Seeding an already-seeded key changes nothing.
    pub fn seed(
        &mut self,
        key: impl IntoDiscoveryKey,
        options: SeedOptions,
    ) -> Result<(), NetworkError> {
        let transport = listening(&mut self.transport)?;
        let key = key.into_discovery_key()?;

        if !self.state.seeding.insert(key) {
            tracing::debug!(key = %key, "already seeding");
            return Ok(());
        }
        let join = options.resolve(&self.config);
        transport.join(&key, join);
        tracing::debug!(key = %key, announce = join.announce, lookup = join.lookup, "seeding");
        Ok(())
    }

    /// Stop offering `key`, leave its topic, and close every open channel for
    /// it. Connections themselves stay up.
    pub fn unseed(&mut self, key: impl IntoDiscoveryKey) -> Result<(), NetworkError> {
        listening(&mut self.transport)?;
        let key = key.into_discovery_key()?;
        self.withdraw(&key);
        Ok(())
    }

    fn withdraw(&mut self, key: &DiscoveryKey) {
        self.state.seeding.remove(key);
        if let Some(transport) = self.transport.as_mut() {
            transport.leave(key);
        }

        let Some(connections) = self.state.by_key.remove(key) else {
            return;
        };
        for connection in connections {
            if let Some(active) = self.state.streams.get_mut(&connection) {
                active.stream.close_channel(key);
            }
        }
        tracing::debug!(key = %key, "unseeded and closed its channels");
    }

    // -- Event loop ------------------------------------------------------------

    /// Wait for the next collaborator message and apply it.
    pub async fn tick(&mut self) {
        if let Some(envelope) = self.inbox_rx.recv().await {
            self.dispatch(envelope);
        }
    }

    /// Apply every message already queued, without waiting. Returns how many
    /// were taken off the inbox, stale ones included.
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(envelope) = self.inbox_rx.try_recv() {
            self.dispatch(envelope);
            handled += 1;
        }
        handled
    }

    fn inbox(&self) -> InboxSender {
        InboxSender::new(self.session, self.inbox_tx.clone())
    }

    fn dispatch(&mut self, envelope: Envelope) {
        if envelope.session != self.session || self.transport.is_none() {
            tracing::trace!(session = envelope.session, "dropping stale inbox message");
            return;
        }
        match envelope.message {
            Inbound::Connection { socket, info } => self.on_connection(socket, info),
            Inbound::Topic { connection, key } => self.route_channel(connection, key),
            Inbound::TransportError(error) => {
                tracing::warn!(error = %error, "swarm error");
                self.events.emit(&NetworkerEvent::Error(error));
            }
            Inbound::Handshake(connection) => self.on_handshake(connection),
            Inbound::ChannelRequested { connection, key } => self.route_channel(connection, key),
            Inbound::ChannelClosed { connection, key } => {
                self.state.unindex(&key, connection);
            }
            Inbound::PipeClosed { connection, result } => self.on_pipe_closed(connection, result),
        }
    }

    // -- Connection handling ---------------------------------------------------

    fn on_connection(&mut self, socket: Box<dyn Duplex>, info: ConnectionInfo) {
        if self.config.reject_loopback && info.is_loopback() {
            tracing::debug!(connection = %info.id, "rejecting loopback connection");
            return;
        }
        if self.state.streams.contains_key(&info.id) {
            tracing::warn!(connection = %info.id, "transport reused a live connection id");
            return;
        }

        let connection = info.id;
        let events = StreamEvents::new(connection, self.inbox());
        let WrappedStream { stream, wire } = self.protocol.create(info.client, &self.identity, events);
        let pipe = spawn_pipe(connection, socket, wire, self.inbox());
        self.state.insert_stream(connection, stream, pipe);
        tracing::debug!(
            connection = %connection,
            client = info.client,
            remote = ?info.remote_addr,
            "protocol stream created"
        );

        for key in info.topics {
            self.route_channel(connection, key);
        }
    }

    fn on_handshake(&mut self, connection: ConnectionId) {
        let Some(active) = self.state.streams.get(&connection) else {
            return;
        };
        let local = active.stream.public_key();
        let Some(remote) = active.stream.remote_public_key() else {
            tracing::debug!(connection = %connection, "handshake without remote key");
            return;
        };
        if let Some(transport) = self.transport.as_mut() {
            transport.deduplicate(connection, &local, &remote);
        }
    }

    /// The replication decision: serve `key` on `connection` only if seeded now.
    fn route_channel(&mut self, connection: ConnectionId, key: DiscoveryKey) {
        if !self.state.seeding.contains(&key) {
            tracing::debug!(connection = %connection, key = %key, "ignoring unseeded key");
            return;
        }
        if self.state.is_indexed(&key, connection) {
            tracing::debug!(connection = %connection, key = %key, "already replicating");
            return;
        }
        let Some(active) = self.state.streams.get_mut(&connection) else {
            return;
        };

        tracing::debug!(connection = %connection, key = %key, "replicating");
        let options = ReplicationOptions {
            id: &self.identity,
            encrypt: true,
            live: true,
            connection,
            stream: active.stream.as_mut(),
        };
        match self.replicator.replicate(&key, options) {
            Ok(()) => self.state.index(key, connection),
            Err(error) => {
                tracing::warn!(connection = %connection, key = %key, error = %error, "replication failed");
                self.events
                    .emit(&NetworkerEvent::ReplicationError { connection, error });
            }
        }
    }

    fn on_pipe_closed(&mut self, connection: ConnectionId, result: Result<(), NetworkError>) {
        if let Err(error) = result {
            tracing::warn!(connection = %connection, error = %error, "replication-error");
            self.events
                .emit(&NetworkerEvent::ReplicationError { connection, error });
        }
        self.state.unindex_all(connection);
        if let Some(mut active) = self.state.streams.remove(&connection) {
            active.stream.destroy();
        }
    }

    // -- Queries ---------------------------------------------------------------

    pub fn identity(&self) -> &NetworkIdentity {
        &self.identity
    }

    pub fn config(&self) -> &NetworkerConfig {
        &self.config
    }

    pub fn is_listening(&self) -> bool {
        self.transport.as_ref().is_some_and(|t| !t.is_destroyed())
    }

    pub fn is_seeding(&self, key: &DiscoveryKey) -> bool {
        self.state.seeding.contains(key)
    }

    /// Seeded keys, sorted.
    pub fn seeding(&self) -> Vec<DiscoveryKey> {
        let mut keys: Vec<DiscoveryKey> = self.state.seeding.iter().copied().collect();
        keys.sort();
        keys
    }

    /// Connections with an open channel for `key`, in channel-open order.
    pub fn streams_for(&self, key: &DiscoveryKey) -> Vec<ConnectionId> {
        self.state.by_key.get(key).cloned().unwrap_or_default()
    }

    /// Whether the stream index has an entry for `key` at all.
    pub fn is_indexed(&self, key: &DiscoveryKey) -> bool {
        self.state.by_key.contains_key(key)
    }

    /// Live connections, in the order their streams were created.
    pub fn active_streams(&self) -> Vec<ConnectionId> {
        let mut streams: Vec<(u64, ConnectionId)> = self
            .state
            .streams
            .iter()
            .map(|(connection, active)| (active.seq, *connection))
            .collect();
        streams.sort_unstable();
        streams.into_iter().map(|(_, connection)| connection).collect()
    }
}

/// The transport, if it is live.
fn listening(
    transport: &mut Option<Box<dyn Transport>>,
) -> Result<&mut Box<dyn Transport>, NetworkError> {
    match transport {
        Some(t) if !t.is_destroyed() => Ok(t),
        _ => Err(NetworkError::NotListening),
    }
}

/// Splice `socket` and `wire` until both directions finish, then report back.
fn spawn_pipe(
    connection: ConnectionId,
    mut socket: Box<dyn Duplex>,
    mut wire: Box<dyn Duplex>,
    inbox: InboxSender,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let result = tokio::io::copy_bidirectional(&mut socket, &mut wire)
            .await
            .map(|(up, down)| {
                tracing::trace!(connection = %connection, up, down, "pipe finished");
            })
            .map_err(NetworkError::from);
        inbox.post(Inbound::PipeClosed { connection, result });
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unindex_drops_empty_entries() {
        let key = DiscoveryKey::new([1; 32]);
        let mut state = SwarmState::default();
        state.index(key, ConnectionId(1));
        state.index(key, ConnectionId(2));

        state.unindex(&key, ConnectionId(1));
        assert_eq!(state.by_key.get(&key), Some(&vec![ConnectionId(2)]));

        state.unindex(&key, ConnectionId(2));
        assert!(!state.by_key.contains_key(&key));
    }

    #[test]
    fn unindex_of_unknown_key_is_a_no_op() {
        let mut state = SwarmState::default();
        state.unindex(&DiscoveryKey::new([5; 32]), ConnectionId(1));
        assert!(state.by_key.is_empty());
    }

    #[test]
    fn unindex_all_clears_one_connection_everywhere() {
        let a = DiscoveryKey::new([1; 32]);
        let b = DiscoveryKey::new([2; 32]);
        let mut state = SwarmState::default();
        state.index(a, ConnectionId(1));
        state.index(a, ConnectionId(2));
        state.index(b, ConnectionId(1));

        state.unindex_all(ConnectionId(1));
        assert_eq!(state.by_key.get(&a), Some(&vec![ConnectionId(2)]));
        assert!(!state.by_key.contains_key(&b));
        assert!(state.is_indexed(&a, ConnectionId(2)));
        assert!(!state.is_indexed(&a, ConnectionId(1)));
    }
}
