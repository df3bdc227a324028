//! Transport provider seam: topic membership and connection delivery.

use futures_util::future::BoxFuture;
use seedswarm_types::{ConnectionId, DiscoveryKey, NetworkIdentity, PublicKey};

use crate::connection::{ConnectionInfo, Duplex};
use crate::inbox::{InboxSender, Inbound};
use crate::NetworkError;

/// Flags for joining a topic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JoinOptions {
    /// Advertise ourselves as a peer for the topic.
    pub announce: bool,
    /// Look up other peers for the topic.
    pub lookup: bool,
}

impl Default for JoinOptions {
    fn default() -> Self {
        Self {
            announce: true,
            lookup: true,
        }
    }
}

/// Options handed to a [`TransportFactory`] on `listen()`.
#[derive(Clone, Debug)]
pub struct TransportOptions {
    pub identity: NetworkIdentity,
    /// Always `true`: many resources share one connection per peer.
    pub multiplex: bool,
    /// Provider-specific settings, passed through untouched from config.
    pub extra: toml::Table,
}

/// Builds a swarm handle. Called once per `listen()`.
pub trait TransportFactory: Send + Sync {
    fn create(
        &self,
        options: TransportOptions,
        events: TransportEvents,
    ) -> Result<Box<dyn Transport>, NetworkError>;
}

/// A live swarm handle.
pub trait Transport: Send {
    fn join(&mut self, topic: &DiscoveryKey, options: JoinOptions);

    fn leave(&mut self, topic: &DiscoveryKey);

    /// Report both ends of a handshaked connection so the transport can drop
    /// redundant connections to the same peer.
    fn deduplicate(&mut self, connection: ConnectionId, local: &PublicKey, remote: &PublicKey);

    fn is_destroyed(&self) -> bool;

    /// Leave every topic and close the swarm. Resolves once teardown is done.
    fn destroy(&mut self) -> BoxFuture<'static, Result<(), NetworkError>>;
}

/// Handle a transport uses to report connections, topics and failures.
#[derive(Clone)]
pub struct TransportEvents {
    inbox: InboxSender,
}

impl TransportEvents {
    pub(crate) fn new(inbox: InboxSender) -> Self {
        Self { inbox }
    }

    /// A new connection, inbound or outbound.
    pub fn connection(&self, socket: Box<dyn Duplex>, info: ConnectionInfo) {
        self.inbox.post(Inbound::Connection { socket, info });
    }

    /// The peer on `connection` turned out to share `topic` with us.
    pub fn topic(&self, connection: ConnectionId, topic: DiscoveryKey) {
        self.inbox.post(Inbound::Topic {
            connection,
            key: topic,
        });
    }

    /// A swarm-level failure. Existing connections stay up.
    pub fn error(&self, error: NetworkError) {
        self.inbox.post(Inbound::TransportError(error));
    }
}
