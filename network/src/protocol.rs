//! Protocol stream seam: one multiplexed, encrypted stream per connection.

use seedswarm_types::{ConnectionId, DiscoveryKey, NetworkIdentity, PublicKey};

use crate::connection::Duplex;
use crate::inbox::{InboxSender, Inbound};

/// A freshly created protocol stream and the byte end it speaks on.
///
/// The networker splices `wire` against the raw socket; `stream` is kept for
/// control calls and handed to the replicator.
pub struct WrappedStream {
    pub stream: Box<dyn ProtocolStream>,
    pub wire: Box<dyn Duplex>,
}

pub trait ProtocolFactory: Send + Sync {
    /// Wrap a connection. `events` must be used for handshake, channel-request
    /// and channel-close notifications of this stream.
    fn create(
        &self,
        is_initiator: bool,
        identity: &NetworkIdentity,
        events: StreamEvents,
    ) -> WrappedStream;
}

pub trait ProtocolStream: Send {
    /// Our noise public key on this stream.
    fn public_key(&self) -> PublicKey;

    /// The peer's noise public key, known once the handshake has completed.
    fn remote_public_key(&self) -> Option<PublicKey>;

    /// Open (or accept) the channel for `key` and return its byte handle.
    ///
    /// Replication providers call this to attach their session and own the
    /// handle for as long as the channel lives; the networker never does.
    /// Reads on the handle hit EOF once the channel closes from either side.
    fn open_channel(&mut self, key: &DiscoveryKey) -> Box<dyn Duplex>;

    /// Close the channel for `key`, leaving the connection and other channels up.
    fn close_channel(&mut self, key: &DiscoveryKey);

    /// Tear the whole stream down. Must tolerate repeated calls.
    fn destroy(&mut self);
}

/// Handle a protocol stream uses to report its lifecycle, bound to one connection.
#[derive(Clone)]
pub struct StreamEvents {
    connection: ConnectionId,
    inbox: InboxSender,
}

impl StreamEvents {
    pub(crate) fn new(connection: ConnectionId, inbox: InboxSender) -> Self {
        Self { connection, inbox }
    }

    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    pub fn handshake(&self) {
        self.inbox.post(Inbound::Handshake(self.connection));
    }

    /// The peer asked to open a channel for `key`.
    pub fn discovery_key(&self, key: DiscoveryKey) {
        self.inbox.post(Inbound::ChannelRequested {
            connection: self.connection,
            key,
        });
    }

    pub fn channel_closed(&self, key: DiscoveryKey) {
        self.inbox.post(Inbound::ChannelClosed {
            connection: self.connection,
            key,
        });
    }
}
