//! Messages collaborators post back to the networker.
//!
//! Every callback from the transport, a protocol stream or a pipe task lands
//! here, so all state changes happen on whichever task drives the networker.

use seedswarm_types::{ConnectionId, DiscoveryKey};
use tokio::sync::mpsc;

use crate::connection::{ConnectionInfo, Duplex};
use crate::NetworkError;

pub(crate) enum Inbound {
    Connection {
        socket: Box<dyn Duplex>,
        info: ConnectionInfo,
    },
    Topic {
        connection: ConnectionId,
        key: DiscoveryKey,
    },
    TransportError(NetworkError),
    Handshake(ConnectionId),
    ChannelRequested {
        connection: ConnectionId,
        key: DiscoveryKey,
    },
    ChannelClosed {
        connection: ConnectionId,
        key: DiscoveryKey,
    },
    PipeClosed {
        connection: ConnectionId,
        result: Result<(), NetworkError>,
    },
}

/// An inbound message tagged with the listen session that produced it.
///
/// Each `listen()` starts a new session. Messages from earlier sessions are
/// dropped on receipt.
pub(crate) struct Envelope {
    pub session: u64,
    pub message: Inbound,
}

/// Sending half shared by every event handle of one session.
#[derive(Clone)]
pub(crate) struct InboxSender {
    session: u64,
    tx: mpsc::UnboundedSender<Envelope>,
}

impl InboxSender {
    pub fn new(session: u64, tx: mpsc::UnboundedSender<Envelope>) -> Self {
        Self { session, tx }
    }

    /// Post a message. A networker that has been dropped just loses it.
    pub fn post(&self, message: Inbound) {
        let _ = self.tx.send(Envelope {
            session: self.session,
            message,
        });
    }
}
