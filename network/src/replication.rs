//! Replication provider seam.

use seedswarm_types::{ConnectionId, DiscoveryKey, NetworkIdentity};

use crate::protocol::ProtocolStream;
use crate::NetworkError;

/// Per-call options for [`Replicator::replicate`].
///
/// `stream` is borrowed for the call only. The provider opens the key's
/// channel with [`ProtocolStream::open_channel`] and keeps the returned handle
/// to run its session; it must not hold on to the stream itself.
pub struct ReplicationOptions<'a> {
    pub id: &'a NetworkIdentity,
    pub encrypt: bool,
    pub live: bool,
    pub connection: ConnectionId,
    pub stream: &'a mut dyn ProtocolStream,
}

/// The storage side: streams a resource's data once a channel is granted.
pub trait Replicator: Send + Sync {
    fn replicate(
        &self,
        discovery_key: &DiscoveryKey,
        options: ReplicationOptions<'_>,
    ) -> Result<(), NetworkError>;
}
