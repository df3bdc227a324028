//! Nullable infrastructure for deterministic networker testing.
//!
//! Every collaborator of the swarm networker (transport, protocol stream,
//! replication provider, raw socket) gets an in-memory stand-in that:
//! - Records every call made on it
//! - Can be driven programmatically by the test
//! - Never touches a real network
//!
//! Usage: hand these to `SwarmNetworker::new` instead of real providers.

pub mod protocol;
pub mod replicator;
pub mod socket;
pub mod transport;

pub use protocol::{NullProtocol, StreamRecord};
pub use replicator::{NullReplicator, ReplicationCall};
pub use socket::NullSocket;
pub use transport::{NullTransportFactory, TransportRecord};
