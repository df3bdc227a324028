//! Swarm networking layer for seedswarm.
//!
//! Joins discovery topics for the resources this process seeds, wraps every
//! swarm connection in a multiplexed protocol stream, and hands per-resource
//! channels to the replication provider only while the resource is seeded.
//! Discovery, stream framing and data transfer are collaborators behind the
//! traits in [`transport`], [`protocol`] and [`replication`].

pub mod config;
pub mod connection;
pub mod error;
pub mod event;
mod inbox;
pub mod logging;
pub mod networker;
pub mod protocol;
pub mod replication;
pub mod transport;

pub use config::{NetworkerConfig, SeedOptions};
pub use connection::{is_loopback, ConnectionInfo, Duplex};
pub use error::{ErrorKind, NetworkError};
pub use event::{EventBus, NetworkerEvent};
pub use logging::{init_logging, LogFormat};
pub use networker::SwarmNetworker;
pub use protocol::{ProtocolFactory, ProtocolStream, StreamEvents, WrappedStream};
pub use replication::{ReplicationOptions, Replicator};
pub use transport::{JoinOptions, Transport, TransportEvents, TransportFactory, TransportOptions};

pub use seedswarm_types::{ConnectionId, DiscoveryKey, IntoDiscoveryKey, NetworkIdentity, PublicKey};
