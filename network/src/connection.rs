//! Raw swarm connections and the loopback policy.

use std::net::{IpAddr, SocketAddr};

use seedswarm_types::{ConnectionId, DiscoveryKey};
use tokio::io::{AsyncRead, AsyncWrite};

/// A bidirectional byte pipe: a raw socket, or the wire end of a protocol stream.
pub trait Duplex: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> Duplex for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// What the transport knows about a connection when it hands it over.
#[derive(Clone, Debug)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    /// Whether we dialed this connection.
    pub client: bool,
    pub remote_addr: Option<SocketAddr>,
    /// Topics the transport already associates with this peer.
    pub topics: Vec<DiscoveryKey>,
}

impl ConnectionInfo {
    pub fn new(id: ConnectionId, client: bool, remote_addr: Option<SocketAddr>) -> Self {
        Self {
            id,
            client,
            remote_addr,
            topics: Vec::new(),
        }
    }

    pub fn with_topics(mut self, topics: Vec<DiscoveryKey>) -> Self {
        self.topics = topics;
        self
    }

    /// Whether the remote end is this machine.
    pub fn is_loopback(&self) -> bool {
        self.remote_addr.is_some_and(|addr| is_loopback(addr.ip()))
    }
}

/// Loopback check covering `127.0.0.0/8`, `::1` and IPv4-mapped loopback
/// (`::ffff:127.0.0.1`), which dual-stack sockets report for local peers.
pub fn is_loopback(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback(),
        IpAddr::V6(v6) => {
            v6.is_loopback() || v6.to_ipv4_mapped().is_some_and(|v4| v4.is_loopback())
        }
    }
}
