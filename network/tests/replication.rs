//! Two networkers replicating over one in-memory connection.
//!
//! A and B each run the null protocol on their end of a socket pair, so
//! handshakes and channel requests really cross the wire: B's replicator opens
//! a channel, the open line reaches A's stream, and A decides whether to serve.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use seedswarm_network::{
    ConnectionInfo, DiscoveryKey, Duplex, NetworkIdentity, NetworkerConfig, PublicKey,
    SeedOptions, SwarmNetworker,
};
use seedswarm_nullables::{NullProtocol, NullReplicator, NullTransportFactory};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

const K1: DiscoveryKey = DiscoveryKey::new([0x11; 32]);
const K2: DiscoveryKey = DiscoveryKey::new([0x22; 32]);
/// Seeded by both sides; its arrival at A proves every earlier line was handled.
const SENTINEL: DiscoveryKey = DiscoveryKey::new([0x33; 32]);

struct Peer {
    net: SwarmNetworker,
    transport: NullTransportFactory,
    replicator: Arc<NullReplicator>,
}

fn peer(identity: [u8; 32]) -> Peer {
    let transport = NullTransportFactory::new();
    let replicator = Arc::new(NullReplicator::new());
    let mut net = SwarmNetworker::new(
        replicator.clone(),
        Arc::new(NullProtocol::new()),
        Arc::new(transport.clone()),
        NetworkerConfig::default().with_identity(NetworkIdentity::new(identity)),
    )
    .expect("networker");
    net.listen().expect("listen");
    Peer {
        net,
        transport,
        replicator,
    }
}

fn addr() -> Option<SocketAddr> {
    Some("198.51.100.20:49737".parse().unwrap())
}

async fn drive_pair(a: &mut Peer, b: &mut Peer, done: impl Fn(&Peer, &Peer) -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !done(&*a, &*b) {
            tokio::select! {
                _ = a.net.tick() => {}
                _ = b.net.tick() => {}
            }
        }
    })
    .await
    .expect("peers did not converge");
}

async fn read_within(channel: &mut dyn Duplex, buf: &mut [u8]) {
    tokio::time::timeout(Duration::from_secs(5), channel.read_exact(buf))
        .await
        .expect("channel data did not arrive")
        .unwrap();
}

#[tokio::test]
async fn seeded_key_is_served_and_unseeded_key_is_refused() {
    let mut a = peer([0xA1; 32]);
    let mut b = peer([0xB2; 32]);

    a.net.seed(K1, SeedOptions::default()).unwrap();
    a.net.seed(SENTINEL, SeedOptions::default()).unwrap();
    b.net.seed(K1, SeedOptions::default()).unwrap();
    b.net.seed(K2, SeedOptions::default()).unwrap();
    b.net.seed(SENTINEL, SeedOptions::default()).unwrap();

    // B found A through K1 and dialed it.
    let (a_socket, b_socket) = tokio::io::duplex(64 * 1024);
    let a_conn = a.transport.next_connection_id();
    let b_conn = b.transport.next_connection_id();
    a.transport
        .deliver(Box::new(a_socket), ConnectionInfo::new(a_conn, false, addr()));
    b.transport.deliver(
        Box::new(b_socket),
        ConnectionInfo::new(b_conn, true, addr()).with_topics(vec![K1]),
    );

    drive_pair(&mut a, &mut b, |a, _| !a.replicator.calls_for(&K1).is_empty()).await;

    let calls = a.replicator.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].key, K1);
    assert_eq!(calls[0].connection, a_conn);
    assert_eq!(a.net.streams_for(&K1), vec![a_conn]);
    assert_eq!(b.net.streams_for(&K1), vec![b_conn]);

    // B now asks for K2, which A never seeded, then for the sentinel.
    b.transport.announce_topic(b_conn, K2);
    b.transport.announce_topic(b_conn, SENTINEL);
    drive_pair(&mut a, &mut b, |a, b| {
        !a.replicator.calls_for(&SENTINEL).is_empty() && !b.transport.deduplicated().is_empty()
    })
    .await;

    assert!(a.replicator.calls_for(&K2).is_empty());
    assert!(!a.net.is_indexed(&K2));
    assert_eq!(a.replicator.calls_for(&K1).len(), 1);
    assert_eq!(b.replicator.calls_for(&K2).len(), 1);

    // Both handshakes were reported for deduplication.
    let a_key = PublicKey::new([0xA1; 32]);
    let b_key = PublicKey::new([0xB2; 32]);
    assert_eq!(a.transport.deduplicated(), vec![(a_conn, a_key, b_key)]);
    assert_eq!(b.transport.deduplicated(), vec![(b_conn, b_key, a_key)]);

    a.net.close().await.unwrap();
    b.net.close().await.unwrap();
}

#[tokio::test]
async fn unseed_closes_the_channel_on_the_remote_side_too() {
    let mut a = peer([0xA1; 32]);
    let mut b = peer([0xB2; 32]);
    a.net.seed(K1, SeedOptions::default()).unwrap();
    b.net.seed(K1, SeedOptions::default()).unwrap();

    let (a_socket, b_socket) = tokio::io::duplex(64 * 1024);
    let a_conn = a.transport.next_connection_id();
    let b_conn = b.transport.next_connection_id();
    a.transport.deliver(
        Box::new(a_socket),
        ConnectionInfo::new(a_conn, false, addr()).with_topics(vec![K1]),
    );
    b.transport
        .deliver(Box::new(b_socket), ConnectionInfo::new(b_conn, true, addr()));

    drive_pair(&mut a, &mut b, |a, b| a.net.is_indexed(&K1) && b.net.is_indexed(&K1)).await;

    // The two providers talk over the channel each was handed.
    let mut a_channel = a.replicator.take_channel(a_conn, &K1).expect("A's channel");
    let mut b_channel = b.replicator.take_channel(b_conn, &K1).expect("B's channel");
    a_channel.write_all(b"want 0..8").await.unwrap();
    let mut request = [0u8; 9];
    read_within(b_channel.as_mut(), &mut request).await;
    assert_eq!(&request, b"want 0..8");
    b_channel.write_all(b"have").await.unwrap();
    let mut reply = [0u8; 4];
    read_within(a_channel.as_mut(), &mut reply).await;
    assert_eq!(&reply, b"have");

    a.net.unseed(K1).unwrap();
    assert!(!a.net.is_indexed(&K1));

    // A's close line reaches B, whose stream reports the channel closed.
    drive_pair(&mut a, &mut b, |_, b| !b.net.is_indexed(&K1)).await;
    assert!(b.net.is_seeding(&K1));
    assert_eq!(b.net.active_streams(), vec![b_conn]);
    assert_eq!(a.net.active_streams(), vec![a_conn]);

    // B's provider sees its channel end.
    let mut rest = [0u8; 1];
    let read = tokio::time::timeout(Duration::from_secs(5), b_channel.read(&mut rest))
        .await
        .expect("B's channel stayed open");
    assert!(matches!(read, Ok(0) | Err(_)));
}
