//! Nullable protocol stream: a plain-text channel protocol over the spliced pipe.
//!
//! Each stream writes one line per control message on its wire end:
//!
//! ```text
//! hello <public key hex>
//! open <discovery key hex>
//! data <discovery key hex> <payload hex>
//! close <discovery key hex>
//! ```
//!
//! and turns the lines it reads back into [`StreamEvents`]: `hello` completes
//! the handshake, `open` requests a channel, `close` closes one. `data` lines
//! carry channel bytes between the handles returned by `open_channel`, and
//! are buffered until the local side opens that channel. Two networkers
//! using `NullProtocol` on either end of an in-memory socket pair really talk
//! to each other. Tests can also skip the wire and fire events directly.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use seedswarm_network::{Duplex, ProtocolFactory, ProtocolStream, StreamEvents, WrappedStream};
use seedswarm_types::{ConnectionId, DiscoveryKey, NetworkIdentity, PublicKey};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

const WIRE_BUFFER: usize = 64 * 1024;
/// Largest payload carried by one `data` line.
const CHANNEL_CHUNK: usize = 4096;

/// What happened on one stream.
#[derive(Clone, Debug, Default)]
pub struct StreamRecord {
    pub initiator: bool,
    pub local: Option<PublicKey>,
    pub remote: Option<PublicKey>,
    /// Channels this side opened, in order.
    pub opened: Vec<DiscoveryKey>,
    /// Channels this side closed, in order.
    pub closed: Vec<DiscoveryKey>,
    pub destroyed: bool,
}

/// Inbound side of a channel, shared by a stream and its reader task.
enum ChannelInbox {
    /// Data that arrived before the local side opened the channel.
    Pending(Vec<Vec<u8>>),
    Open(mpsc::UnboundedSender<Vec<u8>>),
}

type Channels = Arc<Mutex<HashMap<DiscoveryKey, ChannelInbox>>>;

struct StreamSlot {
    record: Arc<Mutex<StreamRecord>>,
    events: StreamEvents,
}

/// Factory for [`NullStream`]s. Keeps every stream's record, keyed by connection.
#[derive(Clone, Default)]
pub struct NullProtocol {
    streams: Arc<Mutex<HashMap<ConnectionId, StreamSlot>>>,
}

impl NullProtocol {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a stream's record.
    pub fn record(&self, connection: ConnectionId) -> Option<StreamRecord> {
        let streams = self.streams.lock().unwrap();
        streams
            .get(&connection)
            .map(|slot| slot.record.lock().unwrap().clone())
    }

    /// Number of streams created so far.
    pub fn created(&self) -> usize {
        self.streams.lock().unwrap().len()
    }

    /// Events handle of a stream, for firing events without the wire.
    pub fn events(&self, connection: ConnectionId) -> Option<StreamEvents> {
        let streams = self.streams.lock().unwrap();
        streams.get(&connection).map(|slot| slot.events.clone())
    }

    /// Record `remote` as the peer key and report the handshake.
    pub fn complete_handshake(&self, connection: ConnectionId, remote: PublicKey) {
        let streams = self.streams.lock().unwrap();
        if let Some(slot) = streams.get(&connection) {
            slot.record.lock().unwrap().remote = Some(remote);
            slot.events.handshake();
        }
    }

    /// The peer on `connection` asks for a channel on `key`.
    pub fn request_channel(&self, connection: ConnectionId, key: DiscoveryKey) {
        if let Some(events) = self.events(connection) {
            events.discovery_key(key);
        }
    }

    /// The channel for `key` on `connection` closed from the peer's side.
    pub fn close_channel(&self, connection: ConnectionId, key: DiscoveryKey) {
        if let Some(events) = self.events(connection) {
            events.channel_closed(key);
        }
    }
}

impl ProtocolFactory for NullProtocol {
    fn create(
        &self,
        is_initiator: bool,
        identity: &NetworkIdentity,
        events: StreamEvents,
    ) -> WrappedStream {
        let local = PublicKey::new(*identity.as_bytes());
        let record = Arc::new(Mutex::new(StreamRecord {
            initiator: is_initiator,
            local: Some(local),
            ..StreamRecord::default()
        }));

        let (wire, inner) = tokio::io::duplex(WIRE_BUFFER);
        let (read_half, mut write_half) = tokio::io::split(inner);

        // The writer stops once the reader hits EOF, so a peer hang-up ends
        // the whole wire and with it the networker's pipe.
        let (eof_tx, mut eof_rx) = oneshot::channel::<()>();
        let (line_tx, mut line_rx) = mpsc::unbounded_channel::<String>();
        let writer = tokio::spawn(async move {
            loop {
                tokio::select! {
                    line = line_rx.recv() => match line {
                        Some(line) => {
                            if write_half.write_all(line.as_bytes()).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    },
                    _ = &mut eof_rx => break,
                }
            }
            let _ = write_half.shutdown().await;
        });
        let _ = line_tx.send(format!("hello {local}\n"));

        let channels = Channels::default();
        let reader = spawn_reader(
            read_half,
            Arc::clone(&record),
            Arc::clone(&channels),
            events.clone(),
            eof_tx,
        );

        self.streams.lock().unwrap().insert(
            events.connection(),
            StreamSlot {
                record: Arc::clone(&record),
                events,
            },
        );

        WrappedStream {
            stream: Box::new(NullStream {
                local,
                record,
                lines: line_tx,
                channels,
                channel_tasks: HashMap::new(),
                tasks: vec![writer, reader],
            }),
            wire: Box::new(wire),
        }
    }
}

fn spawn_reader(
    read_half: tokio::io::ReadHalf<tokio::io::DuplexStream>,
    record: Arc<Mutex<StreamRecord>>,
    channels: Channels,
    events: StreamEvents,
    eof: oneshot::Sender<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(read_half).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let Some((verb, arg)) = line.split_once(' ') else {
                continue;
            };
            match verb {
                "hello" => {
                    let Some(remote) = parse_public_key(arg) else {
                        continue;
                    };
                    record.lock().unwrap().remote = Some(remote);
                    events.handshake();
                }
                "open" => match arg.parse::<DiscoveryKey>() {
                    Ok(key) => events.discovery_key(key),
                    Err(e) => tracing::debug!(error = %e, "ignoring malformed open"),
                },
                "data" => match parse_data(arg) {
                    Some((key, payload)) => deliver(&channels, key, payload),
                    None => tracing::debug!("ignoring malformed data"),
                },
                "close" => match arg.parse::<DiscoveryKey>() {
                    Ok(key) => {
                        // Dropping the inbox ends the local handle's reads.
                        channels.lock().unwrap().remove(&key);
                        events.channel_closed(key);
                    }
                    Err(e) => tracing::debug!(error = %e, "ignoring malformed close"),
                },
                other => tracing::debug!(verb = other, "ignoring unknown line"),
            }
        }
        let _ = eof.send(());
    })
}

fn parse_data(arg: &str) -> Option<(DiscoveryKey, Vec<u8>)> {
    let (key, payload) = arg.split_once(' ')?;
    Some((key.parse().ok()?, hex::decode(payload).ok()?))
}

fn deliver(channels: &Channels, key: DiscoveryKey, payload: Vec<u8>) {
    let mut channels = channels.lock().unwrap();
    match channels
        .entry(key)
        .or_insert_with(|| ChannelInbox::Pending(Vec::new()))
    {
        ChannelInbox::Open(inbox) => {
            let _ = inbox.send(payload);
        }
        ChannelInbox::Pending(buffered) => buffered.push(payload),
    }
}

fn parse_public_key(hex_str: &str) -> Option<PublicKey> {
    // Same 32-byte hex shape as a discovery key.
    let key: DiscoveryKey = hex_str.parse().ok()?;
    Some(PublicKey::new(*key.as_bytes()))
}

/// The stream half kept by the networker.
pub struct NullStream {
    local: PublicKey,
    record: Arc<Mutex<StreamRecord>>,
    lines: mpsc::UnboundedSender<String>,
    channels: Channels,
    /// Pump tasks of each open channel.
    channel_tasks: HashMap<DiscoveryKey, Vec<JoinHandle<()>>>,
    tasks: Vec<JoinHandle<()>>,
}

impl NullStream {
    fn stop_channel(&mut self, key: &DiscoveryKey) {
        self.channels.lock().unwrap().remove(key);
        for task in self.channel_tasks.remove(key).into_iter().flatten() {
            task.abort();
        }
    }
}

impl ProtocolStream for NullStream {
    fn public_key(&self) -> PublicKey {
        self.local
    }

    fn remote_public_key(&self) -> Option<PublicKey> {
        self.record.lock().unwrap().remote
    }

    fn open_channel(&mut self, key: &DiscoveryKey) -> Box<dyn Duplex> {
        self.record.lock().unwrap().opened.push(*key);
        let _ = self.lines.send(format!("open {key}\n"));
        for task in self.channel_tasks.remove(key).into_iter().flatten() {
            task.abort();
        }

        let (local, handle) = tokio::io::duplex(WIRE_BUFFER);
        let (mut local_read, mut local_write) = tokio::io::split(local);

        let (inbox_tx, mut inbox_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        {
            let mut channels = self.channels.lock().unwrap();
            if let Some(ChannelInbox::Pending(buffered)) = channels.remove(key) {
                for payload in buffered {
                    let _ = inbox_tx.send(payload);
                }
            }
            channels.insert(*key, ChannelInbox::Open(inbox_tx));
        }

        let channel = *key;
        let lines = self.lines.clone();
        let outbound = tokio::spawn(async move {
            let mut buf = vec![0u8; CHANNEL_CHUNK];
            loop {
                match local_read.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        let line = format!("data {channel} {}\n", hex::encode(&buf[..n]));
                        if lines.send(line).is_err() {
                            break;
                        }
                    }
                }
            }
        });
        let inbound = tokio::spawn(async move {
            while let Some(payload) = inbox_rx.recv().await {
                if local_write.write_all(&payload).await.is_err() {
                    break;
                }
            }
            let _ = local_write.shutdown().await;
        });
        self.channel_tasks.insert(*key, vec![outbound, inbound]);

        Box::new(handle)
    }

    fn close_channel(&mut self, key: &DiscoveryKey) {
        self.record.lock().unwrap().closed.push(*key);
        let _ = self.lines.send(format!("close {key}\n"));
        self.stop_channel(key);
    }

    fn destroy(&mut self) {
        self.record.lock().unwrap().destroyed = true;
        self.channels.lock().unwrap().clear();
        for (_, tasks) in self.channel_tasks.drain() {
            for task in tasks {
                task.abort();
            }
        }
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_lines_parse_key_and_payload() {
        let key = DiscoveryKey::new([0x11; 32]);
        let parsed = parse_data(&format!("{key} 6869"));
        assert_eq!(parsed, Some((key, b"hi".to_vec())));
        assert_eq!(parse_data(&format!("{key} zz")), None);
        assert_eq!(parse_data("6869"), None);
    }

    #[test]
    fn data_before_open_is_buffered() {
        let key = DiscoveryKey::new([0x22; 32]);
        let channels = Channels::default();
        deliver(&channels, key, b"early".to_vec());
        let channels = channels.lock().unwrap();
        assert!(matches!(
            channels.get(&key),
            Some(ChannelInbox::Pending(buffered)) if buffered == &vec![b"early".to_vec()]
        ));
    }

    #[test]
    fn public_key_hex_parses() {
        let key = PublicKey::new([0xAB; 32]);
        assert_eq!(parse_public_key(&key.to_string()), Some(key));
        assert_eq!(parse_public_key("abc"), None);
    }
}
