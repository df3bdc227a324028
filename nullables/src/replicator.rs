//! Nullable replication provider: records every session it is asked to attach
//! and holds on to its channel.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use seedswarm_network::{Duplex, NetworkError, ReplicationOptions, Replicator};
use seedswarm_types::{ConnectionId, DiscoveryKey, NetworkIdentity};

/// One `replicate` call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplicationCall {
    pub key: DiscoveryKey,
    pub connection: ConnectionId,
    pub id: NetworkIdentity,
    pub encrypt: bool,
    pub live: bool,
}

/// Opens the requested channel on the stream, as a real store would when
/// attaching its session, records the call and keeps the channel handle
/// until a test takes it.
#[derive(Default)]
pub struct NullReplicator {
    calls: Mutex<Vec<ReplicationCall>>,
    failing: Mutex<HashSet<DiscoveryKey>>,
    channels: Mutex<HashMap<(ConnectionId, DiscoveryKey), Box<dyn Duplex>>>,
}

impl NullReplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every future `replicate` for `key` fail.
    pub fn fail_for(&self, key: DiscoveryKey) {
        self.failing.lock().unwrap().insert(key);
    }

    pub fn calls(&self) -> Vec<ReplicationCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Take the channel handle opened for `key` on `connection`, to drive the
    /// replication session by hand.
    pub fn take_channel(
        &self,
        connection: ConnectionId,
        key: &DiscoveryKey,
    ) -> Option<Box<dyn Duplex>> {
        self.channels.lock().unwrap().remove(&(connection, *key))
    }

    /// Calls for `key` only.
    pub fn calls_for(&self, key: &DiscoveryKey) -> Vec<ReplicationCall> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.key == *key)
            .cloned()
            .collect()
    }
}

impl Replicator for NullReplicator {
    fn replicate(
        &self,
        discovery_key: &DiscoveryKey,
        options: ReplicationOptions<'_>,
    ) -> Result<(), NetworkError> {
        if self.failing.lock().unwrap().contains(discovery_key) {
            return Err(NetworkError::Replication(format!(
                "no local store for {discovery_key}"
            )));
        }
        let channel = options.stream.open_channel(discovery_key);
        self.channels
            .lock()
            .unwrap()
            .insert((options.connection, *discovery_key), channel);
        self.calls.lock().unwrap().push(ReplicationCall {
            key: *discovery_key,
            connection: options.connection,
            id: *options.id,
            encrypt: options.encrypt,
            live: options.live,
        });
        Ok(())
    }
}
