//! Notifications the networker emits to its observers.

use seedswarm_types::ConnectionId;

use crate::NetworkError;

/// Asynchronous failures surfaced to the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NetworkerEvent {
    /// Swarm-level failure. Existing streams are untouched.
    Error(NetworkError),
    /// One connection's pipe or replication session failed. Only that
    /// connection is affected.
    ReplicationError {
        connection: ConnectionId,
        error: NetworkError,
    },
}

/// Synchronous fan-out event bus for [`NetworkerEvent`]s.
///
/// Listeners run inline on the task driving the networker; keep them short.
pub struct EventBus {
    listeners: Vec<Box<dyn Fn(&NetworkerEvent) + Send + Sync>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    pub fn subscribe(&mut self, listener: Box<dyn Fn(&NetworkerEvent) + Send + Sync>) {
        self.listeners.push(listener);
    }

    pub fn emit(&self, event: &NetworkerEvent) {
        for listener in &self.listeners {
            listener(event);
        }
    }

    #[cfg(test)]
    fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn emit_reaches_every_listener_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::new();

        for tag in ["first", "second"] {
            let seen = Arc::clone(&seen);
            bus.subscribe(Box::new(move |event: &NetworkerEvent| {
                seen.lock().unwrap().push((tag, event.clone()));
            }));
        }

        let event = NetworkerEvent::Error(NetworkError::Transport("dht down".into()));
        bus.emit(&event);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], ("first", event.clone()));
        assert_eq!(seen[1], ("second", event));
    }

    #[test]
    fn emit_without_listeners_is_a_no_op() {
        let bus = EventBus::default();
        assert_eq!(bus.listener_count(), 0);
        bus.emit(&NetworkerEvent::ReplicationError {
            connection: ConnectionId(3),
            error: NetworkError::Connection("reset".into()),
        });
    }
}
