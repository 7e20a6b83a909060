//! Delivery surface the runtime drives with coordinator actions.
//!
//! The coordinator decides WHO receives an event; the transport owns HOW it
//! gets there, including the room-to-connection group membership that backs
//! room broadcasts. All delivery is fire-and-forget: a dead or slow receiver
//! is simply skipped, and the coordinator hears about it later through a
//! `Disconnected` event.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::debug;
use turnstile_proto::{ConnectionId, RoomId, WireMessage};

/// Fire-and-forget message delivery plus group membership.
pub trait Transport: Send + Sync + 'static {
    /// Deliver a message to one connection.
    fn send(&self, conn_id: ConnectionId, message: WireMessage);

    /// Deliver a message to every connection in a room's group.
    fn broadcast_room(&self, room_id: &str, message: WireMessage, exclude: Option<ConnectionId>);

    /// Deliver a message to every registered connection.
    fn broadcast_all(&self, message: WireMessage);

    /// Add a connection to a room's group.
    fn join_group(&self, conn_id: ConnectionId, room_id: &str);

    /// Remove a connection from a room's group.
    fn leave_group(&self, conn_id: ConnectionId, room_id: &str);
}

#[derive(Default)]
struct Channels {
    /// Connection → outbound queue, drained by that connection's writer task
    senders: HashMap<ConnectionId, mpsc::UnboundedSender<WireMessage>>,
    /// Room → group members
    groups: HashMap<RoomId, HashSet<ConnectionId>>,
}

/// In-process transport over unbounded channels.
///
/// The TCP listener registers each accepted connection here and spawns a
/// writer task on the receiving end; tests consume the receivers directly.
#[derive(Default)]
pub struct ChannelTransport {
    inner: Mutex<Channels>,
}

impl ChannelTransport {
    /// Create an empty transport.
    pub fn new() -> Self {
        Self::default()
    }

    // Lock methods never await while holding the guard
    fn locked(&self) -> MutexGuard<'_, Channels> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a connection, returning the receiving end of its queue.
    pub fn register(&self, conn_id: ConnectionId) -> mpsc::UnboundedReceiver<WireMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.locked().senders.insert(conn_id, tx);
        rx
    }

    /// Drop a connection's queue and group memberships.
    pub fn unregister(&self, conn_id: ConnectionId) {
        let mut inner = self.locked();
        inner.senders.remove(&conn_id);
        inner.groups.retain(|_, members| {
            members.remove(&conn_id);
            !members.is_empty()
        });
    }

    /// Number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.locked().senders.len()
    }
}

impl Transport for ChannelTransport {
    fn send(&self, conn_id: ConnectionId, message: WireMessage) {
        let inner = self.locked();
        match inner.senders.get(&conn_id) {
            // A closed receiver means the connection is going away; its
            // Disconnected event will clean up
            Some(sender) => {
                let _ = sender.send(message);
            },
            None => debug!(conn_id, event = %message.event, "send to unknown connection dropped"),
        }
    }

    fn broadcast_room(&self, room_id: &str, message: WireMessage, exclude: Option<ConnectionId>) {
        let inner = self.locked();
        let Some(members) = inner.groups.get(room_id) else {
            return;
        };
        for &conn_id in members {
            if Some(conn_id) == exclude {
                continue;
            }
            if let Some(sender) = inner.senders.get(&conn_id) {
                let _ = sender.send(message.clone());
            }
        }
    }

    fn broadcast_all(&self, message: WireMessage) {
        let inner = self.locked();
        for sender in inner.senders.values() {
            let _ = sender.send(message.clone());
        }
    }

    fn join_group(&self, conn_id: ConnectionId, room_id: &str) {
        self.locked().groups.entry(room_id.to_string()).or_default().insert(conn_id);
    }

    fn leave_group(&self, conn_id: ConnectionId, room_id: &str) {
        let mut inner = self.locked();
        if let Some(members) = inner.groups.get_mut(room_id) {
            members.remove(&conn_id);
            if members.is_empty() {
                inner.groups.remove(room_id);
            }
        }
    }
}
