//! Full-room snapshots broadcast after every mutation.
//!
//! The snapshot is the single externally-visible view of a room. It is
//! rebuilt from authoritative server state after each mutation, so clients
//! never see stale queue or picked data.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{ClientProfile, ConnectionId, RoomId};

/// Serializable view of a room's complete state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    /// Stable room id.
    pub id: RoomId,
    /// Human-readable room name.
    pub name: String,
    /// Capacity of simultaneously active occupants (`0` = unlimited).
    pub max_clients: u32,
    /// Acceptance window after promotion, in ms.
    pub picked_timeout: u64,
    /// Maximum slot-holding time in ms (`-1` = unbounded).
    pub session_duration: i64,
    /// How long before session end countdown notifications start, in ms.
    pub end_session_notification_timeout: u64,
    /// Informational average session duration in ms.
    pub average_session_duration: u64,
    /// Controlling app connection, if any.
    pub app: Option<ConnectionId>,
    /// Everyone who has asked to join and not yet fully left.
    pub clients: BTreeMap<ConnectionId, ClientProfile>,
    /// Clients currently occupying a slot.
    pub active_clients: BTreeMap<ConnectionId, ClientProfile>,
    /// FIFO waiting line, head first.
    pub queue: Vec<ConnectionId>,
    /// Clients promoted from the queue but not yet confirmed-joined.
    pub picked_clients: Vec<ConnectionId>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn snapshot_serializes_camel_case() {
        let snapshot = RoomSnapshot {
            id: "demo".to_string(),
            name: "Demo".to_string(),
            max_clients: 2,
            picked_timeout: 10_000,
            session_duration: -1,
            end_session_notification_timeout: 5_000,
            average_session_duration: 10_000,
            app: Some(9),
            clients: BTreeMap::new(),
            active_clients: BTreeMap::new(),
            queue: vec![1, 2],
            picked_clients: vec![],
        };

        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["maxClients"], json!(2));
        assert_eq!(value["pickedClients"], json!([]));
        assert_eq!(value["queue"], json!([1, 2]));
        assert_eq!(value["app"], json!(9));
        assert_eq!(value["endSessionNotificationTimeout"], json!(5_000));
    }
}
