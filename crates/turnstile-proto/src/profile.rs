//! Caller-supplied profile data for clients and apps.
//!
//! Profiles are opaque to the coordinator beyond the `id` the server stamps
//! on announce; arbitrary caller fields (username, color, ...) are carried
//! through untouched via serde flattening.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{ConnectionId, RoomId};

/// Profile of an announced client connection.
///
/// Created on `client.announce`, destroyed on disconnect. The `id` field is
/// authoritative (stamped by the server); everything else is caller data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientProfile {
    /// Connection id assigned by the transport.
    pub id: ConnectionId,
    /// Arbitrary caller fields, flattened into the serialized object.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ClientProfile {
    /// Stamp a connection id onto raw announce data.
    pub fn new(id: ConnectionId, fields: Map<String, Value>) -> Self {
        Self { id, fields }
    }
}

/// Profile of the single controlling app connection of a room.
///
/// Created on `app.announce`; at most one per room. Destroyed on disconnect
/// or explicit `app.leave`, both of which close the room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppProfile {
    /// Connection id assigned by the transport.
    pub id: ConnectionId,
    /// Room this app controls.
    #[serde(rename = "roomId")]
    pub room_id: RoomId,
    /// Arbitrary caller fields.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl AppProfile {
    /// Stamp a connection id and room onto raw announce data.
    pub fn new(id: ConnectionId, room_id: RoomId, fields: Map<String, Value>) -> Self {
        Self { id, room_id, fields }
    }
}
