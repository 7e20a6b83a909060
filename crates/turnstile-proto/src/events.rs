//! Inbound requests and outbound events.
//!
//! The transport delivers named events with structured payloads in both
//! directions. [`Request`] is the closed set of events clients and apps may
//! send; [`OutboundEvent`] is the closed catalogue the coordinator emits.
//! Multi-argument events (snapshot + profile, snapshot + remaining time)
//! serialize as JSON arrays, matching the positional arguments of the
//! original wire protocol.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{ClientProfile, ConnectionId, RoomId, RoomSettingsPatch, RoomSnapshot, WireError};

/// A named event plus payload, ready for the transport codec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    /// Wire event name.
    pub event: String,
    /// Event payload.
    pub data: Value,
}

/// Inbound transport events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum Request {
    /// Announce a client connection with arbitrary profile data.
    #[serde(rename = "client.announce")]
    ClientAnnounce(Map<String, Value>),

    /// Announce the controlling app of a room, optionally creating it.
    #[serde(rename = "app.announce")]
    AppAnnounce {
        /// Arbitrary app profile data.
        profile: Map<String, Value>,
        /// Room to control (existing or to be created).
        #[serde(rename = "roomId")]
        room_id: RoomId,
        /// Settings overrides for room creation.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        settings: Option<RoomSettingsPatch>,
    },

    /// Ask to join a room (also the picked-confirmation path).
    #[serde(rename = "client.join")]
    Join(RoomId),

    /// Leave a room.
    #[serde(rename = "client.leave")]
    Leave(RoomId),

    /// Relay an opaque payload to the other active clients of a room.
    #[serde(rename = "client.to.clients")]
    ToClients {
        /// Target room.
        #[serde(rename = "roomId")]
        room_id: RoomId,
        /// Opaque payload, relayed uninterpreted.
        payload: Value,
    },

    /// Relay an opaque payload to the room's app.
    #[serde(rename = "client.to.app")]
    ToApp {
        /// Target room.
        #[serde(rename = "roomId")]
        room_id: RoomId,
        /// Opaque payload, relayed uninterpreted.
        payload: Value,
    },

    /// App fan-out to its room's active clients, optionally targeted.
    #[serde(rename = "app.data")]
    AppData {
        /// Opaque payload, relayed uninterpreted.
        payload: Value,
        /// Specific recipients; absent means every active client.
        #[serde(rename = "clientIds", default, skip_serializing_if = "Option::is_none")]
        client_ids: Option<Vec<ConnectionId>>,
    },

    /// App leaves, closing its room.
    #[serde(rename = "app.leave")]
    AppLeave,
}

/// Outbound transport events.
///
/// [`OutboundEvent::name`] yields the wire event name; room-scoped data
/// events embed the room id. The payload layout is fixed per variant.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundEvent {
    /// Announce acknowledged; profile now carries the connection id.
    ClientAnnounced(ClientProfile),
    /// Directory of all rooms, sent right after a client announce.
    AvailableRooms(Vec<RoomSnapshot>),
    /// App announce acknowledged.
    AppAnnounced(RoomSnapshot),
    /// App placed in its room's transport group.
    AppJoined(RoomSnapshot),
    /// Structured request failure, unicast to the requester only.
    Error(WireError),

    /// The subject has been queued.
    RoomQueued(RoomSnapshot),
    /// The subject has been promoted and may confirm by joining again.
    RoomPicked(RoomSnapshot),
    /// The subject now occupies a slot.
    RoomJoined(RoomSnapshot),
    /// The subject has left the room.
    RoomLeft(RoomSnapshot),
    /// The room has been closed by its app.
    RoomClosed(RoomSnapshot),
    /// The subject did not confirm its promotion within the window.
    MissedTurn(RoomSnapshot),

    /// Another client has been queued (room broadcast, subject excluded).
    RoomClientQueued {
        /// Post-mutation snapshot.
        room: RoomSnapshot,
        /// The queued client.
        client: ClientProfile,
    },
    /// Another client has been promoted.
    RoomClientPicked {
        /// Post-mutation snapshot.
        room: RoomSnapshot,
        /// The promoted client.
        client: ClientProfile,
    },
    /// Another client now occupies a slot.
    RoomClientJoined {
        /// Post-mutation snapshot.
        room: RoomSnapshot,
        /// The admitted client.
        client: ClientProfile,
    },
    /// Another client has left.
    RoomClientLeft {
        /// Post-mutation snapshot.
        room: RoomSnapshot,
        /// The departed client.
        client: ClientProfile,
    },

    /// Full snapshot broadcast to every connection on any room mutation.
    RoomData(RoomSnapshot),

    /// Per-second countdown while the subject holds a picked slot.
    PickedRemainingTimeout {
        /// Current snapshot.
        room: RoomSnapshot,
        /// Remaining acceptance window in ms.
        remaining_ms: u64,
    },
    /// Per-second countdown near the end of the subject's session.
    SessionRemainingTimeout {
        /// Current snapshot.
        room: RoomSnapshot,
        /// Remaining session time in ms.
        remaining_ms: u64,
    },

    /// Opaque client payload relayed to the other room clients.
    RoomClientData {
        /// Sender profile.
        client: ClientProfile,
        /// Opaque payload.
        payload: Value,
    },
    /// Opaque client payload relayed to the room's app.
    ClientData {
        /// Sender profile.
        client: ClientProfile,
        /// Opaque payload.
        payload: Value,
    },
    /// Opaque app payload relayed to room clients.
    RoomAppData {
        /// Room the app controls (part of the event name).
        room_id: RoomId,
        /// Opaque payload.
        payload: Value,
    },
}

fn json<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

impl OutboundEvent {
    /// Wire event name for this event.
    pub fn name(&self) -> String {
        match self {
            Self::ClientAnnounced(_) => "client.announced".to_string(),
            Self::AvailableRooms(_) => "available-rooms".to_string(),
            Self::AppAnnounced(_) => "app.announced".to_string(),
            Self::AppJoined(_) => "app.joined".to_string(),
            Self::Error(_) => "_error".to_string(),
            Self::RoomQueued(_) => "room.queued".to_string(),
            Self::RoomPicked(_) => "room.picked".to_string(),
            Self::RoomJoined(_) => "room.joined".to_string(),
            Self::RoomLeft(_) => "room.left".to_string(),
            Self::RoomClosed(_) => "room.closed".to_string(),
            Self::MissedTurn(_) => "missed-turn".to_string(),
            Self::RoomClientQueued { .. } => "room.client.queued".to_string(),
            Self::RoomClientPicked { .. } => "room.client.picked".to_string(),
            Self::RoomClientJoined { .. } => "room.client.joined".to_string(),
            Self::RoomClientLeft { .. } => "room.client.left".to_string(),
            Self::RoomData(room) => format!("room.{}.data", room.id),
            Self::PickedRemainingTimeout { .. } => "room.picked-remaining-timeout".to_string(),
            Self::SessionRemainingTimeout { .. } => "session-remaining-timeout".to_string(),
            Self::RoomClientData { .. } => "room.client.data".to_string(),
            Self::ClientData { .. } => "client.data".to_string(),
            Self::RoomAppData { room_id, .. } => format!("room.{room_id}.app.data"),
        }
    }

    /// Payload for this event.
    ///
    /// Two-argument events serialize as positional JSON arrays.
    pub fn payload(&self) -> Value {
        match self {
            Self::ClientAnnounced(profile) => json(profile),
            Self::AvailableRooms(rooms) => json(rooms),
            Self::AppAnnounced(room)
            | Self::AppJoined(room)
            | Self::RoomQueued(room)
            | Self::RoomPicked(room)
            | Self::RoomJoined(room)
            | Self::RoomLeft(room)
            | Self::RoomClosed(room)
            | Self::MissedTurn(room)
            | Self::RoomData(room) => json(room),
            Self::Error(error) => json(error),
            Self::RoomClientQueued { room, client }
            | Self::RoomClientPicked { room, client }
            | Self::RoomClientJoined { room, client }
            | Self::RoomClientLeft { room, client } => Value::Array(vec![json(room), json(client)]),
            Self::PickedRemainingTimeout { room, remaining_ms }
            | Self::SessionRemainingTimeout { room, remaining_ms } => {
                Value::Array(vec![json(room), json(remaining_ms)])
            },
            Self::RoomClientData { client, payload } | Self::ClientData { client, payload } => {
                Value::Array(vec![json(client), payload.clone()])
            },
            Self::RoomAppData { payload, .. } => payload.clone(),
        }
    }

    /// Package the event for the transport codec.
    pub fn to_message(&self) -> WireMessage {
        WireMessage { event: self.name(), data: self.payload() }
    }
}
