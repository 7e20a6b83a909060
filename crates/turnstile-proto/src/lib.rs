//! Wire-level catalogue for the turnstile room coordinator.
//!
//! Every message that crosses the transport boundary is defined here: inbound
//! requests, outbound events, room snapshots, profiles, and the structured
//! error object. The types are plain serde data; the transport owns the actual
//! codec (JSON framing, optional deflate) and is deliberately out of scope.
//!
//! # Invariants
//!
//! - Each outbound event maps to exactly one wire event name (see
//!   [`OutboundEvent::name`]). Room-scoped data events embed the room id in
//!   the name (`room.<id>.data`).
//! - Errors are never thrown across the transport boundary; they travel as
//!   [`WireError`] payloads on the `_error` event.

pub mod error;
pub mod events;
pub mod profile;
pub mod settings;
pub mod snapshot;

pub use error::WireError;
pub use events::{OutboundEvent, Request, WireMessage};
pub use profile::{AppProfile, ClientProfile};
pub use settings::{RoomSettings, RoomSettingsPatch};
pub use snapshot::RoomSnapshot;

/// Connection identity assigned by the transport runtime.
pub type ConnectionId = u64;

/// Stable room identity, pre-configured or supplied by an app at creation.
pub type RoomId = String;
