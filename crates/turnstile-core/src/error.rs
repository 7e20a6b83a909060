//! Coordinator error types.
//!
//! Every request failure maps to an HTTP-style status plus a stable machine
//! code; the pair travels to the requester as a [`WireError`] on the `_error`
//! event. Failures are unicast: other room members never learn about someone
//! else's rejected request.

use serde_json::json;
use turnstile_proto::{ConnectionId, RoomId, WireError};

/// Errors produced while handling a request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoordinatorError {
    /// Target room does not exist.
    #[error("room not found: {0}")]
    RoomNotFound(RoomId),

    /// The room already has a controlling app.
    #[error("room {0} already has an app")]
    RoomAlreadyHasApp(RoomId),

    /// This connection already announced an app for another room.
    #[error("connection {0} already announced an app")]
    AppAlreadyAnnounced(ConnectionId),

    /// Room creation would exceed the configured room limit.
    #[error("maximum number of rooms reached ({0})")]
    MaxRoomsReached(u64),

    /// Server configuration forbids creating rooms at runtime.
    #[error("room creation is not allowed")]
    RoomCreationNotAllowed,

    /// Requested room id does not match the configured creation pattern.
    #[error("room id {id:?} does not match pattern {pattern:?}")]
    RoomIdPatternMismatch {
        /// The rejected room id.
        id: RoomId,
        /// The configured pattern.
        pattern: String,
    },

    /// The app tried to override settings keys the server does not allow.
    #[error("settings override not allowed for: {}", keys.join(", "))]
    SettingOverrideNotAllowed {
        /// The offending wire-format keys.
        keys: Vec<String>,
    },

    /// The connection sent a request before announcing itself.
    #[error("connection {0} has not announced itself")]
    NotAnnounced(ConnectionId),

    /// The client already occupies a slot in this room.
    #[error("already joined room {0}")]
    AlreadyJoined(RoomId),

    /// The request requires room membership the client does not have.
    #[error("not joined to room {0}")]
    NotJoined(RoomId),
}

impl CoordinatorError {
    /// HTTP-style status for this failure.
    pub fn status(&self) -> u16 {
        match self {
            Self::RoomNotFound(_) => 404,
            Self::RoomAlreadyHasApp(_) | Self::NotJoined(_) => 400,
            Self::AppAlreadyAnnounced(_)
            | Self::RoomIdPatternMismatch { .. }
            | Self::SettingOverrideNotAllowed { .. }
            | Self::AlreadyJoined(_) => 409,
            Self::MaxRoomsReached(_) => 403,
            Self::RoomCreationNotAllowed => 405,
            Self::NotAnnounced(_) => 401,
        }
    }

    /// Stable machine-readable code for this failure.
    pub fn code(&self) -> &'static str {
        match self {
            Self::RoomNotFound(_) => "ROOM_NOT_FOUND",
            Self::RoomAlreadyHasApp(_) => "ROOM_ALREADY_HAS_APP",
            Self::AppAlreadyAnnounced(_) => "APP_ALREADY_ANNOUNCED",
            Self::MaxRoomsReached(_) => "MAX_ROOMS_REACHED",
            Self::RoomCreationNotAllowed => "ROOM_CREATION_NOT_ALLOWED",
            Self::RoomIdPatternMismatch { .. } => "ROOM_ID_PATTERN_MISMATCH",
            Self::SettingOverrideNotAllowed { .. } => "SETTING_OVERRIDE_NOT_ALLOWED",
            Self::NotAnnounced(_) => "NOT_ANNOUNCED",
            Self::AlreadyJoined(_) => "ALREADY_JOINED",
            Self::NotJoined(_) => "NOT_JOINED",
        }
    }

    /// Convert into the wire payload sent on the `_error` event.
    pub fn to_wire(&self) -> WireError {
        let error = WireError::new(self.status(), self.code(), self.to_string());
        match self {
            Self::SettingOverrideNotAllowed { keys } => error.with_data(json!(keys)),
            _ => error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_and_code_are_stable() {
        let err = CoordinatorError::RoomNotFound("demo".to_string());
        assert_eq!(err.status(), 404);
        assert_eq!(err.code(), "ROOM_NOT_FOUND");

        let err = CoordinatorError::RoomCreationNotAllowed;
        assert_eq!(err.status(), 405);

        let err = CoordinatorError::NotAnnounced(7);
        assert_eq!(err.status(), 401);
    }

    #[test]
    fn settings_override_carries_offending_keys() {
        let err = CoordinatorError::SettingOverrideNotAllowed {
            keys: vec!["maxClients".to_string(), "pickedTimeout".to_string()],
        };
        let wire = err.to_wire();
        assert_eq!(wire.status, 409);
        assert_eq!(wire.data, Some(json!(["maxClients", "pickedTimeout"])));
        assert!(wire.error.contains("maxClients"));
    }
}
