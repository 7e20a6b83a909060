//! Structured wire error carried on the `_error` event.
//!
//! Errors never cross the transport as exceptions; the requester receives a
//! `{status, code, error, data}` object and other room members are never
//! notified of someone else's failed request.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Structured error payload for the `_error` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireError {
    /// HTTP-style status of the failure.
    pub status: u16,
    /// Stable machine-readable code.
    pub code: String,
    /// Human-readable description.
    pub error: String,
    /// Optional per-error detail (e.g. the rejected settings keys).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl WireError {
    /// Build an error without detail data.
    pub fn new(status: u16, code: impl Into<String>, error: impl Into<String>) -> Self {
        Self { status, code: code.into(), error: error.into(), data: None }
    }

    /// Attach detail data.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn wire_error_omits_absent_data() {
        let err = WireError::new(404, "ROOM_NOT_FOUND", "room not found: demo");
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value, json!({
            "status": 404,
            "code": "ROOM_NOT_FOUND",
            "error": "room not found: demo",
        }));
    }

    #[test]
    fn wire_error_carries_data() {
        let err = WireError::new(409, "SETTING_OVERRIDE_NOT_ALLOWED", "override rejected")
            .with_data(json!(["maxClients"]));
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["data"], json!(["maxClients"]));
    }
}
