//! Per-room tunables shared by configuration, creation requests, and
//! snapshots.
//!
//! All durations are milliseconds on the wire. `session_duration` uses `-1`
//! to mean "unbounded", matching the configuration format.

use serde::{Deserialize, Serialize};

/// Tunables of a single room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoomSettings {
    /// Capacity of simultaneously active occupants. `0` means unlimited.
    pub max_clients: u32,
    /// Acceptance window after a queued client is promoted, in ms.
    pub picked_timeout: u64,
    /// Maximum time an active occupant may hold its slot, in ms.
    /// `-1` means unbounded.
    pub session_duration: i64,
    /// How long before session end the countdown notifications start, in ms.
    pub end_session_notification_timeout: u64,
    /// Informational average session length echoed to clients for wait-time
    /// estimation, in ms. Static configuration, not a computed statistic.
    pub average_session_duration: u64,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            max_clients: 10,
            picked_timeout: 10_000,
            session_duration: 10_000,
            end_session_notification_timeout: 5_000,
            average_session_duration: 10_000,
        }
    }
}

/// Partial settings supplied by an app when creating a room.
///
/// Only the present keys override the configured defaults; which keys are
/// allowed to override is a server-side policy decision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoomSettingsPatch {
    /// Override for [`RoomSettings::max_clients`].
    pub max_clients: Option<u32>,
    /// Override for [`RoomSettings::picked_timeout`].
    pub picked_timeout: Option<u64>,
    /// Override for [`RoomSettings::session_duration`].
    pub session_duration: Option<i64>,
    /// Override for [`RoomSettings::end_session_notification_timeout`].
    pub end_session_notification_timeout: Option<u64>,
    /// Override for [`RoomSettings::average_session_duration`].
    pub average_session_duration: Option<u64>,
}

impl RoomSettingsPatch {
    /// Wire names of the keys present in this patch, in declaration order.
    pub fn keys(&self) -> Vec<&'static str> {
        let mut keys = Vec::new();
        if self.max_clients.is_some() {
            keys.push("maxClients");
        }
        if self.picked_timeout.is_some() {
            keys.push("pickedTimeout");
        }
        if self.session_duration.is_some() {
            keys.push("sessionDuration");
        }
        if self.end_session_notification_timeout.is_some() {
            keys.push("endSessionNotificationTimeout");
        }
        if self.average_session_duration.is_some() {
            keys.push("averageSessionDuration");
        }
        keys
    }

    /// True when the patch overrides nothing.
    pub fn is_empty(&self) -> bool {
        self.keys().is_empty()
    }

    /// Apply this patch on top of base settings.
    pub fn apply(&self, base: &RoomSettings) -> RoomSettings {
        RoomSettings {
            max_clients: self.max_clients.unwrap_or(base.max_clients),
            picked_timeout: self.picked_timeout.unwrap_or(base.picked_timeout),
            session_duration: self.session_duration.unwrap_or(base.session_duration),
            end_session_notification_timeout: self
                .end_session_notification_timeout
                .unwrap_or(base.end_session_notification_timeout),
            average_session_duration: self
                .average_session_duration
                .unwrap_or(base.average_session_duration),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn patch_keys_reflect_present_fields() {
        let patch = RoomSettingsPatch {
            max_clients: Some(2),
            session_duration: Some(-1),
            ..RoomSettingsPatch::default()
        };
        assert_eq!(patch.keys(), vec!["maxClients", "sessionDuration"]);
        assert!(!patch.is_empty());
        assert!(RoomSettingsPatch::default().is_empty());
    }

    #[test]
    fn patch_applies_on_top_of_defaults() {
        let patch = RoomSettingsPatch { max_clients: Some(1), ..RoomSettingsPatch::default() };
        let merged = patch.apply(&RoomSettings::default());
        assert_eq!(merged.max_clients, 1);
        assert_eq!(merged.picked_timeout, RoomSettings::default().picked_timeout);
    }

    #[test]
    fn settings_deserialize_from_camel_case() {
        let settings: RoomSettings =
            serde_json::from_value(json!({ "maxClients": 3, "sessionDuration": -1 })).unwrap();
        assert_eq!(settings.max_clients, 3);
        assert_eq!(settings.session_duration, -1);
        // Missing keys fall back to defaults
        assert_eq!(settings.picked_timeout, 10_000);
    }
}
