//! Connection registry tracking announced clients and apps.
//!
//! Connections must explicitly announce themselves before any other request
//! is honored. The registry maintains a reverse index room → app so the
//! coordinator can route `client.to.app` payloads in O(1).
//!
//! Disconnect reconciliation uses the registry as the liveness authority:
//! a connection absent from here is dead regardless of what any room's
//! queue still says.

use std::collections::HashMap;

use turnstile_proto::{AppProfile, ClientProfile, ConnectionId, RoomId};

/// What a forgotten connection was, returned by [`ConnectionRegistry::forget`].
#[derive(Debug, Clone, PartialEq)]
pub enum ForgottenConnection {
    /// The connection had announced as a client.
    Client(ClientProfile),
    /// The connection had announced as an app; the room it controlled.
    App(AppProfile),
    /// The connection never announced.
    Unknown,
}

/// Registry of announced connections.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    /// Connection → client profile
    clients: HashMap<ConnectionId, ClientProfile>,
    /// Connection → app profile
    apps: HashMap<ConnectionId, AppProfile>,
    /// Room → controlling app connection (reverse index)
    room_apps: HashMap<RoomId, ConnectionId>,
}

impl ConnectionRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a client announce, replacing any previous profile.
    ///
    /// Returns `false` when the connection was already announced (the call is
    /// then a profile refresh, not a new registration).
    pub fn announce_client(&mut self, profile: ClientProfile) -> bool {
        self.clients.insert(profile.id, profile).is_none()
    }

    /// Record an app announce.
    ///
    /// Returns `false` if this connection already announced an app; one
    /// connection controls at most one room.
    pub fn announce_app(&mut self, profile: AppProfile) -> bool {
        if self.apps.contains_key(&profile.id) {
            return false;
        }
        self.room_apps.insert(profile.room_id.clone(), profile.id);
        self.apps.insert(profile.id, profile);
        true
    }

    /// Client profile for a connection. `None` if it never announced.
    pub fn client(&self, conn_id: ConnectionId) -> Option<&ClientProfile> {
        self.clients.get(&conn_id)
    }

    /// Check whether a connection announced as a client.
    pub fn is_client(&self, conn_id: ConnectionId) -> bool {
        self.clients.contains_key(&conn_id)
    }

    /// Check whether a connection is known at all (client or app).
    pub fn is_alive(&self, conn_id: ConnectionId) -> bool {
        self.clients.contains_key(&conn_id) || self.apps.contains_key(&conn_id)
    }

    /// Room controlled by an app connection.
    pub fn app_room(&self, conn_id: ConnectionId) -> Option<&RoomId> {
        self.apps.get(&conn_id).map(|profile| &profile.room_id)
    }

    /// App connection controlling a room. O(1) via reverse index.
    pub fn app_for_room(&self, room_id: &str) -> Option<ConnectionId> {
        self.room_apps.get(room_id).copied()
    }

    /// Drop an app's registration without touching its client entry.
    ///
    /// Used on explicit `app.leave`, where the connection stays open.
    pub fn forget_app(&mut self, conn_id: ConnectionId) -> Option<AppProfile> {
        let profile = self.apps.remove(&conn_id)?;
        self.room_apps.remove(&profile.room_id);
        Some(profile)
    }

    /// Remove every trace of a connection, maintaining the reverse index.
    pub fn forget(&mut self, conn_id: ConnectionId) -> ForgottenConnection {
        if let Some(profile) = self.apps.remove(&conn_id) {
            self.room_apps.remove(&profile.room_id);
            self.clients.remove(&conn_id);
            return ForgottenConnection::App(profile);
        }
        match self.clients.remove(&conn_id) {
            Some(profile) => ForgottenConnection::Client(profile),
            None => ForgottenConnection::Unknown,
        }
    }

    /// Number of announced clients.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::Map;

    use super::*;

    fn client(id: ConnectionId) -> ClientProfile {
        ClientProfile::new(id, Map::new())
    }

    fn app(id: ConnectionId, room: &str) -> AppProfile {
        AppProfile::new(id, room.to_string(), Map::new())
    }

    #[test]
    fn announce_and_lookup_client() {
        let mut registry = ConnectionRegistry::new();

        assert!(registry.announce_client(client(1)));
        assert!(registry.is_client(1));
        assert!(!registry.is_client(2));
        assert_eq!(registry.client(1).unwrap().id, 1);
    }

    #[test]
    fn re_announce_refreshes_not_registers() {
        let mut registry = ConnectionRegistry::new();

        assert!(registry.announce_client(client(1)));
        assert!(!registry.announce_client(client(1)));
        assert_eq!(registry.client_count(), 1);
    }

    #[test]
    fn app_reverse_index_resolves_room() {
        let mut registry = ConnectionRegistry::new();

        assert!(registry.announce_app(app(9, "tv-wall")));
        assert_eq!(registry.app_for_room("tv-wall"), Some(9));
        assert_eq!(registry.app_room(9).unwrap(), "tv-wall");
    }

    #[test]
    fn one_app_per_connection() {
        let mut registry = ConnectionRegistry::new();

        assert!(registry.announce_app(app(9, "a")));
        assert!(!registry.announce_app(app(9, "b")));
        assert_eq!(registry.app_room(9).unwrap(), "a");
    }

    #[test]
    fn forget_cleans_reverse_index() {
        let mut registry = ConnectionRegistry::new();

        registry.announce_app(app(9, "tv-wall"));
        let forgotten = registry.forget(9);
        assert!(matches!(forgotten, ForgottenConnection::App(profile) if profile.room_id == "tv-wall"));
        assert_eq!(registry.app_for_room("tv-wall"), None);

        assert_eq!(registry.forget(9), ForgottenConnection::Unknown);
    }

    #[test]
    fn forget_app_keeps_nothing_behind() {
        let mut registry = ConnectionRegistry::new();

        registry.announce_app(app(9, "tv-wall"));
        assert!(registry.forget_app(9).is_some());
        assert!(registry.forget_app(9).is_none());
        assert_eq!(registry.app_for_room("tv-wall"), None);
    }
}
