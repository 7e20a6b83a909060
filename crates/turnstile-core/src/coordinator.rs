//! Room admission coordinator.
//!
//! Single-writer event loop core: the runtime feeds one
//! [`CoordinatorEvent`] at a time (requests, disconnects, ticks) and executes
//! the returned [`CoordinatorAction`]s. All state lives here; the transport
//! owns only sockets and group membership. Timers are not callbacks but
//! countdown records evaluated on `Tick`, so expiry, cancellation, and
//! request handling can never race.

use std::collections::BTreeMap;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use turnstile_proto::{
    AppProfile, ClientProfile, ConnectionId, OutboundEvent, Request, RoomId, RoomSettingsPatch,
    RoomSnapshot,
};

use crate::{
    config::{ConfigError, ServerConfig},
    env::Environment,
    error::CoordinatorError,
    registry::ConnectionRegistry,
    room::{JoinOutcome, Room, TimerKind},
};

/// Events the coordinator processes, produced by the runtime.
#[derive(Debug, Clone)]
pub enum CoordinatorEvent {
    /// A decoded request arrived from a connection.
    Request {
        /// Connection that sent the request.
        conn_id: ConnectionId,
        /// The decoded request.
        request: Request,
    },

    /// A connection was closed (by peer or error).
    Disconnected {
        /// Connection that was closed.
        conn_id: ConnectionId,
    },

    /// Periodic tick for countdown evaluation.
    Tick,
}

/// Actions the coordinator produces, executed by the runtime.
///
/// Sends are fire-and-forget: a slow or dead receiver never blocks the
/// event loop, it just misses events until its disconnect is processed.
#[derive(Debug, Clone)]
pub enum CoordinatorAction {
    /// Send an event to one connection.
    Send {
        /// Target connection.
        conn_id: ConnectionId,
        /// Event to deliver.
        event: OutboundEvent,
    },

    /// Send an event to every connection in a room's transport group.
    BroadcastRoom {
        /// Target room.
        room_id: RoomId,
        /// Event to deliver.
        event: OutboundEvent,
        /// Connection to exclude (usually the subject of the event).
        exclude: Option<ConnectionId>,
    },

    /// Send an event to every connection.
    BroadcastAll {
        /// Event to deliver.
        event: OutboundEvent,
    },

    /// Add a connection to a room's transport group.
    JoinGroup {
        /// Connection to add.
        conn_id: ConnectionId,
        /// Target room.
        room_id: RoomId,
    },

    /// Remove a connection from a room's transport group.
    LeaveGroup {
        /// Connection to remove.
        conn_id: ConnectionId,
        /// Target room.
        room_id: RoomId,
    },
}

/// The coordinator: rooms, registry, and admission policy.
pub struct Coordinator<E: Environment> {
    env: E,
    config: ServerConfig,
    room_id_pattern: Option<Regex>,
    registry: ConnectionRegistry,
    rooms: BTreeMap<RoomId, Room<E::Instant>>,
}

impl<E: Environment> Coordinator<E> {
    /// Create a coordinator with the configured rooms pre-declared.
    pub fn new(env: E, config: ServerConfig) -> Result<Self, ConfigError> {
        let room_id_pattern = config.compiled_room_id_pattern()?;
        let mut rooms = BTreeMap::new();
        for declared in &config.rooms {
            let name = declared.name.clone().unwrap_or_else(|| declared.id.clone());
            rooms.insert(
                declared.id.clone(),
                Room::new(declared.id.clone(), name, declared.settings.clone()),
            );
        }
        Ok(Self { env, config, room_id_pattern, registry: ConnectionRegistry::new(), rooms })
    }

    /// Number of rooms currently existing.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Snapshot of one room, if it exists.
    pub fn room_snapshot(&self, room_id: &str) -> Option<RoomSnapshot> {
        self.rooms.get(room_id).map(Room::snapshot)
    }

    /// Process one event and return the actions to execute.
    ///
    /// This is the main entry point. Request failures become a unicast
    /// `_error` to the requester; they never abort the loop.
    pub fn process_event(&mut self, event: CoordinatorEvent) -> Vec<CoordinatorAction> {
        match event {
            CoordinatorEvent::Request { conn_id, request } => {
                match self.handle_request(conn_id, request) {
                    Ok(actions) => actions,
                    Err(err) => {
                        debug!(conn_id, error = %err, "request rejected");
                        vec![CoordinatorAction::Send {
                            conn_id,
                            event: OutboundEvent::Error(err.to_wire()),
                        }]
                    },
                }
            },
            CoordinatorEvent::Disconnected { conn_id } => self.handle_disconnected(conn_id),
            CoordinatorEvent::Tick => self.handle_tick(),
        }
    }

    fn handle_request(
        &mut self,
        conn_id: ConnectionId,
        request: Request,
    ) -> Result<Vec<CoordinatorAction>, CoordinatorError> {
        match request {
            Request::ClientAnnounce(fields) => self.handle_client_announce(conn_id, fields),
            Request::AppAnnounce { profile, room_id, settings } => {
                self.handle_app_announce(conn_id, profile, room_id, settings)
            },
            Request::Join(room_id) => self.handle_join(conn_id, room_id),
            Request::Leave(room_id) => self.handle_leave(conn_id, &room_id),
            Request::ToClients { room_id, payload } => {
                self.handle_to_clients(conn_id, room_id, payload)
            },
            Request::ToApp { room_id, payload } => self.handle_to_app(conn_id, &room_id, payload),
            Request::AppData { payload, client_ids } => {
                self.handle_app_data(conn_id, payload, client_ids)
            },
            Request::AppLeave => self.handle_app_leave(conn_id),
        }
    }

    /// Announce a client and send it the room directory.
    ///
    /// A duplicate announce on an already-registered connection is a silent
    /// no-op, so clients can safely retransmit after a flaky handshake
    /// without double-registering.
    fn handle_client_announce(
        &mut self,
        conn_id: ConnectionId,
        fields: Map<String, Value>,
    ) -> Result<Vec<CoordinatorAction>, CoordinatorError> {
        if self.registry.is_client(conn_id) {
            debug!(conn_id, "duplicate announce ignored");
            return Ok(Vec::new());
        }
        let profile = ClientProfile::new(conn_id, fields);
        self.registry.announce_client(profile.clone());
        info!(conn_id, "client announced");
        Ok(vec![
            CoordinatorAction::Send { conn_id, event: OutboundEvent::ClientAnnounced(profile) },
            CoordinatorAction::Send {
                conn_id,
                event: OutboundEvent::AvailableRooms(self.snapshots()),
            },
        ])
    }

    fn handle_app_announce(
        &mut self,
        conn_id: ConnectionId,
        fields: Map<String, Value>,
        room_id: RoomId,
        settings: Option<RoomSettingsPatch>,
    ) -> Result<Vec<CoordinatorAction>, CoordinatorError> {
        if self.registry.app_room(conn_id).is_some() {
            return Err(CoordinatorError::AppAlreadyAnnounced(conn_id));
        }

        if let Some(room) = self.rooms.get_mut(&room_id) {
            if room.app().is_some() {
                return Err(CoordinatorError::RoomAlreadyHasApp(room_id));
            }
            // Settings patches only apply at creation time
            if settings.as_ref().is_some_and(|patch| !patch.is_empty()) {
                debug!(room = %room_id, "settings patch ignored for existing room");
            }
            room.set_app(conn_id);
            info!(room = %room_id, conn_id, "app attached to existing room");
        } else {
            self.create_room(conn_id, &room_id, settings.as_ref())?;
        }

        self.registry.announce_app(AppProfile::new(conn_id, room_id.clone(), fields));
        let snapshot = self.snapshot_of(&room_id)?;
        Ok(vec![
            CoordinatorAction::Send {
                conn_id,
                event: OutboundEvent::AppAnnounced(snapshot.clone()),
            },
            CoordinatorAction::JoinGroup { conn_id, room_id },
            CoordinatorAction::Send { conn_id, event: OutboundEvent::AppJoined(snapshot.clone()) },
            CoordinatorAction::BroadcastAll { event: OutboundEvent::RoomData(snapshot) },
        ])
    }

    /// Create a room on behalf of an announcing app, enforcing creation
    /// policy: creation allowed, room limit, id pattern, settings override.
    fn create_room(
        &mut self,
        conn_id: ConnectionId,
        room_id: &str,
        settings: Option<&RoomSettingsPatch>,
    ) -> Result<(), CoordinatorError> {
        if !self.config.allow_new_rooms {
            return Err(CoordinatorError::RoomCreationNotAllowed);
        }
        if self.config.max_rooms >= 0 && self.rooms.len() as i64 >= self.config.max_rooms {
            return Err(CoordinatorError::MaxRoomsReached(self.config.max_rooms as u64));
        }
        if let Some(pattern) = &self.room_id_pattern {
            if !pattern.is_match(room_id) {
                return Err(CoordinatorError::RoomIdPatternMismatch {
                    id: room_id.to_string(),
                    pattern: pattern.as_str().to_string(),
                });
            }
        }

        let settings = match settings {
            Some(patch) if !patch.is_empty() => {
                let rejected =
                    self.config.allow_settings_override.rejected_keys(&patch.keys());
                if !rejected.is_empty() {
                    return Err(CoordinatorError::SettingOverrideNotAllowed { keys: rejected });
                }
                patch.apply(&self.config.default_new_room_settings)
            },
            _ => self.config.default_new_room_settings.clone(),
        };

        let mut room = Room::new(room_id.to_string(), room_id.to_string(), settings);
        room.set_app(conn_id);
        self.rooms.insert(room_id.to_string(), room);
        info!(room = %room_id, conn_id, "room created");
        Ok(())
    }

    fn handle_join(
        &mut self,
        conn_id: ConnectionId,
        room_id: RoomId,
    ) -> Result<Vec<CoordinatorAction>, CoordinatorError> {
        let profile = self
            .registry
            .client(conn_id)
            .cloned()
            .ok_or(CoordinatorError::NotAnnounced(conn_id))?;
        let now = self.env.now();
        let room = self
            .rooms
            .get_mut(&room_id)
            .ok_or_else(|| CoordinatorError::RoomNotFound(room_id.clone()))?;

        let outcome = room.join(conn_id, profile.clone(), now);
        let snapshot = room.snapshot();
        match outcome {
            JoinOutcome::Admitted { confirmed_pick } => {
                info!(conn_id, room = %room_id, confirmed_pick, "client joined");
                let mut actions = Vec::new();
                // A confirmed pick is already in the group from when it queued
                if !confirmed_pick {
                    actions.push(CoordinatorAction::JoinGroup {
                        conn_id,
                        room_id: room_id.clone(),
                    });
                }
                actions.push(CoordinatorAction::Send {
                    conn_id,
                    event: OutboundEvent::RoomJoined(snapshot.clone()),
                });
                actions.push(CoordinatorAction::BroadcastRoom {
                    room_id,
                    event: OutboundEvent::RoomClientJoined {
                        room: snapshot.clone(),
                        client: profile,
                    },
                    exclude: Some(conn_id),
                });
                actions.push(CoordinatorAction::BroadcastAll {
                    event: OutboundEvent::RoomData(snapshot),
                });
                Ok(actions)
            },
            JoinOutcome::Queued { position } => {
                info!(conn_id, room = %room_id, position, "client queued");
                let mut actions = vec![
                    CoordinatorAction::JoinGroup { conn_id, room_id: room_id.clone() },
                    CoordinatorAction::Send {
                        conn_id,
                        event: OutboundEvent::RoomQueued(snapshot.clone()),
                    },
                    CoordinatorAction::BroadcastRoom {
                        room_id: room_id.clone(),
                        event: OutboundEvent::RoomClientQueued {
                            room: snapshot.clone(),
                            client: profile,
                        },
                        exclude: Some(conn_id),
                    },
                    CoordinatorAction::BroadcastAll {
                        event: OutboundEvent::RoomData(snapshot),
                    },
                ];
                actions.extend(self.pick_loop(&room_id));
                Ok(actions)
            },
            JoinOutcome::AlreadyActive => Err(CoordinatorError::AlreadyJoined(room_id)),
            JoinOutcome::AlreadyQueued => Ok(vec![CoordinatorAction::Send {
                conn_id,
                event: OutboundEvent::RoomQueued(snapshot),
            }]),
        }
    }

    /// Leave is idempotent: leaving a room one is not in changes nothing and
    /// emits nothing. Only an unknown room id is an error.
    fn handle_leave(
        &mut self,
        conn_id: ConnectionId,
        room_id: &str,
    ) -> Result<Vec<CoordinatorAction>, CoordinatorError> {
        if !self.registry.is_client(conn_id) {
            return Err(CoordinatorError::NotAnnounced(conn_id));
        }
        let room = self
            .rooms
            .get(room_id)
            .ok_or_else(|| CoordinatorError::RoomNotFound(room_id.to_string()))?;
        if !room.is_member(conn_id) {
            debug!(conn_id, room = %room_id, "leave without membership ignored");
            return Ok(Vec::new());
        }
        self.remove_from_room(conn_id, room_id, true)
    }

    /// Take a client out of a room and reconcile: notify, free the slot,
    /// promote the next waiter.
    fn remove_from_room(
        &mut self,
        conn_id: ConnectionId,
        room_id: &str,
        notify_subject: bool,
    ) -> Result<Vec<CoordinatorAction>, CoordinatorError> {
        let room = self
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| CoordinatorError::RoomNotFound(room_id.to_string()))?;
        let report = room.leave(conn_id);
        let Some(profile) = report.profile.clone() else {
            return Err(CoordinatorError::NotJoined(room_id.to_string()));
        };
        let snapshot = room.snapshot();

        info!(
            conn_id,
            room = %room_id,
            was_active = report.was_active,
            was_queued = report.was_queued,
            was_picked = report.was_picked,
            "client left room"
        );

        let mut actions = Vec::new();
        if notify_subject {
            actions.push(CoordinatorAction::Send {
                conn_id,
                event: OutboundEvent::RoomLeft(snapshot.clone()),
            });
        }
        actions.push(CoordinatorAction::LeaveGroup {
            conn_id,
            room_id: room_id.to_string(),
        });
        actions.push(CoordinatorAction::BroadcastRoom {
            room_id: room_id.to_string(),
            event: OutboundEvent::RoomClientLeft { room: snapshot.clone(), client: profile },
            exclude: Some(conn_id),
        });
        actions.push(CoordinatorAction::BroadcastAll {
            event: OutboundEvent::RoomData(snapshot),
        });
        if report.freed_slot() {
            actions.extend(self.pick_loop(room_id));
        }
        Ok(actions)
    }

    /// Promote waiters while free slots remain, skipping dead connections.
    fn pick_loop(&mut self, room_id: &str) -> Vec<CoordinatorAction> {
        let now = self.env.now();
        let mut actions = Vec::new();
        let registry = &self.registry;
        let Some(room) = self.rooms.get_mut(room_id) else {
            return actions;
        };

        while let Some(picked) = room.pick_next(now, |conn| registry.is_client(conn)) {
            let snapshot = room.snapshot();
            let Some(profile) = room.client_profile(picked).cloned() else {
                continue;
            };
            info!(conn_id = picked, room = %room_id, "client picked");
            actions.push(CoordinatorAction::Send {
                conn_id: picked,
                event: OutboundEvent::RoomPicked(snapshot.clone()),
            });
            actions.push(CoordinatorAction::BroadcastRoom {
                room_id: room_id.to_string(),
                event: OutboundEvent::RoomClientPicked { room: snapshot.clone(), client: profile },
                exclude: Some(picked),
            });
            actions.push(CoordinatorAction::BroadcastAll {
                event: OutboundEvent::RoomData(snapshot),
            });
        }
        actions
    }

    fn handle_to_clients(
        &mut self,
        conn_id: ConnectionId,
        room_id: RoomId,
        payload: Value,
    ) -> Result<Vec<CoordinatorAction>, CoordinatorError> {
        let profile = self
            .registry
            .client(conn_id)
            .cloned()
            .ok_or(CoordinatorError::NotAnnounced(conn_id))?;
        let room = self
            .rooms
            .get(&room_id)
            .ok_or_else(|| CoordinatorError::RoomNotFound(room_id.clone()))?;
        if !room.is_active(conn_id) {
            return Err(CoordinatorError::NotJoined(room_id));
        }
        Ok(vec![CoordinatorAction::BroadcastRoom {
            room_id,
            event: OutboundEvent::RoomClientData { client: profile, payload },
            exclude: Some(conn_id),
        }])
    }

    fn handle_to_app(
        &mut self,
        conn_id: ConnectionId,
        room_id: &str,
        payload: Value,
    ) -> Result<Vec<CoordinatorAction>, CoordinatorError> {
        let profile = self
            .registry
            .client(conn_id)
            .cloned()
            .ok_or(CoordinatorError::NotAnnounced(conn_id))?;
        let room = self
            .rooms
            .get(room_id)
            .ok_or_else(|| CoordinatorError::RoomNotFound(room_id.to_string()))?;
        if !room.is_active(conn_id) {
            return Err(CoordinatorError::NotJoined(room_id.to_string()));
        }
        match room.app() {
            Some(app) => Ok(vec![CoordinatorAction::Send {
                conn_id: app,
                event: OutboundEvent::ClientData { client: profile, payload },
            }]),
            None => {
                debug!(room = %room_id, "client payload dropped, room has no app");
                Ok(Vec::new())
            },
        }
    }

    fn handle_app_data(
        &mut self,
        conn_id: ConnectionId,
        payload: Value,
        client_ids: Option<Vec<ConnectionId>>,
    ) -> Result<Vec<CoordinatorAction>, CoordinatorError> {
        let room_id = self
            .registry
            .app_room(conn_id)
            .cloned()
            .ok_or(CoordinatorError::NotAnnounced(conn_id))?;
        let room = self
            .rooms
            .get(&room_id)
            .ok_or_else(|| CoordinatorError::RoomNotFound(room_id.clone()))?;

        match client_ids {
            Some(targets) => Ok(targets
                .into_iter()
                .filter(|&target| room.is_active(target))
                .map(|target| CoordinatorAction::Send {
                    conn_id: target,
                    event: OutboundEvent::RoomAppData {
                        room_id: room_id.clone(),
                        payload: payload.clone(),
                    },
                })
                .collect()),
            None => Ok(vec![CoordinatorAction::BroadcastRoom {
                room_id: room_id.clone(),
                event: OutboundEvent::RoomAppData { room_id, payload },
                exclude: Some(conn_id),
            }]),
        }
    }

    fn handle_app_leave(
        &mut self,
        conn_id: ConnectionId,
    ) -> Result<Vec<CoordinatorAction>, CoordinatorError> {
        let room_id = self
            .registry
            .app_room(conn_id)
            .cloned()
            .ok_or(CoordinatorError::NotAnnounced(conn_id))?;
        Ok(self.close_room(&room_id))
    }

    /// Close a room: notify members, clear group membership, drop all state.
    ///
    /// Dropping the room also drops its countdown table, so no timer can
    /// fire for a closed room.
    fn close_room(&mut self, room_id: &str) -> Vec<CoordinatorAction> {
        let Some(room) = self.rooms.remove(room_id) else {
            return Vec::new();
        };
        let app = room.app();
        let snapshot = room.snapshot();
        info!(room = %room_id, "room closed");

        let mut actions = vec![CoordinatorAction::BroadcastRoom {
            room_id: room_id.to_string(),
            event: OutboundEvent::RoomClosed(snapshot),
            exclude: app,
        }];
        for member in room.member_ids() {
            actions.push(CoordinatorAction::LeaveGroup {
                conn_id: member,
                room_id: room_id.to_string(),
            });
        }
        if let Some(app) = app {
            actions.push(CoordinatorAction::LeaveGroup {
                conn_id: app,
                room_id: room_id.to_string(),
            });
            self.registry.forget_app(app);
        }
        actions.push(CoordinatorAction::BroadcastAll {
            event: OutboundEvent::AvailableRooms(self.snapshots()),
        });
        actions
    }

    /// Reconcile a dropped connection: close its room if it was an app,
    /// remove it from every room it occupied, forget it.
    fn handle_disconnected(&mut self, conn_id: ConnectionId) -> Vec<CoordinatorAction> {
        info!(conn_id, "connection closed");
        let mut actions = Vec::new();

        if let Some(room_id) = self.registry.app_room(conn_id).cloned() {
            actions.extend(self.close_room(&room_id));
        }

        let member_rooms: Vec<RoomId> = self
            .rooms
            .iter()
            .filter(|(_, room)| room.is_member(conn_id))
            .map(|(id, _)| id.clone())
            .collect();
        for room_id in member_rooms {
            if let Ok(mut removed) = self.remove_from_room(conn_id, &room_id, false) {
                actions.append(&mut removed);
            }
        }

        self.registry.forget(conn_id);
        actions
    }

    /// Evaluate every room's countdowns against the current time.
    fn handle_tick(&mut self) -> Vec<CoordinatorAction> {
        let now = self.env.now();
        let mut actions = Vec::new();
        let room_ids: Vec<RoomId> = self.rooms.keys().cloned().collect();

        for room_id in room_ids {
            let fires = match self.rooms.get_mut(&room_id) {
                Some(room) => room.tick(now),
                None => continue,
            };

            for fire in fires {
                match (fire.kind, fire.expired) {
                    (TimerKind::Picked, true) => {
                        warn!(conn_id = fire.conn_id, room = %room_id, "missed turn");
                        if let Ok(mut removed) =
                            self.remove_from_room(fire.conn_id, &room_id, false)
                        {
                            if let Some(snapshot) = self.room_snapshot(&room_id) {
                                actions.push(CoordinatorAction::Send {
                                    conn_id: fire.conn_id,
                                    event: OutboundEvent::MissedTurn(snapshot),
                                });
                            }
                            actions.append(&mut removed);
                        }
                    },
                    (TimerKind::Session, true) => {
                        info!(conn_id = fire.conn_id, room = %room_id, "session expired");
                        if let Ok(mut removed) =
                            self.remove_from_room(fire.conn_id, &room_id, true)
                        {
                            actions.append(&mut removed);
                        }
                    },
                    (kind, false) => {
                        if let Some(snapshot) = self.room_snapshot(&room_id) {
                            let event = match kind {
                                TimerKind::Picked => OutboundEvent::PickedRemainingTimeout {
                                    room: snapshot,
                                    remaining_ms: fire.remaining_ms,
                                },
                                TimerKind::Session => OutboundEvent::SessionRemainingTimeout {
                                    room: snapshot,
                                    remaining_ms: fire.remaining_ms,
                                },
                            };
                            actions.push(CoordinatorAction::Send {
                                conn_id: fire.conn_id,
                                event,
                            });
                        }
                    },
                }
            }
        }
        actions
    }

    fn snapshots(&self) -> Vec<RoomSnapshot> {
        self.rooms.values().map(Room::snapshot).collect()
    }

    fn snapshot_of(&self, room_id: &str) -> Result<RoomSnapshot, CoordinatorError> {
        self.room_snapshot(room_id)
            .ok_or_else(|| CoordinatorError::RoomNotFound(room_id.to_string()))
    }
}

impl<E: Environment> std::fmt::Debug for Coordinator<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("room_count", &self.rooms.len())
            .field("client_count", &self.registry.client_count())
            .finish()
    }
}
