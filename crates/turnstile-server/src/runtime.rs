//! Serialized coordinator event loop.
//!
//! One task owns the coordinator. Requests, disconnects, and the periodic
//! tick all arrive through a single channel-fed loop, so coordinator state
//! never needs a lock and no two mutations can interleave. Executing an
//! action is a synchronous, non-blocking transport call; the loop never
//! awaits a send.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::trace;
use turnstile_core::{
    ConfigError, Coordinator, CoordinatorAction, CoordinatorEvent, Environment, ServerConfig,
};

use crate::transport::Transport;

/// How often countdowns are evaluated. Per-second countdown notifications
/// assume this is at most one second.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// The single-writer loop around a [`Coordinator`].
pub struct Runtime<E: Environment, T: Transport> {
    coordinator: Coordinator<E>,
    env: E,
    transport: Arc<T>,
    events: mpsc::UnboundedReceiver<CoordinatorEvent>,
}

impl<E: Environment, T: Transport> Runtime<E, T> {
    /// Build the loop around a fresh coordinator.
    pub fn new(
        env: E,
        config: ServerConfig,
        transport: Arc<T>,
        events: mpsc::UnboundedReceiver<CoordinatorEvent>,
    ) -> Result<Self, ConfigError> {
        let coordinator = Coordinator::new(env.clone(), config)?;
        Ok(Self { coordinator, env, transport, events })
    }

    /// Process events until every event sender is dropped.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                maybe_event = self.events.recv() => match maybe_event {
                    Some(event) => self.dispatch(event),
                    None => break,
                },
                () = self.env.sleep(TICK_INTERVAL) => self.dispatch(CoordinatorEvent::Tick),
            }
        }
    }

    /// Feed one event through the coordinator and execute its actions.
    pub fn dispatch(&mut self, event: CoordinatorEvent) {
        let actions = self.coordinator.process_event(event);
        for action in actions {
            self.execute(action);
        }
    }

    fn execute(&self, action: CoordinatorAction) {
        trace!(?action, "executing");
        match action {
            CoordinatorAction::Send { conn_id, event } => {
                self.transport.send(conn_id, event.to_message());
            },
            CoordinatorAction::BroadcastRoom { room_id, event, exclude } => {
                self.transport.broadcast_room(&room_id, event.to_message(), exclude);
            },
            CoordinatorAction::BroadcastAll { event } => {
                self.transport.broadcast_all(event.to_message());
            },
            CoordinatorAction::JoinGroup { conn_id, room_id } => {
                self.transport.join_group(conn_id, &room_id);
            },
            CoordinatorAction::LeaveGroup { conn_id, room_id } => {
                self.transport.leave_group(conn_id, &room_id);
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::Map;
    use turnstile_core::testing::SimEnv;
    use turnstile_proto::Request;

    use super::*;
    use crate::transport::ChannelTransport;

    fn runtime_with_room() -> (Runtime<SimEnv, ChannelTransport>, Arc<ChannelTransport>) {
        let transport = Arc::new(ChannelTransport::new());
        let (_tx, rx) = mpsc::unbounded_channel();
        let config: ServerConfig =
            serde_json::from_str(r#"{ "rooms": [{ "id": "demo", "maxClients": 2 }] }"#).unwrap();
        let runtime = Runtime::new(SimEnv::new(), config, Arc::clone(&transport), rx).unwrap();
        (runtime, transport)
    }

    #[tokio::test]
    async fn dispatch_delivers_through_the_transport() {
        let (mut runtime, transport) = runtime_with_room();
        let mut rx = transport.register(1);

        runtime.dispatch(CoordinatorEvent::Request {
            conn_id: 1,
            request: Request::ClientAnnounce(Map::new()),
        });

        assert_eq!(rx.try_recv().unwrap().event, "client.announced");
        assert_eq!(rx.try_recv().unwrap().event, "available-rooms");
    }

    #[tokio::test]
    async fn join_updates_group_membership_and_broadcasts() {
        let (mut runtime, transport) = runtime_with_room();
        let mut rx1 = transport.register(1);
        let mut rx2 = transport.register(2);

        for conn_id in [1, 2] {
            runtime.dispatch(CoordinatorEvent::Request {
                conn_id,
                request: Request::ClientAnnounce(Map::new()),
            });
            runtime.dispatch(CoordinatorEvent::Request {
                conn_id,
                request: Request::Join("demo".to_string()),
            });
        }

        let events1: Vec<String> =
            std::iter::from_fn(|| rx1.try_recv().ok()).map(|m| m.event).collect();
        // Client 1 sees its own admission, client 2's arrival, and the
        // snapshot broadcasts
        assert!(events1.contains(&"room.joined".to_string()));
        assert!(events1.contains(&"room.client.joined".to_string()));
        assert!(events1.iter().any(|e| e == "room.demo.data"));

        let events2: Vec<String> =
            std::iter::from_fn(|| rx2.try_recv().ok()).map(|m| m.event).collect();
        // Client 2 never sees a room.client.joined for itself
        assert!(events2.contains(&"room.joined".to_string()));
        assert!(!events2.contains(&"room.client.joined".to_string()));
    }
}
