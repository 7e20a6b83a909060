//! Fuzz target for the coordinator state machine
//!
//! # Strategy
//!
//! Arbitrary interleavings of announces, joins, leaves, app lifecycle,
//! disconnects, and clock advances against a small set of connections.
//!
//! # Invariants
//!
//! - Processing never panics
//! - Capacity is never exceeded, counting outstanding promotions
//! - A connection is never simultaneously active, picked, and queued
//! - The waiting queue contains no duplicates

#![no_main]

use std::time::Duration;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use serde_json::Map;
use turnstile_core::testing::SimEnv;
use turnstile_core::{Coordinator, CoordinatorEvent, RoomConfig, ServerConfig};
use turnstile_proto::{Request, RoomSettings};

#[derive(Debug, Clone, Arbitrary)]
struct Scenario {
    max_clients: u8,
    ops: Vec<Op>,
}

#[derive(Debug, Clone, Arbitrary)]
enum Op {
    Announce { conn: u8 },
    Join { conn: u8 },
    Leave { conn: u8 },
    AppAnnounce { conn: u8 },
    AppLeave { conn: u8 },
    Disconnect { conn: u8 },
    Advance { ms: u16 },
    Tick,
}

const ROOM: &str = "demo";

fuzz_target!(|scenario: Scenario| {
    let env = SimEnv::new();
    let config = ServerConfig {
        rooms: vec![RoomConfig {
            id: ROOM.to_string(),
            name: None,
            settings: RoomSettings {
                max_clients: u32::from(scenario.max_clients % 4),
                ..RoomSettings::default()
            },
        }],
        ..ServerConfig::default()
    };
    let Ok(mut coordinator) = Coordinator::new(env.clone(), config) else {
        return;
    };

    for op in scenario.ops {
        let event = match op {
            Op::Announce { conn } => CoordinatorEvent::Request {
                conn_id: u64::from(conn % 8),
                request: Request::ClientAnnounce(Map::new()),
            },
            Op::Join { conn } => CoordinatorEvent::Request {
                conn_id: u64::from(conn % 8),
                request: Request::Join(ROOM.to_string()),
            },
            Op::Leave { conn } => CoordinatorEvent::Request {
                conn_id: u64::from(conn % 8),
                request: Request::Leave(ROOM.to_string()),
            },
            Op::AppAnnounce { conn } => CoordinatorEvent::Request {
                conn_id: u64::from(conn % 8),
                request: Request::AppAnnounce {
                    profile: Map::new(),
                    room_id: ROOM.to_string(),
                    settings: None,
                },
            },
            Op::AppLeave { conn } => CoordinatorEvent::Request {
                conn_id: u64::from(conn % 8),
                request: Request::AppLeave,
            },
            Op::Disconnect { conn } => {
                CoordinatorEvent::Disconnected { conn_id: u64::from(conn % 8) }
            },
            Op::Advance { ms } => {
                env.advance(Duration::from_millis(u64::from(ms)));
                continue;
            },
            Op::Tick => CoordinatorEvent::Tick,
        };

        coordinator.process_event(event);

        let Some(snapshot) = coordinator.room_snapshot(ROOM) else {
            // An app closed the room; nothing left to check
            return;
        };

        let max = snapshot.max_clients as usize;
        if max > 0 {
            assert!(snapshot.active_clients.len() + snapshot.picked_clients.len() <= max);
        }
        for conn in &snapshot.queue {
            assert!(!snapshot.active_clients.contains_key(conn));
            assert!(!snapshot.picked_clients.contains(conn));
        }
        let mut deduped = snapshot.queue.clone();
        deduped.sort_unstable();
        deduped.dedup();
        assert_eq!(deduped.len(), snapshot.queue.len());
    }
});
