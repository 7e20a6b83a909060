//! Sans-IO room admission coordinator.
//!
//! Capacity-limited named rooms with one controlling app each, a FIFO
//! waiting queue, promotion with a bounded acceptance window, and
//! session-duration expiry. The coordinator is pure state-machine code: the
//! runtime feeds it events (requests, disconnects, ticks) one at a time and
//! executes the actions it returns. Time comes from an [`env::Environment`],
//! so the whole protocol runs under a virtual clock in tests.
//!
//! # Architecture
//!
//! - [`room::Room`]: per-room occupancy states and countdown table
//! - [`registry::ConnectionRegistry`]: announced clients and apps
//! - [`coordinator::Coordinator`]: request handling, admission policy,
//!   disconnect reconciliation
//! - [`config::ServerConfig`]: pre-declared rooms and creation policy

pub mod config;
pub mod coordinator;
pub mod env;
pub mod error;
pub mod registry;
pub mod room;
pub mod testing;

pub use config::{ConfigError, OverridePolicy, RoomConfig, ServerConfig};
pub use coordinator::{Coordinator, CoordinatorAction, CoordinatorEvent};
pub use env::Environment;
pub use error::CoordinatorError;
pub use registry::ConnectionRegistry;
pub use room::{CountdownFire, JoinOutcome, LeaveReport, Room, TimerKind};
