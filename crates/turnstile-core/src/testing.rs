//! Virtual-time environment for deterministic tests.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use std::time::Duration;

use crate::env::Environment;

/// A point in virtual time, milliseconds since an arbitrary epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SimInstant(Duration);

impl SimInstant {
    /// Instant at the given offset from the virtual epoch.
    pub fn from_millis(ms: u64) -> Self {
        Self(Duration::from_millis(ms))
    }
}

impl std::ops::Sub for SimInstant {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Duration {
        self.0.saturating_sub(rhs.0)
    }
}

/// Environment with a manually advanced clock.
///
/// Clones share the clock, so a test can hold one handle to advance time
/// while the coordinator holds another.
#[derive(Debug, Clone, Default)]
pub struct SimEnv {
    now_ms: Arc<AtomicU64>,
}

impl SimEnv {
    /// Environment starting at the virtual epoch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the clock.
    pub fn advance(&self, duration: Duration) {
        self.now_ms.fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Environment for SimEnv {
    type Instant = SimInstant;

    fn now(&self) -> SimInstant {
        SimInstant::from_millis(self.now_ms.load(Ordering::SeqCst))
    }

    // Virtual time never blocks; tests drive ticks explicitly.
    fn sleep(&self, _duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        std::future::ready(())
    }
}
