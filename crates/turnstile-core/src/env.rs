//! Environment abstraction for deterministic testing.
//!
//! Decouples coordinator logic from system time. Countdowns are evaluated
//! against `now()` on each tick, so a virtual clock drives the whole state
//! machine in tests while production uses the monotonic system clock.

use std::time::Duration;

/// Abstract environment providing time and the tick sleep primitive.
///
/// # Invariants
///
/// Implementations MUST guarantee that `now()` never goes backwards within a
/// single execution context. Subsequent calls return times >= previous calls.
pub trait Environment: Clone + Send + Sync + 'static {
    /// The specific instant type used by this environment.
    ///
    /// Production environments use `std::time::Instant`; simulation
    /// environments use virtual time.
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Current time (monotonic).
    fn now(&self) -> Self::Instant;

    /// Sleeps for the specified duration.
    ///
    /// This is the ONLY async method in the trait, and it should only be used
    /// by runtime code (the tick loop), never by coordinator logic.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;
}
