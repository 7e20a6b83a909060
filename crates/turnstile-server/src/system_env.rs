//! Production Environment implementation using system time.
//!
//! `SystemEnv` backs the coordinator with the real monotonic clock and Tokio
//! sleeps. Production behavior is non-deterministic; tests use the virtual
//! clock from `turnstile_core::testing` instead.

use std::time::Duration;

use turnstile_core::env::Environment;

/// Production environment using system time.
#[derive(Debug, Clone, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_advances() {
        let env = SystemEnv::new();

        let t1 = env.now();
        std::thread::sleep(Duration::from_millis(10));
        let t2 = env.now();

        assert!(t2 > t1, "time should advance");
    }

    #[tokio::test]
    async fn sleep_waits_at_least_the_duration() {
        let env = SystemEnv::new();

        let start = env.now();
        env.sleep(Duration::from_millis(50)).await;
        assert!(env.now() - start >= Duration::from_millis(50));
    }
}
