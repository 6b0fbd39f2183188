//! [`Environment`] backed by the operating system.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chorus_core::Environment;

/// Real clocks and OS randomness for the deployed services.
///
/// - Monotonic time from `std::time::Instant`, used for liveness
/// - Wall time from `SystemTime`, only stamped on envelopes
/// - Randomness from `getrandom`, used for connection identities
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl SystemEnv {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = std::time::Instant;

    fn now(&self) -> std::time::Instant {
        std::time::Instant::now()
    }

    fn wall_clock_ms(&self) -> u64 {
        let since_epoch = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        u64::try_from(since_epoch.as_millis()).unwrap_or(u64::MAX)
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).unwrap_or_else(|e| {
            // Identities only need to be distinct: the broker increments
            // from whatever seed it draws.
            tracing::error!(error = %e, "OS randomness unavailable");
            buffer.fill(0);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_clock_moves_forward() {
        let env = SystemEnv::new();
        let before = env.now();
        std::thread::sleep(Duration::from_millis(5));
        assert!(env.now() > before);
    }

    #[test]
    fn wall_clock_is_after_2020() {
        assert!(SystemEnv::new().wall_clock_ms() > 1_577_836_800_000);
    }

    #[test]
    fn random_identities_differ() {
        let env = SystemEnv::new();
        assert_ne!(env.random_u64(), env.random_u64());
    }

    #[tokio::test]
    async fn sleep_lasts_at_least_the_duration() {
        let env = SystemEnv::new();
        let before = env.now();
        env.sleep(Duration::from_millis(20)).await;
        assert!(env.now().duration_since(before) >= Duration::from_millis(20));
    }
}
