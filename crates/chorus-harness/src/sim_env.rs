//! Simulated environment on turmoil's virtual clock.

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use chorus_core::Environment;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Seed used by [`SimEnv::new`].
const DEFAULT_SEED: u64 = 0x00c4_0a05;

/// Wall clock at virtual time zero: 2023-11-14T22:13:20Z.
const WALL_BASE_MS: u64 = 1_700_000_000_000;

/// Environment for code running inside a turmoil host.
///
/// Time comes from tokio's clock, which turmoil drives virtually. Clones share
/// the RNG stream; separately constructed environments do not.
#[derive(Debug, Clone)]
pub struct SimEnv {
    start: tokio::time::Instant,
    rng: Arc<Mutex<ChaCha8Rng>>,
}

impl SimEnv {
    /// Environment with the default seed.
    ///
    /// Must be called from inside a simulation (host or client future).
    #[must_use]
    pub fn new() -> Self {
        Self::with_seed(DEFAULT_SEED)
    }

    /// Environment with an explicit seed.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            start: tokio::time::Instant::now(),
            rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))),
        }
    }

    /// Virtual time since this environment was created.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for SimEnv {
    type Instant = tokio::time::Instant;

    fn now(&self) -> tokio::time::Instant {
        tokio::time::Instant::now()
    }

    fn wall_clock_ms(&self) -> u64 {
        let elapsed = u64::try_from(self.elapsed().as_millis()).unwrap_or(u64::MAX);
        WALL_BASE_MS.saturating_add(elapsed)
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner).fill_bytes(buffer);
    }
}
