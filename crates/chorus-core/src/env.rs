//! Environment abstraction for deterministic testing.
//!
//! Coordination logic never reads the system clock or the OS RNG directly.
//! It goes through [`Environment`], so the same code runs against real time in
//! production, virtual time under turmoil, and a hand-driven clock in unit
//! tests and fuzz targets.
//!
//! # Invariants
//!
//! - Monotonicity: `env.now()` never goes backwards
//! - Determinism: given the same seed, `random_bytes()` produces the same
//!   sequence
//! - Isolation: implementations must not share global state

use std::{
    fmt::Debug,
    ops::Sub,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use rand::{RngCore, SeedableRng, rngs::StdRng};

/// Abstract environment providing time, randomness, and async sleeping.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Monotonic instant type. Liveness decisions are made on this clock only.
    type Instant: Copy + Ord + Send + Sync + Debug + Sub<Output = Duration> + 'static;

    /// Current monotonic time. MUST never decrease.
    fn now(&self) -> Self::Instant;

    /// Wall-clock milliseconds since the Unix epoch.
    ///
    /// Advisory only: stamped on outgoing envelopes for display and never
    /// used for ordering or liveness.
    fn wall_clock_ms(&self) -> u64;

    /// Sleep for `duration`.
    ///
    /// Only driver code (heartbeat loops, sweep timers) calls this.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fill `buffer` with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generate a random `u64`, used for connection identities.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }
}

/// Instant of a [`ManualEnv`]: time elapsed since the environment was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ManualInstant(pub Duration);

impl Sub for ManualInstant {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Duration {
        self.0.saturating_sub(rhs.0)
    }
}

#[derive(Debug)]
struct ManualState {
    elapsed: Duration,
    rng: StdRng,
}

/// Hand-driven environment for unit tests and fuzzing.
///
/// Time moves only when [`ManualEnv::advance`] (or `sleep`) is called. Clones
/// share the same clock and RNG.
#[derive(Debug, Clone)]
pub struct ManualEnv {
    state: Arc<Mutex<ManualState>>,
    wall_base_ms: u64,
}

impl ManualEnv {
    /// Wall clock reported at creation: 2023-11-14T22:13:20Z.
    pub const DEFAULT_WALL_BASE_MS: u64 = 1_700_000_000_000;

    /// Create an environment with a seeded RNG.
    pub fn new(seed: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(ManualState {
                elapsed: Duration::ZERO,
                rng: StdRng::seed_from_u64(seed),
            })),
            wall_base_ms: Self::DEFAULT_WALL_BASE_MS,
        }
    }

    /// Move time forward.
    pub fn advance(&self, by: Duration) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.elapsed = state.elapsed.saturating_add(by);
    }

    fn elapsed(&self) -> Duration {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).elapsed
    }
}

impl Default for ManualEnv {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Environment for ManualEnv {
    type Instant = ManualInstant;

    fn now(&self) -> ManualInstant {
        ManualInstant(self.elapsed())
    }

    fn wall_clock_ms(&self) -> u64 {
        let elapsed_ms = u64::try_from(self.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.wall_base_ms.saturating_add(elapsed_ms)
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        self.advance(duration);
        std::future::ready(())
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).rng.fill_bytes(buffer);
    }
}
