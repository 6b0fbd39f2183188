//! A process taking part in the network.
//!
//! Every process owns exactly one logical clock, whatever number of sockets
//! it talks through. [`Participant`] is that clock plus the environment that
//! supplies wall time. Clones share the clock, so a worker server can hand
//! one clone to its broker connection, one to its publisher and one to its
//! reference client.

use std::sync::{Arc, Mutex, PoisonError};

use chorus_core::{Environment, LamportClock};
use chorus_proto::{Envelope, Stamp};
use serde_json::{Map, Value};

/// Clock owner for one process.
#[derive(Debug, Clone)]
pub struct Participant<E: Environment> {
    env: E,
    clock: Arc<Mutex<LamportClock>>,
}

impl<E: Environment> Participant<E> {
    /// Create a participant with its clock at 0.
    pub fn new(env: E) -> Self {
        Self { env, clock: Arc::new(Mutex::new(LamportClock::new())) }
    }

    /// Advance the clock for a send and return the stamp to attach.
    pub fn stamp(&self) -> Stamp {
        let clock = self.lock().increment();
        Stamp { timestamp: self.env.wall_clock_ms(), clock }
    }

    /// Build a stamped envelope.
    pub fn envelope(&self, service: impl Into<String>, data: Map<String, Value>) -> Envelope {
        let mut envelope = Envelope::new(service, data);
        envelope.set_stamp(self.stamp());
        envelope
    }

    /// Stamp an envelope about to be sent, replacing any stamp it carries.
    pub fn restamp(&self, envelope: &mut Envelope) {
        envelope.set_stamp(self.stamp());
    }

    /// Observe the clock of a received envelope. Returns the new local value.
    pub fn receive(&self, envelope: &Envelope) -> u64 {
        let received = envelope.clock();
        let mut clock = self.lock();
        let before = clock.value();
        let after = clock.observe(received);

        if received >= before {
            tracing::debug!(
                service = %envelope.service,
                local = before,
                received,
                adjusted = after,
                "clock adjusted"
            );
        }
        after
    }

    /// Current clock value.
    pub fn clock(&self) -> u64 {
        self.lock().value()
    }

    /// Environment.
    pub fn env(&self) -> &E {
        &self.env
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LamportClock> {
        self.clock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
