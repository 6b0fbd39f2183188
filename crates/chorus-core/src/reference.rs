//! Reference service logic.
//!
//! [`Reference`] is the sans-IO heart of the reference server: bytes of one
//! request body go in, exactly one reply envelope comes out. It owns the
//! registration table and the service's logical clock, so holding a
//! `&mut Reference` for the whole of a request is the single mutual-exclusion
//! discipline that serializes request handling with the liveness sweep.
//!
//! Every reply, including failures, is stamped with the wall clock and a
//! freshly incremented logical clock. Inbound clocks are observed before the
//! request is validated, so even a rejected request advances the clock.

use std::time::Duration;

use chorus_proto::{
    CodecError, ERROR_SERVICE, Envelope, RequestError, Stamp, codec,
    payloads::{
        ErrorReply, HeartbeatReply, ListReply, RankReply, ReferenceRequest, ServerEntry, Service,
    },
};
use serde::Serialize;

use crate::{
    clock::LamportClock,
    env::Environment,
    registry::{Eviction, RankAssignment, Registry, RegistryError},
};

/// Rank assignment, heartbeat and liveness bookkeeping.
#[derive(Debug)]
pub struct Reference<E: Environment> {
    env: E,
    registry: Registry<E::Instant>,
    clock: LamportClock,
}

impl<E: Environment> Reference<E> {
    /// Create a reference service with the given liveness timeout.
    pub fn new(env: E, timeout: Duration) -> Self {
        Self { env, registry: Registry::new(timeout), clock: LamportClock::new() }
    }

    /// Handle one request body.
    ///
    /// Never fails: undecodable input produces an error envelope with service
    /// [`ERROR_SERVICE`], and rejected requests produce an error envelope
    /// scoped to the request's own service tag.
    pub fn handle_bytes(&mut self, bytes: &[u8]) -> Envelope {
        match codec::decode(bytes) {
            Ok(envelope) => self.handle(&envelope),
            Err(e) => self.malformed(&e),
        }
    }

    /// Handle one decoded request envelope.
    pub fn handle(&mut self, envelope: &Envelope) -> Envelope {
        self.clock.observe(envelope.clock());

        let request = match ReferenceRequest::from_envelope(envelope) {
            Ok(request) => request,
            Err(e) => return self.rejected(&e),
        };

        match request {
            ReferenceRequest::Rank { user } => match self.rank(&user) {
                Ok(assignment) => {
                    let stamp = self.stamp();
                    self.reply(Service::Rank, &RankReply { rank: assignment.rank, stamp }, stamp)
                },
                Err(e) => self.registry_error(Service::Rank, &e),
            },
            ReferenceRequest::Heartbeat { user } => match self.heartbeat(&user) {
                Ok(_) => {
                    let stamp = self.stamp();
                    self.reply(Service::Heartbeat, &HeartbeatReply { stamp }, stamp)
                },
                Err(e) => self.registry_error(Service::Heartbeat, &e),
            },
            ReferenceRequest::List => {
                let list = self.list();
                let stamp = self.stamp();
                self.reply(Service::List, &ListReply { list, stamp }, stamp)
            },
        }
    }

    /// Return the rank of `name`, registering it on first contact.
    pub fn rank(&mut self, name: &str) -> Result<RankAssignment, RegistryError> {
        let assignment = self.registry.rank(name, self.env.now())?;
        if assignment.first_contact {
            tracing::info!(server = name, rank = assignment.rank, "server registered");
        }
        Ok(assignment)
    }

    /// Record liveness for `name`, registering it on first contact.
    pub fn heartbeat(&mut self, name: &str) -> Result<RankAssignment, RegistryError> {
        let assignment = self.registry.heartbeat(name, self.env.now())?;
        if assignment.first_contact {
            tracing::info!(server = name, rank = assignment.rank, "server registered by heartbeat");
        } else {
            tracing::trace!(server = name, "heartbeat");
        }
        Ok(assignment)
    }

    /// Snapshot of active servers.
    pub fn list(&self) -> Vec<ServerEntry> {
        self.registry.list()
    }

    /// Evict servers whose last contact is older than the timeout.
    pub fn sweep(&mut self) -> Vec<Eviction> {
        let evicted = self.registry.sweep(self.env.now());
        for eviction in &evicted {
            tracing::info!(
                server = %eviction.name,
                rank = eviction.rank,
                silent_ms = u64::try_from(eviction.silent_for.as_millis()).unwrap_or(u64::MAX),
                "server evicted"
            );
        }
        evicted
    }

    /// Current logical clock.
    pub fn clock(&self) -> u64 {
        self.clock.value()
    }

    /// Registration table.
    pub fn registry(&self) -> &Registry<E::Instant> {
        &self.registry
    }

    fn stamp(&mut self) -> Stamp {
        Stamp { timestamp: self.env.wall_clock_ms(), clock: self.clock.increment() }
    }

    fn reply<T: Serialize>(&self, service: Service, payload: &T, stamp: Stamp) -> Envelope {
        Envelope::from_payload(service.as_str(), payload).unwrap_or_else(|e| {
            tracing::error!(%service, error = %e, "failed to build reply");
            ErrorReply::new(e.to_string(), stamp).into_envelope(service.as_str())
        })
    }

    fn malformed(&mut self, error: &CodecError) -> Envelope {
        tracing::warn!(error = %error, "malformed request envelope");
        let stamp = self.stamp();
        ErrorReply::new(format!("malformed envelope: {error}"), stamp).into_envelope(ERROR_SERVICE)
    }

    fn rejected(&mut self, error: &RequestError) -> Envelope {
        tracing::warn!(service = error.service(), error = %error, "request rejected");
        let stamp = self.stamp();
        ErrorReply::new(error.to_string(), stamp).into_envelope(error.service())
    }

    fn registry_error(&mut self, service: Service, error: &RegistryError) -> Envelope {
        tracing::warn!(%service, error = %error, "registry rejected request");
        let stamp = self.stamp();
        ErrorReply::new(error.to_string(), stamp).into_envelope(service.as_str())
    }
}
