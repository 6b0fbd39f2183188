//! Broker routing state machine.
//!
//! The broker sits between request clients (front side) and worker servers
//! (back side). Neither side knows the other's address: the broker prepends
//! the originating client's identity frame before handing a request to a
//! worker, and the worker's reply carries that frame back so the broker can
//! pop it and deliver the reply.
//!
//! [`BrokerRouter`] is pure state: events in, actions out. The server crate
//! owns the sockets and executes the actions.
//!
//! # Routing rules
//!
//! - Requests go to workers in round-robin order.
//! - With no worker connected, requests wait in a bounded queue; once the
//!   queue is full the oldest request is dropped.
//! - A reply whose identity frame names an unknown or departed client is
//!   dropped. The worker is not told.
//! - Request bodies are opaque. The router never decodes an envelope.

use std::collections::{HashSet, VecDeque};

use bytes::Bytes;
use chorus_proto::Multipart;

/// Default bound on requests queued while no worker is connected.
pub const DEFAULT_MAX_PENDING: usize = 1024;

/// Connection identity assigned by the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub u64);

impl PeerId {
    /// Identity frame size.
    pub const FRAME_LEN: usize = 8;

    /// Encode as an identity frame.
    pub fn to_frame(self) -> Bytes {
        Bytes::copy_from_slice(&self.0.to_be_bytes())
    }

    /// Decode an identity frame.
    pub fn from_frame(frame: &[u8]) -> Option<Self> {
        let bytes: [u8; Self::FRAME_LEN] = frame.try_into().ok()?;
        Some(Self(u64::from_be_bytes(bytes)))
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Inputs to the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerEvent {
    /// A request client connected to the front side.
    ClientConnected(PeerId),
    /// A request client went away.
    ClientDisconnected(PeerId),
    /// A request client sent a message.
    ClientMessage {
        /// Sender
        client: PeerId,
        /// Frames as received
        message: Multipart,
    },
    /// A worker connected to the back side.
    WorkerConnected(PeerId),
    /// A worker went away.
    WorkerDisconnected(PeerId),
    /// A worker sent a reply.
    WorkerMessage {
        /// Sender
        worker: PeerId,
        /// Frames as received, identity frame first
        message: Multipart,
    },
}

/// Outputs of the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerAction {
    /// Deliver a request to a worker.
    SendToWorker {
        /// Destination
        worker: PeerId,
        /// Request with the client identity frame prepended
        message: Multipart,
    },
    /// Deliver a reply to a client.
    SendToClient {
        /// Destination
        client: PeerId,
        /// Reply with the identity frame removed
        message: Multipart,
    },
}

/// Counters for observability and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RouterStats {
    /// Requests handed to a worker
    pub requests_routed: u64,
    /// Replies handed to a client
    pub replies_routed: u64,
    /// Requests dropped because the pending queue was full
    pub requests_dropped: u64,
    /// Replies dropped because the client was unknown
    pub replies_dropped: u64,
}

/// Round-robin request router.
#[derive(Debug, Clone)]
pub struct BrokerRouter {
    clients: HashSet<PeerId>,
    workers: VecDeque<PeerId>,
    pending: VecDeque<Multipart>,
    max_pending: usize,
    stats: RouterStats,
}

impl BrokerRouter {
    /// Create a router that queues at most `max_pending` requests while no
    /// worker is connected.
    pub fn new(max_pending: usize) -> Self {
        Self {
            clients: HashSet::new(),
            workers: VecDeque::new(),
            pending: VecDeque::new(),
            max_pending: max_pending.max(1),
            stats: RouterStats::default(),
        }
    }

    /// Process one event.
    pub fn process_event(&mut self, event: BrokerEvent) -> Vec<BrokerAction> {
        match event {
            BrokerEvent::ClientConnected(client) => {
                self.clients.insert(client);
                Vec::new()
            },
            BrokerEvent::ClientDisconnected(client) => {
                self.clients.remove(&client);
                let frame = client.to_frame();
                self.pending.retain(|request| request.first() != Some(&frame));
                Vec::new()
            },
            BrokerEvent::ClientMessage { client, message } => {
                self.handle_request(client, message).into_iter().collect()
            },
            BrokerEvent::WorkerConnected(worker) => {
                self.workers.push_back(worker);
                tracing::debug!(%worker, pending = self.pending.len(), "worker joined");
                self.flush_pending()
            },
            BrokerEvent::WorkerDisconnected(worker) => {
                self.workers.retain(|w| *w != worker);
                Vec::new()
            },
            BrokerEvent::WorkerMessage { worker, message } => {
                self.handle_reply(worker, message).into_iter().collect()
            },
        }
    }

    fn handle_request(&mut self, client: PeerId, mut message: Multipart) -> Option<BrokerAction> {
        message.push_front(client.to_frame());

        if let Some(worker) = self.next_worker() {
            self.stats.requests_routed += 1;
            tracing::debug!(%client, %worker, "request routed");
            return Some(BrokerAction::SendToWorker { worker, message });
        }

        if self.pending.len() >= self.max_pending {
            self.pending.pop_front();
            self.stats.requests_dropped += 1;
            tracing::warn!(max_pending = self.max_pending, "no worker available, dropped oldest request");
        }
        self.pending.push_back(message);
        None
    }

    fn handle_reply(&mut self, worker: PeerId, mut message: Multipart) -> Option<BrokerAction> {
        let Some(client) = message.pop_front().as_deref().and_then(PeerId::from_frame) else {
            self.stats.replies_dropped += 1;
            tracing::warn!(%worker, "reply without a valid identity frame dropped");
            return None;
        };

        if !self.clients.contains(&client) {
            self.stats.replies_dropped += 1;
            tracing::debug!(%worker, %client, "reply for unknown client dropped");
            return None;
        }

        self.stats.replies_routed += 1;
        tracing::debug!(%worker, %client, "reply routed");
        Some(BrokerAction::SendToClient { client, message })
    }

    fn next_worker(&mut self) -> Option<PeerId> {
        let worker = self.workers.pop_front()?;
        self.workers.push_back(worker);
        Some(worker)
    }

    fn flush_pending(&mut self) -> Vec<BrokerAction> {
        let mut actions = Vec::with_capacity(self.pending.len());
        while let Some(message) = self.pending.pop_front() {
            let Some(worker) = self.next_worker() else {
                self.pending.push_front(message);
                break;
            };
            self.stats.requests_routed += 1;
            actions.push(BrokerAction::SendToWorker { worker, message });
        }
        actions
    }

    /// Connected workers, in the order they will next be picked.
    pub fn workers(&self) -> impl Iterator<Item = PeerId> + '_ {
        self.workers.iter().copied()
    }

    /// Number of connected clients.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Requests waiting for a worker.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Routing counters.
    pub fn stats(&self) -> RouterStats {
        self.stats
    }
}

impl Default for BrokerRouter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PENDING)
    }
}
