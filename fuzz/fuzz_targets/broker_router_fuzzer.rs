//! Fuzz target for the broker's routing state machine
//!
//! # Strategy
//!
//! - Event sequences: connects, disconnects, requests and replies for a
//!   small pool of peers, in any order
//! - Forged replies: garbage identity frames, replies for departed clients
//!
//! # Invariants
//!
//! - NEVER panic on any event sequence
//! - Requests only go to connected workers, replies only to connected clients
//! - Every request handed to a worker starts with a valid client identity
//! - The pending queue never exceeds its bound, and is empty while a worker
//!   is connected
//! - Routed, dropped and pending requests never add up to more than were
//!   received

#![no_main]

use std::collections::HashSet;

use arbitrary::Arbitrary;
use bytes::Bytes;
use chorus_core::{BrokerAction, BrokerEvent, BrokerRouter, PeerId};
use chorus_proto::Multipart;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Clone, Arbitrary)]
enum Event {
    ClientConnected(u8),
    ClientDisconnected(u8),
    Request { client: u8, body: Vec<u8> },
    WorkerConnected(u8),
    WorkerDisconnected(u8),
    Reply { worker: u8, client: u8, body: Vec<u8> },
    ForgedReply { worker: u8, frames: Vec<Vec<u8>> },
}

#[derive(Debug, Clone, Arbitrary)]
struct FuzzInput {
    max_pending: u8,
    events: Vec<Event>,
}

fn client_id(n: u8) -> PeerId {
    PeerId(u64::from(n % 8))
}

fn worker_id(n: u8) -> PeerId {
    PeerId(0x100 + u64::from(n % 4))
}

fuzz_target!(|input: FuzzInput| {
    let max_pending = usize::from(input.max_pending).max(1);
    let mut router = BrokerRouter::new(max_pending);

    let mut clients = HashSet::new();
    let mut workers = HashSet::new();
    let mut received = 0u64;

    for event in input.events {
        let event = match event {
            Event::ClientConnected(n) => {
                clients.insert(client_id(n));
                BrokerEvent::ClientConnected(client_id(n))
            },
            Event::ClientDisconnected(n) => {
                clients.remove(&client_id(n));
                BrokerEvent::ClientDisconnected(client_id(n))
            },
            Event::Request { client, body } => {
                // Readers only report traffic from attached peers.
                if !clients.contains(&client_id(client)) {
                    continue;
                }
                received += 1;
                let message = Multipart::new(vec![Bytes::new(), Bytes::from(body)]);
                BrokerEvent::ClientMessage { client: client_id(client), message }
            },
            Event::WorkerConnected(n) => {
                if !workers.insert(worker_id(n)) {
                    continue;
                }
                BrokerEvent::WorkerConnected(worker_id(n))
            },
            Event::WorkerDisconnected(n) => {
                workers.remove(&worker_id(n));
                BrokerEvent::WorkerDisconnected(worker_id(n))
            },
            Event::Reply { worker, client, body } => {
                let message = Multipart::new(vec![
                    client_id(client).to_frame(),
                    Bytes::new(),
                    Bytes::from(body),
                ]);
                BrokerEvent::WorkerMessage { worker: worker_id(worker), message }
            },
            Event::ForgedReply { worker, frames } => {
                let message = Multipart::new(frames.into_iter().map(Bytes::from).collect());
                BrokerEvent::WorkerMessage { worker: worker_id(worker), message }
            },
        };

        for action in router.process_event(event) {
            match action {
                BrokerAction::SendToWorker { worker, message } => {
                    assert!(workers.contains(&worker), "request sent to unknown worker");
                    let identity = message.first().and_then(|frame| PeerId::from_frame(frame));
                    assert!(identity.is_some(), "request without client identity");
                },
                BrokerAction::SendToClient { client, .. } => {
                    assert!(clients.contains(&client), "reply sent to unknown client");
                },
            }
        }

        assert!(router.pending_len() <= max_pending);
        if !workers.is_empty() {
            assert_eq!(router.pending_len(), 0, "requests left pending with a worker connected");
        }
    }

    let stats = router.stats();
    assert!(
        stats.requests_routed + stats.requests_dropped + router.pending_len() as u64 <= received,
        "router produced requests out of nowhere"
    );
});
