//! Fuzz target for the reference server's request handling
//!
//! # Strategy
//!
//! - Operation sequences: rank, heartbeat and list requests for a small pool
//!   of names, interleaved with sweeps and clock jumps
//! - Hostile bodies: raw bytes, wrong field types, unknown services
//!
//! # Invariants
//!
//! - NEVER panic on any request body
//! - Every reply carries a clock strictly greater than the previous reply,
//!   unless the clock has saturated
//! - A name keeps its rank until it is evicted
//! - No two registered names share a rank
//! - The list is ordered by rank

#![no_main]

use std::{collections::HashMap, time::Duration};

use arbitrary::Arbitrary;
use chorus_core::{ManualEnv, Reference};
use chorus_proto::Envelope;
use libfuzzer_sys::fuzz_target;
use serde_json::{Map, Value, json};

const NAMES: [&str; 4] = ["alpha", "beta", "gamma", ""];

#[derive(Debug, Clone, Arbitrary)]
enum Operation {
    Rank { name: u8, clock: u16 },
    Heartbeat { name: u8, clock: u16 },
    List { clock: u16 },
    Unknown { service: String },
    WrongType { service: u8 },
    RawBytes(Vec<u8>),
    Advance { secs: u8 },
    Sweep,
}

#[derive(Debug, Clone, Arbitrary)]
struct FuzzInput {
    timeout_secs: u8,
    operations: Vec<Operation>,
}

fn request(service: &str, user: Option<&str>, clock: u16) -> Envelope {
    let mut data = Map::new();
    data.insert("clock".into(), json!(clock));
    if let Some(user) = user {
        data.insert("user".into(), json!(user));
    }
    Envelope::new(service, data)
}

fn name(index: u8) -> &'static str {
    NAMES[usize::from(index) % NAMES.len()]
}

fuzz_target!(|input: FuzzInput| {
    let env = ManualEnv::default();
    let timeout = Duration::from_secs(u64::from(input.timeout_secs.max(1)));
    let mut reference = Reference::new(env.clone(), timeout);

    let mut last_clock = 0;
    let mut known: HashMap<String, u64> = HashMap::new();

    for operation in input.operations {
        let reply = match operation {
            Operation::Rank { name: index, clock } => {
                let reply = reference.handle(&request("rank", Some(name(index)), clock));
                if let Some(rank) = reply.data.get("rank").and_then(Value::as_u64) {
                    let first = *known.entry(name(index).to_string()).or_insert(rank);
                    assert_eq!(first, rank, "rank changed without eviction");
                }
                reply
            },
            Operation::Heartbeat { name: index, clock } => {
                reference.handle(&request("heartbeat", Some(name(index)), clock))
            },
            Operation::List { clock } => reference.handle(&request("list", None, clock)),
            Operation::Unknown { service } => {
                let reply = reference.handle(&request(&service, Some("alpha"), 0));
                if !matches!(service.as_str(), "rank" | "heartbeat" | "list") {
                    assert!(reply.is_error());
                }
                reply
            },
            Operation::WrongType { service } => {
                let service = ["rank", "heartbeat"][usize::from(service) % 2];
                let mut data = Map::new();
                data.insert("user".into(), json!([1, 2, 3]));
                data.insert("clock".into(), json!("not a number"));
                let reply = reference.handle(&Envelope::new(service, data));
                assert!(reply.is_error());
                reply
            },
            Operation::RawBytes(bytes) => reference.handle_bytes(&bytes),
            Operation::Advance { secs } => {
                env.advance(Duration::from_secs(u64::from(secs)));
                continue;
            },
            Operation::Sweep => {
                for eviction in reference.sweep() {
                    known.remove(&eviction.name);
                }
                continue;
            },
        };

        // Raw bodies can carry any clock, so the counter may sit at its ceiling.
        assert!(
            reply.clock() > last_clock || reply.clock() == u64::MAX,
            "reply clock did not advance"
        );
        last_clock = reply.clock();

        // Registrations made through heartbeats are tracked here too.
        for entry in reference.list() {
            let first = *known.entry(entry.name.clone()).or_insert(entry.rank);
            assert_eq!(first, entry.rank, "rank changed without eviction");
        }
    }

    let list = reference.list();
    assert!(list.windows(2).all(|pair| pair[0].rank < pair[1].rank), "list not ordered by rank");
    assert!(list.iter().all(|entry| !entry.name.is_empty()));
});
