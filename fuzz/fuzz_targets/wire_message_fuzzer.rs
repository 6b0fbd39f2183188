//! Fuzz target for multipart message decoding
//!
//! # Strategy
//!
//! - Raw bytes straight into [`Multipart::decode`]
//! - Header fields (part count, body length, flags) fully attacker controlled
//!
//! # Invariants
//!
//! - NEVER panic, whatever the input
//! - A decoded message re-encodes to the same length and decodes back equal
//! - Part count and body size stay within protocol limits

#![no_main]

use chorus_proto::{MAX_BODY_SIZE, MAX_PARTS, Multipart};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(message) = Multipart::decode(data) else {
        return;
    };

    assert!(message.len() <= MAX_PARTS);
    assert!(message.body_len() <= MAX_BODY_SIZE);

    let encoded = message.to_bytes().expect("decoded message must re-encode");
    assert_eq!(encoded.len(), data.len(), "re-encoding changed the length");
    assert_eq!(Multipart::decode(&encoded).expect("re-encoded message must decode"), message);
});
