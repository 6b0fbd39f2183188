//! Typed payloads carried in envelope `data`.
//!
//! Envelopes are decoded into a dynamic map first; endpoints then lift the
//! map into one of these types with an explicit validation step.

pub mod reference;

pub use reference::{
    ErrorReply, HeartbeatReply, HeartbeatRequest, ListReply, RankReply, RankRequest,
    ReferenceRequest, ServerEntry, Service,
};
