//! Chorus wire protocol.
//!
//! Two layers live here:
//!
//! - **Transport framing**: every message on every connection is a
//!   [`Multipart`] message, a small fixed [`MessageHeader`] followed by a list
//!   of length-prefixed frames. Frames carry routing identities and topics
//!   separately from the application body.
//! - **Envelopes**: the application body of a frame is an [`Envelope`]
//!   (`{ service, data }`) encoded as CBOR, with a JSON fallback on decode.
//!
//! ## Message layout
//!
//! ```text
//! +-----------------+----------+---------+----------+---------+-----
//! | MessageHeader   | len (u32)| frame 0 | len (u32)| frame 1 | ...
//! | 12 bytes        |          |         |          |         |
//! +-----------------+----------+---------+----------+---------+-----
//! ```
//!
//! The typed request/reply payloads of the reference service are in
//! [`payloads`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod codec;
mod envelope;
pub mod errors;
mod flags;
mod header;
mod message;
pub mod payloads;

pub use codec::Encoding;
pub use envelope::{Envelope, Stamp, Status};
pub use errors::{CodecError, RequestError, WireError};
pub use flags::MessageFlags;
pub use header::MessageHeader;
pub use message::{Multipart, RoutingEnvelope};

/// Service tag used for replies to envelopes that could not be decoded at all.
pub const ERROR_SERVICE: &str = "error";

/// Maximum size of a message body (all frames plus their length prefixes).
pub const MAX_BODY_SIZE: usize = 16 * 1024 * 1024;

/// Maximum number of frames in one message.
pub const MAX_PARTS: usize = 1024;
