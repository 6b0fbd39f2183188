//! Protocol error types.

use thiserror::Error;

/// Errors from parsing or building transport frames.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// Header does not start with the Chorus magic bytes.
    #[error("invalid magic: {0:02x?}")]
    InvalidMagic([u8; 2]),

    /// Header carries a protocol version this build does not speak.
    #[error("unsupported version: {0}")]
    UnsupportedVersion(u8),

    /// Header carries flag bits that are not defined.
    #[error("unknown flag bits: {0:#04x}")]
    UnknownFlags(u8),

    /// Declared or actual body exceeds [`MAX_BODY_SIZE`](crate::MAX_BODY_SIZE).
    #[error("message body too large: {size} bytes (max {max})")]
    BodyTooLarge {
        /// Body size in bytes
        size: usize,
        /// Configured maximum
        max: usize,
    },

    /// Message has more frames than [`MAX_PARTS`](crate::MAX_PARTS).
    #[error("too many parts: {count} (max {max})")]
    TooManyParts {
        /// Frame count
        count: usize,
        /// Configured maximum
        max: usize,
    },

    /// Buffer ended before the declared content.
    #[error("truncated message: needed {expected} bytes, had {actual}")]
    Truncated {
        /// Bytes required
        expected: usize,
        /// Bytes available
        actual: usize,
    },

    /// Bytes left over after the last declared frame.
    #[error("{0} trailing bytes after last frame")]
    TrailingBytes(usize),
}

/// Errors from encoding or decoding envelopes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Neither the binary nor the JSON decoder accepted the bytes.
    #[error("undecodable envelope (cbor: {binary}; json: {json})")]
    Undecodable {
        /// Why CBOR decoding failed
        binary: String,
        /// Why the JSON fallback failed
        json: String,
    },

    /// Serializing an envelope failed.
    #[error("failed to encode envelope: {0}")]
    Encode(String),

    /// A typed payload did not serialize to a map.
    #[error("payload for service '{0}' is not a map")]
    NotAMap(String),
}

/// Errors turning a decoded envelope into a typed request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    /// The `service` tag is not handled by this endpoint.
    #[error("Service '{0}' not recognized")]
    UnknownService(String),

    /// A required field is absent or empty.
    #[error("{service}: missing required field '{field}'")]
    MissingField {
        /// Service the request was addressed to
        service: String,
        /// Name of the absent field
        field: &'static str,
    },

    /// Fields are present but have the wrong shape.
    #[error("{service}: invalid payload: {reason}")]
    InvalidPayload {
        /// Service the request was addressed to
        service: String,
        /// Decoder message
        reason: String,
    },
}

impl RequestError {
    /// Service tag the error reply should carry.
    ///
    /// Unknown tags are echoed back so the caller can match the reply to its
    /// request.
    pub fn service(&self) -> &str {
        match self {
            Self::UnknownService(service)
            | Self::MissingField { service, .. }
            | Self::InvalidPayload { service, .. } => service,
        }
    }
}
