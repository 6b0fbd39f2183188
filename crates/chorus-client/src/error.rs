//! Client error types.

use std::time::Duration;

use chorus_core::TransportError;
use chorus_proto::CodecError;
use thiserror::Error;

/// Errors from client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connecting or socket I/O failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Reading or writing a message failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Envelope could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// No reply arrived in time.
    #[error("no reply within {0:?}")]
    Timeout(Duration),

    /// The connection is closed or was abandoned after a timeout.
    #[error("connection closed")]
    Closed,

    /// A reply arrived without a body frame.
    #[error("reply has no body")]
    EmptyReply,

    /// The peer answered with `status: erro`.
    #[error("{service} rejected: {description}")]
    Rejected {
        /// Service tag of the reply
        service: String,
        /// Peer's description of the failure
        description: String,
    },

    /// The reply is addressed to a different service than the request.
    #[error("expected reply for '{expected}', got '{actual}'")]
    UnexpectedReply {
        /// Service requested
        expected: String,
        /// Service in the reply
        actual: String,
    },

    /// The reply's fields do not have the expected shape.
    #[error("invalid reply payload: {0}")]
    InvalidPayload(String),
}

impl ClientError {
    /// Returns true if the connection is unusable after this error.
    ///
    /// A timed-out request leaves its reply in flight, where it would be
    /// mistaken for the answer to the next request, so timeouts are fatal.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Io(_) | Self::Transport(_) | Self::Timeout(_) | Self::Closed => true,
            Self::Codec(_)
            | Self::EmptyReply
            | Self::Rejected { .. }
            | Self::UnexpectedReply { .. }
            | Self::InvalidPayload(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_is_recoverable() {
        let err = ClientError::Rejected {
            service: "rank".to_string(),
            description: "rank: missing required field 'user'".to_string(),
        };
        assert!(!err.is_fatal());
        assert_eq!(err.to_string(), "rank rejected: rank: missing required field 'user'");
    }

    #[test]
    fn timeout_is_fatal() {
        assert!(ClientError::Timeout(Duration::from_secs(1)).is_fatal());
        assert!(ClientError::Closed.is_fatal());
    }
}
