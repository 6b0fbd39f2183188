//! Server error types.

use thiserror::Error;

/// Errors that stop a service from starting or running.
///
/// Per-connection failures never surface here: they are logged and only the
/// offending connection is closed.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Settings no service could run with.
    #[error("configuration error: {0}")]
    Config(String),

    /// A listening address could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address as configured
        addr: String,
        /// Underlying failure
        source: std::io::Error,
    },

    /// Socket I/O failed outside any single connection.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    pub(crate) fn bind(addr: &str) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| Self::Bind { addr: addr.to_string(), source }
    }
}
