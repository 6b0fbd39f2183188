//! Request/reply client.
//!
//! Talks to the broker's front side or directly to the reference server.
//! Requests go out as `[empty, body]`; the empty frame is the routing
//! delimiter behind which the broker stacks identities. One request is in
//! flight at a time.

use std::time::Duration;

use bytes::Bytes;
use chorus_core::{Environment, read_message, write_message};
use chorus_proto::{Envelope, Multipart};
use serde_json::{Map, Value};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{TcpStream, ToSocketAddrs},
};

use crate::{ClientError, Participant};

/// Request timeout used when callers have no better value.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Synchronous request/reply connection.
#[derive(Debug)]
pub struct RequestClient<S, E: Environment> {
    stream: S,
    participant: Participant<E>,
    broken: bool,
}

impl<E: Environment> RequestClient<TcpStream, E> {
    /// Connect over TCP.
    pub async fn connect(
        addr: impl ToSocketAddrs,
        participant: Participant<E>,
    ) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream, participant))
    }
}

impl<S, E> RequestClient<S, E>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
    E: Environment,
{
    /// Wrap an established stream.
    pub fn new(stream: S, participant: Participant<E>) -> Self {
        Self { stream, participant, broken: false }
    }

    /// Send a stamped request built from `service` and `data` and wait for
    /// the reply.
    ///
    /// Error replies (`status: erro`) are returned as envelopes; callers
    /// decide what a rejection means.
    pub async fn request(
        &mut self,
        service: &str,
        data: Map<String, Value>,
        timeout: Duration,
    ) -> Result<Envelope, ClientError> {
        let envelope = self.participant.envelope(service, data);
        self.send_envelope(&envelope, timeout).await
    }

    /// Send an already stamped envelope and wait for the reply.
    pub async fn send_envelope(
        &mut self,
        envelope: &Envelope,
        timeout: Duration,
    ) -> Result<Envelope, ClientError> {
        let body = envelope.to_bytes()?;
        self.send_raw(Bytes::from(body), timeout).await
    }

    /// Send an arbitrary body frame and wait for the reply.
    pub async fn send_raw(&mut self, body: Bytes, timeout: Duration) -> Result<Envelope, ClientError> {
        if self.broken {
            return Err(ClientError::Closed);
        }

        let request = Multipart::new(vec![Bytes::new(), body]);
        let stream = &mut self.stream;
        let exchange = async {
            write_message(&mut *stream, &request).await?;
            read_message(&mut *stream).await
        };

        let reply = match tokio::time::timeout(timeout, exchange).await {
            Ok(Ok(Some(reply))) => reply,
            Ok(Ok(None)) => {
                self.broken = true;
                return Err(ClientError::Closed);
            },
            Ok(Err(e)) => {
                self.broken = true;
                return Err(e.into());
            },
            Err(_) => {
                self.broken = true;
                return Err(ClientError::Timeout(timeout));
            },
        };

        let (_, body) = reply.split_envelope();
        let frame = body.first().ok_or(ClientError::EmptyReply)?;
        let envelope = Envelope::from_bytes(frame)?;
        self.participant.receive(&envelope);

        Ok(envelope)
    }

    /// Clock owner used for stamping.
    pub fn participant(&self) -> &Participant<E> {
        &self.participant
    }

    /// True once the connection has been abandoned.
    pub fn is_broken(&self) -> bool {
        self.broken
    }
}
