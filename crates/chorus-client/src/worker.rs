//! Worker side of the broker.
//!
//! A worker receives requests with the broker's routing envelope still
//! attached and must send its reply back with the same envelope, so the
//! broker can find the originating client.

use bytes::Bytes;
use chorus_core::{Environment, read_message, write_message};
use chorus_proto::{ERROR_SERVICE, Envelope, RoutingEnvelope, payloads::ErrorReply};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{TcpStream, ToSocketAddrs},
};

use crate::{ClientError, Participant};

/// A request waiting for its reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    /// Identity frames to send the reply back through
    pub routing: RoutingEnvelope,
    /// Decoded request
    pub envelope: Envelope,
}

/// Connection to the broker's back side.
#[derive(Debug)]
pub struct Worker<S, E: Environment> {
    stream: S,
    participant: Participant<E>,
}

impl<E: Environment> Worker<TcpStream, E> {
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

impl<S, E> Worker<S, E>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
    E: Environment,
{
    /// Wrap an established stream.
    pub fn new(stream: S, participant: Participant<E>) -> Self {
        Self { stream, participant }
    }

    /// Wait for the next decodable request.
    ///
    /// Requests whose body cannot be decoded are answered with an error
    /// envelope right here and never surface. Returns `None` once the broker
    /// closes the connection.
    pub async fn next_request(&mut self) -> Result<Option<PendingRequest>, ClientError> {
        loop {
            let Some(message) = read_message(&mut self.stream).await? else {
                return Ok(None);
            };

            let (routing, body) = message.split_envelope();
            let decoded = match body.first() {
                Some(frame) => Envelope::from_bytes(frame).map_err(|e| e.to_string()),
                None => Err("request has no body".to_string()),
            };

            match decoded {
                Ok(envelope) => {
                    self.participant.receive(&envelope);
                    return Ok(Some(PendingRequest { routing, envelope }));
                },
                Err(reason) => {
                    tracing::warn!(%reason, "malformed request from broker");
                    let reply = ErrorReply::new(
                        format!("malformed envelope: {reason}"),
                        self.participant.stamp(),
                    )
                    .into_envelope(ERROR_SERVICE);
                    self.send(routing, &reply).await?;
                },
            }
        }
    }

    /// Stamp `reply` and send it back along the request's route.
    pub async fn reply(
        &mut self,
        routing: RoutingEnvelope,
        mut reply: Envelope,
    ) -> Result<(), ClientError> {
        self.participant.restamp(&mut reply);
        self.send(routing, &reply).await
    }

    /// Answer requests with `handler` until the broker disconnects.
    pub async fn serve<F>(&mut self, mut handler: F) -> Result<(), ClientError>
    where
        F: FnMut(&Envelope) -> Envelope + Send,
    {
        while let Some(request) = self.next_request().await? {
            let reply = handler(&request.envelope);
            self.reply(request.routing, reply).await?;
        }
        Ok(())
    }

    /// Clock owner used for stamping.
    pub fn participant(&self) -> &Participant<E> {
        &self.participant
    }

    async fn send(&mut self, routing: RoutingEnvelope, reply: &Envelope) -> Result<(), ClientError> {
        let body = Bytes::from(reply.to_bytes()?);
        write_message(&mut self.stream, &routing.wrap(vec![body])).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chorus_core::ManualEnv;
    use chorus_proto::Multipart;
    use serde_json::{Map, Value, json};
    use tokio::io::duplex;

    use super::*;

    fn routed(identity: &'static [u8], body: Bytes) -> Multipart {
        Multipart::new(vec![Bytes::from_static(identity), Bytes::new(), body])
    }

    #[tokio::test]
    async fn reply_carries_the_routing_envelope() {
        let (worker_side, mut broker_side) = duplex(4096);
        let mut worker = Worker::new(worker_side, Participant::new(ManualEnv::default()));

        let Value::Object(data) = json!({ "user": "alice", "clock": 3 }) else { unreachable!() };
        let body = Bytes::from(Envelope::new("login", data).to_bytes().unwrap());
        write_message(&mut broker_side, &routed(b"client-1", body)).await.unwrap();

        let request = worker.next_request().await.unwrap().unwrap();
        assert_eq!(request.envelope.service, "login");
        assert_eq!(worker.participant().clock(), 4);

        let reply = Envelope::new("login", Map::new());
        worker.reply(request.routing, reply).await.unwrap();

        let sent = read_message(&mut broker_side).await.unwrap().unwrap();
        assert_eq!(&sent.parts()[0][..], b"client-1");
        assert!(sent.parts()[1].is_empty());
        assert_eq!(Envelope::from_bytes(&sent.parts()[2]).unwrap().clock(), 5);
    }

    #[tokio::test]
    async fn malformed_request_gets_error_envelope() {
        let (worker_side, mut broker_side) = duplex(4096);
        let mut worker = Worker::new(worker_side, Participant::new(ManualEnv::default()));

        let task = tokio::spawn(async move {
            let _ = worker.next_request().await;
        });

        write_message(&mut broker_side, &routed(b"c", Bytes::from_static(b"\xff\xfe")))
            .await
            .unwrap();

        let reply = read_message(&mut broker_side).await.unwrap().unwrap();
        let envelope = Envelope::from_bytes(&reply.parts()[2]).unwrap();
        assert_eq!(envelope.service, ERROR_SERVICE);
        assert!(envelope.is_error());

        drop(broker_side);
        task.await.unwrap();
    }
}
