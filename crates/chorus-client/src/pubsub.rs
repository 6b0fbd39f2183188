//! Publisher and subscriber ends of the proxy.
//!
//! Publishers send `[topic, body]` to the proxy's front side. Subscribers
//! connect to the back side, register topic prefixes, and receive every
//! publication whose topic matches one of them. Publications sent before a
//! subscription reaches the proxy are not delivered to that subscriber.

use bytes::Bytes;
use chorus_core::{Environment, read_message, write_message};
use chorus_proto::{Envelope, Multipart};
use serde_json::{Map, Value};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{TcpStream, ToSocketAddrs},
};

use crate::{ClientError, Participant};

/// Connection to the proxy's publisher side.
#[derive(Debug)]
pub struct Publisher<S, E: Environment> {
    stream: S,
    participant: Participant<E>,
}

impl<E: Environment> Publisher<TcpStream, E> {
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

impl<S, E> Publisher<S, E>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
    E: Environment,
{
    /// Wrap an established stream.
    pub fn new(stream: S, participant: Participant<E>) -> Self {
        Self { stream, participant }
    }

    /// Publish a stamped event built from `service` and `data`.
    pub async fn publish(
        &mut self,
        topic: &str,
        service: &str,
        data: Map<String, Value>,
    ) -> Result<(), ClientError> {
        let envelope = self.participant.envelope(service, data);
        self.send(topic, &envelope).await
    }

    /// Restamp and publish an existing envelope.
    pub async fn publish_envelope(
        &mut self,
        topic: &str,
        mut envelope: Envelope,
    ) -> Result<(), ClientError> {
        self.participant.restamp(&mut envelope);
        self.send(topic, &envelope).await
    }

    async fn send(&mut self, topic: &str, envelope: &Envelope) -> Result<(), ClientError> {
        let body = envelope.to_bytes()?;
        let message = Multipart::publication(Bytes::copy_from_slice(topic.as_bytes()), body);
        write_message(&mut self.stream, &message).await?;
        tracing::trace!(topic, service = %envelope.service, "published");
        Ok(())
    }
}

/// One delivered publication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Topic it was published on
    pub topic: String,
    /// Decoded body
    pub envelope: Envelope,
}

/// Connection to the proxy's subscriber side.
#[derive(Debug)]
pub struct Subscriber<S, E: Environment> {
    stream: S,
    participant: Participant<E>,
}

impl<E: Environment> Subscriber<TcpStream, E> {
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

impl<S, E> Subscriber<S, E>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
    E: Environment,
{
    /// Wrap an established stream.
    pub fn new(stream: S, participant: Participant<E>) -> Self {
        Self { stream, participant }
    }

    /// Receive publications whose topic starts with `prefix`. The empty
    /// prefix receives everything.
    pub async fn subscribe(&mut self, prefix: &str) -> Result<(), ClientError> {
        let control = Multipart::subscribe(Bytes::copy_from_slice(prefix.as_bytes()));
        write_message(&mut self.stream, &control).await?;
        Ok(())
    }

    /// Drop one subscription to `prefix`.
    pub async fn unsubscribe(&mut self, prefix: &str) -> Result<(), ClientError> {
        let control = Multipart::unsubscribe(Bytes::copy_from_slice(prefix.as_bytes()));
        write_message(&mut self.stream, &control).await?;
        Ok(())
    }

    /// Wait for the next decodable publication.
    ///
    /// Publications that are not `[topic, body]` or whose body cannot be
    /// decoded are logged and skipped. Returns `None` once the proxy closes
    /// the connection.
    pub async fn next_event(&mut self) -> Result<Option<Event>, ClientError> {
        loop {
            let Some(message) = read_message(&mut self.stream).await? else {
                return Ok(None);
            };

            let [topic, body] = message.parts() else {
                tracing::warn!(parts = message.len(), "publication with unexpected shape skipped");
                continue;
            };

            let topic = String::from_utf8_lossy(topic).into_owned();
            match Envelope::from_bytes(body) {
                Ok(envelope) => {
                    self.participant.receive(&envelope);
                    return Ok(Some(Event { topic, envelope }));
                },
                Err(e) => {
                    tracing::warn!(%topic, error = %e, "undecodable publication skipped");
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chorus_core::ManualEnv;
    use serde_json::json;
    use tokio::io::duplex;

    use super::*;

    #[tokio::test]
    async fn publish_frames_topic_and_body() {
        let (publisher_side, mut proxy_side) = duplex(4096);
        let mut publisher = Publisher::new(publisher_side, Participant::new(ManualEnv::default()));

        let Value::Object(data) = json!({ "message": "hi" }) else { unreachable!() };
        publisher.publish("general", "publish", data).await.unwrap();

        let sent = read_message(&mut proxy_side).await.unwrap().unwrap();
        assert_eq!(&sent.parts()[0][..], b"general");
        let envelope = Envelope::from_bytes(&sent.parts()[1]).unwrap();
        assert_eq!(envelope.clock(), 1);
        assert_eq!(envelope.data["message"], json!("hi"));
    }

    #[tokio::test]
    async fn subscriber_sends_control_and_skips_junk() {
        let (subscriber_side, mut proxy_side) = duplex(4096);
        let participant = Participant::new(ManualEnv::default());
        let mut subscriber = Subscriber::new(subscriber_side, participant.clone());

        subscriber.subscribe("general").await.unwrap();
        assert_eq!(
            read_message(&mut proxy_side).await.unwrap(),
            Some(Multipart::subscribe("general"))
        );

        write_message(&mut proxy_side, &Multipart::single("no topic")).await.unwrap();
        write_message(&mut proxy_side, &Multipart::publication("general", "not cbor")).await.unwrap();

        let Value::Object(data) = json!({ "clock": 7 }) else { unreachable!() };
        let body = Envelope::new("publish", data).to_bytes().unwrap();
        write_message(&mut proxy_side, &Multipart::publication("general", body)).await.unwrap();

        let event = subscriber.next_event().await.unwrap().unwrap();
        assert_eq!(event.topic, "general");
        assert_eq!(participant.clock(), 8);
    }
}
