//! Reference server client.

use std::time::Duration;

use chorus_core::Environment;
use chorus_proto::{
    Envelope,
    payloads::{HeartbeatRequest, ListReply, RankReply, RankRequest, ServerEntry, Service},
};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{TcpStream, ToSocketAddrs},
};

use crate::{ClientError, Participant, RequestClient, request::DEFAULT_REQUEST_TIMEOUT};

/// Heartbeat period used by the reference deployment.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// A named server talking to the reference server.
#[derive(Debug)]
pub struct ReferenceClient<S, E: Environment> {
    name: String,
    requests: RequestClient<S, E>,
    timeout: Duration,
}

impl<E: Environment> ReferenceClient<TcpStream, E> {
    /// Connect over TCP.
    pub async fn connect(
        addr: impl ToSocketAddrs,
        name: impl Into<String>,
        participant: Participant<E>,
    ) -> Result<Self, ClientError> {
        let requests = RequestClient::connect(addr, participant).await?;
        Ok(Self::new(requests, name))
    }
}

impl<S, E> ReferenceClient<S, E>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
    E: Environment,
{
    /// Wrap a request connection to the reference server.
    pub fn new(requests: RequestClient<S, E>, name: impl Into<String>) -> Self {
        Self { name: name.into(), requests, timeout: DEFAULT_REQUEST_TIMEOUT }
    }

    /// Use a different per-request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Server name this client registers as.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Obtain this server's rank, registering on first contact.
    pub async fn rank(&mut self) -> Result<u64, ClientError> {
        let request = RankRequest { user: Some(self.name.clone()) };
        let reply: RankReply = self.call(Service::Rank, &request).await?;
        Ok(reply.rank)
    }

    /// Active servers, ordered by rank.
    pub async fn list(&mut self) -> Result<Vec<ServerEntry>, ClientError> {
        let reply: ListReply = self.call(Service::List, &Map::new()).await?;
        Ok(reply.list)
    }

    /// Signal liveness.
    pub async fn heartbeat(&mut self) -> Result<(), ClientError> {
        let request = HeartbeatRequest { user: Some(self.name.clone()) };
        let _: Map<String, Value> = self.call(Service::Heartbeat, &request).await?;
        Ok(())
    }

    /// Register, then heartbeat every `interval` until the connection fails.
    ///
    /// Recoverable errors (a rejected heartbeat, an odd reply) are logged and
    /// the loop continues. Returns the first fatal error.
    pub async fn run_heartbeats(&mut self, interval: Duration) -> Result<(), ClientError> {
        let rank = self.rank().await?;
        tracing::info!(server = %self.name, rank, "registered with reference server");

        loop {
            self.requests.participant().env().sleep(interval).await;

            match self.heartbeat().await {
                Ok(()) => tracing::trace!(server = %self.name, "heartbeat acknowledged"),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => tracing::warn!(server = %self.name, error = %e, "heartbeat failed"),
            }
        }
    }

    async fn call<Req, Rep>(&mut self, service: Service, request: &Req) -> Result<Rep, ClientError>
    where
        Req: Serialize + Sync,
        Rep: DeserializeOwned,
    {
        let envelope = Envelope::from_payload(service.as_str(), request)?;
        let reply = self.requests.request(service.as_str(), envelope.data, self.timeout).await?;
        expect_reply(service, &reply)
    }
}

fn expect_reply<Rep: DeserializeOwned>(service: Service, reply: &Envelope) -> Result<Rep, ClientError> {
    if reply.is_error() {
        return Err(ClientError::Rejected {
            service: reply.service.clone(),
            description: reply.description().unwrap_or_default().to_string(),
        });
    }

    if reply.service != service.as_str() {
        return Err(ClientError::UnexpectedReply {
            expected: service.as_str().to_string(),
            actual: reply.service.clone(),
        });
    }

    reply.payload().map_err(|e| ClientError::InvalidPayload(e.to_string()))
}
