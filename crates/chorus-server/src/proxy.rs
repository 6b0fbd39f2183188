//! Broadcast fan-out service.
//!
//! Publishers connect to the front side and send `[topic, body]`;
//! subscribers connect to the back side, send subscription control messages,
//! and receive every publication whose topic matches one of their prefixes.
//!
//! Publications go into one broadcast channel. Each subscriber task keeps its
//! own [`SubscriptionSet`] and filters the shared feed, so the proxy holds no
//! cross-connection state. A subscriber that falls more than `buffer`
//! publications behind skips the ones it missed. Nothing is replayed: a
//! publication sent before a subscription arrives is lost for that
//! subscriber.

use std::{net::SocketAddr, sync::Arc};

use chorus_core::{Environment, Listener, PeerId, SubscriptionSet, read_message, write_message};
use chorus_proto::Multipart;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpListener,
    sync::{broadcast, mpsc},
};

use crate::{ProxyConfig, ServerError, SystemEnv, connection::log_read_error};

/// Control messages buffered per subscriber.
const CONTROL_CAPACITY: usize = 64;

/// Publish/subscribe fan-out router.
pub struct Proxy<L: Listener, E: Environment> {
    frontend: L,
    backend: L,
    env: E,
    config: ProxyConfig,
}

impl Proxy<TcpListener, SystemEnv> {
    /// Bind both sides over TCP.
    pub async fn bind(config: ProxyConfig) -> Result<Self, ServerError> {
        let frontend = TcpListener::bind(&config.frontend)
            .await
            .map_err(ServerError::bind(&config.frontend))?;
        let backend = TcpListener::bind(&config.backend)
            .await
            .map_err(ServerError::bind(&config.backend))?;
        Ok(Self::new(frontend, backend, SystemEnv::new(), config))
    }
}

impl<L: Listener, E: Environment> Proxy<L, E> {
    /// Build a proxy over already bound listeners.
    pub fn new(frontend: L, backend: L, env: E, config: ProxyConfig) -> Self {
        Self { frontend, backend, env, config }
    }

    /// Address publishers connect to.
    pub fn frontend_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.frontend.local_addr()?)
    }

    /// Address subscribers connect to.
    pub fn backend_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.backend.local_addr()?)
    }

    /// Run until the process is stopped.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!(
            frontend = %self.frontend.local_addr()?,
            backend = %self.backend.local_addr()?,
            "proxy starting"
        );

        let (feed, _) = broadcast::channel::<Arc<Multipart>>(self.config.buffer.max(1));

        tokio::join!(
            accept_publishers(self.frontend, self.env.clone(), feed.clone()),
            accept_subscribers(self.backend, self.env, feed),
        );

        Ok(())
    }
}

async fn accept_publishers<L: Listener, E: Environment>(
    listener: L,
    env: E,
    feed: broadcast::Sender<Arc<Multipart>>,
) {
    let mut next_id = env.random_u64();

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let peer = PeerId(next_id);
                next_id = next_id.wrapping_add(1);
                tracing::debug!(%peer, %addr, "publisher connected");
                tokio::spawn(serve_publisher(stream, peer, feed.clone()));
            },
            Err(e) => tracing::error!("publisher accept error: {}", e),
        }
    }
}

async fn serve_publisher<S>(mut stream: S, peer: PeerId, feed: broadcast::Sender<Arc<Multipart>>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    loop {
        match read_message(&mut stream).await {
            Ok(Some(message)) => {
                if !message.flags().is_empty() || message.is_empty() {
                    tracing::debug!(%peer, "publisher sent a non-publication, ignored");
                    continue;
                }
                // No receivers is normal: nobody has subscribed yet.
                let receivers = feed.send(Arc::new(message)).unwrap_or(0);
                tracing::trace!(%peer, receivers, "publication forwarded");
            },
            Ok(None) => {
                tracing::debug!(%peer, "publisher disconnected");
                break;
            },
            Err(e) => {
                log_read_error(peer, &e);
                break;
            },
        }
    }
}

async fn accept_subscribers<L: Listener, E: Environment>(
    listener: L,
    env: E,
    feed: broadcast::Sender<Arc<Multipart>>,
) {
    let mut next_id = env.random_u64();

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let peer = PeerId(next_id);
                next_id = next_id.wrapping_add(1);
                tracing::debug!(%peer, %addr, "subscriber connected");
                tokio::spawn(serve_subscriber(stream, peer, feed.subscribe()));
            },
            Err(e) => tracing::error!("subscriber accept error: {}", e),
        }
    }
}

async fn serve_subscriber<S>(
    stream: S,
    peer: PeerId,
    mut publications: broadcast::Receiver<Arc<Multipart>>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut reader, mut writer) = tokio::io::split(stream);
    let (control_tx, mut control) = mpsc::channel::<Multipart>(CONTROL_CAPACITY);

    // Reads are not cancel-safe, so they run in their own task and the loop
    // below only selects over channels.
    let reader_task = tokio::spawn(async move {
        loop {
            match read_message(&mut reader).await {
                Ok(Some(message)) if message.flags().is_subscription_control() => {
                    if control_tx.send(message).await.is_err() {
                        break;
                    }
                },
                Ok(Some(_)) => tracing::debug!(%peer, "subscriber sent data, ignored"),
                Ok(None) => break,
                Err(e) => {
                    log_read_error(peer, &e);
                    break;
                },
            }
        }
    });

    let mut subscriptions = SubscriptionSet::new();

    loop {
        tokio::select! {
            message = control.recv() => {
                let Some(message) = message else {
                    tracing::debug!(%peer, "subscriber disconnected");
                    break;
                };
                if !subscriptions.apply(&message) {
                    tracing::warn!(%peer, parts = message.len(), "malformed subscription ignored");
                }
            },
            publication = publications.recv() => match publication {
                Ok(publication) => {
                    if !subscriptions.accepts(&publication) {
                        continue;
                    }
                    if let Err(e) = write_message(&mut writer, &publication).await {
                        tracing::debug!(%peer, error = %e, "subscriber write failed");
                        break;
                    }
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(%peer, skipped, "subscriber lagging, publications dropped");
                },
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    reader_task.abort();
}
