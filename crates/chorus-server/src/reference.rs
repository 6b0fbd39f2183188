//! Reference server: rank assignment, heartbeats and the liveness sweep.
//!
//! Request handling and the periodic sweep share one [`Reference`] behind a
//! single `tokio::sync::Mutex`. Each request and each sweep holds the lock for
//! its whole table access, so two first-contact requests for the same name
//! can never both register it.

use std::{net::SocketAddr, sync::Arc};

use bytes::Bytes;
use chorus_core::{Environment, Listener, Reference, read_message, write_message};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpListener,
    sync::Mutex,
};

use crate::{ReferenceConfig, ServerError, SystemEnv, connection::log_read_error};

/// Reference server.
pub struct ReferenceService<L: Listener, E: Environment> {
    listener: L,
    env: E,
    reference: Arc<Mutex<Reference<E>>>,
    config: ReferenceConfig,
}

impl ReferenceService<TcpListener, SystemEnv> {
    /// Bind over TCP.
    pub async fn bind(config: ReferenceConfig) -> Result<Self, ServerError> {
        config.validate()?;
        let listener = TcpListener::bind(&config.bind).await.map_err(ServerError::bind(&config.bind))?;
        Ok(Self::new(listener, SystemEnv::new(), config))
    }
}

impl<L: Listener, E: Environment> ReferenceService<L, E> {
    /// Build a reference server over an already bound listener.
    pub fn new(listener: L, env: E, config: ReferenceConfig) -> Self {
        let reference = Arc::new(Mutex::new(Reference::new(env.clone(), config.timeout)));
        Self { listener, env, reference, config }
    }

    /// Address the service listens on.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Shared handle to the registration state.
    pub fn reference(&self) -> Arc<Mutex<Reference<E>>> {
        Arc::clone(&self.reference)
    }

    /// Run until the process is stopped.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!(
            addr = %self.listener.local_addr()?,
            sweep_interval = ?self.config.sweep_interval,
            timeout = ?self.config.timeout,
            "reference server starting"
        );

        tokio::spawn(sweep_loop(
            Arc::clone(&self.reference),
            self.env.clone(),
            self.config.sweep_interval,
        ));

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    tracing::debug!(%addr, "connection accepted");
                    let reference = Arc::clone(&self.reference);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, addr, reference).await {
                            log_read_error(addr, &e);
                        }
                    });
                },
                Err(e) => {
                    tracing::error!("Accept error: {}", e);
                },
            }
        }
    }
}

async fn sweep_loop<E: Environment>(
    reference: Arc<Mutex<Reference<E>>>,
    env: E,
    interval: std::time::Duration,
) {
    loop {
        env.sleep(interval).await;
        let evicted = reference.lock().await.sweep();
        if !evicted.is_empty() {
            tracing::debug!(count = evicted.len(), "sweep finished");
        }
    }
}

/// Answer requests on one connection until the peer leaves.
///
/// Requests may arrive bare or behind a routing envelope; the reply goes back
/// behind the same envelope.
async fn handle_connection<S, E>(
    mut stream: S,
    addr: SocketAddr,
    reference: Arc<Mutex<Reference<E>>>,
) -> Result<(), chorus_core::TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
    E: Environment,
{
    while let Some(message) = read_message(&mut stream).await? {
        let (routing, body) = message.split_envelope();
        let frame = body.first().map_or(&[][..], |frame| &frame[..]);

        let reply = reference.lock().await.handle_bytes(frame);

        let bytes = match reply.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(%addr, error = %e, "failed to encode reply");
                continue;
            },
        };

        write_message(&mut stream, &routing.wrap(vec![Bytes::from(bytes)])).await?;
    }

    tracing::debug!(%addr, "connection closed");
    Ok(())
}
