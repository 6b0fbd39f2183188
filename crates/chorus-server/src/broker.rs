//! Request router service.
//!
//! Two listeners: request clients on the front side, workers on the back
//! side. Every connection gets a reader (this task) and a writer task fed by
//! an outbox. Readers turn traffic into [`BrokerEvent`]s for the single
//! `route` task, which owns the [`BrokerRouter`] and all outboxes.

use std::{collections::HashMap, net::SocketAddr, sync::Arc};

use chorus_core::{
    BrokerAction, BrokerEvent, BrokerRouter, Environment, Listener, PeerId, read_message,
};
use chorus_proto::Multipart;
use tokio::{
    net::TcpListener,
    sync::mpsc::{self, error::TrySendError},
};

use crate::{
    BrokerConfig, ServerError, SystemEnv,
    connection::{log_read_error, spawn_writer},
};

/// Which side of the broker a connection is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Client,
    Worker,
}

impl Side {
    fn as_str(self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Worker => "worker",
        }
    }
}

/// Input to the `route` task.
#[derive(Debug)]
enum Command {
    Attach { side: Side, peer: PeerId, outbox: mpsc::Sender<Multipart> },
    Detach { side: Side, peer: PeerId },
    Message { side: Side, peer: PeerId, message: Multipart },
}

/// Request router.
pub struct Broker<L: Listener, E: Environment> {
    frontend: L,
    backend: L,
    env: E,
    config: BrokerConfig,
}

impl Broker<TcpListener, SystemEnv> {
    /// Bind both sides over TCP.
    pub async fn bind(config: BrokerConfig) -> Result<Self, ServerError> {
        let frontend = TcpListener::bind(&config.frontend)
            .await
            .map_err(ServerError::bind(&config.frontend))?;
        let backend = TcpListener::bind(&config.backend)
            .await
            .map_err(ServerError::bind(&config.backend))?;
        Ok(Self::new(frontend, backend, SystemEnv::new(), config))
    }
}

impl<L: Listener, E: Environment> Broker<L, E> {
    /// Build a broker over already bound listeners.
    pub fn new(frontend: L, backend: L, env: E, config: BrokerConfig) -> Self {
        Self { frontend, backend, env, config }
    }

    /// Address request clients connect to.
    pub fn frontend_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.frontend.local_addr()?)
    }

    /// Address workers connect to.
    pub fn backend_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.backend.local_addr()?)
    }

    /// Run until the process is stopped.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!(
            frontend = %self.frontend.local_addr()?,
            backend = %self.backend.local_addr()?,
            "broker starting"
        );

        let (commands, inbox) = mpsc::channel(self.config.outbox_capacity.max(1) * 4);
        let router = BrokerRouter::new(self.config.max_pending);
        tokio::spawn(route(router, inbox));

        let capacity = self.config.outbox_capacity;
        let frontend = Arc::new(self.frontend);
        let backend = Arc::new(self.backend);

        tokio::join!(
            accept_loop(frontend, Side::Client, self.env.clone(), commands.clone(), capacity),
            accept_loop(backend, Side::Worker, self.env, commands, capacity),
        );

        Ok(())
    }
}

async fn accept_loop<L: Listener, E: Environment>(
    listener: Arc<L>,
    side: Side,
    env: E,
    commands: mpsc::Sender<Command>,
    capacity: usize,
) {
    let mut next_id = env.random_u64();

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let peer = PeerId(next_id);
                next_id = next_id.wrapping_add(1);
                tracing::debug!(side = side.as_str(), %peer, %addr, "connection accepted");

                let commands = commands.clone();
                tokio::spawn(serve_peer(stream, side, peer, commands, capacity));
            },
            Err(e) => {
                tracing::error!(side = side.as_str(), "accept error: {}", e);
            },
        }
    }
}

async fn serve_peer<S>(
    stream: S,
    side: Side,
    peer: PeerId,
    commands: mpsc::Sender<Command>,
    capacity: usize,
) where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    let (mut reader, writer) = tokio::io::split(stream);
    let (outbox, writer_task) = spawn_writer(writer, capacity, peer);

    if commands.send(Command::Attach { side, peer, outbox }).await.is_err() {
        writer_task.abort();
        return;
    }

    loop {
        match read_message(&mut reader).await {
            Ok(Some(message)) => {
                if commands.send(Command::Message { side, peer, message }).await.is_err() {
                    break;
                }
            },
            Ok(None) => {
                tracing::debug!(side = side.as_str(), %peer, "peer disconnected");
                break;
            },
            Err(e) => {
                log_read_error(peer, &e);
                break;
            },
        }
    }

    let _ = commands.send(Command::Detach { side, peer }).await;
    writer_task.abort();
}

/// Single owner of routing state and every outbox.
async fn route(mut router: BrokerRouter, mut inbox: mpsc::Receiver<Command>) {
    let mut clients: HashMap<PeerId, mpsc::Sender<Multipart>> = HashMap::new();
    let mut workers: HashMap<PeerId, mpsc::Sender<Multipart>> = HashMap::new();

    while let Some(command) = inbox.recv().await {
        let event = match command {
            Command::Attach { side: Side::Client, peer, outbox } => {
                clients.insert(peer, outbox);
                BrokerEvent::ClientConnected(peer)
            },
            Command::Attach { side: Side::Worker, peer, outbox } => {
                workers.insert(peer, outbox);
                BrokerEvent::WorkerConnected(peer)
            },
            Command::Detach { side: Side::Client, peer } => {
                clients.remove(&peer);
                BrokerEvent::ClientDisconnected(peer)
            },
            Command::Detach { side: Side::Worker, peer } => {
                workers.remove(&peer);
                BrokerEvent::WorkerDisconnected(peer)
            },
            Command::Message { side: Side::Client, peer, message } => {
                BrokerEvent::ClientMessage { client: peer, message }
            },
            Command::Message { side: Side::Worker, peer, message } => {
                BrokerEvent::WorkerMessage { worker: peer, message }
            },
        };

        for action in router.process_event(event) {
            match action {
                BrokerAction::SendToWorker { worker, message } => {
                    deliver(&workers, Side::Worker, worker, message);
                },
                BrokerAction::SendToClient { client, message } => {
                    deliver(&clients, Side::Client, client, message);
                },
            }
        }
    }
}

fn deliver(
    outboxes: &HashMap<PeerId, mpsc::Sender<Multipart>>,
    side: Side,
    peer: PeerId,
    message: Multipart,
) {
    let Some(outbox) = outboxes.get(&peer) else {
        tracing::debug!(side = side.as_str(), %peer, "no outbox, message dropped");
        return;
    };

    match outbox.try_send(message) {
        Ok(()) => {},
        Err(TrySendError::Full(_)) => {
            tracing::warn!(side = side.as_str(), %peer, "outbox full, message dropped");
        },
        Err(TrySendError::Closed(_)) => {
            tracing::debug!(side = side.as_str(), %peer, "outbox closed, message dropped");
        },
    }
}
