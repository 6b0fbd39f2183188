//! Per-connection plumbing shared by the routing tiers.

use std::fmt::Display;

use chorus_core::{TransportError, write_message};
use chorus_proto::Multipart;
use tokio::{io::AsyncWrite, sync::mpsc, task::JoinHandle};

/// Spawn a task that drains an outbox into `writer`.
///
/// The task ends when every sender is dropped or a write fails. Callers hold
/// the sender and push with `try_send`, so one slow peer never stalls a
/// router.
pub(crate) fn spawn_writer<W>(
    mut writer: W,
    capacity: usize,
    peer: impl Display + Send + 'static,
) -> (mpsc::Sender<Multipart>, JoinHandle<()>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<Multipart>(capacity.max(1));

    let task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if let Err(e) = write_message(&mut writer, &message).await {
                tracing::debug!(%peer, error = %e, "write failed, closing writer");
                break;
            }
        }
    });

    (tx, task)
}

/// Log a read failure at the level it deserves.
///
/// Protocol violations are the peer's fault and worth a warning; I/O errors
/// are ordinary disconnects.
pub(crate) fn log_read_error(peer: impl Display, error: &TransportError) {
    match error {
        TransportError::Wire(e) => {
            tracing::warn!(%peer, error = %e, "protocol violation, closing connection");
        },
        TransportError::Io(e) => tracing::debug!(%peer, error = %e, "connection lost"),
    }
}
