//! Stream transport for multipart messages.
//!
//! Services accept connections through [`Listener`] so the same accept loops
//! run over real TCP in production and over turmoil's simulated network in
//! the harness. Messages are read and written with [`read_message`] and
//! [`write_message`] over any async byte stream.

use std::{io, net::SocketAddr};

use async_trait::async_trait;
use chorus_proto::{MAX_BODY_SIZE, MessageHeader, Multipart, WireError};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Errors reading or writing messages on a stream.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Underlying I/O failed or the peer hung up mid-message.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// Peer sent bytes that are not a valid message. The connection is
    /// unusable after this.
    #[error("protocol violation: {0}")]
    Wire(#[from] WireError),
}

/// Source of inbound connections.
#[async_trait]
pub trait Listener: Send + Sync + 'static {
    /// Accepted connection type.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Wait for the next connection.
    async fn accept(&self) -> io::Result<(Self::Stream, SocketAddr)>;

    /// Address the listener is bound to.
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

#[async_trait]
impl Listener for tokio::net::TcpListener {
    type Stream = tokio::net::TcpStream;

    async fn accept(&self) -> io::Result<(Self::Stream, SocketAddr)> {
        let (stream, addr) = tokio::net::TcpListener::accept(self).await?;
        stream.set_nodelay(true)?;
        Ok((stream, addr))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        tokio::net::TcpListener::local_addr(self)
    }
}

/// Read one message.
///
/// Returns `Ok(None)` if the peer closed the stream cleanly between
/// messages. EOF inside a message is an `Io` error.
pub async fn read_message<R>(reader: &mut R) -> Result<Option<Multipart>, TransportError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut header_buf = [0u8; MessageHeader::SIZE];

    let first = reader.read(&mut header_buf[..1]).await?;
    if first == 0 {
        return Ok(None);
    }
    reader.read_exact(&mut header_buf[1..]).await?;

    let header = MessageHeader::from_bytes(&header_buf)?;

    let body_len = header.body_len() as usize;
    debug_assert!(body_len <= MAX_BODY_SIZE);

    let mut body = vec![0u8; body_len];
    reader.read_exact(&mut body).await?;

    Ok(Some(Multipart::decode_body(&header, &body)?))
}

/// Write one message and flush.
pub async fn write_message<W>(writer: &mut W, message: &Multipart) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let bytes = message.to_bytes()?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use tokio::io::{AsyncWriteExt, duplex};

    use super::*;

    #[tokio::test]
    async fn message_crosses_a_stream() {
        let (mut a, mut b) = duplex(1024);
        let sent = Multipart::new(vec![Bytes::new(), Bytes::from_static(b"body")]);

        write_message(&mut a, &sent).await.unwrap();
        let received = read_message(&mut b).await.unwrap();

        assert_eq!(received, Some(sent));
    }

    #[tokio::test]
    async fn back_to_back_messages() {
        let (mut a, mut b) = duplex(1024);
        write_message(&mut a, &Multipart::subscribe("general")).await.unwrap();
        write_message(&mut a, &Multipart::publication("general", "hi")).await.unwrap();

        assert_eq!(read_message(&mut b).await.unwrap(), Some(Multipart::subscribe("general")));
        assert_eq!(
            read_message(&mut b).await.unwrap(),
            Some(Multipart::publication("general", "hi"))
        );
    }

    #[tokio::test]
    async fn clean_close_is_none() {
        let (a, mut b) = duplex(64);
        drop(a);
        assert!(read_message(&mut b).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn close_mid_message_is_io_error() {
        let (mut a, mut b) = duplex(64);
        let bytes = Multipart::single("truncated").to_bytes().unwrap();
        a.write_all(&bytes[..bytes.len() - 3]).await.unwrap();
        drop(a);

        assert!(matches!(read_message(&mut b).await, Err(TransportError::Io(_))));
    }

    #[tokio::test]
    async fn bad_magic_is_wire_error() {
        let (mut a, mut b) = duplex(64);
        a.write_all(b"GET / HTTP/1.1\r\n").await.unwrap();

        assert!(matches!(
            read_message(&mut b).await,
            Err(TransportError::Wire(WireError::InvalidMagic(_)))
        ));
    }

    #[tokio::test]
    async fn tcp_listener_accepts() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = Listener::local_addr(&listener).unwrap();

        let client = tokio::spawn(async move {
            let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
            write_message(&mut stream, &Multipart::single("ping")).await.unwrap();
        });

        let (mut stream, _) = Listener::accept(&listener).await.unwrap();
        let message = read_message(&mut stream).await.unwrap().unwrap();
        assert_eq!(&message.parts()[0][..], b"ping");

        client.await.unwrap();
    }
}
