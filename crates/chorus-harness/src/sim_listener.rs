//! Listener over turmoil's simulated TCP.

use std::{io, net::SocketAddr, time::Duration};

use async_trait::async_trait;
use chorus_core::Listener;
use turmoil::net::{TcpListener, TcpStream};

/// Attempts made by [`connect`] before giving up.
pub const CONNECT_ATTEMPTS: u32 = 50;

const RETRY_DELAY: Duration = Duration::from_millis(100);

/// Simulated TCP listener for the Chorus services.
pub struct SimListener {
    inner: TcpListener,
}

impl std::fmt::Debug for SimListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimListener").finish_non_exhaustive()
    }
}

impl SimListener {
    /// Bind on the current simulated host, e.g. `"0.0.0.0:5559"`.
    pub async fn bind(addr: &str) -> io::Result<Self> {
        let inner = TcpListener::bind(addr).await?;
        Ok(Self { inner })
    }
}

#[async_trait]
impl Listener for SimListener {
    type Stream = TcpStream;

    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        self.inner.accept().await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}

/// Connect to `host:port`, retrying while the target host is still binding.
///
/// Hosts in a simulation start in no particular order, so the first attempt
/// may be refused.
pub async fn connect(addr: &str) -> io::Result<TcpStream> {
    let mut attempt = 1;
    loop {
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) if attempt >= CONNECT_ATTEMPTS => return Err(e),
            Err(e) => {
                tracing::debug!(addr, attempt, error = %e, "connect refused, retrying");
                attempt += 1;
                tokio::time::sleep(RETRY_DELAY).await;
            },
        }
    }
}
