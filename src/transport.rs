//! Datagram transport abstraction.
//!
//! The endpoint talks to the network exclusively through [`Transport`]:
//! raw bytes out to an address, raw bytes in with their source address.
//! No reassembly, no ordering.  [`UdpTransport`] is the production
//! implementation; [`crate::simulator::SimSocket`] the in-memory one.

use std::future::Future;
use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::UdpSocket;

/// Maximum UDP payload size (theoretical limit; in practice kept much smaller).
const MAX_DATAGRAM: usize = 65_535;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can arise from transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Underlying I/O error from the OS.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The transport has been shut down and will not carry more datagrams.
    #[error("transport closed")]
    Closed,
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// An unreliable, unordered datagram channel.
///
/// All methods take `&self` so one transport can be shared between the
/// receive loop, the retry monitor and any number of senders.
pub trait Transport: Send + Sync + 'static {
    /// Address this transport is bound to.
    fn local_addr(&self) -> SocketAddr;

    /// Write `bytes` as one datagram to `dest`.
    fn send_to(
        &self,
        bytes: &[u8],
        dest: SocketAddr,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Wait for the next inbound datagram.
    fn recv_from(
        &self,
    ) -> impl Future<Output = Result<(Vec<u8>, SocketAddr), TransportError>> + Send;
}

// ---------------------------------------------------------------------------
// UdpTransport
// ---------------------------------------------------------------------------

/// A [`Transport`] backed by a `tokio::net::UdpSocket`.
#[derive(Debug)]
pub struct UdpTransport {
    /// Address this socket is bound to (filled in after OS assigns ephemeral port).
    local_addr: SocketAddr,
    inner: UdpSocket,
}

impl UdpTransport {
    /// Bind a new socket to `local_addr`.
    ///
    /// Passing `0.0.0.0:0` lets the OS choose an ephemeral port.
    pub async fn bind(local_addr: SocketAddr) -> Result<Self, TransportError> {
        let inner = UdpSocket::bind(local_addr).await?;
        let local_addr = inner.local_addr()?;
        log::debug!("udp transport bound to {local_addr}");
        Ok(Self { local_addr, inner })
    }
}

impl Transport for UdpTransport {
    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    async fn send_to(&self, bytes: &[u8], dest: SocketAddr) -> Result<(), TransportError> {
        self.inner.send_to(bytes, dest).await?;
        Ok(())
    }

    async fn recv_from(&self) -> Result<(Vec<u8>, SocketAddr), TransportError> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let (n, addr) = self.inner.recv_from(&mut buf).await?;
        buf.truncate(n);
        Ok((buf, addr))
    }
}
