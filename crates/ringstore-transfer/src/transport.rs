//! UDP transport for the control and data channels.
//!
//! A thin wrapper around tokio's UdpSocket with configurable send/receive
//! buffer sizes. Each datagram carries exactly one protocol message; there
//! is no framing beyond the datagram boundary.

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

/// Largest payload a single UDP datagram can carry.
pub const MAX_DATAGRAM: usize = 65_507;

/// Connectionless datagram transport.
///
/// Implemented over UDP for real deployments and over in-memory channels
/// for tests. Delivery is best effort; callers do not retry.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Send one datagram.
    async fn send_to(&self, data: &[u8], to: SocketAddr) -> io::Result<()>;

    /// Receive one datagram into `buf`, returning its length and source.
    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;

    /// Address this transport is reachable at.
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

/// Transport configuration
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Address to bind to
    pub bind: SocketAddr,
    /// Send buffer size in bytes
    pub sndbuf: usize,
    /// Receive buffer size in bytes
    pub rcvbuf: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            sndbuf: 1024 * 1024, // 1MB
            rcvbuf: 1024 * 1024, // 1MB
        }
    }
}

impl TransportConfig {
    /// Default buffers, bound to `addr`.
    pub fn bound_to(addr: SocketAddr) -> Self {
        Self {
            bind: addr,
            ..Default::default()
        }
    }
}

/// UDP socket transport.
#[derive(Debug, Clone)]
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
}

impl UdpTransport {
    /// Bind with the configured buffer sizes.
    pub async fn bind(cfg: TransportConfig) -> anyhow::Result<Self> {
        let addr = cfg.bind;
        let domain = if addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };

        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;

        // Buffer sizes must be set before binding
        socket.set_send_buffer_size(cfg.sndbuf)?;
        socket.set_recv_buffer_size(cfg.rcvbuf)?;

        socket.bind(&addr.into())?;
        socket.set_nonblocking(true)?;

        let std_socket: std::net::UdpSocket = socket.into();
        let tokio_socket = UdpSocket::from_std(std_socket)?;

        tracing::info!(
            "UDP transport bound to {} (sndbuf={}, rcvbuf={})",
            tokio_socket.local_addr()?,
            cfg.sndbuf,
            cfg.rcvbuf
        );

        Ok(Self {
            socket: Arc::new(tokio_socket),
        })
    }

    /// Get the underlying socket
    pub fn socket(&self) -> Arc<UdpSocket> {
        self.socket.clone()
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send_to(&self, data: &[u8], to: SocketAddr) -> io::Result<()> {
        self.socket.send_to(data, to).await?;
        Ok(())
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.socket.recv_from(buf).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}
