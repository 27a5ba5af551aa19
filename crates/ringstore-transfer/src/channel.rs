//! In-memory datagram transport.
//!
//! A shared [`ChannelNetwork`] routes datagrams between [`ChannelTransport`]
//! endpoints by socket address. Per-sender delivery order is preserved.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use crate::Transport;

type Datagram = (Vec<u8>, SocketAddr);

/// Shared broker routing datagrams between endpoints.
#[derive(Clone, Debug, Default)]
pub struct ChannelNetwork {
    peers: Arc<Mutex<HashMap<SocketAddr, mpsc::UnboundedSender<Datagram>>>>,
}

impl ChannelNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an endpoint at `addr`.
    pub async fn bind(&self, addr: SocketAddr) -> io::Result<ChannelTransport> {
        let mut peers = self.peers.lock().await;
        if peers.contains_key(&addr) {
            return Err(io::Error::new(
                io::ErrorKind::AddrInUse,
                format!("{} already bound", addr),
            ));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        peers.insert(addr, tx);
        Ok(ChannelTransport {
            addr,
            network: self.clone(),
            inbox: Arc::new(Mutex::new(rx)),
        })
    }

    /// Detach the endpoint at `addr`; later sends to it fail.
    pub async fn unbind(&self, addr: SocketAddr) {
        self.peers.lock().await.remove(&addr);
    }
}

/// One endpoint of a [`ChannelNetwork`].
#[derive(Clone, Debug)]
pub struct ChannelTransport {
    addr: SocketAddr,
    network: ChannelNetwork,
    inbox: Arc<Mutex<mpsc::UnboundedReceiver<Datagram>>>,
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send_to(&self, data: &[u8], to: SocketAddr) -> io::Result<()> {
        let peers = self.network.peers.lock().await;
        let peer = peers.get(&to).ok_or_else(|| {
            io::Error::new(io::ErrorKind::ConnectionRefused, format!("no endpoint at {}", to))
        })?;
        peer.send((data.to_vec(), self.addr)).map_err(|_| {
            io::Error::new(io::ErrorKind::ConnectionRefused, format!("{} closed", to))
        })
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        let (data, from) = self
            .inbox
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "network closed"))?;

        // Oversized datagrams are truncated, as with UDP.
        let len = data.len().min(buf.len());
        buf[..len].copy_from_slice(&data[..len]);
        Ok((len, from))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[tokio::test]
    async fn delivers_in_order_with_source() {
        let network = ChannelNetwork::new();
        let a = network.bind(addr(1)).await.unwrap();
        let b = network.bind(addr(2)).await.unwrap();

        for i in 0..3 {
            a.send_to(format!("store {}", i).as_bytes(), addr(2))
                .await
                .unwrap();
        }

        let mut buf = [0u8; 32];
        for i in 0..3 {
            let (len, from) = b.recv_from(&mut buf).await.unwrap();
            assert_eq!(from, addr(1));
            assert_eq!(&buf[..len], format!("store {}", i).as_bytes());
        }
    }

    #[tokio::test]
    async fn rejects_duplicate_and_unknown_addresses() {
        let network = ChannelNetwork::new();
        let a = network.bind(addr(1)).await.unwrap();

        let dup = network.bind(addr(1)).await.unwrap_err();
        assert_eq!(dup.kind(), io::ErrorKind::AddrInUse);

        let missing = a.send_to(b"teardown full", addr(9)).await.unwrap_err();
        assert_eq!(missing.kind(), io::ErrorKind::ConnectionRefused);

        network.unbind(addr(1)).await;
        let b = network.bind(addr(2)).await.unwrap();
        assert!(b.send_to(b"x", addr(1)).await.is_err());
    }

    #[tokio::test]
    async fn truncates_oversized_datagram() {
        let network = ChannelNetwork::new();
        let a = network.bind(addr(1)).await.unwrap();
        let b = network.bind(addr(2)).await.unwrap();

        a.send_to(b"print_configuration []", addr(2)).await.unwrap();
        let mut buf = [0u8; 5];
        let (len, _) = b.recv_from(&mut buf).await.unwrap();
        assert_eq!(len, 5);
        assert_eq!(&buf, b"print");
    }
}
