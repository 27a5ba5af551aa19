//! Control channel client.
//!
//! One request is outstanding at a time: the client holds its lock from
//! send to reply, and datagrams that do not come from the manager are
//! dropped while it waits.

use std::net::SocketAddr;
use std::sync::Arc;

use ringstore_dht::{Membership, PeerTuple};
use ringstore_protocols::{ControlRequest, ControlResponse};
use ringstore_transfer::{Transport, MAX_DATAGRAM};
use tokio::sync::Mutex;

use crate::error::{Error, Result};

/// Talks to the manager over the peer's control socket.
pub struct ControlClient {
    transport: Mutex<Arc<dyn Transport>>,
    local: SocketAddr,
    manager: SocketAddr,
}

impl ControlClient {
    /// Client sending from `transport` to the manager at `manager`.
    pub fn new(transport: Arc<dyn Transport>, manager: SocketAddr) -> std::io::Result<Self> {
        let local = transport.local_addr()?;
        Ok(Self {
            transport: Mutex::new(transport),
            local,
            manager,
        })
    }

    /// Local control socket address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    /// Manager address.
    pub fn manager(&self) -> SocketAddr {
        self.manager
    }

    /// Send `request` and wait for the manager's answer.
    pub async fn request(&self, request: &ControlRequest) -> Result<ControlResponse> {
        let transport = self.transport.lock().await;
        transport
            .send_to(request.encode().as_bytes(), self.manager)
            .await?;
        tracing::debug!(manager = %self.manager, "-> {}", request);

        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            let (len, from) = transport.recv_from(&mut buf).await?;
            if from != self.manager {
                tracing::warn!(%from, "Dropping control datagram from unknown sender");
                continue;
            }
            let text = String::from_utf8_lossy(&buf[..len]);
            let response = ControlResponse::decode(&text)?;
            tracing::debug!(manager = %self.manager, "<- {}", response);
            return Ok(response);
        }
    }

    /// Send `request`, turning a FAILURE into [`Error::Rejected`].
    pub async fn call(&self, request: &ControlRequest) -> Result<ControlResponse> {
        match self.request(request).await? {
            ControlResponse::Failure(reason) => {
                tracing::info!(command = request.command(), %reason, "Manager rejected request");
                Err(Error::Rejected(reason))
            }
            response => Ok(response),
        }
    }

    /// Expect a plain SUCCESS.
    pub async fn expect_success(&self, request: &ControlRequest) -> Result<()> {
        match self.call(request).await? {
            ControlResponse::Success => Ok(()),
            other => Err(Error::UnexpectedResponse(other.to_string())),
        }
    }

    /// Expect SUCCESS with a member list.
    pub async fn expect_members(&self, request: &ControlRequest) -> Result<Membership> {
        match self.call(request).await? {
            ControlResponse::Members(members) => Ok(members),
            other => Err(Error::UnexpectedResponse(other.to_string())),
        }
    }

    /// Expect SUCCESS with one peer tuple.
    pub async fn expect_peer(&self, request: &ControlRequest) -> Result<PeerTuple> {
        match self.call(request).await? {
            ControlResponse::Peer(peer) => Ok(peer),
            other => Err(Error::UnexpectedResponse(other.to_string())),
        }
    }
}
