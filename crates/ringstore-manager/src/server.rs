//! Control channel server.
//!
//! One task per inbound datagram. Every task takes the registry lock for
//! exactly one request, so directory reads and writes are atomic and phase
//! checks never interleave.

use std::net::SocketAddr;
use std::sync::Arc;

use ringstore_protocols::{ControlRequest, ControlResponse};
use ringstore_transfer::{Transport, MAX_DATAGRAM};
use tokio::sync::Mutex;

use crate::error::Result;
use crate::registry::Registry;

/// The manager process: a registry behind a control socket.
pub struct Manager {
    registry: Arc<Mutex<Registry>>,
    transport: Arc<dyn Transport>,
}

impl Manager {
    /// Serve `registry` on `transport`.
    pub fn new(registry: Registry, transport: Arc<dyn Transport>) -> Self {
        Self {
            registry: Arc::new(Mutex::new(registry)),
            transport,
        }
    }

    /// Shared registry handle.
    pub fn registry(&self) -> Arc<Mutex<Registry>> {
        Arc::clone(&self.registry)
    }

    /// Receive and answer requests until the transport fails.
    pub async fn run(&self) -> Result<()> {
        tracing::info!("Manager listening on {}", self.transport.local_addr()?);

        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            let (len, from) = self.transport.recv_from(&mut buf).await?;
            let line = String::from_utf8_lossy(&buf[..len]).into_owned();

            let registry = Arc::clone(&self.registry);
            let transport = Arc::clone(&self.transport);
            tokio::spawn(async move {
                handle_datagram(registry, transport, from, line).await;
            });
        }
    }
}

async fn handle_datagram(
    registry: Arc<Mutex<Registry>>,
    transport: Arc<dyn Transport>,
    from: SocketAddr,
    line: String,
) {
    let response = match ControlRequest::decode(&line) {
        Ok(request) => {
            tracing::debug!(%from, "{}", request);
            let response = registry.lock().await.apply(&request);
            tracing::info!(
                %from,
                command = request.command(),
                peer = request.name(),
                success = response.is_success(),
                "Handled request"
            );
            response
        }
        Err(e) => {
            tracing::warn!(%from, error = %e, "Malformed control request");
            ControlResponse::Failure(format!("invalid request: {}", e))
        }
    };

    if let Err(e) = transport.send_to(response.encode().as_bytes(), from).await {
        tracing::warn!(%from, error = %e, "Failed to send response");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringstore_transfer::{ChannelNetwork, ChannelTransport};

    async fn start(network: &ChannelNetwork) -> (Arc<Mutex<Registry>>, SocketAddr) {
        let addr: SocketAddr = "127.0.0.1:42000".parse().unwrap();
        let transport = network.bind(addr).await.unwrap();
        let manager = Manager::new(Registry::with_seed(3), Arc::new(transport));
        let registry = manager.registry();
        tokio::spawn(async move { manager.run().await });
        (registry, addr)
    }

    async fn request(client: &ChannelTransport, manager: SocketAddr, line: &str) -> String {
        tokio_test::assert_ok!(client.send_to(line.as_bytes(), manager).await);
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let (len, from) = client.recv_from(&mut buf).await.unwrap();
        assert_eq!(from, manager);
        String::from_utf8(buf[..len].to_vec()).unwrap()
    }

    #[tokio::test]
    async fn build_busy_and_complete() {
        let network = ChannelNetwork::new();
        let (registry, manager) = start(&network).await;
        let client = network.bind("127.0.0.1:42001".parse().unwrap()).await.unwrap();

        for (i, name) in ["P1", "P2", "P3"].iter().enumerate() {
            let base = 42_010 + 2 * i;
            let line = format!("register {} 127.0.0.1 {} {}", name, base, base + 1);
            assert_eq!(request(&client, manager, &line).await, "SUCCESS");
        }

        let response = request(&client, manager, "setup-dht P1 3 1950").await;
        let ControlResponse::Members(members) = ControlResponse::decode(&response).unwrap() else {
            panic!("unexpected response {}", response);
        };
        assert_eq!(members.leader().unwrap().name, "P1");
        assert_eq!(members.len(), 3);

        assert_eq!(
            request(&client, manager, "setup-dht P2 3 1950").await,
            "FAILURE: Building in progress"
        );
        assert_eq!(request(&client, manager, "dht-complete P1").await, "SUCCESS");
        assert!(registry.lock().await.dht_exists());
    }

    #[tokio::test]
    async fn malformed_request_gets_failure() {
        let network = ChannelNetwork::new();
        let (_, manager) = start(&network).await;
        let client = network.bind("127.0.0.1:42001".parse().unwrap()).await.unwrap();

        let response = request(&client, manager, "register P1 not-an-ip 1 2").await;
        assert!(response.starts_with("FAILURE: invalid request"));

        let response = request(&client, manager, "shout P1").await;
        assert_eq!(
            ControlResponse::decode(&response).unwrap(),
            ControlResponse::Failure("invalid request: unknown command: shout".into())
        );
    }
}
