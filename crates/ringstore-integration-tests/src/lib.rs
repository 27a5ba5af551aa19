//! End-to-end harness: one manager and a set of peers on an in-memory
//! network.

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use ringstore_dht::{Dataset, DatasetSource, LocalTable, MemoryDatasets, PeerTuple};
use ringstore_manager::{Manager, Registry};
use ringstore_peer::{ControlClient, PeerNode};
use ringstore_transfer::ChannelNetwork;
use tokio::sync::Mutex;

#[cfg(test)]
mod scenarios;

/// Manager control address inside the harness.
pub const MANAGER_PORT: u16 = 42000;

const FIRST_PEER_PORT: u16 = 43000;

fn local(port: u16) -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, port))
}

/// A running manager plus registered peers.
pub struct Cluster {
    network: ChannelNetwork,
    registry: Arc<Mutex<Registry>>,
    datasets: Arc<dyn DatasetSource>,
    peers: Vec<Arc<PeerNode>>,
}

impl Cluster {
    /// Start a manager serving `dataset` to peers added later.
    pub async fn start(dataset: Dataset, seed: u64) -> io::Result<Self> {
        let network = ChannelNetwork::new();
        let transport = network.bind(local(MANAGER_PORT)).await?;
        let manager = Manager::new(Registry::with_seed(seed), Arc::new(transport));
        let registry = manager.registry();
        tokio::spawn(async move {
            if let Err(e) = manager.run().await {
                tracing::warn!(error = %e, "Manager stopped");
            }
        });

        Ok(Self {
            network,
            registry,
            datasets: Arc::new(MemoryDatasets::new().with(dataset)),
            peers: Vec::new(),
        })
    }

    /// Start a peer named `name` and serve its data socket. Not registered.
    pub async fn spawn_peer(&mut self, name: &str) -> io::Result<Arc<PeerNode>> {
        let base = FIRST_PEER_PORT + 2 * self.peers.len() as u16;
        let control = self.network.bind(local(base)).await?;
        let data = self.network.bind(local(base + 1)).await?;

        let client = ControlClient::new(Arc::new(control), local(MANAGER_PORT))?;
        let me = PeerTuple::new(name, Ipv4Addr::LOCALHOST, base + 1);
        let seed = u64::from(base);
        let node = Arc::new(PeerNode::seeded(
            me,
            client,
            Arc::new(data),
            Arc::clone(&self.datasets),
            seed,
        ));

        let runner = Arc::clone(&node);
        tokio::spawn(async move {
            if let Err(e) = runner.run().await {
                tracing::warn!(error = %e, "Peer stopped");
            }
        });
        self.peers.push(Arc::clone(&node));
        Ok(node)
    }

    /// Start and register one peer per name.
    pub async fn register_all(&mut self, names: &[&str]) -> ringstore_peer::Result<()> {
        for name in names {
            self.spawn_peer(name).await?.register().await?;
        }
        Ok(())
    }

    /// Peer by name.
    pub fn peer(&self, name: &str) -> Option<Arc<PeerNode>> {
        self.peers.iter().find(|p| p.name() == name).cloned()
    }

    /// Every peer started so far.
    pub fn peers(&self) -> &[Arc<PeerNode>] {
        &self.peers
    }

    /// The manager's registry.
    pub fn registry(&self) -> Arc<Mutex<Registry>> {
        Arc::clone(&self.registry)
    }

    /// Local tables of every peer, in start order.
    pub async fn tables(&self) -> Vec<LocalTable> {
        let mut tables = Vec::with_capacity(self.peers.len());
        for peer in &self.peers {
            tables.push(peer.table().await);
        }
        tables
    }
}
