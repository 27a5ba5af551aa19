//! Peer runtime.
//!
//! A [`PeerNode`] owns the peer's two sockets. The data socket is served by
//! [`PeerNode::run`], which spawns one task per datagram; each task applies
//! its message to the [`RingNode`] under the ring lock and performs the
//! resulting effects before releasing it, so sends on every link leave in
//! the order the state machine produced them.
//!
//! Commands (`setup_dht`, `query`, `leave`, `join`, `teardown`) talk to the
//! manager over the control socket and then wait on a oneshot channel for
//! the ring event that ends their part of the protocol.

use std::net::SocketAddr;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use ringstore_dht::{DatasetSource, LocalTable, Membership, PeerTuple, RecordKey, RingId};
use ringstore_protocols::{
    ControlRequest, Effect, FindOutcome, PeerMessage, RecordCount, RingEvent, RingNode,
};
use ringstore_transfer::{Transport, MAX_DATAGRAM};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info, warn};

use crate::client::ControlClient;
use crate::error::{Error, Result};

/// Pending waits for ring events, one slot per kind.
#[derive(Default)]
struct Waiters {
    assigned: Option<oneshot::Sender<()>>,
    census: Option<oneshot::Sender<Vec<RecordCount>>>,
    teardown: Option<oneshot::Sender<()>>,
    change: Option<oneshot::Sender<String>>,
    find: Option<oneshot::Sender<FindOutcome>>,
}

fn notify<T>(slot: &mut Option<oneshot::Sender<T>>, value: T) -> bool {
    slot.take().is_some_and(|tx| tx.send(value).is_ok())
}

impl Waiters {
    fn deliver(&mut self, event: RingEvent) {
        let kind = match &event {
            RingEvent::RingAssigned => "ring assigned",
            RingEvent::ConfigurationCollected(_) => "configuration collected",
            RingEvent::TeardownReturned => "teardown returned",
            RingEvent::ChangeConfirmed { .. } => "change confirmed",
            RingEvent::FindAnswered(_) => "find answered",
        };
        let claimed = match event {
            RingEvent::RingAssigned => notify(&mut self.assigned, ()),
            RingEvent::ConfigurationCollected(counts) => notify(&mut self.census, counts),
            RingEvent::TeardownReturned => notify(&mut self.teardown, ()),
            RingEvent::ChangeConfirmed { leader } => notify(&mut self.change, leader),
            RingEvent::FindAnswered(outcome) => notify(&mut self.find, outcome),
        };
        if !claimed {
            debug!(event = kind, "No local waiter for ring event");
        }
    }
}

struct Shared {
    ring: RingNode,
    rng: StdRng,
    waiters: Waiters,
}

/// Snapshot of a peer's ring position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerStatus {
    /// Peer name.
    pub name: String,
    /// Ring id, if in a ring.
    pub id: Option<RingId>,
    /// Ring size (0 outside a ring).
    pub ring_size: usize,
    /// Records in the local table.
    pub records: usize,
    /// Name of ring id 0, if in a ring.
    pub leader: Option<String>,
}

impl std::fmt::Display for PeerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.id, &self.leader) {
            (Some(id), Some(leader)) => write!(
                f,
                "{}: id {} of {}, leader {}, {} records",
                self.name, id, self.ring_size, leader, self.records
            ),
            _ => write!(f, "{}: not in a ring", self.name),
        }
    }
}

/// One ring peer: ring state, data socket and manager client.
pub struct PeerNode {
    me: PeerTuple,
    shared: Arc<Mutex<Shared>>,
    data: Arc<dyn Transport>,
    control: ControlClient,
    datasets: Arc<dyn DatasetSource>,
}

impl PeerNode {
    /// Create a peer named by `me`, reachable on `data`.
    pub fn new(
        me: PeerTuple,
        control: ControlClient,
        data: Arc<dyn Transport>,
        datasets: Arc<dyn DatasetSource>,
    ) -> Self {
        Self::with_rng(me, control, data, datasets, StdRng::from_entropy())
    }

    /// Like [`PeerNode::new`], with the lookup walk's random choices seeded.
    pub fn seeded(
        me: PeerTuple,
        control: ControlClient,
        data: Arc<dyn Transport>,
        datasets: Arc<dyn DatasetSource>,
        seed: u64,
    ) -> Self {
        Self::with_rng(me, control, data, datasets, StdRng::seed_from_u64(seed))
    }

    fn with_rng(
        me: PeerTuple,
        control: ControlClient,
        data: Arc<dyn Transport>,
        datasets: Arc<dyn DatasetSource>,
        rng: StdRng,
    ) -> Self {
        let ring = RingNode::new(me.clone(), Arc::clone(&datasets));
        Self {
            me,
            shared: Arc::new(Mutex::new(Shared {
                ring,
                rng,
                waiters: Waiters::default(),
            })),
            data,
            control,
            datasets,
        }
    }

    /// This peer's data channel tuple.
    pub fn me(&self) -> &PeerTuple {
        &self.me
    }

    /// Registered name.
    pub fn name(&self) -> &str {
        &self.me.name
    }

    /// Serve the data socket until it fails.
    pub async fn run(&self) -> Result<()> {
        info!(peer = %self.me.name, "Data channel listening on {}", self.data.local_addr()?);

        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            let (len, from) = self.data.recv_from(&mut buf).await?;
            let line = String::from_utf8_lossy(&buf[..len]).into_owned();

            let shared = Arc::clone(&self.shared);
            let data = Arc::clone(&self.data);
            tokio::spawn(async move {
                handle_datagram(shared, data, from, line).await;
            });
        }
    }

    /// Apply `op` to the ring under the lock and perform its effects.
    async fn start<F>(&self, op: F) -> Result<()>
    where
        F: FnOnce(&mut RingNode, &mut Waiters) -> ringstore_protocols::Result<Vec<Effect>>,
    {
        let mut guard = self.shared.lock().await;
        let shared = &mut *guard;
        let effects = op(&mut shared.ring, &mut shared.waiters)?;
        perform(self.data.as_ref(), &mut shared.waiters, effects).await;
        Ok(())
    }

    async fn wait<T>(rx: oneshot::Receiver<T>) -> Result<T> {
        rx.await.map_err(|_| Error::Interrupted)
    }

    /// `register`: announce this peer's addresses to the manager.
    pub async fn register(&self) -> Result<()> {
        self.control
            .expect_success(&ControlRequest::Register {
                name: self.me.name.clone(),
                addr: self.me.addr,
                control_port: self.control.local_addr().port(),
                data_port: self.me.port,
            })
            .await?;
        info!(peer = %self.me.name, "Registered with manager");
        Ok(())
    }

    /// `deregister`: leave the manager's directory.
    pub async fn deregister(&self) -> Result<()> {
        self.control
            .expect_success(&ControlRequest::Deregister {
                name: self.me.name.clone(),
            })
            .await?;
        info!(peer = %self.me.name, "Deregistered");
        Ok(())
    }

    /// `setup-dht`: build a ring of `size` peers led by this one over the
    /// dataset `dataset`, seed it and report completion.
    ///
    /// Returns the census taken after seeding.
    pub async fn setup_dht(&self, size: usize, dataset: &str) -> Result<Vec<RecordCount>> {
        // Fail before the manager enters Building.
        self.datasets.load(dataset)?;

        let members = self
            .control
            .expect_members(&ControlRequest::SetupDht {
                name: self.me.name.clone(),
                size,
                dataset: dataset.to_string(),
            })
            .await?;
        info!(ring_size = members.len(), dataset, "Manager selected ring");

        let (assigned_tx, assigned) = oneshot::channel();
        self.start(|ring, waiters| {
            let effects = ring.begin_build(members, dataset)?;
            waiters.assigned = Some(assigned_tx);
            Ok(effects)
        })
        .await?;
        Self::wait(assigned).await?;
        info!("Every ring member has its id");

        let (census_tx, census) = oneshot::channel();
        self.start(|ring, waiters| {
            let mut effects = ring.seed()?;
            effects.extend(ring.start_census()?);
            waiters.census = Some(census_tx);
            Ok(effects)
        })
        .await?;
        let counts = Self::wait(census).await?;

        self.control
            .expect_success(&ControlRequest::DhtComplete {
                name: self.me.name.clone(),
            })
            .await?;
        info!("DHT complete");
        Ok(counts)
    }

    /// `query-dht` + `find-event`: look up `key` through the entry point
    /// the manager picks.
    pub async fn query(&self, key: RecordKey) -> Result<FindOutcome> {
        let entry = self
            .control
            .expect_peer(&ControlRequest::QueryDht {
                name: self.me.name.clone(),
            })
            .await?;
        debug!(key, entry = %entry, "Querying ring");

        let (tx, rx) = oneshot::channel();
        self.start(|ring, waiters| {
            waiters.find = Some(tx);
            Ok(ring.find(key, &entry))
        })
        .await?;
        let outcome = Self::wait(rx).await?;
        info!(
            key,
            found = matches!(outcome, FindOutcome::Found { .. }),
            visited = ?outcome.visited(),
            "Lookup finished"
        );
        Ok(outcome)
    }

    /// `leave-dht`: tear this peer out of the ring, renumber the survivors
    /// and hand leadership to the old right neighbor.
    ///
    /// Returns the leader reported to the manager.
    pub async fn leave(&self) -> Result<String> {
        self.control
            .expect_success(&ControlRequest::LeaveDht {
                name: self.me.name.clone(),
            })
            .await?;

        let (tx, rx) = oneshot::channel();
        self.start(|ring, waiters| {
            let effects = ring.start_leave()?;
            waiters.change = Some(tx);
            Ok(effects)
        })
        .await?;
        let leader = Self::wait(rx).await?;

        self.rebuilt(&leader).await?;
        info!(new_leader = %leader, "Left the ring");
        Ok(leader)
    }

    /// `join-dht`: ask the current leader to rebuild the ring with this
    /// peer appended.
    ///
    /// Returns the leader reported to the manager.
    pub async fn join(&self) -> Result<String> {
        let leader = self
            .control
            .expect_peer(&ControlRequest::JoinDht {
                name: self.me.name.clone(),
            })
            .await?;

        let (tx, rx) = oneshot::channel();
        self.start(|ring, waiters| {
            let effects = ring.begin_join(&leader)?;
            waiters.change = Some(tx);
            Ok(effects)
        })
        .await?;
        let leader = Self::wait(rx).await?;

        self.rebuilt(&leader).await?;
        info!(leader = %leader, "Joined the ring");
        Ok(leader)
    }

    async fn rebuilt(&self, leader: &str) -> Result<()> {
        self.control
            .expect_success(&ControlRequest::DhtRebuilt {
                name: self.me.name.clone(),
                new_leader: leader.to_string(),
            })
            .await
    }

    /// `teardown-dht`: erase every table and dissolve the ring.
    pub async fn teardown(&self) -> Result<()> {
        self.control
            .expect_success(&ControlRequest::TeardownDht {
                name: self.me.name.clone(),
            })
            .await?;

        let (tx, rx) = oneshot::channel();
        self.start(|ring, waiters| {
            let effects = ring.start_teardown(true)?;
            waiters.teardown = Some(tx);
            Ok(effects)
        })
        .await?;
        Self::wait(rx).await?;

        self.control
            .expect_success(&ControlRequest::TeardownComplete {
                name: self.me.name.clone(),
            })
            .await?;
        info!("DHT torn down");
        Ok(())
    }

    /// Current ring position.
    pub async fn status(&self) -> PeerStatus {
        let shared = self.shared.lock().await;
        let ring = &shared.ring;
        PeerStatus {
            name: self.me.name.clone(),
            id: ring.id(),
            ring_size: ring.ring_size(),
            records: ring.table().len(),
            leader: ring
                .ring()
                .and_then(|r| r.members.leader())
                .map(|p| p.name.clone()),
        }
    }

    /// Copy of the local table.
    pub async fn table(&self) -> LocalTable {
        self.shared.lock().await.ring.table().clone()
    }

    /// Current ring membership, if in a ring.
    pub async fn members(&self) -> Option<Membership> {
        self.shared
            .lock()
            .await
            .ring
            .ring()
            .map(|r| r.members.clone())
    }
}

async fn handle_datagram(
    shared: Arc<Mutex<Shared>>,
    data: Arc<dyn Transport>,
    from: SocketAddr,
    line: String,
) {
    let message = match PeerMessage::decode(&line) {
        Ok(message) => message,
        Err(e) => {
            warn!(%from, error = %e, "Dropping malformed datagram");
            return;
        }
    };
    debug!(%from, command = message.command(), "Received");

    let mut guard = shared.lock().await;
    let shared = &mut *guard;
    match shared.ring.handle(from, message, &mut shared.rng) {
        Ok(effects) => perform(data.as_ref(), &mut shared.waiters, effects).await,
        Err(e) => warn!(%from, error = %e, "Rejected ring message"),
    }
}

async fn perform(data: &dyn Transport, waiters: &mut Waiters, effects: Vec<Effect>) {
    for effect in effects {
        match effect {
            Effect::Send { to, message } => {
                if let Err(e) = data.send_to(message.encode().as_bytes(), to).await {
                    warn!(%to, command = message.command(), error = %e, "Send failed");
                }
            }
            Effect::Event(event) => waiters.deliver(event),
        }
    }
}
