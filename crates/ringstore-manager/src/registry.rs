//! Peer directory and the global lifecycle state machine.
//!
//! The [`Registry`] owns every registered [`PeerRecord`], the single
//! [`Phase`] the deployment is in and the pending membership change. While
//! a cluster-wide phase is active, only the request that ends it is
//! accepted; everything else fails with [`RegistryError::PhaseBusy`] and
//! leaves the directory untouched.

use std::net::Ipv4Addr;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use ringstore_dht::{Membership, PeerTuple, MAX_NAME_LEN, MIN_RING_SIZE};
use ringstore_protocols::{ControlRequest, ControlResponse};
use thiserror::Error;
use tracing::{debug, info};

/// Lifecycle state of one registered peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Free,
    InDht,
    Leader,
}

impl std::fmt::Display for PeerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Free => "Free",
            Self::InDht => "InDHT",
            Self::Leader => "Leader",
        })
    }
}

/// A registered peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRecord {
    pub name: String,
    pub addr: Ipv4Addr,
    pub control_port: u16,
    pub data_port: u16,
    pub state: PeerState,
}

impl PeerRecord {
    /// Data channel tuple.
    pub fn tuple(&self) -> PeerTuple {
        PeerTuple::new(self.name.clone(), self.addr, self.data_port)
    }

    fn uses_port(&self, port: u16) -> bool {
        self.control_port == port || self.data_port == port
    }
}

/// The cluster-wide lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Building,
    TearingDown,
    Rebuilding,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Idle => "Idle",
            Self::Building => "Building",
            Self::TearingDown => "TearingDown",
            Self::Rebuilding => "Rebuilding",
        })
    }
}

/// Direction of a pending membership change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Leave,
    Join,
}

/// The one outstanding leave or join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingChange {
    pub name: String,
    pub kind: ChangeKind,
}

/// Why a control request was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("peer name should be at most 15 characters")]
    NameTooLong,

    #[error("peer name is already registered")]
    NameConflict,

    #[error("control or data port is already registered")]
    PortConflict,

    #[error("peer name is not registered")]
    UnknownPeer,

    #[error("peer is not free")]
    NotFree,

    #[error("peer is not in the DHT")]
    NotInRing,

    #[error("peer is not the leader")]
    NotLeader,

    #[error("size n should be at least 3")]
    SizeTooSmall,

    #[error("not enough free peers for a DHT of this size")]
    InsufficientPeers,

    #[error("DHT already exists")]
    DhtAlreadyExists,

    #[error("DHT does not exist")]
    DhtDoesNotExist,

    #[error("{0} in progress")]
    PhaseBusy(Phase),

    #[error("peer is not the leaving or joining peer")]
    ChangeMismatch,
}

/// Result of a registry operation.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Authoritative peer directory plus lifecycle phase.
pub struct Registry {
    peers: Vec<PeerRecord>,
    phase: Phase,
    dht_exists: bool,
    pending: Option<PendingChange>,
    rng: StdRng,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Empty registry with an entropy-seeded random source.
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Empty registry with a reproducible random source.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            peers: Vec::new(),
            phase: Phase::Idle,
            dht_exists: false,
            pending: None,
            rng,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Whether a built DHT exists.
    pub fn dht_exists(&self) -> bool {
        self.dht_exists
    }

    /// Pending leave or join.
    pub fn pending(&self) -> Option<&PendingChange> {
        self.pending.as_ref()
    }

    /// Registered peers in registration order.
    pub fn peers(&self) -> &[PeerRecord] {
        &self.peers
    }

    /// Look up a peer by name.
    pub fn peer(&self, name: &str) -> Option<&PeerRecord> {
        self.peers.iter().find(|p| p.name == name)
    }

    fn peer_mut(&mut self, name: &str) -> Result<&mut PeerRecord> {
        self.peers
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or(RegistryError::UnknownPeer)
    }

    fn state_of(&self, name: &str) -> Result<PeerState> {
        self.peer(name)
            .map(|p| p.state)
            .ok_or(RegistryError::UnknownPeer)
    }

    /// Reject unless idle or in the phase `ends` would close.
    fn admit(&self, ends: Option<Phase>) -> Result<()> {
        match self.phase {
            Phase::Idle => Ok(()),
            active if Some(active) == ends => Ok(()),
            active => Err(RegistryError::PhaseBusy(active)),
        }
    }

    fn set_phase(&mut self, phase: Phase) {
        if self.phase != phase {
            info!(from = %self.phase, to = %phase, "Phase transition");
            self.phase = phase;
        }
    }

    /// `register <name> <ipv4> <controlPort> <dataPort>`
    pub fn register(
        &mut self,
        name: &str,
        addr: Ipv4Addr,
        control_port: u16,
        data_port: u16,
    ) -> Result<()> {
        self.admit(None)?;
        if name.chars().count() > MAX_NAME_LEN {
            return Err(RegistryError::NameTooLong);
        }
        if self.peer(name).is_some() {
            return Err(RegistryError::NameConflict);
        }
        if self
            .peers
            .iter()
            .any(|p| p.uses_port(control_port) || p.uses_port(data_port))
        {
            return Err(RegistryError::PortConflict);
        }

        self.peers.push(PeerRecord {
            name: name.to_string(),
            addr,
            control_port,
            data_port,
            state: PeerState::Free,
        });
        info!(peer = name, %addr, control_port, data_port, "Registered");
        Ok(())
    }

    /// `deregister <name>`
    pub fn deregister(&mut self, name: &str) -> Result<()> {
        self.admit(None)?;
        match self.state_of(name)? {
            PeerState::Free => {}
            PeerState::InDht | PeerState::Leader => return Err(RegistryError::NotFree),
        }
        self.peers.retain(|p| p.name != name);
        info!(peer = name, "Deregistered");
        Ok(())
    }

    /// `setup-dht <name> <n> <datasetKey>`: pick the ring, leader first.
    pub fn setup_dht(&mut self, name: &str, size: usize, dataset: &str) -> Result<Membership> {
        self.admit(None)?;
        let leader_state = self.state_of(name)?;
        if size < MIN_RING_SIZE {
            return Err(RegistryError::SizeTooSmall);
        }
        if self.peers.len() < size {
            return Err(RegistryError::InsufficientPeers);
        }
        if self.dht_exists {
            return Err(RegistryError::DhtAlreadyExists);
        }
        if leader_state != PeerState::Free {
            return Err(RegistryError::NotFree);
        }

        let mut free: Vec<usize> = self
            .peers
            .iter()
            .enumerate()
            .filter(|(_, p)| p.state == PeerState::Free && p.name != name)
            .map(|(i, _)| i)
            .collect();
        if free.len() < size - 1 {
            return Err(RegistryError::InsufficientPeers);
        }
        free.shuffle(&mut self.rng);
        free.truncate(size - 1);

        let leader = self.peer_mut(name)?;
        leader.state = PeerState::Leader;
        let mut members = vec![leader.tuple()];
        for i in free {
            let peer = &mut self.peers[i];
            peer.state = PeerState::InDht;
            members.push(peer.tuple());
        }

        info!(leader = name, size, dataset, "DHT setup started");
        self.set_phase(Phase::Building);
        Ok(Membership::new(members))
    }

    /// `dht-complete <name>`
    pub fn dht_complete(&mut self, name: &str) -> Result<()> {
        self.admit(Some(Phase::Building))?;
        if self.peer(name).map(|p| p.state) != Some(PeerState::Leader) {
            return Err(RegistryError::NotLeader);
        }
        self.dht_exists = true;
        self.set_phase(Phase::Idle);
        info!(leader = name, "DHT complete");
        Ok(())
    }

    /// `query-dht <name>`: a random ring member to enter through.
    pub fn query_dht(&mut self, name: &str) -> Result<PeerTuple> {
        self.admit(None)?;
        if !self.dht_exists {
            return Err(RegistryError::DhtDoesNotExist);
        }
        if self.state_of(name)? != PeerState::Free {
            return Err(RegistryError::NotFree);
        }

        let in_ring: Vec<&PeerRecord> = self
            .peers
            .iter()
            .filter(|p| p.state == PeerState::InDht)
            .collect();
        // A ring shrunk to its leader alone has no other entry point.
        let entry = match in_ring.choose(&mut self.rng) {
            Some(peer) => peer.tuple(),
            None => self
                .leader()
                .map(PeerRecord::tuple)
                .ok_or(RegistryError::DhtDoesNotExist)?,
        };
        debug!(peer = name, entry = %entry, "Query entry point");
        Ok(entry)
    }

    /// The current leader, if any.
    pub fn leader(&self) -> Option<&PeerRecord> {
        self.peers.iter().find(|p| p.state == PeerState::Leader)
    }

    /// `leave-dht <name>`
    pub fn leave_dht(&mut self, name: &str) -> Result<()> {
        self.admit(None)?;
        if !self.dht_exists {
            return Err(RegistryError::DhtDoesNotExist);
        }
        if self.state_of(name)? != PeerState::InDht {
            return Err(RegistryError::NotInRing);
        }
        self.begin_change(name, ChangeKind::Leave);
        Ok(())
    }

    /// `join-dht <name>`: returns the leader the joiner must contact.
    pub fn join_dht(&mut self, name: &str) -> Result<PeerTuple> {
        self.admit(None)?;
        if self.state_of(name)? != PeerState::Free {
            return Err(RegistryError::NotFree);
        }
        if !self.dht_exists {
            return Err(RegistryError::DhtDoesNotExist);
        }
        let leader = self
            .leader()
            .map(PeerRecord::tuple)
            .ok_or(RegistryError::DhtDoesNotExist)?;
        self.begin_change(name, ChangeKind::Join);
        Ok(leader)
    }

    fn begin_change(&mut self, name: &str, kind: ChangeKind) {
        info!(peer = name, ?kind, "Membership change started");
        self.pending = Some(PendingChange {
            name: name.to_string(),
            kind,
        });
        self.set_phase(Phase::Rebuilding);
    }

    /// `dht-rebuilt <name> <newLeaderName>`
    pub fn dht_rebuilt(&mut self, name: &str, new_leader: &str) -> Result<()> {
        self.admit(Some(Phase::Rebuilding))?;
        let kind = match &self.pending {
            Some(pending) if pending.name == name => pending.kind,
            _ => return Err(RegistryError::ChangeMismatch),
        };
        if self.state_of(new_leader)? != PeerState::Leader {
            if let Some(old) = self.peers.iter_mut().find(|p| p.state == PeerState::Leader) {
                old.state = PeerState::InDht;
            }
            self.peer_mut(new_leader)?.state = PeerState::Leader;
            info!(leader = new_leader, "Leader changed");
        }
        self.peer_mut(name)?.state = match kind {
            ChangeKind::Leave => PeerState::Free,
            ChangeKind::Join => PeerState::InDht,
        };

        self.pending = None;
        self.set_phase(Phase::Idle);
        info!(peer = name, ?kind, "DHT rebuilt");
        Ok(())
    }

    /// `teardown-dht <name>`
    pub fn teardown_dht(&mut self, name: &str) -> Result<()> {
        self.admit(None)?;
        if self.state_of(name)? != PeerState::Leader {
            return Err(RegistryError::NotLeader);
        }
        self.set_phase(Phase::TearingDown);
        Ok(())
    }

    /// `teardown-complete <name>`
    pub fn teardown_complete(&mut self, name: &str) -> Result<()> {
        self.admit(Some(Phase::TearingDown))?;
        if self.state_of(name)? != PeerState::Leader {
            return Err(RegistryError::NotLeader);
        }
        for peer in &mut self.peers {
            peer.state = PeerState::Free;
        }
        self.dht_exists = false;
        self.set_phase(Phase::Idle);
        info!(leader = name, "DHT torn down");
        Ok(())
    }

    /// Dispatch one decoded control request.
    pub fn apply(&mut self, request: &ControlRequest) -> ControlResponse {
        let result = match request {
            ControlRequest::Register {
                name,
                addr,
                control_port,
                data_port,
            } => self
                .register(name, *addr, *control_port, *data_port)
                .map(|_| ControlResponse::Success),
            ControlRequest::SetupDht {
                name,
                size,
                dataset,
            } => self
                .setup_dht(name, *size, dataset)
                .map(ControlResponse::Members),
            ControlRequest::DhtComplete { name } => {
                self.dht_complete(name).map(|_| ControlResponse::Success)
            }
            ControlRequest::QueryDht { name } => self.query_dht(name).map(ControlResponse::Peer),
            ControlRequest::LeaveDht { name } => {
                self.leave_dht(name).map(|_| ControlResponse::Success)
            }
            ControlRequest::JoinDht { name } => self.join_dht(name).map(ControlResponse::Peer),
            ControlRequest::DhtRebuilt { name, new_leader } => self
                .dht_rebuilt(name, new_leader)
                .map(|_| ControlResponse::Success),
            ControlRequest::Deregister { name } => {
                self.deregister(name).map(|_| ControlResponse::Success)
            }
            ControlRequest::TeardownDht { name } => {
                self.teardown_dht(name).map(|_| ControlResponse::Success)
            }
            ControlRequest::TeardownComplete { name } => self
                .teardown_complete(name)
                .map(|_| ControlResponse::Success),
        };

        result.unwrap_or_else(|e| {
            debug!(request = request.command(), peer = request.name(), error = %e, "Rejected");
            ControlResponse::Failure(e.to_string())
        })
    }
}
