//! Ring membership.
//!
//! The registry hands the leader an ordered member list at build time; the
//! ring builder then replicates it into every peer. Index in the list is the
//! ring id, and the list is rewritten in place when a peer leaves or joins.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use serde::{Deserialize, Serialize};

use crate::Partition;

/// Ordinal position of a peer in the ring. The leader is 0.
pub type RingId = usize;

/// How peers reach each other on the data channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerTuple {
    /// Registered peer name.
    pub name: String,
    /// IPv4 address.
    pub addr: Ipv4Addr,
    /// Data (peer-to-peer) port.
    pub port: u16,
}

impl PeerTuple {
    /// Create a tuple.
    pub fn new(name: impl Into<String>, addr: Ipv4Addr, port: u16) -> Self {
        Self {
            name: name.into(),
            addr,
            port,
        }
    }

    /// Data channel socket address.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(self.addr), self.port)
    }

    /// Whether a datagram source address belongs to this peer.
    pub fn matches(&self, addr: SocketAddr) -> bool {
        addr == self.socket_addr()
    }

    /// Compact JSON form used on the wire.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Parse the wire form.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl std::fmt::Display for PeerTuple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.name, self.addr, self.port)
    }
}

/// Ordered ring members; index is ring id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Membership(Vec<PeerTuple>);

impl Membership {
    /// Create from an ordered member list (leader first).
    pub fn new(members: Vec<PeerTuple>) -> Self {
        Self(members)
    }

    /// Ring size.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Member at a ring id.
    pub fn get(&self, id: RingId) -> Option<&PeerTuple> {
        self.0.get(id)
    }

    /// The leader (id 0).
    pub fn leader(&self) -> Option<&PeerTuple> {
        self.0.first()
    }

    /// Clockwise neighbor of `id`.
    pub fn right_of(&self, id: RingId) -> Option<&PeerTuple> {
        if self.0.is_empty() {
            return None;
        }
        self.0.get((id + 1) % self.0.len())
    }

    /// Ring id of the member reachable at `addr`.
    pub fn position_of(&self, addr: SocketAddr) -> Option<RingId> {
        self.0.iter().position(|p| p.matches(addr))
    }

    /// Ring id of the member called `name`.
    pub fn position_of_name(&self, name: &str) -> Option<RingId> {
        self.0.iter().position(|p| p.name == name)
    }

    /// Append a member at the end of the ring.
    pub fn push(&mut self, peer: PeerTuple) {
        self.0.push(peer);
    }

    /// Iterate in ring order.
    pub fn iter(&self) -> impl Iterator<Item = &PeerTuple> {
        self.0.iter()
    }

    /// The ring after `leaving` is removed, renumbered so that the leaver's
    /// right neighbor becomes id 0 and the rest keep their clockwise order.
    pub fn renumbered_without(&self, leaving: RingId) -> Self {
        let n = self.0.len();
        if leaving >= n {
            return self.clone();
        }
        Self((1..n).map(|i| self.0[(leaving + i) % n].clone()).collect())
    }

    /// Compact JSON form used on the wire.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "[]".to_string())
    }

    /// Parse the wire form.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl FromIterator<PeerTuple> for Membership {
    fn from_iter<I: IntoIterator<Item = PeerTuple>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Everything the ring builder replicates into each member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingConfig {
    /// Ordered members.
    pub members: Membership,
    /// Dataset key the ring was built from.
    pub dataset: String,
    /// Partition computed by the leader from the full dataset.
    pub partition: Partition,
}

impl RingConfig {
    /// Create a ring config.
    pub fn new(members: Membership, dataset: impl Into<String>, partition: Partition) -> Self {
        Self {
            members,
            dataset: dataset.into(),
            partition,
        }
    }

    /// Compact JSON form used on the wire.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Parse the wire form.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
