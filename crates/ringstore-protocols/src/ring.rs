//! Ring node state machine.
//!
//! A [`RingNode`] holds one peer's view of the ring: its id, the replicated
//! [`RingConfig`], its [`LocalTable`] and the flags that mark it as the
//! origin of a circulating token. Every inbound datagram is one transition:
//! `handle` mutates the node and returns the [`Effect`]s the runtime must
//! perform (datagrams to send, events to report), in order.
//!
//! Tokens that travel around the ring (`set_id`, `teardown`, `reset-id`,
//! `print_configuration`) terminate when they reach the peer that started
//! them. No hop counters, no acknowledgements.

use std::net::SocketAddr;
use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::Rng;
use ringstore_dht::{
    DatasetSource, LocalTable, Membership, Partition, PeerTuple, RecordKey, RingConfig, RingId,
};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::message::{FindOutcome, PeerMessage, RecordCount};

/// Membership change this peer is in the middle of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// Leaving the ring.
    Leaving,
    /// Joining the ring.
    Joining,
}

/// Something the runtime must do after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Send a datagram on the data channel.
    Send { to: SocketAddr, message: PeerMessage },
    /// Report a local event to whoever is waiting on it.
    Event(RingEvent),
}

/// Local completion signals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RingEvent {
    /// The `set_id` token came back to the leader.
    RingAssigned,
    /// The census token came back to its originator.
    ConfigurationCollected(Vec<RecordCount>),
    /// A full teardown came back to the leader; the ring is gone.
    TeardownReturned,
    /// A leave or join finished; carries the leader name to report.
    ChangeConfirmed { leader: String },
    /// Answer to a lookup this peer issued.
    FindAnswered(FindOutcome),
}

/// One peer's ring state.
pub struct RingNode {
    me: PeerTuple,
    id: Option<RingId>,
    ring: Option<RingConfig>,
    table: LocalTable,
    datasets: Arc<dyn DatasetSource>,
    teardown_pending: bool,
    census_pending: bool,
    change: Option<Change>,
    pending_join: Option<PeerTuple>,
}

fn send(to: &PeerTuple, message: PeerMessage) -> Effect {
    Effect::Send {
        to: to.socket_addr(),
        message,
    }
}

impl RingNode {
    /// Create a node that is not part of any ring yet.
    pub fn new(me: PeerTuple, datasets: Arc<dyn DatasetSource>) -> Self {
        Self {
            me,
            id: None,
            ring: None,
            table: LocalTable::new(),
            datasets,
            teardown_pending: false,
            census_pending: false,
            change: None,
            pending_join: None,
        }
    }

    /// This peer's tuple.
    pub fn me(&self) -> &PeerTuple {
        &self.me
    }

    /// Assigned ring id, if in a ring.
    pub fn id(&self) -> Option<RingId> {
        self.id
    }

    /// Replicated ring config, if in a ring.
    pub fn ring(&self) -> Option<&RingConfig> {
        self.ring.as_ref()
    }

    /// Current ring size (0 outside a ring).
    pub fn ring_size(&self) -> usize {
        self.ring.as_ref().map_or(0, |r| r.members.len())
    }

    /// Whether this peer holds id 0.
    pub fn is_leader(&self) -> bool {
        self.id == Some(0)
    }

    /// Local table.
    pub fn table(&self) -> &LocalTable {
        &self.table
    }

    /// Membership change in progress.
    pub fn change(&self) -> Option<Change> {
        self.change
    }

    fn state_name(&self) -> String {
        match (self.id, self.change) {
            (None, None) => "outside ring".to_string(),
            (None, Some(change)) => format!("outside ring ({:?})", change),
            (Some(id), None) => format!("id {}", id),
            (Some(id), Some(change)) => format!("id {} ({:?})", id, change),
        }
    }

    fn position(&self) -> Result<(RingId, &RingConfig)> {
        match (self.id, self.ring.as_ref()) {
            (Some(id), Some(ring)) => Ok((id, ring)),
            _ => Err(Error::InvalidState {
                expected: "ring member",
                actual: self.state_name(),
            }),
        }
    }

    fn right(&self) -> Result<&PeerTuple> {
        let (id, ring) = self.position()?;
        ring.members.right_of(id).ok_or(Error::InvalidState {
            expected: "non-empty ring",
            actual: self.state_name(),
        })
    }

    fn leave_ring(&mut self) {
        self.id = None;
        self.ring = None;
        self.table.clear();
        self.teardown_pending = false;
        self.census_pending = false;
        self.change = None;
        self.pending_join = None;
    }

    /// Start identity assignment as the leader of `members`.
    ///
    /// Loads the dataset once to fix the shared partition modulus, then
    /// sends the first `set_id` to id 1.
    pub fn begin_build(&mut self, members: Membership, dataset_key: &str) -> Result<Vec<Effect>> {
        if members.leader() != Some(&self.me) {
            return Err(Error::InvalidState {
                expected: "leader at position 0",
                actual: members
                    .leader()
                    .map_or_else(|| "empty membership".to_string(), |p| p.to_string()),
            });
        }

        let dataset = self.datasets.load(dataset_key)?;
        let partition = Partition::for_dataset_size(dataset.len());
        let ring_size = members.len();
        info!(
            dataset = dataset_key,
            records = dataset.len(),
            modulus = partition.modulus(),
            ring_size,
            "Building ring"
        );

        self.id = Some(0);
        self.table.clear();
        self.ring = Some(RingConfig::new(members, dataset_key, partition));
        self.assign_from_leader()
    }

    fn assign_from_leader(&self) -> Result<Vec<Effect>> {
        let (_, ring) = self.position()?;
        let ring_size = ring.members.len();
        if ring_size == 1 {
            return Ok(vec![Effect::Event(RingEvent::RingAssigned)]);
        }
        let message = PeerMessage::SetId {
            id: 1,
            ring_size,
            ring: ring.clone(),
        };
        Ok(vec![send(self.right()?, message)])
    }

    /// Place every record of the ring's dataset: keep what this peer owns,
    /// relay the rest to the right neighbor.
    pub fn seed(&mut self) -> Result<Vec<Effect>> {
        let (id, ring) = self.position()?;
        let ring_size = ring.members.len();
        let partition = ring.partition;
        let dataset = self.datasets.load(&ring.dataset)?;
        let right = self.right()?.clone();

        let mut effects = Vec::new();
        let mut kept = 0usize;
        for (key, record) in dataset.iter() {
            let placement = partition.place(*key, ring_size);
            if placement.owner == id {
                self.table.insert(placement.slot, record.clone());
                kept += 1;
            } else {
                effects.push(send(
                    &right,
                    PeerMessage::Store {
                        slot: placement.slot,
                        record: record.clone(),
                    },
                ));
            }
        }

        info!(
            records = dataset.len(),
            kept,
            relayed = effects.len(),
            "Seeded ring"
        );
        Ok(effects)
    }

    /// Start a configuration census from this peer.
    pub fn start_census(&mut self) -> Result<Vec<Effect>> {
        let counts = vec![self.own_count()];
        if self.ring_size() == 1 {
            self.log_census(&counts);
            return Ok(vec![Effect::Event(RingEvent::ConfigurationCollected(counts))]);
        }
        let right = self.right()?.clone();
        self.census_pending = true;
        Ok(vec![send(&right, PeerMessage::PrintConfiguration { counts })])
    }

    fn own_count(&self) -> RecordCount {
        RecordCount {
            name: self.me.name.clone(),
            records: self.table.len(),
        }
    }

    fn log_census(&self, counts: &[RecordCount]) {
        for (id, count) in counts.iter().enumerate() {
            info!(id, peer = %count.name, records = count.records, "Configuration");
        }
        let total: usize = counts.iter().map(|c| c.records).sum();
        info!(peers = counts.len(), total, "Configuration collected");
    }

    /// Start a teardown from this peer. A `full` teardown ends the DHT; a
    /// partial one only wipes tables as the first step of a leave.
    pub fn start_teardown(&mut self, full: bool) -> Result<Vec<Effect>> {
        let right = self.right()?.clone();
        self.table.clear();
        self.teardown_pending = true;
        info!(full, "Starting teardown");
        Ok(vec![send(&right, PeerMessage::Teardown { full })])
    }

    /// Leave the ring: partial teardown, then renumbering.
    pub fn start_leave(&mut self) -> Result<Vec<Effect>> {
        if self.change.is_some() {
            return Err(Error::InvalidState {
                expected: "no membership change",
                actual: self.state_name(),
            });
        }
        self.position()?;
        self.change = Some(Change::Leaving);
        self.start_teardown(false)
    }

    /// Ask `leader` to add this peer to its ring.
    pub fn begin_join(&mut self, leader: &PeerTuple) -> Result<Vec<Effect>> {
        if self.id.is_some() || self.change.is_some() {
            return Err(Error::InvalidState {
                expected: "outside ring",
                actual: self.state_name(),
            });
        }
        self.change = Some(Change::Joining);
        info!(leader = %leader, "Joining ring");
        Ok(vec![send(
            leader,
            PeerMessage::JoinDht {
                peer: self.me.clone(),
            },
        )])
    }

    /// Look up `key` through `entry`, with this peer as the requester.
    pub fn find(&self, key: RecordKey, entry: &PeerTuple) -> Vec<Effect> {
        vec![send(
            entry,
            PeerMessage::FindEvent {
                key,
                requester: self.me.clone(),
                visited: Vec::new(),
            },
        )]
    }

    /// Apply one inbound datagram.
    pub fn handle<R: Rng + ?Sized>(
        &mut self,
        from: SocketAddr,
        message: PeerMessage,
        rng: &mut R,
    ) -> Result<Vec<Effect>> {
        match message {
            PeerMessage::SetId { id, ring_size, ring } => self.on_set_id(id, ring_size, ring),
            PeerMessage::Store { slot, record } => {
                let (id, ring) = self.position()?;
                let owner = Partition::owner(slot, ring.members.len());
                if owner == id {
                    self.table.insert(slot, record);
                    Ok(Vec::new())
                } else {
                    let right = self.right()?.clone();
                    Ok(vec![send(&right, PeerMessage::Store { slot, record })])
                }
            }
            PeerMessage::FindEvent {
                key,
                requester,
                visited,
            } => self.on_find(key, requester, visited, rng),
            PeerMessage::FindResult(outcome) => {
                Ok(vec![Effect::Event(RingEvent::FindAnswered(outcome))])
            }
            PeerMessage::Teardown { full } => self.on_teardown(full),
            PeerMessage::ResetId {
                id,
                ring_size,
                leaving,
            } => self.on_reset_id(id, ring_size, leaving),
            PeerMessage::JoinDht { peer } => self.on_join(peer),
            PeerMessage::RebuildDht => self.on_rebuild(from),
            PeerMessage::PrintConfiguration { mut counts } => {
                if self.census_pending {
                    self.census_pending = false;
                    self.log_census(&counts);
                    return Ok(vec![Effect::Event(RingEvent::ConfigurationCollected(counts))]);
                }
                let right = self.right()?.clone();
                counts.push(self.own_count());
                Ok(vec![send(&right, PeerMessage::PrintConfiguration { counts })])
            }
        }
    }

    fn on_set_id(&mut self, id: RingId, ring_size: usize, ring: RingConfig) -> Result<Vec<Effect>> {
        if self.is_leader() && self.ring.is_some() {
            debug!(ring_size, "Identity token returned to leader");
            let Some(joiner) = self.pending_join.take() else {
                return Ok(vec![Effect::Event(RingEvent::RingAssigned)]);
            };

            let mut effects = self.seed()?;
            effects.extend(self.start_census()?);
            effects.push(send(&joiner, PeerMessage::RebuildDht));
            info!(joiner = %joiner.name, ring_size, "Ring rebuilt after join");
            return Ok(effects);
        }

        if ring.members.len() != ring_size {
            warn!(
                ring_size,
                members = ring.members.len(),
                "Ring size disagrees with membership"
            );
        }

        self.id = Some(id);
        self.table.clear();
        self.ring = Some(ring);
        info!(id, ring_size, "Assigned ring id");

        let right = self.right()?.clone();
        let ring = self.ring.clone().ok_or(Error::InvalidState {
            expected: "ring member",
            actual: self.state_name(),
        })?;
        Ok(vec![send(
            &right,
            PeerMessage::SetId {
                id: id + 1,
                ring_size,
                ring,
            },
        )])
    }

    fn on_find<R: Rng + ?Sized>(
        &self,
        key: RecordKey,
        requester: PeerTuple,
        mut visited: Vec<RingId>,
        rng: &mut R,
    ) -> Result<Vec<Effect>> {
        let (id, ring) = self.position()?;
        let ring_size = ring.members.len();
        let placement = ring.partition.place(key, ring_size);

        if placement.owner == id {
            visited.push(id);
            let outcome = match self.table.get(placement.slot) {
                Some(record) => FindOutcome::Found {
                    visited,
                    record: record.clone(),
                },
                None => FindOutcome::NotFound { visited },
            };
            debug!(
                key,
                slot = placement.slot,
                found = matches!(outcome, FindOutcome::Found { .. }),
                "Answering lookup"
            );
            return Ok(vec![send(&requester, PeerMessage::FindResult(outcome))]);
        }

        let candidates: Vec<RingId> = (0..ring_size)
            .filter(|c| *c != id && !visited.contains(c))
            .collect();
        visited.push(id);

        let Some(next) = candidates.choose(rng).copied() else {
            debug!(key, "Lookup exhausted every ring id");
            return Ok(vec![send(
                &requester,
                PeerMessage::FindResult(FindOutcome::NotFound { visited }),
            )]);
        };

        let target = ring.members.get(next).ok_or(Error::InvalidState {
            expected: "known ring id",
            actual: next.to_string(),
        })?;
        debug!(key, next, "Forwarding lookup");
        Ok(vec![send(
            target,
            PeerMessage::FindEvent {
                key,
                requester,
                visited,
            },
        )])
    }

    fn on_teardown(&mut self, full: bool) -> Result<Vec<Effect>> {
        self.table.clear();

        if self.teardown_pending {
            self.teardown_pending = false;
            if full {
                info!("Teardown returned, leaving ring");
                self.leave_ring();
                return Ok(vec![Effect::Event(RingEvent::TeardownReturned)]);
            }
            if self.change == Some(Change::Leaving) {
                let (id, ring) = self.position()?;
                let message = PeerMessage::ResetId {
                    id: 0,
                    ring_size: ring.members.len() - 1,
                    leaving: id,
                };
                debug!(leaving = id, "Tables wiped, renumbering");
                return Ok(vec![send(self.right()?, message)]);
            }
            return Ok(Vec::new());
        }

        let right = self.right()?.clone();
        if full {
            self.leave_ring();
        }
        Ok(vec![send(&right, PeerMessage::Teardown { full })])
    }

    fn on_reset_id(&mut self, next: RingId, ring_size: usize, leaving: RingId) -> Result<Vec<Effect>> {
        let old_right = self.right()?.clone();

        if self.change == Some(Change::Leaving) {
            info!(new_leader = %old_right.name, "Renumbering complete, requesting rebuild");
            return Ok(vec![send(&old_right, PeerMessage::RebuildDht)]);
        }

        let (_, ring) = self.position()?;
        let members = ring.members.renumbered_without(leaving);
        if let Some(ring) = self.ring.as_mut() {
            ring.members = members;
        }
        self.id = Some(next);
        self.table.clear();
        info!(id = next, ring_size, "Renumbered");

        Ok(vec![send(
            &old_right,
            PeerMessage::ResetId {
                id: next + 1,
                ring_size,
                leaving,
            },
        )])
    }

    fn on_join(&mut self, peer: PeerTuple) -> Result<Vec<Effect>> {
        if !self.is_leader() {
            return Err(Error::InvalidState {
                expected: "leader",
                actual: self.state_name(),
            });
        }
        if let Some(ring) = self.ring.as_mut() {
            ring.members.push(peer.clone());
        }
        self.table.clear();
        info!(peer = %peer, ring_size = self.ring_size(), "Peer joining, rebuilding ring");
        self.pending_join = Some(peer);
        self.assign_from_leader()
    }

    fn on_rebuild(&mut self, from: SocketAddr) -> Result<Vec<Effect>> {
        match self.change {
            None if self.is_leader() => {
                info!("Rebuilding as leader");
                let mut effects = self.seed()?;
                effects.extend(self.start_census()?);
                effects.push(Effect::Send {
                    to: from,
                    message: PeerMessage::RebuildDht,
                });
                Ok(effects)
            }
            None => {
                warn!(%from, "Unexpected rebuild-dht");
                Ok(Vec::new())
            }
            Some(change) => {
                let (_, ring) = self.position()?;
                let leader = ring
                    .members
                    .position_of(from)
                    .and_then(|id| ring.members.get(id))
                    .map(|p| p.name.clone())
                    .ok_or(Error::InvalidState {
                        expected: "rebuild from a ring member",
                        actual: from.to_string(),
                    })?;

                info!(?change, leader = %leader, "Membership change confirmed");
                match change {
                    Change::Leaving => self.leave_ring(),
                    Change::Joining => self.change = None,
                }
                Ok(vec![Effect::Event(RingEvent::ChangeConfirmed { leader })])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use ringstore_dht::{Dataset, MemoryDatasets, Record};
    use std::collections::{HashSet, VecDeque};
    use std::net::Ipv4Addr;

    const DATASET: &str = "1950";
    const RECORDS: u64 = 120;

    fn dataset() -> Dataset {
        let entries = (0..RECORDS)
            .map(|i| {
                let key = 5_000 + i * 3;
                (key, Record::from(vec![key.to_string(), format!("EVENT {}", i)]))
            })
            .collect();
        Dataset::with_entries(DATASET, entries)
    }

    fn tuple(i: usize) -> PeerTuple {
        PeerTuple::new(format!("p{}", i), Ipv4Addr::LOCALHOST, 41_000 + i as u16)
    }

    /// Delivers every effect through the wire codec until the ring is quiet.
    struct Sim {
        nodes: Vec<RingNode>,
        queue: VecDeque<(SocketAddr, SocketAddr, String)>,
        events: Vec<(usize, RingEvent)>,
        rng: StdRng,
        hops: usize,
    }

    impl Sim {
        fn new(peers: usize) -> Self {
            let datasets: Arc<dyn DatasetSource> = Arc::new(MemoryDatasets::new().with(dataset()));
            Self {
                nodes: (0..peers)
                    .map(|i| RingNode::new(tuple(i), datasets.clone()))
                    .collect(),
                queue: VecDeque::new(),
                events: Vec::new(),
                rng: StdRng::seed_from_u64(7),
                hops: 0,
            }
        }

        fn index_of(&self, addr: SocketAddr) -> usize {
            self.nodes
                .iter()
                .position(|n| n.me().matches(addr))
                .unwrap()
        }

        fn apply(&mut self, at: usize, effects: Vec<Effect>) {
            let from = self.nodes[at].me().socket_addr();
            for effect in effects {
                match effect {
                    Effect::Send { to, message } => {
                        self.queue.push_back((from, to, message.encode()))
                    }
                    Effect::Event(event) => self.events.push((at, event)),
                }
            }
        }

        fn run(&mut self) {
            while let Some((from, to, line)) = self.queue.pop_front() {
                self.hops += 1;
                let at = self.index_of(to);
                let message = PeerMessage::decode(&line).unwrap();
                let effects = self.nodes[at].handle(from, message, &mut self.rng).unwrap();
                self.apply(at, effects);
            }
        }

        fn take_events(&mut self) -> Vec<(usize, RingEvent)> {
            std::mem::take(&mut self.events)
        }

        /// Build a ring over `ids` (first is leader), seed it and census it.
        fn build(&mut self, ids: &[usize]) {
            let members: Membership = ids.iter().map(|i| tuple(*i)).collect();
            let leader = ids[0];
            let effects = self.nodes[leader].begin_build(members, DATASET).unwrap();
            self.apply(leader, effects);
            self.run();
            assert_eq!(self.take_events(), vec![(leader, RingEvent::RingAssigned)]);

            let mut effects = self.nodes[leader].seed().unwrap();
            effects.extend(self.nodes[leader].start_census().unwrap());
            self.apply(leader, effects);
            self.run();
        }

        fn in_ring(&self) -> Vec<&RingNode> {
            self.nodes.iter().filter(|n| n.id().is_some()).collect()
        }

        fn find(&mut self, asker: usize, entry: usize, key: RecordKey) -> FindOutcome {
            let entry = tuple(entry);
            let effects = self.nodes[asker].find(key, &entry);
            self.apply(asker, effects);
            self.run();
            let events = self.take_events();
            events
                .into_iter()
                .find_map(|(at, e)| match e {
                    RingEvent::FindAnswered(outcome) if at == asker => Some(outcome),
                    _ => None,
                })
                .unwrap()
        }
    }

    fn assert_consistent(sim: &Sim, ring_size: usize) {
        let ring = sim.in_ring();
        assert_eq!(ring.len(), ring_size);

        let mut ids: Vec<RingId> = ring.iter().map(|n| n.id().unwrap()).collect();
        ids.sort_unstable();
        assert_eq!(ids, (0..ring_size).collect::<Vec<_>>());

        let mut seen = HashSet::new();
        for node in &ring {
            assert_eq!(node.ring_size(), ring_size);
            let members = &node.ring().unwrap().members;
            assert_eq!(members.get(node.id().unwrap()), Some(node.me()));
            for slot in node.table().slots() {
                assert_eq!(Partition::owner(*slot, ring_size), node.id().unwrap());
                assert!(seen.insert(*slot));
            }
        }
        assert_eq!(seen.len(), RECORDS as usize);
    }

    #[test]
    fn build_assigns_ids_in_membership_order() {
        let mut sim = Sim::new(4);
        let members: Membership = [2, 0, 3, 1].iter().map(|i| tuple(*i)).collect();
        let effects = sim.nodes[2].begin_build(members.clone(), DATASET).unwrap();
        sim.apply(2, effects);
        sim.run();

        assert_eq!(sim.hops, 4);
        assert_eq!(sim.take_events(), vec![(2, RingEvent::RingAssigned)]);
        for (id, peer) in members.iter().enumerate() {
            let node = sim.nodes.iter().find(|n| n.me() == peer).unwrap();
            assert_eq!(node.id(), Some(id));
            assert_eq!(node.ring().unwrap().members, members);
        }
        assert!(sim.nodes[2].is_leader());
    }

    #[test]
    fn begin_build_requires_self_as_leader() {
        let mut sim = Sim::new(3);
        let members: Membership = (0..3).map(tuple).collect();
        let result = sim.nodes[1].begin_build(members, DATASET);
        assert!(matches!(result, Err(Error::InvalidState { .. })));
    }

    #[test]
    fn seeding_partitions_every_record() {
        let mut sim = Sim::new(5);
        sim.build(&[0, 1, 2, 3, 4]);
        assert_consistent(&sim, 5);

        let modulus = sim.nodes[0].ring().unwrap().partition.modulus();
        assert_eq!(modulus, 241);
        for node in sim.in_ring() {
            assert_eq!(node.ring().unwrap().partition.modulus(), modulus);
        }
    }

    #[test]
    fn census_reports_every_peer_in_ring_order() {
        let mut sim = Sim::new(3);
        sim.build(&[1, 2, 0]);

        let events = sim.take_events();
        let counts = match &events[..] {
            [(1, RingEvent::ConfigurationCollected(counts))] => counts.clone(),
            other => panic!("unexpected events {:?}", other),
        };
        let names: Vec<&str> = counts.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["p1", "p2", "p0"]);
        assert_eq!(counts.iter().map(|c| c.records).sum::<usize>(), RECORDS as usize);
    }

    #[test]
    fn find_present_key_from_outside() {
        let mut sim = Sim::new(5);
        sim.build(&[0, 1, 2, 3]);
        sim.take_events();

        let record = dataset().get(5_000 + 3 * 41).cloned().unwrap();
        for entry in 0..4 {
            let outcome = sim.find(4, entry, 5_000 + 3 * 41);
            match outcome {
                FindOutcome::Found { visited, record: got } => {
                    assert_eq!(got, record);
                    assert!(visited.len() <= 4);
                    let unique: HashSet<_> = visited.iter().collect();
                    assert_eq!(unique.len(), visited.len());
                }
                other => panic!("expected record, got {:?}", other),
            }
        }
    }

    #[test]
    fn find_absent_key_fails() {
        let mut sim = Sim::new(4);
        sim.build(&[0, 1, 2]);
        sim.take_events();

        // Slot 0 holds nothing under this dataset.
        let outcome = sim.find(3, 1, 0);
        assert!(matches!(outcome, FindOutcome::NotFound { .. }));
        assert!(outcome.visited().len() <= 3);
    }

    #[test]
    fn find_exhausts_candidates() {
        let mut sim = Sim::new(4);
        sim.build(&[0, 1, 2]);
        sim.take_events();

        // Key 1 is owned by id 1, which the walk already visited.
        let effects = vec![Effect::Send {
            to: tuple(0).socket_addr(),
            message: PeerMessage::FindEvent {
                key: 1,
                requester: tuple(3),
                visited: vec![1, 2],
            },
        }];
        sim.apply(3, effects);
        sim.run();

        let outcome = sim
            .take_events()
            .into_iter()
            .find_map(|(_, e)| match e {
                RingEvent::FindAnswered(o) => Some(o),
                _ => None,
            })
            .unwrap();
        assert_eq!(outcome, FindOutcome::NotFound { visited: vec![1, 2, 0] });
    }

    #[test]
    fn leave_renumbers_and_reseeds() {
        let mut sim = Sim::new(4);
        sim.build(&[0, 1, 2, 3]);
        sim.take_events();

        let effects = sim.nodes[1].start_leave().unwrap();
        sim.apply(1, effects);
        sim.run();

        let confirmed: Vec<_> = sim
            .take_events()
            .into_iter()
            .filter(|(_, e)| matches!(e, RingEvent::ChangeConfirmed { .. }))
            .collect();
        assert_eq!(
            confirmed,
            vec![(1, RingEvent::ChangeConfirmed { leader: "p2".into() })]
        );

        assert!(sim.nodes[1].id().is_none());
        assert!(sim.nodes[1].table().is_empty());
        assert_eq!(sim.nodes[2].id(), Some(0));
        assert_eq!(sim.nodes[3].id(), Some(1));
        assert_eq!(sim.nodes[0].id(), Some(2));
        for node in sim.in_ring() {
            assert!(node.ring().unwrap().members.position_of_name("p1").is_none());
        }
        assert_consistent(&sim, 3);
    }

    #[test]
    fn leader_leave_hands_over() {
        let mut sim = Sim::new(4);
        sim.build(&[0, 1, 2, 3]);
        sim.take_events();

        let effects = sim.nodes[0].start_leave().unwrap();
        sim.apply(0, effects);
        sim.run();

        assert!(sim
            .take_events()
            .contains(&(0, RingEvent::ChangeConfirmed { leader: "p1".into() })));
        assert!(sim.nodes[1].is_leader());
        assert_consistent(&sim, 3);
    }

    #[test]
    fn leave_then_join_rebuilds_full_ring() {
        let mut sim = Sim::new(5);
        sim.build(&[0, 1, 2, 3]);
        let effects = sim.nodes[3].start_leave().unwrap();
        sim.apply(3, effects);
        sim.run();
        assert_consistent(&sim, 3);
        sim.take_events();

        let leader = sim.in_ring().into_iter().find(|n| n.is_leader()).unwrap().me().clone();
        assert_eq!(leader.name, "p0");
        let effects = sim.nodes[4].begin_join(&leader).unwrap();
        sim.apply(4, effects);
        sim.run();

        assert!(sim
            .take_events()
            .contains(&(4, RingEvent::ChangeConfirmed { leader: "p0".into() })));
        assert_eq!(sim.nodes[4].id(), Some(3));
        assert!(sim.nodes[4].change().is_none());
        assert_consistent(&sim, 4);

        let outcome = sim.find(3, 4, 5_000 + 3 * 7);
        assert!(matches!(outcome, FindOutcome::Found { .. }));
    }

    #[test]
    fn leave_down_to_lone_leader_keeps_serving() {
        let mut sim = Sim::new(3);
        sim.build(&[0, 1]);
        sim.take_events();

        let effects = sim.nodes[1].start_leave().unwrap();
        sim.apply(1, effects);
        sim.run();

        let events = sim.take_events();
        assert!(events.contains(&(1, RingEvent::ChangeConfirmed { leader: "p0".into() })));
        let counts = events
            .iter()
            .find_map(|(at, e)| match e {
                RingEvent::ConfigurationCollected(counts) if *at == 0 => Some(counts.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(counts.len(), 1);
        assert_eq!(counts[0].records, RECORDS as usize);

        assert!(sim.nodes[0].is_leader());
        assert_eq!(sim.nodes[0].ring().unwrap().members.len(), 1);
        assert_consistent(&sim, 1);

        let key = 5_000 + 3 * 90;
        match sim.find(2, 0, key) {
            FindOutcome::Found { visited, record } => {
                assert_eq!(visited, vec![0]);
                assert_eq!(Some(&record), dataset().get(key));
            }
            other => panic!("expected record, got {:?}", other),
        }
        assert_eq!(sim.find(2, 0, 0), FindOutcome::NotFound { visited: vec![0] });
    }

    #[test]
    fn one_member_ring_assigns_and_censuses_alone() {
        let mut sim = Sim::new(2);
        sim.build(&[1]);

        assert_eq!(sim.hops, 0);
        let events = sim.take_events();
        assert!(matches!(
            &events[..],
            [(1, RingEvent::ConfigurationCollected(counts))] if counts[0].records == RECORDS as usize
        ));
        assert_consistent(&sim, 1);
    }

    #[test]
    fn full_teardown_wipes_ring() {
        let mut sim = Sim::new(3);
        sim.build(&[0, 1, 2]);
        sim.take_events();

        let effects = sim.nodes[0].start_teardown(true).unwrap();
        sim.apply(0, effects);
        sim.run();

        assert_eq!(sim.take_events(), vec![(0, RingEvent::TeardownReturned)]);
        for node in &sim.nodes {
            assert!(node.id().is_none());
            assert!(node.table().is_empty());
        }
    }

    #[test]
    fn join_is_rejected_by_non_leader() {
        let mut sim = Sim::new(4);
        sim.build(&[0, 1, 2]);
        let mut rng = StdRng::seed_from_u64(1);
        let result = sim.nodes[1].handle(
            tuple(3).socket_addr(),
            PeerMessage::JoinDht { peer: tuple(3) },
            &mut rng,
        );
        assert!(matches!(result, Err(Error::InvalidState { expected: "leader", .. })));
    }

    #[test]
    fn store_outside_ring_is_rejected() {
        let mut sim = Sim::new(1);
        let mut rng = StdRng::seed_from_u64(1);
        let result = sim.nodes[0].handle(
            tuple(9).socket_addr(),
            PeerMessage::Store {
                slot: 3,
                record: Record::from(vec!["3"]),
            },
            &mut rng,
        );
        assert!(matches!(result, Err(Error::InvalidState { .. })));
    }
}
