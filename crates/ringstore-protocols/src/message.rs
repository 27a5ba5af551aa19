//! Data channel: peer ↔ peer ring messages.
//!
//! Every message is a command token followed by space-delimited fields.
//! Structured fields are compact JSON, and a free-text payload (a record)
//! is always the last field so it may contain spaces.

use ringstore_dht::{PeerTuple, Record, RecordKey, RingConfig, RingId, Slot};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::wire::{decode_trail, encode_trail, field, parsed};

/// One peer's entry in a configuration census.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordCount {
    /// Peer name.
    pub name: String,
    /// Records in the peer's local table.
    pub records: usize,
}

/// Answer to a lookup, sent straight to the original requester.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FindOutcome {
    /// The owner had the record.
    Found {
        /// Ring ids visited, ending with the owner.
        visited: Vec<RingId>,
        /// The record.
        record: Record,
    },
    /// The owner did not have it, or every candidate was exhausted.
    NotFound {
        /// Ring ids visited before giving up.
        visited: Vec<RingId>,
    },
}

impl FindOutcome {
    /// Ids visited on the way.
    pub fn visited(&self) -> &[RingId] {
        match self {
            Self::Found { visited, .. } | Self::NotFound { visited } => visited,
        }
    }
}

/// A datagram on the ring's data channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerMessage {
    /// Identity-assignment token.
    SetId {
        id: RingId,
        ring_size: usize,
        ring: RingConfig,
    },
    /// Relay a record toward its owner.
    Store { slot: Slot, record: Record },
    /// Random-walk lookup.
    FindEvent {
        key: RecordKey,
        requester: PeerTuple,
        visited: Vec<RingId>,
    },
    /// Reply to the requester of a lookup.
    FindResult(FindOutcome),
    /// Wipe local tables around the ring. `full` is false when the
    /// teardown is a step of a leave rather than the end of the DHT.
    Teardown { full: bool },
    /// Renumbering token after a leave.
    ResetId {
        id: RingId,
        ring_size: usize,
        leaving: RingId,
    },
    /// A new peer asks the leader to be added.
    JoinDht { peer: PeerTuple },
    /// Rebuild trigger / confirmation.
    RebuildDht,
    /// Configuration census token.
    PrintConfiguration { counts: Vec<RecordCount> },
}

impl PeerMessage {
    /// Wire command token.
    pub fn command(&self) -> &'static str {
        match self {
            Self::SetId { .. } => "set_id",
            Self::Store { .. } => "store",
            Self::FindEvent { .. } => "find-event",
            Self::FindResult(_) => "find-result",
            Self::Teardown { .. } => "teardown",
            Self::ResetId { .. } => "reset-id",
            Self::JoinDht { .. } => "join-dht",
            Self::RebuildDht => "rebuild-dht",
            Self::PrintConfiguration { .. } => "print_configuration",
        }
    }

    /// Encode as a wire line.
    pub fn encode(&self) -> String {
        match self {
            Self::SetId {
                id,
                ring_size,
                ring,
            } => format!("set_id {} {} {}", id, ring_size, ring.to_json()),
            Self::Store { slot, record } => format!("store {} {}", slot, record.to_json()),
            Self::FindEvent {
                key,
                requester,
                visited,
            } => format!(
                "find-event {} {} {}",
                key,
                requester.to_json(),
                encode_trail(visited)
            ),
            Self::FindResult(FindOutcome::Found { visited, record }) => format!(
                "find-result SUCCESS {} {}",
                encode_trail(visited),
                record.to_json()
            ),
            Self::FindResult(FindOutcome::NotFound { visited }) => {
                format!("find-result FAILURE {}", encode_trail(visited))
            }
            Self::Teardown { full } => {
                format!("teardown {}", if *full { "full" } else { "partial" })
            }
            Self::ResetId {
                id,
                ring_size,
                leaving,
            } => format!("reset-id {} {} {}", id, ring_size, leaving),
            Self::JoinDht { peer } => format!("join-dht {}", peer.to_json()),
            Self::RebuildDht => "rebuild-dht".to_string(),
            Self::PrintConfiguration { counts } => format!(
                "print_configuration {}",
                serde_json::to_string(counts).unwrap_or_else(|_| "[]".to_string())
            ),
        }
    }

    /// Decode a wire line.
    pub fn decode(line: &str) -> Result<Self> {
        let line = line.trim_end_matches(['\n', '\r']);
        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));

        let message = match command {
            "set_id" => {
                let mut parts = rest.splitn(3, ' ');
                Self::SetId {
                    id: parsed(&mut parts, "id")?,
                    ring_size: parsed(&mut parts, "ring size")?,
                    ring: RingConfig::from_json(field(&mut parts, "ring")?)?,
                }
            }
            "store" => {
                let mut parts = rest.splitn(2, ' ');
                Self::Store {
                    slot: parsed(&mut parts, "slot")?,
                    record: Record::from_json(field(&mut parts, "record")?)?,
                }
            }
            "find-event" => {
                let mut parts = rest.splitn(3, ' ');
                Self::FindEvent {
                    key: parsed(&mut parts, "key")?,
                    requester: PeerTuple::from_json(field(&mut parts, "requester")?)?,
                    visited: decode_trail(field(&mut parts, "visited trail")?)?,
                }
            }
            "find-result" => {
                let mut parts = rest.splitn(3, ' ');
                let status = field(&mut parts, "status")?;
                let visited = decode_trail(field(&mut parts, "visited trail")?)?;
                match status {
                    "SUCCESS" => Self::FindResult(FindOutcome::Found {
                        visited,
                        record: Record::from_json(field(&mut parts, "record")?)?,
                    }),
                    "FAILURE" => Self::FindResult(FindOutcome::NotFound { visited }),
                    other => {
                        return Err(Error::InvalidField {
                            field: "status",
                            value: other.to_string(),
                        })
                    }
                }
            }
            "teardown" => Self::Teardown {
                full: rest.trim() != "partial",
            },
            "reset-id" => {
                let mut parts = rest.split_whitespace();
                Self::ResetId {
                    id: parsed(&mut parts, "id")?,
                    ring_size: parsed(&mut parts, "ring size")?,
                    leaving: parsed(&mut parts, "leaving id")?,
                }
            }
            "join-dht" => Self::JoinDht {
                peer: PeerTuple::from_json(rest.trim())?,
            },
            "rebuild-dht" => Self::RebuildDht,
            "print_configuration" => {
                let payload = rest.trim();
                let counts = if payload.is_empty() {
                    Vec::new()
                } else {
                    serde_json::from_str(payload)?
                };
                Self::PrintConfiguration { counts }
            }
            "" => return Err(Error::Empty),
            other => return Err(Error::UnknownCommand(other.to_string())),
        };
        Ok(message)
    }
}

impl std::fmt::Display for PeerMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.command())
    }
}
