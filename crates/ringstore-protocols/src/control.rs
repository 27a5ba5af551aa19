//! Control channel: peer → manager requests and their responses.
//!
//! Requests are one line of space-delimited tokens. Responses are either
//! `SUCCESS`, `SUCCESS\n<json>` when data comes back, or
//! `FAILURE: <reason>`.

use std::net::Ipv4Addr;

use ringstore_dht::{Membership, PeerTuple};

use crate::error::{Error, Result};
use crate::wire::{field, parsed};

/// A request to the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlRequest {
    /// `register <name> <ipv4> <controlPort> <dataPort>`
    Register {
        name: String,
        addr: Ipv4Addr,
        control_port: u16,
        data_port: u16,
    },
    /// `setup-dht <name> <n> <datasetKey>`
    SetupDht {
        name: String,
        size: usize,
        dataset: String,
    },
    /// `dht-complete <name>`
    DhtComplete { name: String },
    /// `query-dht <name>`
    QueryDht { name: String },
    /// `leave-dht <name>`
    LeaveDht { name: String },
    /// `join-dht <name>`
    JoinDht { name: String },
    /// `dht-rebuilt <name> <newLeaderName>`
    DhtRebuilt { name: String, new_leader: String },
    /// `deregister <name>`
    Deregister { name: String },
    /// `teardown-dht <name>`
    TeardownDht { name: String },
    /// `teardown-complete <name>`
    TeardownComplete { name: String },
}

impl ControlRequest {
    /// Wire command token.
    pub fn command(&self) -> &'static str {
        match self {
            Self::Register { .. } => "register",
            Self::SetupDht { .. } => "setup-dht",
            Self::DhtComplete { .. } => "dht-complete",
            Self::QueryDht { .. } => "query-dht",
            Self::LeaveDht { .. } => "leave-dht",
            Self::JoinDht { .. } => "join-dht",
            Self::DhtRebuilt { .. } => "dht-rebuilt",
            Self::Deregister { .. } => "deregister",
            Self::TeardownDht { .. } => "teardown-dht",
            Self::TeardownComplete { .. } => "teardown-complete",
        }
    }

    /// Name of the requesting peer.
    pub fn name(&self) -> &str {
        match self {
            Self::Register { name, .. }
            | Self::SetupDht { name, .. }
            | Self::DhtComplete { name }
            | Self::QueryDht { name }
            | Self::LeaveDht { name }
            | Self::JoinDht { name }
            | Self::DhtRebuilt { name, .. }
            | Self::Deregister { name }
            | Self::TeardownDht { name }
            | Self::TeardownComplete { name } => name,
        }
    }

    /// Encode as a wire line.
    pub fn encode(&self) -> String {
        match self {
            Self::Register {
                name,
                addr,
                control_port,
                data_port,
            } => format!("register {} {} {} {}", name, addr, control_port, data_port),
            Self::SetupDht {
                name,
                size,
                dataset,
            } => format!("setup-dht {} {} {}", name, size, dataset),
            Self::DhtRebuilt { name, new_leader } => {
                format!("dht-rebuilt {} {}", name, new_leader)
            }
            other => format!("{} {}", other.command(), other.name()),
        }
    }

    /// Decode a wire line.
    pub fn decode(line: &str) -> Result<Self> {
        let mut parts = line.split_whitespace();
        let command = parts.next().ok_or(Error::Empty)?;
        let name = field(&mut parts, "name")?.to_string();

        let request = match command {
            "register" => Self::Register {
                name,
                addr: parsed(&mut parts, "ipv4 address")?,
                control_port: parsed(&mut parts, "control port")?,
                data_port: parsed(&mut parts, "data port")?,
            },
            "setup-dht" => Self::SetupDht {
                name,
                size: parsed(&mut parts, "ring size")?,
                dataset: field(&mut parts, "dataset key")?.to_string(),
            },
            "dht-complete" => Self::DhtComplete { name },
            "query-dht" => Self::QueryDht { name },
            "leave-dht" => Self::LeaveDht { name },
            "join-dht" => Self::JoinDht { name },
            "dht-rebuilt" => Self::DhtRebuilt {
                name,
                new_leader: field(&mut parts, "new leader")?.to_string(),
            },
            "deregister" => Self::Deregister { name },
            "teardown-dht" => Self::TeardownDht { name },
            "teardown-complete" => Self::TeardownComplete { name },
            other => return Err(Error::UnknownCommand(other.to_string())),
        };
        Ok(request)
    }
}

impl std::fmt::Display for ControlRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encode())
    }
}

/// The manager's answer to one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlResponse {
    /// Plain success.
    Success,
    /// Success carrying the ring member list (setup-dht).
    Members(Membership),
    /// Success carrying one peer tuple (query-dht, join-dht).
    Peer(PeerTuple),
    /// Failure with a human-readable reason.
    Failure(String),
}

impl ControlResponse {
    /// Whether this is any kind of success.
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failure(_))
    }

    /// Encode as wire text.
    pub fn encode(&self) -> String {
        match self {
            Self::Success => "SUCCESS".to_string(),
            Self::Members(members) => format!("SUCCESS\n{}", members.to_json()),
            Self::Peer(peer) => format!("SUCCESS\n{}", peer.to_json()),
            Self::Failure(reason) => format!("FAILURE: {}", reason),
        }
    }

    /// Decode wire text.
    pub fn decode(text: &str) -> Result<Self> {
        if let Some(reason) = text.strip_prefix("FAILURE") {
            let reason = reason.trim_start_matches(':').trim();
            return Ok(Self::Failure(reason.to_string()));
        }

        let rest = text.strip_prefix("SUCCESS").ok_or_else(|| Error::InvalidField {
            field: "response status",
            value: text.chars().take(32).collect(),
        })?;

        let payload = match rest.split_once('\n') {
            Some((_, payload)) => payload.trim(),
            None => return Ok(Self::Success),
        };

        if payload.is_empty() {
            Ok(Self::Success)
        } else if payload.starts_with('[') {
            Ok(Self::Members(Membership::from_json(payload)?))
        } else {
            Ok(Self::Peer(PeerTuple::from_json(payload)?))
        }
    }
}

impl std::fmt::Display for ControlResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encode())
    }
}
