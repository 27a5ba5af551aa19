//! Ringstore Protocols - Control and Ring Protocols
//!
//! This crate provides the two message protocols of a Ringstore deployment
//! and the per-peer state machine that drives the ring.
//!
//! # Overview
//!
//! ## Control channel
//!
//! Peers talk to the manager with [`ControlRequest`] lines and get back one
//! [`ControlResponse`] per request:
//!
//! ```text
//! register <name> <ipv4> <controlPort> <dataPort>   -> SUCCESS | FAILURE: <reason>
//! setup-dht <name> <n> <datasetKey>                 -> SUCCESS\n<members> | FAILURE: <reason>
//! query-dht <name>                                  -> SUCCESS\n<tuple> | FAILURE: <reason>
//! ```
//!
//! ## Data channel
//!
//! Peers talk to each other with [`PeerMessage`]s. Identity assignment,
//! teardown, renumbering and the configuration census are tokens that
//! circle the ring once; stores are relayed clockwise to their owner;
//! lookups take a random walk over unvisited ids.
//!
//! ## Ring state machine
//!
//! [`RingNode`] applies one message at a time and returns [`Effect`]s:
//!
//! ```rust,ignore
//! use ringstore_protocols::{Effect, PeerMessage, RingNode};
//!
//! let effects = node.handle(from, PeerMessage::decode(&line)?, &mut rng)?;
//! for effect in effects {
//!     match effect {
//!         Effect::Send { to, message } => transport.send_to(message.encode().as_bytes(), to).await?,
//!         Effect::Event(event) => notify(event),
//!     }
//! }
//! ```

pub mod control;
pub mod error;
pub mod message;
pub mod ring;
mod wire;

pub use control::{ControlRequest, ControlResponse};
pub use error::{Error, Result};
pub use message::{FindOutcome, PeerMessage, RecordCount};
pub use ring::{Change, Effect, RingEvent, RingNode};
