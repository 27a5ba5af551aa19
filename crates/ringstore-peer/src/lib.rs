//! Ringstore Peer - Ring member runtime
//!
//! A peer has two UDP sockets: a control socket it uses to talk to the
//! manager and a data socket for the ring protocol. [`PeerNode`] ties them
//! to a [`RingNode`](ringstore_protocols::RingNode) and exposes the
//! operations a user drives from the `dht-peer` prompt:
//!
//! ```text
//! register      -> manager directory entry (Free)
//! setup_dht     -> setup-dht, set_id round, seeding, census, dht-complete
//! query         -> query-dht, find-event walk, find-result
//! leave / join  -> leave-dht|join-dht, ring rebuild, dht-rebuilt
//! teardown      -> teardown-dht, teardown round, teardown-complete
//! ```
//!
//! Datasets are read from `details-<key>.csv` by [`CsvDatasets`].

pub mod client;
pub mod config;
pub mod dataset;
pub mod error;
pub mod node;
pub mod prompt;

pub use client::ControlClient;
pub use config::PeerConfig;
pub use dataset::CsvDatasets;
pub use error::{Error, Result};
pub use node::{PeerNode, PeerStatus};
pub use prompt::{Command, USAGE};
