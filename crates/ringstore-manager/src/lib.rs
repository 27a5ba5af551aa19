//! Ringstore Manager - Peer registry and lifecycle coordination
//!
//! The manager is the one process every peer knows about. It keeps the peer
//! directory, picks ring members at build time, hands out entry points for
//! lookups and serializes the cluster-wide phases:
//!
//! ```text
//!            setup-dht              dht-complete
//!   Idle ─────────────────> Building ─────────────> Idle
//!   Idle ── teardown-dht ─> TearingDown ── teardown-complete ─> Idle
//!   Idle ── leave/join ───> Rebuilding ── dht-rebuilt ─> Idle
//! ```
//!
//! While a phase is active every other request is answered with
//! `FAILURE: <phase> in progress`.

pub mod config;
pub mod error;
pub mod registry;
pub mod server;

pub use config::ManagerConfig;
pub use error::{Error, Result};
pub use registry::{
    ChangeKind, PeerRecord, PeerState, PendingChange, Phase, Registry, RegistryError,
};
pub use server::Manager;
