//! Ringstore Distributed Hash Table
//!
//! The data-side building blocks of the ring: what a record is, where it
//! lives, and who the ring members are.
//!
//! # Design
//!
//! Records are keyed by an integer taken from the source dataset. Given a
//! dataset of `D` records, the partition modulus `s` is the smallest prime
//! strictly greater than `2D`. A key maps to `slot = key mod s` and the slot
//! is owned by ring id `slot mod ring_size`. Every peer uses the same `s`,
//! which the leader computes once and replicates with the ring membership.
//!
//! # Membership
//!
//! A ring is an ordered list of `(name, address, data port)` tuples. The
//! index of a tuple is the peer's ring id; id 0 is the leader. Each peer
//! talks only to its right neighbor, `members[(id + 1) mod ring_size]`, but
//! keeps the whole list so it can renumber itself when someone leaves.

mod dataset;
mod entry;
mod error;
mod membership;
mod placement;
mod state;

pub use dataset::{DatasetSource, MemoryDatasets};
pub use entry::{Dataset, Record, RecordKey, Slot};
pub use error::{DatasetError, Result};
pub use membership::{Membership, PeerTuple, RingConfig, RingId};
pub use placement::{is_prime, next_prime, Partition, Placement};
pub use state::LocalTable;

/// Longest peer name the registry accepts.
pub const MAX_NAME_LEN: usize = 15;

/// Smallest ring the registry will build.
pub const MIN_RING_SIZE: usize = 3;
