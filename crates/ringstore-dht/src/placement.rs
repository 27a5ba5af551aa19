//! Placement engine.
//!
//! Maps record keys to slots and slots to owning ring ids. The same
//! function is used when seeding a ring and when answering a lookup, so
//! both sides always agree on where a record lives.

use serde::{Deserialize, Serialize};

use crate::{RecordKey, RingId, Slot};

/// Check whether `n` is prime by trial division.
pub fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    if n < 4 {
        return true;
    }
    if n % 2 == 0 {
        return false;
    }
    let mut i = 3u64;
    while i.saturating_mul(i) <= n {
        if n % i == 0 {
            return false;
        }
        i += 2;
    }
    true
}

/// Smallest prime strictly greater than `n`.
pub fn next_prime(n: u64) -> u64 {
    let mut candidate = n + 1;
    while !is_prime(candidate) {
        candidate += 1;
    }
    candidate
}

/// Where a key lands on the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    /// Slot in the owner's local table.
    pub slot: Slot,
    /// Ring id that owns the slot.
    pub owner: RingId,
}

/// The modulo partition function shared by every ring member.
///
/// A modulus below 2 is refused when parsed off the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPartition")]
pub struct Partition {
    modulus: u64,
}

#[derive(Deserialize)]
struct RawPartition {
    modulus: u64,
}

impl TryFrom<RawPartition> for Partition {
    type Error = String;

    fn try_from(raw: RawPartition) -> Result<Self, Self::Error> {
        if raw.modulus < 2 {
            return Err(format!("partition modulus {} is below 2", raw.modulus));
        }
        Ok(Self {
            modulus: raw.modulus,
        })
    }
}

impl Partition {
    /// Partition for a dataset of `size` records: modulus is the first
    /// prime above `2 * size`.
    pub fn for_dataset_size(size: usize) -> Self {
        Self {
            modulus: next_prime(2 * size as u64),
        }
    }

    /// Partition with an explicit modulus (as replicated in the ring config).
    pub fn from_modulus(modulus: u64) -> Self {
        Self {
            modulus: modulus.max(2),
        }
    }

    /// The modulus `s`.
    pub fn modulus(&self) -> u64 {
        self.modulus
    }

    /// Slot of a key.
    pub fn slot(&self, key: RecordKey) -> Slot {
        key % self.modulus
    }

    /// Owner of a slot on a ring of `ring_size` members.
    ///
    /// An empty ring owns nothing; everything maps to 0.
    pub fn owner(slot: Slot, ring_size: usize) -> RingId {
        if ring_size == 0 {
            return 0;
        }
        (slot % ring_size as u64) as RingId
    }

    /// Slot and owner of a key.
    pub fn place(&self, key: RecordKey, ring_size: usize) -> Placement {
        let slot = self.slot(key);
        Placement {
            slot,
            owner: Self::owner(slot, ring_size),
        }
    }
}
