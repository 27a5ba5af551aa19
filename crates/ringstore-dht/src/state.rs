//! Local table state.

use std::collections::HashMap;

use crate::{Record, Slot};

/// Records this peer owns, keyed by slot.
///
/// Tables are disjoint across a ring: a slot is only ever stored by the
/// ring id that owns it under the shared partition.
#[derive(Debug, Default, Clone)]
pub struct LocalTable {
    records: HashMap<Slot, Record>,
}

impl LocalTable {
    /// Create empty table.
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
        }
    }

    /// Get the record at a slot.
    pub fn get(&self, slot: Slot) -> Option<&Record> {
        self.records.get(&slot)
    }

    /// Store a record, replacing any previous one at the same slot.
    /// Returns the replaced record.
    pub fn insert(&mut self, slot: Slot, record: Record) -> Option<Record> {
        self.records.insert(slot, record)
    }

    /// Check whether a slot is stored here.
    pub fn contains(&self, slot: Slot) -> bool {
        self.records.contains_key(&slot)
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All stored slots.
    pub fn slots(&self) -> impl Iterator<Item = &Slot> {
        self.records.keys()
    }

    /// All stored (slot, record) pairs.
    pub fn entries(&self) -> impl Iterator<Item = (&Slot, &Record)> {
        self.records.iter()
    }

    /// Clear all records.
    pub fn clear(&mut self) {
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_get() {
        let mut table = LocalTable::new();
        table.insert(4, Record::from(vec!["a"]));

        assert!(table.contains(4));
        assert_eq!(table.get(4).and_then(|r| r.field(0)), Some("a"));
        assert!(table.get(5).is_none());
    }

    #[test]
    fn insert_replaces_same_slot() {
        let mut table = LocalTable::new();
        table.insert(4, Record::from(vec!["old"]));
        let replaced = table.insert(4, Record::from(vec!["new"]));

        assert_eq!(replaced, Some(Record::from(vec!["old"])));
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(4).and_then(|r| r.field(0)), Some("new"));
    }

    #[test]
    fn clear_empties_table() {
        let mut table = LocalTable::new();
        for slot in 0..10 {
            table.insert(slot, Record::from(vec!["x"]));
        }
        assert_eq!(table.len(), 10);

        table.clear();
        assert!(table.is_empty());
        assert_eq!(table.slots().count(), 0);
    }
}
