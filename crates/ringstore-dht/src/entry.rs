//! Dataset record types.

use serde::{Deserialize, Serialize};

/// Integer key of a record in the source dataset.
pub type RecordKey = u64;

/// Position of a record under the modulo hash.
pub type Slot = u64;

/// One dataset row, kept as its ordered fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(pub Vec<String>);

impl Record {
    /// Create from fields.
    pub fn new(fields: Vec<String>) -> Self {
        Self(fields)
    }

    /// All fields in column order.
    pub fn fields(&self) -> &[String] {
        &self.0
    }

    /// A single field, if the row has that many columns.
    pub fn field(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(String::as_str)
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

impl From<Vec<String>> for Record {
    fn from(fields: Vec<String>) -> Self {
        Self(fields)
    }
}

impl From<Vec<&str>> for Record {
    fn from(fields: Vec<&str>) -> Self {
        Self(fields.into_iter().map(str::to_string).collect())
    }
}

impl std::fmt::Display for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.join(","))
    }
}

/// A keyed dataset as loaded from the source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dataset {
    /// Key the dataset was requested by (e.g. a year).
    key: String,
    /// Records in source order.
    entries: Vec<(RecordKey, Record)>,
}

impl Dataset {
    /// Create an empty dataset.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            entries: Vec::new(),
        }
    }

    /// Create from pre-loaded entries.
    pub fn with_entries(key: impl Into<String>, entries: Vec<(RecordKey, Record)>) -> Self {
        Self {
            key: key.into(),
            entries,
        }
    }

    /// Append a record.
    pub fn push(&mut self, key: RecordKey, record: Record) {
        self.entries.push((key, record));
    }

    /// Dataset key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate records in source order.
    pub fn iter(&self) -> impl Iterator<Item = &(RecordKey, Record)> {
        self.entries.iter()
    }

    /// Look up a record by its key. O(n).
    pub fn get(&self, key: RecordKey) -> Option<&Record> {
        self.entries.iter().find(|(k, _)| *k == key).map(|(_, r)| r)
    }
}
