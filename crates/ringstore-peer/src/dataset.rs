//! CSV dataset loader.
//!
//! A dataset key `K` names the file `details-K.csv` in the data directory.
//! The first row is a header. Every other row becomes one record; its first
//! column is the integer record key.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use ringstore_dht::{Dataset, DatasetError, DatasetSource, Record, RecordKey};

/// Loads datasets from `details-<key>.csv` files.
#[derive(Debug, Clone)]
pub struct CsvDatasets {
    dir: PathBuf,
}

impl CsvDatasets {
    /// Read datasets from `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory datasets are read from.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing the dataset `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("details-{}.csv", key))
    }
}

impl DatasetSource for CsvDatasets {
    fn load(&self, key: &str) -> ringstore_dht::Result<Dataset> {
        // Dataset keys come off the wire; keep them inside the directory.
        if key.is_empty() || key.contains(['/', '\\']) || key.contains("..") {
            return Err(DatasetError::NotFound(key.to_string()));
        }

        let path = self.path_for(key);
        let file = File::open(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => DatasetError::NotFound(key.to_string()),
            _ => DatasetError::Io(e),
        })?;

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(file);

        let mut dataset = Dataset::new(key);
        for (index, row) in reader.records().enumerate() {
            let row_number = index + 1;
            let row = row.map_err(|e| DatasetError::Malformed {
                row: row_number,
                reason: e.to_string(),
            })?;

            let raw_key = row.get(0).unwrap_or_default().trim();
            let record_key: RecordKey = raw_key.parse().map_err(|_| DatasetError::Malformed {
                row: row_number,
                reason: format!("invalid record key {:?}", raw_key),
            })?;

            dataset.push(record_key, Record::new(row.iter().map(str::to_string).collect()));
        }

        tracing::debug!(path = %path.display(), records = dataset.len(), "Loaded dataset");
        Ok(dataset)
    }
}
