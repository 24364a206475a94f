//! RocksDB-backed persistence.
//!
//! This module is feature-gated. Enable with `--features rocksdb-backend`.
//! Every record is stored as JSON under its identity key (`<table>:<id>`),
//! so one `WriteBatch` per batch gives atomic visibility and prefix scans
//! give per-table counts. When the feature is disabled, the constructor
//! returns [`SinkError::Unavailable`].

use super::{Backend, Deadline};
use crate::error::SinkError;
use crate::types::{Record, StoreStats};
use std::path::Path;

#[cfg(feature = "rocksdb-backend")]
use super::{Table, count_row, identity_key};
#[cfg(feature = "rocksdb-backend")]
use rocksdb::{DB, IteratorMode, Options, WriteBatch};
#[cfg(feature = "rocksdb-backend")]
use std::collections::HashSet;

#[cfg(feature = "rocksdb-backend")]
fn backend_error(e: impl std::fmt::Display) -> SinkError {
    SinkError::WriteFailed(e.to_string())
}

/// Embedded key/value backend
pub struct RocksDbBackend {
    #[cfg(feature = "rocksdb-backend")]
    db: DB,
}

impl RocksDbBackend {
    /// Opens or creates a RocksDB database at the given path.
    pub fn open(path: &Path) -> Result<Self, SinkError> {
        #[cfg(feature = "rocksdb-backend")]
        {
            let mut opts = Options::default();
            opts.create_if_missing(true);
            let db = DB::open(&opts, path)
                .map_err(|e| SinkError::ConnectionFailed(format!("{}: {}", path.display(), e)))?;
            tracing::debug!("Opened RocksDB at {}", path.display());
            Ok(Self { db })
        }

        #[cfg(not(feature = "rocksdb-backend"))]
        {
            let _ = path;
            Err(SinkError::Unavailable("rocksdb".to_string()))
        }
    }
}

impl Backend for RocksDbBackend {
    fn name(&self) -> &'static str {
        "rocksdb"
    }

    fn write_batch(&mut self, records: &[Record], deadline: Deadline) -> Result<(), SinkError> {
        #[cfg(feature = "rocksdb-backend")]
        {
            let mut batch = WriteBatch::default();
            let mut staged = HashSet::new();
            for record in records {
                let key = identity_key(record);
                let immutable = !matches!(record, Record::Watermark(_));
                if immutable {
                    if staged.contains(&key) || self.db.get(key.as_bytes()).map_err(backend_error)?.is_some() {
                        continue;
                    }
                    staged.insert(key.clone());
                }
                let value = serde_json::to_vec(record).map_err(backend_error)?;
                batch.put(key.as_bytes(), value);
            }

            deadline.check()?;
            self.db.write(batch).map_err(backend_error)
        }

        #[cfg(not(feature = "rocksdb-backend"))]
        {
            let _ = (records, deadline);
            Err(SinkError::Unavailable("rocksdb".to_string()))
        }
    }

    fn latest_commit(&self, branch: &str) -> Result<Option<String>, SinkError> {
        #[cfg(feature = "rocksdb-backend")]
        {
            let key = format!("{}:{}", Table::Watermarks.name(), branch);
            let Some(value) = self
                .db
                .get(key.as_bytes())
                .map_err(|e| SinkError::QueryFailed(e.to_string()))?
            else {
                return Ok(None);
            };
            match serde_json::from_slice::<Record>(&value) {
                Ok(Record::Watermark(w)) => Ok(Some(w.commit_hash)),
                Ok(_) => Err(SinkError::QueryFailed(format!("unexpected value under {}", key))),
                Err(e) => Err(SinkError::QueryFailed(e.to_string())),
            }
        }

        #[cfg(not(feature = "rocksdb-backend"))]
        {
            let _ = branch;
            Err(SinkError::Unavailable("rocksdb".to_string()))
        }
    }

    fn reset(&mut self) -> Result<(), SinkError> {
        #[cfg(feature = "rocksdb-backend")]
        {
            let mut batch = WriteBatch::default();
            for entry in self.db.iterator(IteratorMode::Start) {
                let (key, _) = entry.map_err(|e| SinkError::ResetFailed(e.to_string()))?;
                batch.delete(key);
            }
            self.db
                .write(batch)
                .map_err(|e| SinkError::ResetFailed(e.to_string()))
        }

        #[cfg(not(feature = "rocksdb-backend"))]
        {
            Err(SinkError::Unavailable("rocksdb".to_string()))
        }
    }

    fn stats(&self) -> Result<StoreStats, SinkError> {
        #[cfg(feature = "rocksdb-backend")]
        {
            let mut stats = StoreStats::default();
            for entry in self.db.iterator(IteratorMode::Start) {
                let (key, _) = entry.map_err(|e| SinkError::QueryFailed(e.to_string()))?;
                let key = String::from_utf8_lossy(&key);
                if let Some(table) = key.split(':').next().and_then(Table::from_name) {
                    count_row(&mut stats, table);
                }
            }
            Ok(stats)
        }

        #[cfg(not(feature = "rocksdb-backend"))]
        {
            Err(SinkError::Unavailable("rocksdb".to_string()))
        }
    }
}


#[cfg(all(test, not(feature = "rocksdb-backend")))]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_without_feature() {
        let result = RocksDbBackend::open(Path::new("/tmp/git2base-rocksdb"));
        assert!(matches!(result, Err(SinkError::Unavailable(_))));
    }
}
