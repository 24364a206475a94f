//! Batched persistence of extracted records
//!
//! A [`BatchSink`] buffers records between `begin_batch` and `commit_batch`
//! and hands the whole buffer to a [`Backend`] in one call. Every backend
//! publishes a batch atomically: after a failed or timed-out write no record
//! of that batch is visible, and earlier batches are untouched.
//!
//! Immutable records (everything except watermarks) are written at most once
//! per identity; writing an identity that already exists is a silent no-op.

mod csv_backend;
mod lock;
mod memory;
mod rocksdb_backend;
mod sqlite_backend;

pub use csv_backend::CsvBackend;
pub use lock::RunLock;
pub use memory::MemoryBackend;
pub use rocksdb_backend::RocksDbBackend;
pub use sqlite_backend::SqliteBackend;

use crate::config::{BackendKind, OutputConfig};
use crate::error::SinkError;
use crate::types::{AnalysisOwner, Record, StoreStats};
use std::time::{Duration, Instant};

/// Latest instant at which a backend may still publish a batch
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
    timeout: Duration,
}

impl Deadline {
    pub fn after(timeout: Duration) -> Self {
        Self {
            at: Instant::now() + timeout,
            timeout,
        }
    }

    /// Fail with [`SinkError::WriteTimeout`] once the deadline has passed
    pub fn check(&self) -> Result<(), SinkError> {
        if Instant::now() >= self.at {
            Err(SinkError::WriteTimeout(self.timeout.as_secs()))
        } else {
            Ok(())
        }
    }

    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }
}

/// Storage engine behind the batch sink
pub trait Backend: Send {
    fn name(&self) -> &'static str;

    /// Persist all records as one atomic unit
    ///
    /// Implementations check `deadline` immediately before their commit
    /// point and discard the staged batch when it has passed.
    fn write_batch(&mut self, records: &[Record], deadline: Deadline) -> Result<(), SinkError>;

    /// Watermark commit of the latest history batch for `branch`
    fn latest_commit(&self, branch: &str) -> Result<Option<String>, SinkError>;

    /// Remove all persisted state
    fn reset(&mut self) -> Result<(), SinkError>;

    fn stats(&self) -> Result<StoreStats, SinkError>;
}

/// Logical table a record belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    Commits,
    Files,
    DiffFiles,
    Analyses,
    Snapshots,
    Watermarks,
}

impl Table {
    pub const ALL: [Table; 6] = [
        Table::Commits,
        Table::Files,
        Table::DiffFiles,
        Table::Analyses,
        Table::Snapshots,
        Table::Watermarks,
    ];

    pub fn of(record: &Record) -> Self {
        match record {
            Record::Commit(_) => Table::Commits,
            Record::File(_) => Table::Files,
            Record::DiffFile(_) => Table::DiffFiles,
            Record::Analysis(_) => Table::Analyses,
            Record::Snapshot(_) => Table::Snapshots,
            Record::Watermark(_) => Table::Watermarks,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Table::Commits => "commits",
            Table::Files => "files",
            Table::DiffFiles => "diff_files",
            Table::Analyses => "analyses",
            Table::Snapshots => "snapshots",
            Table::Watermarks => "watermarks",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Table::ALL.into_iter().find(|t| t.name() == name)
    }
}

/// Add one row to the per-table counts
pub(crate) fn count_row(stats: &mut StoreStats, table: Table) {
    match table {
        Table::Commits => stats.commits += 1,
        Table::Files => stats.files += 1,
        Table::DiffFiles => stats.diff_files += 1,
        Table::Analyses => stats.analyses += 1,
        Table::Snapshots => stats.snapshots += 1,
        Table::Watermarks => stats.watermarks += 1,
    }
}

/// Flattened owner columns: (kind, old commit, new commit, path)
///
/// A file owner uses its commit for both commit columns.
pub(crate) fn owner_columns(owner: &AnalysisOwner) -> (&'static str, &str, &str, &str) {
    match owner {
        AnalysisOwner::File { commit, path } => ("file", commit, commit, path),
        AnalysisOwner::Diff {
            old_commit,
            new_commit,
            path,
        } => ("diff", old_commit, new_commit, path),
    }
}

/// Identity key of a record, prefixed by its table
pub(crate) fn identity_key(record: &Record) -> String {
    let parts: Vec<&str> = match record {
        Record::Commit(c) => vec![c.hash.as_str()],
        Record::File(f) => vec![f.commit_hash.as_str(), f.path.as_str()],
        Record::DiffFile(d) => vec![d.old_commit.as_str(), d.new_commit.as_str(), d.path.as_str()],
        Record::Analysis(a) => {
            let (kind, old, new, path) = owner_columns(&a.owner);
            vec![kind, old, new, path, a.side_commit.as_str(), a.analyzer.as_str()]
        }
        Record::Snapshot(s) => vec![s.blob_hash.as_str()],
        Record::Watermark(w) => vec![w.branch.as_str()],
    };
    format!("{}:{}", Table::of(record).name(), parts.join("\0"))
}

/// Buffers records and flushes them to a backend as atomic batches
pub struct BatchSink {
    backend: Box<dyn Backend>,
    buffer: Option<Vec<Record>>,
    write_timeout: Duration,
    committed: usize,
    _lock: Option<RunLock>,
}

impl BatchSink {
    pub fn new(backend: Box<dyn Backend>, write_timeout: Duration) -> Self {
        Self {
            backend,
            buffer: None,
            write_timeout,
            committed: 0,
            _lock: None,
        }
    }

    /// Open the configured backend, holding the run lock for its target
    pub fn open(config: &OutputConfig) -> Result<Self, SinkError> {
        let timeout = Duration::from_secs(config.write_timeout_secs);
        let target = match config.backend {
            BackendKind::Csv => Some(&config.csv_path),
            BackendKind::Sqlite => Some(&config.sqlite_path),
            BackendKind::Rocksdb => Some(&config.rocksdb_path),
            BackendKind::Memory => None,
        };
        let lock = target
            .map(|path| RunLock::acquire(&path.display().to_string()))
            .transpose()?;

        let backend: Box<dyn Backend> = match config.backend {
            BackendKind::Csv => Box::new(CsvBackend::open(&config.csv_path)?),
            BackendKind::Sqlite => Box::new(SqliteBackend::open(&config.sqlite_path, timeout)?),
            BackendKind::Rocksdb => Box::new(RocksDbBackend::open(&config.rocksdb_path)?),
            BackendKind::Memory => Box::new(MemoryBackend::new()),
        };

        tracing::info!("Opened {} backend", backend.name());
        let mut sink = Self::new(backend, timeout);
        sink._lock = lock;
        Ok(sink)
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn is_open(&self) -> bool {
        self.buffer.is_some()
    }

    /// Records buffered in the open batch
    pub fn pending(&self) -> usize {
        self.buffer.as_ref().map_or(0, Vec::len)
    }

    /// Batches committed through this sink
    pub fn batches_committed(&self) -> usize {
        self.committed
    }

    pub fn begin_batch(&mut self) -> Result<(), SinkError> {
        if self.buffer.is_some() {
            return Err(SinkError::BatchAlreadyOpen);
        }
        self.buffer = Some(Vec::new());
        Ok(())
    }

    pub fn add(&mut self, record: Record) -> Result<(), SinkError> {
        self.buffer
            .as_mut()
            .ok_or(SinkError::NoActiveBatch)?
            .push(record);
        Ok(())
    }

    pub fn add_all(&mut self, records: impl IntoIterator<Item = Record>) -> Result<(), SinkError> {
        let buffer = self.buffer.as_mut().ok_or(SinkError::NoActiveBatch)?;
        buffer.extend(records);
        Ok(())
    }

    /// Write the open batch atomically and close it
    ///
    /// The batch is closed whether or not the write succeeds; a failed batch
    /// is discarded. Returns the number of records handed to the backend.
    pub fn commit_batch(&mut self) -> Result<usize, SinkError> {
        let records = self.buffer.take().ok_or(SinkError::NoActiveBatch)?;
        if records.is_empty() {
            return Ok(0);
        }

        let deadline = Deadline::after(self.write_timeout);
        match self.backend.write_batch(&records, deadline) {
            Ok(()) => {
                self.committed += 1;
                tracing::debug!(
                    "Committed batch {} ({} records) to {}",
                    self.committed,
                    records.len(),
                    self.backend.name()
                );
                Ok(records.len())
            }
            Err(e) => {
                tracing::warn!("Batch of {} records discarded: {}", records.len(), e);
                Err(e)
            }
        }
    }

    /// Discard the open batch without writing
    pub fn abort_batch(&mut self) {
        if let Some(records) = self.buffer.take() {
            tracing::debug!("Aborted batch of {} records", records.len());
        }
    }

    pub fn latest_commit(&self, branch: &str) -> Result<Option<String>, SinkError> {
        self.backend.latest_commit(branch)
    }

    pub fn reset(&mut self) -> Result<(), SinkError> {
        self.abort_batch();
        self.backend.reset()?;
        tracing::info!("Reset {} backend", self.backend.name());
        Ok(())
    }

    pub fn stats(&self) -> Result<StoreStats, SinkError> {
        self.backend.stats()
    }
}

impl Drop for BatchSink {
    fn drop(&mut self) {
        if let Some(records) = &self.buffer {
            tracing::warn!(
                "Sink dropped with an open batch, {} records discarded",
                records.len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Commit, Watermark};

    fn commit(hash: &str) -> Record {
        Record::Commit(Commit {
            hash: hash.to_string(),
            branch: "main".to_string(),
            message: "msg".to_string(),
            author_name: "a".to_string(),
            author_email: "a@example.com".to_string(),
            author_time: 0,
            committer_name: "a".to_string(),
            committer_email: "a@example.com".to_string(),
            commit_time: 0,
            parent_hashes: vec![],
        })
    }

    fn watermark(hash: &str) -> Record {
        Record::Watermark(Watermark {
            branch: "main".to_string(),
            commit_hash: hash.to_string(),
        })
    }

    fn sink(backend: &MemoryBackend) -> BatchSink {
        BatchSink::new(Box::new(backend.clone()), Duration::from_secs(30))
    }

    #[test]
    fn test_batch_lifecycle() {
        let backend = MemoryBackend::new();
        let mut sink = sink(&backend);

        assert!(matches!(sink.add(commit("a")), Err(SinkError::NoActiveBatch)));
        assert!(matches!(sink.commit_batch(), Err(SinkError::NoActiveBatch)));

        sink.begin_batch().unwrap();
        assert!(matches!(sink.begin_batch(), Err(SinkError::BatchAlreadyOpen)));
        sink.add(commit("a")).unwrap();
        sink.add(watermark("a")).unwrap();
        assert_eq!(sink.pending(), 2);
        assert_eq!(sink.commit_batch().unwrap(), 2);
        assert!(!sink.is_open());

        assert_eq!(sink.latest_commit("main").unwrap().as_deref(), Some("a"));
        assert_eq!(sink.batches_committed(), 1);
    }

    #[test]
    fn test_abort_discards() {
        let backend = MemoryBackend::new();
        let mut sink = sink(&backend);

        sink.begin_batch().unwrap();
        sink.add(commit("a")).unwrap();
        sink.abort_batch();

        assert!(!sink.is_open());
        assert_eq!(sink.stats().unwrap(), StoreStats::default());
    }

    #[test]
    fn test_failed_commit_closes_batch() {
        let backend = MemoryBackend::with_failure_at(2);
        let mut sink = sink(&backend);

        sink.begin_batch().unwrap();
        sink.add_all([commit("a"), commit("b"), commit("c")]).unwrap();
        assert!(sink.commit_batch().is_err());
        assert!(!sink.is_open());
        assert_eq!(backend.stats().unwrap().commits, 0);
    }

    #[test]
    fn test_deadline() {
        assert!(matches!(
            Deadline::after(Duration::ZERO).check(),
            Err(SinkError::WriteTimeout(0))
        ));
        let deadline = Deadline::after(Duration::from_secs(60));
        assert!(deadline.check().is_ok());
        assert!(deadline.remaining() > Duration::from_secs(50));
    }

    #[test]
    fn test_identity_keys() {
        assert_eq!(identity_key(&commit("abc")), "commits:abc");
        assert_eq!(identity_key(&watermark("abc")), "watermarks:main");
        assert_eq!(Table::from_name("diff_files"), Some(Table::DiffFiles));
        assert_eq!(Table::from_name("nope"), None);
    }
}
