use super::{Backend, Deadline, Table, count_row, identity_key};
use crate::error::SinkError;
use crate::types::{Record, StoreStats};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default, Clone)]
struct Tables {
    rows: BTreeMap<String, Record>,
}

/// In-process backend; clones share the same tables
///
/// Used for dry runs and tests. `with_failure_at(n)` makes every batch fail
/// while staging its n-th record, which exercises batch atomicity.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    tables: Arc<Mutex<Tables>>,
    fail_at: Option<usize>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure_at(record: usize) -> Self {
        Self {
            fail_at: Some(record),
            ..Self::default()
        }
    }

    /// Stop injecting failures; shares tables with `self`
    pub fn healed(&self) -> Self {
        Self {
            tables: Arc::clone(&self.tables),
            fail_at: None,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// All stored records of one table, in identity order
    pub fn records(&self, table: Table) -> Vec<Record> {
        self.lock()
            .rows
            .values()
            .filter(|r| Table::of(r) == table)
            .cloned()
            .collect()
    }
}

impl Backend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn write_batch(&mut self, records: &[Record], deadline: Deadline) -> Result<(), SinkError> {
        let mut staged: BTreeMap<String, Record> = BTreeMap::new();
        {
            let tables = self.lock();
            for (index, record) in records.iter().enumerate() {
                if self.fail_at == Some(index + 1) {
                    return Err(SinkError::WriteFailed(format!(
                        "injected failure at record {}",
                        index + 1
                    )));
                }
                let key = identity_key(record);
                let immutable = !matches!(record, Record::Watermark(_));
                if immutable && (tables.rows.contains_key(&key) || staged.contains_key(&key)) {
                    continue;
                }
                staged.insert(key, record.clone());
            }
        }

        deadline.check()?;
        self.lock().rows.extend(staged);
        Ok(())
    }

    fn latest_commit(&self, branch: &str) -> Result<Option<String>, SinkError> {
        let key = format!("{}:{}", Table::Watermarks.name(), branch);
        Ok(match self.lock().rows.get(&key) {
            Some(Record::Watermark(w)) => Some(w.commit_hash.clone()),
            _ => None,
        })
    }

    fn reset(&mut self) -> Result<(), SinkError> {
        self.lock().rows.clear();
        Ok(())
    }

    fn stats(&self) -> Result<StoreStats, SinkError> {
        let mut stats = StoreStats::default();
        for record in self.lock().rows.values() {
            count_row(&mut stats, Table::of(record));
        }
        Ok(stats)
    }
}
