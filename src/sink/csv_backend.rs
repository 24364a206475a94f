use super::{Backend, Deadline, Table, count_row, identity_key, owner_columns};
use crate::error::SinkError;
use crate::types::{DiffSide, Record, StoreStats};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

const SEGMENT_PREFIX: &str = "segment-";

fn headers(table: Table) -> &'static [&'static str] {
    match table {
        Table::Commits => &[
            "hash",
            "branch",
            "message",
            "author_name",
            "author_email",
            "author_time",
            "committer_name",
            "committer_email",
            "commit_time",
            "parent_hashes",
        ],
        Table::Files => &[
            "commit_hash",
            "path",
            "file_type",
            "tech_stack",
            "change_type",
            "char_length",
            "line_count",
            "blob_hash",
        ],
        Table::DiffFiles => &[
            "old_commit",
            "new_commit",
            "path",
            "old_path",
            "file_type",
            "tech_stack",
            "change_type",
            "old_blob_hash",
            "new_blob_hash",
            "old_char_length",
            "new_char_length",
            "old_line_count",
            "new_line_count",
            "old_content",
            "new_content",
            "old_content_present",
            "new_content_present",
        ],
        Table::Analyses => &[
            "owner_kind",
            "owner_old",
            "owner_new",
            "path",
            "side_commit",
            "analyzer",
            "count",
            "findings",
        ],
        Table::Snapshots => &["blob_hash", "content"],
        Table::Watermarks => &["branch", "commit_hash", "updated_at"],
    }
}

/// Leading columns that form the identity of a row
fn key_columns(table: Table) -> usize {
    match table {
        Table::Commits | Table::Snapshots | Table::Watermarks => 1,
        Table::Files => 2,
        Table::DiffFiles => 3,
        Table::Analyses => 6,
    }
}

/// Blob, metrics, content and content presence of one diff side
///
/// An empty content cell is ambiguous on its own: the presence column tells a
/// null snapshot (`false`) from an empty file (`true`). Absent sides leave
/// every column empty.
fn side_fields(side: Option<&DiffSide>) -> [String; 5] {
    match side {
        Some(side) => [
            side.blob_hash.clone(),
            side.char_length.to_string(),
            side.line_count.to_string(),
            side.content.clone().unwrap_or_default(),
            side.content.is_some().to_string(),
        ],
        None => Default::default(),
    }
}

fn row(record: &Record) -> Result<Vec<String>, SinkError> {
    Ok(match record {
        Record::Commit(c) => vec![
            c.hash.clone(),
            c.branch.clone(),
            c.message.clone(),
            c.author_name.clone(),
            c.author_email.clone(),
            c.author_time.to_string(),
            c.committer_name.clone(),
            c.committer_email.clone(),
            c.commit_time.to_string(),
            c.parent_hashes.join(" "),
        ],
        Record::File(f) => vec![
            f.commit_hash.clone(),
            f.path.clone(),
            f.file_type.clone(),
            f.tech_stack.clone().unwrap_or_default(),
            f.change_type.map(|c| c.code().to_string()).unwrap_or_default(),
            f.char_length.to_string(),
            f.line_count.to_string(),
            f.blob_hash.clone(),
        ],
        Record::DiffFile(d) => {
            let [old_blob, old_chars, old_lines, old_content, old_present] =
                side_fields(d.sides.old());
            let [new_blob, new_chars, new_lines, new_content, new_present] =
                side_fields(d.sides.new_side());
            vec![
                d.old_commit.clone(),
                d.new_commit.clone(),
                d.path.clone(),
                d.old_path.clone().unwrap_or_default(),
                d.file_type.clone(),
                d.tech_stack.clone().unwrap_or_default(),
                d.change_type.code().to_string(),
                old_blob,
                new_blob,
                old_chars,
                new_chars,
                old_lines,
                new_lines,
                old_content,
                new_content,
                old_present,
                new_present,
            ]
        }
        Record::Analysis(a) => {
            let (kind, old, new, path) = owner_columns(&a.owner);
            let findings = match &a.findings {
                Some(findings) => serde_json::to_string(findings)
                    .map_err(|e| SinkError::WriteFailed(e.to_string()))?,
                None => String::new(),
            };
            vec![
                kind.to_string(),
                old.to_string(),
                new.to_string(),
                path.to_string(),
                a.side_commit.clone(),
                a.analyzer.clone(),
                a.count.to_string(),
                findings,
            ]
        }
        Record::Snapshot(s) => vec![s.blob_hash.clone(), s.content.clone()],
        Record::Watermark(w) => vec![
            w.branch.clone(),
            w.commit_hash.clone(),
            chrono::Utc::now().to_rfc3339(),
        ],
    })
}

fn io_failed(context: &str, path: &Path, e: impl std::fmt::Display) -> SinkError {
    SinkError::WriteFailed(format!("{} {}: {}", context, path.display(), e))
}

/// Flat-file backend writing one directory of quoted CSV files per batch
///
/// A batch is staged in a hidden `.segment-N.tmp` directory and renamed to
/// `segment-NNNNNNNN` once every file is written. Readers only ever look at
/// renamed segments, so a batch is visible entirely or not at all.
pub struct CsvBackend {
    root: PathBuf,
    next_segment: u64,
    keys: HashSet<String>,
    watermarks: BTreeMap<String, String>,
    stats: StoreStats,
}

impl CsvBackend {
    /// Open the output directory, discarding stale staging directories and
    /// loading identities of already written rows
    pub fn open(root: &Path) -> Result<Self, SinkError> {
        fs::create_dir_all(root).map_err(|e| {
            SinkError::ConnectionFailed(format!("Failed to create {}: {}", root.display(), e))
        })?;

        let mut backend = Self {
            root: root.to_path_buf(),
            next_segment: 1,
            keys: HashSet::new(),
            watermarks: BTreeMap::new(),
            stats: StoreStats::default(),
        };

        for segment in backend.scan()? {
            backend.load_segment(&segment)?;
        }

        tracing::debug!(
            "Opened CSV output at {} ({} segments)",
            root.display(),
            backend.next_segment - 1
        );
        Ok(backend)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Committed segment directories in order; removes staging leftovers
    fn scan(&mut self) -> Result<Vec<PathBuf>, SinkError> {
        let entries = fs::read_dir(&self.root)
            .map_err(|e| SinkError::ConnectionFailed(format!("{}: {}", self.root.display(), e)))?;

        let mut segments = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            let path = entry.path();
            if name.starts_with('.') && name.ends_with(".tmp") {
                tracing::warn!("Removing incomplete batch {}", path.display());
                fs::remove_dir_all(&path)
                    .map_err(|e| SinkError::ConnectionFailed(format!("{}: {}", path.display(), e)))?;
            } else if let Some(number) = name.strip_prefix(SEGMENT_PREFIX)
                && let Ok(number) = number.parse::<u64>()
            {
                segments.push((number, path));
            }
        }

        segments.sort();
        if let Some((last, _)) = segments.last() {
            self.next_segment = last + 1;
        }
        Ok(segments.into_iter().map(|(_, path)| path).collect())
    }

    fn load_segment(&mut self, segment: &Path) -> Result<(), SinkError> {
        for table in Table::ALL {
            let path = segment.join(format!("{}.csv", table.name()));
            if !path.exists() {
                continue;
            }
            let mut reader = csv::Reader::from_path(&path)
                .map_err(|e| SinkError::ConnectionFailed(format!("{}: {}", path.display(), e)))?;
            for row in reader.records() {
                let row = row
                    .map_err(|e| SinkError::ConnectionFailed(format!("{}: {}", path.display(), e)))?;
                if table == Table::Watermarks {
                    if let (Some(branch), Some(commit)) = (row.get(0), row.get(1)) {
                        self.watermarks.insert(branch.to_string(), commit.to_string());
                    }
                    continue;
                }
                let identity: Vec<&str> = row.iter().take(key_columns(table)).collect();
                if self
                    .keys
                    .insert(format!("{}:{}", table.name(), identity.join("\0")))
                {
                    count_row(&mut self.stats, table);
                }
            }
        }
        Ok(())
    }

    fn write_segment(
        &self,
        staging: &Path,
        target: &Path,
        rows: &BTreeMap<Table, Vec<Vec<String>>>,
        deadline: Deadline,
    ) -> Result<(), SinkError> {
        fs::create_dir(staging).map_err(|e| io_failed("Failed to create", staging, e))?;

        for (table, rows) in rows {
            let path = staging.join(format!("{}.csv", table.name()));
            let mut writer = csv::WriterBuilder::new()
                .quote_style(csv::QuoteStyle::Always)
                .from_path(&path)
                .map_err(|e| io_failed("Failed to create", &path, e))?;
            writer
                .write_record(headers(*table))
                .map_err(|e| io_failed("Failed to write", &path, e))?;
            for row in rows {
                writer
                    .write_record(row)
                    .map_err(|e| io_failed("Failed to write", &path, e))?;
            }
            writer
                .flush()
                .map_err(|e| io_failed("Failed to flush", &path, e))?;
        }

        deadline.check()?;
        fs::rename(staging, target).map_err(|e| io_failed("Failed to publish", target, e))
    }
}

impl Backend for CsvBackend {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn write_batch(&mut self, records: &[Record], deadline: Deadline) -> Result<(), SinkError> {
        let mut rows: BTreeMap<Table, Vec<Vec<String>>> = BTreeMap::new();
        let mut new_keys: Vec<(String, Table)> = Vec::new();
        let mut seen = HashSet::new();
        let mut watermarks = Vec::new();

        for record in records {
            let table = Table::of(record);
            if let Record::Watermark(w) = record {
                watermarks.push((w.branch.clone(), w.commit_hash.clone()));
            } else {
                let key = identity_key(record);
                if self.keys.contains(&key) || !seen.insert(key.clone()) {
                    continue;
                }
                new_keys.push((key, table));
            }
            rows.entry(table).or_default().push(row(record)?);
        }

        if rows.is_empty() {
            return deadline.check();
        }

        let name = format!("{}{:08}", SEGMENT_PREFIX, self.next_segment);
        let staging = self.root.join(format!(".{}.tmp", name));
        let target = self.root.join(&name);

        if let Err(e) = self.write_segment(&staging, &target, &rows, deadline) {
            if staging.exists()
                && let Err(cleanup) = fs::remove_dir_all(&staging)
            {
                tracing::warn!("Failed to remove {}: {}", staging.display(), cleanup);
            }
            return Err(e);
        }

        self.next_segment += 1;
        for (key, table) in new_keys {
            self.keys.insert(key);
            count_row(&mut self.stats, table);
        }
        self.watermarks.extend(watermarks);
        Ok(())
    }

    fn latest_commit(&self, branch: &str) -> Result<Option<String>, SinkError> {
        Ok(self.watermarks.get(branch).cloned())
    }

    fn reset(&mut self) -> Result<(), SinkError> {
        let entries = fs::read_dir(&self.root)
            .map_err(|e| SinkError::ResetFailed(format!("{}: {}", self.root.display(), e)))?;
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(SEGMENT_PREFIX) || (name.starts_with('.') && name.ends_with(".tmp"))
            {
                fs::remove_dir_all(entry.path()).map_err(|e| {
                    SinkError::ResetFailed(format!("{}: {}", entry.path().display(), e))
                })?;
            }
        }

        self.next_segment = 1;
        self.keys.clear();
        self.watermarks.clear();
        self.stats = StoreStats::default();
        Ok(())
    }

    fn stats(&self) -> Result<StoreStats, SinkError> {
        Ok(StoreStats {
            watermarks: self.watermarks.len(),
            ..self.stats.clone()
        })
    }
}
