use super::{Backend, Deadline, Table, owner_columns};
use crate::error::SinkError;
use crate::types::{DiffSide, Record, StoreStats};
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior, params};
use std::path::{Path, PathBuf};
use std::time::Duration;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS commits (
    hash            TEXT PRIMARY KEY,
    branch          TEXT NOT NULL,
    message         TEXT NOT NULL,
    author_name     TEXT NOT NULL,
    author_email    TEXT NOT NULL,
    author_time     INTEGER NOT NULL,
    committer_name  TEXT NOT NULL,
    committer_email TEXT NOT NULL,
    commit_time     INTEGER NOT NULL,
    parent_hashes   TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS files (
    commit_hash TEXT NOT NULL,
    path        TEXT NOT NULL,
    file_type   TEXT NOT NULL,
    tech_stack  TEXT,
    change_type TEXT,
    char_length INTEGER NOT NULL,
    line_count  INTEGER NOT NULL,
    blob_hash   TEXT NOT NULL,
    PRIMARY KEY (commit_hash, path)
);
CREATE TABLE IF NOT EXISTS diff_files (
    old_commit      TEXT NOT NULL,
    new_commit      TEXT NOT NULL,
    path            TEXT NOT NULL,
    old_path        TEXT,
    file_type       TEXT NOT NULL,
    tech_stack      TEXT,
    change_type     TEXT NOT NULL,
    old_blob_hash   TEXT,
    new_blob_hash   TEXT,
    old_char_length INTEGER,
    new_char_length INTEGER,
    old_line_count  INTEGER,
    new_line_count  INTEGER,
    old_content     TEXT,
    new_content     TEXT,
    PRIMARY KEY (old_commit, new_commit, path)
);
CREATE TABLE IF NOT EXISTS analyses (
    owner_kind  TEXT NOT NULL,
    owner_old   TEXT NOT NULL,
    owner_new   TEXT NOT NULL,
    path        TEXT NOT NULL,
    side_commit TEXT NOT NULL,
    analyzer    TEXT NOT NULL,
    count       INTEGER NOT NULL,
    findings    TEXT,
    PRIMARY KEY (owner_kind, owner_old, owner_new, path, side_commit, analyzer)
);
CREATE TABLE IF NOT EXISTS snapshots (
    blob_hash TEXT PRIMARY KEY,
    content   TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS watermarks (
    branch      TEXT PRIMARY KEY,
    commit_hash TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_commits_branch ON commits(branch);
CREATE INDEX IF NOT EXISTS idx_files_blob ON files(blob_hash);
";

fn write_failed(e: rusqlite::Error) -> SinkError {
    SinkError::WriteFailed(e.to_string())
}

fn query_failed(e: rusqlite::Error) -> SinkError {
    SinkError::QueryFailed(e.to_string())
}

/// SQLite backend: one IMMEDIATE transaction per batch
pub struct SqliteBackend {
    conn: Connection,
    path: PathBuf,
}

impl SqliteBackend {
    /// Open or create the database, waiting up to `busy_timeout` for locks
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self, SinkError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                SinkError::ConnectionFailed(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }

        let connect = |e: rusqlite::Error| {
            SinkError::ConnectionFailed(format!("{}: {}", path.display(), e))
        };
        let conn = Connection::open(path).map_err(connect)?;
        conn.busy_timeout(busy_timeout).map_err(connect)?;
        let _mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .map_err(connect)?;
        conn.execute_batch(SCHEMA).map_err(connect)?;

        tracing::debug!("Opened SQLite database at {}", path.display());
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn count(&self, table: Table) -> Result<usize, SinkError> {
        let sql = format!("SELECT COUNT(*) FROM {}", table.name());
        let count: i64 = self
            .conn
            .query_row(&sql, [], |row| row.get(0))
            .map_err(query_failed)?;
        Ok(count as usize)
    }
}

fn side_columns(side: Option<&DiffSide>) -> (Option<&str>, Option<i64>, Option<i64>, Option<&str>) {
    match side {
        Some(side) => (
            Some(side.blob_hash.as_str()),
            Some(side.char_length as i64),
            Some(side.line_count as i64),
            side.content.as_deref(),
        ),
        None => (None, None, None, None),
    }
}

fn insert_record(tx: &Transaction<'_>, record: &Record) -> rusqlite::Result<()> {
    match record {
        Record::Commit(c) => {
            tx.prepare_cached(
                "INSERT OR IGNORE INTO commits (hash, branch, message, author_name, author_email,
                 author_time, committer_name, committer_email, commit_time, parent_hashes)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )?
            .execute(params![
                c.hash,
                c.branch,
                c.message,
                c.author_name,
                c.author_email,
                c.author_time,
                c.committer_name,
                c.committer_email,
                c.commit_time,
                c.parent_hashes.join(" "),
            ])?;
        }
        Record::File(f) => {
            tx.prepare_cached(
                "INSERT OR IGNORE INTO files (commit_hash, path, file_type, tech_stack,
                 change_type, char_length, line_count, blob_hash)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?
            .execute(params![
                f.commit_hash,
                f.path,
                f.file_type,
                f.tech_stack,
                f.change_type.map(|c| c.code()),
                f.char_length as i64,
                f.line_count as i64,
                f.blob_hash,
            ])?;
        }
        Record::DiffFile(d) => {
            let (old_blob, old_chars, old_lines, old_content) = side_columns(d.sides.old());
            let (new_blob, new_chars, new_lines, new_content) = side_columns(d.sides.new_side());
            tx.prepare_cached(
                "INSERT OR IGNORE INTO diff_files (old_commit, new_commit, path, old_path,
                 file_type, tech_stack, change_type, old_blob_hash, new_blob_hash,
                 old_char_length, new_char_length, old_line_count, new_line_count,
                 old_content, new_content)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            )?
            .execute(params![
                d.old_commit,
                d.new_commit,
                d.path,
                d.old_path,
                d.file_type,
                d.tech_stack,
                d.change_type.code(),
                old_blob,
                new_blob,
                old_chars,
                new_chars,
                old_lines,
                new_lines,
                old_content,
                new_content,
            ])?;
        }
        Record::Analysis(a) => {
            let (kind, old, new, path) = owner_columns(&a.owner);
            let findings = a
                .findings
                .as_ref()
                .map(serde_json::to_string)
                .transpose()
                .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
            tx.prepare_cached(
                "INSERT OR IGNORE INTO analyses (owner_kind, owner_old, owner_new, path,
                 side_commit, analyzer, count, findings)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?
            .execute(params![
                kind,
                old,
                new,
                path,
                a.side_commit,
                a.analyzer,
                a.count as i64,
                findings,
            ])?;
        }
        Record::Snapshot(s) => {
            tx.prepare_cached(
                "INSERT OR IGNORE INTO snapshots (blob_hash, content) VALUES (?1, ?2)",
            )?
            .execute(params![s.blob_hash, s.content])?;
        }
        Record::Watermark(w) => {
            tx.prepare_cached(
                "INSERT INTO watermarks (branch, commit_hash, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(branch) DO UPDATE SET
                     commit_hash = excluded.commit_hash,
                     updated_at = excluded.updated_at",
            )?
            .execute(params![w.branch, w.commit_hash, chrono::Utc::now().to_rfc3339()])?;
        }
    }
    Ok(())
}

impl Backend for SqliteBackend {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn write_batch(&mut self, records: &[Record], deadline: Deadline) -> Result<(), SinkError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(write_failed)?;

        for record in records {
            insert_record(&tx, record).map_err(write_failed)?;
        }

        // Rollback happens automatically when the transaction is dropped
        deadline.check()?;
        tx.commit().map_err(write_failed)
    }

    fn latest_commit(&self, branch: &str) -> Result<Option<String>, SinkError> {
        self.conn
            .query_row(
                "SELECT commit_hash FROM watermarks WHERE branch = ?1",
                params![branch],
                |row| row.get(0),
            )
            .optional()
            .map_err(query_failed)
    }

    fn reset(&mut self) -> Result<(), SinkError> {
        let reset_failed = |e: rusqlite::Error| SinkError::ResetFailed(e.to_string());
        let tx = self.conn.transaction().map_err(reset_failed)?;
        for table in Table::ALL {
            tx.execute(&format!("DELETE FROM {}", table.name()), [])
                .map_err(reset_failed)?;
        }
        tx.commit().map_err(reset_failed)
    }

    fn stats(&self) -> Result<StoreStats, SinkError> {
        Ok(StoreStats {
            commits: self.count(Table::Commits)?,
            files: self.count(Table::Files)?,
            diff_files: self.count(Table::DiffFiles)?,
            analyses: self.count(Table::Analyses)?,
            snapshots: self.count(Table::Snapshots)?,
            watermarks: self.count(Table::Watermarks)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        AnalysisOwner, AnalysisResult, ChangeType, DiffFileRecord, DiffSides, FileRecord,
        FileSnapshot, Watermark,
    };
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> SqliteBackend {
        SqliteBackend::open(&dir.path().join("out/git2base.db"), Duration::from_secs(5)).unwrap()
    }

    fn deadline() -> Deadline {
        Deadline::after(Duration::from_secs(30))
    }

    fn file(commit: &str, path: &str) -> Record {
        Record::File(FileRecord {
            commit_hash: commit.to_string(),
            path: path.to_string(),
            file_type: "rs".to_string(),
            tech_stack: Some("Rust".to_string()),
            change_type: Some(ChangeType::Added),
            char_length: 10,
            line_count: 2,
            blob_hash: "b1".to_string(),
        })
    }

    fn watermark(commit: &str) -> Record {
        Record::Watermark(Watermark {
            branch: "main".to_string(),
            commit_hash: commit.to_string(),
        })
    }

    #[test]
    fn test_write_and_query() {
        let dir = TempDir::new().unwrap();
        let mut backend = open(&dir);

        let diff = Record::DiffFile(DiffFileRecord {
            old_commit: "c1".to_string(),
            new_commit: "c2".to_string(),
            path: "gone.rs".to_string(),
            old_path: None,
            file_type: "rs".to_string(),
            tech_stack: None,
            change_type: ChangeType::Deleted,
            sides: DiffSides::Deleted {
                old: DiffSide {
                    blob_hash: "b0".to_string(),
                    char_length: 4,
                    line_count: 1,
                    content: Some("old\n".to_string()),
                },
            },
        });
        let analysis = Record::Analysis(AnalysisResult {
            owner: AnalysisOwner::File {
                commit: "c1".to_string(),
                path: "a.rs".to_string(),
            },
            side_commit: "c1".to_string(),
            analyzer: "Lines".to_string(),
            count: 2,
            findings: None,
        });
        let snapshot = Record::Snapshot(FileSnapshot {
            blob_hash: "b1".to_string(),
            content: "fn main() {}".to_string(),
        });

        backend
            .write_batch(
                &[file("c1", "a.rs"), diff, analysis, snapshot, watermark("c1")],
                deadline(),
            )
            .unwrap();

        let stats = backend.stats().unwrap();
        assert_eq!(stats.files, 1);
        assert_eq!(stats.diff_files, 1);
        assert_eq!(stats.analyses, 1);
        assert_eq!(stats.snapshots, 1);
        assert_eq!(backend.latest_commit("main").unwrap().as_deref(), Some("c1"));

        let new_blob: Option<String> = backend
            .conn
            .query_row("SELECT new_blob_hash FROM diff_files", [], |row| row.get(0))
            .unwrap();
        assert_eq!(new_blob, None);
    }

    #[test]
    fn test_duplicate_identity_ignored() {
        let dir = TempDir::new().unwrap();
        let mut backend = open(&dir);

        backend.write_batch(&[file("c1", "a.rs")], deadline()).unwrap();
        backend
            .write_batch(&[file("c1", "a.rs"), file("c1", "b.rs")], deadline())
            .unwrap();
        assert_eq!(backend.stats().unwrap().files, 2);
    }

    #[test]
    fn test_expired_deadline_rolls_back() {
        let dir = TempDir::new().unwrap();
        let mut backend = open(&dir);

        backend
            .write_batch(&[file("c1", "a.rs"), watermark("c1")], deadline())
            .unwrap();

        let result = backend.write_batch(
            &[file("c2", "a.rs"), watermark("c2")],
            Deadline::after(Duration::ZERO),
        );
        assert!(matches!(result, Err(SinkError::WriteTimeout(0))));

        assert_eq!(backend.stats().unwrap().files, 1);
        assert_eq!(backend.latest_commit("main").unwrap().as_deref(), Some("c1"));
    }

    #[test]
    fn test_persists_across_reopen_and_reset() {
        let dir = TempDir::new().unwrap();
        {
            let mut backend = open(&dir);
            backend
                .write_batch(&[file("c1", "a.rs"), watermark("c1")], deadline())
                .unwrap();
        }

        let mut backend = open(&dir);
        assert_eq!(backend.latest_commit("main").unwrap().as_deref(), Some("c1"));

        backend.reset().unwrap();
        assert_eq!(backend.stats().unwrap(), StoreStats::default());
        assert_eq!(backend.latest_commit("main").unwrap(), None);
    }
}
