/// Integration tests for pairwise diff extraction and batch atomicity
mod common;

use anyhow::Result;
use common::{TestRepo, diff, importer, memory_sink, sink_for};
use git2base::config::Config;
use git2base::error::{Git2BaseError, SinkError};
use git2base::sink::{Backend, CsvBackend, Deadline, MemoryBackend, Table};
use git2base::types::{Record, StoreStats};
use std::path::Path;
use tempfile::TempDir;

/// Fails its second batch partway through, after the first one landed
struct FailSecondBatch {
    healthy: MemoryBackend,
    failing: MemoryBackend,
    calls: usize,
}

impl FailSecondBatch {
    fn new(fail_at_record: usize) -> Self {
        let failing = MemoryBackend::with_failure_at(fail_at_record);
        Self {
            healthy: failing.healed(),
            failing,
            calls: 0,
        }
    }
}

impl Backend for FailSecondBatch {
    fn name(&self) -> &'static str {
        "fail-second-batch"
    }

    fn write_batch(&mut self, records: &[Record], deadline: Deadline) -> Result<(), SinkError> {
        self.calls += 1;
        if self.calls == 2 {
            self.failing.write_batch(records, deadline)
        } else {
            self.healthy.write_batch(records, deadline)
        }
    }

    fn latest_commit(&self, branch: &str) -> Result<Option<String>, SinkError> {
        self.healthy.latest_commit(branch)
    }

    fn reset(&mut self) -> Result<(), SinkError> {
        self.healthy.reset()
    }

    fn stats(&self) -> Result<StoreStats, SinkError> {
        self.healthy.stats()
    }
}

fn no_analysis() -> Config {
    let mut config = Config::default();
    config.analyzers.clear();
    config
}

#[test]
fn test_diff_batches_of_one_hundred() -> Result<()> {
    let repo = TestRepo::new();
    let old = repo.commit(&[("README", "start\n")], "base");
    let new = repo.commit_many("gen", "txt", 150, "bulk");
    let importer = importer(&repo, no_analysis());
    let backend = MemoryBackend::new();

    let summary = importer.run(&diff(old, new), &mut memory_sink(&backend))?;

    assert_eq!(summary.diff_files, 150);
    assert_eq!(summary.batches, 2);
    assert_eq!(backend.stats()?.commits, 2);
    assert_eq!(backend.stats()?.diff_files, 150);
    Ok(())
}

#[test]
fn test_failure_mid_batch_keeps_prior_batches() -> Result<()> {
    let repo = TestRepo::new();
    let old = repo.commit(&[("README", "start\n")], "base");
    let new = repo.commit_many("gen", "txt", 250, "bulk");
    let importer = importer(&repo, no_analysis());
    let backend = FailSecondBatch::new(50);
    let view = backend.healthy.clone();

    let result = importer.run(&diff(old, new), &mut sink_for(backend));

    assert!(matches!(
        result,
        Err(Git2BaseError::Sink(SinkError::WriteFailed(_)))
    ));
    let stats = view.stats()?;
    assert_eq!(stats.commits, 2);
    assert_eq!(stats.diff_files, 100);
    Ok(())
}

#[test]
fn test_diff_is_deterministic() -> Result<()> {
    let repo = TestRepo::new();
    let old = repo.commit_many("src", "py", 40, "v1");
    let new = repo.commit_many("src", "py", 60, "v2");
    let importer = importer(&repo, Config::default());

    let first = MemoryBackend::new();
    let second = MemoryBackend::new();
    importer.run(&diff(old, new), &mut memory_sink(&first))?;
    importer.run(&diff(old, new), &mut memory_sink(&second))?;

    assert_eq!(first.records(Table::DiffFiles), second.records(Table::DiffFiles));
    assert_eq!(first.records(Table::Analyses), second.records(Table::Analyses));
    Ok(())
}

fn segment_bytes(root: &Path) -> Result<Vec<(String, Vec<u8>)>> {
    let mut files = Vec::new();
    for segment in std::fs::read_dir(root)? {
        let segment = segment?.path();
        for file in std::fs::read_dir(&segment)? {
            let file = file?.path();
            let name = file.strip_prefix(root)?.display().to_string();
            files.push((name, std::fs::read(&file)?));
        }
    }
    files.sort();
    Ok(files)
}

#[test]
fn test_csv_output_is_byte_identical_across_runs() -> Result<()> {
    let repo = TestRepo::new();
    let old = repo.commit_many("conf", "xml", 30, "v1");
    let new = repo.commit_changes(
        &[("conf/f0001.xml", "<a><b/></a>"), ("extra.yml", "k: v\n")],
        &["conf/f0002.xml"],
        "v2",
    );
    let importer = importer(&repo, Config::default());

    let first = TempDir::new()?;
    let second = TempDir::new()?;
    importer.run(&diff(old, new), &mut sink_for(CsvBackend::open(first.path())?))?;
    importer.run(&diff(old, new), &mut sink_for(CsvBackend::open(second.path())?))?;

    let first = segment_bytes(first.path())?;
    assert!(!first.is_empty());
    assert_eq!(first, segment_bytes(second.path())?);
    Ok(())
}

#[test]
fn test_no_record_lacks_both_sides() -> Result<()> {
    let repo = TestRepo::new();
    let old = repo.commit(
        &[("a.txt", "a\n"), ("b.txt", "b\n"), ("c.txt", "c\n")],
        "old",
    );
    let new = repo.commit_changes(&[("a.txt", "a2\n"), ("d.txt", "d\n")], &["b.txt"], "new");
    let importer = importer(&repo, Config::default());
    let backend = MemoryBackend::new();

    importer.run(&diff(old, new), &mut memory_sink(&backend))?;

    let records = backend.records(Table::DiffFiles);
    assert_eq!(records.len(), 3);
    for record in records {
        let Record::DiffFile(record) = record else {
            panic!("unexpected record in diff_files");
        };
        assert!(record.sides.old().is_some() || record.sides.new_side().is_some());
    }
    Ok(())
}

#[test]
fn test_diff_rejects_commit_from_other_branch() -> Result<()> {
    let repo = TestRepo::new();
    let base = repo.commit(&[("a.txt", "a\n")], "base");
    repo.raw().branch("side", &repo.raw().find_commit(base)?, false)?;
    repo.raw().set_head("refs/heads/side")?;
    let side = repo.commit(&[("side.txt", "s\n")], "side only");
    repo.raw().set_head("refs/heads/main")?;
    let importer = importer(&repo, Config::default());
    let backend = MemoryBackend::new();

    let result = importer.run(&diff(base, side), &mut memory_sink(&backend));
    assert!(matches!(
        result,
        Err(Git2BaseError::Git(git2base::error::GitError::CommitNotOnBranch { .. }))
    ));
    assert_eq!(backend.stats()?, StoreStats::default());
    Ok(())
}
