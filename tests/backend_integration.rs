/// Integration tests running full imports against the persistent backends
mod common;

use anyhow::Result;
use common::{TestRepo, history, importer, sink_for};
use git2base::config::Config;
use git2base::importer::{ImportRequest, Importer, reset_store};
use git2base::sink::{Backend, BatchSink, CsvBackend, SqliteBackend};
use git2base::types::StoreStats;
use std::time::Duration;
use tempfile::TempDir;

fn three_commits(repo: &TestRepo) {
    repo.commit(&[("a.py", "print('a')\n"), ("pom.xml", "<p><v/></p>")], "c1");
    repo.commit(&[("b.sh", "echo b\n")], "c2");
    repo.commit(&[("a.py", "print('a2')\n")], "c3");
}

#[test]
fn test_csv_and_sqlite_agree() -> Result<()> {
    let repo = TestRepo::new();
    three_commits(&repo);
    let importer = importer(&repo, Config::default());
    let dir = TempDir::new()?;

    let csv_root = dir.path().join("csv");
    importer.run(&history(None, None), &mut sink_for(CsvBackend::open(&csv_root)?))?;

    let db = dir.path().join("out.db");
    importer.run(
        &history(None, None),
        &mut sink_for(SqliteBackend::open(&db, Duration::from_secs(5))?),
    )?;

    let csv = CsvBackend::open(&csv_root)?;
    let sqlite = SqliteBackend::open(&db, Duration::from_secs(5))?;
    assert_eq!(csv.stats()?, sqlite.stats()?);
    assert_eq!(csv.latest_commit("main")?, sqlite.latest_commit("main")?);
    assert_eq!(csv.stats()?.commits, 3);
    Ok(())
}

#[test]
fn test_csv_resume_from_segments() -> Result<()> {
    let repo = TestRepo::new();
    three_commits(&repo);
    let importer = importer(&repo, Config::default());
    let dir = TempDir::new()?;

    importer.run(&history(None, None), &mut sink_for(CsvBackend::open(dir.path())?))?;
    let before = CsvBackend::open(dir.path())?.stats()?;

    repo.commit(&[("c.py", "c\n")], "c4");
    let summary = importer.run(&history(None, None), &mut sink_for(CsvBackend::open(dir.path())?))?;

    assert_eq!(summary.commits, 1);
    let after = CsvBackend::open(dir.path())?.stats()?;
    assert_eq!(after.commits, before.commits + 1);
    Ok(())
}

#[test]
fn test_sqlite_write_timeout_aborts_run() -> Result<()> {
    let repo = TestRepo::new();
    three_commits(&repo);
    let importer = importer(&repo, Config::default());
    let dir = TempDir::new()?;
    let db = dir.path().join("out.db");

    let backend = SqliteBackend::open(&db, Duration::from_secs(5))?;
    let mut sink = BatchSink::new(Box::new(backend), Duration::ZERO);
    let result = importer.run(&history(None, None), &mut sink);

    assert!(result.is_err());
    let reopened = SqliteBackend::open(&db, Duration::from_secs(5))?;
    assert_eq!(reopened.stats()?, StoreStats::default());
    Ok(())
}

#[test]
fn test_reset_clears_sqlite() -> Result<()> {
    let repo = TestRepo::new();
    three_commits(&repo);
    let importer = importer(&repo, Config::default());
    let dir = TempDir::new()?;
    let db = dir.path().join("out.db");

    importer.run(
        &history(None, None),
        &mut sink_for(SqliteBackend::open(&db, Duration::from_secs(5))?),
    )?;

    let reset_only = ImportRequest {
        branch: None,
        mode: None,
        reset: true,
    };
    importer.run(
        &reset_only,
        &mut sink_for(SqliteBackend::open(&db, Duration::from_secs(5))?),
    )?;

    let reopened = SqliteBackend::open(&db, Duration::from_secs(5))?;
    assert_eq!(reopened.stats()?, StoreStats::default());
    assert_eq!(reopened.latest_commit("main")?, None);
    Ok(())
}

#[test]
fn test_reset_store_outside_any_repository() -> Result<()> {
    let repo = TestRepo::new();
    three_commits(&repo);
    let dir = TempDir::new()?;
    let db = dir.path().join("out.db");
    importer(&repo, Config::default()).run(
        &history(None, None),
        &mut sink_for(SqliteBackend::open(&db, Duration::from_secs(5))?),
    )?;

    // Not a git repository, so no importer can be built from it
    let elsewhere = TempDir::new()?;
    assert!(Importer::new(Config::default(), elsewhere.path(), false).is_err());

    let summary = reset_store(&mut sink_for(SqliteBackend::open(&db, Duration::from_secs(5))?))?;
    assert_eq!(summary.mode, "reset");
    assert_eq!(summary.records_written(), 0);

    let reopened = SqliteBackend::open(&db, Duration::from_secs(5))?;
    assert_eq!(reopened.stats()?, StoreStats::default());
    Ok(())
}
