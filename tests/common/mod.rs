//! Shared helpers for integration tests
#![allow(dead_code)]

use git2::{Oid, Repository, RepositoryInitOptions, ResetType, Signature, Time};
use git2base::analyzer::{AnalysisPipeline, AnalyzerRegistry};
use git2base::config::Config;
use git2base::importer::{ImportMode, ImportRequest, Importer};
use git2base::sink::{Backend, BatchSink, MemoryBackend};
use std::cell::Cell;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

/// Throw-away repository on branch `main` with deterministic timestamps
pub struct TestRepo {
    dir: TempDir,
    repo: Repository,
    tick: Cell<i64>,
}

impl TestRepo {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head("main");
        let repo = Repository::init_opts(dir.path(), &opts).unwrap();
        Self {
            dir,
            repo,
            tick: Cell::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn raw(&self) -> &Repository {
        &self.repo
    }

    pub fn commit(&self, files: &[(&str, &str)], message: &str) -> Oid {
        self.commit_changes(files, &[], message)
    }

    pub fn commit_changes(&self, writes: &[(&str, &str)], removes: &[&str], message: &str) -> Oid {
        let workdir = self.repo.workdir().unwrap().to_path_buf();
        let mut index = self.repo.index().unwrap();

        for (path, content) in writes {
            let full = workdir.join(path);
            if let Some(parent) = full.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(&full, content).unwrap();
            index.add_path(Path::new(path)).unwrap();
        }
        for path in removes {
            std::fs::remove_file(workdir.join(path)).unwrap();
            index.remove_path(Path::new(path)).unwrap();
        }
        index.write().unwrap();

        let tree = self.repo.find_tree(index.write_tree().unwrap()).unwrap();
        let tick = self.tick.get();
        self.tick.set(tick + 1);
        let sig = Signature::new(
            "Test Author",
            "test@example.com",
            &Time::new(1_700_000_000 + tick * 60, 0),
        )
        .unwrap();

        let parent = self
            .repo
            .head()
            .ok()
            .and_then(|head| head.peel_to_commit().ok());
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();

        self.repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .unwrap()
    }

    /// Commit `count` generated files named `dir/fNNNN.<ext>`
    pub fn commit_many(&self, dir: &str, ext: &str, count: usize, message: &str) -> Oid {
        let files: Vec<(String, String)> = (0..count)
            .map(|i| {
                (
                    format!("{}/f{:04}.{}", dir, i, ext),
                    format!("line {}\nrevision {}\n", i, message),
                )
            })
            .collect();
        let refs: Vec<(&str, &str)> = files
            .iter()
            .map(|(p, c)| (p.as_str(), c.as_str()))
            .collect();
        self.commit(&refs, message)
    }

    pub fn rewind(&self, oid: Oid) {
        let object = self.repo.find_object(oid, None).unwrap();
        self.repo.reset(&object, ResetType::Hard, None).unwrap();
    }
}

/// Importer over `repo` with the built-in analyzers and default stacks
pub fn importer(repo: &TestRepo, config: Config) -> Importer {
    let pipeline =
        AnalysisPipeline::with_registry(&AnalyzerRegistry::with_builtins(), &config.analyzers)
            .unwrap();
    Importer::with_pipeline(config, repo.path(), pipeline).unwrap()
}

pub fn sink_for(backend: impl Backend + 'static) -> BatchSink {
    BatchSink::new(Box::new(backend), Duration::from_secs(30))
}

pub fn memory_sink(backend: &MemoryBackend) -> BatchSink {
    sink_for(backend.clone())
}

pub fn history(start: Option<String>, end: Option<String>) -> ImportRequest {
    ImportRequest::history(Some("main".to_string())).with_mode(ImportMode::History { start, end })
}

pub fn diff(old: Oid, new: Oid) -> ImportRequest {
    ImportRequest::history(Some("main".to_string())).with_mode(ImportMode::Diff {
        old: old.to_string(),
        new: new.to_string(),
    })
}
