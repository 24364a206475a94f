//! Repository access, content snapshots, history walking and diff extraction
//!
//! Everything under this module talks to git through `git2` and produces the
//! records defined in [`crate::types`]. Per-file work inside one batch runs on
//! the rayon pool carried by [`ExtractContext`]; each worker opens its own
//! repository handle.

/// Pairwise diff extraction between two commits
pub mod diff;
/// Repository access: references, commit graph, trees and tree diffs
pub mod repository;
/// Content retrieval for a (commit, path) pair
pub mod snapshot;
/// History walking with resumable boundaries
pub mod walker;

pub use diff::{DiffEndpoint, DiffExtractor};
pub use repository::{GitRepo, TreeChange, TreeEntry};
pub use snapshot::{ContentMetrics, Snapshot, SnapshotReader};
pub use walker::{HistoryWalker, WalkRequest, WalkState};

use crate::analyzer::AnalysisPipeline;
use crate::classifier::Classifier;
use crate::error::GitError;
use git2::Repository;
use rayon::prelude::*;

/// Shared collaborators for one extraction run
pub struct ExtractContext<'a> {
    pub classifier: &'a Classifier,
    pub pipeline: &'a AnalysisPipeline,
    pub reader: SnapshotReader,
    pub save_snapshots: bool,
    pub pool: &'a rayon::ThreadPool,
}

impl ExtractContext<'_> {
    /// Run `f` over `jobs` on the worker pool, keeping job order
    ///
    /// Each worker opens its own handle on the repository.
    pub(crate) fn process_parallel<J, T, F>(
        &self,
        repo: &GitRepo,
        jobs: &[J],
        f: F,
    ) -> Result<Vec<T>, GitError>
    where
        J: Sync,
        T: Send,
        F: Fn(&Repository, &J) -> T + Sync + Send,
    {
        let git_dir = repo.raw().path().to_path_buf();
        self.pool.install(|| {
            jobs.par_iter()
                .map_init(
                    || Repository::open(&git_dir),
                    |handle, job| match handle {
                        Ok(handle) => Ok(f(handle, job)),
                        Err(e) => Err(GitError::OpenFailed {
                            path: git_dir.display().to_string(),
                            reason: e.message().to_string(),
                        }),
                    },
                )
                .collect()
        })
    }
}
