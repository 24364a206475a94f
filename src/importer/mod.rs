//! Incremental coordinator for git2base
//!
//! The [`Importer`] opens a repository once, builds the classifier, analysis
//! pipeline and worker pool from the configuration, and dispatches each
//! request to the history walker or the diff extractor. History walks resume
//! after the branch watermark the sink reports unless a starting commit is
//! given explicitly.
//!
//! # Example
//!
//! ```no_run
//! use git2base::config::Config;
//! use git2base::importer::{ImportMode, ImportRequest, Importer};
//! use git2base::sink::BatchSink;
//!
//! fn main() -> git2base::error::Result<()> {
//!     git2base::analyzer::register_builtin_analyzers();
//!     let config = Config::default();
//!     let importer = Importer::new(config.clone(), ".", true)?;
//!     let mut sink = BatchSink::open(&config.output)?;
//!
//!     let summary = importer.run(&ImportRequest::history(None), &mut sink)?;
//!     println!("{}", summary);
//!     Ok(())
//! }
//! ```

use crate::analyzer::AnalysisPipeline;
use crate::classifier::Classifier;
use crate::config::Config;
use crate::error::{Git2BaseError, GitError, Result};
use crate::git::{
    DiffEndpoint, DiffExtractor, ExtractContext, GitRepo, HistoryWalker, SnapshotReader,
    WalkRequest,
};
use crate::sink::BatchSink;
use crate::types::RunSummary;
use git2::Oid;
use std::path::Path;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// What one invocation extracts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportMode {
    /// Walk the branch after `start` (or the stored watermark) up to `end`
    History {
        start: Option<String>,
        end: Option<String>,
    },
    /// One commit's full inventory; the watermark is left alone
    Snapshot { commit: String },
    /// Changed files between two commits of the same branch
    Diff { old: String, new: String },
    /// Changed files between the tips of two branches
    DiffBranches { base: String, target: String },
}

impl ImportMode {
    pub fn name(&self) -> &'static str {
        match self {
            ImportMode::History { .. } => "history",
            ImportMode::Snapshot { .. } => "snapshot",
            ImportMode::Diff { .. } => "diff",
            ImportMode::DiffBranches { .. } => "diff-branch",
        }
    }
}

/// A mode plus the options shared by every mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRequest {
    /// Branch to read; `None` uses the checked-out branch
    pub branch: Option<String>,
    /// `None` with `reset` only clears the store
    pub mode: Option<ImportMode>,
    /// Clear every persisted record before extracting
    pub reset: bool,
}

impl ImportRequest {
    /// Incremental history walk of `branch`
    pub fn history(branch: Option<String>) -> Self {
        Self {
            branch,
            mode: Some(ImportMode::History {
                start: None,
                end: None,
            }),
            reset: false,
        }
    }

    pub fn with_mode(mut self, mode: ImportMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_reset(mut self, reset: bool) -> Self {
        self.reset = reset;
        self
    }
}

/// Clear every table of the sink's backend
///
/// Needs no repository and no analyzers, so a reset-only request never
/// builds an [`Importer`].
pub fn reset_store(sink: &mut BatchSink) -> Result<RunSummary> {
    let started = Instant::now();
    let mut summary = RunSummary::new("reset");
    tracing::warn!("Resetting all persisted state in the {} backend", sink.backend_name());
    sink.reset()?;
    summary.duration_ms = started.elapsed().as_millis() as u64;
    Ok(summary)
}

/// Drives extraction runs against one repository
pub struct Importer {
    config: Config,
    repo: GitRepo,
    classifier: Classifier,
    pipeline: AnalysisPipeline,
    pool: rayon::ThreadPool,
    cancel: CancellationToken,
}

impl Importer {
    /// Open the repository and build the pipeline from the process-wide registry
    ///
    /// With `analysis` off no analyzer runs, and analyzer kinds are not
    /// checked against the registry.
    pub fn new<P: AsRef<Path>>(config: Config, repo_path: P, analysis: bool) -> Result<Self> {
        let pipeline = if analysis {
            AnalysisPipeline::from_config(&config.analyzers)?
        } else {
            AnalysisPipeline::disabled()
        };
        Self::with_pipeline(config, repo_path, pipeline)
    }

    /// Open the repository with an already-built analysis pipeline
    pub fn with_pipeline<P: AsRef<Path>>(
        config: Config,
        repo_path: P,
        pipeline: AnalysisPipeline,
    ) -> Result<Self> {
        let repo = GitRepo::discover(repo_path)?;
        let classifier = config.classifier()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.extraction.workers)
            .thread_name(|i| format!("git2base-worker-{}", i))
            .build()
            .map_err(|e| Git2BaseError::other(format!("Failed to build worker pool: {}", e)))?;

        tracing::debug!(
            "Importer ready: {} analyzers, {} workers",
            pipeline.len(),
            pool.current_num_threads()
        );

        Ok(Self {
            config,
            repo,
            classifier,
            pipeline,
            pool,
            cancel: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn repo(&self) -> &GitRepo {
        &self.repo
    }

    pub fn pipeline(&self) -> &AnalysisPipeline {
        &self.pipeline
    }

    /// Token that stops the run at the next batch boundary when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn context(&self) -> ExtractContext<'_> {
        ExtractContext {
            classifier: &self.classifier,
            pipeline: &self.pipeline,
            reader: SnapshotReader::new(self.config.extraction.max_blob_size),
            save_snapshots: self.config.extraction.save_snapshots,
            pool: &self.pool,
        }
    }

    fn branch_or_current(&self, branch: Option<&str>) -> Result<String> {
        match branch {
            Some(branch) => Ok(branch.to_string()),
            None => Ok(self.repo.current_branch()?),
        }
    }

    /// Execute one request: optional reset first, then the selected mode
    pub fn run(&self, request: &ImportRequest, sink: &mut BatchSink) -> Result<RunSummary> {
        let started = Instant::now();
        let mode_name = request.mode.as_ref().map_or("reset", ImportMode::name);
        let mut summary = RunSummary::new(mode_name);

        if request.reset {
            reset_store(sink)?;
        }

        let result = match &request.mode {
            None => Ok(()),
            Some(mode) => {
                let branch = self.branch_or_current(request.branch.as_deref())?;
                self.dispatch(mode, &branch, sink, &mut summary)
            }
        };

        summary.duration_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok(()) => {
                tracing::info!(
                    "{} finished: {} records in {} batches, {} degraded",
                    mode_name,
                    summary.records_written(),
                    summary.batches,
                    summary.degraded.len()
                );
                Ok(summary)
            }
            Err(e) => {
                tracing::error!(
                    "{} failed after {} committed batches: {}",
                    mode_name,
                    summary.batches,
                    e
                );
                Err(e)
            }
        }
    }

    fn dispatch(
        &self,
        mode: &ImportMode,
        branch: &str,
        sink: &mut BatchSink,
        summary: &mut RunSummary,
    ) -> Result<()> {
        match mode {
            ImportMode::History { start, end } => {
                self.history(branch, start.as_deref(), end.as_deref(), sink, summary)
            }
            ImportMode::Snapshot { commit } => self.snapshot(branch, commit, sink, summary),
            ImportMode::Diff { old, new } => self.diff(branch, old, new, sink, summary),
            ImportMode::DiffBranches { base, target } => {
                self.diff_branches(base, target, sink, summary)
            }
        }
    }

    /// Walk `branch` after `start`, or after its stored watermark when `start` is `None`
    pub fn history(
        &self,
        branch: &str,
        start: Option<&str>,
        end: Option<&str>,
        sink: &mut BatchSink,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let end = match end {
            Some(reference) => {
                let oid = self.repo.resolve_commit(reference)?;
                self.repo.ensure_on_branch(oid, branch)?;
                oid
            }
            None => self.repo.branch_tip(branch)?,
        };

        let boundary = match start {
            Some(reference) => Some(self.repo.resolve_commit(reference)?),
            None => self.stored_boundary(branch, end, sink)?,
        };

        let ctx = self.context();
        let mut walker = HistoryWalker::new(&self.repo, &ctx, self.config.extraction.walk_mode);
        let request = WalkRequest {
            branch: branch.to_string(),
            boundary,
            end: Some(end),
        };
        walker.run(&request, sink, &self.cancel, summary)
    }

    /// Resume boundary from the sink's watermark for `branch`
    ///
    /// A watermark commit the repository no longer has is reported like one
    /// that is no longer an ancestor of the tip.
    fn stored_boundary(&self, branch: &str, end: Oid, sink: &BatchSink) -> Result<Option<Oid>> {
        let Some(stored) = sink.latest_commit(branch)? else {
            tracing::info!("No prior extraction of '{}', walking from the root", branch);
            return Ok(None);
        };

        match self.repo.resolve_commit(&stored) {
            Ok(oid) => {
                tracing::info!("Resuming '{}' after {}", branch, stored);
                Ok(Some(oid))
            }
            Err(GitError::UnknownCommit(_)) => Err(GitError::InvalidResumeBoundary {
                boundary: stored,
                end: end.to_string(),
            }
            .into()),
            Err(e) => Err(e.into()),
        }
    }

    /// Extract one commit of `branch` without moving its watermark
    pub fn snapshot(
        &self,
        branch: &str,
        commit: &str,
        sink: &mut BatchSink,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let oid = self.repo.resolve_commit(commit)?;
        self.repo.ensure_on_branch(oid, branch)?;

        let ctx = self.context();
        HistoryWalker::new(&self.repo, &ctx, self.config.extraction.walk_mode)
            .snapshot(oid, branch, sink, summary)
    }

    /// Diff two commits that both belong to `branch`
    pub fn diff(
        &self,
        branch: &str,
        old: &str,
        new: &str,
        sink: &mut BatchSink,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let old = DiffEndpoint::resolve(&self.repo, old, branch)?;
        let new = DiffEndpoint::resolve(&self.repo, new, branch)?;
        self.repo.ensure_on_branch(old.oid, branch)?;
        self.repo.ensure_on_branch(new.oid, branch)?;
        self.extract_diff(&old, &new, sink, summary)
    }

    /// Diff the tips of two branches
    pub fn diff_branches(
        &self,
        base: &str,
        target: &str,
        sink: &mut BatchSink,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let old = DiffEndpoint {
            oid: self.repo.branch_tip(base)?,
            branch: base.to_string(),
        };
        let new = DiffEndpoint {
            oid: self.repo.branch_tip(target)?,
            branch: target.to_string(),
        };
        self.extract_diff(&old, &new, sink, summary)
    }

    fn extract_diff(
        &self,
        old: &DiffEndpoint,
        new: &DiffEndpoint,
        sink: &mut BatchSink,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let ctx = self.context();
        DiffExtractor::new(&self.repo, &ctx, self.config.extraction.diff_batch_size)
            .run(old, new, sink, &self.cancel, summary)
    }
}
