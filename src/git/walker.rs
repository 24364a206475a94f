use super::{ExtractContext, GitRepo};
use crate::classifier::normalize_change_type;
use crate::config::WalkMode;
use crate::error::{ClassifyError, Git2BaseError, Result};
use crate::sink::BatchSink;
use crate::types::{
    AnalysisOwner, AnalysisResult, ChangeType, Commit, DegradedKind, DegradedRecord, FileRecord,
    FileSnapshot, Record, RunSummary, Watermark,
};
use git2::{Oid, Repository};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

/// Lifecycle of one walker invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkState {
    Start,
    Enumerating,
    Flushing,
    Done,
    Failed,
}

/// What to walk: commits of `branch` after `boundary` up to `end`
#[derive(Debug, Clone)]
pub struct WalkRequest {
    pub branch: String,
    /// Exclusive resume boundary; `None` walks from the root
    pub boundary: Option<Oid>,
    /// Inclusive end; `None` means the branch tip
    pub end: Option<Oid>,
}

struct FileJob {
    path: String,
    blob: Oid,
    change_type: Option<ChangeType>,
    /// Deleted files are recorded without reading content
    read: bool,
}

struct FileOutcome {
    record: FileRecord,
    analyses: Vec<AnalysisResult>,
    snapshot: Option<FileSnapshot>,
    degraded: Vec<DegradedRecord>,
}

struct CommitBatch {
    commit: Commit,
    files: Vec<FileOutcome>,
    degraded: Vec<DegradedRecord>,
}

/// Walks a branch oldest-first, flushing one batch per commit
pub struct HistoryWalker<'a> {
    repo: &'a GitRepo,
    ctx: &'a ExtractContext<'a>,
    mode: WalkMode,
    state: WalkState,
}

impl<'a> HistoryWalker<'a> {
    pub fn new(repo: &'a GitRepo, ctx: &'a ExtractContext<'a>, mode: WalkMode) -> Self {
        Self {
            repo,
            ctx,
            mode,
            state: WalkState::Start,
        }
    }

    pub fn state(&self) -> WalkState {
        self.state
    }

    /// Walk the requested range, advancing the branch watermark per commit
    ///
    /// Batches committed before a failure stay durable; the open batch, if
    /// any, is aborted.
    pub fn run(
        &mut self,
        request: &WalkRequest,
        sink: &mut BatchSink,
        cancel: &CancellationToken,
        summary: &mut RunSummary,
    ) -> Result<()> {
        self.state = WalkState::Start;
        let result = self.walk(request, sink, cancel, summary);
        self.finish(result, sink)
    }

    /// Extract one commit's inventory without touching the watermark
    pub fn snapshot(
        &mut self,
        commit: Oid,
        branch: &str,
        sink: &mut BatchSink,
        summary: &mut RunSummary,
    ) -> Result<()> {
        self.state = WalkState::Enumerating;
        let result = self
            .extract_commit(commit, branch)
            .and_then(|batch| self.flush(batch, None, sink, summary));
        self.finish(result, sink)
    }

    fn finish(&mut self, result: Result<()>, sink: &mut BatchSink) -> Result<()> {
        match result {
            Ok(()) => {
                self.state = WalkState::Done;
                Ok(())
            }
            Err(e) => {
                self.state = WalkState::Failed;
                sink.abort_batch();
                Err(e)
            }
        }
    }

    fn walk(
        &mut self,
        request: &WalkRequest,
        sink: &mut BatchSink,
        cancel: &CancellationToken,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let end = match request.end {
            Some(end) => end,
            None => self.repo.branch_tip(&request.branch)?,
        };
        let commits = self.repo.commits_between(request.boundary, end)?;

        match request.boundary {
            Some(boundary) => tracing::info!(
                "Walking {} commits on '{}' after {}",
                commits.len(),
                request.branch,
                boundary
            ),
            None => tracing::info!(
                "Walking {} commits on '{}' from the root",
                commits.len(),
                request.branch
            ),
        }

        self.state = WalkState::Enumerating;
        for (index, oid) in commits.iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::info!("Cancelled after {} of {} commits", index, commits.len());
                return Err(Git2BaseError::Cancelled);
            }

            let batch = self.extract_commit(*oid, &request.branch)?;
            let watermark = Watermark {
                branch: request.branch.clone(),
                commit_hash: oid.to_string(),
            };
            self.flush(batch, Some(watermark), sink, summary)?;
            self.state = WalkState::Enumerating;

            tracing::debug!("[{}/{}] extracted {}", index + 1, commits.len(), oid);
        }

        Ok(())
    }

    fn extract_commit(&self, oid: Oid, branch: &str) -> Result<CommitBatch> {
        let commit = self.repo.commit_record(oid, branch)?;
        let parent = self.repo.first_parent(oid)?;
        let changes = self.repo.changes(parent, oid)?;
        let classifier = self.ctx.classifier;
        let mut degraded = Vec::new();

        let mut unknown = |path: &str, e: ClassifyError| {
            tracing::warn!("Skipping {}@{}: {}", path, oid, e);
            degraded.push(DegradedRecord {
                kind: DegradedKind::UnknownChangeType,
                commit: oid.to_string(),
                path: path.to_string(),
                analyzer: None,
                reason: e.to_string(),
            });
        };

        let jobs: Vec<FileJob> = match self.mode {
            WalkMode::Snapshot => {
                let change_types: HashMap<&str, std::result::Result<ChangeType, ClassifyError>> =
                    changes
                        .iter()
                        .filter_map(|c| Some((c.new_path.as_deref()?, normalize_change_type(c.status))))
                        .collect();

                let mut jobs = Vec::new();
                for entry in self.repo.tree_entries(oid)? {
                    if !classifier.is_included(&entry.path) {
                        continue;
                    }
                    let change_type = match change_types.get(entry.path.as_str()) {
                        Some(Ok(change_type)) => Some(*change_type),
                        Some(Err(e)) => {
                            unknown(&entry.path, e.clone());
                            continue;
                        }
                        None => None,
                    };
                    jobs.push(FileJob {
                        path: entry.path,
                        blob: entry.blob,
                        change_type,
                        read: true,
                    });
                }
                jobs
            }
            WalkMode::Changes => {
                let mut jobs = Vec::new();
                for change in &changes {
                    let path = change.path();
                    if !classifier.is_included(path) {
                        continue;
                    }
                    let change_type = match normalize_change_type(change.status) {
                        Ok(change_type) => change_type,
                        Err(e) => {
                            unknown(path, e);
                            continue;
                        }
                    };
                    let deleted = change_type == ChangeType::Deleted;
                    let blob = if deleted { change.old_blob } else { change.new_blob };
                    if let Some(blob) = blob {
                        jobs.push(FileJob {
                            path: path.to_string(),
                            blob,
                            change_type: Some(change_type),
                            read: !deleted,
                        });
                    }
                }
                jobs
            }
        };

        let commit_hash = commit.hash.clone();
        let ctx = self.ctx;
        let mut files = ctx.process_parallel(self.repo, &jobs, |handle, job| {
            process_file(handle, ctx, &commit_hash, job)
        })?;
        files.sort_by(|a, b| a.record.path.cmp(&b.record.path));

        Ok(CommitBatch {
            commit,
            files,
            degraded,
        })
    }

    fn flush(
        &mut self,
        batch: CommitBatch,
        watermark: Option<Watermark>,
        sink: &mut BatchSink,
        summary: &mut RunSummary,
    ) -> Result<()> {
        self.state = WalkState::Flushing;

        let mut files = Vec::with_capacity(batch.files.len());
        let mut analyses = Vec::new();
        let mut snapshots = Vec::new();
        let mut degraded = batch.degraded;

        for outcome in batch.files {
            files.push(Record::File(outcome.record));
            analyses.extend(outcome.analyses.into_iter().map(Record::Analysis));
            snapshots.extend(outcome.snapshot.map(Record::Snapshot));
            degraded.extend(outcome.degraded);
        }

        let (file_count, analysis_count, snapshot_count) =
            (files.len(), analyses.len(), snapshots.len());

        sink.begin_batch()?;
        sink.add(Record::Commit(batch.commit))?;
        sink.add_all(files)?;
        sink.add_all(analyses)?;
        sink.add_all(snapshots)?;
        if let Some(watermark) = watermark {
            sink.add(Record::Watermark(watermark))?;
        }
        sink.commit_batch()?;

        summary.commits += 1;
        summary.files += file_count;
        summary.analyses += analysis_count;
        summary.snapshots += snapshot_count;
        summary.batches += 1;
        summary.degraded.extend(degraded);
        Ok(())
    }
}

fn process_file(
    repo: &Repository,
    ctx: &ExtractContext<'_>,
    commit_hash: &str,
    job: &FileJob,
) -> FileOutcome {
    let mut outcome = FileOutcome {
        record: FileRecord {
            commit_hash: commit_hash.to_string(),
            path: job.path.clone(),
            file_type: ctx.classifier.file_type(&job.path),
            tech_stack: ctx.classifier.tech_stack(&job.path),
            change_type: job.change_type,
            char_length: 0,
            line_count: 0,
            blob_hash: job.blob.to_string(),
        },
        analyses: Vec::new(),
        snapshot: None,
        degraded: Vec::new(),
    };

    if !job.read {
        return outcome;
    }

    match ctx.reader.read_blob(repo, job.blob, &job.path) {
        Ok(snapshot) => {
            outcome.record.char_length = snapshot.metrics.char_length;
            outcome.record.line_count = snapshot.metrics.line_count;

            let owner = AnalysisOwner::File {
                commit: commit_hash.to_string(),
                path: job.path.clone(),
            };
            let output = ctx.pipeline.analyze(
                &owner,
                commit_hash,
                outcome.record.tech_stack.as_deref(),
                &snapshot.text,
            );
            outcome.analyses = output.results;
            outcome.degraded = output.degraded;

            if ctx.save_snapshots {
                outcome.snapshot = Some(FileSnapshot {
                    blob_hash: snapshot.blob_hash,
                    content: snapshot.text,
                });
            }
        }
        Err(e) => {
            tracing::warn!("Unreadable content for {}@{}: {}", job.path, commit_hash, e);
            outcome.degraded.push(DegradedRecord {
                kind: DegradedKind::UnreadableContent,
                commit: commit_hash.to_string(),
                path: job.path.clone(),
                analyzer: None,
                reason: e.to_string(),
            });
        }
    }

    outcome
}
