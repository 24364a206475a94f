use super::{ExtractContext, GitRepo};
use crate::classifier::normalize_change_type;
use crate::error::{Git2BaseError, GitError, Result};
use crate::sink::BatchSink;
use crate::types::{
    AnalysisOwner, AnalysisResult, ChangeType, DegradedKind, DegradedRecord, DiffFileRecord,
    DiffSide, DiffSides, Record, RunSummary,
};
use git2::{Oid, Repository};
use tokio_util::sync::CancellationToken;

/// One resolved side of a pairwise diff
#[derive(Debug, Clone)]
pub struct DiffEndpoint {
    pub oid: Oid,
    /// Branch recorded on the endpoint's commit record
    pub branch: String,
}

impl DiffEndpoint {
    /// Resolve a short or full reference; a missing commit is `UnknownCommit`
    pub fn resolve(repo: &GitRepo, reference: &str, branch: &str) -> Result<Self, GitError> {
        Ok(Self {
            oid: repo.resolve_commit(reference)?,
            branch: branch.to_string(),
        })
    }
}

struct DiffJob {
    path: String,
    old_path: Option<String>,
    change_type: ChangeType,
    old_blob: Option<Oid>,
    new_blob: Option<Oid>,
}

struct DiffOutcome {
    record: DiffFileRecord,
    analyses: Vec<AnalysisResult>,
    degraded: Vec<DegradedRecord>,
}

/// Pairwise extraction of changed files between two commits
pub struct DiffExtractor<'a> {
    repo: &'a GitRepo,
    ctx: &'a ExtractContext<'a>,
    batch_size: usize,
}

impl<'a> DiffExtractor<'a> {
    pub fn new(repo: &'a GitRepo, ctx: &'a ExtractContext<'a>, batch_size: usize) -> Self {
        Self {
            repo,
            ctx,
            batch_size: batch_size.max(1),
        }
    }

    /// Extract every changed file between `old` and `new`
    ///
    /// Files are flushed in batches of at most `batch_size`, ordered by
    /// path. Both endpoint commits go into the first batch.
    pub fn run(
        &self,
        old: &DiffEndpoint,
        new: &DiffEndpoint,
        sink: &mut BatchSink,
        cancel: &CancellationToken,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let result = self.extract(old, new, sink, cancel, summary);
        if result.is_err() {
            sink.abort_batch();
        }
        result
    }

    fn extract(
        &self,
        old: &DiffEndpoint,
        new: &DiffEndpoint,
        sink: &mut BatchSink,
        cancel: &CancellationToken,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let new_hash = new.oid.to_string();
        let (jobs, mut degraded) = self.plan(old.oid, new.oid)?;
        tracing::info!(
            "Diff {}..{}: {} changed files in batches of {}",
            old.oid,
            new.oid,
            jobs.len(),
            self.batch_size
        );

        let mut endpoints = Some(vec![
            Record::Commit(self.repo.commit_record(old.oid, &old.branch)?),
            Record::Commit(self.repo.commit_record(new.oid, &new.branch)?),
        ]);
        summary.degraded.append(&mut degraded);

        let mut chunks: Vec<&[DiffJob]> = jobs.chunks(self.batch_size).collect();
        if chunks.is_empty() {
            chunks.push(&[]);
        }

        let old_hash = old.oid.to_string();
        for (index, chunk) in chunks.iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::info!("Cancelled after {} of {} diff batches", index, chunks.len());
                return Err(Git2BaseError::Cancelled);
            }

            let ctx = self.ctx;
            let outcomes = ctx.process_parallel(self.repo, chunk, |handle, job| {
                process_change(handle, ctx, &old_hash, &new_hash, job)
            })?;

            let mut records = endpoints.take().unwrap_or_default();
            let commit_count = records.len();
            let mut analyses = Vec::new();
            let mut batch_degraded = Vec::new();
            for outcome in outcomes {
                records.push(Record::DiffFile(outcome.record));
                analyses.extend(outcome.analyses.into_iter().map(Record::Analysis));
                batch_degraded.extend(outcome.degraded);
            }
            let analysis_count = analyses.len();

            sink.begin_batch()?;
            sink.add_all(records)?;
            sink.add_all(analyses)?;
            sink.commit_batch()?;

            summary.commits += commit_count;
            summary.diff_files += chunk.len();
            summary.analyses += analysis_count;
            summary.batches += 1;
            summary.degraded.extend(batch_degraded);

            tracing::debug!(
                "Diff batch {}/{}: {} files",
                index + 1,
                chunks.len(),
                chunk.len()
            );
        }

        Ok(())
    }

    /// Changed, included paths sorted by path, plus skipped unknown changes
    fn plan(&self, old: Oid, new: Oid) -> Result<(Vec<DiffJob>, Vec<DegradedRecord>)> {
        let mut jobs = Vec::new();
        let mut degraded = Vec::new();

        for change in self.repo.changes(Some(old), new)? {
            let path = change.path().to_string();
            if !self.ctx.classifier.is_included(&path) {
                continue;
            }
            let change_type = match normalize_change_type(change.status) {
                Ok(change_type) => change_type,
                Err(e) => {
                    tracing::warn!("Skipping {} in {}..{}: {}", path, old, new, e);
                    degraded.push(DegradedRecord {
                        kind: DegradedKind::UnknownChangeType,
                        commit: new.to_string(),
                        path,
                        analyzer: None,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
            let old_path = match change_type {
                ChangeType::Renamed | ChangeType::Copied => change.old_path.clone(),
                _ => None,
            };
            jobs.push(DiffJob {
                path,
                old_path,
                change_type,
                old_blob: change.old_blob,
                new_blob: change.new_blob,
            });
        }

        jobs.sort_by(|a, b| a.path.cmp(&b.path));
        Ok((jobs, degraded))
    }
}

fn process_change(
    repo: &Repository,
    ctx: &ExtractContext<'_>,
    old_commit: &str,
    new_commit: &str,
    job: &DiffJob,
) -> DiffOutcome {
    let tech_stack = ctx.classifier.tech_stack(&job.path);
    let owner = AnalysisOwner::Diff {
        old_commit: old_commit.to_string(),
        new_commit: new_commit.to_string(),
        path: job.path.clone(),
    };
    let mut analyses = Vec::new();
    let mut degraded = Vec::new();

    let mut read_side = |blob: Option<Oid>, side_path: &str, side_commit: &str| {
        let blob = blob?;
        match ctx.reader.read_blob(repo, blob, side_path) {
            Ok(snapshot) => {
                let output =
                    ctx.pipeline
                        .analyze(&owner, side_commit, tech_stack.as_deref(), &snapshot.text);
                analyses.extend(output.results);
                degraded.extend(output.degraded);
                Some(DiffSide {
                    blob_hash: snapshot.blob_hash,
                    char_length: snapshot.metrics.char_length,
                    line_count: snapshot.metrics.line_count,
                    content: ctx.save_snapshots.then_some(snapshot.text),
                })
            }
            Err(e) => {
                tracing::warn!("Unreadable content for {}@{}: {}", side_path, side_commit, e);
                degraded.push(DegradedRecord {
                    kind: DegradedKind::UnreadableContent,
                    commit: side_commit.to_string(),
                    path: side_path.to_string(),
                    analyzer: None,
                    reason: e.to_string(),
                });
                Some(DiffSide {
                    blob_hash: blob.to_string(),
                    char_length: 0,
                    line_count: 0,
                    content: None,
                })
            }
        }
    };

    let old_side_path = job.old_path.as_deref().unwrap_or(&job.path);
    let old = read_side(job.old_blob, old_side_path, old_commit);
    let new = read_side(job.new_blob, &job.path, new_commit);

    // Repository layer never reports a change with neither side present
    let sides = DiffSides::from_options(old, new).unwrap_or_else(|| DiffSides::Added {
        new: DiffSide {
            blob_hash: Oid::zero().to_string(),
            char_length: 0,
            line_count: 0,
            content: None,
        },
    });

    DiffOutcome {
        record: DiffFileRecord {
            old_commit: old_commit.to_string(),
            new_commit: new_commit.to_string(),
            path: job.path.clone(),
            old_path: job.old_path.clone(),
            file_type: ctx.classifier.file_type(&job.path),
            tech_stack,
            change_type: job.change_type,
            sides,
        },
        analyses,
        degraded,
    }
}
