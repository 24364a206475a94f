//! Command line surface

use crate::config::{BackendKind, Config, WalkMode};
use crate::importer::{ImportMode, ImportRequest};
use clap::{ArgGroup, Parser};
use std::path::PathBuf;

/// Extract git history, file inventories and diffs into a queryable store
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(long_version = concat!(
    env!("CARGO_PKG_VERSION"),
    " (", env!("GIT_COMMIT_HASH"), ", built ", env!("BUILD_TIMESTAMP"),
    ", backends: ", env!("GIT2BASE_BACKENDS"), ")"
))]
#[command(group(
    ArgGroup::new("mode")
        .args(["history", "snapshot", "diff", "diff_branch", "list_analyzers", "verify_analyzers", "stats"])
        .multiple(false)
))]
pub struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, env = "GIT2BASE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Path to the git repository, or any directory inside it
    #[arg(short, long, default_value = ".")]
    pub repo: PathBuf,

    /// Branch to extract (defaults to the checked-out branch)
    #[arg(short, long)]
    pub branch: Option<String>,

    /// Walk the branch history incrementally (default mode)
    #[arg(long)]
    pub history: bool,

    /// Resume strictly after this commit instead of the stored watermark
    #[arg(
        long,
        alias = "commit_hash",
        value_name = "COMMIT",
        conflicts_with_all = ["snapshot", "diff", "diff_branch"]
    )]
    pub commit_hash: Option<String>,

    /// Stop the history walk at this commit instead of the branch tip
    #[arg(long, value_name = "COMMIT", conflicts_with_all = ["snapshot", "diff", "diff_branch"])]
    pub end: Option<String>,

    /// Extract one commit's full inventory
    #[arg(long, value_name = "COMMIT")]
    pub snapshot: Option<String>,

    /// Extract changed files between two commits of the branch
    #[arg(long, num_args = 2, value_names = ["OLD", "NEW"])]
    pub diff: Option<Vec<String>>,

    /// Extract changed files between the tips of two branches
    #[arg(long, num_args = 2, value_names = ["BASE", "TARGET"])]
    pub diff_branch: Option<Vec<String>>,

    /// Clear all persisted state first; alone, only clears it
    #[arg(long, conflicts_with_all = ["stats", "list_analyzers", "verify_analyzers"])]
    pub reset: bool,

    /// Override the configured walk mode
    #[arg(long, value_enum)]
    pub walk_mode: Option<WalkMode>,

    /// Override the configured backend
    #[arg(long, value_enum)]
    pub backend: Option<BackendKind>,

    /// Skip every analyzer
    #[arg(long)]
    pub no_analysis: bool,

    /// Run the full pipeline against the in-memory backend
    #[arg(long)]
    pub dry_run: bool,

    /// Print per-table row counts of the store and exit
    #[arg(long)]
    pub stats: bool,

    /// Print the configured analyzers and exit
    #[arg(long)]
    pub list_analyzers: bool,

    /// Run every configured analyzer's declared test cases and exit
    #[arg(long)]
    pub verify_analyzers: bool,

    /// Print the run summary as JSON
    #[arg(long)]
    pub json: bool,

    /// Log debug detail
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Log warnings and errors only
    #[arg(short, long)]
    pub quiet: bool,
}

impl Cli {
    /// Fold command-line overrides into the loaded configuration
    pub fn apply(&self, config: &mut Config) {
        if let Some(backend) = self.backend {
            config.output.backend = backend;
        }
        if self.dry_run {
            config.output.backend = BackendKind::Memory;
        }
        if let Some(walk_mode) = self.walk_mode {
            config.extraction.walk_mode = walk_mode;
        }
    }

    /// The extraction this invocation asks for
    pub fn request(&self) -> ImportRequest {
        let mode = if let Some(commit) = &self.snapshot {
            Some(ImportMode::Snapshot {
                commit: commit.clone(),
            })
        } else if let Some([old, new]) = self.diff.as_deref() {
            Some(ImportMode::Diff {
                old: old.clone(),
                new: new.clone(),
            })
        } else if let Some([base, target]) = self.diff_branch.as_deref() {
            Some(ImportMode::DiffBranches {
                base: base.clone(),
                target: target.clone(),
            })
        } else if self.reset && !self.history && self.commit_hash.is_none() && self.end.is_none() {
            None
        } else {
            Some(ImportMode::History {
                start: self.commit_hash.clone(),
                end: self.end.clone(),
            })
        };

        ImportRequest {
            branch: self.branch.clone(),
            mode,
            reset: self.reset,
        }
    }

    /// Log level selected by `-v` / `-q`
    pub fn log_level(&self) -> tracing::Level {
        if self.verbose {
            tracing::Level::DEBUG
        } else if self.quiet {
            tracing::Level::WARN
        } else {
            tracing::Level::INFO
        }
    }
}
