//! Extracted record types and the run summary

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalized change-type code between two trees
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChangeType {
    #[serde(rename = "A")]
    Added,
    #[serde(rename = "M")]
    Modified,
    #[serde(rename = "D")]
    Deleted,
    #[serde(rename = "R")]
    Renamed,
    #[serde(rename = "C")]
    Copied,
    #[serde(rename = "T")]
    TypeChanged,
}

impl ChangeType {
    /// Single-letter code stored by every backend
    pub fn code(self) -> &'static str {
        match self {
            ChangeType::Added => "A",
            ChangeType::Modified => "M",
            ChangeType::Deleted => "D",
            ChangeType::Renamed => "R",
            ChangeType::Copied => "C",
            ChangeType::TypeChanged => "T",
        }
    }

    /// Parse a stored single-letter code
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "A" => Some(ChangeType::Added),
            "M" => Some(ChangeType::Modified),
            "D" => Some(ChangeType::Deleted),
            "R" => Some(ChangeType::Renamed),
            "C" => Some(ChangeType::Copied),
            "T" => Some(ChangeType::TypeChanged),
            _ => None,
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One revision, immutable once recorded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    /// Full commit SHA hash (40 characters)
    pub hash: String,
    /// Branch the commit was extracted for
    pub branch: String,
    /// Commit message (first line and body)
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    /// Author timestamp (Unix epoch seconds)
    pub author_time: i64,
    pub committer_name: String,
    pub committer_email: String,
    /// Commit timestamp (Unix epoch seconds)
    pub commit_time: i64,
    /// SHA hashes of parent commits
    pub parent_hashes: Vec<String>,
}

/// A file as it exists in one commit's tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub commit_hash: String,
    pub path: String,
    pub file_type: String,
    pub tech_stack: Option<String>,
    /// Change relative to the first parent; `None` when the file is unchanged
    pub change_type: Option<ChangeType>,
    pub char_length: usize,
    pub line_count: usize,
    pub blob_hash: String,
}

impl FileRecord {
    /// Identity within an import: (commit, path)
    pub fn key(&self) -> (String, String) {
        (self.commit_hash.clone(), self.path.clone())
    }
}

/// One side of a file change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSide {
    pub blob_hash: String,
    pub char_length: usize,
    pub line_count: usize,
    /// Full content at that side; `None` when unreadable or snapshots are disabled
    pub content: Option<String>,
}

/// The sides present for one changed file; both sides can never be absent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiffSides {
    Added { new: DiffSide },
    Deleted { old: DiffSide },
    Both { old: DiffSide, new: DiffSide },
}

impl DiffSides {
    /// Build from optional sides, rejecting the (None, None) combination
    pub fn from_options(old: Option<DiffSide>, new: Option<DiffSide>) -> Option<Self> {
        match (old, new) {
            (Some(old), Some(new)) => Some(DiffSides::Both { old, new }),
            (Some(old), None) => Some(DiffSides::Deleted { old }),
            (None, Some(new)) => Some(DiffSides::Added { new }),
            (None, None) => None,
        }
    }

    pub fn old(&self) -> Option<&DiffSide> {
        match self {
            DiffSides::Deleted { old } | DiffSides::Both { old, .. } => Some(old),
            DiffSides::Added { .. } => None,
        }
    }

    pub fn new_side(&self) -> Option<&DiffSide> {
        match self {
            DiffSides::Added { new } | DiffSides::Both { new, .. } => Some(new),
            DiffSides::Deleted { .. } => None,
        }
    }
}

/// One file's change between two named commits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffFileRecord {
    pub old_commit: String,
    pub new_commit: String,
    /// New path, or the old path for deletions
    pub path: String,
    /// Previous path for renames and copies
    pub old_path: Option<String>,
    pub file_type: String,
    pub tech_stack: Option<String>,
    pub change_type: ChangeType,
    pub sides: DiffSides,
}

impl DiffFileRecord {
    pub fn key(&self) -> (String, String, String) {
        (
            self.old_commit.clone(),
            self.new_commit.clone(),
            self.path.clone(),
        )
    }
}

/// The record an analysis result belongs to
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalysisOwner {
    File {
        commit: String,
        path: String,
    },
    Diff {
        old_commit: String,
        new_commit: String,
        path: String,
    },
}

impl AnalysisOwner {
    pub fn path(&self) -> &str {
        match self {
            AnalysisOwner::File { path, .. } | AnalysisOwner::Diff { path, .. } => path,
        }
    }
}

/// Analyzer findings: category -> matched values, in the order categories were first seen
pub type Findings = IndexMap<String, Vec<String>>;

/// Category used to mark an analyzer failure inside the findings payload
pub const ERROR_CATEGORY: &str = "<error>";

/// One analyzer's output for one file or one side of a diff
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub owner: AnalysisOwner,
    /// Commit whose content was analyzed (disambiguates old/new diff sides)
    pub side_commit: String,
    pub analyzer: String,
    pub count: usize,
    pub findings: Option<Findings>,
}

impl AnalysisResult {
    pub fn is_error(&self) -> bool {
        self.findings
            .as_ref()
            .is_some_and(|f| f.contains_key(ERROR_CATEGORY))
    }

    pub fn key(&self) -> (AnalysisOwner, String, String) {
        (
            self.owner.clone(),
            self.side_commit.clone(),
            self.analyzer.clone(),
        )
    }
}

/// Content stored once per blob hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSnapshot {
    pub blob_hash: String,
    pub content: String,
}

/// Last commit durably extracted by a history walk of a branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watermark {
    pub branch: String,
    pub commit_hash: String,
}

/// Anything the pipeline hands to a sink
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Record {
    Commit(Commit),
    File(FileRecord),
    DiffFile(DiffFileRecord),
    Analysis(AnalysisResult),
    Snapshot(FileSnapshot),
    Watermark(Watermark),
}

/// Per-table row counts reported by a backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub commits: usize,
    pub files: usize,
    pub diff_files: usize,
    pub analyses: usize,
    pub snapshots: usize,
    pub watermarks: usize,
}

/// Why a record was written in degraded form or skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradedKind {
    /// Content could not be read; counts zeroed, snapshot null
    UnreadableContent,
    /// The repository reported a change operation outside A/M/D/R/C/T; file skipped
    UnknownChangeType,
    /// An analyzer failed on the content; error-marked result recorded
    AnalyzerFailed,
}

/// A per-record failure kept for the run summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DegradedRecord {
    pub kind: DegradedKind,
    pub commit: String,
    pub path: String,
    pub analyzer: Option<String>,
    pub reason: String,
}

impl fmt::Display for DegradedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = &self.commit[..self.commit.len().min(10)];
        match &self.analyzer {
            Some(analyzer) => write!(
                f,
                "{:?} {}:{} [{}]: {}",
                self.kind, short, self.path, analyzer, self.reason
            ),
            None => write!(f, "{:?} {}:{}: {}", self.kind, short, self.path, self.reason),
        }
    }
}

/// Counts reported at the end of a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub mode: String,
    pub commits: usize,
    pub files: usize,
    pub diff_files: usize,
    pub analyses: usize,
    pub snapshots: usize,
    pub batches: usize,
    pub degraded: Vec<DegradedRecord>,
    pub duration_ms: u64,
}

impl RunSummary {
    pub fn new(mode: impl Into<String>) -> Self {
        Self {
            mode: mode.into(),
            ..Default::default()
        }
    }

    /// Total records written, excluding watermarks
    pub fn records_written(&self) -> usize {
        self.commits + self.files + self.diff_files + self.analyses + self.snapshots
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Mode:        {}", self.mode)?;
        writeln!(f, "Commits:     {}", self.commits)?;
        writeln!(f, "Files:       {}", self.files)?;
        writeln!(f, "Diff files:  {}", self.diff_files)?;
        writeln!(f, "Analyses:    {}", self.analyses)?;
        writeln!(f, "Snapshots:   {}", self.snapshots)?;
        writeln!(f, "Batches:     {}", self.batches)?;
        writeln!(f, "Degraded:    {}", self.degraded.len())?;
        for record in &self.degraded {
            writeln!(f, "  - {}", record)?;
        }
        write!(f, "Duration:    {} ms", self.duration_ms)
    }
}
