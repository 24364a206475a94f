/// Centralized error types for git2base using thiserror
///
/// Fatal errors abort the current batch and the run; per-record problems are
/// reported as degraded records in the run summary and never reach these types.
use thiserror::Error;

/// Main error type for the extraction pipeline
#[derive(Error, Debug)]
pub enum Git2BaseError {
    #[error("Git error: {0}")]
    Git(#[from] GitError),

    #[error("Classification error: {0}")]
    Classify(#[from] ClassifyError),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("Analyzer error: {0}")]
    Analyzer(#[from] AnalyzerError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Run cancelled by user")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the library
pub type Result<T, E = Git2BaseError> = std::result::Result<T, E>;

/// Errors raised by the repository access layer
#[derive(Error, Debug)]
pub enum GitError {
    #[error("Failed to open git repository at '{path}': {reason}")]
    OpenFailed { path: String, reason: String },

    #[error("Unknown reference: {0}")]
    UnknownReference(String),

    #[error("Ambiguous reference: {0}")]
    AmbiguousReference(String),

    #[error("Unknown commit: {0}")]
    UnknownCommit(String),

    #[error("Branch not found: {0}")]
    BranchNotFound(String),

    #[error("Repository has no checked-out branch")]
    DetachedHead,

    #[error("Resume boundary {boundary} is not an ancestor of {end}")]
    InvalidResumeBoundary { boundary: String, end: String },

    #[error("Commit {commit} does not belong to branch {branch}")]
    CommitNotOnBranch { commit: String, branch: String },

    #[error("Repository access failed: {0}")]
    Repository(String),
}

impl From<git2::Error> for GitError {
    fn from(err: git2::Error) -> Self {
        GitError::Repository(err.message().to_string())
    }
}

/// Errors from the content classifier
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassifyError {
    #[error("Unknown change type: {0}")]
    UnknownChangeType(String),
}

/// Reasons a file's content snapshot could not be produced
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("Path '{path}' not found in commit {commit}")]
    PathNotFound { commit: String, path: String },

    #[error("File '{0}' is binary")]
    Binary(String),

    #[error("File '{path}' exceeds maximum blob size: {size} > {max}")]
    TooLarge { path: String, size: usize, max: usize },

    #[error("Failed to read blob for '{path}': {reason}")]
    Unreadable { path: String, reason: String },
}

/// Errors related to analyzer lookup and execution
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalyzerError {
    #[error("Unknown analyzer: {0}")]
    UnknownAnalyzer(String),

    #[error("Invalid parameters for analyzer '{analyzer}': {reason}")]
    InvalidParams { analyzer: String, reason: String },

    #[error("Analyzer '{analyzer}' failed: {reason}")]
    AnalysisFailed { analyzer: String, reason: String },

    #[error("Analyzer '{analyzer}' failed test case '{case}': {reason}")]
    TestCaseFailed {
        analyzer: String,
        case: String,
        reason: String,
    },
}

/// Errors related to batch persistence
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Failed to connect to backend: {0}")]
    ConnectionFailed(String),

    #[error("Failed to write batch: {0}")]
    WriteFailed(String),

    #[error("Backend write timed out after {0} seconds")]
    WriteTimeout(u64),

    #[error("No batch is open")]
    NoActiveBatch,

    #[error("A batch is already open")]
    BatchAlreadyOpen,

    #[error("Backend query failed: {0}")]
    QueryFailed(String),

    #[error("Failed to reset backend: {0}")]
    ResetFailed(String),

    #[error("Backend '{0}' is not available in this build")]
    Unavailable(String),

    #[error("Another import holds the lock for {0}")]
    Locked(String),
}

/// Errors related to configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration file: {0}")]
    LoadFailed(String),

    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    #[error("Invalid configuration value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),
}

impl From<anyhow::Error> for Git2BaseError {
    fn from(err: anyhow::Error) -> Self {
        Git2BaseError::Other(format!("{:#}", err))
    }
}

impl Git2BaseError {
    /// Create a new error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Git2BaseError::Other(msg.into())
    }

    /// Check if this is a user error (bad reference, bad config) vs system error
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Git2BaseError::Config(_)
                | Git2BaseError::Git(
                    GitError::UnknownReference(_)
                        | GitError::AmbiguousReference(_)
                        | GitError::UnknownCommit(_)
                        | GitError::BranchNotFound(_)
                        | GitError::CommitNotOnBranch { .. }
                )
                | Git2BaseError::Analyzer(AnalyzerError::UnknownAnalyzer(_))
        )
    }

    /// Process exit status for an error that ended the run
    ///
    /// 2 for bad references or configuration, 130 for an interrupted run,
    /// 1 for everything else.
    pub fn exit_code(&self) -> u8 {
        match self {
            Git2BaseError::Cancelled => 130,
            e if e.is_user_error() => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Git2BaseError::Git(GitError::UnknownReference("deadbeef".to_string()));
        assert_eq!(err.to_string(), "Git error: Unknown reference: deadbeef");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Git2BaseError = io_err.into();
        assert!(matches!(err, Git2BaseError::Io(_)));
    }

    #[test]
    fn test_error_from_anyhow() {
        let anyhow_err = anyhow::anyhow!("test error");
        let err: Git2BaseError = anyhow_err.into();
        assert!(matches!(err, Git2BaseError::Other(_)));
    }

    #[test]
    fn test_invalid_resume_boundary_message() {
        let err = GitError::InvalidResumeBoundary {
            boundary: "abc".to_string(),
            end: "def".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Resume boundary abc is not an ancestor of def"
        );
    }

    #[test]
    fn test_is_user_error() {
        let user_err: Git2BaseError = GitError::AmbiguousReference("ab".to_string()).into();
        assert!(user_err.is_user_error());

        let system_err: Git2BaseError = SinkError::WriteTimeout(30).into();
        assert!(!system_err.is_user_error());
    }

    #[test]
    fn test_exit_code() {
        let user_err: Git2BaseError = GitError::UnknownCommit("abc123".to_string()).into();
        assert_eq!(user_err.exit_code(), 2);

        let sink_err: Git2BaseError = SinkError::ConnectionFailed("refused".to_string()).into();
        assert_eq!(sink_err.exit_code(), 1);

        assert_eq!(Git2BaseError::Cancelled.exit_code(), 130);
    }

    #[test]
    fn test_snapshot_error_too_large() {
        let err = SnapshotError::TooLarge {
            path: "big.bin".to_string(),
            size: 1000000,
            max: 500000,
        };
        assert_eq!(
            err.to_string(),
            "File 'big.bin' exceeds maximum blob size: 1000000 > 500000"
        );
    }

    #[test]
    fn test_write_timeout_display() {
        let err = SinkError::WriteTimeout(30);
        assert_eq!(err.to_string(), "Backend write timed out after 30 seconds");
    }

    #[test]
    fn test_error_chain() {
        let sink_err = SinkError::WriteFailed("disk full".to_string());
        let err: Git2BaseError = sink_err.into();
        assert!(matches!(err, Git2BaseError::Sink(_)));
        assert_eq!(
            err.to_string(),
            "Sink error: Failed to write batch: disk full"
        );
    }

    #[test]
    fn test_from_git2_error() {
        let git_err = git2::Error::from_str("object not found");
        let err: GitError = git_err.into();
        assert_eq!(err.to_string(), "Repository access failed: object not found");
    }
}
