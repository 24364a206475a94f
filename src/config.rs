/// Configuration system for git2base
///
/// Supports loading from multiple sources with priority:
/// CLI args > Environment variables > Config file > Defaults
use crate::classifier::Classifier;
use crate::error::{ConfigError, Git2BaseError};
use crate::glob_utils::PathFilter;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Output backend configuration
    #[serde(default)]
    pub output: OutputConfig,

    /// Path filters applied to every extracted file
    #[serde(default)]
    pub input: InputConfig,

    /// Extraction tuning
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Tech stacks used to tag files and select analyzers
    #[serde(default = "default_stacks")]
    pub stacks: Vec<StackConfig>,

    /// Analyzers applied to extracted content
    #[serde(default = "default_analyzers")]
    pub analyzers: Vec<AnalyzerConfig>,
}

/// Storage backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Quoted CSV files, one segment directory per batch
    Csv,
    /// SQLite database, one transaction per batch
    Sqlite,
    /// RocksDB key/value store, one write batch per batch
    Rocksdb,
    /// In-process maps, nothing persisted
    Memory,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Csv => "csv",
            BackendKind::Sqlite => "sqlite",
            BackendKind::Rocksdb => "rocksdb",
            BackendKind::Memory => "memory",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "csv" => Some(BackendKind::Csv),
            "sqlite" => Some(BackendKind::Sqlite),
            "rocksdb" => Some(BackendKind::Rocksdb),
            "memory" => Some(BackendKind::Memory),
            _ => None,
        }
    }
}

/// Output backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Backend: "csv", "sqlite", "rocksdb" or "memory"
    #[serde(default = "default_backend")]
    pub backend: BackendKind,

    /// Directory receiving CSV segments
    #[serde(default = "default_csv_path")]
    pub csv_path: PathBuf,

    /// SQLite database file
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: PathBuf,

    /// RocksDB data directory
    #[serde(default = "default_rocksdb_path")]
    pub rocksdb_path: PathBuf,

    /// Upper bound for one batch write, in seconds
    #[serde(default = "default_write_timeout")]
    pub write_timeout_secs: u64,
}

/// Include/exclude glob patterns for repository paths
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    #[serde(default)]
    pub include: Vec<String>,

    #[serde(default = "default_exclude_patterns")]
    pub exclude: Vec<String>,
}

/// How the history walker enumerates each commit's files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum WalkMode {
    /// Full tree inventory of every commit
    Snapshot,
    /// Only paths changed relative to the first parent
    Changes,
}

/// Extraction tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Maximum diff file records per batch
    #[serde(default = "default_diff_batch_size")]
    pub diff_batch_size: usize,

    /// Persist file contents (inline for diffs, per blob for history)
    #[serde(default = "default_save_snapshots")]
    pub save_snapshots: bool,

    /// Blobs larger than this (in bytes) are not read
    #[serde(default = "default_max_blob_size")]
    pub max_blob_size: usize,

    /// File worker threads per batch (0 = one per CPU)
    #[serde(default)]
    pub workers: usize,

    #[serde(default = "default_walk_mode")]
    pub walk_mode: WalkMode,
}

/// A named tech stack matched by extension and/or path prefix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackConfig {
    pub name: String,
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default)]
    pub extensions: Vec<String>,
}

/// One configured analyzer instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Name recorded on every result
    pub name: String,
    /// Registry key of the implementation (e.g. "regex_match_count")
    pub analyzer: String,
    /// Stacks the analyzer applies to; "All" applies everywhere
    #[serde(default = "default_tech_stacks")]
    pub tech_stacks: Vec<String>,
    /// Implementation-specific parameters
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub params: serde_json::Value,
}

// Default value functions
fn default_backend() -> BackendKind {
    BackendKind::Sqlite
}

fn default_csv_path() -> PathBuf {
    crate::paths::PlatformPaths::default_csv_dir()
}

fn default_sqlite_path() -> PathBuf {
    crate::paths::PlatformPaths::default_sqlite_path()
}

fn default_rocksdb_path() -> PathBuf {
    crate::paths::PlatformPaths::default_rocksdb_path()
}

fn default_write_timeout() -> u64 {
    30
}

fn default_exclude_patterns() -> Vec<String> {
    vec![".vscode".to_string(), "node_modules".to_string()]
}

fn default_diff_batch_size() -> usize {
    100
}

fn default_save_snapshots() -> bool {
    true
}

fn default_max_blob_size() -> usize {
    5_242_880 // 5 MB
}

fn default_walk_mode() -> WalkMode {
    WalkMode::Snapshot
}

fn default_tech_stacks() -> Vec<String> {
    vec![crate::classifier::ALL_STACKS.to_string()]
}

fn default_stacks() -> Vec<StackConfig> {
    let stack = |name: &str, extensions: &[&str]| StackConfig {
        name: name.to_string(),
        paths: Vec::new(),
        extensions: extensions.iter().map(|e| e.to_string()).collect(),
    };
    vec![
        stack("XML", &["xml"]),
        stack("Script", &["sh", "bat"]),
        stack("Python", &["py"]),
        stack("Rust", &["rs"]),
        stack("Yaml", &["yaml", "yml"]),
    ]
}

fn default_analyzers() -> Vec<AnalyzerConfig> {
    vec![
        AnalyzerConfig {
            name: "FileLineCount".to_string(),
            analyzer: "file_line_count".to_string(),
            tech_stacks: default_tech_stacks(),
            params: serde_json::Value::Null,
        },
        AnalyzerConfig {
            name: "FileCharCount".to_string(),
            analyzer: "file_char_count".to_string(),
            tech_stacks: default_tech_stacks(),
            params: serde_json::Value::Null,
        },
        AnalyzerConfig {
            name: "XMLElementCount".to_string(),
            analyzer: "xml_element_count".to_string(),
            tech_stacks: vec!["XML".to_string()],
            params: serde_json::Value::Null,
        },
    ]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output: OutputConfig::default(),
            input: InputConfig::default(),
            extraction: ExtractionConfig::default(),
            stacks: default_stacks(),
            analyzers: default_analyzers(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            csv_path: default_csv_path(),
            sqlite_path: default_sqlite_path(),
            rocksdb_path: default_rocksdb_path(),
            write_timeout_secs: default_write_timeout(),
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            include: Vec::new(),
            exclude: default_exclude_patterns(),
        }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            diff_batch_size: default_diff_batch_size(),
            save_snapshots: default_save_snapshots(),
            max_blob_size: default_max_blob_size(),
            workers: 0,
            walk_mode: default_walk_mode(),
        }
    }
}

impl InputConfig {
    /// Compile the patterns into a filter
    pub fn path_filter(&self) -> Result<PathFilter, ConfigError> {
        PathFilter::new(&self.include, &self.exclude).ok_or_else(|| ConfigError::InvalidValue {
            key: "input".to_string(),
            reason: "include/exclude contains an invalid glob pattern".to_string(),
        })
    }
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &Path) -> Result<Self, Git2BaseError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()).into());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::LoadFailed(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| ConfigError::ParseFailed(format!("Invalid TOML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default location or create default
    pub fn load_or_default() -> Result<Self, Git2BaseError> {
        let config_path = crate::paths::PlatformPaths::default_config_path();

        if config_path.exists() {
            tracing::info!("Loading config from: {}", config_path.display());
            Self::from_file(&config_path)
        } else {
            tracing::info!("No config file found, using defaults");
            Ok(Self::default())
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Git2BaseError> {
        if self.output.backend == BackendKind::Rocksdb && !cfg!(feature = "rocksdb-backend") {
            return Err(ConfigError::InvalidValue {
                key: "output.backend".to_string(),
                reason: "rocksdb support not enabled in this build".to_string(),
            }
            .into());
        }

        if self.output.write_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "output.write_timeout_secs".to_string(),
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }

        if self.extraction.diff_batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "extraction.diff_batch_size".to_string(),
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }

        if self.extraction.max_blob_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "extraction.max_blob_size".to_string(),
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }

        self.input.path_filter()?;

        let mut seen = HashSet::new();
        for analyzer in &self.analyzers {
            if !seen.insert(analyzer.name.as_str()) {
                return Err(ConfigError::InvalidValue {
                    key: "analyzers".to_string(),
                    reason: format!("duplicate analyzer name '{}'", analyzer.name),
                }
                .into());
            }
        }

        for stack in &self.stacks {
            if stack.name.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: "stacks".to_string(),
                    reason: "stack name must not be empty".to_string(),
                }
                .into());
            }
        }

        Ok(())
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(backend) = std::env::var("GIT2BASE_BACKEND")
            && let Some(kind) = BackendKind::parse(&backend)
        {
            self.output.backend = kind;
        }

        if let Ok(path) = std::env::var("GIT2BASE_CSV_PATH") {
            self.output.csv_path = PathBuf::from(path);
        }

        if let Ok(path) = std::env::var("GIT2BASE_SQLITE_PATH") {
            self.output.sqlite_path = PathBuf::from(path);
        }

        if let Ok(path) = std::env::var("GIT2BASE_ROCKSDB_PATH") {
            self.output.rocksdb_path = PathBuf::from(path);
        }

        if let Ok(timeout) = std::env::var("GIT2BASE_WRITE_TIMEOUT")
            && let Ok(secs) = timeout.parse()
        {
            self.output.write_timeout_secs = secs;
        }

        if let Ok(batch_size) = std::env::var("GIT2BASE_DIFF_BATCH_SIZE")
            && let Ok(size) = batch_size.parse()
        {
            self.extraction.diff_batch_size = size;
        }
    }

    /// Build the path classifier from the `stacks` and `input` sections
    pub fn classifier(&self) -> Result<Classifier, ConfigError> {
        Ok(Classifier::new(self.stacks.clone(), self.input.path_filter()?))
    }

    /// Load from an explicit file or the default location, then apply
    /// environment overrides and validate
    pub fn load(path: Option<&Path>) -> Result<Self, Git2BaseError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::load_or_default()?,
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }
}
