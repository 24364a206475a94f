//! # git2base - Incremental Git History Extraction
//!
//! Extracts structured facts from a git repository into a queryable store:
//! commits, per-commit file inventories, and pairwise file diffs with
//! content snapshots. Pluggable analyzers run over the extracted text and
//! their results are stored next to the records they describe.
//!
//! ## Key Features
//!
//! - **Resumable history walks**: each committed batch advances a per-branch
//!   watermark, so an interrupted run picks up after the last durable commit
//! - **Atomic batches**: one commit (history) or up to 100 files (diffs) per
//!   batch; a failed batch leaves no partial rows
//! - **Multiple backends**: SQLite (default), CSV segments, RocksDB
//!   (`rocksdb-backend` feature) and an in-memory store for dry runs
//! - **Analyzers**: regex match counts, XML element counts, line and
//!   character counts, each filtered by tech stack
//!
//! ## Architecture
//!
//! ```text
//!            ┌──────────────┐
//!            │   Importer   │  (mode dispatch, resume boundary, reset)
//!            └──────┬───────┘
//!          ┌────────┴─────────┐
//!   ┌──────▼───────┐   ┌──────▼───────┐
//!   │HistoryWalker │   │DiffExtractor │
//!   └──────┬───────┘   └──────┬───────┘
//!          │ classifier, snapshot reader, analysis pipeline
//!   ┌──────▼──────────────────▼───────┐
//!   │            BatchSink            │
//!   └──────┬──────────────────────────┘
//!          │
//!   SQLite / CSV / RocksDB / memory
//! ```
//!
//! ## Usage Example
//!
//! ```no_run
//! use git2base::config::Config;
//! use git2base::importer::{ImportRequest, Importer};
//! use git2base::sink::BatchSink;
//!
//! fn main() -> git2base::error::Result<()> {
//!     git2base::analyzer::register_builtin_analyzers();
//!
//!     let config = Config::load(None)?;
//!     let importer = Importer::new(config.clone(), "/path/to/repo", true)?;
//!     let mut sink = BatchSink::open(&config.output)?;
//!
//!     let summary = importer.run(&ImportRequest::history(None), &mut sink)?;
//!     println!("{} commits extracted", summary.commits);
//!     Ok(())
//! }
//! ```

/// Analyzer trait, registry, analysis pipeline and built-in analyzers
pub mod analyzer;

/// File-type, change-type and tech-stack classification
pub mod classifier;

/// Command line definition
pub mod cli;

/// Configuration management with environment variable overrides
pub mod config;

/// Error types and utilities
pub mod error;

/// Repository access, snapshots, history walking and diff extraction
pub mod git;

/// Glob-based include/exclude path filtering
pub mod glob_utils;

/// Run coordination: resume boundaries, modes and reset
pub mod importer;

/// Platform data and config directories
pub mod paths;

/// Batch sink and storage backends
pub mod sink;

/// Extracted record types and the run summary
pub mod types;
