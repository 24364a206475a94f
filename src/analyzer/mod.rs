//! Pluggable content analyzers
//!
//! Analyzers are looked up by kind in a process-wide registry. The registry
//! starts empty; [`register_builtin_analyzers`] installs the built-in kinds
//! and must be called once during startup before any pipeline is built.
//! Registering a kind that already exists replaces the previous factory.

mod file_metrics;
mod pipeline;
mod regex_match;
mod xml_element;

pub use file_metrics::{FileCharCount, FileLineCount};
pub use pipeline::{AnalysisOutput, AnalysisPipeline, AnalyzerInfo};
pub use regex_match::RegexMatchCount;
pub use xml_element::XmlElementCount;

use crate::error::AnalyzerError;
use crate::types::Findings;
use std::collections::BTreeMap;
use std::sync::{OnceLock, RwLock};

/// Content analyzer applied to one file's text
pub trait Analyzer: Send + Sync {
    /// Human-readable description of what is counted
    fn describe(&self) -> String;

    /// Declared examples the implementation must reproduce exactly
    fn test_cases(&self) -> Vec<AnalyzerTestCase>;

    /// Analyze the content, returning the count and optional findings
    fn analyze(&self, content: &str) -> Result<(usize, Option<Findings>), AnalyzerError>;
}

/// One declared input/output example of an analyzer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzerTestCase {
    pub name: String,
    pub input: String,
    pub expected_count: usize,
    pub expected_result: Option<Findings>,
}

impl AnalyzerTestCase {
    pub fn new(name: &str, input: &str, expected_count: usize) -> Self {
        Self {
            name: name.to_string(),
            input: input.to_string(),
            expected_count,
            expected_result: None,
        }
    }

    pub fn with_result(mut self, category: &str, values: &[&str]) -> Self {
        self.expected_result
            .get_or_insert_with(Findings::new)
            .insert(
                category.to_string(),
                values.iter().map(|v| v.to_string()).collect(),
            );
        self
    }
}

/// Builds an analyzer from its configured parameters
pub type AnalyzerFactory = fn(&serde_json::Value) -> Result<Box<dyn Analyzer>, AnalyzerError>;

/// Mapping from analyzer kind to factory
#[derive(Default, Clone)]
pub struct AnalyzerRegistry {
    factories: BTreeMap<String, AnalyzerFactory>,
}

impl AnalyzerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in analyzer kind
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("regex_match_count", RegexMatchCount::factory);
        registry.register("xml_element_count", XmlElementCount::factory);
        registry.register("file_line_count", FileLineCount::factory);
        registry.register("file_char_count", FileCharCount::factory);
        registry
    }

    /// Register a factory; the last registration of a kind wins
    pub fn register(&mut self, kind: &str, factory: AnalyzerFactory) {
        if self.factories.insert(kind.to_string(), factory).is_some() {
            tracing::debug!("Analyzer '{}' re-registered, previous entry replaced", kind);
        }
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Registered kinds in name order
    pub fn kinds(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    /// Instantiate an analyzer of `kind` with `params`
    pub fn get(
        &self,
        kind: &str,
        params: &serde_json::Value,
    ) -> Result<Box<dyn Analyzer>, AnalyzerError> {
        let factory = self
            .factories
            .get(kind)
            .ok_or_else(|| AnalyzerError::UnknownAnalyzer(kind.to_string()))?;
        factory(params)
    }
}

static REGISTRY: OnceLock<RwLock<AnalyzerRegistry>> = OnceLock::new();

fn global() -> &'static RwLock<AnalyzerRegistry> {
    REGISTRY.get_or_init(|| RwLock::new(AnalyzerRegistry::new()))
}

/// Register an analyzer kind in the process-wide registry
pub fn register_analyzer(kind: &str, factory: AnalyzerFactory) {
    let mut registry = global().write().unwrap_or_else(|e| e.into_inner());
    registry.register(kind, factory);
}

/// Install the built-in analyzer kinds in the process-wide registry
pub fn register_builtin_analyzers() {
    let builtins = AnalyzerRegistry::with_builtins();
    let mut registry = global().write().unwrap_or_else(|e| e.into_inner());
    for (kind, factory) in builtins.factories {
        registry.register(&kind, factory);
    }
}

/// Instantiate an analyzer from the process-wide registry
pub fn get_analyzer(
    kind: &str,
    params: &serde_json::Value,
) -> Result<Box<dyn Analyzer>, AnalyzerError> {
    global()
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .get(kind, params)
}

/// Snapshot of the process-wide registry
pub fn registry() -> AnalyzerRegistry {
    global().read().unwrap_or_else(|e| e.into_inner()).clone()
}

/// Run an analyzer's declared test cases, returning how many passed
///
/// Stops at the first case whose count or findings differ.
pub fn verify_test_cases(name: &str, analyzer: &dyn Analyzer) -> Result<usize, AnalyzerError> {
    let cases = analyzer.test_cases();
    for case in &cases {
        let (count, findings) = analyzer.analyze(&case.input).map_err(|e| {
            AnalyzerError::TestCaseFailed {
                analyzer: name.to_string(),
                case: case.name.clone(),
                reason: e.to_string(),
            }
        })?;

        if count != case.expected_count {
            return Err(AnalyzerError::TestCaseFailed {
                analyzer: name.to_string(),
                case: case.name.clone(),
                reason: format!("expected count {}, got {}", case.expected_count, count),
            });
        }

        if case.expected_result.is_some() && findings != case.expected_result {
            return Err(AnalyzerError::TestCaseFailed {
                analyzer: name.to_string(),
                case: case.name.clone(),
                reason: format!(
                    "expected result {:?}, got {:?}",
                    case.expected_result, findings
                ),
            });
        }
    }
    Ok(cases.len())
}

/// Read an optional list of declared test cases from analyzer params
///
/// Accepts `test_cases = [{ name, input, expected_count }]`.
pub(crate) fn declared_test_cases(params: &serde_json::Value) -> Vec<AnalyzerTestCase> {
    params
        .get("test_cases")
        .and_then(|v| v.as_array())
        .map(|cases| {
            cases
                .iter()
                .enumerate()
                .filter_map(|(i, case)| {
                    let input = case.get("input")?.as_str()?;
                    let expected = case.get("expected_count")?.as_u64()?;
                    let name = case
                        .get("name")
                        .and_then(|n| n.as_str())
                        .map(|n| n.to_string())
                        .unwrap_or_else(|| format!("case {}", i + 1));
                    Some(AnalyzerTestCase {
                        name,
                        input: input.to_string(),
                        expected_count: expected as usize,
                        expected_result: None,
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}
