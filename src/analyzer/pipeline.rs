use super::{Analyzer, AnalyzerRegistry, verify_test_cases};
use crate::classifier::ALL_STACKS;
use crate::config::AnalyzerConfig;
use crate::error::AnalyzerError;
use crate::types::{AnalysisOwner, AnalysisResult, DegradedKind, DegradedRecord, ERROR_CATEGORY, Findings};

struct ConfiguredAnalyzer {
    name: String,
    kind: String,
    tech_stacks: Vec<String>,
    analyzer: Box<dyn Analyzer>,
}

impl ConfiguredAnalyzer {
    fn applies_to(&self, tech_stack: Option<&str>) -> bool {
        self.tech_stacks.iter().any(|s| s == ALL_STACKS)
            || tech_stack.is_some_and(|t| self.tech_stacks.iter().any(|s| s == t))
    }
}

/// Name, kind and description of one configured analyzer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzerInfo {
    pub name: String,
    pub kind: String,
    pub tech_stacks: Vec<String>,
    pub description: String,
}

/// Results and per-analyzer failures for one piece of content
#[derive(Debug, Default)]
pub struct AnalysisOutput {
    pub results: Vec<AnalysisResult>,
    pub degraded: Vec<DegradedRecord>,
}

/// The configured analyzers, applied to every extracted file content
///
/// Shared read-only across the file workers of a batch.
#[derive(Default)]
pub struct AnalysisPipeline {
    analyzers: Vec<ConfiguredAnalyzer>,
}

impl AnalysisPipeline {
    /// Pipeline that never produces results
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Instantiate every configured analyzer from the process-wide registry
    pub fn from_config(configs: &[AnalyzerConfig]) -> Result<Self, AnalyzerError> {
        Self::with_registry(&super::registry(), configs)
    }

    pub fn with_registry(
        registry: &AnalyzerRegistry,
        configs: &[AnalyzerConfig],
    ) -> Result<Self, AnalyzerError> {
        let analyzers = configs
            .iter()
            .map(|config| {
                let analyzer = registry.get(&config.analyzer, &config.params)?;
                Ok(ConfiguredAnalyzer {
                    name: config.name.clone(),
                    kind: config.analyzer.clone(),
                    tech_stacks: config.tech_stacks.clone(),
                    analyzer,
                })
            })
            .collect::<Result<Vec<_>, AnalyzerError>>()?;

        tracing::debug!("Analysis pipeline built with {} analyzers", analyzers.len());
        Ok(Self { analyzers })
    }

    pub fn is_empty(&self) -> bool {
        self.analyzers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.analyzers.len()
    }

    pub fn describe(&self) -> Vec<AnalyzerInfo> {
        self.analyzers
            .iter()
            .map(|a| AnalyzerInfo {
                name: a.name.clone(),
                kind: a.kind.clone(),
                tech_stacks: a.tech_stacks.clone(),
                description: a.analyzer.describe(),
            })
            .collect()
    }

    /// Run every analyzer's declared test cases
    ///
    /// Returns the number of cases run, or the first mismatch.
    pub fn verify(&self) -> Result<usize, AnalyzerError> {
        let mut total = 0;
        for configured in &self.analyzers {
            let passed = verify_test_cases(&configured.name, configured.analyzer.as_ref())?;
            tracing::info!("Analyzer '{}': {} test cases passed", configured.name, passed);
            total += passed;
        }
        Ok(total)
    }

    /// Apply every analyzer whose tech-stack filter admits the file
    ///
    /// A failing analyzer yields a zero-count result whose findings hold the
    /// error under [`ERROR_CATEGORY`], plus a degraded record.
    pub fn analyze(
        &self,
        owner: &AnalysisOwner,
        side_commit: &str,
        tech_stack: Option<&str>,
        content: &str,
    ) -> AnalysisOutput {
        let mut output = AnalysisOutput::default();

        for configured in self.analyzers.iter().filter(|a| a.applies_to(tech_stack)) {
            let (count, findings) = match configured.analyzer.analyze(content) {
                Ok(outcome) => outcome,
                Err(e) => {
                    let reason = e.to_string();
                    tracing::warn!(
                        "Analyzer '{}' failed on {}@{}: {}",
                        configured.name,
                        owner.path(),
                        side_commit,
                        reason
                    );
                    output.degraded.push(DegradedRecord {
                        kind: DegradedKind::AnalyzerFailed,
                        commit: side_commit.to_string(),
                        path: owner.path().to_string(),
                        analyzer: Some(configured.name.clone()),
                        reason: reason.clone(),
                    });
                    let mut marker = Findings::new();
                    marker.insert(ERROR_CATEGORY.to_string(), vec![reason]);
                    (0, Some(marker))
                }
            };

            output.results.push(AnalysisResult {
                owner: owner.clone(),
                side_commit: side_commit.to_string(),
                analyzer: configured.name.clone(),
                count,
                findings,
            });
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(name: &str, kind: &str, stacks: &[&str], params: serde_json::Value) -> AnalyzerConfig {
        AnalyzerConfig {
            name: name.to_string(),
            analyzer: kind.to_string(),
            tech_stacks: stacks.iter().map(|s| s.to_string()).collect(),
            params,
        }
    }

    fn owner() -> AnalysisOwner {
        AnalysisOwner::File {
            commit: "c1".to_string(),
            path: "pom.xml".to_string(),
        }
    }

    fn pipeline() -> AnalysisPipeline {
        AnalysisPipeline::with_registry(
            &AnalyzerRegistry::with_builtins(),
            &[
                config("Lines", "file_line_count", &["All"], json!(null)),
                config("Elements", "xml_element_count", &["XML"], json!(null)),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_unknown_kind_fails_construction() {
        let result = AnalysisPipeline::with_registry(
            &AnalyzerRegistry::with_builtins(),
            &[config("Nope", "does_not_exist", &["All"], json!(null))],
        );
        assert!(matches!(result, Err(AnalyzerError::UnknownAnalyzer(_))));
    }

    #[test]
    fn test_tech_stack_filter() {
        let pipeline = pipeline();

        let xml = pipeline.analyze(&owner(), "c1", Some("XML"), "<a/>");
        assert_eq!(xml.results.len(), 2);

        let rust = pipeline.analyze(&owner(), "c1", Some("Rust"), "fn main() {}");
        assert_eq!(rust.results.len(), 1);
        assert_eq!(rust.results[0].analyzer, "Lines");

        let untagged = pipeline.analyze(&owner(), "c1", None, "text");
        assert_eq!(untagged.results.len(), 1);
    }

    #[test]
    fn test_failure_recorded_as_error_marked_result() {
        let pipeline = pipeline();
        let output = pipeline.analyze(&owner(), "c1", Some("XML"), "<root><open></root>");

        let failed = output
            .results
            .iter()
            .find(|r| r.analyzer == "Elements")
            .unwrap();
        assert_eq!(failed.count, 0);
        assert!(failed.is_error());

        assert_eq!(output.degraded.len(), 1);
        assert_eq!(output.degraded[0].kind, DegradedKind::AnalyzerFailed);
        assert_eq!(output.degraded[0].analyzer.as_deref(), Some("Elements"));
        assert_eq!(output.degraded[0].path, "pom.xml");

        // The other analyzer is unaffected
        let lines = output.results.iter().find(|r| r.analyzer == "Lines").unwrap();
        assert_eq!(lines.count, 1);
    }

    #[test]
    fn test_disabled_pipeline() {
        let pipeline = AnalysisPipeline::disabled();
        assert!(pipeline.is_empty());
        assert!(pipeline.analyze(&owner(), "c1", None, "x").results.is_empty());
        assert_eq!(pipeline.verify().unwrap(), 0);
    }

    #[test]
    fn test_verify_and_describe() {
        let pipeline = pipeline();
        assert_eq!(pipeline.len(), 2);
        assert!(pipeline.verify().unwrap() >= 4);
        let info = pipeline.describe();
        assert_eq!(info[1].kind, "xml_element_count");
        assert_eq!(info[1].description, "Counts XML elements by tag");
    }
}
