use super::{Analyzer, AnalyzerTestCase, declared_test_cases};
use crate::error::AnalyzerError;
use crate::types::Findings;
use regex::Regex;

const KIND: &str = "regex_match_count";

/// Counts matches of an ordered list of named patterns
///
/// Params: `patterns = ["raw", { name = "...", pattern = "..." }]`. A plain
/// string is named after itself. Each match records its first capture group
/// when the pattern has one, otherwise the whole match. Empty matches are
/// ignored.
pub struct RegexMatchCount {
    patterns: Vec<(String, Regex)>,
    declared: Vec<AnalyzerTestCase>,
}

impl RegexMatchCount {
    pub fn new(patterns: &[(&str, &str)]) -> Result<Self, AnalyzerError> {
        let patterns = patterns
            .iter()
            .map(|(name, pattern)| compile(name, pattern))
            .collect::<Result<Vec<_>, _>>()?;
        if patterns.is_empty() {
            return Err(invalid("at least one pattern is required"));
        }
        Ok(Self {
            patterns,
            declared: Vec::new(),
        })
    }

    pub(crate) fn factory(params: &serde_json::Value) -> Result<Box<dyn Analyzer>, AnalyzerError> {
        let entries = params
            .get("patterns")
            .and_then(|p| p.as_array())
            .ok_or_else(|| invalid("missing 'patterns' list"))?;

        let mut patterns = Vec::with_capacity(entries.len());
        for entry in entries {
            let (name, pattern) = match entry {
                serde_json::Value::String(pattern) => (pattern.as_str(), pattern.as_str()),
                serde_json::Value::Object(map) => {
                    let pattern = map
                        .get("pattern")
                        .and_then(|p| p.as_str())
                        .ok_or_else(|| invalid("pattern entry without 'pattern'"))?;
                    let name = map.get("name").and_then(|n| n.as_str()).unwrap_or(pattern);
                    (name, pattern)
                }
                other => return Err(invalid(&format!("unsupported pattern entry: {}", other))),
            };
            patterns.push((name, pattern));
        }

        let mut analyzer = Self::new(&patterns)?;
        analyzer.declared = declared_test_cases(params);
        Ok(Box::new(analyzer))
    }
}

fn compile(name: &str, pattern: &str) -> Result<(String, Regex), AnalyzerError> {
    Regex::new(pattern)
        .map(|regex| (name.to_string(), regex))
        .map_err(|e| invalid(&format!("invalid pattern '{}': {}", name, e)))
}

fn invalid(reason: &str) -> AnalyzerError {
    AnalyzerError::InvalidParams {
        analyzer: KIND.to_string(),
        reason: reason.to_string(),
    }
}

impl Analyzer for RegexMatchCount {
    fn describe(&self) -> String {
        let names: Vec<&str> = self.patterns.iter().map(|(name, _)| name.as_str()).collect();
        format!("Counts regular expression matches for: {}", names.join(", "))
    }

    fn test_cases(&self) -> Vec<AnalyzerTestCase> {
        let mut cases = vec![AnalyzerTestCase::new("empty content", "", 0)];
        cases.extend(self.declared.iter().cloned());
        cases
    }

    fn analyze(&self, content: &str) -> Result<(usize, Option<Findings>), AnalyzerError> {
        let mut findings = Findings::new();
        let mut count = 0;

        for (name, regex) in &self.patterns {
            let values: Vec<String> = regex
                .captures_iter(content)
                .filter_map(|caps| {
                    let value = caps.get(1).or_else(|| caps.get(0))?;
                    let whole = caps.get(0)?;
                    (!whole.as_str().is_empty()).then(|| value.as_str().to_string())
                })
                .collect();
            if values.is_empty() {
                continue;
            }
            count += values.len();
            findings.entry(name.clone()).or_default().extend(values);
        }

        Ok((count, (!findings.is_empty()).then_some(findings)))
    }
}
