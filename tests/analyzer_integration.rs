/// Integration tests for the analyzer registry and the analysis pipeline
mod common;

use anyhow::Result;
use common::{TestRepo, history, importer, memory_sink};
use git2base::analyzer::{
    Analyzer, AnalyzerTestCase, get_analyzer, register_analyzer, register_builtin_analyzers,
    registry, verify_test_cases,
};
use git2base::config::{AnalyzerConfig, Config};
use git2base::error::AnalyzerError;
use git2base::sink::{MemoryBackend, Table};
use git2base::types::{DegradedKind, Findings, Record};
use serde_json::json;

struct ShoutCount;

impl Analyzer for ShoutCount {
    fn describe(&self) -> String {
        "Counts exclamation marks".to_string()
    }

    fn test_cases(&self) -> Vec<AnalyzerTestCase> {
        vec![AnalyzerTestCase::new("two", "hey! ho!", 2)]
    }

    fn analyze(&self, content: &str) -> Result<(usize, Option<Findings>), AnalyzerError> {
        Ok((content.matches('!').count(), None))
    }
}

fn shout_factory(_params: &serde_json::Value) -> Result<Box<dyn Analyzer>, AnalyzerError> {
    Ok(Box::new(ShoutCount))
}

#[test]
fn test_regex_contract_on_class_keyword() -> Result<()> {
    register_builtin_analyzers();
    let params = json!({
        "patterns": [{ "name": "class", "pattern": r"\bclass\b" }],
        "test_cases": [{ "name": "java class", "input": "public class MyClass {}", "expected_count": 1 }]
    });
    let analyzer = get_analyzer("regex_match_count", &params)?;

    let (count, findings) = analyzer.analyze("public class MyClass {}")?;
    assert_eq!(count, 1);
    assert!(findings.unwrap().contains_key("class"));

    // Built-in empty case plus the declared one
    assert_eq!(verify_test_cases("ClassCount", analyzer.as_ref())?, 2);
    Ok(())
}

#[test]
fn test_declared_case_mismatch_is_reported() -> Result<()> {
    register_builtin_analyzers();
    let params = json!({
        "patterns": [r"\bclass\b"],
        "test_cases": [{ "input": "class class", "expected_count": 1 }]
    });
    let analyzer = get_analyzer("regex_match_count", &params)?;

    let result = verify_test_cases("ClassCount", analyzer.as_ref());
    assert!(matches!(result, Err(AnalyzerError::TestCaseFailed { .. })));
    Ok(())
}

#[test]
fn test_unknown_analyzer() {
    register_builtin_analyzers();
    let result = get_analyzer("does_not_exist", &serde_json::Value::Null);
    assert!(matches!(result, Err(AnalyzerError::UnknownAnalyzer(_))));
}

#[test]
fn test_every_builtin_passes_its_own_cases() -> Result<()> {
    register_builtin_analyzers();
    let params = json!({ "patterns": ["TODO"] });
    for kind in ["regex_match_count", "xml_element_count", "file_line_count", "file_char_count"] {
        let analyzer = get_analyzer(kind, &params)?;
        assert!(verify_test_cases(kind, analyzer.as_ref())? > 0, "{}", kind);
    }
    Ok(())
}

#[test]
fn test_custom_registration_last_wins() -> Result<()> {
    register_builtin_analyzers();
    register_analyzer("shout_count", shout_factory);
    assert!(registry().contains("shout_count"));

    let analyzer = get_analyzer("shout_count", &serde_json::Value::Null)?;
    assert_eq!(analyzer.analyze("a!b!c!")?.0, 3);
    Ok(())
}

#[test]
fn test_malformed_xml_is_error_marked_result() -> Result<()> {
    let repo = TestRepo::new();
    repo.commit(
        &[("good.xml", "<a><b/></a>"), ("bad.xml", "<a><b></a>"), ("notes.txt", "x\n")],
        "c1",
    );
    let mut config = Config::default();
    config.analyzers = vec![AnalyzerConfig {
        name: "Elements".to_string(),
        analyzer: "xml_element_count".to_string(),
        tech_stacks: vec!["XML".to_string()],
        params: serde_json::Value::Null,
    }];
    let importer = importer(&repo, config);
    let backend = MemoryBackend::new();

    let summary = importer.run(&history(None, None), &mut memory_sink(&backend))?;

    // The text file is outside the XML stack
    assert_eq!(summary.analyses, 2);
    assert_eq!(summary.degraded.len(), 1);
    assert_eq!(summary.degraded[0].kind, DegradedKind::AnalyzerFailed);
    assert_eq!(summary.degraded[0].analyzer.as_deref(), Some("Elements"));

    let results: Vec<_> = backend
        .records(Table::Analyses)
        .into_iter()
        .filter_map(|r| match r {
            Record::Analysis(a) => Some(a),
            _ => None,
        })
        .collect();
    let bad = results.iter().find(|a| a.owner.path() == "bad.xml").unwrap();
    assert_eq!(bad.count, 0);
    assert!(bad.is_error());
    let good = results.iter().find(|a| a.owner.path() == "good.xml").unwrap();
    assert_eq!(good.count, 2);
    assert!(!good.is_error());
    Ok(())
}
