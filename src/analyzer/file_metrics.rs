use super::{Analyzer, AnalyzerTestCase};
use crate::error::AnalyzerError;
use crate::types::Findings;

/// Number of lines in the file
pub struct FileLineCount;

impl FileLineCount {
    pub(crate) fn factory(_params: &serde_json::Value) -> Result<Box<dyn Analyzer>, AnalyzerError> {
        Ok(Box::new(Self))
    }
}

impl Analyzer for FileLineCount {
    fn describe(&self) -> String {
        "Counts the lines in the file".to_string()
    }

    fn test_cases(&self) -> Vec<AnalyzerTestCase> {
        vec![
            AnalyzerTestCase::new("single line", "plain text", 1),
            AnalyzerTestCase::new("trailing newline", "one\ntwo\n", 2),
            AnalyzerTestCase::new("empty", "", 0),
        ]
    }

    fn analyze(&self, content: &str) -> Result<(usize, Option<Findings>), AnalyzerError> {
        Ok((content.lines().count(), None))
    }
}

/// Number of characters in the file
pub struct FileCharCount;

impl FileCharCount {
    pub(crate) fn factory(_params: &serde_json::Value) -> Result<Box<dyn Analyzer>, AnalyzerError> {
        Ok(Box::new(Self))
    }
}

impl Analyzer for FileCharCount {
    fn describe(&self) -> String {
        "Counts the characters in the file".to_string()
    }

    fn test_cases(&self) -> Vec<AnalyzerTestCase> {
        vec![
            AnalyzerTestCase::new("ascii", "hello", 5),
            AnalyzerTestCase::new("multi-byte", "这是一个测试文本。", 9),
        ]
    }

    fn analyze(&self, content: &str) -> Result<(usize, Option<Findings>), AnalyzerError> {
        Ok((content.chars().count(), None))
    }
}
