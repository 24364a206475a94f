use super::{Analyzer, AnalyzerTestCase};
use crate::error::AnalyzerError;
use crate::types::Findings;
use quick_xml::Reader;
use quick_xml::events::Event;

const KIND: &str = "xml_element_count";

/// Counts XML elements, grouping each element's path under its tag
///
/// Malformed documents (mismatched or unclosed tags) are an analysis failure.
pub struct XmlElementCount;

impl XmlElementCount {
    pub(crate) fn factory(_params: &serde_json::Value) -> Result<Box<dyn Analyzer>, AnalyzerError> {
        Ok(Box::new(Self))
    }
}

fn failed(reason: impl Into<String>) -> AnalyzerError {
    AnalyzerError::AnalysisFailed {
        analyzer: KIND.to_string(),
        reason: reason.into(),
    }
}

impl Analyzer for XmlElementCount {
    fn describe(&self) -> String {
        "Counts XML elements by tag".to_string()
    }

    fn test_cases(&self) -> Vec<AnalyzerTestCase> {
        vec![
            AnalyzerTestCase::new("nested", "<root><child>test</child></root>", 2)
                .with_result("child", &["root/child"])
                .with_result("root", &["root"]),
            AnalyzerTestCase::new("self-closing", "<a><b/><b/></a>", 3)
                .with_result("a", &["a"])
                .with_result("b", &["a/b", "a/b"]),
        ]
    }

    fn analyze(&self, content: &str) -> Result<(usize, Option<Findings>), AnalyzerError> {
        let mut reader = Reader::from_str(content);
        let mut stack: Vec<String> = Vec::new();
        let mut findings = Findings::new();
        let mut count = 0;

        let mut record = |stack: &[String], tag: String, findings: &mut Findings| {
            let path = if stack.is_empty() {
                tag.clone()
            } else {
                format!("{}/{}", stack.join("/"), tag)
            };
            findings.entry(tag).or_default().push(path);
            count += 1;
        };

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    record(&stack, tag.clone(), &mut findings);
                    stack.push(tag);
                }
                Ok(Event::Empty(e)) => {
                    let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    record(&stack, tag, &mut findings);
                }
                Ok(Event::End(_)) => {
                    stack.pop();
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => {
                    return Err(failed(format!(
                        "malformed XML at position {}: {}",
                        reader.error_position(),
                        e
                    )));
                }
            }
        }

        if let Some(open) = stack.last() {
            return Err(failed(format!("unclosed element <{}>", open)));
        }

        Ok((count, (!findings.is_empty()).then_some(findings)))
    }
}
