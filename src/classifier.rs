//! File-type, change-type and tech-stack classification of repository paths

use crate::config::StackConfig;
use crate::error::ClassifyError;
use crate::glob_utils::PathFilter;
use crate::types::ChangeType;

/// Tag for paths whose final segment has no extension
pub const NO_EXTENSION: &str = "<none>";

/// Tag for dot-files such as `.gitignore`
pub const DEV_CONFIG: &str = "<dev-config>";

/// Stack name that makes an analyzer apply to every file
pub const ALL_STACKS: &str = "All";

/// Classify a path by the extension of its final segment
///
/// Returns the lowercase extension without the dot, [`DEV_CONFIG`] for a
/// dot-file with no further extension and [`NO_EXTENSION`] otherwise.
pub fn classify_file_type(path: &str) -> String {
    let name = path.rsplit(['/', '\\']).next().unwrap_or(path);

    if let Some(rest) = name.strip_prefix('.') {
        return match rest.rsplit_once('.') {
            Some((_, ext)) if !ext.is_empty() => ext.to_lowercase(),
            _ => DEV_CONFIG.to_string(),
        };
    }

    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => ext.to_lowercase(),
        _ => NO_EXTENSION.to_string(),
    }
}

/// Map the repository layer's delta status onto the fixed change-type codes
pub fn normalize_change_type(status: git2::Delta) -> Result<ChangeType, ClassifyError> {
    match status {
        git2::Delta::Added => Ok(ChangeType::Added),
        git2::Delta::Modified => Ok(ChangeType::Modified),
        git2::Delta::Deleted => Ok(ChangeType::Deleted),
        git2::Delta::Renamed => Ok(ChangeType::Renamed),
        git2::Delta::Copied => Ok(ChangeType::Copied),
        git2::Delta::Typechange => Ok(ChangeType::TypeChanged),
        other => Err(ClassifyError::UnknownChangeType(format!("{:?}", other))),
    }
}

/// Path classification configured from the `stacks` and `input` sections
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    stacks: Vec<StackConfig>,
    filter: PathFilter,
}

impl Classifier {
    pub fn new(stacks: Vec<StackConfig>, filter: PathFilter) -> Self {
        Self { stacks, filter }
    }

    pub fn file_type(&self, path: &str) -> String {
        classify_file_type(path)
    }

    /// Whether the path passes the configured include/exclude filters
    pub fn is_included(&self, path: &str) -> bool {
        self.filter.is_included(path)
    }

    /// Identify the first configured stack matching the path
    ///
    /// A stack with only extensions matches by extension, one with only path
    /// prefixes matches by prefix, and one with both requires both.
    pub fn tech_stack(&self, path: &str) -> Option<String> {
        let extension = classify_file_type(path);
        self.stacks
            .iter()
            .find(|stack| {
                let ext_match = stack.extensions.iter().any(|e| e.eq_ignore_ascii_case(&extension));
                let path_match = stack.paths.iter().any(|p| path.starts_with(p.as_str()));
                match (stack.paths.is_empty(), stack.extensions.is_empty()) {
                    (true, true) => false,
                    (true, false) => ext_match,
                    (false, true) => path_match,
                    (false, false) => path_match && ext_match,
                }
            })
            .map(|stack| stack.name.clone())
    }
}
