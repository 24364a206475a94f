//! Glob pattern matching utilities for path filtering

use globset::{Glob, GlobMatcher};

/// Check if a repository path matches any of the given glob patterns
///
/// # Examples
///
/// ```
/// use git2base::glob_utils::matches_any_pattern;
///
/// let patterns = vec!["lib/**".to_string(), "src/**/*.ts".to_string()];
/// assert!(matches_any_pattern("lib/utils.ts", &patterns));
/// assert!(matches_any_pattern("src/components/Button.ts", &patterns));
/// assert!(!matches_any_pattern("tests/unit.rs", &patterns));
/// ```
pub fn matches_any_pattern(path: &str, patterns: &[String]) -> bool {
    compile_patterns(patterns)
        .map(|matchers| matches_any_matcher(path, &matchers))
        .unwrap_or_else(|| patterns.iter().any(|p| path.contains(p.as_str())))
}

/// Compile multiple glob patterns into matchers for efficient repeated matching
///
/// A bare directory name such as `doc` also matches everything below it.
/// Returns None if any pattern fails to compile.
pub fn compile_patterns(patterns: &[String]) -> Option<Vec<GlobMatcher>> {
    let mut matchers = Vec::with_capacity(patterns.len() * 2);
    for pattern in patterns {
        let pattern = pattern.trim_end_matches('/');
        let mut variants = vec![pattern.to_string()];
        if !pattern.contains('*') {
            variants.push(format!("{}/**", pattern));
        }
        for variant in variants {
            match Glob::new(&variant) {
                Ok(glob) => matchers.push(glob.compile_matcher()),
                Err(e) => {
                    tracing::warn!("Failed to compile glob pattern '{}': {}", variant, e);
                    return None;
                }
            }
        }
    }
    Some(matchers)
}

/// Check if a path matches any of the precompiled glob matchers
pub fn matches_any_matcher(path: &str, matchers: &[GlobMatcher]) -> bool {
    let path = path.trim_start_matches('/');
    matchers.iter().any(|matcher| matcher.is_match(path))
}

/// Include/exclude filter applied to every extracted path
///
/// An empty include list admits every path; excludes always win.
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    include: Vec<GlobMatcher>,
    exclude: Vec<GlobMatcher>,
}

impl PathFilter {
    /// Build a filter, rejecting patterns that do not compile
    pub fn new(include: &[String], exclude: &[String]) -> Option<Self> {
        Some(Self {
            include: compile_patterns(include)?,
            exclude: compile_patterns(exclude)?,
        })
    }

    pub fn is_included(&self, path: &str) -> bool {
        if matches_any_matcher(path, &self.exclude) {
            return false;
        }
        self.include.is_empty() || matches_any_matcher(path, &self.include)
    }
}
