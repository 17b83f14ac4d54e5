//! Include/exclude glob filtering on root-relative paths.
//!
//! Paths are matched as `/`-separated strings relative to the source root.
//! `*` and `?` never cross a separator while `**` spans any number of
//! directories. A pattern starting with `**/` is also compiled with that
//! prefix removed, so `**/*.log` still matches `app.log` at the root.

use glob::{MatchOptions, Pattern};
use std::path::{Component, Path};
use thiserror::Error;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Errors raised while compiling filter patterns.
#[derive(Debug, Error)]
pub enum FilterError {
    /// A glob pattern failed to compile.
    #[error("Invalid glob pattern '{pattern}': {reason}")]
    InvalidGlobPattern { pattern: String, reason: String },
}

/// Compiled include and exclude patterns.
#[derive(Debug, Clone, Default)]
pub struct PathFilters {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
}

impl PathFilters {
    /// Compiles include and exclude patterns.
    ///
    /// # Errors
    ///
    /// Returns `FilterError::InvalidGlobPattern` for the first pattern that
    /// does not compile.
    pub fn new<S: AsRef<str>>(include: &[S], exclude: &[S]) -> Result<Self, FilterError> {
        Ok(Self {
            include: compile_patterns(include)?,
            exclude: compile_patterns(exclude)?,
        })
    }

    /// Returns true if the root-relative path passes both filter lists.
    ///
    /// With a non-empty include list the path must match at least one include
    /// pattern. It must never match an exclude pattern.
    pub fn allows(&self, relative: &str) -> bool {
        if !self.include.is_empty() && !matches_any(&self.include, relative) {
            return false;
        }
        !matches_any(&self.exclude, relative)
    }
}

/// Renders a relative path with `/` separators for matching.
pub fn to_match_string(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn compile_patterns<S: AsRef<str>>(patterns: &[S]) -> Result<Vec<Pattern>, FilterError> {
    let mut compiled = Vec::with_capacity(patterns.len());
    for pattern in patterns {
        let pattern = pattern.as_ref();
        compiled.push(compile(pattern)?);
        if let Some(stripped) = pattern.strip_prefix("**/")
            && !stripped.is_empty()
        {
            compiled.push(compile(stripped)?);
        }
    }
    Ok(compiled)
}

fn compile(pattern: &str) -> Result<Pattern, FilterError> {
    Pattern::new(pattern).map_err(|e| FilterError::InvalidGlobPattern {
        pattern: pattern.to_string(),
        reason: e.msg.to_string(),
    })
}

fn matches_any(patterns: &[Pattern], relative: &str) -> bool {
    patterns
        .iter()
        .any(|pattern| pattern.matches_with(relative, MATCH_OPTIONS))
}
