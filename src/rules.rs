//! Extension to folder rules.
//!
//! A [`RuleSet`] maps a lowercase extension (no leading dot) to a relative
//! folder under the source root. Folders may contain subfolders
//! (`Media/Images`). Rule files are flat TOML tables:
//!
//! ```toml
//! pdf = "Documents"
//! jpg = "Images/Photos"
//! ".PNG" = "Images"
//! ```
//!
//! Keys are trimmed, stripped of a leading dot and lowercased, so `.PNG` and
//! `png` name the same rule; when two keys collide the later one wins.
//! Folders that fail [`validate_relative_subpath`] are dropped with a warning.
//!
//! # Examples
//!
//! ```
//! use dirsort::rules::RuleSet;
//!
//! let rules = RuleSet::from_pairs([("PDF", "Documents"), ("jpg", "Images")]);
//! assert_eq!(rules.lookup("pdf"), Some("Documents"));
//! assert_eq!(rules.lookup("JPG"), Some("Images"));
//! assert_eq!(rules.lookup("mp3"), None);
//! ```

use crate::path_guard::validate_relative_subpath;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while loading a rule file.
#[derive(Debug, Error)]
pub enum RuleError {
    /// Rule file not found at the given path.
    #[error("Rule file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// The file is not a flat table of strings.
    #[error("Invalid rule file: {0}")]
    Invalid(String),
    /// IO error while reading the file.
    #[error("IO error reading rule file: {0}")]
    Io(#[from] std::io::Error),
}

/// Immutable extension to folder mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSet {
    rules: BTreeMap<String, String>,
}

impl RuleSet {
    /// Builds a rule set from `(extension, folder)` pairs.
    ///
    /// Entries with an empty extension or an unsafe folder are skipped.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut rules = BTreeMap::new();
        for (key, folder) in pairs {
            let (key, folder) = (key.as_ref(), folder.as_ref());

            let Some(extension) = normalize_extension(key) else {
                tracing::warn!(key, "ignoring rule with an empty extension");
                continue;
            };

            if let Err(e) = validate_relative_subpath(folder.trim()) {
                tracing::warn!(extension = %extension, error = %e, "ignoring unsafe rule folder");
                continue;
            }

            rules.insert(extension, sanitize_folder(folder));
        }
        Self { rules }
    }

    /// Parses a flat TOML table of `extension = "folder"` entries.
    pub fn from_toml_str(content: &str) -> Result<Self, RuleError> {
        let table: BTreeMap<String, String> =
            toml::from_str(content).map_err(|e| RuleError::Invalid(e.to_string()))?;
        Ok(Self::from_pairs(table))
    }

    /// Loads a rule file from disk.
    pub fn load(path: &Path) -> Result<Self, RuleError> {
        if !path.exists() {
            return Err(RuleError::NotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Returns the folder for an extension, matched case-insensitively.
    pub fn lookup(&self, extension: &str) -> Option<&str> {
        let key = normalize_extension(extension)?;
        self.rules.get(&key).map(String::as_str)
    }

    /// Iterates rules in extension order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.rules.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Inserts a rule without the folder safety check, so tests can exercise
    /// the planner's resolution-time guard on its own.
    #[cfg(test)]
    pub(crate) fn insert_unchecked(&mut self, extension: &str, folder: &str) {
        self.rules
            .insert(extension.to_lowercase(), folder.to_string());
    }
}

impl Default for RuleSet {
    /// The built-in extension groups.
    fn default() -> Self {
        const GROUPS: &[(&str, &[&str])] = &[
            (
                "Images",
                &["png", "jpg", "jpeg", "gif", "webp", "svg", "bmp", "tiff", "ico", "heic"],
            ),
            ("Audio", &["mp3", "wav", "ogg", "flac", "aac", "m4a", "wma"]),
            (
                "Videos",
                &["mp4", "mkv", "avi", "mov", "flv", "wmv", "webm", "3gp"],
            ),
            (
                "Documents",
                &["pdf", "txt", "doc", "docx", "html", "htm", "md", "rtf", "odt"],
            ),
            ("Archives", &["zip", "rar", "7z", "tar", "gz", "bz2", "xz"]),
            (
                "Code",
                &[
                    "py", "java", "c", "cpp", "h", "hpp", "js", "ts", "rs", "go", "sh", "bash",
                    "json", "xml", "yaml", "yml", "toml",
                ],
            ),
            ("Spreadsheets", &["csv", "xls", "xlsx", "ods"]),
            ("Presentations", &["ppt", "pptx", "odp"]),
            ("Fonts", &["ttf", "otf", "woff", "woff2"]),
        ];

        Self::from_pairs(GROUPS.iter().flat_map(|(folder, extensions)| {
            extensions.iter().map(move |ext| (*ext, *folder))
        }))
    }
}

fn normalize_extension(key: &str) -> Option<String> {
    let key = key.trim().trim_start_matches('.').to_lowercase();
    (!key.is_empty()).then_some(key)
}

/// Normalizes separators to `/` and drops empty and `.` segments.
fn sanitize_folder(folder: &str) -> String {
    folder
        .trim()
        .split(['/', '\\'])
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}
