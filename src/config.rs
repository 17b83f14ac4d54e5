//! Settings file support.
//!
//! Settings are stored in TOML. Every key is optional:
//!
//! ```toml
//! max_files = 100000
//! collision = "rename"   # rename | skip | overwrite
//! skip_vcs = true
//! include = []
//! exclude = ["**/*.tmp", "node_modules/**"]
//!
//! [rules]
//! pdf = "Documents"
//! jpg = "Images/Photos"
//! ```
//!
//! An empty or missing `[rules]` table selects the built-in rules.

use crate::executor::CollisionMode;
use crate::planner::{DEFAULT_MAX_FILES, PlanOptions};
use crate::rules::RuleSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Settings file looked up in the current directory.
pub const LOCAL_CONFIG_FILE: &str = ".dirsortrc.toml";

/// Errors that can occur during settings loading.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at the specified path.
    #[error("Configuration file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),
    /// Invalid TOML syntax or structure.
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),
    /// IO error while reading configuration.
    #[error("IO error reading configuration: {0}")]
    IoError(String),
}

/// Run settings, deserialized from TOML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Quota of regular files per planning pass.
    pub max_files: usize,
    pub collision: CollisionMode,
    /// Skip `.git`, `.hg` and `.svn` directories.
    pub skip_vcs: bool,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub rules: BTreeMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_files: DEFAULT_MAX_FILES,
            collision: CollisionMode::default(),
            skip_vcs: true,
            include: Vec::new(),
            exclude: Vec::new(),
            rules: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Load settings from a file, with fallback to defaults.
    ///
    /// Attempts to load settings in the following order:
    /// 1. If `config_path` is provided, load from that file
    /// 2. Look for `.dirsortrc.toml` in the current directory
    /// 3. Look for `~/.config/dirsort/config.toml` in home directory
    /// 4. Fall back to default settings
    ///
    /// # Errors
    ///
    /// Returns an error if a file is explicitly provided but cannot be read,
    /// or if any file found cannot be parsed.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        let local_config = PathBuf::from(LOCAL_CONFIG_FILE);
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        if let Ok(home) = std::env::var("HOME") {
            let home_config = PathBuf::from(home)
                .join(".config")
                .join("dirsort")
                .join("config.toml");
            if home_config.exists() {
                return Self::load_from_file(&home_config);
            }
        }

        Ok(Self::default())
    }

    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::ConfigNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        tracing::debug!(path = %path.display(), "loaded settings file");
        Self::from_toml_str(&content)
    }

    /// Parses settings from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ConfigInvalid(e.to_string()))
    }

    /// The rule set these settings describe.
    pub fn rule_set(&self) -> RuleSet {
        if self.rules.is_empty() {
            RuleSet::default()
        } else {
            RuleSet::from_pairs(&self.rules)
        }
    }

    /// Planner options derived from these settings.
    pub fn plan_options(&self) -> PlanOptions {
        PlanOptions {
            max_files: self.max_files,
            include: self.include.clone(),
            exclude: self.exclude.clone(),
            skip_vcs: self.skip_vcs,
        }
    }
}
