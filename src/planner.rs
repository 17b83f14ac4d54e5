//! Planning of move actions.
//!
//! The planner walks a source tree and turns every eligible file into an
//! [`Action`] describing where it should go. Nothing on disk is changed here.

use crate::filters::{FilterError, PathFilters, to_match_string};
use crate::path_guard::{normalize, safe_resolve_within};
use crate::rules::RuleSet;
use crate::undo::JOURNAL_DIR;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

/// Default number of regular files a single planning pass may visit.
pub const DEFAULT_MAX_FILES: usize = 100_000;

/// Version-control directories skipped when `skip_vcs` is set.
pub const VCS_DIRS: &[&str] = &[".git", ".hg", ".svn"];

/// One planned move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub source: PathBuf,
    pub target: PathBuf,
    /// Human-readable explanation of the rule that produced this action.
    pub reason: String,
}

/// Errors that abort a planning pass.
#[derive(Debug, Error)]
pub enum PlanError {
    /// Bad caller input, detected before any I/O.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// The source root does not exist or is not a directory.
    #[error("Source root is not a directory: {}", .0.display())]
    InvalidRoot(PathBuf),
    /// More regular files were found than the quota allows.
    #[error("Quota exceeded: more than {limit} files under {}", .root.display())]
    QuotaExceeded { limit: usize, root: PathBuf },
}

impl From<FilterError> for PlanError {
    fn from(err: FilterError) -> Self {
        PlanError::InvalidArgument(err.to_string())
    }
}

/// Tunables for a planning pass.
#[derive(Debug, Clone)]
pub struct PlanOptions {
    pub max_files: usize,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    /// Do not descend into `.git`, `.hg` or `.svn` directories.
    pub skip_vcs: bool,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            max_files: DEFAULT_MAX_FILES,
            include: Vec::new(),
            exclude: Vec::new(),
            skip_vcs: true,
        }
    }
}

/// Produces move actions for a source tree from a rule set.
pub struct Planner<'a> {
    rules: &'a RuleSet,
    filters: PathFilters,
    max_files: usize,
    skip_vcs: bool,
}

impl<'a> Planner<'a> {
    /// Validates options and compiles the filter patterns.
    pub fn new(rules: &'a RuleSet, options: PlanOptions) -> Result<Self, PlanError> {
        if options.max_files == 0 {
            return Err(PlanError::InvalidArgument(
                "max_files must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            rules,
            filters: PathFilters::new(&options.include, &options.exclude)?,
            max_files: options.max_files,
            skip_vcs: options.skip_vcs,
        })
    }

    /// Walks `root` and returns the planned actions in traversal order.
    ///
    /// Every regular file found counts against the quota before any other
    /// filter is applied. Going over the quota discards everything planned so
    /// far and returns [`PlanError::QuotaExceeded`].
    pub fn plan(&self, root: &Path) -> Result<Vec<Action>, PlanError> {
        if !root.is_dir() {
            return Err(PlanError::InvalidRoot(root.to_path_buf()));
        }
        let root = std::path::absolute(root)
            .map(|p| normalize(&p))
            .map_err(|_| PlanError::InvalidRoot(root.to_path_buf()))?;

        let mut visited = 0usize;
        let mut actions = Vec::new();

        for entry in discover_files(&root, self.skip_vcs) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable entry");
                    continue;
                }
            };

            visited += 1;
            if visited > self.max_files {
                return Err(PlanError::QuotaExceeded {
                    limit: self.max_files,
                    root: root.clone(),
                });
            }

            if let Some(action) = self.plan_file(&root, entry.path()) {
                actions.push(action);
            }
        }

        tracing::info!(
            root = %root.display(),
            visited,
            planned = actions.len(),
            "planning finished"
        );
        Ok(actions)
    }

    fn plan_file(&self, root: &Path, path: &Path) -> Option<Action> {
        // The journal stores paths as UTF-8 strings.
        if path.to_str().is_none() {
            tracing::warn!(path = %path.display(), "skipping file with a non-UTF-8 path");
            return None;
        }

        let file_name = path.file_name()?;
        let name = file_name.to_string_lossy();

        if name.starts_with('.') {
            return None;
        }

        let relative = path.strip_prefix(root).ok()?;
        if !self.filters.allows(&to_match_string(relative)) {
            tracing::debug!(path = %path.display(), "filtered out");
            return None;
        }

        let extension = extension_of(&name)?;
        let folder = self.rules.lookup(&extension)?;

        let target_dir = match safe_resolve_within(root, folder) {
            Ok(dir) => dir,
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    folder,
                    error = %e,
                    "skipping file with unsafe target folder"
                );
                return None;
            }
        };

        let target = target_dir.join(file_name);
        if normalize(&target) == normalize(path) {
            return None;
        }

        Some(Action {
            source: path.to_path_buf(),
            target,
            reason: format!("extension '.{}' -> {}", extension, folder),
        })
    }
}

/// Plans moves for `root` with the default VCS skipping.
pub fn plan(
    root: &Path,
    rules: &RuleSet,
    max_files: usize,
    include: &[String],
    exclude: &[String],
) -> Result<Vec<Action>, PlanError> {
    let options = PlanOptions {
        max_files,
        include: include.to_vec(),
        exclude: exclude.to_vec(),
        skip_vcs: true,
    };
    Planner::new(rules, options)?.plan(root)
}

/// Lazily yields the regular files under `root`.
///
/// Symlinks are not followed. The journal directory is never entered, and
/// neither are VCS directories when `skip_vcs` is set. Each call starts a
/// fresh walk.
pub fn discover_files(
    root: &Path,
    skip_vcs: bool,
) -> impl Iterator<Item = walkdir::Result<DirEntry>> {
    WalkDir::new(root)
        .follow_links(false)
        .min_depth(1)
        .into_iter()
        .filter_entry(move |entry| !is_pruned_dir(entry, skip_vcs))
        .filter(|entry| match entry {
            Ok(entry) => entry.file_type().is_file(),
            Err(_) => true,
        })
}

fn is_pruned_dir(entry: &DirEntry, skip_vcs: bool) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name == JOURNAL_DIR || (skip_vcs && VCS_DIRS.contains(&&*name))
}

/// Splits a file name into stem and extension at the last dot.
///
/// A dot in the first or last position does not start an extension, so
/// `.bashrc` and `notes.` have none.
pub fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < name.len() => (&name[..idx], Some(&name[idx + 1..])),
        _ => (name, None),
    }
}

/// Lowercased extension of a file name, if it has one.
pub fn extension_of(name: &str) -> Option<String> {
    split_extension(name).1.map(str::to_lowercase)
}
