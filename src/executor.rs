//! Applying planned moves to disk.
//!
//! The [`Executor`] takes actions in order and moves each file according to a
//! [`CollisionMode`]. A failure on one file is recorded in the
//! [`ExecutionResult`] and the batch carries on.

use crate::path_guard::{GuardError, assert_no_symlink_in_ancestry};
use crate::planner::Action;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Numbered candidates tried by [`CollisionMode::Rename`] before giving up.
pub const MAX_RENAME_ATTEMPTS: u32 = 1000;

/// What to do when the destination of a move already exists.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum CollisionMode {
    /// Pick `name_1.ext`, `name_2.ext`, ... until a free name is found.
    #[default]
    Rename,
    /// Leave the source where it is.
    Skip,
    /// Replace the existing destination.
    Overwrite,
}

impl fmt::Display for CollisionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CollisionMode::Rename => "rename",
            CollisionMode::Skip => "skip",
            CollisionMode::Overwrite => "overwrite",
        };
        f.write_str(name)
    }
}

/// Aggregated outcome of one [`Executor::execute`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    pub moved_count: usize,
    pub skipped_count: usize,
    /// One formatted message per failed action, in action order.
    pub errors: Vec<String>,
}

impl ExecutionResult {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Errors raised while moving a single file.
#[derive(Debug, Error)]
pub enum MoveError {
    /// The destination exists and the strategy does not replace it.
    #[error("target already exists: {}", .0.display())]
    TargetExists(PathBuf),
    /// Every numbered candidate was taken.
    #[error("no free name for {} after {attempts} attempts", .path.display())]
    NamesExhausted { path: PathBuf, attempts: u32 },
    /// The target has no parent directory or file name.
    #[error("invalid target path: {}", .0.display())]
    InvalidTarget(PathBuf),
    #[error(transparent)]
    Guard(#[from] GuardError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

enum MoveOutcome {
    Moved(PathBuf),
    Skipped,
}

/// Moves files according to a collision strategy.
#[derive(Debug, Clone, Copy, Default)]
pub struct Executor {
    mode: CollisionMode,
}

impl Executor {
    pub fn new(mode: CollisionMode) -> Self {
        Self { mode }
    }

    /// Applies `actions` in order.
    ///
    /// In a dry run every action is counted as moved and the filesystem is
    /// left alone. Otherwise `on_moved` is called with the source and the
    /// final destination of every file actually moved, which may differ from
    /// the planned target under [`CollisionMode::Rename`].
    pub fn execute(
        &self,
        actions: &[Action],
        dry_run: bool,
        mut on_moved: Option<&mut dyn FnMut(&Path, &Path)>,
    ) -> ExecutionResult {
        let mut result = ExecutionResult::default();

        for action in actions {
            if dry_run {
                result.moved_count += 1;
                continue;
            }

            match self.apply(action) {
                Ok(MoveOutcome::Moved(final_target)) => {
                    tracing::debug!(
                        from = %action.source.display(),
                        to = %final_target.display(),
                        "moved"
                    );
                    result.moved_count += 1;
                    if let Some(listener) = on_moved.as_mut() {
                        listener(&action.source, &final_target);
                    }
                }
                Ok(MoveOutcome::Skipped) => {
                    tracing::info!(
                        path = %action.source.display(),
                        target = %action.target.display(),
                        "target exists, skipped"
                    );
                    result.skipped_count += 1;
                }
                Err(e) => {
                    tracing::warn!(path = %action.source.display(), error = %e, "move failed");
                    result
                        .errors
                        .push(format!("{}: {}", action.source.display(), e));
                    result.skipped_count += 1;
                }
            }
        }

        result
    }

    fn apply(&self, action: &Action) -> Result<MoveOutcome, MoveError> {
        let parent = action
            .target
            .parent()
            .ok_or_else(|| MoveError::InvalidTarget(action.target.clone()))?;

        assert_no_symlink_in_ancestry(parent)?;
        fs::create_dir_all(parent)?;

        match self.mode {
            CollisionMode::Rename => {
                move_with_rename(&action.source, &action.target).map(MoveOutcome::Moved)
            }
            CollisionMode::Skip => match move_no_clobber(&action.source, &action.target) {
                Ok(()) => Ok(MoveOutcome::Moved(action.target.clone())),
                Err(MoveError::TargetExists(_)) => Ok(MoveOutcome::Skipped),
                Err(e) => Err(e),
            },
            CollisionMode::Overwrite => {
                move_overwrite(&action.source, &action.target)?;
                Ok(MoveOutcome::Moved(action.target.clone()))
            }
        }
    }
}

fn move_with_rename(source: &Path, target: &Path) -> Result<PathBuf, MoveError> {
    match move_no_clobber(source, target) {
        Ok(()) => return Ok(target.to_path_buf()),
        Err(MoveError::TargetExists(_)) => {}
        Err(e) => return Err(e),
    }

    for n in 1..=MAX_RENAME_ATTEMPTS {
        let candidate = numbered_candidate(target, n)?;
        match move_no_clobber(source, &candidate) {
            Ok(()) => return Ok(candidate),
            Err(MoveError::TargetExists(_)) => continue,
            Err(e) => return Err(e),
        }
    }

    Err(MoveError::NamesExhausted {
        path: target.to_path_buf(),
        attempts: MAX_RENAME_ATTEMPTS,
    })
}

fn move_no_clobber(source: &Path, target: &Path) -> Result<(), MoveError> {
    if path_exists(target) {
        return Err(MoveError::TargetExists(target.to_path_buf()));
    }
    assert_no_symlink_in_ancestry(target)?;
    rename_or_copy(source, target)?;
    Ok(())
}

fn move_overwrite(source: &Path, target: &Path) -> Result<(), MoveError> {
    assert_no_symlink_in_ancestry(target)?;

    match fs::rename(source, target) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            fs::copy(source, target)?;
            fs::remove_file(source)?;
            Ok(())
        }
        Err(e) if path_exists(target) => {
            tracing::debug!(
                target = %target.display(),
                error = %e,
                "atomic replace failed, removing target first"
            );
            fs::remove_file(target)?;
            rename_or_copy(source, target)?;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Renames, falling back to copy and delete across filesystems.
pub(crate) fn rename_or_copy(source: &Path, target: &Path) -> io::Result<()> {
    match fs::rename(source, target) {
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            fs::copy(source, target)?;
            fs::remove_file(source)
        }
        other => other,
    }
}

/// True for anything at `path`, dangling symlinks included.
pub(crate) fn path_exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// `dir/name.ext` becomes `dir/name_<n>.ext`. The raw name bytes are kept.
fn numbered_candidate(target: &Path, n: u32) -> Result<PathBuf, MoveError> {
    let name = target
        .file_name()
        .ok_or_else(|| MoveError::InvalidTarget(target.to_path_buf()))?;

    let (stem, extension) = match (target.file_stem(), target.extension()) {
        (Some(stem), Some(ext)) if !ext.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    };

    let mut numbered = OsString::from(stem);
    numbered.push(format!("_{}", n));
    if let Some(ext) = extension {
        numbered.push(".");
        numbered.push(ext);
    }
    Ok(target.with_file_name(numbered))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, PathBuf) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = fs::canonicalize(temp_dir.path()).expect("Failed to canonicalize");
        (temp_dir, root)
    }

    fn write(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent");
        }
        fs::write(path, content).expect("Failed to write file");
    }

    fn action(source: PathBuf, target: PathBuf) -> Action {
        Action {
            source,
            target,
            reason: "test".to_string(),
        }
    }

    #[test]
    fn test_numbered_candidate() {
        let target = Path::new("/data/Text/X.txt");
        assert_eq!(
            numbered_candidate(target, 1).unwrap(),
            PathBuf::from("/data/Text/X_1.txt")
        );
        assert_eq!(
            numbered_candidate(Path::new("/data/Bin/tool"), 3).unwrap(),
            PathBuf::from("/data/Bin/tool_3")
        );
        assert_eq!(
            numbered_candidate(Path::new("/d/a.tar.gz"), 2).unwrap(),
            PathBuf::from("/d/a.tar_2.gz")
        );
        assert_eq!(
            numbered_candidate(Path::new("/d/notes."), 1).unwrap(),
            PathBuf::from("/d/notes._1")
        );
    }

    #[test]
    fn test_dry_run_touches_nothing() {
        let (_guard, root) = setup();
        let source = root.join("a.txt");
        write(&source, "a");
        let target = root.join("Text").join("a.txt");

        let mut calls = 0;
        let mut listener = |_: &Path, _: &Path| calls += 1;
        let result = Executor::new(CollisionMode::Rename).execute(
            &[action(source.clone(), target.clone())],
            true,
            Some(&mut listener),
        );

        assert_eq!(result.moved_count, 1);
        assert_eq!(result.skipped_count, 0);
        assert!(source.exists());
        assert!(!root.join("Text").exists());
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_move_creates_nested_parents_and_notifies() {
        let (_guard, root) = setup();
        let source = root.join("pic.jpg");
        write(&source, "jpg");
        let target = root.join("Media").join("Images").join("pic.jpg");

        let mut seen = Vec::new();
        let mut listener = |from: &Path, to: &Path| seen.push((from.to_path_buf(), to.to_path_buf()));
        let result = Executor::new(CollisionMode::Rename).execute(
            &[action(source.clone(), target.clone())],
            false,
            Some(&mut listener),
        );

        assert_eq!(result.moved_count, 1);
        assert!(result.is_clean());
        assert!(target.exists());
        assert!(!source.exists());
        assert_eq!(seen, vec![(source, target)]);
    }

    #[test]
    fn test_rename_collision_numbers_targets() {
        let (_guard, root) = setup();
        let target = root.join("Text").join("X.txt");
        write(&target, "existing");
        let first = root.join("a").join("X.txt");
        let second = root.join("b").join("X.txt");
        write(&first, "first");
        write(&second, "second");

        let mut finals = Vec::new();
        let mut listener = |_: &Path, to: &Path| finals.push(to.to_path_buf());
        let result = Executor::new(CollisionMode::Rename).execute(
            &[
                action(first, target.clone()),
                action(second, target.clone()),
            ],
            false,
            Some(&mut listener),
        );

        assert_eq!(result.moved_count, 2);
        let x1 = root.join("Text").join("X_1.txt");
        let x2 = root.join("Text").join("X_2.txt");
        assert_eq!(finals, vec![x1.clone(), x2.clone()]);
        assert_eq!(fs::read_to_string(&target).unwrap(), "existing");
        assert_eq!(fs::read_to_string(&x1).unwrap(), "first");
        assert_eq!(fs::read_to_string(&x2).unwrap(), "second");
    }

    #[test]
    fn test_skip_collision_leaves_source() {
        let (_guard, root) = setup();
        let target = root.join("Text").join("X.txt");
        write(&target, "existing");
        let source = root.join("X.txt");
        write(&source, "incoming");

        let result = Executor::new(CollisionMode::Skip).execute(
            &[action(source.clone(), target.clone())],
            false,
            None,
        );

        assert_eq!(result.moved_count, 0);
        assert_eq!(result.skipped_count, 1);
        assert!(result.errors.is_empty());
        assert_eq!(fs::read_to_string(&source).unwrap(), "incoming");
        assert_eq!(fs::read_to_string(&target).unwrap(), "existing");
    }

    #[test]
    fn test_overwrite_replaces_target() {
        let (_guard, root) = setup();
        let target = root.join("Text").join("X.txt");
        write(&target, "existing");
        let source = root.join("X.txt");
        write(&source, "incoming");

        let result = Executor::new(CollisionMode::Overwrite).execute(
            &[action(source.clone(), target.clone())],
            false,
            None,
        );

        assert_eq!(result.moved_count, 1);
        assert!(!source.exists());
        assert_eq!(fs::read_to_string(&target).unwrap(), "incoming");
    }

    #[test]
    fn test_rename_gives_up_after_attempt_budget() {
        let (_guard, root) = setup();
        let text = root.join("Text");
        write(&text.join("X.txt"), "taken");
        for n in 1..=MAX_RENAME_ATTEMPTS {
            write(&text.join(format!("X_{}.txt", n)), "taken");
        }
        let source = root.join("X.txt");
        write(&source, "incoming");

        let result = Executor::new(CollisionMode::Rename).execute(
            &[action(source.clone(), text.join("X.txt"))],
            false,
            None,
        );

        assert_eq!(result.moved_count, 0);
        assert_eq!(result.skipped_count, 1);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("no free name"));
        assert_eq!(fs::read_to_string(&source).unwrap(), "incoming");
        assert!(!text.join(format!("X_{}.txt", MAX_RENAME_ATTEMPTS + 1)).exists());
    }

    #[test]
    fn test_overwrite_onto_directory_fails_and_keeps_both() {
        let (_guard, root) = setup();
        let target = root.join("Text").join("X.txt");
        fs::create_dir_all(&target).expect("Failed to create directory");
        let source = root.join("X.txt");
        write(&source, "incoming");

        let result = Executor::new(CollisionMode::Overwrite).execute(
            &[action(source.clone(), target.clone())],
            false,
            None,
        );

        assert_eq!(result.moved_count, 0);
        assert_eq!(result.skipped_count, 1);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(fs::read_to_string(&source).unwrap(), "incoming");
        assert!(target.is_dir());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_rename_keeps_non_utf8_name_bytes() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let (_guard, root) = setup();
        let name = OsStr::from_bytes(b"caf\xff.pdf");
        let target = root.join("Documents").join(name);
        write(&target, "existing");
        let source = root.join("sub").join(name);
        write(&source, "incoming");

        let mut finals = Vec::new();
        let mut listener = |_: &Path, to: &Path| finals.push(to.to_path_buf());
        let result = Executor::new(CollisionMode::Rename).execute(
            &[action(source, target.clone())],
            false,
            Some(&mut listener),
        );

        let expected = root
            .join("Documents")
            .join(OsStr::from_bytes(b"caf\xff_1.pdf"));
        assert_eq!(result.moved_count, 1);
        assert_eq!(finals, vec![expected.clone()]);
        assert_eq!(fs::read_to_string(&expected).unwrap(), "incoming");
        assert_eq!(fs::read_to_string(&target).unwrap(), "existing");
    }

    #[test]
    fn test_failure_is_recorded_and_batch_continues() {
        let (_guard, root) = setup();
        let missing = root.join("gone.txt");
        let present = root.join("here.txt");
        write(&present, "here");

        let result = Executor::new(CollisionMode::Rename).execute(
            &[
                action(missing.clone(), root.join("Text").join("gone.txt")),
                action(present, root.join("Text").join("here.txt")),
            ],
            false,
            None,
        );

        assert_eq!(result.moved_count, 1);
        assert_eq!(result.skipped_count, 1);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].starts_with(&missing.display().to_string()));
        assert!(root.join("Text").join("here.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_target_parent_is_refused() {
        let (_guard, root) = setup();
        let (_outside_guard, outside) = setup();
        std::os::unix::fs::symlink(&outside, root.join("Text")).expect("Failed to symlink");
        let source = root.join("a.txt");
        write(&source, "a");

        let result = Executor::new(CollisionMode::Rename).execute(
            &[action(source.clone(), root.join("Text").join("a.txt"))],
            false,
            None,
        );

        assert_eq!(result.moved_count, 0);
        assert_eq!(result.errors.len(), 1);
        assert!(source.exists());
        assert!(!outside.join("a.txt").exists());
    }

    #[test]
    fn test_collision_mode_display_and_serde() {
        assert_eq!(CollisionMode::Overwrite.to_string(), "overwrite");
        let json = serde_json::to_string(&CollisionMode::Skip).unwrap();
        assert_eq!(json, "\"skip\"");
        let mode: CollisionMode = serde_json::from_str("\"rename\"").unwrap();
        assert_eq!(mode, CollisionMode::Rename);
    }
}
