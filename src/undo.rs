/// Undo journal for reverting organize runs.
///
/// Every executed batch is appended as a [`Run`] to a JSON journal kept in a
/// reserved directory under the source root. [`UndoJournal::undo_last`] moves
/// the files of the newest run back and drops that run, leaving older runs
/// available for later undo calls.
///
/// The journal is read, changed and rewritten by a single process. Two
/// processes working on the same tree at once are not coordinated.
use crate::executor::{CollisionMode, path_exists, rename_or_copy};
use crate::path_guard::{GuardError, assert_no_symlink_in_ancestry};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Reserved directory under the source root holding the journal.
pub const JOURNAL_DIR: &str = ".dirsort";

/// Journal file name inside [`JOURNAL_DIR`].
pub const JOURNAL_FILE: &str = "journal.json";

const JOURNAL_VERSION: u32 = 1;

/// Errors that can occur while reading, writing or replaying the journal.
#[derive(Debug, Error)]
pub enum JournalError {
    /// The source root does not exist or is not a directory.
    #[error("Invalid source root {}", .0.display())]
    InvalidRoot(PathBuf),
    /// Failed to read or write the journal file.
    #[error("Journal I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The journal exists but cannot be parsed.
    #[error("Corrupt journal {}: {reason}", .path.display())]
    Corrupt { path: PathBuf, reason: String },
    /// The journal was written by an incompatible version.
    #[error("Unsupported journal version {0}")]
    UnsupportedVersion(u32),
    #[error(transparent)]
    Guard(#[from] GuardError),
}

pub type JournalResult<T> = Result<T, JournalError>;

/// One executed move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRecord {
    pub from: PathBuf,
    pub to: PathBuf,
}

impl MoveRecord {
    pub fn new(from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// One journaled batch of moves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    /// RFC 3339 timestamp of when the run was recorded.
    pub timestamp: String,
    pub collision_mode: CollisionMode,
    pub moves: Vec<MoveRecord>,
}

/// The on-disk journal: runs in the order they were appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Journal {
    pub version: u32,
    pub runs: Vec<Run>,
}

impl Default for Journal {
    fn default() -> Self {
        Self {
            version: JOURNAL_VERSION,
            runs: Vec::new(),
        }
    }
}

impl Journal {
    /// Path of the journal file for a source root.
    pub fn path(root: &Path) -> PathBuf {
        root.join(JOURNAL_DIR).join(JOURNAL_FILE)
    }

    /// Loads the journal, or `None` if the tree has never been journaled.
    pub fn load(root: &Path) -> JournalResult<Option<Self>> {
        let path = Self::path(root);
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path).map_err(io_error(&path))?;

        let journal: Journal =
            serde_json::from_str(&content).map_err(|e| JournalError::Corrupt {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        if journal.version != JOURNAL_VERSION {
            return Err(JournalError::UnsupportedVersion(journal.version));
        }

        Ok(Some(journal))
    }

    /// Writes the journal through a temporary file and a rename.
    pub fn save(&self, root: &Path) -> JournalResult<()> {
        let path = Self::path(root);
        let dir = root.join(JOURNAL_DIR);

        assert_no_symlink_in_ancestry(&path)?;
        fs::create_dir_all(&dir).map_err(io_error(&dir))?;

        let json = serde_json::to_string_pretty(self).map_err(|e| JournalError::Io {
            path: path.clone(),
            source: io::Error::new(io::ErrorKind::InvalidData, e),
        })?;

        let temp_path = dir.join(format!("{}.tmp", JOURNAL_FILE));
        fs::write(&temp_path, json).map_err(io_error(&temp_path))?;
        if let Err(e) = fs::rename(&temp_path, &path) {
            let _ = fs::remove_file(&temp_path);
            return Err(JournalError::Io { path, source: e });
        }
        Ok(())
    }

    /// Removes the journal file and, if it is then empty, its directory.
    pub fn delete(root: &Path) -> JournalResult<()> {
        let path = Self::path(root);
        if path.exists() {
            fs::remove_file(&path).map_err(io_error(&path))?;
        }
        let _ = fs::remove_dir(root.join(JOURNAL_DIR));
        Ok(())
    }
}

/// Counts and messages from one undo call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UndoReport {
    /// Files moved back to their original location.
    pub restored: usize,
    /// Moves that were not reversed.
    pub skipped: usize,
    /// Explanations for skipped moves that need attention.
    pub errors: Vec<String>,
}

impl UndoReport {
    /// Returns the total number of moves processed.
    pub fn total_processed(&self) -> usize {
        self.restored + self.skipped
    }

    /// Returns true if every recorded move was reversed.
    pub fn is_complete_success(&self) -> bool {
        self.skipped == 0 && self.errors.is_empty()
    }
}

/// Result of [`UndoJournal::undo_last`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoOutcome {
    /// The newest run was replayed in reverse and removed.
    Undone(UndoReport),
    /// No journal exists, or it holds no runs.
    NothingToUndo,
}

/// Records runs and reverses the most recent one.
pub struct UndoJournal;

impl UndoJournal {
    /// Appends a run for `root`. Does nothing when `moves` is empty.
    pub fn append_run(
        root: &Path,
        collision_mode: CollisionMode,
        moves: Vec<MoveRecord>,
    ) -> JournalResult<()> {
        if moves.is_empty() {
            return Ok(());
        }
        if !root.is_dir() {
            return Err(JournalError::InvalidRoot(root.to_path_buf()));
        }

        let mut journal = Journal::load(root)?.unwrap_or_default();
        let count = moves.len();
        journal.runs.push(Run {
            timestamp: chrono::Utc::now().to_rfc3339(),
            collision_mode,
            moves,
        });
        journal.save(root)?;

        tracing::info!(
            root = %root.display(),
            moves = count,
            runs = journal.runs.len(),
            "journaled run"
        );
        Ok(())
    }

    /// Reverses the newest run of `root`.
    ///
    /// Moves are replayed in recorded order. A move whose destination is gone
    /// is skipped with an error note; a move whose original location is
    /// occupied again is skipped silently. The run is removed from the
    /// journal afterwards either way.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use dirsort::undo::{UndoJournal, UndoOutcome};
    /// use std::path::Path;
    ///
    /// match UndoJournal::undo_last(Path::new("/path/to/directory")) {
    ///     Ok(UndoOutcome::Undone(report)) => println!("Restored {} files", report.restored),
    ///     Ok(UndoOutcome::NothingToUndo) => println!("Nothing to undo"),
    ///     Err(e) => eprintln!("Undo failed: {}", e),
    /// }
    /// ```
    pub fn undo_last(root: &Path) -> JournalResult<UndoOutcome> {
        if !root.is_dir() {
            return Err(JournalError::InvalidRoot(root.to_path_buf()));
        }

        let Some(mut journal) = Journal::load(root)? else {
            return Ok(UndoOutcome::NothingToUndo);
        };
        let Some(run) = journal.runs.pop() else {
            return Ok(UndoOutcome::NothingToUndo);
        };

        let mut report = UndoReport::default();
        for record in &run.moves {
            match Self::restore(record) {
                Ok(true) => {
                    report.restored += 1;
                    prune_empty_dirs(&record.to, root);
                }
                Ok(false) => report.skipped += 1,
                Err(reason) => {
                    tracing::warn!(from = %record.from.display(), %reason, "restore failed");
                    report.skipped += 1;
                    report.errors.push(reason);
                }
            }
        }

        if journal.runs.is_empty() {
            Journal::delete(root)?;
        } else {
            journal.save(root)?;
        }

        tracing::info!(
            root = %root.display(),
            restored = report.restored,
            skipped = report.skipped,
            remaining_runs = journal.runs.len(),
            "undo finished"
        );
        Ok(UndoOutcome::Undone(report))
    }

    /// Lists the journaled runs of `root`, oldest first.
    pub fn runs(root: &Path) -> JournalResult<Vec<Run>> {
        Ok(Journal::load(root)?.map(|j| j.runs).unwrap_or_default())
    }

    /// Moves one file back. `Ok(false)` means it was skipped without error.
    fn restore(record: &MoveRecord) -> Result<bool, String> {
        if !path_exists(&record.to) {
            return Err(format!(
                "{}: file not found at expected location, cannot restore to {}",
                record.to.display(),
                record.from.display()
            ));
        }

        if path_exists(&record.from) {
            tracing::debug!(
                from = %record.from.display(),
                "original location is occupied, leaving file in place"
            );
            return Ok(false);
        }

        if let Some(parent) = record.from.parent() {
            assert_no_symlink_in_ancestry(parent)
                .map_err(|e| format!("{}: {}", record.from.display(), e))?;
            fs::create_dir_all(parent)
                .map_err(|e| format!("{}: could not recreate directory: {}", parent.display(), e))?;
        }

        rename_or_copy(&record.to, &record.from)
            .map_err(|e| format!("{}: failed to restore file: {}", record.to.display(), e))?;
        Ok(true)
    }
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> JournalError {
    let path = path.to_path_buf();
    move |source| JournalError::Io { path, source }
}

/// Removes directories left empty by a restore, walking up towards `root`.
fn prune_empty_dirs(moved_from: &Path, root: &Path) {
    let mut dir = moved_from.parent();
    while let Some(current) = dir {
        if current == root || !current.starts_with(root) {
            break;
        }
        if fs::remove_dir(current).is_err() {
            break;
        }
        dir = current.parent();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Executor;
    use crate::planner::Action;
    use tempfile::TempDir;

    fn setup() -> (TempDir, PathBuf) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = fs::canonicalize(temp_dir.path()).expect("Failed to canonicalize");
        (temp_dir, root)
    }

    /// Moves `name` from the root into `folder` and returns the record.
    fn move_file(root: &Path, name: &str, folder: &str) -> MoveRecord {
        let from = root.join(name);
        fs::write(&from, name).expect("Failed to write file");
        let action = Action {
            source: from.clone(),
            target: root.join(folder).join(name),
            reason: "test".to_string(),
        };

        let mut records = Vec::new();
        let mut listener = |f: &Path, t: &Path| records.push(MoveRecord::new(f, t));
        let result = Executor::new(CollisionMode::Rename).execute(&[action], false, Some(&mut listener));
        assert_eq!(result.moved_count, 1);
        records.remove(0)
    }

    #[test]
    fn test_append_empty_run_is_noop() {
        let (_guard, root) = setup();
        UndoJournal::append_run(&root, CollisionMode::Rename, Vec::new()).expect("Append failed");
        assert!(!Journal::path(&root).exists());
    }

    #[test]
    fn test_append_preserves_paths_and_order() {
        let (_guard, root) = setup();
        let moves = vec![
            MoveRecord::new(root.join("b.txt"), root.join("Text/b.txt")),
            MoveRecord::new(root.join("a.txt"), root.join("Text/a.txt")),
        ];
        UndoJournal::append_run(&root, CollisionMode::Skip, moves.clone()).expect("Append failed");

        let runs = UndoJournal::runs(&root).expect("Load failed");
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].moves, moves);
        assert_eq!(runs[0].collision_mode, CollisionMode::Skip);
        assert!(chrono::DateTime::parse_from_rfc3339(&runs[0].timestamp).is_ok());
    }

    #[test]
    fn test_undo_without_journal() {
        let (_guard, root) = setup();
        let outcome = UndoJournal::undo_last(&root).expect("Undo failed");
        assert_eq!(outcome, UndoOutcome::NothingToUndo);
    }

    #[test]
    fn test_undo_restores_and_removes_run() {
        let (_guard, root) = setup();
        let record = move_file(&root, "report.pdf", "Documents");
        UndoJournal::append_run(&root, CollisionMode::Rename, vec![record.clone()])
            .expect("Append failed");

        let outcome = UndoJournal::undo_last(&root).expect("Undo failed");
        let UndoOutcome::Undone(report) = outcome else {
            panic!("Expected a run to be undone");
        };
        assert_eq!(report.restored, 1);
        assert!(report.is_complete_success());
        assert!(record.from.exists());
        assert!(!record.to.exists());
        assert!(!root.join("Documents").exists());
        assert!(!root.join(JOURNAL_DIR).exists());

        let again = UndoJournal::undo_last(&root).expect("Undo failed");
        assert_eq!(again, UndoOutcome::NothingToUndo);
    }

    #[test]
    fn test_undo_only_reverts_latest_run() {
        let (_guard, root) = setup();
        let first = move_file(&root, "one.txt", "Text");
        UndoJournal::append_run(&root, CollisionMode::Rename, vec![first.clone()])
            .expect("Append failed");
        let second = move_file(&root, "two.jpg", "Images");
        UndoJournal::append_run(&root, CollisionMode::Rename, vec![second.clone()])
            .expect("Append failed");

        let outcome = UndoJournal::undo_last(&root).expect("Undo failed");
        assert!(matches!(outcome, UndoOutcome::Undone(ref r) if r.restored == 1));
        assert!(second.from.exists());
        assert!(first.to.exists());

        let runs = UndoJournal::runs(&root).expect("Load failed");
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].moves, vec![first]);
    }

    #[test]
    fn test_undo_with_missing_destination() {
        let (_guard, root) = setup();
        let record = MoveRecord::new(root.join("ghost.txt"), root.join("Text/ghost.txt"));
        UndoJournal::append_run(&root, CollisionMode::Rename, vec![record]).expect("Append failed");

        let Ok(UndoOutcome::Undone(report)) = UndoJournal::undo_last(&root) else {
            panic!("Expected a run to be undone");
        };
        assert_eq!(report.restored, 0);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.errors.len(), 1);
        assert!(UndoJournal::runs(&root).expect("Load failed").is_empty());
    }

    #[test]
    fn test_undo_with_occupied_original_location() {
        let (_guard, root) = setup();
        let record = move_file(&root, "test.txt", "Text");
        UndoJournal::append_run(&root, CollisionMode::Rename, vec![record.clone()])
            .expect("Append failed");
        fs::write(&record.from, "new content").expect("Failed to create conflict");

        let Ok(UndoOutcome::Undone(report)) = UndoJournal::undo_last(&root) else {
            panic!("Expected a run to be undone");
        };
        assert_eq!(report.restored, 0);
        assert_eq!(report.skipped, 1);
        assert!(report.errors.is_empty());
        assert_eq!(fs::read_to_string(&record.from).unwrap(), "new content");
        assert!(record.to.exists());
    }

    #[test]
    fn test_undo_recreates_original_parents() {
        let (_guard, root) = setup();
        let from = root.join("deep").join("nested").join("file.md");
        let to = root.join("Documents").join("file.md");
        fs::create_dir_all(to.parent().unwrap()).unwrap();
        fs::write(&to, "md").unwrap();
        UndoJournal::append_run(&root, CollisionMode::Rename, vec![MoveRecord::new(&from, &to)])
            .expect("Append failed");

        let Ok(UndoOutcome::Undone(report)) = UndoJournal::undo_last(&root) else {
            panic!("Expected a run to be undone");
        };
        assert_eq!(report.restored, 1);
        assert_eq!(fs::read_to_string(&from).unwrap(), "md");
    }

    #[test]
    fn test_corrupt_journal_is_reported() {
        let (_guard, root) = setup();
        fs::create_dir_all(root.join(JOURNAL_DIR)).unwrap();
        fs::write(Journal::path(&root), "{ not json").unwrap();

        let result = UndoJournal::undo_last(&root);
        assert!(matches!(result, Err(JournalError::Corrupt { .. })));
    }

    #[test]
    fn test_unknown_version_is_rejected() {
        let (_guard, root) = setup();
        fs::create_dir_all(root.join(JOURNAL_DIR)).unwrap();
        fs::write(Journal::path(&root), r#"{"version": 99, "runs": []}"#).unwrap();

        let result = UndoJournal::runs(&root);
        assert!(matches!(result, Err(JournalError::UnsupportedVersion(99))));
    }

    #[test]
    fn test_undo_invalid_root() {
        let result = UndoJournal::undo_last(Path::new("/non/existent/path"));
        assert!(matches!(result, Err(JournalError::InvalidRoot(_))));
    }
}
