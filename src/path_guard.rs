//! Path-safety checks applied before any filesystem mutation.
//!
//! Two layers guard every move. Rule folders are checked with
//! [`validate_relative_subpath`] when a rule set is loaded, and again through
//! [`safe_resolve_within`] when the planner turns a folder into a concrete
//! directory under the source root. [`assert_no_symlink_in_ancestry`] is run
//! right before a file is created so a symlink swapped in after planning is
//! still caught.

use regex::Regex;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;

/// Directories a source tree may never live under.
#[cfg(unix)]
const FORBIDDEN_DIRS: &[&str] = &[
    "/bin",
    "/boot",
    "/dev",
    "/etc",
    "/lib",
    "/lib32",
    "/lib64",
    "/proc",
    "/sbin",
    "/sys",
    "/usr",
    "/System",
    "/Library",
    "/private/etc",
];

#[cfg(windows)]
const FORBIDDEN_DIRS: &[&str] = &[
    r"C:\Windows",
    r"C:\Program Files",
    r"C:\Program Files (x86)",
    r"C:\ProgramData",
];

#[cfg(not(any(unix, windows)))]
const FORBIDDEN_DIRS: &[&str] = &[];

static DRIVE_LETTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z]:").expect("Invalid drive-letter pattern"));

/// Errors raised when a path fails a safety policy.
#[derive(Debug, Error)]
pub enum GuardError {
    /// The subpath contains a `..` segment.
    #[error("path traversal segment '..' in '{0}'")]
    Traversal(String),
    /// The subpath is absolute (leading separator or drive letter).
    #[error("absolute path not allowed: '{0}'")]
    Absolute(String),
    /// The subpath is empty or contains a NUL byte.
    #[error("invalid subpath: '{0}'")]
    InvalidSubpath(String),
    /// The resolved path is not inside the root.
    #[error("{} escapes root {}", .path.display(), .root.display())]
    EscapesRoot { path: PathBuf, root: PathBuf },
    /// A symbolic link was found on the path.
    #[error("symbolic link in path: {}", .0.display())]
    Symlink(PathBuf),
    /// The path lies in a protected system location.
    #[error("refusing to operate inside system directory {}", .0.display())]
    ForbiddenDirectory(PathBuf),
    /// The path could not be inspected.
    #[error("cannot inspect {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Checks that `path` is acceptable as the root of an organize run.
///
/// Fails when the path is the filesystem root, lies under one of the
/// platform's system directories, or when any existing component of it is a
/// symbolic link.
pub fn validate_source_dir(path: &Path) -> Result<(), GuardError> {
    let normalized = normalize(&absolutize(path)?);

    if normalized.parent().is_none() {
        return Err(GuardError::ForbiddenDirectory(normalized));
    }

    if let Some(forbidden) = FORBIDDEN_DIRS
        .iter()
        .map(Path::new)
        .find(|dir| is_within(&normalized, dir))
    {
        return Err(GuardError::ForbiddenDirectory(forbidden.to_path_buf()));
    }

    assert_no_symlink_in_ancestry(&normalized)
}

/// Checks a relative folder string coming from a rule definition.
///
/// Rejects empty strings, NUL bytes, any `..` segment (with either separator),
/// a leading `/` or `\`, and drive-letter prefixes such as `C:`.
pub fn validate_relative_subpath(subpath: &str) -> Result<(), GuardError> {
    if subpath.trim().is_empty() || subpath.contains('\0') {
        return Err(GuardError::InvalidSubpath(subpath.to_string()));
    }

    if subpath.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(GuardError::Traversal(subpath.to_string()));
    }

    if subpath.starts_with('/') || subpath.starts_with('\\') || DRIVE_LETTER.is_match(subpath) {
        return Err(GuardError::Absolute(subpath.to_string()));
    }

    Ok(())
}

/// Resolves `subpath` under `root`, returning the normalized absolute path.
///
/// The lexical checks of [`validate_relative_subpath`] run first. The joined
/// path is then normalized and must still start with the root; if it already
/// exists on disk its canonical form must also lie under the canonical root,
/// which catches a folder that is itself a symlink pointing elsewhere.
pub fn safe_resolve_within(root: &Path, subpath: &str) -> Result<PathBuf, GuardError> {
    validate_relative_subpath(subpath)?;

    let root = normalize(&absolutize(root)?);
    let resolved = normalize(&root.join(subpath));

    if !resolved.starts_with(&root) {
        return Err(GuardError::EscapesRoot {
            path: resolved,
            root,
        });
    }

    if fs::symlink_metadata(&resolved).is_ok() {
        let canonical_root = canonicalize(&root)?;
        let canonical = canonicalize(&resolved)?;
        if !canonical.starts_with(&canonical_root) {
            return Err(GuardError::EscapesRoot {
                path: canonical,
                root: canonical_root,
            });
        }
    }

    Ok(resolved)
}

/// Fails if `path` or any of its existing ancestors is a symbolic link.
///
/// Components that do not exist yet are ignored, so this can be called on a
/// file that is about to be created.
pub fn assert_no_symlink_in_ancestry(path: &Path) -> Result<(), GuardError> {
    let absolute = absolutize(path)?;

    for ancestor in absolute.ancestors() {
        match fs::symlink_metadata(ancestor) {
            Ok(meta) if meta.file_type().is_symlink() => {
                return Err(GuardError::Symlink(ancestor.to_path_buf()));
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(GuardError::Io {
                    path: ancestor.to_path_buf(),
                    source: e,
                });
            }
        }
    }

    Ok(())
}

/// Lexically normalizes a path: drops `.` and folds `..` into its parent.
///
/// No filesystem access is performed.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

fn absolutize(path: &Path) -> Result<PathBuf, GuardError> {
    std::path::absolute(path).map_err(|e| GuardError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

fn canonicalize(path: &Path) -> Result<PathBuf, GuardError> {
    fs::canonicalize(path).map_err(|e| GuardError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(windows)]
fn is_within(path: &Path, dir: &Path) -> bool {
    let path = path.to_string_lossy().to_lowercase();
    let dir = dir.to_string_lossy().to_lowercase();
    path == dir || path.starts_with(&format!("{}\\", dir))
}

#[cfg(not(windows))]
fn is_within(path: &Path, dir: &Path) -> bool {
    path.starts_with(dir)
}
