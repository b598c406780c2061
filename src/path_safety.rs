//! Containment checks for paths the tool writes to.
//!
//! [`PathCheck::Lexical`] only normalizes `.` and `..` components, so a symlink
//! inside the root that points elsewhere passes. [`PathCheck::Resolved`]
//! canonicalizes the nearest existing ancestor first and rejects such links.

use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathCheck {
    Lexical,
    #[default]
    Resolved,
}

#[derive(Debug, thiserror::Error)]
pub enum PathSafetyError {
    #[error("{path} is outside of {root}")]
    Escapes { path: PathBuf, root: PathBuf },
    #[error("cannot resolve {path}: {source}")]
    Resolve {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Removes `.` components and folds `..` into the preceding component.
///
/// `..` at the root of an absolute path is dropped, as the OS would.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = match normalized.components().next_back() {
                    Some(Component::Normal(_)) => normalized.pop(),
                    _ => false,
                };
                if !popped && !normalized.has_root() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Returns the checked absolute form of `candidate` if it stays inside `root`.
///
/// Relative candidates are taken relative to `root`.
pub fn ensure_within(
    root: &Path,
    candidate: &Path,
    mode: PathCheck,
) -> Result<PathBuf, PathSafetyError> {
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root.join(candidate)
    };

    let (root, checked) = match mode {
        PathCheck::Lexical => (normalize_lexically(root), normalize_lexically(&joined)),
        PathCheck::Resolved => (canonical(root)?, resolve_existing_prefix(&joined)?),
    };

    if checked.starts_with(&root) {
        Ok(checked)
    } else {
        Err(PathSafetyError::Escapes {
            path: checked,
            root,
        })
    }
}

fn canonical(path: &Path) -> Result<PathBuf, PathSafetyError> {
    path.canonicalize().map_err(|source| PathSafetyError::Resolve {
        path: path.to_path_buf(),
        source,
    })
}

/// Canonicalizes the longest existing prefix of `path` and re-appends the rest.
fn resolve_existing_prefix(path: &Path) -> Result<PathBuf, PathSafetyError> {
    let normalized = normalize_lexically(path);
    let mut existing = normalized.as_path();
    let mut remainder = Vec::new();

    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                remainder.push(name.to_os_string());
                existing = parent;
            }
            _ => break,
        }
    }

    let mut resolved = canonical(existing)?;
    for part in remainder.into_iter().rev() {
        resolved.push(part);
    }
    Ok(resolved)
}
