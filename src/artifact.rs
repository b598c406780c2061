//! On-disk summaries: one file per directory.
//!
//! Reads look for the current file name first and fall back to the legacy one.
//! Writes only ever produce the current name, atomically and readable by the
//! owner alone, since summaries may quote source code.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info};

use crate::ignore_chain::{ARTIFACT_FILE_NAME, LEGACY_ARTIFACT_FILE_NAME};
use crate::path_safety::{ensure_within, PathCheck, PathSafetyError};

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("failed to read summary {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write summary {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("refusing to write summary: {0}")]
    Unsafe(#[from] PathSafetyError),
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
    path_check: PathCheck,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>, path_check: PathCheck) -> Self {
        Self {
            root: root.into(),
            path_check,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where a new summary for `dir` is written.
    pub fn current_path(&self, dir: &Path) -> PathBuf {
        dir.join(ARTIFACT_FILE_NAME)
    }

    /// Existing summary for `dir`, preferring the current file name.
    ///
    /// Only a missing file counts as absent. Any other failure to stat a
    /// candidate (permissions, I/O) is returned so it is not mistaken for
    /// "never summarised".
    pub fn locate(&self, dir: &Path) -> Result<Option<(PathBuf, fs::Metadata)>, ArtifactError> {
        for name in [ARTIFACT_FILE_NAME, LEGACY_ARTIFACT_FILE_NAME] {
            let path = dir.join(name);
            match fs::metadata(&path) {
                Ok(meta) if meta.is_file() => return Ok(Some((path, meta))),
                Ok(_) => continue,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(source) => return Err(ArtifactError::Read { path, source }),
            }
        }
        Ok(None)
    }

    pub fn modified(&self, dir: &Path) -> Result<Option<SystemTime>, ArtifactError> {
        let Some((path, meta)) = self.locate(dir)? else {
            return Ok(None);
        };
        let modified = meta
            .modified()
            .map_err(|source| ArtifactError::Read { path, source })?;
        Ok(Some(modified))
    }

    /// Summary text for `dir`. Bytes that are not valid UTF-8 are replaced.
    pub fn read(&self, dir: &Path) -> Result<Option<String>, ArtifactError> {
        let Some((path, _)) = self.locate(dir)? else {
            return Ok(None);
        };
        let bytes = fs::read(&path).map_err(|source| ArtifactError::Read { path, source })?;
        Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
    }

    /// Atomically replaces the summary for `dir` and returns its path.
    pub fn write(&self, dir: &Path, content: &str) -> Result<PathBuf, ArtifactError> {
        let target = ensure_within(&self.root, &self.current_path(dir), self.path_check)?;
        let write_err = |source| ArtifactError::Write {
            path: target.clone(),
            source,
        };

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
        restrict_to_owner(tmp.as_file()).map_err(write_err)?;
        tmp.write_all(content.as_bytes()).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(&target).map_err(|e| write_err(e.error))?;
        // The rename bumps the directory's own mtime; the summary must not look older.
        fs::File::options()
            .write(true)
            .open(&target)
            .and_then(|file| file.set_modified(SystemTime::now()))
            .map_err(write_err)?;

        debug!(path = %target.display(), bytes = content.len(), "Summary persisted");
        info!(dir = %dir.display(), "Wrote summary");
        Ok(target)
    }
}

#[cfg(unix)]
fn restrict_to_owner(file: &fs::File) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_to_owner(_file: &fs::File) -> std::io::Result<()> {
    Ok(())
}
