//! Breadth-first discovery of the directories that take part in a run.
//!
//! The scanner decides which subdirectories to descend into using the
//! [`IgnoreChain`] inherited from their ancestors. An ignored directory is
//! pruned together with everything below it. The chains resolved here are kept
//! in the [`ScanResult`] so later passes never re-read ignore files.

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::ignore_chain::{is_always_ignored, IgnoreChain, IgnoreResolver};

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("scan root {path} is not a readable directory: {source}")]
    Root {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("scan root {0} is not a directory")]
    NotADirectory(PathBuf),
}

/// Included directories in discovery order plus each one's resolved chain.
#[derive(Debug, Clone)]
pub struct ScanResult {
    root: PathBuf,
    directories: Vec<PathBuf>,
    chains: HashMap<PathBuf, IgnoreChain>,
    children: HashMap<PathBuf, Vec<PathBuf>>,
}

impl ScanResult {
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Root first, then breadth-first discovery order.
    pub fn directories(&self) -> &[PathBuf] {
        &self.directories
    }

    pub fn len(&self) -> usize {
        self.directories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directories.is_empty()
    }

    pub fn contains(&self, dir: &Path) -> bool {
        self.chains.contains_key(dir)
    }

    /// Chain that applies to the contents of `dir` (its own rule included).
    pub fn chain(&self, dir: &Path) -> Option<&IgnoreChain> {
        self.chains.get(dir)
    }

    pub fn chains(&self) -> &HashMap<PathBuf, IgnoreChain> {
        &self.chains
    }

    /// Included immediate subdirectories of `dir`, sorted by name.
    pub fn children(&self, dir: &Path) -> &[PathBuf] {
        self.children.get(dir).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Walks a tree applying per-directory ignore rules.
#[derive(Debug, Clone, Default)]
pub struct Scanner {
    resolver: IgnoreResolver,
}

impl Scanner {
    pub fn new(resolver: IgnoreResolver) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &IgnoreResolver {
        &self.resolver
    }

    /// Scans `root` breadth-first.
    ///
    /// The root is always included. Failing to list a directory only drops
    /// that directory's subtree from discovery.
    pub fn scan(&self, root: &Path) -> Result<ScanResult, ScanError> {
        let meta = fs::metadata(root).map_err(|source| ScanError::Root {
            path: root.to_path_buf(),
            source,
        })?;
        if !meta.is_dir() {
            return Err(ScanError::NotADirectory(root.to_path_buf()));
        }

        info!(root = %root.display(), "[SCAN] Starting directory scan");

        let mut directories = Vec::new();
        let mut chains = HashMap::new();
        let mut children: HashMap<PathBuf, Vec<PathBuf>> = HashMap::new();
        let mut queue: VecDeque<(PathBuf, IgnoreChain)> = VecDeque::new();
        queue.push_back((root.to_path_buf(), IgnoreChain::new()));

        while let Some((dir, inherited)) = queue.pop_front() {
            if dir != root && inherited.is_ignored(&dir, true) {
                debug!(dir = %dir.display(), "[SCAN] Pruning ignored directory");
                continue;
            }

            let chain = inherited.extended(self.resolver.load_rule(&dir));
            if let Some(parent) = dir.parent() {
                if dir != root {
                    children
                        .entry(parent.to_path_buf())
                        .or_default()
                        .push(dir.clone());
                }
            }

            for child in list_subdirectories(&dir) {
                queue.push_back((child, chain.clone()));
            }

            directories.push(dir.clone());
            chains.insert(dir, chain);
        }

        info!(
            root = %root.display(),
            directories = directories.len(),
            "[SCAN] Directory scan complete"
        );

        Ok(ScanResult {
            root: root.to_path_buf(),
            directories,
            chains,
            children,
        })
    }
}

/// Subdirectories of `dir` that survive the built-in name checks, sorted.
///
/// Symbolic links are not followed.
fn list_subdirectories(dir: &Path) -> Vec<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(error = %e, dir = %dir.display(), "[SCAN] Cannot list directory, skipping its subtree");
            return Vec::new();
        }
    };

    let mut subdirs = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, dir = %dir.display(), "[SCAN] Cannot read directory entry, skipping its subtree");
                return Vec::new();
            }
        };
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        if !is_dir {
            continue;
        }
        let name = entry.file_name();
        if is_always_ignored(&name.to_string_lossy(), true) {
            continue;
        }
        subdirs.push(entry.path());
    }
    subdirs.sort();
    subdirs
}
