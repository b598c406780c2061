//! Regeneration planning: which directories need a fresh summary, and in what order.
//!
//! A directory is stale when it, or anything it contains (after applying its
//! ignore chain), was modified after its summary was written. Staleness also travels
//! upwards: once a directory is regenerated, every ancestor below the root is
//! marked, because their summaries were built from the child's old text.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};

use crate::ignore_chain::{IgnoreChain, IgnoreResolver};
use crate::scanner::ScanResult;

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("cannot list {path} while checking modification times: {source}")]
    List {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot stat {path} while checking modification times: {source}")]
    Stat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Why a directory will or will not be regenerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanDecision {
    /// The run was started with the force flag.
    Forced,
    /// No summary exists yet.
    MissingArtifact,
    /// Something inside the directory is newer than its summary.
    Stale { newest: SystemTime, artifact: SystemTime },
    /// A descendant was regenerated earlier in this run.
    Propagated,
    /// The root is refreshed because other directories were regenerated.
    RootRefresh,
    UpToDate,
}

impl PlanDecision {
    pub fn needs_regeneration(&self) -> bool {
        !matches!(self, PlanDecision::UpToDate)
    }

    pub fn reason(&self) -> &'static str {
        match self {
            PlanDecision::Forced => "forced",
            PlanDecision::MissingArtifact => "missing summary",
            PlanDecision::Stale { .. } => "content changed",
            PlanDecision::Propagated => "descendant regenerated",
            PlanDecision::RootRefresh => "descendants regenerated",
            PlanDecision::UpToDate => "up to date",
        }
    }
}

/// Reverses a root-first breadth-first listing so descendants come before ancestors.
pub fn leaf_first(directories: &[PathBuf]) -> Vec<PathBuf> {
    directories.iter().rev().cloned().collect()
}

/// Makes the staleness decision for single directories.
#[derive(Debug, Clone, Copy)]
pub struct Planner<'a> {
    resolver: &'a IgnoreResolver,
    known_chains: Option<&'a HashMap<PathBuf, IgnoreChain>>,
}

impl<'a> Planner<'a> {
    pub fn new(resolver: &'a IgnoreResolver) -> Self {
        Self {
            resolver,
            known_chains: None,
        }
    }

    /// Reuses the chains resolved by a scan instead of re-reading ignore files.
    pub fn with_scan(resolver: &'a IgnoreResolver, scan: &'a ScanResult) -> Self {
        Self {
            resolver,
            known_chains: Some(scan.chains()),
        }
    }

    /// Decides whether `dir` needs regeneration from its own contents.
    ///
    /// `chain` must be the directory's resolved chain (its own rule included).
    pub fn decide(
        &self,
        dir: &Path,
        chain: &IgnoreChain,
        force: bool,
        artifact_modified: Option<SystemTime>,
    ) -> Result<PlanDecision, PlanError> {
        if force {
            return Ok(PlanDecision::Forced);
        }
        let Some(artifact) = artifact_modified else {
            return Ok(PlanDecision::MissingArtifact);
        };

        let newest = self.newest_modification(dir, chain)?;
        if newest > artifact {
            debug!(dir = %dir.display(), "[PLAN] Content newer than summary");
            return Ok(PlanDecision::Stale { newest, artifact });
        }
        Ok(PlanDecision::UpToDate)
    }

    /// Latest modification time of `dir` itself and its non-ignored entries.
    ///
    /// The directory's own mtime is included so that deleting or renaming an
    /// entry counts as a change. Ignored subtrees are pruned exactly as the
    /// scanner prunes them. Only failures on `dir` and its direct entries are
    /// errors; a nested directory that cannot be listed or stat'ed is skipped
    /// with a warning, mirroring the scanner.
    pub fn newest_modification(
        &self,
        dir: &Path,
        chain: &IgnoreChain,
    ) -> Result<SystemTime, PlanError> {
        let own = fs::metadata(dir)
            .and_then(|meta| meta.modified())
            .map_err(|source| PlanError::Stat {
                path: dir.to_path_buf(),
                source,
            })?;
        let mut newest = own;
        let mut stack: Vec<(PathBuf, IgnoreChain)> = vec![(dir.to_path_buf(), chain.clone())];

        while let Some((current, current_chain)) = stack.pop() {
            let nested = current != dir;
            match self.scan_entries(&current, &current_chain) {
                Ok((modified, subdirs)) => {
                    if let Some(modified) = modified {
                        newest = newest.max(modified);
                    }
                    stack.extend(subdirs);
                }
                Err(e) if nested => {
                    warn!(
                        dir = %current.display(),
                        error = %e,
                        "[PLAN] Skipping unreadable subtree while checking modification times"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Ok(newest)
    }

    /// Newest mtime among the non-ignored entries of one directory, plus the
    /// subdirectories to descend into with their chains.
    fn scan_entries(
        &self,
        current: &Path,
        current_chain: &IgnoreChain,
    ) -> Result<(Option<SystemTime>, Vec<(PathBuf, IgnoreChain)>), PlanError> {
        let list_err = |source| PlanError::List {
            path: current.to_path_buf(),
            source,
        };
        let mut newest: Option<SystemTime> = None;
        let mut subdirs = Vec::new();

        for entry in fs::read_dir(current).map_err(list_err)? {
            let entry = entry.map_err(list_err)?;
            let path = entry.path();
            let is_dir = entry
                .file_type()
                .map_err(|source| PlanError::Stat {
                    path: path.clone(),
                    source,
                })?
                .is_dir();
            if current_chain.is_ignored(&path, is_dir) {
                continue;
            }

            let modified = entry
                .metadata()
                .and_then(|meta| meta.modified())
                .map_err(|source| PlanError::Stat {
                    path: path.clone(),
                    source,
                })?;
            newest = Some(newest.map_or(modified, |n| n.max(modified)));

            if is_dir {
                let child_chain = self.chain_for(&path, current_chain);
                subdirs.push((path, child_chain));
            }
        }

        Ok((newest, subdirs))
    }

    fn chain_for(&self, dir: &Path, parent_chain: &IgnoreChain) -> IgnoreChain {
        if let Some(chain) = self.known_chains.and_then(|chains| chains.get(dir)) {
            return chain.clone();
        }
        parent_chain.extended(self.resolver.load_rule(dir))
    }
}

/// Per-run record of which directories need regeneration.
#[derive(Debug, Clone)]
pub struct RegenerationLedger {
    root: PathBuf,
    marks: HashMap<PathBuf, bool>,
}

impl RegenerationLedger {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            marks: HashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Records a directory's own check. Never clears an existing mark.
    pub fn record(&mut self, dir: &Path, needs_regeneration: bool) {
        let mark = self.marks.entry(dir.to_path_buf()).or_insert(false);
        *mark |= needs_regeneration;
    }

    pub fn is_marked(&self, dir: &Path) -> bool {
        self.marks.get(dir).copied().unwrap_or(false)
    }

    /// Marks every strict ancestor of `dir` below the root.
    ///
    /// Returns the ancestors that were not marked before.
    pub fn propagate(&mut self, dir: &Path) -> Vec<PathBuf> {
        let mut newly_marked = Vec::new();
        let mut current = dir.parent();
        while let Some(ancestor) = current {
            if ancestor == self.root || !ancestor.starts_with(&self.root) {
                break;
            }
            let mark = self.marks.entry(ancestor.to_path_buf()).or_insert(false);
            if !*mark {
                *mark = true;
                newly_marked.push(ancestor.to_path_buf());
            }
            current = ancestor.parent();
        }
        newly_marked
    }

    /// Directories currently marked, in no particular order.
    pub fn marked(&self) -> impl Iterator<Item = &Path> {
        self.marks
            .iter()
            .filter(|(_, marked)| **marked)
            .map(|(dir, _)| dir.as_path())
    }

    pub fn marked_count(&self) -> usize {
        self.marks.values().filter(|marked| **marked).count()
    }
}
