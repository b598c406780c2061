//! # ignore_chain: inherited ignore rules for a directory tree
//!
//! Every directory may carry its own ignore file(s) (gitignore syntax). While
//! descending, each directory receives a copy of its parent's chain with its own
//! rule appended, so sibling subtrees never see each other's rules.
//!
//! Matching is deliberately flat: a candidate is ignored as soon as *any* rule in
//! the chain whose origin contains the candidate matches it. There is no
//! precedence between rules of different directories.
//!
//! A handful of names are ignored regardless of rules (see [`is_always_ignored`]):
//! the tool's own artifacts, dot-prefixed entries and `node_modules` directories.

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// File name of the summary written into every directory.
pub const ARTIFACT_FILE_NAME: &str = "DIRDOC.md";

/// Name used by earlier releases. Still read, never written.
pub const LEGACY_ARTIFACT_FILE_NAME: &str = "dirdoc_summary.md";

/// Heavy vendor directory that is never descended into.
pub const VENDOR_DIR_NAME: &str = "node_modules";

/// Ignore files consulted in every directory unless configured otherwise.
pub const DEFAULT_IGNORE_FILES: &[&str] = &[".gitignore", ".dirdocignore"];

/// Returns true for entries that are skipped before any pattern matching.
pub fn is_always_ignored(name: &str, is_dir: bool) -> bool {
    if name.starts_with('.') {
        return true;
    }
    if name == ARTIFACT_FILE_NAME || name == LEGACY_ARTIFACT_FILE_NAME {
        return true;
    }
    is_dir && name == VENDOR_DIR_NAME
}

/// Compiled patterns from one directory's ignore file(s).
#[derive(Debug)]
pub struct IgnoreRule {
    origin: PathBuf,
    matcher: Gitignore,
}

impl IgnoreRule {
    /// Directory the patterns were read from. Relative paths are resolved against it.
    pub fn origin(&self) -> &Path {
        &self.origin
    }

    /// Number of patterns compiled into this rule.
    pub fn pattern_count(&self) -> usize {
        self.matcher.num_ignores() as usize + self.matcher.num_whitelists() as usize
    }

    /// Tests a candidate path against this rule.
    ///
    /// The rule only applies when its origin is the candidate's containing
    /// directory or one of that directory's ancestors. Directory candidates are
    /// matched as directories, so `build/` matches a `build` directory but never a
    /// file called `build`, while `build` matches both.
    pub fn matches(&self, candidate: &Path, is_dir: bool) -> bool {
        let Some(parent) = candidate.parent() else {
            return false;
        };
        if !parent.starts_with(&self.origin) {
            return false;
        }
        let Ok(relative) = candidate.strip_prefix(&self.origin) else {
            return false;
        };
        let relative = normalize_separators(relative);
        if relative.is_empty() {
            return false;
        }
        self.matcher.matched(Path::new(&relative), is_dir).is_ignore()
    }
}

/// Joins the normal components of a relative path with `/`.
fn normalize_separators(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Ordered root-to-here list of rules inherited by a directory.
///
/// Cloning copies the list; the rules themselves are immutable and shared.
#[derive(Debug, Clone, Default)]
pub struct IgnoreChain {
    rules: Vec<Arc<IgnoreRule>>,
}

impl IgnoreChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of this chain extended with `rule`, if there is one.
    pub fn extended(&self, rule: Option<IgnoreRule>) -> Self {
        let mut rules = self.rules.clone();
        if let Some(rule) = rule {
            rules.push(Arc::new(rule));
        }
        Self { rules }
    }

    pub fn rules(&self) -> &[Arc<IgnoreRule>] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// First rule in the chain that ignores `candidate`, if any.
    pub fn matching_rule(&self, candidate: &Path, is_dir: bool) -> Option<&IgnoreRule> {
        self.rules
            .iter()
            .map(Arc::as_ref)
            .find(|rule| rule.matches(candidate, is_dir))
    }

    /// Full ignore decision: built-in names first, then the chain's rules.
    pub fn is_ignored(&self, candidate: &Path, is_dir: bool) -> bool {
        let name = candidate
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();
        if is_always_ignored(&name, is_dir) {
            return true;
        }
        match self.matching_rule(candidate, is_dir) {
            Some(rule) => {
                debug!(
                    path = %candidate.display(),
                    origin = %rule.origin().display(),
                    "Ignored by rule"
                );
                true
            }
            None => false,
        }
    }
}

/// Reads and compiles per-directory ignore files.
#[derive(Debug, Clone)]
pub struct IgnoreResolver {
    file_names: Vec<String>,
}

impl Default for IgnoreResolver {
    fn default() -> Self {
        Self::new(DEFAULT_IGNORE_FILES.iter().copied())
    }
}

impl IgnoreResolver {
    pub fn new<I, S>(file_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            file_names: file_names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn file_names(&self) -> &[String] {
        &self.file_names
    }

    /// Compiles the ignore file(s) found directly in `dir`.
    ///
    /// Returns `None` when the directory has no usable ignore file. Unreadable
    /// files are logged and skipped; they never abort the caller's walk.
    pub fn load_rule(&self, dir: &Path) -> Option<IgnoreRule> {
        let mut builder = GitignoreBuilder::new(dir);
        let mut loaded = false;

        for name in &self.file_names {
            let path = dir.join(name);
            if !path.is_file() {
                continue;
            }
            match builder.add(&path) {
                None => {
                    debug!(path = %path.display(), "Loaded ignore file");
                    loaded = true;
                }
                Some(e) if e.is_io() => {
                    warn!(error = %e, path = %path.display(), "Skipping unreadable ignore file");
                }
                Some(e) => {
                    warn!(error = %e, path = %path.display(), "Ignore file has invalid patterns, keeping the valid ones");
                    loaded = true;
                }
            }
        }

        if !loaded {
            return None;
        }

        match builder.build() {
            Ok(matcher) if matcher.is_empty() => None,
            Ok(matcher) => Some(IgnoreRule {
                origin: dir.to_path_buf(),
                matcher,
            }),
            Err(e) => {
                warn!(error = %e, dir = %dir.display(), "Failed to compile ignore rules");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_names_are_always_ignored() {
        assert!(is_always_ignored(".git", true));
        assert!(is_always_ignored(".env", false));
        assert!(is_always_ignored(ARTIFACT_FILE_NAME, false));
        assert!(is_always_ignored(LEGACY_ARTIFACT_FILE_NAME, false));
        assert!(is_always_ignored("node_modules", true));
        assert!(!is_always_ignored("node_modules", false));
        assert!(!is_always_ignored("src", true));
    }

    #[test]
    fn separators_are_normalized() {
        let rel = Path::new("a").join("b").join("c.txt");
        assert_eq!(normalize_separators(&rel), "a/b/c.txt");
    }
}
