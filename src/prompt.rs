//! Prompt assembly for a single directory.
//!
//! A prompt is a [`PromptTemplate`] rendered with three named fields:
//! `directory`, `subdirectory_summaries` and `files`. File contents and child
//! summaries are always emitted in lexicographic order so the same tree yields
//! the same prompt.

use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, warn};

use crate::artifact::ArtifactStore;
use crate::ignore_chain::IgnoreChain;
use crate::scanner::ScanResult;

pub const FIELD_DIRECTORY: &str = "directory";
pub const FIELD_SUBDIRECTORY_SUMMARIES: &str = "subdirectory_summaries";
pub const FIELD_FILES: &str = "files";

/// Bytes inspected when deciding whether a file is binary.
const BINARY_SNIFF_LEN: usize = 8 * 1024;

pub const DEFAULT_MAX_FILE_BYTES: usize = 64 * 1024;

pub const DEFAULT_TEMPLATE: &str = r#"You are documenting a source tree one directory at a time.

Write a concise Markdown summary of the directory `{{directory}}`.
Explain what the directory is for, its most important files and how the
subdirectories fit together. Do not invent behaviour that is not shown below.

## Subdirectory summaries

{{subdirectory_summaries}}

## Files

{{files}}
"#;

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("template references unknown field `{0}`")]
    UnknownField(String),
    #[error("template is empty")]
    Empty,
}

#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("cannot list files in {path}: {source}")]
    List {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{0} was not part of the scan")]
    UnknownDirectory(PathBuf),
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("placeholder regex is valid")
    })
}

/// Text with `{{field}}` placeholders.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    source: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            source: DEFAULT_TEMPLATE.to_string(),
        }
    }
}

impl PromptTemplate {
    pub fn new(source: impl Into<String>) -> Result<Self, TemplateError> {
        let source = source.into();
        if source.trim().is_empty() {
            return Err(TemplateError::Empty);
        }
        Ok(Self { source })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Field names referenced by the template, in order of first appearance.
    pub fn fields(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for caps in placeholder_pattern().captures_iter(&self.source) {
            let name = caps[1].to_string();
            if !seen.contains(&name) {
                seen.push(name);
            }
        }
        seen
    }

    /// Substitutes every placeholder. Referencing a field not in `values` is an error.
    pub fn render(&self, values: &BTreeMap<&str, String>) -> Result<String, TemplateError> {
        for name in self.fields() {
            if !values.contains_key(name.as_str()) {
                return Err(TemplateError::UnknownField(name));
            }
        }
        let rendered = placeholder_pattern().replace_all(&self.source, |caps: &regex::Captures| {
            values.get(&caps[1]).cloned().unwrap_or_default()
        });
        Ok(rendered.into_owned())
    }
}

/// Formats file contents as fenced blocks, ordered by file name.
pub fn format_files(files: &BTreeMap<String, String>) -> String {
    if files.is_empty() {
        return "(no files)".to_string();
    }
    files
        .iter()
        .map(|(name, content)| format!("### {name}\n```\n{}\n```", content.trim_end()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Formats child summaries under their directory names, ordered by name.
pub fn format_summaries(summaries: &BTreeMap<String, String>) -> String {
    if summaries.is_empty() {
        return "(no subdirectories)".to_string();
    }
    summaries
        .iter()
        .map(|(name, summary)| format!("### {name}/\n{}", summary.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn looks_binary(bytes: &[u8]) -> bool {
    bytes.iter().take(BINARY_SNIFF_LEN).any(|b| *b == 0)
}

/// Reads no more of `path` than is needed to sniff it and fill `max_file_bytes`.
///
/// A few bytes past the limit are kept so truncation is detected and a
/// multi-byte character split at the read boundary falls past the cut.
fn read_prefix(path: &Path, max_file_bytes: usize) -> io::Result<Vec<u8>> {
    let limit = max_file_bytes.max(BINARY_SNIFF_LEN).saturating_add(4);
    let mut bytes = Vec::new();
    fs::File::open(path)?
        .take(limit as u64)
        .read_to_end(&mut bytes)?;
    Ok(bytes)
}

/// Cuts `text` to at most `max_bytes`, backing off to a char boundary.
fn truncate_utf8(mut text: String, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text;
    }
    let mut cut = max_bytes;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
    text.push_str("\n… (truncated)");
    text
}

/// Reads the non-ignored regular files directly inside `dir`.
///
/// Binary files are skipped, long files truncated to `max_file_bytes`. A file
/// that cannot be read is logged and left out.
pub fn collect_files(
    dir: &Path,
    chain: &IgnoreChain,
    max_file_bytes: usize,
) -> Result<BTreeMap<String, String>, PromptError> {
    let entries = fs::read_dir(dir).map_err(|source| PromptError::List {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files = BTreeMap::new();
    for entry in entries.flatten() {
        let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
        if !is_file {
            continue;
        }
        let path = entry.path();
        if chain.is_ignored(&path, false) {
            continue;
        }
        let bytes = match read_prefix(&path, max_file_bytes) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, path = %path.display(), "Skipping unreadable file");
                continue;
            }
        };
        if looks_binary(&bytes) {
            debug!(path = %path.display(), "Skipping binary file");
            continue;
        }
        let text = String::from_utf8_lossy(&bytes).into_owned();
        let name = entry.file_name().to_string_lossy().into_owned();
        files.insert(name, truncate_utf8(text, max_file_bytes));
    }
    Ok(files)
}

/// Builds prompts from a scan, the artifact store and a template.
#[derive(Debug, Clone, Copy)]
pub struct PromptAssembler<'a> {
    scan: &'a ScanResult,
    store: &'a ArtifactStore,
    template: &'a PromptTemplate,
    max_file_bytes: usize,
}

impl<'a> PromptAssembler<'a> {
    pub fn new(
        scan: &'a ScanResult,
        store: &'a ArtifactStore,
        template: &'a PromptTemplate,
        max_file_bytes: usize,
    ) -> Self {
        Self {
            scan,
            store,
            template,
            max_file_bytes,
        }
    }

    /// Summaries already written for the included children of `dir`.
    pub fn child_summaries(&self, dir: &Path) -> BTreeMap<String, String> {
        let mut summaries = BTreeMap::new();
        for child in self.scan.children(dir) {
            let summary = match self.store.read(child) {
                Ok(Some(summary)) => summary,
                Ok(None) => continue,
                Err(e) => {
                    warn!(error = %e, dir = %child.display(), "Leaving out unreadable child summary");
                    continue;
                }
            };
            let name = child
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            summaries.insert(name, summary);
        }
        summaries
    }

    /// Renders the prompt for `dir`.
    pub fn assemble(&self, dir: &Path) -> Result<String, PromptError> {
        let chain = self
            .scan
            .chain(dir)
            .ok_or_else(|| PromptError::UnknownDirectory(dir.to_path_buf()))?;

        let files = collect_files(dir, chain, self.max_file_bytes)?;
        let summaries = self.child_summaries(dir);
        let display = display_name(self.scan.root(), dir);

        let mut values = BTreeMap::new();
        values.insert(FIELD_DIRECTORY, display);
        values.insert(FIELD_SUBDIRECTORY_SUMMARIES, format_summaries(&summaries));
        values.insert(FIELD_FILES, format_files(&files));

        let prompt = self.template.render(&values)?;
        debug!(
            dir = %dir.display(),
            files = files.len(),
            subdirectories = summaries.len(),
            bytes = prompt.len(),
            "Assembled prompt"
        );
        Ok(prompt)
    }
}

/// Path of `dir` relative to the root, `.` for the root itself.
pub fn display_name(root: &Path, dir: &Path) -> String {
    match dir.strip_prefix(root) {
        Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
        Ok(rel) => rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/"),
        Err(_) => dir.display().to_string(),
    }
}
