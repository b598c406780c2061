//! Coordinating module for the scan-plan-generate-write pipeline.
//!
//! Directories are visited leaf-first so every prompt sees its children's
//! fresh summaries. A directory that cannot be planned or whose files cannot
//! be listed fails on its own and the run moves on; anything that goes wrong
//! while rendering, generating or writing stops the run.

use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::artifact::ArtifactStore;
use crate::client::{FallbackClient, GenerateError};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::ignore_chain::IgnoreResolver;
use crate::path_safety::PathCheck;
use crate::planner::{leaf_first, PlanDecision, Planner, RegenerationLedger};
use crate::prompt::{PromptAssembler, PromptError, PromptTemplate, TemplateError};
use crate::scanner::{ScanError, ScanResult, Scanner};

/// Everything one run needs, resolved from [`Config`].
#[derive(Debug, Clone)]
pub struct SynchroniseConfig {
    pub root: PathBuf,
    pub force: bool,
    pub ignore_files: Vec<String>,
    pub template: PromptTemplate,
    pub max_file_bytes: usize,
    pub path_check: PathCheck,
    pub refresh_root: bool,
}

impl SynchroniseConfig {
    pub fn from_config(config: &Config) -> std::result::Result<Self, TemplateError> {
        let template = match &config.prompt.template {
            Some(source) => PromptTemplate::new(source.clone())?,
            None => PromptTemplate::default(),
        };
        Ok(Self {
            root: config.root.clone(),
            force: config.force,
            ignore_files: config.ignore_files.clone(),
            template,
            max_file_bytes: config.prompt.max_file_bytes,
            path_check: config.path_check,
            refresh_root: config.refresh_root,
        })
    }
}

#[derive(Debug, Clone)]
pub struct GeneratedDirectory {
    pub dir: PathBuf,
    pub decision: PlanDecision,
    pub tier: String,
    pub attempts: u32,
    pub artifact: PathBuf,
}

#[derive(Debug)]
pub struct FailedDirectory {
    pub dir: PathBuf,
    pub error: Error,
}

/// Outcome of a [`synchronise`] run, in processing order.
#[derive(Debug, Default)]
pub struct SynchroniseReport {
    pub root: PathBuf,
    pub generated: Vec<GeneratedDirectory>,
    pub skipped: Vec<PathBuf>,
    pub failed: Vec<FailedDirectory>,
}

impl SynchroniseReport {
    pub fn generated_dirs(&self) -> impl Iterator<Item = &Path> {
        self.generated.iter().map(|g| g.dir.as_path())
    }
}

#[derive(Debug, Clone)]
pub struct PlannedDirectory {
    pub dir: PathBuf,
    pub decision: PlanDecision,
}

/// Outcome of a [`plan`] dry run, in processing order.
#[derive(Debug, Default)]
pub struct PlanReport {
    pub root: PathBuf,
    pub directories: Vec<PlannedDirectory>,
    pub failed: Vec<FailedDirectory>,
}

impl PlanReport {
    pub fn to_regenerate(&self) -> impl Iterator<Item = &PlannedDirectory> {
        self.directories
            .iter()
            .filter(|p| p.decision.needs_regeneration())
    }
}

struct Prepared {
    root: PathBuf,
    resolver: IgnoreResolver,
    scan: ScanResult,
    store: ArtifactStore,
}

fn prepare(config: &SynchroniseConfig) -> Result<Prepared> {
    let root = config
        .root
        .canonicalize()
        .map_err(|source| ScanError::Root {
            path: config.root.clone(),
            source,
        })?;
    let resolver = IgnoreResolver::new(config.ignore_files.iter());
    let scan = Scanner::new(resolver.clone()).scan(&root)?;
    let store = ArtifactStore::new(root.clone(), config.path_check);
    Ok(Prepared {
        root,
        resolver,
        scan,
        store,
    })
}

/// Decision for one directory, or why it could not be planned.
fn decide(
    prepared: &Prepared,
    planner: &Planner<'_>,
    ledger: &RegenerationLedger,
    config: &SynchroniseConfig,
    dir: &Path,
    descendants_regenerated: bool,
) -> Result<PlanDecision> {
    if !config.force && ledger.is_marked(dir) {
        return Ok(PlanDecision::Propagated);
    }
    let chain = prepared
        .scan
        .chain(dir)
        .ok_or_else(|| PromptError::UnknownDirectory(dir.to_path_buf()))?;
    let artifact_modified = prepared.store.modified(dir)?;
    let decision = planner.decide(dir, chain, config.force, artifact_modified)?;

    if dir == prepared.root
        && !decision.needs_regeneration()
        && config.refresh_root
        && descendants_regenerated
    {
        return Ok(PlanDecision::RootRefresh);
    }
    Ok(decision)
}

/// Regenerates every stale summary below `config.root`.
pub async fn synchronise(
    config: &SynchroniseConfig,
    client: &FallbackClient,
    cancel: &CancellationToken,
) -> Result<SynchroniseReport> {
    info!(root = %config.root.display(), force = config.force, "[SYNC] Starting synchronisation");

    let prepared = prepare(config)?;
    let planner = Planner::with_scan(&prepared.resolver, &prepared.scan);
    let assembler = PromptAssembler::new(
        &prepared.scan,
        &prepared.store,
        &config.template,
        config.max_file_bytes,
    );
    let mut ledger = RegenerationLedger::new(prepared.root.clone());
    let mut report = SynchroniseReport {
        root: prepared.root.clone(),
        ..Default::default()
    };

    for dir in leaf_first(prepared.scan.directories()) {
        if cancel.is_cancelled() {
            warn!(dir = %dir.display(), "[SYNC] Cancelled before directory");
            return Err(GenerateError::Cancelled.into());
        }

        let decision = match decide(
            &prepared,
            &planner,
            &ledger,
            config,
            &dir,
            !report.generated.is_empty(),
        ) {
            Ok(decision) => decision,
            Err(e) => {
                error!(dir = %dir.display(), error = %e, "[SYNC][ERROR] Planning failed, skipping directory");
                report.failed.push(FailedDirectory { dir, error: e });
                continue;
            }
        };
        ledger.record(&dir, decision.needs_regeneration());

        if !decision.needs_regeneration() {
            debug!(dir = %dir.display(), "[SYNC] Up to date");
            report.skipped.push(dir);
            continue;
        }

        info!(dir = %dir.display(), reason = decision.reason(), "[SYNC] Regenerating summary");
        let prompt = match assembler.assemble(&dir) {
            Ok(prompt) => prompt,
            Err(PromptError::Template(e)) => {
                error!(dir = %dir.display(), error = %e, "[SYNC][ERROR] Prompt rendering failed");
                return Err(e.into());
            }
            Err(e) => {
                error!(dir = %dir.display(), error = %e, "[SYNC][ERROR] Prompt assembly failed, skipping directory");
                report.failed.push(FailedDirectory { dir, error: e.into() });
                continue;
            }
        };

        let generation = match client.generate(&prompt, cancel).await {
            Ok(generation) => generation,
            Err(e) => {
                error!(dir = %dir.display(), error = %e, code = e.code(), "[SYNC][ERROR] Generation failed");
                return Err(e.into());
            }
        };

        let artifact = prepared.store.write(&dir, &generation.text).map_err(|e| {
            error!(dir = %dir.display(), error = %e, "[SYNC][ERROR] Writing summary failed");
            Error::from(e)
        })?;

        let newly_marked = ledger.propagate(&dir);
        if !newly_marked.is_empty() {
            debug!(dir = %dir.display(), ancestors = newly_marked.len(), "[SYNC] Propagated staleness");
        }

        report.generated.push(GeneratedDirectory {
            dir,
            decision,
            tier: generation.tier,
            attempts: generation.attempts,
            artifact,
        });
    }

    info!(
        generated = report.generated.len(),
        skipped = report.skipped.len(),
        failed = report.failed.len(),
        "[SYNC] Synchronisation complete"
    );
    Ok(report)
}

/// Computes what [`synchronise`] would do, assuming every regeneration succeeds.
pub fn plan(config: &SynchroniseConfig) -> Result<PlanReport> {
    info!(root = %config.root.display(), force = config.force, "[PLAN] Planning regeneration");

    let prepared = prepare(config)?;
    let planner = Planner::with_scan(&prepared.resolver, &prepared.scan);
    let mut ledger = RegenerationLedger::new(prepared.root.clone());
    let mut report = PlanReport {
        root: prepared.root.clone(),
        ..Default::default()
    };
    let mut any_regenerated = false;

    for dir in leaf_first(prepared.scan.directories()) {
        match decide(&prepared, &planner, &ledger, config, &dir, any_regenerated) {
            Ok(decision) => {
                ledger.record(&dir, decision.needs_regeneration());
                if decision.needs_regeneration() {
                    any_regenerated = true;
                    ledger.propagate(&dir);
                }
                debug!(dir = %dir.display(), reason = decision.reason(), "[PLAN] Decided");
                report.directories.push(PlannedDirectory { dir, decision });
            }
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "[PLAN] Planning failed");
                report.failed.push(FailedDirectory { dir, error: e });
            }
        }
    }

    info!(
        directories = report.directories.len(),
        to_regenerate = report.to_regenerate().count(),
        failed = report.failed.len(),
        "[PLAN] Planning complete"
    );
    Ok(report)
}
