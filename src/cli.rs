use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::client::build_fallback_client;
use crate::config::Config;
use crate::load_config::load_config;
use crate::synchronise::{plan, synchronise, SynchroniseConfig};

/// CLI for dirdoc: incremental directory summaries for source trees.
#[derive(Parser)]
#[clap(
    name = "dirdoc",
    version,
    about = "Generate and refresh a natural-language summary for every directory of a source tree"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(clap::Args, Debug, Clone)]
pub struct RunArgs {
    /// Path to the YAML config file
    #[clap(long)]
    pub config: PathBuf,
    /// Tree to document; overrides `root` from the config
    #[clap(long)]
    pub root: Option<PathBuf>,
    /// Regenerate every summary regardless of modification times
    #[clap(long)]
    pub force: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Regenerate stale summaries
    Generate(RunArgs),
    /// List the directories that would be regenerated, without calling any provider
    Plan(RunArgs),
}

fn resolve_config(args: &RunArgs) -> Result<Config> {
    let mut config = load_config(&args.config)?;
    if let Some(root) = &args.root {
        config.root = root.clone();
    }
    config.force |= args.force;
    Ok(config)
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    run_with_cancel(cli, CancellationToken::new()).await
}

/// [`run`] with a caller-owned cancellation token (wired to Ctrl-C by main()).
pub async fn run_with_cancel(cli: Cli, cancel: CancellationToken) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Generate(args) => {
            let config = resolve_config(&args)?;
            let sync_config =
                SynchroniseConfig::from_config(&config).context("Invalid prompt template")?;
            let client = build_fallback_client(&config)?;

            println!("Generating summaries under {}...", config.root.display());
            let result = synchronise(&sync_config, &client, &cancel).await;
            if let Err(e) = client.close().await {
                warn!(error = %e, "Failed to close generation clients");
            }

            match result {
                Ok(report) => {
                    for generated in &report.generated {
                        println!(
                            "generated  {}  ({}, tier {})",
                            generated.dir.display(),
                            generated.decision.reason(),
                            generated.tier
                        );
                    }
                    for failed in &report.failed {
                        println!("failed     {}  ({}: {})", failed.dir.display(), failed.error.code(), failed.error);
                    }
                    println!(
                        "Done: {} generated, {} up to date, {} failed.",
                        report.generated.len(),
                        report.skipped.len(),
                        report.failed.len()
                    );
                    Ok(())
                }
                Err(e) => {
                    eprintln!("[ERROR] Generation failed ({}): {}", e.code(), e);
                    Err(anyhow::Error::new(e))
                }
            }
        }
        Commands::Plan(args) => {
            let config = resolve_config(&args)?;
            let sync_config =
                SynchroniseConfig::from_config(&config).context("Invalid prompt template")?;
            let report = plan(&sync_config)?;

            for planned in report.to_regenerate() {
                println!("{}  ({})", planned.dir.display(), planned.decision.reason());
            }
            for failed in &report.failed {
                println!("failed  {}  ({}: {})", failed.dir.display(), failed.error.code(), failed.error);
            }
            println!(
                "{} of {} directories would be regenerated.",
                report.to_regenerate().count(),
                report.directories.len()
            );
            Ok(())
        }
    }
}
