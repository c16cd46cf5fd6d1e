// src/lib.rs

pub mod batch;
pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod fs;
pub mod logging;
pub mod matcher;
pub mod processor;
pub mod repo;
pub mod task;
pub mod types;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::batch::ShellBatchScheduler;
use crate::cli::{CliArgs, Command};
use crate::config::{default_config_path, load_and_validate, Config};
use crate::dag::order;
use crate::engine::{Engine, PhaseReport, ScopeFilter};
use crate::fs::{FileSystem, RealFileSystem};
use crate::processor::{load_library, ProcessorLibrary, ProcessorSpec};
use crate::repo::MemoryRepository;
use crate::task::FileTaskStore;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the processor library
/// - the artefact snapshot, disk task store and shell batch scheduler
/// - the engine phase selected on the command line
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = args.config.as_ref().map(PathBuf::from).unwrap_or_else(default_config_path);
    let config = Arc::new(load_and_validate(&config_path)?);
    debug!(config = %config_path.display(), "configuration loaded");

    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let library = load_library(&fs, &config.paths.processors_dir)?;
    for (path, err) in library.failures.iter() {
        warn!(path = %path.display(), error = %err, "processor spec skipped");
    }

    if let Command::Order = args.command {
        print_order(library);
        return Ok(());
    }

    let engine = build_engine(config, fs, library)?;
    let report = match &args.command {
        Command::Build(scope) => engine.build(&ScopeFilter::from(scope)).await?,
        Command::Launch { scope, dry_run } => engine.launch(&ScopeFilter::from(scope), *dry_run).await?,
        Command::Update(scope) => engine.update(&ScopeFilter::from(scope)).await?,
        Command::Order => return Ok(()),
    };
    print_report(&report);
    if let Some(reason) = report.aborted {
        anyhow::bail!("{} phase aborted: {reason}", report.phase);
    }
    Ok(())
}

fn build_engine(config: Arc<Config>, fs: Arc<dyn FileSystem>, library: ProcessorLibrary) -> Result<Engine> {
    let repo = MemoryRepository::load_snapshot(&fs, &config.paths.artefacts_file)?;
    let store = FileTaskStore::new(fs.clone(), &config.paths.store_dir, &config.paths.results_dir);
    let batch = ShellBatchScheduler::new(config.clone(), fs.clone());
    info!(processors = library.processors.len(), "starting engine");
    Ok(Engine::new(
        config,
        library.processors,
        Arc::new(repo),
        Arc::new(store),
        Arc::new(batch),
        fs,
    ))
}

/// Print processors in dependency order, then the unordered leftovers
/// and any cycles.
fn print_order(library: ProcessorLibrary) {
    let ordered = order(library.processors);
    println!("processor order ({}):", ordered.ordered.len());
    for (i, processor) in ordered.ordered.iter().enumerate() {
        let marker = if i >= ordered.leftovers_start { " (unordered)" } else { "" };
        println!("  {:>3}. {}{marker}", i + 1, processor.proctype());
        let inputs = processor.definition().assessor_inputs();
        if !inputs.is_empty() {
            println!("       consumes: {}", inputs.join(", "));
        }
    }
    for cycle in ordered.cycles.iter() {
        println!("cycle: {}", cycle.join(" -> "));
    }
}

fn print_report(report: &PhaseReport) {
    println!("procsched {}", report.phase);
    for (scope, summary) in report.scopes.iter() {
        if !summary.is_empty() {
            println!("  {scope}: {summary}");
        }
    }
    println!("  total: {}", report.totals());
    for cycle in report.cycles.iter() {
        println!("  cycle: {}", cycle.join(" -> "));
    }
    if let Some(reason) = &report.aborted {
        println!("  aborted: {reason}");
    }
}
