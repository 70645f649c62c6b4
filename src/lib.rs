// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod freshness;
pub mod fs;
pub mod history;
pub mod logging;
pub mod model;
pub mod session;
pub mod types;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, bail};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::cli::{CliArgs, Command, RunArgs};
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::dag::DependencyGraph;
use crate::engine::{
    CoordinatorEvent, CoordinatorHandle, CoordinatorOptions, ExecutionCoordinator, Runtime,
};
use crate::exec::ProcessExecutor;
use crate::freshness::{FreshnessEvaluator, evaluate_freshness};
use crate::fs::RealFileSystem;
use crate::model::PipelineDocument;
use crate::types::{ExecutionState, RunMode, StepId};

/// High-level entry point used by `main.rs`.
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)?;
    let document = cfg.to_document();

    match args.command {
        Command::Check => {
            print_check(&cfg, &document);
            Ok(())
        }
        Command::Status => print_status(&document),
        Command::Run(run_args) => run_steps(&cfg, document, run_args).await,
    }
}

/// What a `run` invocation asks the coordinator for.
enum Request {
    Steps(Vec<StepId>, RunMode),
    Stale,
}

fn resolve_request(document: &PipelineDocument, args: RunArgs) -> Result<Request> {
    if args.stale {
        return Ok(Request::Stale);
    }
    if let Some(group) = args.group {
        let model = document.model();
        let members: Vec<StepId> = model.steps_in_group(&group).map(|s| s.id.clone()).collect();
        if members.is_empty() {
            bail!("group '{group}' has no steps");
        }
        return Ok(Request::Steps(members, RunMode::Parallel));
    }
    match args.steps.len() {
        0 => bail!("nothing to run: pass step ids, --group or --stale"),
        1 => Ok(Request::Steps(args.steps, RunMode::Single)),
        _ => Ok(Request::Steps(args.steps, RunMode::Parallel)),
    }
}

async fn run_steps(cfg: &ConfigFile, document: PipelineDocument, args: RunArgs) -> Result<()> {
    let request = resolve_request(&document, args)?;

    let evaluator = FreshnessEvaluator::new(Arc::new(RealFileSystem));
    let options = CoordinatorOptions {
        exit_when_idle: true,
    };
    let core = ExecutionCoordinator::new(document.model(), evaluator, options)?;

    let (rt_tx, rt_rx) = mpsc::channel::<CoordinatorEvent>(64);
    let workdir = cfg.base_dir.clone().unwrap_or_else(|| PathBuf::from("."));
    let executor = ProcessExecutor::new(rt_tx.clone(), workdir);
    let handle = CoordinatorHandle::new(rt_tx);

    // Ctrl-C -> cancel running steps and stop.
    {
        let handle = handle.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            if let Err(e) = handle.shutdown().await {
                debug!(error = %e, "coordinator already stopped; ignoring Ctrl+C");
            }
        });
    }

    let runtime = tokio::spawn(Runtime::new(core, rt_rx, executor).run());

    match request {
        Request::Stale => {
            let planned = handle.run_stale().await?;
            info!(planned, "stale run planned");
            if planned == 0 {
                println!("everything is fresh");
            }
        }
        Request::Steps(steps, mode) => {
            let admission = handle.request_run(steps, mode).await?;
            if !admission.admitted {
                for rejection in &admission.rejections {
                    println!("rejected {rejection}");
                }
            }
        }
    }

    let core = runtime.await??;
    debug!("coordinator finished");

    let failed: Vec<&str> = core
        .graph()
        .steps()
        .filter(|s| core.state_of(s) == Some(ExecutionState::Failed))
        .collect();
    for step in core.graph().steps() {
        if let Some(state) = core.state_of(step).filter(|s| *s != ExecutionState::Idle) {
            println!("{step:<24} {state:?}");
        }
    }
    if !failed.is_empty() {
        bail!("{} step(s) failed: {}", failed.len(), failed.join(", "));
    }
    Ok(())
}

/// Print steps with their direct dependencies plus any output conflicts.
fn print_check(cfg: &ConfigFile, document: &PipelineDocument) {
    let graph = DependencyGraph::build(document.model());
    let settings = cfg.history_settings();

    println!("pipedag check");
    println!("  config.history_capacity = {}", settings.capacity);
    println!(
        "  config.history_debounce_ms = {}",
        settings.debounce.as_millis()
    );
    println!();

    println!("steps ({}):", graph.steps().count());
    for step in graph.steps() {
        println!("  - {step}");
        if let Some(s) = graph.model().step(step) {
            println!("      task: {}", s.task);
            if let Some(group) = &s.group {
                println!("      group: {group}");
            }
        }
        let upstream = graph.direct_upstream(step);
        if !upstream.is_empty() {
            println!("      after: {:?}", upstream);
        }
    }

    let conflicts = graph.output_conflicts();
    if !conflicts.is_empty() {
        println!();
        println!("output conflicts (never run concurrently):");
        for (key, writers) in conflicts {
            println!("  - {key}: {:?}", writers);
        }
    }

    debug!("check complete (no execution)");
}

fn print_status(document: &PipelineDocument) -> Result<()> {
    let graph = DependencyGraph::build(document.model());
    let freshness = evaluate_freshness(&graph, &RealFileSystem)?;

    for step in graph.topological_order()? {
        if let Some(status) = freshness.get(&step) {
            println!("{step:<24} {status}");
        }
    }
    Ok(())
}
