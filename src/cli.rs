// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Command-line arguments for `pipedag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "pipedag",
    version,
    about = "Run pipeline steps linked by the data artifacts they produce and consume.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the pipeline file (TOML).
    #[arg(long, value_name = "PATH", default_value = "Pipedag.toml", global = true)]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `PIPEDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Validate the pipeline and print its dependency structure.
    Check,
    /// Print every step's freshness.
    Status,
    /// Run steps and wait for them to finish.
    Run(RunArgs),
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Steps to run. One id runs alone; several run as one parallel batch.
    #[arg(value_name = "STEP", conflicts_with_all = ["group", "stale"])]
    pub steps: Vec<String>,

    /// Run every step of this group as one parallel batch.
    #[arg(long, value_name = "GROUP", conflicts_with = "stale")]
    pub group: Option<String>,

    /// Run every stale or missing step plus everything downstream of it.
    #[arg(long)]
    pub stale: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
