// src/exec/mod.rs

//! Process execution layer.
//!
//! Runs admitted step jobs as shell commands with `tokio::process::Command`
//! and reports terminal statuses back to the coordinator as
//! `CoordinatorEvent::StepFinished`.
//!
//! - [`backend`] provides the [`TaskExecutor`] trait the runtime talks to,
//!   and [`ProcessExecutor`], the production implementation. Tests replace
//!   it with a fake.
//! - [`executor_loop`] owns the background loop tracking live processes.
//! - [`task_runner`] runs one job: waits for same-batch upstream jobs, then
//!   spawns the process and watches for cancellation.

pub mod backend;
pub mod executor_loop;
pub mod task_runner;

pub use backend::{ProcessExecutor, TaskExecutor};
pub use executor_loop::{ExecutorMessage, spawn_executor};
