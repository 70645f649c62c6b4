// src/engine/mod.rs

//! Execution coordination.
//!
//! This module ties together:
//! - the admission rule deciding whether a run request may start now
//! - the per-step `idle -> running -> {completed, failed}` state machine
//! - freshness re-evaluation after every terminal event
//! - the "run all stale steps" plan
//!
//! The pure, synchronous coordinator lives in [`core`]; the async/IO shell
//! that feeds it events and executes its commands is [`runtime`], and
//! [`handle`] is the cloneable surface external callers use.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

use tokio::sync::oneshot;

use crate::dag::PlanStepState;
use crate::errors::Result;
use crate::model::{GraphModel, ParamValue};
use crate::types::{ExecutionState, Freshness, RunMode, StepId, TerminalStatus};

pub mod admission;
pub mod core;
pub mod handle;
pub mod runtime;

pub use admission::{RunningSet, RunningStep, check_admission, check_batch};
pub use core::{CoordinatorOptions, ExecutionCoordinator};
pub use handle::CoordinatorHandle;
pub use runtime::Runtime;

/// Why a run request was not admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    AlreadyRunning,
    UpstreamRunning,
    DownstreamRunning,
    OutputConflict,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RejectReason::AlreadyRunning => "ALREADY_RUNNING",
            RejectReason::UpstreamRunning => "UPSTREAM_RUNNING",
            RejectReason::DownstreamRunning => "DOWNSTREAM_RUNNING",
            RejectReason::OutputConflict => "OUTPUT_CONFLICT",
        };
        f.write_str(s)
    }
}

/// Structured rejection of one requested step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRejection {
    pub step: StepId,
    pub reason: RejectReason,
    /// The running (or same-batch) step that blocks `step`.
    pub conflicting: StepId,
}

impl fmt::Display for RunRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.step, self.reason, self.conflicting)
    }
}

/// Answer to a run request. A request is all-or-nothing: either every
/// requested step was admitted, or none was and `rejections` lists every
/// blocked member.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Admission {
    pub admitted: bool,
    pub rejections: Vec<RunRejection>,
}

impl Admission {
    pub fn admitted() -> Self {
        Self {
            admitted: true,
            rejections: Vec::new(),
        }
    }

    pub fn rejected(rejections: Vec<RunRejection>) -> Self {
        Self {
            admitted: false,
            rejections,
        }
    }
}

/// Fully resolved unit of work handed to the task executor.
#[derive(Debug, Clone, PartialEq)]
pub struct StepJob {
    pub step: StepId,
    /// Opaque task reference.
    pub task: String,
    pub inputs: BTreeMap<String, PathBuf>,
    pub outputs: BTreeMap<String, PathBuf>,
    /// Arguments with parameter references substituted.
    pub args: BTreeMap<String, ParamValue>,
    /// Identifier shared by all jobs admitted by one request.
    pub run_id: u64,
    /// Same-batch upstream steps the executor must finish first.
    pub after: Vec<StepId>,
}

/// Read-only view of coordinator state for UIs and the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CoordinatorSnapshot {
    pub states: BTreeMap<StepId, ExecutionState>,
    pub freshness: BTreeMap<StepId, Freshness>,
    pub running: BTreeSet<StepId>,
    pub blocked: BTreeSet<StepId>,
    /// Per-step state of the active run plan, if any.
    pub plan: Option<BTreeMap<StepId, PlanStepState>>,
}

/// Command produced by the pure core, executed by the IO shell.
#[derive(Debug, Clone)]
pub enum CoordinatorCommand {
    /// Hand these jobs to the task executor.
    Dispatch(Vec<StepJob>),
    /// Ask the executor to stop this step's unit of work.
    Cancel(StepId),
    /// The core has nothing left to do (used for one-shot CLI runs).
    RequestExit,
}

/// Decision returned by the core after handling one event.
#[derive(Debug, Clone)]
pub struct CoordinatorStep {
    pub commands: Vec<CoordinatorCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

impl CoordinatorStep {
    pub fn continue_with(commands: Vec<CoordinatorCommand>) -> Self {
        Self {
            commands,
            keep_running: true,
        }
    }
}

/// Events flowing into the coordinator from callers and the executor.
#[derive(Debug)]
pub enum CoordinatorEvent {
    RunRequested {
        steps: Vec<StepId>,
        mode: RunMode,
        reply: Option<oneshot::Sender<Result<Admission>>>,
    },
    /// Plan and run every stale/missing step; replies with the plan size.
    RunStaleRequested {
        reply: Option<oneshot::Sender<Result<usize>>>,
    },
    CancelRequested {
        step: StepId,
        reply: Option<oneshot::Sender<Result<()>>>,
    },
    /// Terminal status reported by the task executor.
    StepFinished {
        step: StepId,
        status: TerminalStatus,
    },
    /// Committed edits produced a new model.
    GraphReplaced {
        model: GraphModel,
        reply: Option<oneshot::Sender<Result<()>>>,
    },
    SnapshotRequested {
        reply: oneshot::Sender<CoordinatorSnapshot>,
    },
    /// Graceful shutdown (e.g. Ctrl-C): cancel running steps and stop.
    ShutdownRequested,
}
