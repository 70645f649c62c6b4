// src/types.rs

//! Small shared types used across the model, graph and engine layers.

use std::fmt;

/// Canonical node identifier (steps, data nodes and parameters share one
/// id namespace).
pub type NodeId = String;

/// Identifier of a step node.
pub type StepId = NodeId;

/// Key of an artifact, used in `$key` references.
pub type ArtifactKey = String;

/// Execution state of a single step.
///
/// `Idle -> Running -> {Completed, Failed}`; a cancelled run goes back to
/// `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionState {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
}

impl ExecutionState {
    pub fn is_running(self) -> bool {
        matches!(self, ExecutionState::Running)
    }
}

/// Freshness classification of a step's outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale,
    Missing,
    NoOutputs,
}

impl Freshness {
    /// `stale` and `missing` both mean "must re-run" and propagate downstream.
    pub fn needs_rerun(self) -> bool {
        matches!(self, Freshness::Stale | Freshness::Missing)
    }
}

impl fmt::Display for Freshness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Freshness::Fresh => "fresh",
            Freshness::Stale => "stale",
            Freshness::Missing => "missing",
            Freshness::NoOutputs => "no_outputs",
        };
        f.write_str(s)
    }
}

/// Terminal status reported by the task executor for one step run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalStatus {
    Success,
    Failure,
    Cancelled,
}

/// How the step ids of a run request relate to each other.
///
/// - `Single`: exactly one step.
/// - `Parallel`: a batch/group. Members never block each other through
///   dependencies (the executor orders them), but output conflicts inside
///   the batch are still rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    #[default]
    Single,
    Parallel,
}

