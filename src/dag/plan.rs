// src/dag/plan.rs

//! "Run everything that is out of date" as a per-plan state machine.
//!
//! A plan covers every step classified `stale` or `missing`, plus their
//! transitive downstream. A planned step becomes ready once every planned
//! upstream step finished successfully; a failure skips its planned
//! downstream for the rest of the plan. Admission of ready steps is left to
//! the coordinator, so a ready step may wait for unrelated running steps.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, warn};

use crate::dag::DependencyGraph;
use crate::types::{Freshness, StepId, TerminalStatus};

/// Per-plan state of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanStepState {
    /// Waiting on planned upstream steps or on admission.
    Pending,
    Running,
    DoneSuccess,
    /// Failed or was cancelled during this plan.
    DoneFailed,
    /// Not run because a planned upstream step failed.
    Skipped,
}

impl PlanStepState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PlanStepState::DoneSuccess | PlanStepState::DoneFailed | PlanStepState::Skipped
        )
    }
}

/// Structured result of feeding one completion into the plan.
#[derive(Debug, Clone, Default)]
pub struct PlanProgress {
    /// Planned dependents skipped because this step did not succeed.
    pub newly_skipped: Vec<StepId>,
    /// Whether every planned step is now terminal.
    pub plan_just_finished: bool,
}

#[derive(Debug, Clone)]
pub struct RunPlan {
    plan_id: u64,
    steps: BTreeMap<StepId, PlanStepState>,
}

impl RunPlan {
    /// Plan every `stale`/`missing` step and its transitive downstream.
    pub fn from_freshness(
        graph: &DependencyGraph,
        freshness: &BTreeMap<StepId, Freshness>,
        plan_id: u64,
    ) -> Self {
        let targets = freshness
            .iter()
            .filter(|(_, f)| f.needs_rerun())
            .map(|(step, _)| step.clone());
        Self::from_targets(graph, targets, plan_id)
    }

    /// Plan the given steps plus their transitive downstream.
    pub fn from_targets(
        graph: &DependencyGraph,
        targets: impl IntoIterator<Item = StepId>,
        plan_id: u64,
    ) -> Self {
        let mut steps = BTreeMap::new();
        for target in targets {
            if !graph.contains_step(&target) {
                warn!(step = %target, "plan target is not a step; ignoring");
                continue;
            }
            for dependent in graph.downstream(&target) {
                steps.insert(dependent, PlanStepState::Pending);
            }
            steps.insert(target, PlanStepState::Pending);
        }

        info!(plan_id, steps = steps.len(), "created run plan");
        Self { plan_id, steps }
    }

    pub fn plan_id(&self) -> u64 {
        self.plan_id
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn contains(&self, step: &str) -> bool {
        self.steps.contains_key(step)
    }

    pub fn state_of(&self, step: &str) -> Option<PlanStepState> {
        self.steps.get(step).copied()
    }

    pub fn steps(&self) -> impl Iterator<Item = (&str, PlanStepState)> {
        self.steps.iter().map(|(s, st)| (s.as_str(), *st))
    }

    pub fn is_finished(&self) -> bool {
        self.steps.values().all(|s| s.is_terminal())
    }

    /// Pending steps whose planned upstream all finished successfully.
    pub fn ready_steps(&self, graph: &DependencyGraph) -> Vec<StepId> {
        self.steps
            .iter()
            .filter(|(_, state)| matches!(state, PlanStepState::Pending))
            .filter(|(step, _)| {
                graph.upstream(step).iter().all(|up| {
                    !matches!(
                        self.steps.get(up),
                        Some(PlanStepState::Pending | PlanStepState::Running)
                    )
                })
            })
            .map(|(step, _)| step.clone())
            .collect()
    }

    pub fn mark_running(&mut self, step: &str) {
        if let Some(state) = self.steps.get_mut(step) {
            debug!(plan_id = self.plan_id, step = %step, "plan step marked Running");
            *state = PlanStepState::Running;
        }
    }

    /// Record the terminal status of a planned step.
    ///
    /// Steps outside the plan are ignored.
    pub fn handle_finished(
        &mut self,
        graph: &DependencyGraph,
        step: &str,
        status: TerminalStatus,
    ) -> PlanProgress {
        let mut progress = PlanProgress::default();

        match self.steps.get_mut(step) {
            Some(state) => match status {
                TerminalStatus::Success => *state = PlanStepState::DoneSuccess,
                TerminalStatus::Failure | TerminalStatus::Cancelled => {
                    *state = PlanStepState::DoneFailed;
                    warn!(
                        plan_id = self.plan_id,
                        step = %step,
                        ?status,
                        "planned step did not succeed; skipping its dependents"
                    );
                    progress.newly_skipped = self.skip_dependents(graph, step);
                }
            },
            None => return progress,
        }

        if self.is_finished() {
            info!(plan_id = self.plan_id, "run plan finished");
            progress.plan_just_finished = true;
        }
        progress
    }

    fn skip_dependents(&mut self, graph: &DependencyGraph, failed: &str) -> Vec<StepId> {
        let mut skipped = Vec::new();
        let dependents: BTreeSet<StepId> = graph.downstream(failed);
        for dependent in dependents {
            if let Some(state) = self.steps.get_mut(&dependent) {
                if matches!(state, PlanStepState::Pending) {
                    *state = PlanStepState::Skipped;
                    debug!(plan_id = self.plan_id, step = %dependent, "plan step skipped");
                    skipped.push(dependent);
                }
            }
        }
        skipped
    }
}
