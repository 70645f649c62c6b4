// src/engine/core.rs

//! Pure coordinator state machine.
//!
//! [`ExecutionCoordinator`] consumes [`CoordinatorEvent`]s and produces:
//! - updated execution state, freshness and plan progress
//! - a list of commands describing what the IO shell should do next
//!
//! It owns no channels except the one-shot reply senders carried inside
//! events, and never touches processes. Artifact status is read through the
//! evaluator's provider, which tests replace with an in-memory filesystem.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::dag::{DependencyGraph, PlanStepState, RunPlan};
use crate::engine::admission::{RunningSet, RunningStep, check_admission, check_batch};
use crate::engine::{
    Admission, CoordinatorCommand, CoordinatorEvent, CoordinatorSnapshot, CoordinatorStep,
    StepJob,
};
use crate::errors::{PipedagError, Result};
use crate::freshness::{FreshnessEvaluator, FreshnessMap};
use crate::model::GraphModel;
use crate::types::{ArtifactKey, ExecutionState, Freshness, RunMode, StepId, TerminalStatus};

/// Options controlling the outer loop behaviour.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoordinatorOptions {
    /// Stop once nothing is running and no plan is active (one-shot CLI).
    pub exit_when_idle: bool,
}

#[derive(Debug)]
pub struct ExecutionCoordinator {
    graph: DependencyGraph,
    evaluator: FreshnessEvaluator,
    states: BTreeMap<StepId, ExecutionState>,
    /// Running steps with what they touched when admitted.
    running: RunningSet,
    /// Running steps a cancel was already sent for.
    cancelling: BTreeSet<StepId>,
    freshness: FreshnessMap,
    plan: Option<RunPlan>,
    next_run_id: u64,
    next_plan_id: u64,
    options: CoordinatorOptions,
}

impl ExecutionCoordinator {
    /// Build a coordinator over `model`. Rejects cyclic graphs.
    pub fn new(
        model: GraphModel,
        evaluator: FreshnessEvaluator,
        options: CoordinatorOptions,
    ) -> Result<Self> {
        let graph = acyclic_graph(model)?;
        let freshness = evaluator.evaluate(&graph)?;
        let states = graph
            .steps()
            .map(|s| (s.to_string(), ExecutionState::Idle))
            .collect();

        Ok(Self {
            graph,
            evaluator,
            states,
            running: RunningSet::new(),
            cancelling: BTreeSet::new(),
            freshness,
            plan: None,
            next_run_id: 0,
            next_plan_id: 0,
            options,
        })
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn state_of(&self, step: &str) -> Option<ExecutionState> {
        self.states.get(step).copied()
    }

    pub fn freshness_of(&self, step: &str) -> Option<Freshness> {
        self.freshness.get(step).copied()
    }

    pub fn running(&self) -> BTreeSet<StepId> {
        self.running.keys().cloned().collect()
    }

    /// Blocked set of the running steps, including the dependencies they
    /// were admitted with.
    pub fn blocked_steps(&self) -> BTreeSet<StepId> {
        let mut blocked = self.graph.blocked_steps(&self.running());
        for live in self.running.values() {
            blocked.extend(live.upstream.iter().cloned());
            blocked.extend(live.downstream.iter().cloned());
        }
        blocked
    }

    pub fn plan(&self) -> Option<&RunPlan> {
        self.plan.as_ref()
    }

    /// Nothing is running and no plan is waiting for admission.
    pub fn is_idle(&self) -> bool {
        self.running.is_empty() && self.plan.is_none()
    }

    pub fn snapshot(&self) -> CoordinatorSnapshot {
        CoordinatorSnapshot {
            states: self.states.clone(),
            freshness: self.freshness.clone(),
            running: self.running(),
            blocked: self.blocked_steps(),
            plan: self.plan.as_ref().map(|p| {
                p.steps()
                    .map(|(step, state)| (step.to_string(), state))
                    .collect()
            }),
        }
    }

    /// Handle one event and return the commands for the IO shell.
    pub fn step(&mut self, event: CoordinatorEvent) -> CoordinatorStep {
        let commands = match event {
            CoordinatorEvent::RunRequested { steps, mode, reply } => {
                let (answer, commands) = match self.request_run(&steps, mode) {
                    Ok((admission, commands)) => (Ok(admission), commands),
                    Err(e) => (Err(e), Vec::new()),
                };
                respond(reply, answer);
                commands
            }
            CoordinatorEvent::RunStaleRequested { reply } => {
                let (answer, commands) = match self.run_stale() {
                    Ok((planned, commands)) => (Ok(planned), commands),
                    Err(e) => (Err(e), Vec::new()),
                };
                respond(reply, answer);
                commands
            }
            CoordinatorEvent::CancelRequested { step, reply } => {
                let (answer, commands) = match self.request_cancel(&step) {
                    Ok(commands) => (Ok(()), commands),
                    Err(e) => (Err(e), Vec::new()),
                };
                respond(reply, answer);
                commands
            }
            CoordinatorEvent::StepFinished { step, status } => self.handle_finished(&step, status),
            CoordinatorEvent::GraphReplaced { model, reply } => {
                respond(reply, self.replace_graph(model));
                Vec::new()
            }
            CoordinatorEvent::SnapshotRequested { reply } => {
                if reply.send(self.snapshot()).is_err() {
                    debug!("snapshot requester went away");
                }
                Vec::new()
            }
            CoordinatorEvent::ShutdownRequested => {
                info!(running = self.running.len(), "shutdown requested");
                let commands = self
                    .running
                    .keys()
                    .map(|s| CoordinatorCommand::Cancel(s.clone()))
                    .collect();
                return CoordinatorStep {
                    commands,
                    keep_running: false,
                };
            }
        };

        if self.options.exit_when_idle && self.is_idle() {
            let mut commands = commands;
            commands.push(CoordinatorCommand::RequestExit);
            return CoordinatorStep {
                commands,
                keep_running: false,
            };
        }
        CoordinatorStep::continue_with(commands)
    }

    /// Decide a run request and, if admitted, move the steps to `Running`.
    ///
    /// Malformed requests (empty, unknown step, several ids in single mode)
    /// are errors; blocked requests are a successful, non-admitted answer.
    pub fn request_run(
        &mut self,
        steps: &[StepId],
        mode: RunMode,
    ) -> Result<(Admission, Vec<CoordinatorCommand>)> {
        let mut batch: Vec<StepId> = Vec::with_capacity(steps.len());
        for step in steps {
            if !self.graph.contains_step(step) {
                return Err(PipedagError::StepNotFound(step.clone()));
            }
            if !batch.contains(step) {
                batch.push(step.clone());
            }
        }

        let rejections = match (mode, batch.as_slice()) {
            (_, []) => {
                return Err(PipedagError::InvalidRequest("no steps requested".into()));
            }
            (RunMode::Single, [step]) => {
                check_admission(&self.graph, &self.running, step).into_iter().collect()
            }
            (RunMode::Single, _) => {
                return Err(PipedagError::InvalidRequest(format!(
                    "single mode takes exactly one step, got {}",
                    batch.len()
                )));
            }
            (RunMode::Parallel, members) => check_batch(&self.graph, &self.running, members),
        };

        if !rejections.is_empty() {
            for r in &rejections {
                warn!(step = %r.step, reason = %r.reason, conflicting = %r.conflicting, "run rejected");
            }
            return Ok((Admission::rejected(rejections), Vec::new()));
        }

        let jobs = self.admit(&batch);
        Ok((Admission::admitted(), vec![CoordinatorCommand::Dispatch(jobs)]))
    }

    /// Plan every stale/missing step plus its downstream and start whatever
    /// is admissible. Returns the number of planned steps.
    pub fn run_stale(&mut self) -> Result<(usize, Vec<CoordinatorCommand>)> {
        if let Some(plan) = &self.plan {
            return Err(PipedagError::InvalidRequest(format!(
                "run plan {} is still active",
                plan.plan_id()
            )));
        }

        self.refresh_freshness();
        self.next_plan_id += 1;
        let plan = RunPlan::from_freshness(&self.graph, &self.freshness, self.next_plan_id);
        if plan.is_empty() {
            info!("every step is fresh; nothing to run");
            return Ok((0, Vec::new()));
        }

        let planned = plan.steps().count();
        self.plan = Some(plan);
        Ok((planned, self.advance_plan()))
    }

    /// Ask the executor to stop a running step.
    ///
    /// The step stays `Running` until the executor reports the cancelled
    /// terminal status. Cancelling a step that is only pending in the
    /// active plan drops it (and its planned dependents) from the plan.
    pub fn request_cancel(&mut self, step: &str) -> Result<Vec<CoordinatorCommand>> {
        if !self.graph.contains_step(step) && !self.running.contains_key(step) {
            return Err(PipedagError::StepNotFound(step.to_string()));
        }

        if self.running.contains_key(step) {
            if !self.cancelling.insert(step.to_string()) {
                debug!(step = %step, "cancel already requested");
                return Ok(Vec::new());
            }
            info!(step = %step, "cancelling step");
            return Ok(vec![CoordinatorCommand::Cancel(step.to_string())]);
        }

        let Some(plan) = self.plan.as_mut() else {
            debug!(step = %step, "cancel ignored; step is not running");
            return Ok(Vec::new());
        };
        if plan.state_of(step) == Some(PlanStepState::Pending) {
            info!(step = %step, plan_id = plan.plan_id(), "dropping pending step from plan");
            let progress = plan.handle_finished(&self.graph, step, TerminalStatus::Cancelled);
            if progress.plan_just_finished {
                self.plan = None;
            }
        }
        Ok(Vec::new())
    }

    /// Record a terminal status reported by the executor.
    pub fn handle_finished(&mut self, step: &str, status: TerminalStatus) -> Vec<CoordinatorCommand> {
        if self.running.remove(step).is_none() {
            warn!(step = %step, ?status, "completion for a step that is not running; ignoring");
            return Vec::new();
        }
        self.cancelling.remove(step);

        let next = match status {
            TerminalStatus::Success => ExecutionState::Completed,
            TerminalStatus::Failure => ExecutionState::Failed,
            TerminalStatus::Cancelled => ExecutionState::Idle,
        };
        if self.graph.contains_step(step) {
            self.states.insert(step.to_string(), next);
        }
        match status {
            TerminalStatus::Success => info!(step = %step, "step completed"),
            TerminalStatus::Failure => warn!(step = %step, "step failed"),
            TerminalStatus::Cancelled => info!(step = %step, "step cancelled"),
        }

        self.refresh_freshness();

        let mut commands = Vec::new();
        if let Some(plan) = self.plan.as_mut() {
            let progress = plan.handle_finished(&self.graph, step, status);
            if progress.plan_just_finished {
                self.plan = None;
            } else {
                commands = self.advance_plan();
            }
        }
        commands
    }

    /// Swap in a new model after committed edits.
    ///
    /// Execution states survive for steps that still exist; running steps
    /// keep running even if they were deleted, and keep guarding the
    /// artifacts and dependencies they were admitted with until they
    /// finish. An active plan is abandoned.
    pub fn replace_graph(&mut self, model: GraphModel) -> Result<()> {
        let graph = acyclic_graph(model)?;

        let mut states: BTreeMap<StepId, ExecutionState> = graph
            .steps()
            .map(|s| {
                let state = self.states.get(s).copied().unwrap_or_default();
                (s.to_string(), state)
            })
            .collect();
        for step in self.running.keys() {
            states.insert(step.clone(), ExecutionState::Running);
        }

        if let Some(plan) = self.plan.take() {
            warn!(plan_id = plan.plan_id(), "graph replaced; abandoning active run plan");
        }

        self.graph = graph;
        self.states = states;
        self.refresh_freshness();
        info!(steps = self.states.len(), "graph replaced");
        Ok(())
    }

    /// Mark `steps` running and build their jobs. `steps` must be admissible.
    fn admit(&mut self, steps: &[StepId]) -> Vec<StepJob> {
        self.next_run_id += 1;
        let run_id = self.next_run_id;
        let model = self.graph.model();

        let jobs: Vec<StepJob> = steps
            .iter()
            .filter_map(|id| model.step(id))
            .map(|step| {
                let upstream = self.graph.upstream(&step.id);
                let after = steps
                    .iter()
                    .filter(|other| upstream.contains(*other))
                    .cloned()
                    .collect();
                StepJob {
                    step: step.id.clone(),
                    task: step.task.clone(),
                    inputs: resolve_ports(model, &step.inputs, model.inputs_of(&step.id)),
                    outputs: resolve_ports(model, &step.outputs, model.outputs_of(&step.id)),
                    args: step
                        .args
                        .iter()
                        .map(|(name, value)| (name.clone(), model.resolve_arg(value)))
                        .collect(),
                    run_id,
                    after,
                }
            })
            .collect();

        for job in &jobs {
            let live = RunningStep::record(&self.graph, &job.step);
            self.running.insert(job.step.clone(), live);
            self.states.insert(job.step.clone(), ExecutionState::Running);
            if let Some(plan) = self.plan.as_mut() {
                plan.mark_running(&job.step);
            }
        }
        info!(run_id, steps = ?steps, "admitted run");
        jobs
    }

    /// Start every ready planned step that passes admission right now.
    fn advance_plan(&mut self) -> Vec<CoordinatorCommand> {
        let Some(plan) = &self.plan else {
            return Vec::new();
        };

        let mut commands = Vec::new();
        for step in plan.ready_steps(&self.graph) {
            match check_admission(&self.graph, &self.running, &step) {
                None => {
                    let jobs = self.admit(std::slice::from_ref(&step));
                    commands.push(CoordinatorCommand::Dispatch(jobs));
                }
                Some(rejection) => {
                    debug!(step = %step, reason = %rejection.reason, "planned step waiting");
                }
            }
        }
        commands
    }

    fn refresh_freshness(&mut self) {
        match self.evaluator.evaluate(&self.graph) {
            Ok(freshness) => self.freshness = freshness,
            Err(e) => warn!(error = %e, "freshness evaluation failed; keeping previous result"),
        }
    }
}

fn acyclic_graph(model: GraphModel) -> Result<DependencyGraph> {
    let graph = DependencyGraph::build(model);
    if graph.has_cycles() {
        return Err(PipedagError::CycleConflict(graph.detect_cycles()));
    }
    Ok(graph)
}

/// Port name -> artifact path. Named ports win; artifacts linked by an
/// edge but not named by any port appear under their key.
fn resolve_ports(
    model: &GraphModel,
    ports: &BTreeMap<String, Option<ArtifactKey>>,
    linked: &BTreeSet<ArtifactKey>,
) -> BTreeMap<String, PathBuf> {
    let mut resolved: BTreeMap<String, PathBuf> = ports
        .iter()
        .filter_map(|(name, key)| {
            let artifact = model.artifact_by_key(key.as_deref()?)?;
            Some((name.clone(), artifact.path.clone()))
        })
        .collect();

    for key in linked {
        if ports.values().any(|p| p.as_deref() == Some(key.as_str())) {
            continue;
        }
        if let Some(artifact) = model.artifact_by_key(key) {
            resolved.insert(key.clone(), artifact.path.clone());
        }
    }
    resolved
}

fn respond<T>(reply: Option<tokio::sync::oneshot::Sender<T>>, value: T) {
    if let Some(reply) = reply {
        if reply.send(value).is_err() {
            debug!("requester went away before the reply");
        }
    }
}
