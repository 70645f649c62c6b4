// src/engine/admission.rs

//! The admission rule.
//!
//! A step may start only if it is outside the blocked set of the live
//! running set and shares no output artifact with any running step.
//! Running steps are checked against what they were admitted with as well
//! as against the current graph, so a step deleted by an edit still guards
//! the artifacts its process is writing.

use std::collections::{BTreeMap, BTreeSet};

use crate::dag::DependencyGraph;
use crate::engine::{RejectReason, RunRejection};
use crate::types::{ArtifactKey, StepId};

/// What a running step touched at the time it was admitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunningStep {
    pub outputs: BTreeSet<ArtifactKey>,
    pub upstream: BTreeSet<StepId>,
    pub downstream: BTreeSet<StepId>,
}

impl RunningStep {
    pub fn record(graph: &DependencyGraph, step: &str) -> Self {
        Self {
            outputs: graph.model().outputs_of(step).clone(),
            upstream: graph.upstream(step),
            downstream: graph.downstream(step),
        }
    }
}

/// Running steps keyed by id.
pub type RunningSet = BTreeMap<StepId, RunningStep>;

/// Check one step against the running set. `None` means admissible.
pub fn check_admission(
    graph: &DependencyGraph,
    running: &RunningSet,
    step: &str,
) -> Option<RunRejection> {
    let reject = |reason, conflicting: &str| RunRejection {
        step: step.to_string(),
        reason,
        conflicting: conflicting.to_string(),
    };

    if running.contains_key(step) {
        return Some(reject(RejectReason::AlreadyRunning, step));
    }

    let upstream = graph.upstream(step);
    if let Some(r) = running
        .iter()
        .find(|(r, live)| upstream.contains(*r) || live.downstream.contains(step))
        .map(|(r, _)| r)
    {
        return Some(reject(RejectReason::UpstreamRunning, r));
    }

    let downstream = graph.downstream(step);
    if let Some(r) = running
        .iter()
        .find(|(r, live)| downstream.contains(*r) || live.upstream.contains(step))
        .map(|(r, _)| r)
    {
        return Some(reject(RejectReason::DownstreamRunning, r));
    }

    let outputs = graph.model().outputs_of(step);
    running
        .iter()
        .find(|(r, live)| graph.has_output_conflict(step, r) || !live.outputs.is_disjoint(outputs))
        .map(|(r, _)| reject(RejectReason::OutputConflict, r))
}

/// Check a parallel batch.
///
/// Members are checked against the running set only; they never block each
/// other through dependencies, but two members writing the same artifact
/// reject the later one.
pub fn check_batch(
    graph: &DependencyGraph,
    running: &RunningSet,
    batch: &[StepId],
) -> Vec<RunRejection> {
    let mut rejections: Vec<RunRejection> = batch
        .iter()
        .filter_map(|step| check_admission(graph, running, step))
        .collect();

    for (i, later) in batch.iter().enumerate() {
        if let Some(earlier) = batch[..i]
            .iter()
            .find(|earlier| graph.has_output_conflict(later, earlier))
        {
            if !rejections.iter().any(|r| &r.step == later) {
                rejections.push(RunRejection {
                    step: later.clone(),
                    reason: RejectReason::OutputConflict,
                    conflicting: earlier.clone(),
                });
            }
        }
    }

    rejections
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::build_graph;
    use crate::model::{Artifact, Edge, Node, Step};

    fn running(g: &DependencyGraph, items: &[&str]) -> RunningSet {
        items
            .iter()
            .map(|s| (s.to_string(), RunningStep::record(g, s)))
            .collect()
    }

    /// A -x-> B -y-> C; D and E both write z; F is independent.
    fn graph() -> DependencyGraph {
        let nodes: Vec<Node> = vec![
            Step::new("A", "a").into(),
            Step::new("B", "b").into(),
            Step::new("C", "c").into(),
            Step::new("D", "d").into(),
            Step::new("E", "e").into(),
            Step::new("F", "f").into(),
            Artifact::new("x", "x").into(),
            Artifact::new("y", "y").into(),
            Artifact::new("z", "z").into(),
            Artifact::new("w", "w").into(),
        ];
        let edges = vec![
            Edge::new("A", "x"),
            Edge::new("x", "B"),
            Edge::new("B", "y"),
            Edge::new("y", "C"),
            Edge::new("D", "z"),
            Edge::new("E", "z"),
            Edge::new("F", "w"),
        ];
        build_graph(&nodes, &edges)
    }

    #[test]
    fn reasons_name_the_blocking_step() {
        let g = graph();
        let running = running(&g, &["B"]);

        let r = check_admission(&g, &running, "B").unwrap();
        assert_eq!(r.reason, RejectReason::AlreadyRunning);

        let r = check_admission(&g, &running, "C").unwrap();
        assert_eq!((r.reason, r.conflicting.as_str()), (RejectReason::UpstreamRunning, "B"));

        let r = check_admission(&g, &running, "A").unwrap();
        assert_eq!((r.reason, r.conflicting.as_str()), (RejectReason::DownstreamRunning, "B"));

        assert!(check_admission(&g, &running, "F").is_none());
    }

    #[test]
    fn output_conflict_blocks_unconnected_writers() {
        let g = graph();
        let r = check_admission(&g, &running(&g, &["D"]), "E").unwrap();
        assert_eq!((r.reason, r.conflicting.as_str()), (RejectReason::OutputConflict, "D"));
    }

    #[test]
    fn batch_members_do_not_block_each_other_by_dependency() {
        let g = graph();
        let batch: Vec<StepId> = vec!["A".into(), "B".into(), "C".into(), "F".into()];
        assert!(check_batch(&g, &RunningSet::new(), &batch).is_empty());
    }

    #[test]
    fn batch_output_conflicts_are_rejected() {
        let g = graph();
        let batch: Vec<StepId> = vec!["D".into(), "E".into()];
        let rejections = check_batch(&g, &RunningSet::new(), &batch);
        assert_eq!(rejections.len(), 1);
        assert_eq!(rejections[0].step, "E");
        assert_eq!(rejections[0].reason, RejectReason::OutputConflict);
        assert_eq!(rejections[0].conflicting, "D");
    }

    #[test]
    fn recorded_outputs_guard_a_step_removed_from_the_graph() {
        let before = graph();
        let live = running(&before, &["D"]);

        // D is gone; E is now the only writer of z.
        let nodes: Vec<Node> = vec![Step::new("E", "e").into(), Artifact::new("z", "z").into()];
        let after = build_graph(&nodes, &[Edge::new("E", "z")]);

        let r = check_admission(&after, &live, "E").unwrap();
        assert_eq!((r.reason, r.conflicting.as_str()), (RejectReason::OutputConflict, "D"));
    }

    #[test]
    fn recorded_dependencies_outlive_an_edit() {
        let before = graph();
        let live = running(&before, &["A"]);

        // The x edge is gone, so B no longer depends on A in the new graph.
        let nodes: Vec<Node> = vec![
            Step::new("A", "a").into(),
            Step::new("B", "b").into(),
            Artifact::new("x", "x").into(),
        ];
        let after = build_graph(&nodes, &[Edge::new("A", "x")]);

        let r = check_admission(&after, &live, "B").unwrap();
        assert_eq!((r.reason, r.conflicting.as_str()), (RejectReason::UpstreamRunning, "A"));
    }
}
