// src/dag/graph.rs

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::OnceLock;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use tracing::debug;

use crate::dag::cycles;
use crate::errors::{PipedagError, Result};
use crate::model::{Edge, GraphModel, Node};
use crate::types::{ArtifactKey, StepId};

/// Step-to-step dependency graph derived from one [`GraphModel`] snapshot.
///
/// A dependency between two steps only ever exists as the two-hop path
/// `Step -> Artifact -> Step`; parameter bindings never contribute.
///
/// The graph is immutable once built. Rebuilding on every edit is cheap and
/// avoids invalidating cached closures; transitive closures are memoized per
/// instance, so the first query for a step costs O(V+E) and later ones are
/// lookups.
#[derive(Debug)]
pub struct DependencyGraph {
    model: GraphModel,
    /// step -> producers of the artifacts it consumes
    upstream: BTreeMap<StepId, BTreeSet<StepId>>,
    /// step -> consumers of the artifacts it produces
    downstream: BTreeMap<StepId, BTreeSet<StepId>>,
    upstream_closure: HashMap<StepId, OnceLock<BTreeSet<StepId>>>,
    downstream_closure: HashMap<StepId, OnceLock<BTreeSet<StepId>>>,
}

/// Convenience: partition the flat lists and build the dependency graph.
pub fn build_graph(nodes: &[Node], edges: &[Edge]) -> DependencyGraph {
    DependencyGraph::build(GraphModel::build(nodes, edges))
}

impl DependencyGraph {
    pub fn build(model: GraphModel) -> Self {
        let mut upstream: BTreeMap<StepId, BTreeSet<StepId>> = BTreeMap::new();
        let mut downstream: BTreeMap<StepId, BTreeSet<StepId>> = BTreeMap::new();

        for step in model.step_ids() {
            upstream.entry(step.to_string()).or_default();
            downstream.entry(step.to_string()).or_default();
        }

        for step in model.step_ids() {
            for key in model.inputs_of(step) {
                for producer in model.producers_of(key) {
                    upstream
                        .entry(step.to_string())
                        .or_default()
                        .insert(producer.clone());
                    downstream
                        .entry(producer.clone())
                        .or_default()
                        .insert(step.to_string());
                }
            }
        }

        let upstream_closure = upstream.keys().map(|s| (s.clone(), OnceLock::new())).collect();
        let downstream_closure = upstream.keys().map(|s| (s.clone(), OnceLock::new())).collect();

        debug!(
            steps = upstream.len(),
            edges = upstream.values().map(BTreeSet::len).sum::<usize>(),
            "built dependency graph"
        );

        Self {
            model,
            upstream,
            downstream,
            upstream_closure,
            downstream_closure,
        }
    }

    /// The model this graph was derived from.
    pub fn model(&self) -> &GraphModel {
        &self.model
    }

    pub fn steps(&self) -> impl Iterator<Item = &str> {
        self.upstream.keys().map(|s| s.as_str())
    }

    pub fn contains_step(&self, step: &str) -> bool {
        self.upstream.contains_key(step)
    }

    /// Producers of the artifacts `step` consumes.
    pub fn direct_upstream(&self, step: &str) -> BTreeSet<StepId> {
        self.upstream.get(step).cloned().unwrap_or_default()
    }

    /// Consumers of the artifacts `step` produces.
    pub fn direct_downstream(&self, step: &str) -> BTreeSet<StepId> {
        self.downstream.get(step).cloned().unwrap_or_default()
    }

    /// Full transitive upstream of `step`, excluding `step` itself.
    pub fn upstream(&self, step: &str) -> BTreeSet<StepId> {
        match self.upstream_closure.get(step) {
            Some(cell) => cell.get_or_init(|| closure(step, &self.upstream)).clone(),
            None => BTreeSet::new(),
        }
    }

    /// Full transitive downstream of `step`, excluding `step` itself.
    pub fn downstream(&self, step: &str) -> BTreeSet<StepId> {
        match self.downstream_closure.get(step) {
            Some(cell) => cell.get_or_init(|| closure(step, &self.downstream)).clone(),
            None => BTreeSet::new(),
        }
    }

    /// Whether `a` and `b` declare at least one common output artifact.
    ///
    /// Independent of reachability: two unconnected writers of the same
    /// artifact still conflict.
    pub fn has_output_conflict(&self, a: &str, b: &str) -> bool {
        let outputs_b = self.model.outputs_of(b);
        self.model
            .outputs_of(a)
            .iter()
            .any(|key| outputs_b.contains(key))
    }

    /// Every artifact written by more than one step, with its writers.
    pub fn output_conflicts(&self) -> Vec<(ArtifactKey, BTreeSet<StepId>)> {
        self.model
            .artifacts()
            .filter_map(|artifact| {
                let producers = self.model.producers_of(&artifact.key);
                (producers.len() > 1).then(|| (artifact.key.clone(), producers.clone()))
            })
            .collect()
    }

    /// Steps that may not start while `running` are executing: each running
    /// step plus its full transitive upstream and downstream.
    pub fn blocked_steps(&self, running: &BTreeSet<StepId>) -> BTreeSet<StepId> {
        let mut blocked = BTreeSet::new();
        for step in running {
            blocked.insert(step.clone());
            blocked.extend(self.upstream(step));
            blocked.extend(self.downstream(step));
        }
        blocked
    }

    /// Every step that participates in a dependency cycle.
    pub fn detect_cycles(&self) -> BTreeSet<StepId> {
        let mut members = cycles::cycle_members(&self.downstream);

        // A back-edge only marks the path segment it closes. Nodes joined to
        // the same strongly connected component through a cross edge are
        // exactly those both upstream and downstream of a known member.
        let seeds: Vec<StepId> = members.iter().cloned().collect();
        for seed in seeds {
            let upstream = self.upstream(&seed);
            members.extend(self.downstream(&seed).intersection(&upstream).cloned());
        }
        members
    }

    /// Short-circuiting variant of [`detect_cycles`](Self::detect_cycles).
    pub fn has_cycles(&self) -> bool {
        cycles::has_cycle(&self.downstream)
    }

    /// Steps ordered upstream-before-downstream.
    ///
    /// Fails with [`PipedagError::CycleConflict`] if the graph is cyclic.
    pub fn topological_order(&self) -> Result<Vec<StepId>> {
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

        for step in self.upstream.keys() {
            graph.add_node(step.as_str());
        }
        for (step, dependents) in &self.downstream {
            for dependent in dependents {
                graph.add_edge(step.as_str(), dependent.as_str(), ());
            }
        }

        match toposort(&graph, None) {
            Ok(order) => Ok(order.into_iter().map(str::to_string).collect()),
            Err(_) => Err(PipedagError::CycleConflict(self.detect_cycles())),
        }
    }
}

/// BFS over one direction of the adjacency, excluding the start node.
fn closure(start: &str, adjacency: &BTreeMap<StepId, BTreeSet<StepId>>) -> BTreeSet<StepId> {
    let mut seen: BTreeSet<StepId> = BTreeSet::new();
    let mut queue: VecDeque<&str> = VecDeque::new();
    queue.push_back(start);

    while let Some(current) = queue.pop_front() {
        let Some(next) = adjacency.get(current) else {
            continue;
        };
        for neighbour in next {
            if seen.insert(neighbour.clone()) {
                queue.push_back(neighbour.as_str());
            }
        }
    }

    seen.remove(start);
    seen
}
