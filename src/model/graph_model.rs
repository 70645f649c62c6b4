// src/model/graph_model.rs

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::model::edge::{Edge, EdgeKind};
use crate::model::node::{Artifact, Node, NodeKind, ParamValue, Parameter, Step};
use crate::model::PipelineDocument;
use crate::types::{ArtifactKey, NodeId, StepId};

/// Partitioned view of a flat node/edge list.
///
/// Holds the three node partitions plus the producer/consumer maps that the
/// dependency graph is derived from. Construction never fails: edges whose
/// endpoints are missing, or whose endpoint kinds carry no meaning, are left
/// out of the derived maps (the editor produces such edges transiently).
#[derive(Debug, Clone, Default)]
pub struct GraphModel {
    steps: BTreeMap<StepId, Step>,
    artifacts: BTreeMap<NodeId, Artifact>,
    parameters: BTreeMap<NodeId, Parameter>,
    /// artifact node id -> artifact key
    artifact_keys: BTreeMap<NodeId, ArtifactKey>,
    /// All producing steps per artifact key. More than one producer is an
    /// output conflict, so no producer is ever dropped.
    producers: BTreeMap<ArtifactKey, BTreeSet<StepId>>,
    consumers: BTreeMap<ArtifactKey, BTreeSet<StepId>>,
    outputs: BTreeMap<StepId, BTreeSet<ArtifactKey>>,
    inputs: BTreeMap<StepId, BTreeSet<ArtifactKey>>,
    bindings: Vec<Edge>,
}

impl GraphModel {
    /// Build the partitions and derived maps from flat node/edge lists.
    pub fn build(nodes: &[Node], edges: &[Edge]) -> Self {
        let mut model = GraphModel::default();

        for node in nodes {
            if model.contains(node.id()) {
                debug!(node = %node.id(), "duplicate node id; keeping the first");
                continue;
            }
            match node {
                Node::Step(step) => {
                    model.outputs.insert(step.id.clone(), BTreeSet::new());
                    model.inputs.insert(step.id.clone(), BTreeSet::new());
                    model.steps.insert(step.id.clone(), step.clone());
                }
                Node::Artifact(artifact) => {
                    model
                        .artifact_keys
                        .insert(artifact.id.clone(), artifact.key.clone());
                    model.artifacts.insert(artifact.id.clone(), artifact.clone());
                }
                Node::Parameter(param) => {
                    model.parameters.insert(param.id.clone(), param.clone());
                }
            }
        }

        for edge in edges {
            match model.classify(edge) {
                Some(EdgeKind::Produces) => {
                    let Some(key) = model.artifact_keys.get(&edge.target).cloned() else {
                        continue;
                    };
                    model
                        .producers
                        .entry(key.clone())
                        .or_default()
                        .insert(edge.source.clone());
                    model
                        .outputs
                        .entry(edge.source.clone())
                        .or_default()
                        .insert(key);
                }
                Some(EdgeKind::Consumes) => {
                    let Some(key) = model.artifact_keys.get(&edge.source).cloned() else {
                        continue;
                    };
                    model
                        .consumers
                        .entry(key.clone())
                        .or_default()
                        .insert(edge.target.clone());
                    model
                        .inputs
                        .entry(edge.target.clone())
                        .or_default()
                        .insert(key);
                }
                Some(EdgeKind::Binding) => model.bindings.push(edge.clone()),
                None => {
                    debug!(
                        source = %edge.source,
                        target = %edge.target,
                        "ignoring edge with dangling or incompatible endpoints"
                    );
                }
            }
        }

        model
    }

    pub fn from_document(doc: &PipelineDocument) -> Self {
        Self::build(&doc.nodes, &doc.edges)
    }

    /// Classify an edge against this model's nodes. `None` if either
    /// endpoint is missing or the endpoint kinds carry no meaning.
    pub fn classify(&self, edge: &Edge) -> Option<EdgeKind> {
        let source = self.kind_of(&edge.source)?;
        let target = self.kind_of(&edge.target)?;
        EdgeKind::classify(source, target)
    }

    fn kind_of(&self, id: &str) -> Option<NodeKind> {
        if self.steps.contains_key(id) {
            Some(NodeKind::Step)
        } else if self.artifacts.contains_key(id) {
            Some(NodeKind::Data)
        } else if self.parameters.contains_key(id) {
            Some(NodeKind::Parameter)
        } else {
            None
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.kind_of(id).is_some()
    }

    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.steps.values()
    }

    pub fn step_ids(&self) -> impl Iterator<Item = &str> {
        self.steps.keys().map(|s| s.as_str())
    }

    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.get(id)
    }

    pub fn artifacts(&self) -> impl Iterator<Item = &Artifact> {
        self.artifacts.values()
    }

    pub fn artifact_by_key(&self, key: &str) -> Option<&Artifact> {
        self.artifact_keys
            .iter()
            .find(|(_, k)| k.as_str() == key)
            .and_then(|(id, _)| self.artifacts.get(id))
    }

    pub fn parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.values()
    }

    pub fn parameter_by_name(&self, name: &str) -> Option<&Parameter> {
        self.parameters.values().find(|p| p.name == name)
    }

    /// Steps that produce the given artifact.
    pub fn producers_of(&self, key: &str) -> &BTreeSet<StepId> {
        static EMPTY: BTreeSet<StepId> = BTreeSet::new();
        self.producers.get(key).unwrap_or(&EMPTY)
    }

    /// Steps that consume the given artifact.
    pub fn consumers_of(&self, key: &str) -> &BTreeSet<StepId> {
        static EMPTY: BTreeSet<StepId> = BTreeSet::new();
        self.consumers.get(key).unwrap_or(&EMPTY)
    }

    /// Artifact keys the step produces.
    pub fn outputs_of(&self, step: &str) -> &BTreeSet<ArtifactKey> {
        static EMPTY: BTreeSet<ArtifactKey> = BTreeSet::new();
        self.outputs.get(step).unwrap_or(&EMPTY)
    }

    /// Artifact keys the step consumes.
    pub fn inputs_of(&self, step: &str) -> &BTreeSet<ArtifactKey> {
        static EMPTY: BTreeSet<ArtifactKey> = BTreeSet::new();
        self.inputs.get(step).unwrap_or(&EMPTY)
    }

    /// Parameter -> Step edges.
    pub fn bindings(&self) -> &[Edge] {
        &self.bindings
    }

    pub fn steps_in_group<'a>(&'a self, group: &'a str) -> impl Iterator<Item = &'a Step> + 'a {
        self.steps
            .values()
            .filter(move |s| s.group.as_deref() == Some(group))
    }

    /// Value of a step argument with `$parameter` references substituted.
    /// References to unknown parameters are returned unchanged.
    pub fn resolve_arg(&self, value: &ParamValue) -> ParamValue {
        match value.as_reference().and_then(|name| self.parameter_by_name(name)) {
            Some(param) => param.value.clone(),
            None => value.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear() -> (Vec<Node>, Vec<Edge>) {
        let nodes = vec![
            Step::new("A", "a").into(),
            Step::new("B", "b").into(),
            Artifact::new("x", "x.csv").into(),
            Parameter::new("p", ParamValue::Integer(1)).into(),
        ];
        let edges = vec![
            Edge::new("A", "x").with_source_handle("out"),
            Edge::new("x", "B").with_target_handle("in"),
            Edge::new("p", "B").with_target_handle("n"),
        ];
        (nodes, edges)
    }

    #[test]
    fn partitions_and_maps() {
        let (nodes, edges) = linear();
        let model = GraphModel::build(&nodes, &edges);

        assert_eq!(model.steps().count(), 2);
        assert_eq!(model.artifacts().count(), 1);
        assert_eq!(model.parameters().count(), 1);
        assert!(model.producers_of("x").contains("A"));
        assert!(model.consumers_of("x").contains("B"));
        assert!(model.outputs_of("A").contains("x"));
        assert!(model.inputs_of("B").contains("x"));
        assert_eq!(model.bindings().len(), 1);
    }

    #[test]
    fn dangling_and_meaningless_edges_are_ignored() {
        let (nodes, mut edges) = linear();
        edges.push(Edge::new("A", "ghost"));
        edges.push(Edge::new("ghost", "B"));
        edges.push(Edge::new("A", "B"));
        let model = GraphModel::build(&nodes, &edges);

        assert_eq!(model.producers_of("x").len(), 1);
        assert!(model.producers_of("ghost").is_empty());
        assert_eq!(model.inputs_of("B").len(), 1);
    }

    #[test]
    fn multiple_producers_are_retained() {
        let nodes: Vec<Node> = vec![
            Step::new("A", "a").into(),
            Step::new("B", "b").into(),
            Artifact::new("z", "z.csv").into(),
        ];
        let edges = vec![Edge::new("A", "z"), Edge::new("B", "z")];
        let model = GraphModel::build(&nodes, &edges);

        let producers: Vec<_> = model.producers_of("z").iter().cloned().collect();
        assert_eq!(producers, vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn resolve_arg_substitutes_parameters() {
        let (nodes, edges) = linear();
        let model = GraphModel::build(&nodes, &edges);

        assert_eq!(
            model.resolve_arg(&ParamValue::reference("p")),
            ParamValue::Integer(1)
        );
        assert_eq!(
            model.resolve_arg(&ParamValue::reference("nope")),
            ParamValue::reference("nope")
        );
    }
}
