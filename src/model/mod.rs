// src/model/mod.rs

//! Typed pipeline model.
//!
//! - [`node`] defines the closed node sum type (step, data, parameter).
//! - [`edge`] defines edges and their structural classification.
//! - [`graph_model`] partitions a flat node/edge list and derives the
//!   producer/consumer maps the dependency graph is built from.
//! - [`PipelineDocument`] is the flat, snapshot-able editor state.

pub mod edge;
pub mod graph_model;
pub mod node;

pub use edge::{Edge, EdgeKind};
pub use graph_model::GraphModel;
pub use node::{Artifact, Node, NodeKind, ParamValue, Parameter, Step, parse_reference};

/// Flat node and edge lists: the unit of editing and of undo/redo snapshots.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PipelineDocument {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl PipelineDocument {
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self { nodes, edges }
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id() == id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id() == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.node(id).is_some()
    }

    pub fn step(&self, id: &str) -> Option<&Step> {
        self.node(id).and_then(Node::as_step)
    }

    pub fn step_mut(&mut self, id: &str) -> Option<&mut Step> {
        match self.node_mut(id) {
            Some(Node::Step(step)) => Some(step),
            _ => None,
        }
    }

    pub fn steps_mut(&mut self) -> impl Iterator<Item = &mut Step> {
        self.nodes.iter_mut().filter_map(|n| match n {
            Node::Step(step) => Some(step),
            _ => None,
        })
    }

    pub fn artifacts_mut(&mut self) -> impl Iterator<Item = &mut Artifact> {
        self.nodes.iter_mut().filter_map(|n| match n {
            Node::Artifact(artifact) => Some(artifact),
            _ => None,
        })
    }

    pub fn model(&self) -> GraphModel {
        GraphModel::from_document(self)
    }
}
