// src/model/edge.rs

use crate::model::node::NodeKind;
use crate::types::NodeId;

/// A directed connection between two nodes.
///
/// `source_handle` names the producing step's output port, `target_handle`
/// names the consuming step's input port (or the bound argument for
/// parameter edges).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Edge {
    pub source: NodeId,
    pub target: NodeId,
    pub source_handle: Option<String>,
    pub target_handle: Option<String>,
}

impl Edge {
    pub fn new(source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            source_handle: None,
            target_handle: None,
        }
    }

    pub fn with_source_handle(mut self, handle: impl Into<String>) -> Self {
        self.source_handle = Some(handle.into());
        self
    }

    pub fn with_target_handle(mut self, handle: impl Into<String>) -> Self {
        self.target_handle = Some(handle.into());
        self
    }

    pub fn touches(&self, id: &str) -> bool {
        self.source == id || self.target == id
    }
}

/// Structural classification of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// Step -> Artifact.
    Produces,
    /// Artifact -> Step.
    Consumes,
    /// Parameter -> Step. Never part of dependency semantics.
    Binding,
}

impl EdgeKind {
    /// Classify by the kinds of the two endpoints. Returns `None` for
    /// combinations that carry no meaning (e.g. Step -> Step).
    pub fn classify(source: NodeKind, target: NodeKind) -> Option<EdgeKind> {
        match (source, target) {
            (NodeKind::Step, NodeKind::Data) => Some(EdgeKind::Produces),
            (NodeKind::Data, NodeKind::Step) => Some(EdgeKind::Consumes),
            (NodeKind::Parameter, NodeKind::Step) => Some(EdgeKind::Binding),
            (NodeKind::Step, NodeKind::Step)
            | (NodeKind::Step, NodeKind::Parameter)
            | (NodeKind::Data, NodeKind::Data)
            | (NodeKind::Data, NodeKind::Parameter)
            | (NodeKind::Parameter, NodeKind::Data)
            | (NodeKind::Parameter, NodeKind::Parameter) => None,
        }
    }

    pub fn is_dependency(self) -> bool {
        !matches!(self, EdgeKind::Binding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_is_structural() {
        assert_eq!(
            EdgeKind::classify(NodeKind::Step, NodeKind::Data),
            Some(EdgeKind::Produces)
        );
        assert_eq!(
            EdgeKind::classify(NodeKind::Data, NodeKind::Step),
            Some(EdgeKind::Consumes)
        );
        assert_eq!(
            EdgeKind::classify(NodeKind::Parameter, NodeKind::Step),
            Some(EdgeKind::Binding)
        );
        assert_eq!(EdgeKind::classify(NodeKind::Step, NodeKind::Step), None);
        assert!(!EdgeKind::Binding.is_dependency());
    }
}
