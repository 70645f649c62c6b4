// src/session/mod.rs

//! Edit layer over one pipeline document.
//!
//! Every mutation is applied to a candidate copy first, validated, and only
//! then committed, with the pre-edit document recorded in the session's
//! history. A rejected edit leaves the committed document untouched.
//! Edges that would close a step cycle are rejected with the would-be cycle
//! members.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info, warn};

use crate::dag::{DependencyGraph, build_graph};
use crate::errors::{PipedagError, Result};
use crate::fs::ArtifactStatusProvider;
use crate::history::debounce::SharedHistory;
use crate::history::{HistoryManager, HistorySettings, SnapshotDebouncer};
use crate::model::{Edge, EdgeKind, GraphModel, Node, ParamValue, PipelineDocument};

#[derive(Debug)]
pub struct PipelineSession {
    document: PipelineDocument,
    history: SharedHistory<PipelineDocument>,
    debouncer: SnapshotDebouncer<PipelineDocument>,
}

impl PipelineSession {
    /// Open a session on `document`. Fails if the document is already cyclic.
    pub fn new(document: PipelineDocument, settings: HistorySettings) -> Result<Self> {
        ensure_acyclic(&document)?;

        let history = Arc::new(Mutex::new(HistoryManager::new(settings.capacity)));
        let debouncer = SnapshotDebouncer::new(Arc::clone(&history), settings.debounce);

        Ok(Self {
            document,
            history,
            debouncer,
        })
    }

    pub fn document(&self) -> &PipelineDocument {
        &self.document
    }

    pub fn model(&self) -> GraphModel {
        self.document.model()
    }

    pub fn graph(&self) -> DependencyGraph {
        DependencyGraph::build(self.model())
    }

    pub fn add_node(&mut self, node: Node) -> Result<()> {
        if self.document.contains(node.id()) {
            return Err(PipedagError::DuplicateNode(node.id().to_string()));
        }
        let model = self.model();
        match &node {
            Node::Artifact(a) if model.artifact_by_key(&a.key).is_some() => {
                return Err(PipedagError::DuplicateNode(format!("artifact key '{}'", a.key)));
            }
            Node::Parameter(p) if model.parameter_by_name(&p.name).is_some() => {
                return Err(PipedagError::DuplicateNode(format!("parameter '{}'", p.name)));
            }
            Node::Step(_) | Node::Artifact(_) | Node::Parameter(_) => {}
        }

        let mut candidate = self.document.clone();
        info!(node = %node.id(), kind = %node.kind(), "adding node");
        candidate.nodes.push(node);
        self.commit(candidate);
        Ok(())
    }

    /// Delete a node and every edge touching it.
    ///
    /// Steps that referenced a deleted artifact keep the port with an empty
    /// reference; every argument bound to a deleted parameter is cleared.
    pub fn remove_node(&mut self, id: &str) -> Result<Node> {
        let mut candidate = self.document.clone();
        let pos = candidate
            .nodes
            .iter()
            .position(|n| n.id() == id)
            .ok_or_else(|| PipedagError::NodeNotFound(id.to_string()))?;
        let removed = candidate.nodes.remove(pos);
        candidate.edges.retain(|e| !e.touches(id));

        match &removed {
            Node::Step(_) => {}
            Node::Artifact(artifact) => {
                for step in candidate.steps_mut() {
                    for port in step.inputs.values_mut().chain(step.outputs.values_mut()) {
                        if port.as_deref() == Some(artifact.key.as_str()) {
                            *port = None;
                        }
                    }
                }
            }
            Node::Parameter(param) => {
                let mut cleared = 0usize;
                for step in candidate.steps_mut() {
                    let before = step.args.len();
                    step.args
                        .retain(|_, value| value.as_reference() != Some(param.name.as_str()));
                    cleared += before - step.args.len();
                }
                debug!(parameter = %param.name, cleared, "cleared bound args");
            }
        }

        info!(node = %id, kind = %removed.kind(), "removed node");
        self.commit(candidate);
        Ok(removed)
    }

    /// Add an edge, updating the step's port or argument it binds.
    ///
    /// Re-connecting an already connected port replaces the previous edge.
    pub fn connect(&mut self, edge: Edge) -> Result<()> {
        let model = self.model();
        for end in [&edge.source, &edge.target] {
            if !model.contains(end) {
                return Err(PipedagError::NodeNotFound(end.clone()));
            }
        }
        let kind = model.classify(&edge).ok_or_else(|| {
            PipedagError::InvalidEdge(format!(
                "{} -> {}: only step -> data, data -> step and parameter -> step edges are allowed",
                edge.source, edge.target
            ))
        })?;

        let mut candidate = self.document.clone();
        let edge = bind_edge(&model, &mut candidate, edge, kind)?;
        candidate.edges.push(edge.clone());

        if kind.is_dependency() {
            ensure_acyclic(&candidate).inspect_err(|_| {
                warn!(
                    source = %edge.source,
                    target = %edge.target,
                    "rejected edge: it would introduce a cycle"
                );
            })?;
        }

        info!(source = %edge.source, target = %edge.target, ?kind, "connected");
        self.commit(candidate);
        Ok(())
    }

    /// Remove an edge and clear the port or argument it bound.
    pub fn disconnect(&mut self, edge: &Edge) -> Result<()> {
        let mut candidate = self.document.clone();
        let pos = candidate
            .edges
            .iter()
            .position(|e| e == edge)
            .ok_or_else(|| {
                PipedagError::InvalidEdge(format!("{} -> {} not found", edge.source, edge.target))
            })?;
        candidate.edges.remove(pos);

        match self.model().classify(edge) {
            Some(EdgeKind::Produces) => {
                if let (Some(step), Some(handle)) =
                    (candidate.step_mut(&edge.source), &edge.source_handle)
                {
                    step.outputs.insert(handle.clone(), None);
                }
            }
            Some(EdgeKind::Consumes) => {
                if let (Some(step), Some(handle)) =
                    (candidate.step_mut(&edge.target), &edge.target_handle)
                {
                    step.inputs.insert(handle.clone(), None);
                }
            }
            Some(EdgeKind::Binding) => {
                if let (Some(step), Some(handle)) =
                    (candidate.step_mut(&edge.target), &edge.target_handle)
                {
                    step.args.remove(handle);
                }
            }
            None => {}
        }

        info!(source = %edge.source, target = %edge.target, "disconnected");
        self.commit(candidate);
        Ok(())
    }

    /// Discrete argument edit: one history entry.
    pub fn set_arg(&mut self, step: &str, name: &str, value: ParamValue) -> Result<()> {
        let candidate = self.with_arg(step, name, value)?;
        self.commit(candidate);
        Ok(())
    }

    /// Live argument edit (typing): bursts collapse into one history entry.
    pub fn edit_arg_live(&mut self, step: &str, name: &str, value: ParamValue) -> Result<()> {
        let candidate = self.with_arg(step, name, value)?;
        self.commit_coalesced(candidate);
        Ok(())
    }

    /// Live parameter value edit: bursts collapse into one history entry.
    pub fn edit_parameter_live(&mut self, id: &str, value: ParamValue) -> Result<()> {
        let mut candidate = self.document.clone();
        match candidate.node_mut(id) {
            Some(Node::Parameter(param)) => param.value = value,
            _ => return Err(PipedagError::NodeNotFound(id.to_string())),
        }
        self.commit_coalesced(candidate);
        Ok(())
    }

    /// Restore the previous snapshot. Returns `false` if there was none.
    pub fn undo(&mut self) -> bool {
        self.debouncer.flush();
        let restored = lock(&self.history).undo(self.document.clone());
        match restored {
            Some(doc) => {
                self.document = doc;
                info!("undo");
                true
            }
            None => false,
        }
    }

    /// Re-apply the last undone edit. Returns `false` if there was none.
    pub fn redo(&mut self) -> bool {
        self.debouncer.flush();
        let restored = lock(&self.history).redo(self.document.clone());
        match restored {
            Some(doc) => {
                self.document = doc;
                info!("redo");
                true
            }
            None => false,
        }
    }

    pub fn can_undo(&self) -> bool {
        self.debouncer.is_pending() || lock(&self.history).can_undo()
    }

    pub fn can_redo(&self) -> bool {
        lock(&self.history).can_redo()
    }

    /// Refresh every artifact's `exists` flag. Not an undoable edit.
    pub fn refresh_artifact_status(&mut self, provider: &dyn ArtifactStatusProvider) {
        for artifact in self.document.artifacts_mut() {
            artifact.exists = match provider.stat(&artifact.path) {
                Ok(status) => Some(status.exists),
                Err(e) => {
                    warn!(artifact = %artifact.key, error = %e, "artifact status probe failed");
                    None
                }
            };
        }
    }

    fn with_arg(&self, step: &str, name: &str, value: ParamValue) -> Result<PipelineDocument> {
        let mut candidate = self.document.clone();
        let target = candidate
            .step_mut(step)
            .ok_or_else(|| PipedagError::StepNotFound(step.to_string()))?;
        target.args.insert(name.to_string(), value);
        Ok(candidate)
    }

    fn commit(&mut self, next: PipelineDocument) {
        self.debouncer.flush();
        let previous = std::mem::replace(&mut self.document, next);
        lock(&self.history).snapshot(previous);
    }

    fn commit_coalesced(&mut self, next: PipelineDocument) {
        let previous = std::mem::replace(&mut self.document, next);
        self.debouncer.touch(previous);
    }
}

/// Fill in default handles, point the step's port/arg at the other end and
/// drop any edge previously bound to the same port.
fn bind_edge(
    model: &GraphModel,
    candidate: &mut PipelineDocument,
    mut edge: Edge,
    kind: EdgeKind,
) -> Result<Edge> {
    match kind {
        EdgeKind::Produces => {
            let key = artifact_key(model, &edge.target)?;
            let handle = edge.source_handle.get_or_insert_with(|| key.clone()).clone();
            candidate.edges.retain(|e| {
                !(e.source == edge.source && e.source_handle.as_deref() == Some(handle.as_str()))
            });
            if let Some(step) = candidate.step_mut(&edge.source) {
                step.outputs.insert(handle, Some(key));
            }
        }
        EdgeKind::Consumes => {
            let key = artifact_key(model, &edge.source)?;
            let handle = edge.target_handle.get_or_insert_with(|| key.clone()).clone();
            candidate.edges.retain(|e| {
                !(e.target == edge.target && e.target_handle.as_deref() == Some(handle.as_str()))
            });
            if let Some(step) = candidate.step_mut(&edge.target) {
                step.inputs.insert(handle, Some(key));
            }
        }
        EdgeKind::Binding => {
            let name = model
                .parameters()
                .find(|p| p.id == edge.source)
                .map(|p| p.name.clone())
                .ok_or_else(|| PipedagError::NodeNotFound(edge.source.clone()))?;
            let handle = edge.target_handle.get_or_insert_with(|| name.clone()).clone();
            candidate.edges.retain(|e| {
                !(e.target == edge.target && e.target_handle.as_deref() == Some(handle.as_str()))
            });
            if let Some(step) = candidate.step_mut(&edge.target) {
                step.args.insert(handle, ParamValue::reference(&name));
            }
        }
    }
    Ok(edge)
}

fn artifact_key(model: &GraphModel, id: &str) -> Result<String> {
    model
        .artifacts()
        .find(|a| a.id == id)
        .map(|a| a.key.clone())
        .ok_or_else(|| PipedagError::NodeNotFound(id.to_string()))
}

fn ensure_acyclic(document: &PipelineDocument) -> Result<()> {
    let graph = build_graph(&document.nodes, &document.edges);
    if graph.has_cycles() {
        return Err(PipedagError::CycleConflict(graph.detect_cycles()));
    }
    Ok(())
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
