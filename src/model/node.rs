// src/model/node.rs

//! Typed node representation: steps, data artifacts and parameters.
//!
//! Nodes form a closed sum type. Every consumer matches exhaustively, so a new
//! node kind cannot be silently ignored by the graph layer.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::Deserialize;

use crate::types::{ArtifactKey, NodeId, StepId};

/// Scalar value of a parameter or a literal step argument.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl ParamValue {
    /// If this value is a `$name` reference, the referenced name.
    pub fn as_reference(&self) -> Option<&str> {
        match self {
            ParamValue::String(s) => parse_reference(s),
            _ => None,
        }
    }

    /// Build a `$name` reference value.
    pub fn reference(name: &str) -> Self {
        ParamValue::String(format!("${name}"))
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{b}"),
            ParamValue::Integer(i) => write!(f, "{i}"),
            ParamValue::Float(x) => write!(f, "{x}"),
            ParamValue::String(s) => f.write_str(s),
        }
    }
}

/// Parse a `$name` reference. Returns `None` for plain strings and for a
/// bare `$`.
pub fn parse_reference(s: &str) -> Option<&str> {
    s.strip_prefix('$').filter(|name| !name.is_empty())
}

/// A unit of work with declared inputs, outputs and arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub id: StepId,
    pub name: String,
    /// Opaque task reference, resolved by the task executor.
    pub task: String,
    /// Input port name -> artifact key (or empty when disconnected).
    pub inputs: BTreeMap<String, Option<ArtifactKey>>,
    /// Output port name -> artifact key (or empty when disconnected).
    pub outputs: BTreeMap<String, Option<ArtifactKey>>,
    /// Argument name -> literal value or `$parameter` reference.
    pub args: BTreeMap<String, ParamValue>,
    pub group: Option<String>,
}

impl Step {
    pub fn new(id: impl Into<StepId>, task: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            task: task.into(),
            inputs: BTreeMap::new(),
            outputs: BTreeMap::new(),
            args: BTreeMap::new(),
            group: None,
        }
    }
}

/// A named, typed data object (file or directory).
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub id: NodeId,
    /// Unique key used in `$key` references.
    pub key: ArtifactKey,
    /// Type tag used for connection compatibility checks.
    pub data_type: String,
    pub path: PathBuf,
    /// Last known existence, refreshed by the artifact status provider.
    pub exists: Option<bool>,
}

impl Artifact {
    pub fn new(id: impl Into<NodeId>, path: impl Into<PathBuf>) -> Self {
        let id = id.into();
        Self {
            key: id.clone(),
            id,
            data_type: "any".to_string(),
            path: path.into(),
            exists: None,
        }
    }
}

/// A named scalar bindable to step args via `$name`.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub id: NodeId,
    pub name: String,
    pub value: ParamValue,
}

impl Parameter {
    pub fn new(id: impl Into<NodeId>, value: ParamValue) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            value,
        }
    }
}

/// Discriminant of a [`Node`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Step,
    Data,
    Parameter,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeKind::Step => "step",
            NodeKind::Data => "data",
            NodeKind::Parameter => "parameter",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Step(Step),
    Artifact(Artifact),
    Parameter(Parameter),
}

impl Node {
    pub fn id(&self) -> &str {
        match self {
            Node::Step(s) => &s.id,
            Node::Artifact(a) => &a.id,
            Node::Parameter(p) => &p.id,
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Step(_) => NodeKind::Step,
            Node::Artifact(_) => NodeKind::Data,
            Node::Parameter(_) => NodeKind::Parameter,
        }
    }

    pub fn as_step(&self) -> Option<&Step> {
        match self {
            Node::Step(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_artifact(&self) -> Option<&Artifact> {
        match self {
            Node::Artifact(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_parameter(&self) -> Option<&Parameter> {
        match self {
            Node::Parameter(p) => Some(p),
            _ => None,
        }
    }
}

impl From<Step> for Node {
    fn from(s: Step) -> Self {
        Node::Step(s)
    }
}

impl From<Artifact> for Node {
    fn from(a: Artifact) -> Self {
        Node::Artifact(a)
    }
}

impl From<Parameter> for Node {
    fn from(p: Parameter) -> Self {
        Node::Parameter(p)
    }
}
