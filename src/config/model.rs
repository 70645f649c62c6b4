// src/config/model.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::history::{DEFAULT_CAPACITY, DEFAULT_DEBOUNCE, HistorySettings};
use crate::model::{
    Artifact, Edge, Node, ParamValue, Parameter, PipelineDocument, Step, parse_reference,
};

/// Top-level pipeline file as read from TOML, before validation.
///
/// ```toml
/// [config]
/// history_capacity = 50
/// history_debounce_ms = 300
///
/// [node.raw]
/// type = "data"
/// path = "data/raw.csv"
///
/// [node.threshold]
/// type = "parameter"
/// value = 0.5
///
/// [node.clean]
/// type = "step"
/// task = "python clean.py"
/// inputs = { src = "$raw" }
/// outputs = { out = "$cleaned" }
/// args = { threshold = "$threshold", mode = "fast" }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub config: ConfigSection,

    /// All nodes from `[node.<id>]`, keyed by node id.
    #[serde(default)]
    pub node: BTreeMap<String, NodeConfig>,
}

/// Validated pipeline file. Only obtainable through `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub node: BTreeMap<String, NodeConfig>,
    /// Directory relative artifact paths are resolved against.
    pub base_dir: Option<PathBuf>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(config: ConfigSection, node: BTreeMap<String, NodeConfig>) -> Self {
        Self {
            config,
            node,
            base_dir: None,
        }
    }

    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    pub fn history_settings(&self) -> HistorySettings {
        self.config.history_settings()
    }

    pub fn steps(&self) -> impl Iterator<Item = (&str, &StepConfig)> {
        self.node.iter().filter_map(|(id, node)| match node {
            NodeConfig::Step(step) => Some((id.as_str(), step)),
            NodeConfig::Data(_) | NodeConfig::Parameter(_) => None,
        })
    }

    /// Flatten into the node/edge lists the graph layer works on.
    ///
    /// Every output reference becomes a step -> data edge keyed by the port
    /// name, every input reference a data -> step edge, and every argument
    /// referencing a parameter a parameter -> step edge.
    pub fn to_document(&self) -> PipelineDocument {
        let mut nodes = Vec::with_capacity(self.node.len());
        let mut edges = Vec::new();

        for (id, node) in &self.node {
            match node {
                NodeConfig::Data(data) => {
                    let mut artifact = Artifact::new(id.as_str(), self.resolve_path(&data.path));
                    artifact.data_type = data.data_type.clone();
                    nodes.push(Node::Artifact(artifact));
                }
                NodeConfig::Parameter(param) => {
                    nodes.push(Node::Parameter(Parameter::new(id.as_str(), param.value.clone())));
                }
                NodeConfig::Step(cfg) => {
                    let mut step = Step::new(id.as_str(), cfg.task.as_str());
                    if let Some(name) = &cfg.name {
                        step.name = name.clone();
                    }
                    step.group = cfg.group.clone();

                    for (port, reference) in &cfg.outputs {
                        let key = parse_reference(reference).map(str::to_string);
                        if let Some(key) = &key {
                            edges.push(Edge::new(id.as_str(), key.as_str()).with_source_handle(port));
                        }
                        step.outputs.insert(port.clone(), key);
                    }
                    for (port, reference) in &cfg.inputs {
                        let key = parse_reference(reference).map(str::to_string);
                        if let Some(key) = &key {
                            edges.push(Edge::new(key.as_str(), id.as_str()).with_target_handle(port));
                        }
                        step.inputs.insert(port.clone(), key);
                    }
                    for (arg, value) in &cfg.args {
                        let bound = value
                            .as_reference()
                            .filter(|name| matches!(self.node.get(*name), Some(NodeConfig::Parameter(_))));
                        if let Some(param) = bound {
                            edges.push(Edge::new(param, id.as_str()).with_target_handle(arg));
                        }
                        step.args.insert(arg.clone(), value.clone());
                    }
                    nodes.push(Node::Step(step));
                }
            }
        }

        PipelineDocument::new(nodes, edges)
    }

    fn resolve_path(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Undo/redo stack bound. Must be >= 1.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Quiet period after which a burst of live edits becomes one snapshot.
    #[serde(default = "default_history_debounce_ms")]
    pub history_debounce_ms: u64,
}

fn default_history_capacity() -> usize {
    DEFAULT_CAPACITY
}

fn default_history_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE.as_millis() as u64
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            history_debounce_ms: default_history_debounce_ms(),
        }
    }
}

impl ConfigSection {
    pub fn history_settings(&self) -> HistorySettings {
        HistorySettings {
            capacity: self.history_capacity,
            debounce: Duration::from_millis(self.history_debounce_ms),
        }
    }
}

/// `[node.<id>]` section. The `type` tag is closed; anything else fails to
/// deserialize.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NodeConfig {
    Step(StepConfig),
    Data(DataConfig),
    Parameter(ParameterConfig),
}

#[derive(Debug, Clone, Deserialize)]
pub struct StepConfig {
    /// Display name; defaults to the node id.
    #[serde(default)]
    pub name: Option<String>,

    /// Shell command run by the process executor.
    pub task: String,

    #[serde(default)]
    pub group: Option<String>,

    /// Input port -> `$artifact` reference, or `""` when disconnected.
    #[serde(default)]
    pub inputs: BTreeMap<String, String>,

    /// Output port -> `$artifact` reference, or `""` when disconnected.
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,

    /// Literal values or `$parameter` references.
    #[serde(default)]
    pub args: BTreeMap<String, ParamValue>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_type")]
    pub data_type: String,

    pub path: PathBuf,
}

fn default_data_type() -> String {
    "any".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParameterConfig {
    pub value: ParamValue,
}
