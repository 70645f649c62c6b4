#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;

use pipedag::config::model::{DataConfig, NodeConfig, ParameterConfig};
use pipedag::config::{ConfigFile, ConfigSection, RawConfigFile, StepConfig};
use pipedag::dag::DependencyGraph;
use pipedag::model::{
    Artifact, Edge, GraphModel, Node, ParamValue, Parameter, PipelineDocument, Step,
};

/// Builder for a `PipelineDocument` expressed as nodes plus wiring calls.
///
/// Artifact paths default to `<id>` so tests can drive a `MockFileSystem`
/// with the artifact id.
#[derive(Debug, Default, Clone)]
pub struct PipelineBuilder {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(mut self, id: &str) -> Self {
        self.nodes.push(Step::new(id, format!("echo {id}")).into());
        self
    }

    pub fn step_with(mut self, step: StepBuilder) -> Self {
        self.nodes.push(step.build().into());
        self
    }

    pub fn data(mut self, id: &str) -> Self {
        self.nodes.push(Artifact::new(id, id).into());
        self
    }

    pub fn data_at(mut self, id: &str, path: impl Into<PathBuf>) -> Self {
        self.nodes.push(Artifact::new(id, path).into());
        self
    }

    pub fn param(mut self, id: &str, value: ParamValue) -> Self {
        self.nodes.push(Parameter::new(id, value).into());
        self
    }

    /// `step` writes `data`.
    pub fn produces(mut self, step: &str, data: &str) -> Self {
        self.edges.push(Edge::new(step, data));
        self
    }

    /// `step` reads `data`.
    pub fn consumes(mut self, data: &str, step: &str) -> Self {
        self.edges.push(Edge::new(data, step));
        self
    }

    /// `param` feeds argument `arg` of `step`.
    pub fn binds(mut self, param: &str, step: &str, arg: &str) -> Self {
        self.edges.push(Edge::new(param, step).with_target_handle(arg));
        self
    }

    /// Chain `steps[0] -> steps[1] -> ...` through one artifact per link,
    /// named `<producer>_out`.
    pub fn chain(mut self, steps: &[&str]) -> Self {
        for id in steps {
            if !self.nodes.iter().any(|n| n.id() == *id) {
                self = self.step(id);
            }
        }
        for pair in steps.windows(2) {
            let artifact = format!("{}_out", pair[0]);
            self = self
                .data(&artifact)
                .produces(pair[0], &artifact)
                .consumes(&artifact, pair[1]);
        }
        self
    }

    pub fn build(self) -> PipelineDocument {
        PipelineDocument::new(self.nodes, self.edges)
    }

    pub fn model(self) -> GraphModel {
        self.build().model()
    }

    pub fn graph(self) -> DependencyGraph {
        DependencyGraph::build(self.model())
    }
}

/// Builder for a single `Step` node.
#[derive(Debug, Clone)]
pub struct StepBuilder {
    step: Step,
}

impl StepBuilder {
    pub fn new(id: &str, task: &str) -> Self {
        Self {
            step: Step::new(id, task),
        }
    }

    pub fn group(mut self, group: &str) -> Self {
        self.step.group = Some(group.to_string());
        self
    }

    pub fn arg(mut self, name: &str, value: ParamValue) -> Self {
        self.step.args.insert(name.to_string(), value);
        self
    }

    pub fn build(self) -> Step {
        self.step
    }
}

/// Builder for `ConfigFile` to simplify config-level tests.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                config: ConfigSection::default(),
                node: BTreeMap::new(),
            },
        }
    }

    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.config.config.history_capacity = capacity;
        self
    }

    pub fn with_data(mut self, id: &str, path: &str) -> Self {
        self.config.node.insert(
            id.to_string(),
            NodeConfig::Data(DataConfig {
                data_type: "any".to_string(),
                path: PathBuf::from(path),
            }),
        );
        self
    }

    pub fn with_param(mut self, id: &str, value: ParamValue) -> Self {
        self.config
            .node
            .insert(id.to_string(), NodeConfig::Parameter(ParameterConfig { value }));
        self
    }

    pub fn with_step(mut self, id: &str, step: StepConfig) -> Self {
        self.config.node.insert(id.to_string(), NodeConfig::Step(step));
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `StepConfig`.
pub struct StepConfigBuilder {
    step: StepConfig,
}

impl StepConfigBuilder {
    pub fn new(task: &str) -> Self {
        Self {
            step: StepConfig {
                name: None,
                task: task.to_string(),
                group: None,
                inputs: BTreeMap::new(),
                outputs: BTreeMap::new(),
                args: BTreeMap::new(),
            },
        }
    }

    pub fn input(mut self, port: &str, data: &str) -> Self {
        self.step.inputs.insert(port.to_string(), format!("${data}"));
        self
    }

    pub fn output(mut self, port: &str, data: &str) -> Self {
        self.step.outputs.insert(port.to_string(), format!("${data}"));
        self
    }

    pub fn arg(mut self, name: &str, value: ParamValue) -> Self {
        self.step.args.insert(name.to_string(), value);
        self
    }

    pub fn group(mut self, group: &str) -> Self {
        self.step.group = Some(group.to_string());
        self
    }

    pub fn build(self) -> StepConfig {
        self.step
    }
}
