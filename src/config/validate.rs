// src/config/validate.rs

use crate::config::model::{ConfigFile, NodeConfig, RawConfigFile};
use crate::dag::build_graph;
use crate::errors::{PipedagError, Result};
use crate::model::parse_reference;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = PipedagError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.config, raw.node))
    }
}

/// Run every check against an already-parsed file.
pub fn validate_config(cfg: &RawConfigFile) -> Result<()> {
    validate_raw_config(cfg)
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_steps(cfg)?;
    validate_global_config(cfg)?;
    validate_references(cfg)?;
    validate_dag(cfg)?;
    Ok(())
}

fn ensure_has_steps(cfg: &RawConfigFile) -> Result<()> {
    if !cfg.node.values().any(|n| matches!(n, NodeConfig::Step(_))) {
        return Err(PipedagError::ConfigError(
            "pipeline must contain at least one [node.<id>] with type = \"step\"".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    if cfg.config.history_capacity == 0 {
        return Err(PipedagError::ConfigError(
            "[config].history_capacity must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_references(cfg: &RawConfigFile) -> Result<()> {
    for (id, node) in &cfg.node {
        let NodeConfig::Step(step) = node else {
            continue;
        };

        let ports = step
            .inputs
            .iter()
            .map(|(port, r)| ("input", port, r))
            .chain(step.outputs.iter().map(|(port, r)| ("output", port, r)));
        for (direction, port, reference) in ports {
            if reference.is_empty() {
                continue;
            }
            let Some(target) = parse_reference(reference) else {
                return Err(PipedagError::ConfigError(format!(
                    "step '{id}' {direction} '{port}' must be a `$data` reference or empty (got '{reference}')"
                )));
            };
            if !matches!(cfg.node.get(target), Some(NodeConfig::Data(_))) {
                return Err(PipedagError::ConfigError(format!(
                    "step '{id}' {direction} '{port}' references '{target}', which is not a data node"
                )));
            }
        }

        for (arg, value) in &step.args {
            let Some(target) = value.as_reference() else {
                continue;
            };
            match cfg.node.get(target) {
                None | Some(NodeConfig::Parameter(_)) => {}
                Some(NodeConfig::Step(_) | NodeConfig::Data(_)) => {
                    return Err(PipedagError::ConfigError(format!(
                        "step '{id}' arg '{arg}' references '{target}', which is not a parameter"
                    )));
                }
            }
        }
    }
    Ok(())
}

fn validate_dag(cfg: &RawConfigFile) -> Result<()> {
    let document = ConfigFile::new_unchecked(cfg.config.clone(), cfg.node.clone()).to_document();
    let graph = build_graph(&document.nodes, &document.edges);
    graph.topological_order().map(|_| ())
}
