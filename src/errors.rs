// src/errors.rs

//! Crate-wide error type and result alias.

use std::collections::BTreeSet;

use thiserror::Error;

use crate::types::NodeId;

#[derive(Error, Debug)]
pub enum PipedagError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Step not found: {0}")]
    StepNotFound(String),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Duplicate node id: {0}")]
    DuplicateNode(String),

    #[error("Invalid edge: {0}")]
    InvalidEdge(String),

    /// The edit (or loaded pipeline) would make the step graph cyclic.
    /// Carries every step that participates in a cycle.
    #[error("Cycle detected between steps: {}", format_members(.0))]
    CycleConflict(BTreeSet<NodeId>),

    #[error("Invalid run request: {0}")]
    InvalidRequest(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Coordinator channel closed: {0}")]
    ChannelClosed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PipedagError {
    /// Cycle membership, if this is a cycle rejection.
    pub fn cycle_members(&self) -> Option<&BTreeSet<NodeId>> {
        match self {
            PipedagError::CycleConflict(members) => Some(members),
            _ => None,
        }
    }
}

fn format_members(members: &BTreeSet<NodeId>) -> String {
    members.iter().cloned().collect::<Vec<_>>().join(", ")
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, PipedagError>;
