// src/config/mod.rs

//! Pipeline file loading and validation.
//!
//! - `model.rs`: the TOML-backed data model and its conversion into a
//!   [`PipelineDocument`](crate::model::PipelineDocument).
//! - `loader.rs`: reading a file from disk.
//! - `validate.rs`: reference checks and DAG correctness.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path};
pub use model::{ConfigFile, ConfigSection, NodeConfig, RawConfigFile, StepConfig};
pub use validate::validate_config;
