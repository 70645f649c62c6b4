// src/dag/mod.rs

//! Dependency graph and run planning.
//!
//! - [`graph`] derives the step -> step dependency graph from a
//!   [`GraphModel`](crate::model::GraphModel) and answers closure, conflict
//!   and blocking queries.
//! - [`cycles`] holds the depth-first cycle search.
//! - [`plan`] is the per-plan state machine behind "run all stale steps".

pub mod cycles;
pub mod graph;
pub mod plan;

pub use graph::{DependencyGraph, build_graph};
pub use plan::{PlanProgress, PlanStepState, RunPlan};
