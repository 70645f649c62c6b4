// src/freshness/mod.rs

//! Step freshness classification from artifact timestamps.
//!
//! Per step, in precedence order:
//! 1. `no_outputs` when the step produces nothing;
//! 2. `missing` when an output does not exist (or cannot be probed);
//! 3. `stale` when the newest input is newer than the oldest output, an
//!    input cannot be probed, or a direct upstream step is `stale`/`missing`;
//! 4. `fresh` otherwise.
//!
//! Steps are visited upstream-first, so checking only direct upstream
//! statuses is enough for staleness to accumulate along a chain.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::SystemTime;

use tracing::{debug, warn};

use crate::dag::DependencyGraph;
use crate::errors::Result;
use crate::fs::{ArtifactStatus, ArtifactStatusProvider};
use crate::types::{Freshness, StepId};

pub type FreshnessMap = BTreeMap<StepId, Freshness>;

/// Evaluator bound to one artifact status provider.
#[derive(Debug, Clone)]
pub struct FreshnessEvaluator {
    provider: Arc<dyn ArtifactStatusProvider>,
}

impl FreshnessEvaluator {
    pub fn new(provider: Arc<dyn ArtifactStatusProvider>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &Arc<dyn ArtifactStatusProvider> {
        &self.provider
    }

    pub fn evaluate(&self, graph: &DependencyGraph) -> Result<FreshnessMap> {
        evaluate_freshness(graph, self.provider.as_ref())
    }
}

/// Probe outcome cached per artifact key for one evaluation pass.
#[derive(Debug, Clone, Copy)]
enum Probe {
    /// Exists with a known modification time.
    Present(SystemTime),
    Absent,
    /// Probe failed or the platform reported no modification time.
    Unresolved,
}

/// Classify every step of `graph`.
///
/// Fails with a cycle conflict if the graph is cyclic; cyclic graphs are
/// rejected at edit time, so this only happens on a bypassed edit path.
pub fn evaluate_freshness(
    graph: &DependencyGraph,
    provider: &dyn ArtifactStatusProvider,
) -> Result<FreshnessMap> {
    let order = graph.topological_order()?;
    let model = graph.model();
    let mut probes: HashMap<&str, Probe> = HashMap::new();
    let mut result = FreshnessMap::new();

    for step in &order {
        let outputs = model.outputs_of(step);
        let status = if outputs.is_empty() {
            Freshness::NoOutputs
        } else {
            let output_probes: Vec<Probe> = outputs
                .iter()
                .map(|key| probe(&mut probes, graph, provider, key))
                .collect();
            let input_probes: Vec<Probe> = model
                .inputs_of(step)
                .iter()
                .map(|key| probe(&mut probes, graph, provider, key))
                .collect();

            if output_probes
                .iter()
                .any(|p| matches!(p, Probe::Absent | Probe::Unresolved))
            {
                Freshness::Missing
            } else if inputs_newer_than_outputs(&input_probes, &output_probes) {
                Freshness::Stale
            } else if graph
                .direct_upstream(step)
                .iter()
                .any(|up| result.get(up).is_some_and(|f: &Freshness| f.needs_rerun()))
            {
                Freshness::Stale
            } else {
                Freshness::Fresh
            }
        };

        debug!(step = %step, freshness = %status, "classified step");
        result.insert(step.clone(), status);
    }

    Ok(result)
}

/// An unresolvable input counts as newer (fail-safe); absent
/// inputs carry no timestamp and are not compared.
fn inputs_newer_than_outputs(inputs: &[Probe], outputs: &[Probe]) -> bool {
    if inputs.iter().any(|p| matches!(p, Probe::Unresolved)) {
        return true;
    }

    let newest_input = inputs
        .iter()
        .filter_map(|p| match p {
            Probe::Present(t) => Some(*t),
            _ => None,
        })
        .max();
    let oldest_output = outputs
        .iter()
        .filter_map(|p| match p {
            Probe::Present(t) => Some(*t),
            _ => None,
        })
        .min();

    match (newest_input, oldest_output) {
        (Some(input), Some(output)) => input > output,
        _ => false,
    }
}

fn probe<'g>(
    cache: &mut HashMap<&'g str, Probe>,
    graph: &'g DependencyGraph,
    provider: &dyn ArtifactStatusProvider,
    key: &'g str,
) -> Probe {
    if let Some(p) = cache.get(key) {
        return *p;
    }

    let result = match graph.model().artifact_by_key(key) {
        Some(artifact) => match provider.stat(&artifact.path) {
            Ok(ArtifactStatus {
                exists: true,
                modified_at: Some(t),
            }) => Probe::Present(t),
            Ok(ArtifactStatus {
                exists: true,
                modified_at: None,
            }) => Probe::Unresolved,
            Ok(ArtifactStatus { exists: false, .. }) => Probe::Absent,
            Err(e) => {
                warn!(
                    artifact = %key,
                    path = ?artifact.path,
                    error = %e,
                    "artifact status unavailable; treating as unresolved"
                );
                Probe::Unresolved
            }
        },
        None => Probe::Unresolved,
    };

    cache.insert(key, result);
    result
}
