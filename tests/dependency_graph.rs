// tests/dependency_graph.rs

use std::collections::BTreeSet;

use pipedag::dag::DependencyGraph;
use pipedag::model::ParamValue;
use pipedag_test_utils::builders::{PipelineBuilder, StepBuilder};
use pipedag_test_utils::init_tracing;

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// A -x-> B -y-> C
fn linear() -> DependencyGraph {
    PipelineBuilder::new()
        .step("A")
        .step("B")
        .step("C")
        .data("x")
        .data("y")
        .produces("A", "x")
        .consumes("x", "B")
        .produces("B", "y")
        .consumes("y", "C")
        .graph()
}

#[test]
fn linear_pipeline_closures_and_blocking() {
    init_tracing();
    let g = linear();

    assert_eq!(g.upstream("C"), set(&["A", "B"]));
    assert_eq!(g.downstream("A"), set(&["B", "C"]));
    assert_eq!(g.blocked_steps(&set(&["B"])), set(&["A", "B", "C"]));
    assert_eq!(g.topological_order().unwrap(), vec!["A", "B", "C"]);
}

#[test]
fn closures_exclude_the_step_itself() {
    let g = linear();
    for step in ["A", "B", "C"] {
        assert!(!g.upstream(step).contains(step));
        assert!(!g.downstream(step).contains(step));
    }
    assert!(g.upstream("A").is_empty());
    assert!(g.downstream("C").is_empty());
}

#[test]
fn shared_output_is_a_conflict_without_dependency() {
    let g = PipelineBuilder::new()
        .step("A")
        .step("B")
        .data("z")
        .produces("A", "z")
        .produces("B", "z")
        .graph();

    assert!(g.has_output_conflict("A", "B"));
    assert!(g.upstream("A").is_empty());
    assert!(g.upstream("B").is_empty());

    let conflicts = g.output_conflicts();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].0, "z");
    assert_eq!(conflicts[0].1, set(&["A", "B"]));
}

#[test]
fn every_producer_of_a_consumed_artifact_is_upstream() {
    let g = PipelineBuilder::new()
        .step("A")
        .step("B")
        .step("C")
        .data("z")
        .produces("A", "z")
        .produces("B", "z")
        .consumes("z", "C")
        .graph();

    assert_eq!(g.upstream("C"), set(&["A", "B"]));
}

#[test]
fn parameter_bindings_create_no_dependency() {
    let g = PipelineBuilder::new()
        .step_with(StepBuilder::new("A", "a").arg("n", ParamValue::reference("p")))
        .step("B")
        .param("p", ParamValue::Integer(1))
        .binds("p", "A", "n")
        .binds("p", "B", "n")
        .graph();

    assert!(g.upstream("A").is_empty());
    assert!(g.upstream("B").is_empty());
    assert_eq!(g.blocked_steps(&set(&["A"])), set(&["A"]));
}

#[test]
fn cycle_members_are_reported() {
    let g = PipelineBuilder::new()
        .step("A")
        .step("B")
        .step("C")
        .data("x")
        .data("y")
        .data("w")
        .produces("A", "x")
        .consumes("x", "B")
        .produces("B", "y")
        .consumes("y", "A")
        .produces("C", "w")
        .graph();

    assert!(g.has_cycles());
    assert_eq!(g.detect_cycles(), set(&["A", "B"]));

    let err = g.topological_order().unwrap_err();
    assert_eq!(err.cycle_members(), Some(&set(&["A", "B"])));
}

#[test]
fn self_loop_through_an_artifact_is_a_cycle() {
    let g = PipelineBuilder::new()
        .step("A")
        .data("x")
        .produces("A", "x")
        .consumes("x", "A")
        .graph();
    assert_eq!(g.detect_cycles(), set(&["A"]));
}

#[test]
fn dangling_edges_are_ignored() {
    let g = PipelineBuilder::new()
        .step("A")
        .data("x")
        .produces("A", "x")
        .consumes("ghost", "A")
        .produces("A", "missing")
        .graph();

    assert!(!g.has_cycles());
    assert_eq!(g.model().outputs_of("A"), &set(&["x"]));
    assert!(g.model().inputs_of("A").is_empty());
}

#[test]
fn groups_select_their_members() {
    let g = PipelineBuilder::new()
        .step_with(StepBuilder::new("A", "a").group("prep"))
        .step_with(StepBuilder::new("B", "b").group("prep"))
        .step("C")
        .graph();

    let members: Vec<_> = g.model().steps_in_group("prep").map(|s| s.id.as_str()).collect();
    assert_eq!(members, vec!["A", "B"]);
}

#[test]
fn very_long_pipeline_is_checked_without_recursion() {
    let n = 30_000;
    let mut builder = PipelineBuilder::new();
    for i in 0..n {
        let step = format!("s{i}");
        let out = format!("o{i}");
        builder = builder.step(&step).data(&out).produces(&step, &out);
        if i > 0 {
            builder = builder.consumes(&format!("o{}", i - 1), &step);
        }
    }
    let g = builder.graph();

    assert!(!g.has_cycles());
    assert!(g.detect_cycles().is_empty());
    assert_eq!(g.topological_order().unwrap().len(), n);
}
