// tests/session_history.rs

use std::time::Duration;

use pipedag::errors::PipedagError;
use pipedag::history::HistorySettings;
use pipedag::model::{Artifact, Edge, Node, ParamValue, Step};
use pipedag::session::PipelineSession;
use pipedag_test_utils::builders::{ConfigFileBuilder, StepConfigBuilder};
use pipedag_test_utils::init_tracing;

fn settings(capacity: usize, debounce_ms: u64) -> HistorySettings {
    HistorySettings {
        capacity,
        debounce: Duration::from_millis(debounce_ms),
    }
}

/// clean reads raw and writes cleaned; a threshold parameter feeds clean.
fn session(history: HistorySettings) -> PipelineSession {
    let cfg = ConfigFileBuilder::new()
        .with_data("raw", "raw.csv")
        .with_data("cleaned", "cleaned.csv")
        .with_param("threshold", ParamValue::Float(0.5))
        .with_step(
            "clean",
            StepConfigBuilder::new("python clean.py")
                .input("src", "raw")
                .output("out", "cleaned")
                .arg("threshold", ParamValue::reference("threshold"))
                .build(),
        )
        .build();
    PipelineSession::new(cfg.to_document(), history).unwrap()
}

#[test]
fn edits_extend_the_pipeline_and_undo_restores_it() {
    init_tracing();
    let mut s = session(HistorySettings::default());
    let loaded = s.document().clone();

    s.add_node(Step::new("plot", "python plot.py").into()).unwrap();
    s.connect(Edge::new("cleaned", "plot").with_target_handle("table")).unwrap();
    assert_eq!(s.graph().upstream("plot").len(), 1);

    // plot -> raw would close clean -> plot -> clean.
    s.add_node(Artifact::new("chart", "chart.png").into()).unwrap();
    let before = s.document().clone();
    let err = s.connect(Edge::new("plot", "raw")).unwrap_err();
    assert!(err.cycle_members().unwrap().contains("plot"));
    assert_eq!(s.document(), &before);

    s.connect(Edge::new("plot", "chart")).unwrap();

    while s.undo() {}
    assert_eq!(s.document(), &loaded);
    assert!(s.can_redo());

    while s.redo() {}
    assert!(s.document().step("plot").unwrap().outputs.contains_key("chart"));
}

#[test]
fn new_edit_after_undo_clears_redo() {
    let mut s = session(HistorySettings::default());
    s.add_node(Step::new("a", "true").into()).unwrap();
    assert!(s.undo());
    assert!(s.can_redo());

    s.add_node(Step::new("b", "true").into()).unwrap();
    assert!(!s.can_redo());
}

#[test]
fn history_is_bounded_by_capacity() {
    let mut s = session(settings(2, 300));
    for id in ["a", "b", "c"] {
        s.add_node(Step::new(id, "true").into()).unwrap();
    }

    assert!(s.undo());
    assert!(s.undo());
    assert!(!s.undo());
    // The oldest edit was evicted, so step `a` survives.
    assert!(s.document().step("a").is_some());
    assert!(s.document().step("b").is_none());
}

#[test]
fn duplicate_nodes_are_rejected() {
    let mut s = session(HistorySettings::default());
    let err = s.add_node(Step::new("clean", "true").into()).unwrap_err();
    assert!(matches!(err, PipedagError::DuplicateNode(_)));

    let err = s
        .add_node(Node::Artifact(Artifact::new("raw", "other.csv")))
        .unwrap_err();
    assert!(matches!(err, PipedagError::DuplicateNode(_)));
    assert!(!s.can_undo());
}

#[test]
fn removing_the_bound_parameter_clears_the_argument() {
    let mut s = session(HistorySettings::default());
    assert_eq!(s.document().edges.len(), 3);

    s.remove_node("threshold").unwrap();
    assert!(s.document().step("clean").unwrap().args.is_empty());
    assert_eq!(s.document().edges.len(), 2);

    assert!(s.undo());
    let clean = s.document().step("clean").unwrap();
    assert_eq!(clean.args.get("threshold"), Some(&ParamValue::reference("threshold")));
}

#[tokio::test]
async fn typing_burst_becomes_one_undo_step() {
    init_tracing();
    let mut s = session(settings(50, 40));
    let original = s.document().clone();

    for value in ["f", "fa", "fas", "fast"] {
        s.edit_arg_live("clean", "mode", ParamValue::String(value.into())).unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(s.can_undo());

    // Let the burst go quiet so the timer commits it.
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(s.undo());
    assert_eq!(s.document(), &original);
    assert!(!s.undo());

    assert!(s.redo());
    assert_eq!(
        s.document().step("clean").unwrap().args.get("mode"),
        Some(&ParamValue::String("fast".into()))
    );
}

#[tokio::test]
async fn undo_during_a_burst_reverts_the_burst() {
    let mut s = session(settings(50, 10_000));
    let original = s.document().clone();

    s.edit_parameter_live("threshold", ParamValue::Float(0.6)).unwrap();
    s.edit_parameter_live("threshold", ParamValue::Float(0.7)).unwrap();

    assert!(s.undo());
    assert_eq!(s.document(), &original);
}

#[tokio::test]
async fn discrete_edit_closes_an_open_burst() {
    let mut s = session(settings(50, 10_000));

    s.edit_arg_live("clean", "mode", ParamValue::String("slow".into())).unwrap();
    let after_burst = s.document().clone();
    s.set_arg("clean", "level", ParamValue::Integer(2)).unwrap();

    assert!(s.undo());
    assert_eq!(s.document(), &after_burst);
    assert!(s.undo());
    assert!(s.document().step("clean").unwrap().args.get("mode").is_none());
}

#[test]
fn live_edits_without_a_runtime_commit_immediately() {
    let mut s = session(settings(50, 300));
    s.edit_arg_live("clean", "mode", ParamValue::String("a".into())).unwrap();
    s.edit_arg_live("clean", "mode", ParamValue::String("ab".into())).unwrap();

    assert!(s.undo());
    assert_eq!(
        s.document().step("clean").unwrap().args.get("mode"),
        Some(&ParamValue::String("a".into()))
    );
}
