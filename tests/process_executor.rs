// tests/process_executor.rs
#![cfg(unix)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use pipedag::engine::{
    CoordinatorHandle, CoordinatorOptions, CoordinatorSnapshot, ExecutionCoordinator, Runtime,
};
use pipedag::errors::Result;
use pipedag::exec::ProcessExecutor;
use pipedag::freshness::FreshnessEvaluator;
use pipedag::fs::RealFileSystem;
use pipedag::model::{GraphModel, ParamValue};
use pipedag::types::{ExecutionState, Freshness, RunMode};
use pipedag_test_utils::builders::{PipelineBuilder, StepBuilder};
use pipedag_test_utils::{init_tracing, with_timeout};

fn start(
    model: GraphModel,
    workdir: &Path,
    options: CoordinatorOptions,
) -> (CoordinatorHandle, JoinHandle<Result<ExecutionCoordinator>>) {
    let evaluator = FreshnessEvaluator::new(Arc::new(RealFileSystem));
    let core = ExecutionCoordinator::new(model, evaluator, options).unwrap();
    let (tx, rx) = mpsc::channel(64);
    let executor = ProcessExecutor::new(tx.clone(), workdir);
    let runtime = tokio::spawn(Runtime::new(core, rx, executor).run());
    (CoordinatorHandle::new(tx), runtime)
}

async fn wait_for(
    handle: &CoordinatorHandle,
    mut condition: impl FnMut(&CoordinatorSnapshot) -> bool,
) -> CoordinatorSnapshot {
    with_timeout(async {
        loop {
            let snapshot = handle.snapshot().await.unwrap();
            if condition(&snapshot) {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
}

fn ids(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// A writes x, B copies x to y.
fn copy_pipeline(dir: &Path, task_a: &str) -> GraphModel {
    PipelineBuilder::new()
        .step_with(StepBuilder::new("A", task_a))
        .step_with(StepBuilder::new(
            "B",
            r#"cat "$PIPEDAG_INPUT_X" > "$PIPEDAG_OUTPUT_Y""#,
        ))
        .data_at("x", dir.join("x.txt"))
        .data_at("y", dir.join("y.txt"))
        .produces("A", "x")
        .consumes("x", "B")
        .produces("B", "y")
        .model()
}

#[tokio::test]
async fn batch_runs_in_dependency_order_through_real_processes() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let model = copy_pipeline(dir.path(), r#"sleep 0.2; printf hello > "$PIPEDAG_OUTPUT_X""#);
    let (handle, runtime) = start(model, dir.path(), CoordinatorOptions::default());

    let admission = handle.request_run(ids(&["A", "B"]), RunMode::Parallel).await.unwrap();
    assert!(admission.admitted);

    let snapshot = wait_for(&handle, |s| s.running.is_empty()).await;
    assert_eq!(snapshot.states["A"], ExecutionState::Completed);
    assert_eq!(snapshot.states["B"], ExecutionState::Completed);
    assert_eq!(std::fs::read_to_string(dir.path().join("y.txt")).unwrap(), "hello");
    assert_eq!(snapshot.freshness["A"], Freshness::Fresh);

    handle.shutdown().await.unwrap();
    runtime.await.unwrap().unwrap();
}

#[tokio::test]
async fn failed_upstream_stops_the_rest_of_the_batch() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let model = copy_pipeline(dir.path(), "exit 3");
    let (handle, runtime) = start(model, dir.path(), CoordinatorOptions::default());

    assert!(handle.request_run(ids(&["A", "B"]), RunMode::Parallel).await.unwrap().admitted);

    let snapshot = wait_for(&handle, |s| s.running.is_empty()).await;
    assert_eq!(snapshot.states["A"], ExecutionState::Failed);
    assert_eq!(snapshot.states["B"], ExecutionState::Idle);
    assert!(!dir.path().join("y.txt").exists());

    handle.shutdown().await.unwrap();
    runtime.await.unwrap().unwrap();
}

#[tokio::test]
async fn cancel_kills_a_long_running_process() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let model = PipelineBuilder::new()
        .step_with(StepBuilder::new("slow", "sleep 30"))
        .model();
    let (handle, runtime) = start(model, dir.path(), CoordinatorOptions::default());

    assert!(handle.request_run(ids(&["slow"]), RunMode::Single).await.unwrap().admitted);
    wait_for(&handle, |s| s.states["slow"] == ExecutionState::Running).await;

    handle.cancel("slow").await.unwrap();
    let snapshot = wait_for(&handle, |s| s.running.is_empty()).await;
    assert_eq!(snapshot.states["slow"], ExecutionState::Idle);

    handle.shutdown().await.unwrap();
    runtime.await.unwrap().unwrap();
}

#[tokio::test]
async fn one_shot_runtime_exits_once_idle() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let model = PipelineBuilder::new()
        .step_with(
            StepBuilder::new(
                "A",
                r#"test "$PIPEDAG_ARG_N" = 7 && test "$PIPEDAG_STEP" = A && touch "$PIPEDAG_OUTPUT_DONE""#,
            )
            .arg("n", ParamValue::reference("p")),
        )
        .param("p", ParamValue::Integer(7))
        .binds("p", "A", "n")
        .data_at("done", dir.path().join("done.flag"))
        .produces("A", "done")
        .model();
    let (handle, runtime) = start(
        model,
        dir.path(),
        CoordinatorOptions {
            exit_when_idle: true,
        },
    );

    assert!(handle.request_run(ids(&["A"]), RunMode::Single).await.unwrap().admitted);

    let core = with_timeout(runtime).await.unwrap().unwrap();
    assert_eq!(core.state_of("A"), Some(ExecutionState::Completed));
    assert_eq!(core.freshness_of("A"), Some(Freshness::Fresh));
    assert!(dir.path().join("done.flag").exists());
}
