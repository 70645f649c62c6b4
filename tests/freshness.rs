// tests/freshness.rs

use std::fs::OpenOptions;
use std::path::Path;
use std::time::{Duration, SystemTime};

use pipedag::freshness::evaluate_freshness;
use pipedag::fs::RealFileSystem;
use pipedag::fs::mock::MockFileSystem;
use pipedag::types::Freshness;
use pipedag_test_utils::builders::PipelineBuilder;
use pipedag_test_utils::init_tracing;

fn touch(path: &Path, secs: u64) {
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)
        .unwrap();
    file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
        .unwrap();
}

/// raw -> A -x-> B -y-> C -> z, artifacts stored under `dir`.
fn pipeline(dir: &Path) -> PipelineBuilder {
    PipelineBuilder::new()
        .step("A")
        .step("B")
        .step("C")
        .data_at("raw", dir.join("raw.csv"))
        .data_at("x", dir.join("x.csv"))
        .data_at("y", dir.join("y.csv"))
        .data_at("z", dir.join("z.csv"))
        .consumes("raw", "A")
        .produces("A", "x")
        .consumes("x", "B")
        .produces("B", "y")
        .consumes("y", "C")
        .produces("C", "z")
}

#[test]
fn nothing_on_disk_means_missing_everywhere() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let g = pipeline(dir.path()).graph();

    let map = evaluate_freshness(&g, &RealFileSystem).unwrap();
    for step in ["A", "B", "C"] {
        assert_eq!(map[step], Freshness::Missing, "step {step}");
    }
}

#[test]
fn outputs_newer_than_inputs_are_fresh() {
    let dir = tempfile::tempdir().unwrap();
    touch(&dir.path().join("raw.csv"), 100);
    touch(&dir.path().join("x.csv"), 200);
    touch(&dir.path().join("y.csv"), 300);
    touch(&dir.path().join("z.csv"), 400);
    let g = pipeline(dir.path()).graph();

    let map = evaluate_freshness(&g, &RealFileSystem).unwrap();
    for step in ["A", "B", "C"] {
        assert_eq!(map[step], Freshness::Fresh, "step {step}");
    }
}

#[test]
fn staleness_propagates_to_direct_downstream() {
    let dir = tempfile::tempdir().unwrap();
    touch(&dir.path().join("raw.csv"), 100);
    touch(&dir.path().join("x.csv"), 500);
    touch(&dir.path().join("y.csv"), 300);
    // C's own output is newer than its input, yet B is stale.
    touch(&dir.path().join("z.csv"), 900);
    let g = pipeline(dir.path()).graph();

    let map = evaluate_freshness(&g, &RealFileSystem).unwrap();
    assert_eq!(map["A"], Freshness::Fresh);
    assert_eq!(map["B"], Freshness::Stale);
    assert_eq!(map["C"], Freshness::Stale);
}

#[test]
fn missing_source_input_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    touch(&dir.path().join("x.csv"), 200);
    let g = pipeline(dir.path()).graph();

    let map = evaluate_freshness(&g, &RealFileSystem).unwrap();
    assert_eq!(map["A"], Freshness::Fresh);
    assert_eq!(map["B"], Freshness::Missing);
}

#[test]
fn step_without_outputs_is_no_outputs() {
    let g = PipelineBuilder::new()
        .step("report")
        .data("x")
        .consumes("x", "report")
        .graph();
    let map = evaluate_freshness(&g, &MockFileSystem::new()).unwrap();
    assert_eq!(map["report"], Freshness::NoOutputs);
}

#[test]
fn probe_failures_are_fail_safe() {
    let fs = MockFileSystem::new();
    fs.set_file("x", 10);
    fs.set_file("y", 20);
    let g = PipelineBuilder::new()
        .step("A")
        .step("B")
        .data("in")
        .data("x")
        .data("y")
        .consumes("in", "A")
        .produces("A", "x")
        .consumes("x", "B")
        .produces("B", "y")
        .graph();

    fs.fail_on("in");
    let map = evaluate_freshness(&g, &fs).unwrap();
    assert_eq!(map["A"], Freshness::Stale);

    let fs = MockFileSystem::new();
    fs.set_file("x", 10);
    fs.fail_on("y");
    let map = evaluate_freshness(&g, &fs).unwrap();
    assert_eq!(map["A"], Freshness::Fresh);
    assert_eq!(map["B"], Freshness::Missing);
}
