use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use pipedag::engine::{
    CoordinatorEvent, CoordinatorHandle, CoordinatorOptions, CoordinatorSnapshot,
    ExecutionCoordinator, Runtime,
};
use pipedag::errors::Result;
use pipedag::freshness::FreshnessEvaluator;
use pipedag::fs::mock::MockFileSystem;
use pipedag::model::GraphModel;
use pipedag::types::{StepId, TerminalStatus};

use crate::fake_executor::{ExecutionLog, FakeExecutor};

/// A coordinator runtime driven by a [`FakeExecutor`] over an in-memory
/// filesystem.
pub struct TestRig {
    pub handle: CoordinatorHandle,
    pub fs: MockFileSystem,
    pub log: Arc<Mutex<ExecutionLog>>,
    tx: mpsc::Sender<CoordinatorEvent>,
    runtime: JoinHandle<Result<ExecutionCoordinator>>,
}

impl TestRig {
    /// Start a long-running coordinator; `configure` customises the fake
    /// executor (held steps, failing steps).
    pub fn start(
        model: GraphModel,
        fs: MockFileSystem,
        configure: impl FnOnce(FakeExecutor) -> FakeExecutor,
    ) -> Self {
        let evaluator = FreshnessEvaluator::new(Arc::new(fs.clone()));
        let core = ExecutionCoordinator::new(model, evaluator, CoordinatorOptions::default())
            .expect("test pipeline must be acyclic");

        let (tx, rx) = mpsc::channel(64);
        let executor = configure(FakeExecutor::new(tx.clone()));
        let log = executor.log();
        let runtime = tokio::spawn(Runtime::new(core, rx, executor).run());

        Self {
            handle: CoordinatorHandle::new(tx.clone()),
            fs,
            log,
            tx,
            runtime,
        }
    }

    /// Report a terminal status for a held step, as a real executor would.
    pub async fn report(&self, step: &str, status: TerminalStatus) {
        self.tx
            .send(CoordinatorEvent::StepFinished {
                step: step.to_string(),
                status,
            })
            .await
            .expect("runtime stopped");
    }

    /// Poll snapshots until `condition` holds (5s limit) and return the
    /// matching one. Executor reports arrive asynchronously, after the
    /// admission reply.
    pub async fn wait_for(
        &self,
        mut condition: impl FnMut(&CoordinatorSnapshot) -> bool,
    ) -> CoordinatorSnapshot {
        crate::with_timeout(async {
            loop {
                let snapshot = self.handle.snapshot().await.expect("runtime stopped");
                if condition(&snapshot) {
                    return snapshot;
                }
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await
    }

    pub fn dispatched(&self) -> Vec<StepId> {
        self.log.lock().unwrap().dispatched_steps()
    }

    pub fn cancelled(&self) -> Vec<StepId> {
        self.log.lock().unwrap().cancelled.clone()
    }

    /// Shut the runtime down and hand back the final coordinator.
    pub async fn stop(self) -> ExecutionCoordinator {
        self.handle.shutdown().await.expect("runtime stopped early");
        self.runtime
            .await
            .expect("runtime task panicked")
            .expect("runtime returned an error")
    }
}
