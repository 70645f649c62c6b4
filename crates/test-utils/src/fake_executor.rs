use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use pipedag::engine::{CoordinatorEvent, StepJob};
use pipedag::errors::{PipedagError, Result};
use pipedag::exec::TaskExecutor;
use pipedag::types::{StepId, TerminalStatus};

/// What the fake executor was asked to do.
#[derive(Debug, Default, Clone)]
pub struct ExecutionLog {
    pub dispatched: Vec<StepJob>,
    pub cancelled: Vec<StepId>,
}

impl ExecutionLog {
    pub fn dispatched_steps(&self) -> Vec<StepId> {
        self.dispatched.iter().map(|j| j.step.clone()).collect()
    }
}

/// A fake executor that:
/// - records every dispatched job and cancel request
/// - immediately reports a terminal status for each job (Success unless
///   overridden with [`with_outcome`](Self::with_outcome))
/// - keeps [`hold`](Self::hold)-ed steps "running" until they are cancelled
///   or a test reports their completion itself.
pub struct FakeExecutor {
    runtime_tx: mpsc::Sender<CoordinatorEvent>,
    log: Arc<Mutex<ExecutionLog>>,
    outcomes: HashMap<StepId, TerminalStatus>,
    held: HashSet<StepId>,
    live: HashSet<StepId>,
}

impl FakeExecutor {
    pub fn new(runtime_tx: mpsc::Sender<CoordinatorEvent>) -> Self {
        Self {
            runtime_tx,
            log: Arc::new(Mutex::new(ExecutionLog::default())),
            outcomes: HashMap::new(),
            held: HashSet::new(),
            live: HashSet::new(),
        }
    }

    pub fn log(&self) -> Arc<Mutex<ExecutionLog>> {
        Arc::clone(&self.log)
    }

    pub fn with_outcome(mut self, step: &str, status: TerminalStatus) -> Self {
        self.outcomes.insert(step.to_string(), status);
        self
    }

    pub fn hold(mut self, step: &str) -> Self {
        self.held.insert(step.to_string());
        self
    }
}

impl TaskExecutor for FakeExecutor {
    fn spawn_jobs(
        &mut self,
        jobs: Vec<StepJob>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            for job in jobs {
                self.log.lock().unwrap().dispatched.push(job.clone());

                if self.held.contains(&job.step) {
                    self.live.insert(job.step.clone());
                    continue;
                }

                let status = self
                    .outcomes
                    .get(&job.step)
                    .copied()
                    .unwrap_or(TerminalStatus::Success);
                send(&self.runtime_tx, job.step, status).await?;
            }
            Ok(())
        })
    }

    fn cancel(&mut self, step: StepId) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.log.lock().unwrap().cancelled.push(step.clone());
            if self.live.remove(&step) {
                send(&self.runtime_tx, step, TerminalStatus::Cancelled).await?;
            }
            Ok(())
        })
    }
}

async fn send(
    tx: &mpsc::Sender<CoordinatorEvent>,
    step: StepId,
    status: TerminalStatus,
) -> Result<()> {
    tx.send(CoordinatorEvent::StepFinished { step, status })
        .await
        .map_err(|_| PipedagError::ChannelClosed("runtime is gone".into()))
}
