// src/engine/runtime.rs

use std::fmt;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::errors::Result;
use crate::exec::TaskExecutor;

use super::core::ExecutionCoordinator;
use super::{CoordinatorCommand, CoordinatorEvent, StepJob};

/// Feeds [`CoordinatorEvent`]s into the coordinator and delegates its
/// commands to a [`TaskExecutor`].
///
/// All admission and state semantics live in [`ExecutionCoordinator`]; this
/// struct only does the async IO around it. Because every event goes
/// through one loop, admission decisions are serialized.
pub struct Runtime<E: TaskExecutor> {
    core: ExecutionCoordinator,
    event_rx: mpsc::Receiver<CoordinatorEvent>,
    executor: E,
}

impl<E: TaskExecutor> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl<E: TaskExecutor> Runtime<E> {
    pub fn new(
        core: ExecutionCoordinator,
        event_rx: mpsc::Receiver<CoordinatorEvent>,
        executor: E,
    ) -> Self {
        Self {
            core,
            event_rx,
            executor,
        }
    }

    /// Main event loop. Returns the coordinator so callers can inspect the
    /// final state.
    pub async fn run(mut self) -> Result<ExecutionCoordinator> {
        info!("pipedag coordinator started");

        loop {
            let Some(event) = self.event_rx.recv().await else {
                info!("coordinator event channel closed; exiting");
                break;
            };

            debug!(?event, "coordinator received event");
            let step = self.core.step(event);

            for command in step.commands {
                self.execute_command(command).await?;
            }

            if !step.keep_running {
                info!("coordinator requested exit; stopping runtime");
                break;
            }
        }

        info!("runtime exiting");
        Ok(self.core)
    }

    async fn execute_command(&mut self, command: CoordinatorCommand) -> Result<()> {
        match command {
            CoordinatorCommand::Dispatch(jobs) => self.dispatch(jobs).await?,
            CoordinatorCommand::Cancel(step) => {
                debug!(step = %step, "forwarding cancel to executor");
                self.executor.cancel(step).await?;
            }
            CoordinatorCommand::RequestExit => {
                debug!("coordinator issued RequestExit command");
            }
        }
        Ok(())
    }

    async fn dispatch(&mut self, jobs: Vec<StepJob>) -> Result<()> {
        if jobs.is_empty() {
            return Ok(());
        }

        let steps: Vec<_> = jobs.iter().map(|j| j.step.as_str()).collect();
        debug!(?steps, run_id = jobs[0].run_id, "dispatching jobs");

        self.executor.spawn_jobs(jobs).await
    }
}
