// src/exec/backend.rs

//! Pluggable executor abstraction.
//!
//! The runtime talks to a [`TaskExecutor`] instead of a raw channel, so tests
//! can swap in an executor that records jobs and emits completions directly.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use tokio::sync::mpsc;

use crate::engine::{CoordinatorEvent, StepJob};
use crate::errors::{PipedagError, Result};
use crate::types::StepId;

use super::executor_loop::{ExecutorMessage, spawn_executor};

/// How admitted jobs get executed.
///
/// An implementation must eventually report exactly one
/// `CoordinatorEvent::StepFinished` per dispatched job, including for jobs
/// that were cancelled.
pub trait TaskExecutor: Send {
    /// Start the given jobs. Jobs carry same-batch ordering in `after`.
    fn spawn_jobs(
        &mut self,
        jobs: Vec<StepJob>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Stop the live unit of work for `step`, if any.
    fn cancel(&mut self, step: StepId) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Production executor: forwards jobs to the background loop started by
/// [`spawn_executor`].
pub struct ProcessExecutor {
    tx: mpsc::Sender<ExecutorMessage>,
}

impl ProcessExecutor {
    /// Spawn the executor loop. Relative artifact paths and commands are
    /// resolved against `workdir`.
    pub fn new(runtime_tx: mpsc::Sender<CoordinatorEvent>, workdir: impl Into<PathBuf>) -> Self {
        let tx = spawn_executor(runtime_tx, workdir.into());
        Self { tx }
    }

    fn forward(&self, message: ExecutorMessage) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.tx.clone();
        Box::pin(async move {
            tx.send(message)
                .await
                .map_err(|_| PipedagError::ChannelClosed("executor loop is gone".into()))
        })
    }
}

impl TaskExecutor for ProcessExecutor {
    fn spawn_jobs(
        &mut self,
        jobs: Vec<StepJob>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        self.forward(ExecutorMessage::Run(jobs))
    }

    fn cancel(&mut self, step: StepId) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        self.forward(ExecutorMessage::Cancel(step))
    }
}
