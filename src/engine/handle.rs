// src/engine/handle.rs

//! Cloneable request surface over the coordinator's event channel.

use tokio::sync::{mpsc, oneshot};

use crate::engine::{Admission, CoordinatorEvent, CoordinatorSnapshot};
use crate::errors::{PipedagError, Result};
use crate::model::GraphModel;
use crate::types::{RunMode, StepId};

#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<CoordinatorEvent>,
}

impl CoordinatorHandle {
    pub fn new(tx: mpsc::Sender<CoordinatorEvent>) -> Self {
        Self { tx }
    }

    /// Request a run; resolves once the coordinator decided admission.
    pub async fn request_run(&self, steps: Vec<StepId>, mode: RunMode) -> Result<Admission> {
        let (reply, rx) = oneshot::channel();
        self.send(CoordinatorEvent::RunRequested {
            steps,
            mode,
            reply: Some(reply),
        })
        .await?;
        recv(rx).await?
    }

    /// Plan and start every stale/missing step. Returns the plan size.
    pub async fn run_stale(&self) -> Result<usize> {
        let (reply, rx) = oneshot::channel();
        self.send(CoordinatorEvent::RunStaleRequested { reply: Some(reply) })
            .await?;
        recv(rx).await?
    }

    pub async fn cancel(&self, step: impl Into<StepId>) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(CoordinatorEvent::CancelRequested {
            step: step.into(),
            reply: Some(reply),
        })
        .await?;
        recv(rx).await?
    }

    pub async fn replace_graph(&self, model: GraphModel) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(CoordinatorEvent::GraphReplaced {
            model,
            reply: Some(reply),
        })
        .await?;
        recv(rx).await?
    }

    pub async fn snapshot(&self) -> Result<CoordinatorSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(CoordinatorEvent::SnapshotRequested { reply }).await?;
        recv(rx).await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(CoordinatorEvent::ShutdownRequested).await
    }

    async fn send(&self, event: CoordinatorEvent) -> Result<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| PipedagError::ChannelClosed("coordinator is not running".into()))
    }
}

async fn recv<T>(rx: oneshot::Receiver<T>) -> Result<T> {
    rx.await
        .map_err(|_| PipedagError::ChannelClosed("coordinator dropped the request".into()))
}
