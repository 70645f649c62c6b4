// src/exec/executor_loop.rs

//! Background loop that manages live step processes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::engine::{CoordinatorEvent, StepJob};
use crate::exec::task_runner::{JobGate, run_job};
use crate::types::{StepId, TerminalStatus};

/// Messages accepted by the executor loop.
#[derive(Debug)]
pub enum ExecutorMessage {
    /// Jobs admitted together by one request.
    Run(Vec<StepJob>),
    Cancel(StepId),
}

/// Handle for a live job.
///
/// A job counts as live until its runner publishes a terminal status on
/// `done`, which happens before the coordinator hears about it.
struct ActiveJob {
    cancel: watch::Sender<bool>,
    done: watch::Receiver<Option<TerminalStatus>>,
}

impl ActiveJob {
    fn is_live(&self) -> bool {
        self.done.borrow().is_none()
    }
}

/// Spawn the executor loop and return its message sender.
///
/// There is never more than one live process per step; the coordinator
/// already guarantees this, and a duplicate request is refused here too.
pub fn spawn_executor(
    runtime_tx: mpsc::Sender<CoordinatorEvent>,
    workdir: PathBuf,
) -> mpsc::Sender<ExecutorMessage> {
    let (tx, mut rx) = mpsc::channel::<ExecutorMessage>(32);

    tokio::spawn(async move {
        info!(workdir = %workdir.display(), "executor loop started");
        let mut active: HashMap<StepId, ActiveJob> = HashMap::new();

        while let Some(message) = rx.recv().await {
            active.retain(|_, job| job.is_live());
            match message {
                ExecutorMessage::Run(jobs) => {
                    start_batch(jobs, &mut active, &runtime_tx, &workdir);
                }
                ExecutorMessage::Cancel(step) => cancel_job(&step, &active),
            }
        }

        info!("executor loop finished (channel closed)");
    });

    tx
}

/// Spawn one runner per job, wiring each job's `after` list to the
/// completion signals of its same-batch upstream jobs.
fn start_batch(
    jobs: Vec<StepJob>,
    active: &mut HashMap<StepId, ActiveJob>,
    runtime_tx: &mpsc::Sender<CoordinatorEvent>,
    workdir: &Path,
) {
    let mut signals: HashMap<StepId, watch::Receiver<Option<TerminalStatus>>> = HashMap::new();
    let mut dones = Vec::with_capacity(jobs.len());
    for job in &jobs {
        let (done_tx, done_rx) = watch::channel(None);
        signals.insert(job.step.clone(), done_rx);
        dones.push(done_tx);
    }

    for (job, done) in jobs.into_iter().zip(dones) {
        if active.get(&job.step).is_some_and(ActiveJob::is_live) {
            warn!(step = %job.step, run_id = job.run_id, "step already has a live process; refusing duplicate");
            refuse(job.step, done, runtime_tx);
            continue;
        }

        let waits = job
            .after
            .iter()
            .filter_map(|up| signals.get(up).map(|rx| (up.clone(), rx.clone())))
            .collect();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let done_rx = done.subscribe();
        let gate = JobGate { waits, done };
        let step = job.step.clone();
        let rt_tx = runtime_tx.clone();
        let workdir = workdir.to_path_buf();

        tokio::spawn(async move {
            let step = job.step.clone();
            run_job(job, gate, workdir, rt_tx, cancel_rx).await;
            debug!(step = %step, "job runner finished");
        });

        active.insert(
            step,
            ActiveJob {
                cancel: cancel_tx,
                done: done_rx,
            },
        );
    }
}

/// Report a refused job as cancelled so the coordinator still hears one
/// terminal status for it, and release any same-batch jobs waiting on it.
fn refuse(
    step: StepId,
    done: watch::Sender<Option<TerminalStatus>>,
    runtime_tx: &mpsc::Sender<CoordinatorEvent>,
) {
    done.send_replace(Some(TerminalStatus::Cancelled));
    let rt_tx = runtime_tx.clone();
    tokio::spawn(async move {
        let event = CoordinatorEvent::StepFinished {
            step,
            status: TerminalStatus::Cancelled,
        };
        if rt_tx.send(event).await.is_err() {
            debug!("coordinator gone; dropping refusal report");
        }
    });
}

fn cancel_job(step: &str, active: &HashMap<StepId, ActiveJob>) {
    match active.get(step) {
        Some(job) => {
            info!(step = %step, "cancelling live job");
            job.cancel.send_replace(true);
        }
        None => debug!(step = %step, "cancel for a step with no live job; ignoring"),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn job(step: &str) -> StepJob {
        StepJob {
            step: step.into(),
            task: "true".into(),
            inputs: Default::default(),
            outputs: Default::default(),
            args: Default::default(),
            run_id: 1,
            after: Vec::new(),
        }
    }

    fn tracked(status: Option<TerminalStatus>) -> (watch::Sender<Option<TerminalStatus>>, ActiveJob) {
        let (done_tx, done_rx) = watch::channel(status);
        let (cancel, _) = watch::channel(false);
        (done_tx, ActiveJob { cancel, done: done_rx })
    }

    #[tokio::test]
    async fn duplicate_of_a_live_job_is_reported_cancelled() {
        let (tx, mut rx) = mpsc::channel(8);
        let (_keep, live) = tracked(None);
        let mut active = HashMap::from([("A".to_string(), live)]);

        start_batch(vec![job("A")], &mut active, &tx, Path::new("."));

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            event,
            CoordinatorEvent::StepFinished { ref step, status: TerminalStatus::Cancelled } if step == "A"
        ));
        assert!(active["A"].is_live());
    }

    #[tokio::test]
    async fn job_that_published_its_status_is_no_longer_live() {
        let (tx, mut rx) = mpsc::channel(8);
        let (_keep, finished) = tracked(Some(TerminalStatus::Success));
        assert!(!finished.is_live());
        let mut active = HashMap::from([("A".to_string(), finished)]);

        // The runner may still be winding down; a re-dispatch must start anyway.
        start_batch(vec![job("A")], &mut active, &tx, Path::new("."));
        assert!(active["A"].is_live());

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            event,
            CoordinatorEvent::StepFinished { ref step, status: TerminalStatus::Success } if step == "A"
        ));
    }
}
