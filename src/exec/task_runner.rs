// src/exec/task_runner.rs

//! Runner for a single step job.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::engine::{CoordinatorEvent, StepJob};
use crate::types::{StepId, TerminalStatus};

/// Same-batch ordering signals for one job.
#[derive(Debug)]
pub struct JobGate {
    /// Completion signals of the upstream jobs listed in `after`.
    pub waits: Vec<(StepId, watch::Receiver<Option<TerminalStatus>>)>,
    /// Published once this job reaches a terminal status.
    pub done: watch::Sender<Option<TerminalStatus>>,
}

/// Run one job and report exactly one `StepFinished` for it.
///
/// A job whose same-batch upstream did not succeed never starts and is
/// reported as cancelled. Spawn or wait errors are reported as failures.
pub async fn run_job(
    job: StepJob,
    gate: JobGate,
    workdir: PathBuf,
    runtime_tx: mpsc::Sender<CoordinatorEvent>,
    mut cancel_rx: watch::Receiver<bool>,
) {
    let status = match run_job_inner(&job, gate.waits, &workdir, &mut cancel_rx).await {
        Ok(status) => status,
        Err(err) => {
            error!(step = %job.step, run_id = job.run_id, error = %err, "step execution error");
            TerminalStatus::Failure
        }
    };

    gate.done.send_replace(Some(status));
    if runtime_tx
        .send(CoordinatorEvent::StepFinished {
            step: job.step.clone(),
            status,
        })
        .await
        .is_err()
    {
        debug!(step = %job.step, "coordinator gone; dropping completion");
    }
}

async fn run_job_inner(
    job: &StepJob,
    waits: Vec<(StepId, watch::Receiver<Option<TerminalStatus>>)>,
    workdir: &Path,
    cancel_rx: &mut watch::Receiver<bool>,
) -> Result<TerminalStatus> {
    for (upstream, mut rx) in waits {
        debug!(step = %job.step, upstream = %upstream, "waiting for same-batch upstream");
        let outcome = tokio::select! {
            res = async { rx.wait_for(|s| s.is_some()).await.ok().and_then(|s| *s) } => res,
            true = cancelled(cancel_rx) => {
                info!(step = %job.step, run_id = job.run_id, "cancelled before start");
                return Ok(TerminalStatus::Cancelled);
            }
        };
        if outcome != Some(TerminalStatus::Success) {
            warn!(
                step = %job.step,
                upstream = %upstream,
                ?outcome,
                "same-batch upstream did not succeed; not starting"
            );
            return Ok(TerminalStatus::Cancelled);
        }
    }

    info!(step = %job.step, run_id = job.run_id, task = %job.task, "starting step process");

    let mut cmd = shell_command(&job.task);
    cmd.current_dir(workdir)
        .envs(job_env(job))
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning process for step '{}'", job.step))?;

    if let Some(stdout) = child.stdout.take() {
        let step = job.step.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                info!(step = %step, "stdout: {}", line);
            }
        });
    }
    if let Some(stderr) = child.stderr.take() {
        let step = job.step.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                warn!(step = %step, "stderr: {}", line);
            }
        });
    }

    tokio::select! {
        status = child.wait() => {
            let status = status
                .with_context(|| format!("waiting for process of step '{}'", job.step))?;
            let code = status.code().unwrap_or(-1);
            info!(
                step = %job.step,
                run_id = job.run_id,
                exit_code = code,
                success = status.success(),
                "step process exited"
            );
            Ok(if status.success() {
                TerminalStatus::Success
            } else {
                TerminalStatus::Failure
            })
        }

        true = cancelled(cancel_rx) => {
            info!(step = %job.step, run_id = job.run_id, "cancellation requested; killing process");
            if let Err(e) = child.kill().await {
                warn!(step = %job.step, error = %e, "failed to kill step process");
            }
            Ok(TerminalStatus::Cancelled)
        }
    }
}

/// Resolves to `true` once cancellation is requested, or `false` if the
/// sender is gone. The watch guard is released before this returns, so the
/// caller may await while handling the result.
async fn cancelled(cancel_rx: &mut watch::Receiver<bool>) -> bool {
    cancel_rx.wait_for(|c| *c).await.is_ok()
}

fn shell_command(task: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(task);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(task);
        c
    }
}

/// Environment handed to the step process: its id, run id, and one variable
/// per input, output and argument.
pub fn job_env(job: &StepJob) -> Vec<(String, String)> {
    let mut env = vec![
        ("PIPEDAG_STEP".to_string(), job.step.clone()),
        ("PIPEDAG_RUN_ID".to_string(), job.run_id.to_string()),
    ];
    for (name, path) in &job.inputs {
        env.push((env_name("PIPEDAG_INPUT_", name), path.display().to_string()));
    }
    for (name, path) in &job.outputs {
        env.push((env_name("PIPEDAG_OUTPUT_", name), path.display().to_string()));
    }
    for (name, value) in &job.args {
        env.push((env_name("PIPEDAG_ARG_", name), value.to_string()));
    }
    env
}

fn env_name(prefix: &str, name: &str) -> String {
    let suffix: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{prefix}{suffix}")
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::model::ParamValue;

    #[test]
    fn env_names_are_sanitized() {
        let job = StepJob {
            step: "train".into(),
            task: "true".into(),
            inputs: BTreeMap::from([("raw-data".to_string(), PathBuf::from("data/raw.csv"))]),
            outputs: BTreeMap::from([("model".to_string(), PathBuf::from("out/model.bin"))]),
            args: BTreeMap::from([("epochs".to_string(), ParamValue::Integer(3))]),
            run_id: 7,
            after: Vec::new(),
        };
        let env: BTreeMap<_, _> = job_env(&job).into_iter().collect();
        assert_eq!(env["PIPEDAG_STEP"], "train");
        assert_eq!(env["PIPEDAG_RUN_ID"], "7");
        assert_eq!(env["PIPEDAG_INPUT_RAW_DATA"], "data/raw.csv");
        assert_eq!(env["PIPEDAG_OUTPUT_MODEL"], "out/model.bin");
        assert_eq!(env["PIPEDAG_ARG_EPOCHS"], "3");
    }
}
