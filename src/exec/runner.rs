// src/exec/runner.rs

//! Runs dispatched executions as local shell commands.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::errors::Result;
use crate::liveaction::LiveActionService;
use crate::model::{ExecutionRequest, LiveAction};
use crate::types::ExecutionStatus;

/// Context path where the runner records the process exit code.
pub const EXIT_CODE_PATH: &str = "runner.exit_code";

/// Consumes requests from the transport's node channels, runs
/// `parameters.cmd` through the shell and reports the terminal liveaction on
/// `completions`.
///
/// `parameters.timeout` (seconds) bounds the run; the process is killed and
/// the execution ends `timed_out` when it is exceeded.
#[derive(Debug, Clone)]
pub struct LocalRunner {
    liveactions: LiveActionService,
    completions: mpsc::Sender<LiveAction>,
}

impl LocalRunner {
    pub fn new(liveactions: LiveActionService, completions: mpsc::Sender<LiveAction>) -> Self {
        Self {
            liveactions,
            completions,
        }
    }

    /// Start one consumer loop per node channel.
    pub fn spawn(self, nodes: Vec<mpsc::Receiver<ExecutionRequest>>) -> Vec<JoinHandle<()>> {
        let runner = Arc::new(self);
        nodes
            .into_iter()
            .enumerate()
            .map(|(node, rx)| tokio::spawn(runner.clone().consume(node, rx)))
            .collect()
    }

    async fn consume(self: Arc<Self>, node: usize, mut rx: mpsc::Receiver<ExecutionRequest>) {
        info!(node, "runner started");
        while let Some(request) = rx.recv().await {
            let runner = self.clone();
            tokio::spawn(async move { runner.run(request).await });
        }
        info!(node, "runner finished (channel closed)");
    }

    /// Run one request to completion and report it.
    pub async fn run(&self, request: ExecutionRequest) {
        let execution_id = request.id.clone();
        let snapshot = request.payload.clone();
        let finished = match self.run_inner(request).await {
            Ok(liveaction) => liveaction,
            Err(err) => {
                error!(%execution_id, error = %err, "execution error");
                // Still reported so the completion accounting stays balanced.
                snapshot
            }
        };
        if self.completions.send(finished).await.is_err() {
            debug!(%execution_id, "completion channel closed");
        }
    }

    async fn run_inner(&self, request: ExecutionRequest) -> Result<LiveAction> {
        let mut liveaction = self
            .liveactions
            .get(request.liveaction_id())?
            .unwrap_or(request.payload);

        self.liveactions
            .update_status(&mut liveaction, ExecutionStatus::Running)?;

        let status = match execute(&liveaction).await {
            Ok((status, code)) => {
                if let Some(code) = code {
                    liveaction.set_context_value(EXIT_CODE_PATH, Value::from(code));
                }
                status
            }
            Err(err) => {
                warn!(liveaction_id = %liveaction.id, error = %format!("{err:#}"), "failed to run command");
                ExecutionStatus::Failed
            }
        };

        self.liveactions.update_status(&mut liveaction, status)?;
        Ok(liveaction)
    }
}

fn command_of(liveaction: &LiveAction) -> Option<&str> {
    liveaction.parameters.get("cmd").and_then(Value::as_str)
}

fn timeout_of(liveaction: &LiveAction) -> Option<Duration> {
    liveaction
        .parameters
        .get("timeout")
        .and_then(Value::as_f64)
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
}

/// Terminal status plus exit code, when the process exited on its own.
async fn execute(liveaction: &LiveAction) -> anyhow::Result<(ExecutionStatus, Option<i32>)> {
    let cmd_line = command_of(liveaction)
        .with_context(|| format!("liveaction {} has no string parameter 'cmd'", liveaction.id))?;

    info!(
        liveaction_id = %liveaction.id,
        action = %liveaction.action,
        cmd = %cmd_line,
        "starting process"
    );

    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(cmd_line);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(cmd_line);
        c
    };
    cmd.stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning process for liveaction {}", liveaction.id))?;

    // Drain both pipes so the child never blocks on a full buffer.
    if let Some(stdout) = child.stdout.take() {
        forward_lines(liveaction.id.clone(), "stdout", stdout);
    }
    if let Some(stderr) = child.stderr.take() {
        forward_lines(liveaction.id.clone(), "stderr", stderr);
    }

    let waited = match timeout_of(liveaction) {
        Some(limit) => tokio::time::timeout(limit, child.wait()).await.ok(),
        None => Some(child.wait().await),
    };

    let Some(exit) = waited else {
        warn!(liveaction_id = %liveaction.id, "process timed out; killing it");
        if let Err(e) = child.kill().await {
            warn!(liveaction_id = %liveaction.id, error = %e, "failed to kill timed out process");
        }
        return Ok((ExecutionStatus::TimedOut, None));
    };

    let exit = exit.with_context(|| format!("waiting for process of liveaction {}", liveaction.id))?;
    let code = exit.code();
    let status = if exit.success() {
        ExecutionStatus::Succeeded
    } else {
        ExecutionStatus::Failed
    };

    info!(
        liveaction_id = %liveaction.id,
        exit_code = code.unwrap_or(-1),
        %status,
        "process exited"
    );
    Ok((status, code))
}

fn forward_lines<R>(liveaction_id: String, stream: &'static str, reader: R)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(%liveaction_id, stream, "{}", line);
        }
    });
}
