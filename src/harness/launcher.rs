//! How the harness brings a pipeline up and down.
//!
//! `Launcher::InProcess` runs the pipeline on the current tokio runtime.
//! `Launcher::Process` spawns the `zmqpipe run` binary, waits for it to print
//! the readiness marker on stdout and stops it by closing its stdin.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::harness::{BINARY_NAME, PERSIST_DIR, READY_MARKER, StartOptions};
use crate::pipeline::{Document, PersistStore, Pipeline};
use crate::transport::context::Context;
use crate::utils::error::PipelineError;

const CONFIG_FILE: &str = "pipeline.conf";

#[derive(Debug, Clone)]
pub enum Launcher {
    InProcess {
        context: Context,
    },
    Process {
        program: PathBuf,
        ready_timeout: Duration,
        stop_timeout: Duration,
    },
}

impl Launcher {
    pub fn in_process(context: Context) -> Self {
        Launcher::InProcess { context }
    }

    /// Child-process launcher for the binary found in `harness.bin_dir`.
    pub fn process(settings: &Settings) -> Result<Self, PipelineError> {
        let bin_dir = settings.harness.bin_dir.as_deref().ok_or_else(|| {
            PipelineError::Launch(
                "harness.bin_dir is not set (export ZMQPIPE_HARNESS__BIN_DIR)".to_string(),
            )
        })?;
        Ok(Self::process_at(
            Path::new(bin_dir).join(BINARY_NAME),
            Duration::from_millis(settings.harness.ready_timeout_ms),
            Duration::from_millis(settings.harness.stop_timeout_ms),
        ))
    }

    pub fn process_at(program: PathBuf, ready_timeout: Duration, stop_timeout: Duration) -> Self {
        Launcher::Process {
            program,
            ready_timeout,
            stop_timeout,
        }
    }

    pub async fn launch(
        &self,
        config: &str,
        work_dir: &Path,
        options: StartOptions,
    ) -> Result<RunningPipeline, PipelineError> {
        // Both launchers reject a bad document before touching anything.
        let document = Document::parse(config)?;
        tokio::fs::create_dir_all(work_dir).await?;
        let persist_dir = work_dir.join(PERSIST_DIR);

        match self {
            Launcher::InProcess { context } => {
                let persist = PersistStore::open(&persist_dir, options.keep_persist)?;
                let pipeline = Pipeline::start(context, &document, persist).await?;
                Ok(RunningPipeline::InProcess(pipeline))
            }
            Launcher::Process {
                program,
                ready_timeout,
                stop_timeout,
            } => {
                let config_path = work_dir.join(CONFIG_FILE);
                tokio::fs::write(&config_path, config).await?;
                let child = spawn_child(
                    program,
                    &config_path,
                    &persist_dir,
                    options,
                    (*ready_timeout, *stop_timeout),
                )
                .await?;
                Ok(RunningPipeline::Process(child))
            }
        }
    }
}

pub enum RunningPipeline {
    InProcess(Pipeline),
    Process(ChildPipeline),
}

impl RunningPipeline {
    pub async fn stop(self) -> Result<(), PipelineError> {
        match self {
            RunningPipeline::InProcess(pipeline) => {
                pipeline.stop().await?;
                Ok(())
            }
            RunningPipeline::Process(child) => child.stop().await,
        }
    }
}

pub struct ChildPipeline {
    child: Child,
    stdin: Option<ChildStdin>,
    output: JoinHandle<()>,
    stop_timeout: Duration,
}

impl ChildPipeline {
    async fn stop(mut self) -> Result<(), PipelineError> {
        // EOF on stdin is the stop request.
        drop(self.stdin.take());

        let status = match tokio::time::timeout(self.stop_timeout, self.child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                warn!(pid = ?self.child.id(), "pipeline did not stop in time, killing it");
                self.child.kill().await?;
                self.output.abort();
                return Err(PipelineError::Task(format!(
                    "pipeline did not exit within {:?}",
                    self.stop_timeout
                )));
            }
        };
        let _ = self.output.await;

        if status.success() {
            info!("pipeline process exited");
            Ok(())
        } else {
            Err(PipelineError::Task(format!("pipeline process exited with {status}")))
        }
    }
}

async fn spawn_child(
    program: &Path,
    config_path: &Path,
    persist_dir: &Path,
    options: StartOptions,
    (ready_timeout, stop_timeout): (Duration, Duration),
) -> Result<ChildPipeline, PipelineError> {
    let mut command = Command::new(program);
    command
        .arg("run")
        .arg("--config")
        .arg(config_path)
        .arg("--persist-dir")
        .arg(persist_dir)
        .arg("--stdin-control")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);
    if options.keep_persist {
        command.arg("--keep-persist");
    }
    if options.verbose {
        command.arg("--verbose");
    }

    let mut child = command
        .spawn()
        .map_err(|e| PipelineError::Launch(format!("cannot spawn {}: {e}", program.display())))?;
    debug!(program = %program.display(), pid = ?child.id(), "pipeline process spawned");

    let stdin = child.stdin.take();
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| PipelineError::Launch("child stdout was not captured".to_string()))?;
    let mut lines = BufReader::new(stdout).lines();

    match tokio::time::timeout(ready_timeout, wait_for_marker(&mut lines)).await {
        Ok(Ok(true)) => {}
        Ok(Ok(false)) => {
            let status = child.wait().await?;
            return Err(PipelineError::Launch(format!(
                "pipeline exited with {status} before becoming ready"
            )));
        }
        Ok(Err(e)) => {
            child.kill().await?;
            return Err(e.into());
        }
        Err(_) => {
            child.kill().await?;
            return Err(PipelineError::ReadyTimeout(ready_timeout));
        }
    }
    info!(pid = ?child.id(), "pipeline process ready");

    // Keep the pipe drained so the child never blocks on a full stdout.
    let output = tokio::spawn(async move {
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(line = %line, "pipeline stdout");
        }
    });

    Ok(ChildPipeline {
        child,
        stdin,
        output,
        stop_timeout,
    })
}

/// Reads until the marker line. `false` means stdout closed first.
async fn wait_for_marker(
    lines: &mut tokio::io::Lines<BufReader<ChildStdout>>,
) -> std::io::Result<bool> {
    while let Some(line) = lines.next_line().await? {
        if line.trim() == READY_MARKER {
            return Ok(true);
        }
        debug!(line = %line, "pipeline stdout before readiness");
    }
    Ok(false)
}
