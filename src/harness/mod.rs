//! Test harness around the pipeline.
//!
//! `Harness::start` reports readiness as a plain boolean: false means the
//! configuration was rejected, a resource could not be acquired or the
//! pipeline never signalled readiness. A scenario that fails to start exits
//! with [`SETUP_FAILURE_EXIT_CODE`] and never injects a message.

pub mod launcher;
pub mod scenario;

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{error, info, warn};

use crate::config::Settings;
use crate::transport::context::Context;
use crate::utils::error::PipelineError;

pub use launcher::{Launcher, RunningPipeline};
pub use scenario::{Scenario, ScenarioOutcome, default_config};

/// Exit status of a scenario whose pipeline failed to start.
pub const SETUP_FAILURE_EXIT_CODE: u8 = 42;
/// Line printed on stdout by `zmqpipe run` once the pipeline is running.
pub const READY_MARKER: &str = "READY";
/// Persist store directory inside the work directory.
pub const PERSIST_DIR: &str = "persist";
pub const BINARY_NAME: &str = "zmqpipe";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StartOptions {
    /// Reuse the persist state of the previous run instead of discarding it.
    pub keep_persist: bool,
    pub verbose: bool,
}

/// What the sink held when `wait_for_delivery` returned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub missing: Vec<String>,
    pub unexpected: Vec<String>,
}

impl DeliveryOutcome {
    pub fn delivered(&self) -> bool {
        self.missing.is_empty() && self.unexpected.is_empty()
    }

    fn compare(expected: &[String], observed: &[String]) -> Self {
        let mut pending: HashMap<&str, usize> = HashMap::new();
        for line in expected {
            *pending.entry(line.as_str()).or_default() += 1;
        }

        let mut unexpected = Vec::new();
        for line in observed {
            match pending.get_mut(line.as_str()) {
                Some(count) if *count > 0 => *count -= 1,
                _ => unexpected.push(line.clone()),
            }
        }

        let mut missing = Vec::new();
        for line in expected {
            if let Some(count) = pending.get_mut(line.as_str()) {
                if *count > 0 {
                    *count -= 1;
                    missing.push(line.clone());
                }
            }
        }

        Self {
            missing,
            unexpected,
        }
    }
}

pub struct Harness {
    launcher: Launcher,
    work_dir: PathBuf,
    running: Option<RunningPipeline>,
}

impl Harness {
    pub fn new(launcher: Launcher, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            launcher,
            work_dir: work_dir.into(),
            running: None,
        }
    }

    pub fn in_process(context: Context, work_dir: impl Into<PathBuf>) -> Self {
        Self::new(Launcher::in_process(context), work_dir)
    }

    /// Harness configured from settings. `process` selects the child-process
    /// launcher, which needs `harness.bin_dir`.
    pub fn from_settings(
        settings: &Settings,
        context: Context,
        process: bool,
    ) -> Result<Self, PipelineError> {
        let launcher = if process {
            Launcher::process(settings)?
        } else {
            Launcher::in_process(context)
        };
        Ok(Self::new(launcher, &settings.harness.work_dir))
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Start a pipeline for `config`. Returns whether it is ready.
    pub async fn start(&mut self, config: &str, options: StartOptions) -> bool {
        if self.running.is_some() {
            warn!("pipeline already running, refusing a second start");
            return false;
        }
        match self.launcher.launch(config, &self.work_dir, options).await {
            Ok(running) => {
                info!(work_dir = %self.work_dir.display(), "pipeline ready");
                self.running = Some(running);
                true
            }
            Err(e) => {
                error!(error = %e, "pipeline failed to start");
                false
            }
        }
    }

    /// Stop the running pipeline. Stopping when nothing runs is a no-op.
    pub async fn stop(&mut self) -> Result<(), PipelineError> {
        match self.running.take() {
            Some(running) => running.stop().await,
            None => Ok(()),
        }
    }

    /// Poll `path` until it holds exactly `expected` or `within` elapses.
    pub async fn wait_for_delivery(
        &self,
        path: &Path,
        expected: &[String],
        within: Duration,
    ) -> Result<DeliveryOutcome, PipelineError> {
        let deadline = tokio::time::Instant::now() + within;
        loop {
            let observed = read_lines(path).await?;
            let outcome = DeliveryOutcome::compare(expected, &observed);
            if outcome.delivered() || tokio::time::Instant::now() >= deadline {
                return Ok(outcome);
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }

    /// Start, inject, wait for delivery, stop.
    ///
    /// `inject` is only called once the pipeline reported readiness.
    pub async fn run_scenario<F, Fut, T, E>(
        &mut self,
        scenario: &Scenario,
        inject: F,
    ) -> ScenarioOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        if let Err(e) = remove_stale(&scenario.sink).await {
            warn!(sink = %scenario.sink.display(), error = %e, "cannot remove previous sink");
        }

        if !self.start(&scenario.config, scenario.options).await {
            return ScenarioOutcome::SetupFailure;
        }

        if let Err(e) = inject().await {
            let reason = e.to_string();
            error!(error = %reason, "message injection failed");
            if let Err(e) = self.stop().await {
                warn!(error = %e, "stop after failed injection");
            }
            return ScenarioOutcome::InjectionFailed { reason };
        }

        let delivery = self
            .wait_for_delivery(&scenario.sink, &scenario.expected, scenario.wait)
            .await;

        if let Err(e) = self.stop().await {
            return ScenarioOutcome::StopFailed {
                reason: e.to_string(),
            };
        }

        // Re-read after stop: destinations flush on shutdown.
        let outcome = match delivery {
            Ok(outcome) if outcome.delivered() => match read_lines(&scenario.sink).await {
                Ok(lines) => DeliveryOutcome::compare(&scenario.expected, &lines),
                Err(e) => {
                    return ScenarioOutcome::StopFailed {
                        reason: e.to_string(),
                    };
                }
            },
            Ok(outcome) => outcome,
            Err(e) => {
                return ScenarioOutcome::StopFailed {
                    reason: e.to_string(),
                };
            }
        };

        if outcome.delivered() {
            info!(lines = scenario.expected.len(), "scenario passed");
            ScenarioOutcome::Passed
        } else {
            warn!(
                missing = outcome.missing.len(),
                unexpected = outcome.unexpected.len(),
                "scenario failed"
            );
            ScenarioOutcome::NotDelivered {
                missing: outcome.missing,
                unexpected: outcome.unexpected,
            }
        }
    }
}

async fn read_lines(path: &Path) -> Result<Vec<String>, PipelineError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(String::from_utf8_lossy(&bytes)
            .lines()
            .map(str::to_string)
            .collect()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

async fn remove_stale(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
