use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::harness::{SETUP_FAILURE_EXIT_CODE, StartOptions};
use crate::producer::Payload;
use crate::transport::endpoint::Endpoint;

/// Everything a scenario needs besides the injection itself.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub config: String,
    pub options: StartOptions,
    pub sink: PathBuf,
    /// Lines the sink must hold, each exactly as often as listed.
    pub expected: Vec<String>,
    pub wait: Duration,
}

impl Scenario {
    pub fn new(config: impl Into<String>, sink: impl Into<PathBuf>, expected: Vec<String>) -> Self {
        Self {
            config: config.into(),
            options: StartOptions::default(),
            sink: sink.into(),
            expected,
            wait: Duration::from_secs(5),
        }
    }

    /// A scenario expecting exactly the lines `payload` produces.
    pub fn for_payload(
        config: impl Into<String>,
        sink: impl Into<PathBuf>,
        payload: &Payload,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(config, sink, payload.expected_lines()?))
    }

    pub fn with_options(mut self, options: StartOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScenarioOutcome {
    Passed,
    NotDelivered {
        missing: Vec<String>,
        unexpected: Vec<String>,
    },
    InjectionFailed {
        reason: String,
    },
    StopFailed {
        reason: String,
    },
    /// The pipeline never started; nothing was injected.
    SetupFailure,
}

impl ScenarioOutcome {
    pub fn exit_code(&self) -> u8 {
        match self {
            ScenarioOutcome::Passed => 0,
            ScenarioOutcome::SetupFailure => SETUP_FAILURE_EXIT_CODE,
            _ => 1,
        }
    }
}

/// One zmq source connected to `endpoint`, wired to one file sink.
pub fn default_config(sink: &Path, endpoint: &Endpoint) -> String {
    format!(
        "@version: 3.8\n\
         \n\
         source zmq {{ zmqq(address(\"{host}\") port({port})); }};\n\
         destination file {{ file(\"{sink}\"); }};\n\
         log {{ source(zmq); destination(file); }};\n",
        host = endpoint.host,
        port = endpoint.port,
        sink = escape(&sink.display().to_string()),
    )
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}
