//! CLI for zmqpipe
//!
//! Subcommands:
//! - `run`: host a pipeline from a configuration file until stopped
//! - `push`: bind the producer endpoint and send one message or a batch of records
//! - `scenario`: start a pipeline, inject, check the sink, stop (exit 42 on setup failure)

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser};
use tracing::{error, info};

use zmqpipe::config::{Settings, load_config};
use zmqpipe::harness::{
    Harness, PERSIST_DIR, READY_MARKER, SETUP_FAILURE_EXIT_CODE, Scenario, StartOptions,
    default_config,
};
use zmqpipe::pipeline::{Document, PersistStore, Pipeline};
use zmqpipe::producer::{Payload, Producer};
use zmqpipe::transport::{Context, Endpoint};
use zmqpipe::utils::error::PipelineError;
use zmqpipe::utils::logging;

/// Exit status for usage or runtime errors outside a scenario.
const RUNTIME_ERROR_EXIT_CODE: u8 = 2;

#[derive(Parser)]
#[command(name = "zmqpipe")]
enum Command {
    /// Run a pipeline until interrupted (or until stdin closes with --stdin-control)
    Run {
        /// Pipeline configuration file
        #[arg(long)]
        config: PathBuf,
        /// Persist store directory (default: <harness.work_dir>/persist)
        #[arg(long)]
        persist_dir: Option<PathBuf>,
        /// Keep the persist state of the previous run
        #[arg(long)]
        keep_persist: bool,
        #[arg(long)]
        verbose: bool,
        /// Stop when stdin reaches EOF
        #[arg(long)]
        stdin_control: bool,
    },
    /// Bind the producer endpoint, send, exit
    Push {
        /// Endpoint to bind (default: endpoint.host/endpoint.port from settings)
        #[arg(long)]
        endpoint: Option<String>,
        #[command(flatten)]
        payload: PayloadArgs,
        #[arg(long)]
        verbose: bool,
    },
    /// Start a pipeline, push the payload, verify the sink and stop
    Scenario {
        /// Pipeline configuration file (default: one zmq source wired to --sink)
        #[arg(long)]
        config: Option<PathBuf>,
        /// File the pipeline writes to
        #[arg(long, default_value = "/tmp/res")]
        sink: PathBuf,
        /// Launch `zmqpipe run` as a child process from harness.bin_dir
        #[arg(long)]
        process: bool,
        #[arg(long)]
        keep_persist: bool,
        #[command(flatten)]
        payload: PayloadArgs,
        #[arg(long)]
        verbose: bool,
    },
}

#[derive(Args)]
struct PayloadArgs {
    /// Send numbered records instead of text
    #[arg(long)]
    records: bool,
    /// Number of records (default: producer.record_count)
    #[arg(long, requires = "records")]
    count: Option<u64>,
    /// Text message to send
    #[arg(long, default_value = "Almafa!\n")]
    text: String,
}

impl PayloadArgs {
    fn payload(&self, settings: &Settings) -> Payload {
        if self.records {
            Payload::Records {
                count: self.count.unwrap_or(settings.producer.record_count),
            }
        } else {
            Payload::Text(self.text.clone())
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cmd = Command::parse();

    let settings = match load_config() {
        Ok(settings) => settings,
        Err(e) => {
            logging::init("info");
            error!("Failed to load configuration: {}", e);
            return ExitCode::from(RUNTIME_ERROR_EXIT_CODE);
        }
    };

    let verbose = match &cmd {
        Command::Run { verbose, .. }
        | Command::Push { verbose, .. }
        | Command::Scenario { verbose, .. } => *verbose,
    };
    logging::init(logging::level_for(verbose, &settings.logging.level));

    let ctx = Context::new(settings.socket_options());

    match cmd {
        Command::Run {
            config,
            persist_dir,
            keep_persist,
            stdin_control,
            ..
        } => {
            let persist_dir = persist_dir
                .unwrap_or_else(|| PathBuf::from(&settings.harness.work_dir).join(PERSIST_DIR));
            run_pipeline(&ctx, config, persist_dir, keep_persist, stdin_control).await
        }
        Command::Push {
            endpoint, payload, ..
        } => {
            let endpoint = endpoint.unwrap_or_else(|| settings.producer_address());
            match Producer::bind(&ctx, &endpoint).await {
                Ok(producer) => match producer.run(&payload.payload(&settings)).await {
                    Ok(_) => ExitCode::SUCCESS,
                    Err(e) => {
                        error!("Push failed: {}", e);
                        ExitCode::from(RUNTIME_ERROR_EXIT_CODE)
                    }
                },
                Err(e) => {
                    error!("Push failed: {}", e);
                    ExitCode::from(RUNTIME_ERROR_EXIT_CODE)
                }
            }
        }
        Command::Scenario {
            config,
            sink,
            process,
            keep_persist,
            payload,
            verbose,
        } => {
            let options = StartOptions {
                keep_persist,
                verbose,
            };
            run_scenario(&settings, ctx, config, sink, process, options, &payload).await
        }
    }
}

async fn run_pipeline(
    ctx: &Context,
    config: PathBuf,
    persist_dir: PathBuf,
    keep_persist: bool,
    stdin_control: bool,
) -> ExitCode {
    let pipeline = match start_pipeline(ctx, &config, &persist_dir, keep_persist).await {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!("Pipeline failed to start: {}", e);
            return ExitCode::from(SETUP_FAILURE_EXIT_CODE);
        }
    };

    if let Err(e) = announce_ready() {
        error!("Cannot signal readiness: {}", e);
    }

    wait_for_stop(stdin_control).await;

    match pipeline.stop().await {
        Ok(report) => {
            info!(
                received = report.received(),
                written = report.written(),
                "Pipeline stopped"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Pipeline stopped with an error: {}", e);
            ExitCode::from(RUNTIME_ERROR_EXIT_CODE)
        }
    }
}

async fn start_pipeline(
    ctx: &Context,
    config: &Path,
    persist_dir: &Path,
    keep_persist: bool,
) -> Result<Pipeline, PipelineError> {
    let text = tokio::fs::read_to_string(config).await?;
    let document = Document::parse(&text)?;
    let persist = PersistStore::open(persist_dir, keep_persist)?;
    Pipeline::start(ctx, &document, persist).await
}

fn announce_ready() -> std::io::Result<()> {
    let mut out = std::io::stdout().lock();
    writeln!(out, "{READY_MARKER}")?;
    out.flush()
}

async fn wait_for_stop(stdin_control: bool) {
    if stdin_control {
        let mut stdin = tokio::io::stdin();
        let mut discard = tokio::io::sink();
        tokio::select! {
            _ = tokio::io::copy(&mut stdin, &mut discard) => {
                info!("Stdin closed. Stopping pipeline.");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received. Stopping pipeline.");
            }
        }
    } else if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received. Stopping pipeline.");
    }
}

async fn run_scenario(
    settings: &Settings,
    ctx: Context,
    config: Option<PathBuf>,
    sink: PathBuf,
    process: bool,
    options: StartOptions,
    payload: &PayloadArgs,
) -> ExitCode {
    let setup_failure = ExitCode::from(SETUP_FAILURE_EXIT_CODE);

    let endpoint = match Endpoint::parse(&settings.producer_address()) {
        Ok(endpoint) => endpoint,
        Err(e) => {
            error!("Invalid producer endpoint: {}", e);
            return setup_failure;
        }
    };
    let config = match config {
        Some(path) => match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) => {
                error!("Cannot read {}: {}", path.display(), e);
                return setup_failure;
            }
        },
        None => default_config(&sink, &endpoint),
    };

    let payload = payload.payload(settings);
    let scenario = match Scenario::for_payload(config, sink, &payload) {
        Ok(scenario) => scenario
            .with_options(options)
            .with_wait(Duration::from_millis(settings.harness.delivery_wait_ms)),
        Err(e) => {
            error!("Cannot encode payload: {}", e);
            return setup_failure;
        }
    };

    let mut harness = match Harness::from_settings(settings, ctx.clone(), process) {
        Ok(harness) => harness,
        Err(e) => {
            error!("Harness setup failed: {}", e);
            return setup_failure;
        }
    };

    let address = endpoint.to_string();
    let outcome = harness
        .run_scenario(&scenario, || async {
            let producer = Producer::bind(&ctx, &address).await?;
            producer.run(&payload).await
        })
        .await;

    info!(outcome = ?outcome, "Scenario finished");
    ExitCode::from(outcome.exit_code())
}
