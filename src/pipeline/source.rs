//! ZeroMQ ingestion source
//!
//! Each `zmqq()` driver runs as its own task:
//! 1. load its persisted counters
//! 2. connect a pull socket, retrying every `reconnect_interval`
//! 3. split every received payload into lines and forward each line, unchanged,
//!    to all destinations wired to the source
//! 4. when the producer goes away, drop the socket and go back to 2
//! 5. on shutdown, save the counters and close the socket
//!
//! The source never acknowledges anything back to the producer.

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::pipeline::document::ZmqSourceOptions;
use crate::pipeline::message::LogMessage;
use crate::pipeline::persist::PersistStore;
use crate::transport::context::Context;
use crate::transport::message::split_lines;
use crate::transport::pull::PullSocket;
use crate::utils::error::{PipelineError, TransportError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceReport {
    pub name: String,
    pub persist_name: String,
    /// Lines received during this run.
    pub received: u64,
    /// Lines received over all runs that kept persist state.
    pub total_received: u64,
}

pub struct ZmqSource {
    name: String,
    options: ZmqSourceOptions,
    outputs: Vec<mpsc::Sender<LogMessage>>,
}

impl ZmqSource {
    pub fn new(
        name: impl Into<String>,
        options: ZmqSourceOptions,
        outputs: Vec<mpsc::Sender<LogMessage>>,
    ) -> Self {
        Self {
            name: name.into(),
            options,
            outputs,
        }
    }

    pub fn spawn(
        self,
        ctx: Context,
        persist: PersistStore,
        shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<Result<SourceReport, PipelineError>> {
        tokio::spawn(self.run(ctx, persist, shutdown))
    }

    async fn run(
        self,
        ctx: Context,
        persist: PersistStore,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<SourceReport, PipelineError> {
        let persist_name = self.options.persist_name();
        let mut state = persist.load_source_state(&persist_name)?;
        let reconnect = ctx.options().reconnect_interval;
        let mut socket = PullSocket::new(&ctx, self.options.endpoint());
        let mut seq = state.received;
        let mut received = 0u64;

        debug!(source = %self.name, persist_name = %persist_name, resumed_at = seq, "source starting");

        while !*shutdown.borrow() {
            if !socket.is_connected() {
                if !self.connect(&mut socket, &mut shutdown, reconnect).await {
                    break;
                }
                info!(source = %self.name, endpoint = %socket.endpoint(), "source receiving");
            }

            let next = tokio::select! {
                _ = shutdown.changed() => None,
                result = socket.recv() => Some(result),
            };
            let payload = match next {
                None => break,
                Some(Ok(payload)) => payload,
                Some(Err(TransportError::Disconnected { .. })) => {
                    info!(source = %self.name, "producer disconnected, reconnecting");
                    socket.close().await;
                    socket = PullSocket::new(&ctx, self.options.endpoint());
                    continue;
                }
                Some(Err(e)) => {
                    warn!(source = %self.name, error = %e, "receive failed");
                    tokio::time::sleep(reconnect).await;
                    continue;
                }
            };

            for line in split_lines(&payload) {
                seq += 1;
                received += 1;
                self.forward(LogMessage::new(&self.name, seq, line)).await;
            }
        }

        state.received += received;
        if received > 0 {
            state.last_received_at = Some(chrono::Utc::now().timestamp_millis());
        }
        persist.save_source_state(&persist_name, &state)?;
        socket.close().await;

        info!(source = %self.name, received, total = state.received, "source stopped");

        Ok(SourceReport {
            name: self.name,
            persist_name,
            received,
            total_received: state.received,
        })
    }

    /// Retry until connected. `false` means shutdown came first.
    async fn connect(
        &self,
        socket: &mut PullSocket,
        shutdown: &mut watch::Receiver<bool>,
        reconnect: std::time::Duration,
    ) -> bool {
        while !*shutdown.borrow() {
            let attempt = tokio::select! {
                _ = shutdown.changed() => return false,
                result = socket.connect() => result,
            };
            match attempt {
                Ok(()) => return true,
                Err(e) => {
                    warn!(source = %self.name, error = %e, "connect failed, retrying");
                    tokio::select! {
                        _ = shutdown.changed() => return false,
                        _ = tokio::time::sleep(reconnect) => {}
                    }
                }
            }
        }
        false
    }

    async fn forward(&self, message: LogMessage) {
        for output in &self.outputs {
            if output.send(message.clone()).await.is_err() {
                warn!(source = %self.name, "destination closed, line not forwarded");
            }
        }
    }
}
