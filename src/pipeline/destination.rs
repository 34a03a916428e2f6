//! Destinations: where forwarded lines end up.
//!
//! - `file("path")` appends every formatted line to a file, creating it if
//!   needed. The file is opened when the pipeline starts, so an unwritable path
//!   fails `start` instead of the first delivery.
//! - `zmq(port(N))` binds a push socket on `tcp://*:N` and sends each formatted
//!   line as one message.
//!
//! Each destination runs as a task that drains its channel until every source
//! feeding it has stopped, flushing whenever the channel runs dry.

use std::path::PathBuf;

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::pipeline::document::DestinationDriver;
use crate::pipeline::message::LogMessage;
use crate::pipeline::template::Template;
use crate::transport::context::Context;
use crate::transport::push::{PushSocket, SendOutcome};
use crate::utils::error::PipelineError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationReport {
    pub name: String,
    pub written: u64,
    pub dropped: u64,
}

pub struct FileDestination {
    path: PathBuf,
    template: Template,
    writer: BufWriter<File>,
}

impl FileDestination {
    pub async fn open(path: PathBuf, template: Template) -> Result<Self, PipelineError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|source| PipelineError::Destination {
                path: path.clone(),
                source,
            })?;
        Ok(Self {
            path,
            template,
            writer: BufWriter::new(file),
        })
    }

    async fn write(&mut self, message: &LogMessage) -> Result<(), PipelineError> {
        let line = self.template.format(message);
        self.writer.write_all(line.as_bytes()).await?;
        Ok(())
    }
}

pub struct ZmqDestination {
    socket: PushSocket,
    template: Template,
}

impl ZmqDestination {
    pub async fn open(
        ctx: &Context,
        address: &str,
        template: Template,
    ) -> Result<Self, PipelineError> {
        let socket = PushSocket::bind(ctx, address).await?;
        Ok(Self { socket, template })
    }
}

pub enum Destination {
    File(FileDestination),
    Zmq(ZmqDestination),
}

impl Destination {
    pub async fn open(ctx: &Context, driver: &DestinationDriver) -> Result<Self, PipelineError> {
        match driver {
            DestinationDriver::File(options) => Ok(Destination::File(
                FileDestination::open(options.path.clone(), options.template.clone()).await?,
            )),
            DestinationDriver::Zmq(options) => Ok(Destination::Zmq(
                ZmqDestination::open(ctx, &options.endpoint().to_string(), options.template.clone())
                    .await?,
            )),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Destination::File(file) => format!("file({})", file.path.display()),
            Destination::Zmq(zmq) => format!("zmq({})", zmq.socket.endpoint()),
        }
    }

    /// Returns whether the line left the pipeline.
    async fn deliver(&mut self, message: &LogMessage) -> Result<bool, PipelineError> {
        match self {
            Destination::File(file) => {
                file.write(message).await?;
                Ok(true)
            }
            Destination::Zmq(zmq) => {
                let line = zmq.template.format(message);
                match zmq.socket.send_bytes(line.into_bytes()).await {
                    Ok(SendOutcome::Delivered) => Ok(true),
                    Ok(SendOutcome::Dropped) => Ok(false),
                    // a slow or absent consumer must not take the pipeline down
                    Err(e) => {
                        error!(destination = %zmq.socket.endpoint(), error = %e, "forwarding failed");
                        Ok(false)
                    }
                }
            }
        }
    }

    async fn flush(&mut self) -> Result<(), PipelineError> {
        if let Destination::File(file) = self {
            file.writer.flush().await?;
        }
        Ok(())
    }

    async fn close(self) -> Result<(), PipelineError> {
        match self {
            Destination::File(mut file) => {
                file.writer.flush().await?;
                file.writer.get_mut().sync_all().await?;
            }
            Destination::Zmq(zmq) => zmq.socket.close().await,
        }
        Ok(())
    }

    pub fn spawn(
        self,
        name: String,
        inbox: mpsc::Receiver<LogMessage>,
    ) -> JoinHandle<Result<DestinationReport, PipelineError>> {
        tokio::spawn(self.run(name, inbox))
    }

    async fn run(
        mut self,
        name: String,
        mut inbox: mpsc::Receiver<LogMessage>,
    ) -> Result<DestinationReport, PipelineError> {
        let mut report = DestinationReport {
            name,
            written: 0,
            dropped: 0,
        };

        while let Some(message) = inbox.recv().await {
            self.count(&mut report, &message).await?;
            while let Ok(next) = inbox.try_recv() {
                self.count(&mut report, &next).await?;
            }
            self.flush().await?;
        }

        let target = self.describe();
        self.close().await?;
        info!(
            destination = %report.name,
            target = %target,
            written = report.written,
            dropped = report.dropped,
            "destination closed"
        );
        Ok(report)
    }

    async fn count(
        &mut self,
        report: &mut DestinationReport,
        message: &LogMessage,
    ) -> Result<(), PipelineError> {
        if self.deliver(message).await? {
            report.written += 1;
        } else {
            report.dropped += 1;
        }
        Ok(())
    }
}
