use std::collections::HashMap;

use futures::future::join_all;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::pipeline::destination::{Destination, DestinationReport};
use crate::pipeline::document::{Document, SourceDriver};
use crate::pipeline::message::LogMessage;
use crate::pipeline::persist::PersistStore;
use crate::pipeline::source::{SourceReport, ZmqSource};
use crate::transport::context::Context;
use crate::utils::error::PipelineError;

/// Counters gathered from every task when the pipeline stops.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub sources: Vec<SourceReport>,
    pub destinations: Vec<DestinationReport>,
}

impl PipelineReport {
    pub fn received(&self) -> u64 {
        self.sources.iter().map(|s| s.received).sum()
    }

    pub fn written(&self) -> u64 {
        self.destinations.iter().map(|d| d.written).sum()
    }
}

/// A running pipeline: one task per source driver and one per destination
/// driver, joined by bounded channels.
pub struct Pipeline {
    shutdown: watch::Sender<bool>,
    sources: Vec<JoinHandle<Result<SourceReport, PipelineError>>>,
    destinations: Vec<JoinHandle<Result<DestinationReport, PipelineError>>>,
    persist: PersistStore,
}

impl Pipeline {
    /// Open every destination, then start the sources.
    ///
    /// Nothing is spawned unless every destination opened, so a failed start
    /// leaves no task behind.
    pub async fn start(
        ctx: &Context,
        document: &Document,
        persist: PersistStore,
    ) -> Result<Self, PipelineError> {
        let mut opened = Vec::new();
        for decl in &document.destinations {
            if !document.is_destination_used(&decl.name) {
                warn!(destination = %decl.name, "destination is not referenced by any log path");
                continue;
            }
            for driver in &decl.drivers {
                let destination = Destination::open(ctx, driver).await?;
                debug!(destination = %decl.name, target = %destination.describe(), "destination opened");
                opened.push((decl.name.clone(), destination));
            }
        }

        let capacity = ctx.options().channel_capacity.max(1);
        let mut inboxes: HashMap<String, Vec<mpsc::Sender<LogMessage>>> = HashMap::new();
        let mut destinations = Vec::with_capacity(opened.len());
        for (name, destination) in opened {
            let (tx, rx) = mpsc::channel(capacity);
            inboxes.entry(name.clone()).or_default().push(tx);
            destinations.push(destination.spawn(name, rx));
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let mut sources = Vec::new();
        for decl in &document.sources {
            let outputs: Vec<_> = document
                .destinations_of(&decl.name)
                .into_iter()
                .filter_map(|name| inboxes.get(name))
                .flatten()
                .cloned()
                .collect();
            if outputs.is_empty() {
                warn!(source = %decl.name, "source is not referenced by any log path");
            }
            for driver in &decl.drivers {
                let SourceDriver::Zmq(options) = driver;
                let source = ZmqSource::new(&decl.name, options.clone(), outputs.clone());
                sources.push(source.spawn(ctx.clone(), persist.clone(), shutdown_rx.clone()));
            }
        }

        // Destinations finish once the last source holding a sender is gone.
        drop(inboxes);

        info!(
            sources = sources.len(),
            destinations = destinations.len(),
            "pipeline started"
        );

        Ok(Self {
            shutdown,
            sources,
            destinations,
            persist,
        })
    }

    /// Stop the sources, let the destinations drain, then flush persist state.
    pub async fn stop(self) -> Result<PipelineReport, PipelineError> {
        let _ = self.shutdown.send(true);

        let mut report = PipelineReport::default();
        let mut first_error = None;

        for joined in join_all(self.sources).await {
            match flatten(joined) {
                Ok(source) => report.sources.push(source),
                Err(e) => {
                    warn!(error = %e, "source task failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        for joined in join_all(self.destinations).await {
            match flatten(joined) {
                Ok(destination) => report.destinations.push(destination),
                Err(e) => {
                    warn!(error = %e, "destination task failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        self.persist.flush()?;

        if let Some(e) = first_error {
            return Err(e);
        }

        info!(
            received = report.received(),
            written = report.written(),
            "pipeline stopped"
        );
        Ok(report)
    }
}

fn flatten<T>(
    joined: Result<Result<T, PipelineError>, tokio::task::JoinError>,
) -> Result<T, PipelineError> {
    joined.map_err(|e| PipelineError::Task(e.to_string()))?
}
