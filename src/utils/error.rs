//! Error types for every layer of `zmqpipe`.
//!
//! - `TransportError`: socket-level failures (bind, connect, bounded send).
//! - `DocumentError`: configuration document failures, always with a line number
//!   when one is known.
//! - `PipelineError`: anything that stops a pipeline from starting or stopping
//!   cleanly. The harness collapses it into a boolean `start` result.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid endpoint '{address}': {reason}")]
    InvalidEndpoint { address: String, reason: String },

    /// Another socket (in this process or another one) already owns the endpoint.
    #[error("endpoint {address} is already bound: {reason}")]
    BindConflict { address: String, reason: String },

    #[error("failed to bind {address}: {reason}")]
    Bind { address: String, reason: String },

    #[error("failed to connect to {address}: {reason}")]
    Connect { address: String, reason: String },

    /// The connected peer went away; the socket has to be rebuilt.
    #[error("peer at {address} disconnected")]
    Disconnected { address: String },

    /// No peer showed up before the send deadline and the policy requires one.
    #[error("no peer connected to {address} within {waited:?}")]
    PeerUnavailable { address: String, waited: Duration },

    /// A peer was connected but the send did not complete in time.
    #[error("delivery to {address} did not complete within {timeout:?}")]
    DeliveryTimeout { address: String, timeout: Duration },

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("transport failure on {address}: {reason}")]
    Socket { address: String, reason: String },
}

#[derive(Debug, Error, PartialEq)]
pub enum DocumentError {
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("configuration has no @version declaration")]
    MissingVersion,

    #[error("unsupported configuration version {found}, this build reads {supported}.x")]
    UnsupportedVersion { found: String, supported: u32 },

    #[error("line {line}: unknown {kind} driver '{name}'")]
    UnknownDriver {
        line: usize,
        kind: &'static str,
        name: String,
    },

    #[error("line {line}: invalid option {option}: {reason}")]
    InvalidOption {
        line: usize,
        option: String,
        reason: String,
    },

    #[error("line {line}: duplicate {kind} '{name}'")]
    Duplicate {
        line: usize,
        kind: &'static str,
        name: String,
    },

    #[error("line {line}: {kind} '{name}' is not defined")]
    UndefinedReference {
        line: usize,
        kind: &'static str,
        name: String,
    },

    #[error("invalid template '{template}': {reason}")]
    Template { template: String, reason: String },
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("failed to open destination file {path}: {source}")]
    Destination {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("persist store error: {0}")]
    Persist(#[from] sled::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to launch pipeline: {0}")]
    Launch(String),

    #[error("pipeline did not report readiness within {0:?}")]
    ReadyTimeout(Duration),

    #[error("pipeline task failed: {0}")]
    Task(String),
}
