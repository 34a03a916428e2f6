//! # zmqpipe
//!
//! `zmqpipe` moves lines from a ZeroMQ PUSH producer, through an ingestion
//! pipeline, into file (or ZeroMQ) sinks, and ships the harness that proves the
//! lines arrived.
//!
//! ## Core Modules
//!
//! - `transport`: the explicit socket context, endpoints, and the bounded push and pull sockets.
//! - `producer`: binds a push endpoint and sends one text message or a batch of numbered records.
//! - `pipeline`: configuration language, ingestion source, destinations and the persist store.
//! - `harness`: starts and stops a pipeline (in-process or as a child process) and checks sinks.
//! - `config`: settings for the binary, from `config/default.*` and `ZMQPIPE_*` variables.
//! - `utils`: error types and logging setup.

pub mod config;
pub mod harness;
pub mod pipeline;
pub mod producer;
pub mod transport;
pub mod utils;
