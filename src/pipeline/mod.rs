//! The ingestion pipeline host.
//!
//! A configuration document declares sources, destinations and `log`
//! statements wiring them together:
//!
//! ```text
//! @version: 3.8
//! source zmq { zmqq(); };
//! destination file { file("/tmp/res"); };
//! log { source(zmq); destination(file); };
//! ```
//!
//! `Pipeline::start` opens every destination, then starts one task per source
//! driver. `Pipeline::stop` stops the sources, lets the destinations drain and
//! flushes the persist store.

pub mod destination;
pub mod document;
mod lexer;
pub mod message;
mod parser;
pub mod persist;
pub mod source;
pub mod template;

mod host;

#[cfg(test)]
mod tests;

pub use document::Document;
pub use host::{Pipeline, PipelineReport};
pub use message::LogMessage;
pub use persist::PersistStore;
