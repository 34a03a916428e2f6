//! Parsed configuration document.
//!
//! A document is only ever built by `parser::parse`, which guarantees that a
//! supported `@version` was declared, names are unique, and every `log`
//! statement refers to declared sources and destinations.

use std::path::PathBuf;

use crate::pipeline::parser;
use crate::pipeline::template::Template;
use crate::transport::endpoint::Endpoint;
use crate::utils::error::DocumentError;

/// Major configuration version this build understands.
pub const SUPPORTED_MAJOR_VERSION: u32 = 3;

pub const DEFAULT_SOURCE_ADDRESS: &str = "localhost";
pub const DEFAULT_SOURCE_PORT: u16 = 5558;
pub const DEFAULT_DESTINATION_PORT: u16 = 5556;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub version: Version,
    pub sources: Vec<SourceDecl>,
    pub destinations: Vec<DestinationDecl>,
    pub log_paths: Vec<LogPath>,
}

impl Document {
    pub fn parse(text: &str) -> Result<Self, DocumentError> {
        parser::parse(text)
    }

    pub fn source(&self, name: &str) -> Option<&SourceDecl> {
        self.sources.iter().find(|s| s.name == name)
    }

    pub fn destination(&self, name: &str) -> Option<&DestinationDecl> {
        self.destinations.iter().find(|d| d.name == name)
    }

    /// Destination names wired to `source`, in first-seen order, without
    /// duplicates.
    pub fn destinations_of(&self, source: &str) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for path in self.log_paths.iter().filter(|p| p.sources.iter().any(|s| s == source)) {
            for dest in &path.destinations {
                if !names.contains(&dest.as_str()) {
                    names.push(dest);
                }
            }
        }
        names
    }

    pub fn is_destination_used(&self, name: &str) -> bool {
        self.log_paths
            .iter()
            .any(|p| p.destinations.iter().any(|d| d == name))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceDecl {
    pub name: String,
    pub drivers: Vec<SourceDriver>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SourceDriver {
    Zmq(ZmqSourceOptions),
}

/// `zmqq()` / `zmq()` source: a pull socket connected to `tcp://address:port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZmqSourceOptions {
    pub address: String,
    pub port: u16,
}

impl Default for ZmqSourceOptions {
    fn default() -> Self {
        Self {
            address: DEFAULT_SOURCE_ADDRESS.to_string(),
            port: DEFAULT_SOURCE_PORT,
        }
    }
}

impl ZmqSourceOptions {
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.address.clone(), self.port)
    }

    /// Key under which the source keeps its state in the persist store.
    pub fn persist_name(&self) -> String {
        format!("zmq_source:{}:{}", self.address, self.port)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DestinationDecl {
    pub name: String,
    pub drivers: Vec<DestinationDriver>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DestinationDriver {
    File(FileOptions),
    Zmq(ZmqDestinationOptions),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileOptions {
    pub path: PathBuf,
    pub template: Template,
}

/// `zmq()` destination: a push socket bound on every interface.
#[derive(Debug, Clone, PartialEq)]
pub struct ZmqDestinationOptions {
    pub port: u16,
    pub template: Template,
}

impl ZmqDestinationOptions {
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new("*", self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogPath {
    pub sources: Vec<String>,
    pub destinations: Vec<String>,
    pub line: usize,
}
