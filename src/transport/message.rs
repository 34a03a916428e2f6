//! Message definitions for the push/pull hand-off
//!
//! Two payload variants travel over the wire:
//! - `Text`: an opaque line (or lines) of text, sent as-is
//! - `Record`: a structured record with a single `num` field, sent as compact
//!   JSON such as `{"num":0}`
//!
//! The receiving side does not distinguish the two: every frame is read as
//! text and split into lines.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub num: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Text(String),
    Record(Record),
}

impl Message {
    pub fn text(body: impl Into<String>) -> Self {
        Message::Text(body.into())
    }

    pub fn record(num: u64) -> Self {
        Message::Record(Record { num })
    }

    /// Wire bytes for a single-frame message.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        match self {
            Message::Text(body) => Ok(body.as_bytes().to_vec()),
            Message::Record(record) => serde_json::to_vec(record),
        }
    }

    /// Lines this message is expected to produce on the receiving side.
    pub fn expected_lines(&self) -> Result<Vec<String>, serde_json::Error> {
        let bytes = self.encode()?;
        Ok(split_lines(&bytes))
    }
}

/// Split a received payload into non-empty lines.
///
/// A trailing `\r` is stripped from each line; invalid UTF-8 is replaced
/// rather than rejected.
pub fn split_lines(payload: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(payload)
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
