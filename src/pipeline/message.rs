use chrono::{DateTime, Utc};
use uuid::Uuid;

/// One line received by a source, on its way to the destinations.
#[derive(Debug, Clone, PartialEq)]
pub struct LogMessage {
    pub id: Uuid,
    pub message: String,
    /// Name of the `source` block that received the line.
    pub source: String,
    /// Per-source sequence number; continues across restarts when persist
    /// state is kept.
    pub seq: u64,
    pub received_at: DateTime<Utc>,
}

impl LogMessage {
    pub fn new(source: &str, seq: u64, message: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            message,
            source: source.to_string(),
            seq,
            received_at: Utc::now(),
        }
    }
}
