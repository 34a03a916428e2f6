use std::time::Duration;

use serde::Deserialize;

use crate::transport::context::{DeliveryPolicy, SocketOptions};

/// Top-level configuration settings for the binary.
///
/// Covers the producer endpoint, the delivery policy, the ingestion source,
/// the harness and logging.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub endpoint: EndpointSettings,
    pub producer: ProducerSettings,
    pub source: SourceSettings,
    pub harness: HarnessSettings,
    pub logging: LoggingSettings,
}

/// Address the producer binds its push socket to.
#[derive(Debug, Deserialize, Clone)]
pub struct EndpointSettings {
    pub host: String,
    pub port: u16,
}

/// Delivery policy for outbound push sockets.
#[derive(Debug, Deserialize, Clone)]
pub struct ProducerSettings {
    pub send_timeout_ms: u64,
    pub require_peer_before_send: bool,
    pub peer_poll_interval_ms: u64,
    pub record_count: u64,
}

/// Ingestion source tuning.
#[derive(Debug, Deserialize, Clone)]
pub struct SourceSettings {
    pub reconnect_interval_ms: u64,
    pub channel_capacity: usize,
}

/// Harness process control.
///
/// `bin_dir` locates the `zmqpipe` executable for the child-process launcher;
/// it is normally supplied as `ZMQPIPE_HARNESS__BIN_DIR`.
#[derive(Debug, Deserialize, Clone)]
pub struct HarnessSettings {
    pub bin_dir: Option<String>,
    pub work_dir: String,
    pub ready_timeout_ms: u64,
    pub stop_timeout_ms: u64,
    pub delivery_wait_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Missing values are filled from `Settings::default()`.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub endpoint: Option<PartialEndpointSettings>,
    pub producer: Option<PartialProducerSettings>,
    pub source: Option<PartialSourceSettings>,
    pub harness: Option<PartialHarnessSettings>,
    pub logging: Option<PartialLoggingSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialEndpointSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize)]
pub struct PartialProducerSettings {
    pub send_timeout_ms: Option<u64>,
    pub require_peer_before_send: Option<bool>,
    pub peer_poll_interval_ms: Option<u64>,
    pub record_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PartialSourceSettings {
    pub reconnect_interval_ms: Option<u64>,
    pub channel_capacity: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct PartialHarnessSettings {
    pub bin_dir: Option<String>,
    pub work_dir: Option<String>,
    pub ready_timeout_ms: Option<u64>,
    pub stop_timeout_ms: Option<u64>,
    pub delivery_wait_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            endpoint: EndpointSettings {
                host: "127.0.0.1".to_string(),
                port: 5558,
            },
            producer: ProducerSettings {
                send_timeout_ms: 5000,
                require_peer_before_send: true,
                peer_poll_interval_ms: 10,
                record_count: 10_000,
            },
            source: SourceSettings {
                reconnect_interval_ms: 100,
                channel_capacity: 1024,
            },
            harness: HarnessSettings {
                bin_dir: None,
                work_dir: "zmqpipe.work".to_string(),
                ready_timeout_ms: 5000,
                stop_timeout_ms: 5000,
                delivery_wait_ms: 5000,
            },
            logging: LoggingSettings {
                level: "info".to_string(),
            },
        }
    }
}

impl Settings {
    /// `tcp://host:port` the producer binds.
    pub fn producer_address(&self) -> String {
        format!("tcp://{}:{}", self.endpoint.host, self.endpoint.port)
    }

    /// Socket options handed to `transport::Context::new`.
    pub fn socket_options(&self) -> SocketOptions {
        SocketOptions {
            delivery: DeliveryPolicy {
                send_timeout: Duration::from_millis(self.producer.send_timeout_ms),
                require_peer_before_send: self.producer.require_peer_before_send,
                peer_poll_interval: Duration::from_millis(self.producer.peer_poll_interval_ms),
            },
            reconnect_interval: Duration::from_millis(self.source.reconnect_interval_ms),
            channel_capacity: self.source.channel_capacity,
        }
    }
}
