mod settings;

#[cfg(test)]
mod tests;

use crate::config::settings::PartialSettings;
use config::{Config, ConfigError, Environment, File};

pub use settings::{
    EndpointSettings, HarnessSettings, LoggingSettings, ProducerSettings, Settings,
    SourceSettings,
};

/// Prefix of every environment variable the binary reads, e.g.
/// `ZMQPIPE_HARNESS__BIN_DIR` or `ZMQPIPE_ENDPOINT__PORT`.
pub const ENV_PREFIX: &str = "ZMQPIPE";

/// Loads the configuration from the default file and environment variables
/// Merges the configuration with default values
/// Returns a `Settings` struct; call it once at process start
pub fn load_config() -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(merge_with_defaults(partial))
}

fn merge_with_defaults(partial: PartialSettings) -> Settings {
    let default = Settings::default();

    Settings {
        endpoint: EndpointSettings {
            host: partial
                .endpoint
                .as_ref()
                .and_then(|e| e.host.clone())
                .unwrap_or(default.endpoint.host),
            port: partial
                .endpoint
                .as_ref()
                .and_then(|e| e.port)
                .unwrap_or(default.endpoint.port),
        },
        producer: ProducerSettings {
            send_timeout_ms: partial
                .producer
                .as_ref()
                .and_then(|p| p.send_timeout_ms)
                .unwrap_or(default.producer.send_timeout_ms),
            require_peer_before_send: partial
                .producer
                .as_ref()
                .and_then(|p| p.require_peer_before_send)
                .unwrap_or(default.producer.require_peer_before_send),
            peer_poll_interval_ms: partial
                .producer
                .as_ref()
                .and_then(|p| p.peer_poll_interval_ms)
                .unwrap_or(default.producer.peer_poll_interval_ms),
            record_count: partial
                .producer
                .as_ref()
                .and_then(|p| p.record_count)
                .unwrap_or(default.producer.record_count),
        },
        source: SourceSettings {
            reconnect_interval_ms: partial
                .source
                .as_ref()
                .and_then(|s| s.reconnect_interval_ms)
                .unwrap_or(default.source.reconnect_interval_ms),
            channel_capacity: partial
                .source
                .as_ref()
                .and_then(|s| s.channel_capacity)
                .unwrap_or(default.source.channel_capacity),
        },
        harness: HarnessSettings {
            bin_dir: partial
                .harness
                .as_ref()
                .and_then(|h| h.bin_dir.clone())
                .or(default.harness.bin_dir),
            work_dir: partial
                .harness
                .as_ref()
                .and_then(|h| h.work_dir.clone())
                .unwrap_or(default.harness.work_dir),
            ready_timeout_ms: partial
                .harness
                .as_ref()
                .and_then(|h| h.ready_timeout_ms)
                .unwrap_or(default.harness.ready_timeout_ms),
            stop_timeout_ms: partial
                .harness
                .as_ref()
                .and_then(|h| h.stop_timeout_ms)
                .unwrap_or(default.harness.stop_timeout_ms),
            delivery_wait_ms: partial
                .harness
                .as_ref()
                .and_then(|h| h.delivery_wait_ms)
                .unwrap_or(default.harness.delivery_wait_ms),
        },
        logging: LoggingSettings {
            level: partial
                .logging
                .as_ref()
                .and_then(|l| l.level.clone())
                .unwrap_or(default.logging.level),
        },
    }
}
