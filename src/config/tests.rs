use super::load_config;
use super::settings::Settings;
use serial_test::serial;
use std::env;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_default_settings() {
    let settings = Settings::default();
    assert_eq!(settings.endpoint.host, "127.0.0.1");
    assert_eq!(settings.endpoint.port, 5558);
    assert!(settings.producer.require_peer_before_send);
    assert_eq!(settings.producer.record_count, 10_000);
    assert_eq!(settings.harness.bin_dir, None);
    assert_eq!(settings.producer_address(), "tcp://127.0.0.1:5558");
}

#[test]
fn socket_options_follow_settings() {
    let mut settings = Settings::default();
    settings.producer.send_timeout_ms = 250;
    settings.producer.require_peer_before_send = false;
    settings.source.channel_capacity = 8;

    let options = settings.socket_options();
    assert_eq!(options.delivery.send_timeout, Duration::from_millis(250));
    assert!(!options.delivery.require_peer_before_send);
    assert_eq!(options.channel_capacity, 8);
}

#[test]
#[serial]
fn load_config_from_file_overrides_defaults() {
    // load_config reads config/default.toml relative to the cwd
    let tmp = TempDir::new().expect("create tempdir");
    let orig = env::current_dir().expect("current_dir");
    env::set_current_dir(tmp.path()).expect("set current dir");

    fs::create_dir_all("config").expect("create config dir");
    let toml = r#"
        [endpoint]
        host = "0.0.0.0"
        port = 9000

        [producer]
        require_peer_before_send = false

        [harness]
        work_dir = "/var/tmp/zmqpipe"
    "#;
    fs::write("config/default.toml", toml).expect("write config file");

    let cfg = load_config();

    env::set_current_dir(orig).expect("restore cwd");

    let cfg = cfg.expect("load_config failed");
    assert_eq!(cfg.endpoint.host, "0.0.0.0");
    assert_eq!(cfg.endpoint.port, 9000);
    assert!(!cfg.producer.require_peer_before_send);
    assert_eq!(cfg.producer.send_timeout_ms, 5000);
    assert_eq!(cfg.harness.work_dir, "/var/tmp/zmqpipe");
}

#[test]
#[serial]
fn harness_bin_dir_comes_from_environment() {
    temp_env::with_vars(
        [
            ("ZMQPIPE_HARNESS__BIN_DIR", Some("/opt/zmqpipe/bin")),
            ("ZMQPIPE_ENDPOINT__PORT", Some("6000")),
        ],
        || {
            let cfg = load_config().expect("load_config failed");
            assert_eq!(cfg.harness.bin_dir.as_deref(), Some("/opt/zmqpipe/bin"));
            assert_eq!(cfg.endpoint.port, 6000);
        },
    );
}
