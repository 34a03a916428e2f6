use super::{DeliveryOutcome, Harness, Launcher, Scenario, ScenarioOutcome, StartOptions, default_config};
use crate::config::Settings;
use crate::producer::{Payload, Producer};
use crate::transport::context::Context;
use crate::transport::endpoint::Endpoint;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tempfile::tempdir;

fn lines(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_delivery_outcome_counts_duplicates() {
    let expected = lines(&["a", "b", "b"]);

    let exact = DeliveryOutcome::compare(&expected, &lines(&["b", "a", "b"]));
    assert!(exact.delivered());

    let short = DeliveryOutcome::compare(&expected, &lines(&["a", "b"]));
    assert_eq!(short.missing, lines(&["b"]));
    assert!(short.unexpected.is_empty());

    let extra = DeliveryOutcome::compare(&expected, &lines(&["a", "b", "b", "a", "c"]));
    assert!(extra.missing.is_empty());
    assert_eq!(extra.unexpected, lines(&["a", "c"]));
}

#[test]
fn test_exit_codes() {
    assert_eq!(ScenarioOutcome::Passed.exit_code(), 0);
    assert_eq!(ScenarioOutcome::SetupFailure.exit_code(), 42);
    assert_eq!(
        ScenarioOutcome::InjectionFailed {
            reason: "x".to_string()
        }
        .exit_code(),
        1
    );
    assert_eq!(
        ScenarioOutcome::NotDelivered {
            missing: lines(&["x"]),
            unexpected: Vec::new()
        }
        .exit_code(),
        1
    );
}

#[test]
fn test_default_config_parses() {
    let config = default_config(
        std::path::Path::new("/tmp/a \"quoted\" sink"),
        &Endpoint::new("127.0.0.1", 5558),
    );
    let doc = crate::pipeline::Document::parse(&config).unwrap();
    assert_eq!(doc.destinations_of("zmq"), vec!["file"]);
}

#[test]
fn test_process_launcher_requires_bin_dir() {
    let settings = Settings::default();
    assert!(Launcher::process(&settings).is_err());

    let mut settings = Settings::default();
    settings.harness.bin_dir = Some("/opt/zmqpipe/bin".to_string());
    match Launcher::process(&settings).unwrap() {
        Launcher::Process { program, .. } => {
            assert_eq!(program, std::path::Path::new("/opt/zmqpipe/bin/zmqpipe"))
        }
        other => panic!("unexpected launcher {other:?}"),
    }
}

#[tokio::test]
async fn test_stop_without_start_is_a_no_op() {
    let dir = tempdir().unwrap();
    let mut harness = Harness::in_process(Context::default(), dir.path());
    assert!(!harness.is_running());
    harness.stop().await.unwrap();
    harness.stop().await.unwrap();
}

#[tokio::test]
async fn test_invalid_config_never_injects() {
    let dir = tempdir().unwrap();
    let mut harness = Harness::in_process(Context::default(), dir.path().join("work"));
    let scenario = Scenario::new(
        "source zmq { zmqq(); };",
        dir.path().join("res"),
        lines(&["Almafa!"]),
    );

    let injected = AtomicBool::new(false);
    let outcome = harness
        .run_scenario(&scenario, || async {
            injected.store(true, Ordering::SeqCst);
            Ok::<_, std::io::Error>(())
        })
        .await;

    assert_eq!(outcome, ScenarioOutcome::SetupFailure);
    assert_eq!(outcome.exit_code(), 42);
    assert!(!injected.load(Ordering::SeqCst));
    assert!(!harness.is_running());
}

#[tokio::test]
async fn test_unwritable_sink_fails_start() {
    let dir = tempdir().unwrap();
    let port = portpicker::pick_unused_port().expect("No free ports");
    let config = default_config(
        &dir.path().join("no").join("such").join("res"),
        &Endpoint::new("127.0.0.1", port),
    );

    let mut harness = Harness::in_process(Context::default(), dir.path().join("work"));
    assert!(!harness.start(&config, StartOptions::default()).await);
    assert!(!harness.is_running());
}

#[tokio::test]
async fn test_second_start_is_refused() {
    let dir = tempdir().unwrap();
    let port = portpicker::pick_unused_port().expect("No free ports");
    let config = default_config(&dir.path().join("res"), &Endpoint::new("127.0.0.1", port));

    let mut harness = Harness::in_process(Context::default(), dir.path().join("work"));
    assert!(harness.start(&config, StartOptions::default()).await);
    assert!(!harness.start(&config, StartOptions::default()).await);
    assert!(harness.is_running());
    harness.stop().await.unwrap();
    assert!(!harness.is_running());
}

#[tokio::test]
async fn test_wait_for_delivery_reports_missing_lines() {
    let dir = tempdir().unwrap();
    let sink = dir.path().join("res");
    std::fs::write(&sink, "first\n").unwrap();

    let harness = Harness::in_process(Context::default(), dir.path());
    let outcome = harness
        .wait_for_delivery(&sink, &lines(&["first", "second"]), Duration::from_millis(100))
        .await
        .unwrap();
    assert_eq!(outcome.missing, lines(&["second"]));
    assert!(!outcome.delivered());
}

#[tokio::test]
async fn test_almafa_scenario_in_process() {
    let dir = tempdir().unwrap();
    let sink = dir.path().join("res");
    let port = portpicker::pick_unused_port().expect("No free ports");
    let endpoint = Endpoint::new("127.0.0.1", port);
    let ctx = Context::default();

    let payload = Payload::Text("Almafa!\n".to_string());
    let scenario = Scenario::for_payload(default_config(&sink, &endpoint), &sink, &payload)
        .unwrap()
        .with_options(StartOptions {
            keep_persist: false,
            verbose: true,
        });

    let mut harness = Harness::in_process(ctx.clone(), dir.path().join("work"));
    let outcome = harness
        .run_scenario(&scenario, || async {
            let producer = Producer::bind(&ctx, &endpoint.to_string()).await?;
            producer.run(&payload).await
        })
        .await;

    assert_eq!(outcome, ScenarioOutcome::Passed);
    assert_eq!(std::fs::read_to_string(&sink).unwrap(), "Almafa!\n");
    assert!(!harness.is_running());
}
