use super::{Payload, Producer, ProducerReport};
use crate::transport::context::{Context, DeliveryPolicy};
use crate::transport::message::Record;
use crate::transport::pull::PullSocket;
use crate::utils::error::TransportError;
use std::collections::HashSet;
use std::time::Duration;

fn local_address() -> String {
    let port = portpicker::pick_unused_port().expect("No free ports");
    format!("tcp://127.0.0.1:{port}")
}

#[test]
fn test_payload_expected_lines() {
    let text = Payload::Text("Almafa!\n".to_string());
    assert_eq!(text.expected_lines().unwrap(), vec!["Almafa!"]);

    let records = Payload::Records { count: 3 };
    assert_eq!(
        records.expected_lines().unwrap(),
        vec![r#"{"num":0}"#, r#"{"num":1}"#, r#"{"num":2}"#]
    );
    assert_eq!(Payload::Records { count: 0 }.messages().count(), 0);
}

#[tokio::test]
async fn test_two_producers_cannot_share_an_endpoint() {
    let ctx = Context::default();
    let address = local_address();

    let first = Producer::bind(&ctx, &address).await.unwrap();
    let second = Producer::bind(&ctx, &address).await;
    assert!(matches!(second, Err(TransportError::BindConflict { .. })));
    first.close().await;
}

#[tokio::test]
async fn test_run_without_peer_reports_dropped_messages() {
    let ctx = Context::default();
    let policy = DeliveryPolicy {
        send_timeout: Duration::from_millis(200),
        require_peer_before_send: false,
        peer_poll_interval: Duration::from_millis(10),
    };
    let producer = Producer::bind_with_policy(&ctx, &local_address(), policy)
        .await
        .unwrap();

    let report = producer
        .run(&Payload::Text("Almafa!\n".to_string()))
        .await
        .unwrap();
    assert_eq!(
        report,
        ProducerReport {
            delivered: 0,
            dropped: 1
        }
    );
}

#[tokio::test]
async fn test_records_cover_every_number_exactly_once() {
    const COUNT: u64 = 1000;

    let ctx = Context::default();
    let producer = Producer::bind(&ctx, &local_address()).await.unwrap();
    let mut pull = PullSocket::new(&ctx, producer.endpoint().clone());
    pull.connect().await.unwrap();

    let sender = tokio::spawn(async move { producer.run(&Payload::Records { count: COUNT }).await });

    let mut seen = HashSet::new();
    for _ in 0..COUNT {
        let payload = tokio::time::timeout(Duration::from_secs(5), pull.recv())
            .await
            .expect("recv timed out")
            .unwrap();
        let record: Record = serde_json::from_slice(&payload).unwrap();
        assert!(record.num < COUNT);
        assert!(seen.insert(record.num), "duplicate num {}", record.num);
    }

    let report = sender.await.unwrap().unwrap();
    assert_eq!(report.delivered, COUNT);
    assert_eq!(seen.len() as u64, COUNT);
    pull.close().await;
}
