use super::document::{DestinationDriver, Document, SourceDriver, Version};
use super::message::LogMessage;
use super::persist::{PersistStore, SourceState};
use super::template::Template;
use super::Pipeline;
use crate::producer::{Payload, Producer};
use crate::transport::context::Context;
use crate::transport::endpoint::Endpoint;
use crate::transport::pull::PullSocket;
use crate::utils::error::{DocumentError, PipelineError};
use std::path::Path;
use std::time::Duration;
use tempfile::tempdir;

const MINIMAL_CONFIG: &str = r#"
@version: 3.8

source zmq { zmqq(); };
destination file { file("/tmp/res"); };
log { source(zmq); destination(file); };
"#;

fn config_for(port: u16, sink: &Path) -> String {
    format!(
        "@version: 3.8\n\
         source zmq {{ zmqq(address(\"127.0.0.1\") port({port})); }};\n\
         destination file {{ file(\"{}\"); }};\n\
         log {{ source(zmq); destination(file); }};\n",
        sink.display()
    )
}

async fn wait_for_contents(path: &Path, expected: &str) -> String {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let contents = tokio::fs::read_to_string(path).await.unwrap_or_default();
        if contents == expected || tokio::time::Instant::now() >= deadline {
            return contents;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[test]
fn test_parse_minimal_config() {
    let doc = Document::parse(MINIMAL_CONFIG).unwrap();
    assert_eq!(doc.version, Version { major: 3, minor: 8 });
    assert_eq!(doc.sources.len(), 1);
    assert_eq!(doc.destinations.len(), 1);
    assert_eq!(doc.destinations_of("zmq"), vec!["file"]);

    let SourceDriver::Zmq(options) = &doc.source("zmq").unwrap().drivers[0];
    assert_eq!(options.address, "localhost");
    assert_eq!(options.port, 5558);
    assert_eq!(options.persist_name(), "zmq_source:localhost:5558");

    match &doc.destination("file").unwrap().drivers[0] {
        DestinationDriver::File(file) => {
            assert_eq!(file.path, Path::new("/tmp/res"));
            assert_eq!(file.template.as_str(), "${MESSAGE}\n");
        }
        other => panic!("unexpected driver {other:?}"),
    }
}

#[test]
fn test_parse_options_comments_and_dashes() {
    let doc = Document::parse(
        r#"
        # relay everything to a downstream consumer
        @version: 3.38
        source in { zmq(host("10.0.0.1"), port(7000)); };
        destination out { zmq(port(7001) socket-type("push") template("${SOURCE} ${MESSAGE}")); };
        log { source(in); destination(out); };
        "#,
    )
    .unwrap();

    let SourceDriver::Zmq(options) = &doc.sources[0].drivers[0];
    assert_eq!(options.endpoint(), Endpoint::new("10.0.0.1", 7000));

    match &doc.destinations[0].drivers[0] {
        DestinationDriver::Zmq(zmq) => {
            assert_eq!(zmq.endpoint().to_string(), "tcp://*:7001");
            let line = zmq
                .template
                .format(&LogMessage::new("in", 1, "hello".to_string()));
            assert_eq!(line, "in hello");
        }
        other => panic!("unexpected driver {other:?}"),
    }
}

#[test]
fn test_parse_rejects_version_problems() {
    let missing = "source zmq { zmqq(); }; destination f { file(\"/tmp/x\"); }; log { source(zmq); destination(f); };";
    assert_eq!(Document::parse(missing), Err(DocumentError::MissingVersion));

    let unsupported = format!("@version: 4.0\n{missing}");
    assert!(matches!(
        Document::parse(&unsupported),
        Err(DocumentError::UnsupportedVersion { supported: 3, .. })
    ));

    let twice = format!("@version: 3.8\n@version: 3.9\n{missing}");
    assert!(matches!(
        Document::parse(&twice),
        Err(DocumentError::Syntax { line: 2, .. })
    ));
}

#[test]
fn test_parse_rejects_bad_wiring_and_drivers() {
    let undefined = "@version: 3.8\nsource zmq { zmqq(); };\nlog { source(zmq); destination(nowhere); };";
    assert_eq!(
        Document::parse(undefined),
        Err(DocumentError::UndefinedReference {
            line: 3,
            kind: "destination",
            name: "nowhere".to_string(),
        })
    );

    let unknown = "@version: 3.8\nsource s { udp(); };";
    assert!(matches!(
        Document::parse(unknown),
        Err(DocumentError::UnknownDriver { kind: "source", .. })
    ));

    let duplicate = "@version: 3.8\nsource s { zmqq(); };\nsource s { zmqq(); };";
    assert!(matches!(
        Document::parse(duplicate),
        Err(DocumentError::Duplicate { line: 3, .. })
    ));

    for bad_port in ["0", "65536", "\"x\""] {
        let text = format!("@version: 3.8\nsource s {{ zmqq(port({bad_port})); }};");
        assert!(
            matches!(Document::parse(&text), Err(DocumentError::InvalidOption { .. })),
            "port {bad_port} accepted"
        );
    }

    let pubsub = "@version: 3.8\ndestination d { zmq(socket-type(\"publish\")); };";
    assert!(matches!(
        Document::parse(pubsub),
        Err(DocumentError::InvalidOption { .. })
    ));

    let template = "@version: 3.8\ndestination d { file(\"/tmp/x\" template(\"${NOPE}\")); };";
    assert!(matches!(
        Document::parse(template),
        Err(DocumentError::Template { .. })
    ));

    let unterminated = "@version: 3.8\nsource s { zmqq(); ";
    assert!(matches!(
        Document::parse(unterminated),
        Err(DocumentError::Syntax { .. })
    ));
}

#[test]
fn test_template_macros() {
    let msg = LogMessage::new("zmq", 7, "Almafa!".to_string());
    let template = Template::compile("$${SEQNUM} ${MSG} from ${SOURCE}").unwrap();
    assert_eq!(template.format(&msg), "$7 Almafa! from zmq");

    let id = Template::compile("${MSGID}").unwrap().format(&msg);
    assert_eq!(id, msg.id.to_string());

    assert!(Template::compile("${MESSAGE").is_err());
}

#[test]
fn test_persist_store_keep_and_reset() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("persist");
    let state = SourceState {
        received: 12,
        last_received_at: Some(1_700_000_000_000),
    };

    {
        let store = PersistStore::open(&path, false).unwrap();
        store.save_source_state("zmq_source:localhost:5558", &state).unwrap();
        store.flush().unwrap();
    }
    {
        let store = PersistStore::open(&path, true).unwrap();
        assert_eq!(
            store.load_source_state("zmq_source:localhost:5558").unwrap(),
            state
        );
        assert_eq!(store.names(), vec!["zmq_source:localhost:5558"]);
    }
    {
        let store = PersistStore::open(&path, false).unwrap();
        assert_eq!(
            store.load_source_state("zmq_source:localhost:5558").unwrap(),
            SourceState::default()
        );
        assert!(store.names().is_empty());
    }
}

#[tokio::test]
async fn test_start_fails_on_unwritable_destination() {
    let dir = tempdir().unwrap();
    let sink = dir.path().join("missing").join("res");
    let port = portpicker::pick_unused_port().expect("No free ports");
    let doc = Document::parse(&config_for(port, &sink)).unwrap();

    let result = Pipeline::start(&Context::default(), &doc, PersistStore::temporary().unwrap()).await;
    assert!(matches!(result, Err(PipelineError::Destination { .. })));
}

#[tokio::test]
async fn test_start_fails_when_zmq_destination_port_is_taken() {
    let ctx = Context::default();
    let port = portpicker::pick_unused_port().expect("No free ports");
    let holder = Producer::bind(&ctx, &format!("tcp://*:{port}")).await.unwrap();

    let doc = Document::parse(&format!(
        "@version: 3.8\nsource s {{ zmqq(); }};\ndestination d {{ zmq(port({port})); }};\nlog {{ source(s); destination(d); }};"
    ))
    .unwrap();
    let result = Pipeline::start(&ctx, &doc, PersistStore::temporary().unwrap()).await;
    assert!(matches!(result, Err(PipelineError::Transport(_))));
    holder.close().await;
}

#[tokio::test]
async fn test_message_reaches_file_sink() {
    let ctx = Context::default();
    let dir = tempdir().unwrap();
    let sink = dir.path().join("res");
    let port = portpicker::pick_unused_port().expect("No free ports");

    let producer = Producer::bind(&ctx, &format!("tcp://127.0.0.1:{port}"))
        .await
        .unwrap();
    let doc = Document::parse(&config_for(port, &sink)).unwrap();
    let persist = PersistStore::temporary().unwrap();
    let pipeline = Pipeline::start(&ctx, &doc, persist.clone()).await.unwrap();

    let report = producer
        .run(&Payload::Text("Almafa!\n".to_string()))
        .await
        .unwrap();
    assert_eq!(report.delivered, 1);

    assert_eq!(wait_for_contents(&sink, "Almafa!\n").await, "Almafa!\n");

    let stopped = pipeline.stop().await.unwrap();
    assert_eq!(stopped.received(), 1);
    assert_eq!(stopped.written(), 1);
    assert_eq!(std::fs::read_to_string(&sink).unwrap(), "Almafa!\n");

    let state = persist
        .load_source_state(&format!("zmq_source:127.0.0.1:{port}"))
        .unwrap();
    assert_eq!(state.received, 1);
    assert!(state.last_received_at.is_some());
}

#[tokio::test]
async fn test_lines_are_relayed_to_zmq_destination() {
    let ctx = Context::default();
    let in_port = portpicker::pick_unused_port().expect("No free ports");
    let out_port = portpicker::pick_unused_port().expect("No free ports");

    let producer = Producer::bind(&ctx, &format!("tcp://127.0.0.1:{in_port}"))
        .await
        .unwrap();
    let doc = Document::parse(&format!(
        "@version: 3.8\n\
         source zmq {{ zmqq(address(\"127.0.0.1\") port({in_port})); }};\n\
         destination relay {{ zmq(port({out_port}) template(\"${{SEQNUM}}:${{MESSAGE}}\")); }};\n\
         log {{ source(zmq); destination(relay); }};"
    ))
    .unwrap();
    let pipeline = Pipeline::start(&ctx, &doc, PersistStore::temporary().unwrap())
        .await
        .unwrap();

    let mut downstream = PullSocket::new(&ctx, Endpoint::new("127.0.0.1", out_port));
    downstream.connect().await.unwrap();

    producer
        .run(&Payload::Text("first\nsecond\n".to_string()))
        .await
        .unwrap();

    let mut lines = Vec::new();
    for _ in 0..2 {
        let payload = tokio::time::timeout(Duration::from_secs(5), downstream.recv())
            .await
            .expect("relay timed out")
            .unwrap();
        lines.push(String::from_utf8(payload).unwrap());
    }
    assert_eq!(lines, vec!["1:first", "2:second"]);

    downstream.close().await;
    pipeline.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_without_traffic() {
    let dir = tempdir().unwrap();
    let sink = dir.path().join("res");
    let port = portpicker::pick_unused_port().expect("No free ports");
    let doc = Document::parse(&config_for(port, &sink)).unwrap();

    let pipeline = Pipeline::start(&Context::default(), &doc, PersistStore::temporary().unwrap())
        .await
        .unwrap();
    let report = tokio::time::timeout(Duration::from_secs(5), pipeline.stop())
        .await
        .expect("stop hung")
        .unwrap();
    assert_eq!(report.received(), 0);
    assert!(sink.exists());
    assert_eq!(std::fs::read_to_string(&sink).unwrap(), "");
}

#[tokio::test]
async fn test_source_reconnects_to_a_new_producer() {
    let ctx = Context::default();
    let dir = tempdir().unwrap();
    let sink = dir.path().join("res");
    let port = portpicker::pick_unused_port().expect("No free ports");
    let address = format!("tcp://127.0.0.1:{port}");

    let doc = Document::parse(&config_for(port, &sink)).unwrap();
    let pipeline = Pipeline::start(&ctx, &doc, PersistStore::temporary().unwrap())
        .await
        .unwrap();

    let first = Producer::bind(&ctx, &address).await.unwrap();
    first
        .run(&Payload::Text("first\n".to_string()))
        .await
        .unwrap();
    assert_eq!(wait_for_contents(&sink, "first\n").await, "first\n");

    // same endpoint, fresh producer process
    let second = Producer::bind(&ctx, &address).await.unwrap();
    let report = second
        .run(&Payload::Text("second\n".to_string()))
        .await
        .unwrap();
    assert_eq!(report.delivered, 1);
    assert_eq!(
        wait_for_contents(&sink, "first\nsecond\n").await,
        "first\nsecond\n"
    );

    let stopped = pipeline.stop().await.unwrap();
    assert_eq!(stopped.received(), 2);
    assert_eq!(stopped.written(), 2);
}
