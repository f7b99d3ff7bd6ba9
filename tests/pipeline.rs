//! End-to-end pipelines wired from loggers to real sinks.

use std::fs;
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use loggraph::handlers::{ConsoleHandlerBuilder, RotatingFileHandlerBuilder, SocketHandlerBuilder};
use loggraph::test_utils::{CollectingSink, FailingWriter, SharedBuf, wait_until};
use loggraph::{Config, Formatter, Graph, Logger, PipelineError, Record, Severity};
use rstest::rstest;
use tempfile::tempdir;

const PATIENCE: Duration = Duration::from_secs(5);

#[rstest]
fn uppercase_formatter_feeds_the_console() {
    let out = SharedBuf::new();
    let graph = Graph::default();
    let logger = Logger::builder()
        .with_level(Severity::Warn)
        .build(&graph)
        .unwrap();
    let upper = graph.add(Formatter::new(|r: &Record| r.message.to_text().to_uppercase()));
    let console = graph.add(
        ConsoleHandlerBuilder::new()
            .with_level(Severity::Warn)
            .build_with_writers(out.clone(), SharedBuf::new())
            .unwrap(),
    );
    graph.connect(logger.id(), upper).unwrap();
    graph.connect(upper, console).unwrap();

    logger.warn("hi").unwrap();
    logger.debug("x").unwrap();
    assert!(graph.flush());

    assert_eq!(out.text(), "HI\n");
}

#[rstest]
fn failing_sink_is_isolated_while_its_sibling_keeps_receiving() {
    let io_failures = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&io_failures);
    let graph = Graph::new(
        Config::builder()
            .with_error_handler(move |err| {
                if matches!(err, PipelineError::Io { .. }) {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            })
            .build()
            .unwrap(),
    );
    let logger = Logger::builder().build(&graph).unwrap();
    let formatter = graph.add(Formatter::standard());
    let (healthy, probe) = CollectingSink::new();
    let healthy = graph.add(healthy);
    let broken = graph.add(
        ConsoleHandlerBuilder::new()
            .build_with_writers(FailingWriter, FailingWriter)
            .unwrap(),
    );
    graph.connect(logger.id(), formatter).unwrap();
    graph.connect_all(formatter, [healthy, broken]).unwrap();

    logger.error("first").unwrap();
    assert!(wait_until(PATIENCE, || !graph.is_live(broken)));

    for i in 0..10 {
        logger.error(format!("after {i}")).unwrap();
    }
    graph.flush();

    assert_eq!(probe.len(), 11);
    assert!(graph.is_live(formatter));
    assert_eq!(graph.targets(formatter), [healthy]);
    assert_eq!(io_failures.load(Ordering::SeqCst), 1);
}

#[rstest]
fn logger_output_rotates_across_files() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("service.log");
    let graph = Graph::default();
    let logger = Logger::builder().build(&graph).unwrap();
    let file = graph.add(
        RotatingFileHandlerBuilder::new(&path)
            .with_max_size(100)
            .with_rotation_limit(2)
            .build()
            .unwrap(),
    );
    graph.connect(logger.id(), file).unwrap();

    for i in 0..5 {
        logger.warn(format!("{i:->30}")).unwrap();
    }
    assert!(graph.flush());

    let backup = dir.path().join("service.log.1");
    assert!(fs::metadata(&path).unwrap().len() <= 100);
    assert!(fs::metadata(&backup).unwrap().len() <= 100);
    assert!(!dir.path().join("service.log.2").exists());
}

#[rstest]
fn records_cross_process_boundaries_over_tcp() {
    let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
    let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
    let (server, _) = listener.accept().unwrap();

    let producer = Graph::default();
    let logger = Logger::builder()
        .with_name("edge")
        .with_level(Severity::Info)
        .build(&producer)
        .unwrap();
    let uplink = producer.add(SocketHandlerBuilder::new().build(client).unwrap());
    producer.connect(logger.id(), uplink).unwrap();

    let consumer = Graph::default();
    let downlink = consumer.add(SocketHandlerBuilder::new().build(server).unwrap());
    let (sink, probe) = CollectingSink::new();
    let sink = consumer.add(sink);
    consumer.connect(downlink, sink).unwrap();

    logger.info("started").unwrap();
    logger.crit_labelled("disk failing", "storage").unwrap();
    assert!(producer.flush());

    assert!(wait_until(PATIENCE, || probe.len() == 2));
    let records = probe.records();
    assert_eq!(probe.messages(), ["started", "disk failing"]);
    assert_eq!(records[1].level(), Severity::Crit);
    assert_eq!(records[1].name.as_deref(), Some("edge"));
    assert_eq!(records[1].metadata().label.as_deref(), Some("storage"));
}
