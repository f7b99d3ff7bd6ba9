//! Throughput of the logger path and the socket wire codec.

use criterion::{BatchSize, Criterion, Throughput, black_box, criterion_group, criterion_main};
use loggraph::handlers::socket::{
    DEFAULT_MAX_FRAME_SIZE, FrameDecoder, deserialise_record, encode_frame, serialise_record,
};
use loggraph::test_utils::CollectingSink;
use loggraph::{Config, Filter, Formatter, Graph, Logger, Record, Severity};

const BATCH: u64 = 1_000;

fn quiet_graph() -> Graph {
    Graph::new(
        Config::builder()
            .with_capture_stack_trace(false)
            .build()
            .expect("valid config"),
    )
}

fn bench_logger(c: &mut Criterion) {
    let mut group = c.benchmark_group("logger");
    group.throughput(Throughput::Elements(BATCH));

    group.bench_function("gated_out", |b| {
        let graph = quiet_graph();
        let logger = Logger::builder().build(&graph).expect("logger");
        b.iter(|| {
            for _ in 0..BATCH {
                logger.debug(black_box("ignored")).expect("log");
            }
        });
    });

    group.bench_function("format_filter_collect", |b| {
        b.iter_batched(
            || {
                let graph = quiet_graph();
                let logger = Logger::builder()
                    .with_level(Severity::Info)
                    .build(&graph)
                    .expect("logger");
                let filter = graph.add(Filter::level(Severity::Notice));
                let format = graph.add(Formatter::standard());
                let (sink, probe) = CollectingSink::new();
                let sink = graph.add(sink);
                graph.connect(logger.id(), filter).expect("wire");
                graph.connect(filter, format).expect("wire");
                graph.connect(format, sink).expect("wire");
                (graph, logger, probe)
            },
            |(graph, logger, probe)| {
                for i in 0..BATCH {
                    let level = if i % 2 == 0 { Severity::Info } else { Severity::Warn };
                    logger.log(level, "payload", None).expect("log");
                }
                graph.flush();
                black_box(probe.len());
            },
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

fn bench_codec(c: &mut Criterion) {
    let record: Record = Record::new(Severity::Warn, "a moderately sized log message").named("bench");
    let frame = encode_frame(
        &serialise_record(&record).expect("serialise"),
        DEFAULT_MAX_FRAME_SIZE,
    )
    .expect("frame");
    let stream: Vec<u8> = frame.iter().copied().cycle().take(frame.len() * 256).collect();

    let mut group = c.benchmark_group("codec");
    group.throughput(Throughput::Bytes(stream.len() as u64));
    group.bench_function("encode", |b| {
        b.iter(|| {
            let payload = serialise_record(black_box(&record)).expect("serialise");
            encode_frame(&payload, DEFAULT_MAX_FRAME_SIZE).expect("frame")
        });
    });
    group.bench_function("decode_in_chunks", |b| {
        b.iter(|| {
            let mut decoder = FrameDecoder::new(DEFAULT_MAX_FRAME_SIZE);
            let mut count = 0usize;
            for chunk in stream.chunks(1500) {
                decoder.extend(chunk);
                while let Some(payload) = decoder.next_frame().expect("frame") {
                    black_box(deserialise_record(&payload).expect("record"));
                    count += 1;
                }
            }
            count
        });
    });
    group.finish();
}

criterion_group!(benches, bench_logger, bench_codec);
criterion_main!(benches);
