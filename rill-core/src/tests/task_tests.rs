use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;

use super::{drain, forward_from, set_scale};
use crate::api::{Processor, Source};
use crate::config::Config;
use crate::context::ProcessorContext;
use crate::error::Result;
use crate::record::Record;
use crate::stream::Stream;
use crate::topology::Topology;

struct IdleSource;

impl Processor for IdleSource {
    fn process(&self, _ctx: &ProcessorContext, _record: Record) -> Result<()> {
        Ok(())
    }
}

impl Source for IdleSource {
    fn consume(&self, _ctx: &ProcessorContext) -> Result<()> {
        Ok(())
    }
}

/// Stream `src -> sink` where the sink counts deliveries. The source is
/// idle; tests drive dispatch through the task layer directly.
fn counting_stream(config: Config) -> (Stream, Arc<AtomicUsize>) {
    let processed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&processed);

    let mut topology = Topology::new();
    topology.add_source("src", || IdleSource).unwrap();
    topology
        .add_sink_fn(
            "sink",
            move |_ctx, _record| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            &["src"],
        )
        .unwrap();

    let stream = Stream::new("task-tests", topology, config).unwrap();
    stream.start().unwrap();
    (stream, processed)
}

fn record(key: &str, seq: u64) -> Record {
    Record::new(
        "t",
        Some(key.to_string().into_bytes().into()),
        Some(seq.to_be_bytes().to_vec().into()),
        0,
    )
}

fn wait_for(processed: &AtomicUsize, expected: usize) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while processed.load(Ordering::SeqCst) < expected {
        assert!(Instant::now() < deadline, "timed out waiting for {expected}");
        std::thread::yield_now();
    }
}

#[test]
fn test_scale_zero_forwards_inline() {
    let config = Config::new(json!({"src": {"tasks": {"count": 0}}}));
    let (stream, processed) = counting_stream(config);
    let src = stream.core.node_id("src").unwrap();

    assert_eq!(stream.core.nodes[src].pool.scale(), 0);
    forward_from(&stream.core, src, record("a", 1));

    // Inline dispatch completes on the calling thread.
    assert_eq!(processed.load(Ordering::SeqCst), 1);
    stream.close().unwrap();
}

#[test]
fn test_scaled_dispatch_is_buffered() {
    let (stream, processed) = counting_stream(Config::default());
    let src = stream.core.node_id("src").unwrap();

    assert_eq!(stream.core.nodes[src].pool.scale(), 1);
    for seq in 0..100 {
        forward_from(&stream.core, src, record("a", seq));
    }
    wait_for(&processed, 100);
    stream.close().unwrap();
    assert_eq!(processed.load(Ordering::SeqCst), 100);
}

#[test]
fn test_set_scale_grows_and_shrinks() {
    let (stream, _processed) = counting_stream(Config::default());
    let src = stream.core.node_id("src").unwrap();
    let pool = &stream.core.nodes[src].pool;

    set_scale(&stream.core, src, 4).unwrap();
    assert_eq!(pool.scale(), 4);
    assert_eq!(pool.worker_count(), 4);

    set_scale(&stream.core, src, 2).unwrap();
    assert_eq!(pool.scale(), 2);

    set_scale(&stream.core, src, 2).unwrap();
    assert_eq!(pool.scale(), 2);

    stream.close().unwrap();
    assert_eq!(pool.scale(), 0);
    assert_eq!(pool.worker_count(), 0);
}

#[test]
fn test_shrunk_slots_drain_their_queue() {
    let (stream, processed) = counting_stream(Config::default());
    let src = stream.core.node_id("src").unwrap();

    set_scale(&stream.core, src, 8).unwrap();
    for seq in 0..500 {
        forward_from(&stream.core, src, record(&format!("k{}", seq % 16), seq));
    }
    // Detached workers finish whatever was already queued.
    set_scale(&stream.core, src, 1).unwrap();
    wait_for(&processed, 500);
    stream.close().unwrap();
}

#[test]
fn test_drain_flushes_and_joins() {
    let (stream, processed) = counting_stream(Config::default());
    let src = stream.core.node_id("src").unwrap();

    set_scale(&stream.core, src, 3).unwrap();
    for seq in 0..300 {
        forward_from(&stream.core, src, record(&format!("k{}", seq % 5), seq));
    }

    drain(&stream.core, src, Duration::from_secs(5));
    assert_eq!(processed.load(Ordering::SeqCst), 300);
    assert_eq!(stream.core.nodes[src].pool.scale(), 0);
    assert_eq!(stream.core.nodes[src].pool.worker_count(), 0);

    stream.close().unwrap();
}

#[test]
fn test_configured_buffer_size_applies_backpressure() {
    let config = Config::new(json!({"src": {"tasks": {"count": 1, "buffer_size": 2}}}));
    let (stream, processed) = counting_stream(config);
    let src = stream.core.node_id("src").unwrap();

    // The bounded slot accepts everything eventually; send blocks rather
    // than dropping when the buffer is full.
    for seq in 0..50 {
        forward_from(&stream.core, src, record("a", seq));
    }
    wait_for(&processed, 50);
    stream.close().unwrap();
}
