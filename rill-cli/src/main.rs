//! Word-count demo pipeline:
//! `lines -> split -> count (backed by the "counts" store) -> print`.

use bytes::Bytes;
use clap::Parser;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use rill_core::{
    Config, Processor, ProcessorContext, Record, Result, Source, Stream, Topology,
};
use rill_stores::MemoryStore;

#[derive(Parser, Debug)]
#[command(name = "rill")]
#[command(about = "rill word-count demo", long_about = None)]
struct Args {
    /// Number of lines to emit.
    #[arg(long, default_value_t = 64)]
    lines: u64,

    /// Task scale of the splitting node. Its workers run the counting
    /// step, routed per word, so counts stay race-free at any scale.
    #[arg(long, default_value_t = 2)]
    scale: u64,

    /// Print the stream's DOT graph before running.
    #[arg(long, default_value_t = false)]
    graph: bool,
}

const SENTENCES: &[&str] = &[
    "every rill joins a brook",
    "a brook feeds the river",
    "the river meets the tide",
    "the tide turns with the moon",
];

/// Emits `lines` sentences, cycling over the fixture set, then returns.
struct LineSource {
    lines: u64,
}

impl Processor for LineSource {
    fn process(&self, _ctx: &ProcessorContext, _record: Record) -> Result<()> {
        Ok(())
    }
}

impl Source for LineSource {
    fn consume(&self, ctx: &ProcessorContext) -> Result<()> {
        for i in 0..self.lines {
            let sentence = SENTENCES[(i as usize) % SENTENCES.len()];
            ctx.forward(Record::new(
                "lines",
                None,
                Some(Bytes::from(sentence)),
                i as i64,
            ))?;
        }
        Ok(())
    }
}

/// Splits each line into one keyed record per word.
fn split(ctx: &ProcessorContext, record: Record) -> Result<()> {
    let Some(line) = &record.value else {
        return Ok(());
    };
    for word in String::from_utf8_lossy(line).split_whitespace() {
        ctx.forward(Record::new(
            "words",
            Some(Bytes::from(word.to_string())),
            None,
            record.time,
        ))?;
    }
    Ok(())
}

/// Increments the word's count in the "counts" store and forwards the
/// updated total.
fn count(ctx: &ProcessorContext, record: Record) -> Result<()> {
    let counts = ctx.store("counts")?;
    let Some(word) = &record.key else {
        return Ok(());
    };

    let current = counts
        .get(word)
        .ok()
        .and_then(|v| v.as_slice().try_into().ok())
        .map(u64::from_be_bytes)
        .unwrap_or(0);
    let updated = current + 1;
    counts.set(word, &updated.to_be_bytes())?;

    ctx.forward(Record::new(
        "counts",
        record.key.clone(),
        Some(Bytes::copy_from_slice(&updated.to_be_bytes())),
        record.time,
    ))
}

fn print_update(_ctx: &ProcessorContext, record: Record) -> Result<()> {
    let word = record.key.as_ref().map(|k| String::from_utf8_lossy(k).into_owned());
    let total = record
        .value
        .as_ref()
        .and_then(|v| v.as_ref().try_into().ok())
        .map(u64::from_be_bytes);
    if let (Some(word), Some(total)) = (word, total) {
        println!("{word}: {total}");
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let mut topology = Topology::new();
    topology.add_store("counts", MemoryStore::new)?;
    let lines = args.lines;
    topology.add_source("lines", move || LineSource { lines })?;
    topology.add_processor_fn("split", split, &["lines"])?;
    topology.add_processor_fn("count", count, &["split"])?;
    topology.add_sink_fn("print", print_update, &["count"])?;

    let config = Config::new(json!({
        "split": { "tasks": { "count": args.scale } }
    }));

    let stream = Stream::with_error_handler("wordcount", topology, config, |error| {
        eprintln!("stream error at {}: {}", error.node, error.error);
    })?;

    if args.graph {
        print!("{}", stream.dot_graph());
    }

    stream.start()?;
    // The source is finite; close drains everything it produced.
    stream.close()?;

    Ok(())
}
