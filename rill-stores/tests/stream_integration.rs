//! MemoryStore driven through a running stream.

use std::sync::Arc;

use bytes::Bytes;
use rill_core::{
    Config, Processor, ProcessorContext, Record, Result, Source, Store, Stream, Topology,
};
use rill_stores::MemoryStore;

struct WordSource {
    words: Vec<&'static str>,
}

impl Processor for WordSource {
    fn process(&self, _ctx: &ProcessorContext, _record: Record) -> Result<()> {
        Ok(())
    }
}

impl Source for WordSource {
    fn consume(&self, ctx: &ProcessorContext) -> Result<()> {
        for (i, word) in self.words.iter().enumerate() {
            ctx.forward(Record::new(
                "words",
                Some(Bytes::from(*word)),
                Some(Bytes::from(i.to_string())),
                i as i64,
            ))?;
        }
        Ok(())
    }
}

/// Counts words into the "counts" store and forwards the updated total.
struct WordCounter;

impl Processor for WordCounter {
    fn process(&self, ctx: &ProcessorContext, record: Record) -> Result<()> {
        let counts = ctx.store("counts")?;
        let key = record.key.as_ref().expect("keyed record");

        let current = match counts.get(key) {
            Ok(value) => u64::from_be_bytes(value.as_slice().try_into().unwrap_or([0; 8])),
            Err(_) => 0,
        };
        counts.set(key, &(current + 1).to_be_bytes())?;

        ctx.forward(Record::new(
            record.topic.clone(),
            record.key.clone(),
            Some(Bytes::copy_from_slice(&(current + 1).to_be_bytes())),
            record.time,
        ))
    }
}

#[test]
fn test_store_node_accumulates_counts() {
    let mut topology = Topology::new();
    topology.add_store("counts", MemoryStore::new).unwrap();
    topology
        .add_source("src", || WordSource {
            words: vec!["tide", "rill", "tide", "brook", "tide", "rill"],
        })
        .unwrap();
    topology.add_processor("count", || WordCounter, &["src"]).unwrap();
    topology
        .add_sink_fn("done", |_ctx, _record| Ok(()), &["count"])
        .unwrap();

    let verify = Arc::new(MemoryStore::with_name("verify"));
    {
        // Keep an eye on final counts through a second store handle bound
        // to the same topology node via the processor context.
        let verify = Arc::clone(&verify);
        topology
            .add_sink_fn(
                "mirror",
                move |ctx, record| {
                    let counts = ctx.store("counts")?;
                    let key = record.key.as_ref().expect("keyed record");
                    verify.set(key, &counts.get(key)?)?;
                    Ok(())
                },
                &["count"],
            )
            .unwrap();
    }

    let stream = Stream::new("wordcount", topology, Config::default()).unwrap();
    stream.start().unwrap();
    stream.close().unwrap();

    assert_eq!(verify.get(b"tide").unwrap(), 3u64.to_be_bytes().to_vec());
    assert_eq!(verify.get(b"rill").unwrap(), 2u64.to_be_bytes().to_vec());
    assert_eq!(verify.get(b"brook").unwrap(), 1u64.to_be_bytes().to_vec());
}

#[test]
fn test_store_materializes_records_routed_to_it() {
    let mut topology = Topology::new();
    topology.add_store("archive", MemoryStore::new).unwrap();
    topology
        .add_source("src", || WordSource {
            words: vec!["alpha", "beta", "alpha"],
        })
        .unwrap();
    topology
        .add_sink_fn(
            "archiver",
            |ctx, record| {
                // Materialize every record, then retract the tombstoned key.
                ctx.forward_to("archive", record.clone())?;
                if record.key.as_deref() == Some(b"beta".as_slice()) {
                    let tombstone =
                        Record::new(record.topic.clone(), record.key.clone(), None, record.time);
                    ctx.forward_to("archive", tombstone)?;
                }
                Ok(())
            },
            &["src"],
        )
        .unwrap();

    let checked = Arc::new(std::sync::Mutex::new(false));
    {
        let checked = Arc::clone(&checked);
        topology
            .add_sink_fn(
                "verify",
                move |ctx, record| {
                    // Runs after "archiver" for the same record: successors
                    // are invoked in declaration order by the same worker.
                    let archive = ctx.store("archive")?;
                    let key = record.key.as_ref().expect("keyed record");
                    if key.as_ref() == b"beta" {
                        assert!(archive.get(key).is_err(), "tombstone not applied");
                    } else {
                        archive.get(key)?;
                    }
                    *checked.lock().unwrap() = true;
                    Ok(())
                },
                &["src"],
            )
            .unwrap();
    }

    let stream = Stream::new("materialize", topology, Config::default()).unwrap();
    stream.start().unwrap();
    stream.close().unwrap();
    assert!(*checked.lock().unwrap());
}

#[test]
fn test_store_name_binds_to_node_name() {
    let observed = Arc::new(std::sync::Mutex::new(String::new()));

    let mut topology = Topology::new();
    topology.add_store("session-state", MemoryStore::new).unwrap();
    topology
        .add_source("src", || WordSource { words: vec!["x"] })
        .unwrap();
    {
        let observed = Arc::clone(&observed);
        topology
            .add_sink_fn(
                "probe",
                move |ctx, _record| {
                    *observed.lock().unwrap() = ctx.store("session-state")?.name();
                    Ok(())
                },
                &["src"],
            )
            .unwrap();
    }

    let stream = Stream::new("names", topology, Config::default()).unwrap();
    stream.start().unwrap();
    stream.close().unwrap();

    assert_eq!(observed.lock().unwrap().as_str(), "session-state");
}
