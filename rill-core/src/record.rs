//! The record: the immutable unit of flow through a topology.

use std::fmt;
use std::sync::Arc;

use anyhow::anyhow;
use bytes::Bytes;
use crossbeam_channel::Sender;

use crate::error::Result;

/// Record time in milliseconds since epoch.
pub type EventTime = i64;

/// Acknowledgement carried by a record back to its source.
///
/// Modeled as a small sum type so the engine never materializes a closure
/// per record. `Sync` wraps a shared callable for sources that need a
/// synchronous confirmation; `Channel` signals a channel with the record id.
#[derive(Clone, Default)]
pub enum Ack {
    /// No acknowledgement requested.
    #[default]
    None,
    /// Invoke the shared callback. May block; use only when the source
    /// requires synchronous confirmation.
    Sync(Arc<dyn Fn() -> Result<()> + Send + Sync>),
    /// Send the record id on the channel.
    Channel(Sender<u64>),
}

impl fmt::Debug for Ack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ack::None => f.write_str("Ack::None"),
            Ack::Sync(_) => f.write_str("Ack::Sync"),
            Ack::Channel(_) => f.write_str("Ack::Channel"),
        }
    }
}

/// A single record within a stream.
///
/// Records are value types: every successor of a node receives its own
/// clone, and processors must copy key or value bytes before retaining them
/// across `process` calls. Cloning is cheap — payloads are refcounted
/// [`Bytes`].
#[derive(Debug, Clone)]
pub struct Record {
    /// Topic this record is associated with.
    pub topic: String,
    /// Record key. Routing and per-key ordering derive from these bytes.
    pub key: Option<Bytes>,
    /// Record value.
    pub value: Option<Bytes>,
    /// Record time in milliseconds since epoch.
    pub time: EventTime,
    /// Acknowledgement back to the record source.
    pub ack: Ack,
    /// Content-derived id, stable across runs: the hash of the key bytes
    /// when present, of the value bytes otherwise.
    pub id: u64,
}

impl Record {
    /// Create a record and derive its id from the key (or, failing that,
    /// the value) bytes. Two records with identical key bytes always get
    /// identical ids; the consistent-hash dispatch depends on this.
    pub fn new(
        topic: impl Into<String>,
        key: Option<Bytes>,
        value: Option<Bytes>,
        time: EventTime,
    ) -> Record {
        let id = match (&key, &value) {
            (Some(key), _) => fxhash::hash64(key.as_ref()),
            (None, Some(value)) => fxhash::hash64(value.as_ref()),
            (None, None) => 0,
        };

        Record {
            topic: topic.into(),
            key,
            value,
            time,
            ack: Ack::None,
            id,
        }
    }

    /// Attach an acknowledgement to this record.
    pub fn with_ack(mut self, ack: Ack) -> Record {
        self.ack = ack;
        self
    }

    /// A record is valid for forwarding iff it has a topic and any content.
    pub fn is_valid(&self) -> bool {
        !self.topic.is_empty() && (self.key.is_some() || self.value.is_some())
    }

    /// Acknowledge this record to its source.
    pub fn ack(&self) -> Result<()> {
        match &self.ack {
            Ack::None => Ok(()),
            Ack::Sync(callback) => callback(),
            Ack::Channel(sender) => sender
                .send(self.id)
                .map_err(|_| anyhow!("ack channel closed").into()),
        }
    }
}
