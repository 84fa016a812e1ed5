//! # rill core
//!
//! Core runtime for the rill stream processing engine: a topology of
//! sources, processors, sinks and stores executed with per-node task
//! fan-out and ordered per-key dispatch.
//!
//! - [`record`] — The unit of flow: [`Record`], [`Ack`], [`EventTime`].
//! - [`topology`] — DAG construction and validation: [`Topology`],
//!   [`NodeType`].
//! - [`api`] — Processor contracts: [`Processor`], [`Source`],
//!   [`processor_fn`].
//! - [`store`] — The key/value [`Store`] contract consumed by processors.
//! - [`context`] — The per-node capability handle: [`ProcessorContext`].
//! - [`stream`] — Orchestration: [`Stream`], [`ContextInfo`].
//! - [`config`] — Dot-path configuration getter: [`Config`].
//! - [`partitioner`] — Jump-consistent slot selection.
//!
//! ```no_run
//! use rill_core::{Config, Record, Stream, Topology};
//!
//! # struct Lines;
//! # impl rill_core::Processor for Lines {
//! #     fn process(&self, _: &rill_core::ProcessorContext, _: Record) -> rill_core::Result<()> { Ok(()) }
//! # }
//! # impl rill_core::Source for Lines {
//! #     fn consume(&self, _: &rill_core::ProcessorContext) -> rill_core::Result<()> { Ok(()) }
//! # }
//! # fn main() -> rill_core::Result<()> {
//! let mut topology = Topology::new();
//! topology.add_source("lines", || Lines)?;
//! topology.add_sink_fn("print", |_ctx, record| {
//!     println!("{:?}", record.value);
//!     Ok(())
//! }, &["lines"])?;
//!
//! let stream = Stream::new("example", topology, Config::default())?;
//! stream.start()?;
//! stream.close()?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod context;
pub mod error;
pub mod partitioner;
pub mod record;
pub mod store;
pub mod stream;
pub mod topology;

mod task;

pub use api::{processor_fn, FnProcessor, Processor, Source};
pub use config::Config;
pub use context::{ErrorHandler, ProcessorContext, StreamError};
pub use error::{Error, Result};
pub use record::{Ack, EventTime, Record};
pub use store::{RangeFn, Store};
pub use stream::{ContextInfo, Stream};
pub use topology::{NodeId, NodeType, Topology};
