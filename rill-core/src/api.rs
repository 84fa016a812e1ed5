//! Processor contracts.
//!
//! A topology node is backed by an implementation of [`Processor`] (or
//! [`Source`] for roots). One instance serves the whole node: the engine
//! invokes `process` concurrently from multiple task workers, so
//! implementations take `&self` and keep any mutable state behind their own
//! synchronization.
//!
//! The lifecycle hooks `init` and `close` are optional: the default
//! implementations are no-ops, and the engine cannot tell an absent hook
//! from a successful one.

use std::sync::Arc;

use crate::context::ProcessorContext;
use crate::error::Result;
use crate::record::Record;
use crate::store::Store;

/// A processor of records in a stream. Processors, sinks and stores all
/// implement this contract.
pub trait Processor: Send + Sync {
    /// Called exactly once per stream start, before any record flows.
    /// Returning an error aborts `Stream::start`.
    fn init(&self, ctx: &ProcessorContext) -> Result<()> {
        let _ = ctx;
        Ok(())
    }

    /// Handle one record. Called synchronously by the predecessor's task
    /// worker; the record must not be retained past return unless its
    /// bytes are copied. An error is delivered to the stream error handler
    /// together with the record and does not stop dispatch.
    fn process(&self, ctx: &ProcessorContext, record: Record) -> Result<()>;

    /// Called once during stream shutdown, after the node has quiesced.
    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// A source of records.
pub trait Source: Processor {
    /// Drive the source. Called once at `Stream::start` on a dedicated
    /// thread; returns when the source is exhausted or closed. The context
    /// stays active for the whole call, so `ctx.forward` is always
    /// permitted here.
    fn consume(&self, ctx: &ProcessorContext) -> Result<()>;
}

/// Adapter implementing [`Processor`] for a plain function or closure.
///
/// Built by [`processor_fn`]; useful for stateless transforms and test
/// fixtures.
pub struct FnProcessor<F>(F);

impl<F> Processor for FnProcessor<F>
where
    F: Fn(&ProcessorContext, Record) -> Result<()> + Send + Sync,
{
    fn process(&self, ctx: &ProcessorContext, record: Record) -> Result<()> {
        (self.0)(ctx, record)
    }
}

/// Wrap a closure as a [`Processor`].
pub fn processor_fn<F>(f: F) -> FnProcessor<F>
where
    F: Fn(&ProcessorContext, Record) -> Result<()> + Send + Sync,
{
    FnProcessor(f)
}

// Suppliers instantiate node processors at stream start, so every stream
// built from a topology (or from its clone) gets fresh instances. Sources
// and stores are handed out pre-split into their two trait facets to keep
// dispatch free of trait-object upcasts.
pub(crate) type ProcessorSupplier = Arc<dyn Fn() -> Arc<dyn Processor> + Send + Sync>;
pub(crate) type SourceInstance = (Arc<dyn Source>, Arc<dyn Processor>);
pub(crate) type SourceSupplier = Arc<dyn Fn() -> SourceInstance + Send + Sync>;
pub(crate) type StoreInstance = (Arc<dyn Store>, Arc<dyn Processor>);
pub(crate) type StoreSupplier = Arc<dyn Fn() -> StoreInstance + Send + Sync>;
