//! Per-node execution context.
//!
//! A [`ProcessorContext`] is the capability handle a processor sees: it
//! gates forwarding, reaches the stream's stores, and signals errors to the
//! stream-level handler. Contexts are created by the stream, one per node,
//! and live from start to close.
//!
//! The activation counter is the heart of the shutdown protocol: a
//! non-source node is active precisely while a predecessor is mid-`process`
//! on it, so `Stream::close` can wait for `is_active` to drop before
//! releasing user resources. Forwarding is only permitted between an
//! `activate`/`deactivate` pair on the same context — the engine brackets
//! every `process` call, and source contexts stay activated for the whole
//! of `consume`.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::record::Record;
use crate::store::Store;
use crate::stream::StreamCore;
use crate::topology::{NodeId, NodeType};

/// Error event delivered to the stream error handler.
#[derive(Debug)]
pub struct StreamError {
    /// Name of the node that raised the error.
    pub node: String,
    /// The error itself.
    pub error: Error,
    /// Records involved, if any.
    pub records: Vec<Record>,
}

/// Stream-level error callback. Invoked synchronously on the worker that
/// raised the error; it must not block.
pub type ErrorHandler = Box<dyn Fn(StreamError) + Send + Sync>;

/// Execution context of a single node within a stream.
pub struct ProcessorContext {
    pub(crate) node: NodeId,
    pub(crate) node_name: String,
    pub(crate) node_type: NodeType,
    pub(crate) stream_name: String,
    pub(crate) stream: Weak<StreamCore>,
    pub(crate) activations: AtomicU32,
}

impl ProcessorContext {
    /// Name of the node this context belongs to.
    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    /// Name of the owning stream.
    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    /// The stream configuration.
    pub fn config(&self) -> Config {
        self.core()
            .map(|core| core.config.clone())
            .unwrap_or_default()
    }

    /// The store registered under `name`.
    pub fn store(&self, name: &str) -> Result<Arc<dyn Store>> {
        let core = self.core().ok_or(Error::StreamClosed)?;
        let stores = core.stores.read();
        stores
            .get(name)
            .cloned()
            .ok_or_else(|| Error::StoreNotFound(name.to_string()))
    }

    /// Whether this context may currently forward records.
    pub fn is_active(&self) -> bool {
        self.activations.load(Ordering::Acquire) > 0
    }

    /// Forward the record to this node's successors through its task
    /// layer. May be called multiple times within one `process` call to
    /// emit correlated records.
    ///
    /// Fails with [`Error::InvalidForward`] when the context is inactive,
    /// the node is a sink, or the node has no successors; the record is
    /// not enqueued in that case. Blocks while the target task buffer is
    /// full.
    pub fn forward(&self, record: Record) -> Result<()> {
        let core = self.core().ok_or(Error::StreamClosed)?;

        if !self.is_active()
            || self.node_type == NodeType::Sink
            || core.nodes[self.node].successors.is_empty()
        {
            return Err(Error::InvalidForward(self.node_name.clone()));
        }

        crate::task::forward_from(&core, self.node, record);
        Ok(())
    }

    /// Forward the record directly to the named node, bypassing the task
    /// layer and ignoring predecessor relationships. The target's
    /// `process` runs inline on the calling thread. Intended for
    /// out-of-band routing such as dead-letter handling.
    pub fn forward_to(&self, to: &str, record: Record) -> Result<()> {
        if !self.is_active() {
            return Err(Error::InvalidForward(self.node_name.clone()));
        }
        let core = self.core().ok_or(Error::StreamClosed)?;
        core.forward_to(to, record)
    }

    /// Emit an error event to the stream error handler. A no-op when the
    /// stream has no handler. Never blocks, provided the handler honors
    /// its contract.
    pub fn error(&self, error: Error, records: Vec<Record>) {
        if let Some(core) = self.core() {
            core.emit_error(self.node, error, records);
        }
    }

    pub(crate) fn activate(&self) {
        self.activations.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn deactivate(&self) {
        self.activations.fetch_sub(1, Ordering::AcqRel);
    }

    fn core(&self) -> Option<Arc<StreamCore>> {
        self.stream.upgrade()
    }
}
