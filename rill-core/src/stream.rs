//! Stream orchestration: lifecycle, source driving and graceful shutdown.
//!
//! A [`Stream`] binds a validated [`Topology`] to running state: one
//! processor instance, one context and one task pool per node. Ownership
//! flows strictly downward — the stream core owns nodes, contexts and
//! pools, and contexts reach back through a non-owning `Weak` reference —
//! so the Node → Context → Stream → Node cycle never owns itself.
//!
//! Start order: stores, then non-source processors and sinks, then the
//! configured task scales, and sources last, each on its own consume
//! thread. Stores must be openable before the processors that reference
//! them, and sources must not emit before every downstream target is
//! ready.
//!
//! Close is a three-phase quiesce. Sources are closed and their buffers
//! drained first, so production stops; each remaining processor is then
//! waited inactive — the activation counter proves no predecessor is
//! mid-`process` on it — closed once, and drained; sinks and stores go
//! last. Close failures are collected and returned together while closing
//! continues.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::atomic::AtomicU32;
use std::sync::{Arc, OnceLock, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use crate::api::Processor;
use crate::config::Config;
use crate::context::{ErrorHandler, ProcessorContext, StreamError};
use crate::error::{Error, Result};
use crate::record::Record;
use crate::store::Store;
use crate::task::{self, TaskPool, DEFAULT_BUFFER_SIZE, DEFAULT_TASK_COUNT};
use crate::topology::{NodeId, NodeType, Supplier, Topology};

const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Snapshot of one source's task layer.
#[derive(Debug, Clone, Serialize)]
pub struct ContextInfo {
    pub name: String,
    pub scale: usize,
    pub buffer_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Idle,
    Running,
    Closed,
}

/// An unbounded, continuously updating data set: a topology bound to
/// running tasks. Sources, processors, sinks and stores must be safe for
/// concurrent use — one instance per node serves every task worker.
pub struct Stream {
    pub(crate) core: Arc<StreamCore>,
}

pub(crate) struct StreamCore {
    pub(crate) name: String,
    pub(crate) config: Config,
    pub(crate) nodes: Vec<RuntimeNode>,
    pub(crate) stores: RwLock<HashMap<String, Arc<dyn Store>>>,
    error_handler: Option<ErrorHandler>,
    lifecycle: Mutex<Lifecycle>,
    close_timeout: Duration,
}

pub(crate) struct RuntimeNode {
    pub(crate) name: String,
    pub(crate) node_type: NodeType,
    pub(crate) supplier: Supplier,
    pub(crate) successors: Vec<NodeId>,
    pub(crate) context: Arc<ProcessorContext>,
    pub(crate) instance: OnceLock<Arc<dyn Processor>>,
    pub(crate) source: OnceLock<Arc<dyn crate::api::Source>>,
    pub(crate) pool: TaskPool,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

impl Stream {
    /// Bind a topology to a new stream. Validates the topology; no
    /// processor is instantiated until [`start`](Stream::start).
    pub fn new(name: impl Into<String>, topology: Topology, config: Config) -> Result<Stream> {
        Stream::build(name.into(), topology, config, None)
    }

    /// Like [`new`](Stream::new), with a stream-level error handler that
    /// receives runtime processor errors. The handler runs synchronously
    /// on the worker that raised the error and must not block.
    pub fn with_error_handler(
        name: impl Into<String>,
        topology: Topology,
        config: Config,
        handler: impl Fn(StreamError) + Send + Sync + 'static,
    ) -> Result<Stream> {
        Stream::build(name.into(), topology, config, Some(Box::new(handler)))
    }

    fn build(
        name: String,
        topology: Topology,
        config: Config,
        error_handler: Option<ErrorHandler>,
    ) -> Result<Stream> {
        topology.validate()?;

        let close_timeout = config
            .get(&["close", "timeout_ms"])
            .duration_ms(DEFAULT_CLOSE_TIMEOUT);

        let core = Arc::new_cyclic(|weak: &Weak<StreamCore>| {
            let nodes = topology
                .nodes
                .iter()
                .enumerate()
                .map(|(id, node)| RuntimeNode {
                    name: node.name().to_string(),
                    node_type: node.node_type(),
                    supplier: node.supplier.clone(),
                    successors: node.successors().to_vec(),
                    context: Arc::new(ProcessorContext {
                        node: id,
                        node_name: node.name().to_string(),
                        node_type: node.node_type(),
                        stream_name: name.clone(),
                        stream: weak.clone(),
                        activations: AtomicU32::new(0),
                    }),
                    instance: OnceLock::new(),
                    source: OnceLock::new(),
                    pool: TaskPool::new(),
                    consumer: Mutex::new(None),
                })
                .collect();

            StreamCore {
                name,
                config,
                nodes,
                stores: RwLock::new(HashMap::new()),
                error_handler,
                lifecycle: Mutex::new(Lifecycle::Idle),
                close_timeout,
            }
        });

        Ok(Stream { core })
    }

    /// This stream's name.
    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// Initialize every node and begin consuming from the sources.
    ///
    /// Any failing `init` aborts the start and is returned; the partial
    /// state remains safe to [`close`](Stream::close).
    pub fn start(&self) -> Result<()> {
        let mut lifecycle = self.core.lifecycle.lock();
        match *lifecycle {
            Lifecycle::Closed => return Err(Error::StreamClosed),
            Lifecycle::Running => return Err(Error::AlreadyStarted),
            Lifecycle::Idle => {}
        }

        let core = &self.core;

        // Stores first: processors reference them from their own init.
        for node in &core.nodes {
            if node.node_type != NodeType::Store {
                continue;
            }
            let Supplier::Store { supplier, cell } = &node.supplier else {
                return Err(Error::InvalidNodeType(node.name.clone()));
            };

            let mut slot = cell.lock();
            let fresh = slot.is_none();
            let (store, processor) = slot.get_or_insert_with(|| supplier()).clone();
            drop(slot);

            let _ = node.instance.set(processor.clone());
            if fresh {
                processor.init(&node.context).map_err(|source| Error::Init {
                    node: node.name.clone(),
                    source: Box::new(source),
                })?;
            }
            core.stores.write().insert(node.name.clone(), store);
        }

        // Non-source processors and sinks.
        for node in &core.nodes {
            if !matches!(node.node_type, NodeType::Processor | NodeType::Sink) {
                continue;
            }
            let Supplier::Processor(supplier) = &node.supplier else {
                return Err(Error::InvalidNodeType(node.name.clone()));
            };

            let processor = supplier();
            let _ = node.instance.set(processor.clone());
            processor.init(&node.context).map_err(|source| Error::Init {
                node: node.name.clone(),
                source: Box::new(source),
            })?;
        }

        // Configured scales for every node that owns a task layer, before
        // the first record is produced.
        for id in 0..core.nodes.len() {
            let node = &core.nodes[id];
            if node.node_type == NodeType::Sink || node.successors.is_empty() {
                continue;
            }
            let count = core
                .config
                .get(&[node.name.as_str(), "tasks", "count"])
                .uint(DEFAULT_TASK_COUNT) as usize;
            task::set_scale(core, id, count)?;
        }

        // Sources last: initialize, activate for the lifetime of consume,
        // and drive each on its own thread.
        for id in 0..core.nodes.len() {
            let node = &core.nodes[id];
            if node.node_type != NodeType::Source {
                continue;
            }
            let Supplier::Source(supplier) = &node.supplier else {
                return Err(Error::InvalidNodeType(node.name.clone()));
            };

            let (source, processor) = supplier();
            let _ = node.instance.set(processor.clone());
            let _ = node.source.set(source);
            processor.init(&node.context).map_err(|source| Error::Init {
                node: node.name.clone(),
                source: Box::new(source),
            })?;

            node.context.activate();
            let consume_core = Arc::clone(core);
            let handle = thread::Builder::new()
                .name(format!("{}-source", node.name))
                .spawn(move || {
                    let node = &consume_core.nodes[id];
                    if let Some(source) = node.source.get() {
                        if let Err(error) = source.consume(&node.context) {
                            tracing::error!(
                                source = node.name.as_str(),
                                error = %error,
                                "source consume failed"
                            );
                            consume_core.emit_error(id, error, Vec::new());
                        }
                    }
                    node.context.deactivate();
                })
                .map_err(anyhow::Error::from)?;
            *node.consumer.lock() = Some(handle);
        }

        *lifecycle = Lifecycle::Running;
        Ok(())
    }

    /// Close the stream and release all resources.
    ///
    /// After this returns no task worker remains scheduled and no
    /// `process` call is in progress. Close failures from processors and
    /// stores are collected and returned together; closing always runs to
    /// completion.
    pub fn close(&self) -> Result<()> {
        let mut lifecycle = self.core.lifecycle.lock();
        if *lifecycle == Lifecycle::Closed {
            return Err(Error::StreamClosed);
        }
        *lifecycle = Lifecycle::Closed;

        let core = &self.core;
        let mut failures: Vec<String> = Vec::new();
        let mut fail = |name: &str, error: Error| {
            failures.push(format!("{name}: {error}"));
        };

        // Phase 1: stop the sources. Closing the instance tells consume to
        // return; joining the consume thread proves it has. Draining the
        // pool then flushes everything the source produced.
        for id in 0..core.nodes.len() {
            let node = &core.nodes[id];
            if node.node_type != NodeType::Source {
                continue;
            }
            if let Some(instance) = node.instance.get() {
                if let Err(error) = instance.close() {
                    fail(&node.name, error);
                }
            }
            if let Some(consumer) = node.consumer.lock().take() {
                let _ = consumer.join();
            }
            task::drain(core, id, core.close_timeout);
        }

        // Phase 2: processors, in registration order — predecessors always
        // precede their successors, so by the time a node is reached
        // nothing upstream can activate it again.
        for id in 0..core.nodes.len() {
            let node = &core.nodes[id];
            if node.node_type != NodeType::Processor {
                continue;
            }
            wait_inactive(&node.context);
            if let Some(instance) = node.instance.get() {
                if let Err(error) = instance.close() {
                    fail(&node.name, error);
                }
            }
            task::drain(core, id, core.close_timeout);
        }

        // Phase 3: sinks, then stores.
        for node in &core.nodes {
            if node.node_type != NodeType::Sink {
                continue;
            }
            wait_inactive(&node.context);
            if let Some(instance) = node.instance.get() {
                if let Err(error) = instance.close() {
                    fail(&node.name, error);
                }
            }
        }

        for node in &core.nodes {
            if node.node_type != NodeType::Store {
                continue;
            }
            wait_inactive(&node.context);
            if let Some(instance) = node.instance.get() {
                if let Err(error) = instance.close() {
                    fail(&node.name, error);
                }
            }
        }
        core.stores.write().clear();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Close { failures })
        }
    }

    /// Set the task scale of the named node. A scale of 0 disables the
    /// node's task layer (forwards run inline); a scale of 1 serializes
    /// the node but still buffers.
    pub fn scale(&self, name: &str, scale: usize) -> Result<()> {
        let lifecycle = self.core.lifecycle.lock();
        if *lifecycle == Lifecycle::Closed {
            return Err(Error::StreamClosed);
        }

        let id = self
            .core
            .node_id(name)
            .ok_or_else(|| Error::NodeNotFound(name.to_string()))?;
        let node = &self.core.nodes[id];
        if node.node_type == NodeType::Sink || node.successors.is_empty() {
            return Err(Error::InvalidScale {
                node: name.to_string(),
            });
        }

        task::set_scale(&self.core, id, scale)
    }

    /// Snapshot of the source task layers: name, current scale and
    /// configured buffer size.
    pub fn contexts(&self) -> Result<Vec<ContextInfo>> {
        let lifecycle = self.core.lifecycle.lock();
        if *lifecycle == Lifecycle::Closed {
            return Err(Error::StreamClosed);
        }

        Ok(self
            .core
            .nodes
            .iter()
            .filter(|node| node.node_type == NodeType::Source)
            .map(|node| ContextInfo {
                name: node.name.clone(),
                scale: node.pool.scale(),
                buffer_size: self
                    .core
                    .config
                    .get(&[node.name.as_str(), "tasks", "buffer_size"])
                    .uint(DEFAULT_BUFFER_SIZE) as usize,
            })
            .collect())
    }

    /// DOT representation of the stream's topology.
    pub fn dot_graph(&self) -> String {
        let mut graph = String::from("digraph Stream {\nrankdir=LR;\n");
        for node in &self.core.nodes {
            for &successor in &node.successors {
                let _ = writeln!(
                    graph,
                    "\"{}\" -> \"{}\"",
                    node.name, self.core.nodes[successor].name
                );
            }
        }
        graph.push_str("}\n");
        graph
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        let closed = { *self.core.lifecycle.lock() == Lifecycle::Closed };
        if !closed {
            let _ = self.close();
        }
    }
}

impl StreamCore {
    pub(crate) fn node_id(&self, name: &str) -> Option<NodeId> {
        self.nodes.iter().position(|node| node.name == name)
    }

    /// Inline delivery to an arbitrary node by name, the `forward_to` side
    /// channel.
    pub(crate) fn forward_to(&self, to: &str, record: Record) -> Result<()> {
        let id = self
            .node_id(to)
            .ok_or_else(|| Error::NodeNotFound(to.to_string()))?;
        let node = &self.nodes[id];
        let Some(processor) = node.instance.get() else {
            return Err(Error::NodeNotFound(to.to_string()));
        };

        node.context.activate();
        let outcome = processor.process(&node.context, record.clone());
        node.context.deactivate();

        if let Err(error) = outcome {
            self.emit_error(id, error, vec![record]);
        }
        Ok(())
    }

    pub(crate) fn emit_error(&self, node: NodeId, error: Error, records: Vec<Record>) {
        match &self.error_handler {
            Some(handler) => handler(StreamError {
                node: self.nodes[node].name.clone(),
                error,
                records,
            }),
            None => {
                tracing::debug!(
                    node = self.nodes[node].name.as_str(),
                    error = %error,
                    "unhandled processor error"
                );
            }
        }
    }
}

/// Cooperative wait until no predecessor is mid-`process` on the context.
fn wait_inactive(context: &ProcessorContext) {
    while context.is_active() {
        thread::yield_now();
    }
}

#[cfg(test)]
#[path = "tests/stream_tests.rs"]
mod tests;
