//! The topology: an acyclic graph of sources, processors, sinks and stores.
//!
//! A source consumes data from an external system and forwards records to
//! its successors. A processor receives records from upstream nodes,
//! transforms them, and optionally forwards new records downstream. A sink
//! terminates a path. A store holds keyed state reachable from any
//! processor in the stream.
//!
//! Construction is append-only and single-producer: every named
//! predecessor must already be registered, which makes cycles
//! unrepresentable. The built topology is read-only once handed to a
//! [`Stream`](crate::Stream).

use std::collections::HashMap;
use std::fmt;
use std::fmt::Write as _;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::api::{
    Processor, ProcessorSupplier, Source, SourceSupplier, StoreInstance, StoreSupplier,
};
use crate::context::ProcessorContext;
use crate::error::{Error, Result};
use crate::record::Record;
use crate::store::Store;

/// Index of a node within its topology.
pub type NodeId = usize;

/// Role of a node in the topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NodeType {
    Source,
    Processor,
    Sink,
    Store,
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeType::Source => f.write_str("source"),
            NodeType::Processor => f.write_str("processor"),
            NodeType::Sink => f.write_str("sink"),
            NodeType::Store => f.write_str("store"),
        }
    }
}

// Shared cell holding the store instance for a store node. Topology clones
// share the cell, so every stream built from any clone sees the same store
// state; the first stream to start instantiates it.
pub(crate) type StoreCell = Arc<Mutex<Option<StoreInstance>>>;

#[derive(Clone)]
pub(crate) enum Supplier {
    Source(SourceSupplier),
    Processor(ProcessorSupplier),
    Store { supplier: StoreSupplier, cell: StoreCell },
}

/// A vertex of the topology.
#[derive(Clone)]
pub struct Node {
    pub(crate) name: String,
    pub(crate) node_type: NodeType,
    pub(crate) supplier: Supplier,
    pub(crate) successors: Vec<NodeId>,
    pub(crate) predecessors: Vec<NodeId>,
}

impl Node {
    /// Node name, unique within its topology.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Node role.
    pub fn node_type(&self) -> NodeType {
        self.node_type
    }

    /// Ids of this node's successors, in declaration order.
    pub fn successors(&self) -> &[NodeId] {
        &self.successors
    }

    /// Ids of this node's predecessors.
    pub fn predecessors(&self) -> &[NodeId] {
        &self.predecessors
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("type", &self.node_type)
            .field("successors", &self.successors)
            .field("predecessors", &self.predecessors)
            .finish()
    }
}

/// An acyclic graph of named nodes, built incrementally.
///
/// Cloning a topology re-registers sources, processors and sinks with
/// their suppliers — each clone gets fresh processor instances at the next
/// stream start — while store nodes are shared with the clone, since they
/// carry state.
#[derive(Clone, Default)]
pub struct Topology {
    pub(crate) nodes: Vec<Node>,
    pub(crate) roots: Vec<NodeId>,
    pub(crate) stores: HashMap<String, NodeId>,
}

impl Topology {
    /// Create an empty topology.
    pub fn new() -> Topology {
        Topology::default()
    }

    /// Nodes in registration order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Source node ids.
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Add a source. Sources have no predecessors and must end up with at
    /// least one successor by the time the topology is validated.
    pub fn add_source<S, F>(&mut self, name: &str, supplier: F) -> Result<()>
    where
        S: Source + 'static,
        F: Fn() -> S + Send + Sync + 'static,
    {
        let supplier: SourceSupplier = Arc::new(move || {
            let instance = Arc::new(supplier());
            (
                instance.clone() as Arc<dyn Source>,
                instance as Arc<dyn Processor>,
            )
        });
        self.add_node(name, NodeType::Source, Supplier::Source(supplier), &[])
    }

    /// Add a processor downstream of the given predecessors.
    pub fn add_processor<P, F>(
        &mut self,
        name: &str,
        supplier: F,
        predecessors: &[&str],
    ) -> Result<()>
    where
        P: Processor + 'static,
        F: Fn() -> P + Send + Sync + 'static,
    {
        let supplier: ProcessorSupplier =
            Arc::new(move || Arc::new(supplier()) as Arc<dyn Processor>);
        self.add_node(
            name,
            NodeType::Processor,
            Supplier::Processor(supplier),
            predecessors,
        )
    }

    /// Add a processor backed by a plain closure.
    pub fn add_processor_fn<F>(
        &mut self,
        name: &str,
        process: F,
        predecessors: &[&str],
    ) -> Result<()>
    where
        F: Fn(&ProcessorContext, Record) -> Result<()> + Clone + Send + Sync + 'static,
    {
        self.add_processor(name, move || crate::api::processor_fn(process.clone()), predecessors)
    }

    /// Add a sink downstream of the given predecessors. Sinks terminate a
    /// path: they cannot forward and cannot be named as a predecessor.
    pub fn add_sink<P, F>(&mut self, name: &str, supplier: F, predecessors: &[&str]) -> Result<()>
    where
        P: Processor + 'static,
        F: Fn() -> P + Send + Sync + 'static,
    {
        let supplier: ProcessorSupplier =
            Arc::new(move || Arc::new(supplier()) as Arc<dyn Processor>);
        self.add_node(
            name,
            NodeType::Sink,
            Supplier::Processor(supplier),
            predecessors,
        )
    }

    /// Add a sink backed by a plain closure.
    pub fn add_sink_fn<F>(&mut self, name: &str, process: F, predecessors: &[&str]) -> Result<()>
    where
        F: Fn(&ProcessorContext, Record) -> Result<()> + Clone + Send + Sync + 'static,
    {
        self.add_sink(name, move || crate::api::processor_fn(process.clone()), predecessors)
    }

    /// Add a state store, reachable from any processor through
    /// [`ProcessorContext::store`](crate::ProcessorContext::store).
    pub fn add_store<S, F>(&mut self, name: &str, supplier: F) -> Result<()>
    where
        S: Store + 'static,
        F: Fn() -> S + Send + Sync + 'static,
    {
        let supplier: StoreSupplier = Arc::new(move || {
            let instance = Arc::new(supplier());
            (
                instance.clone() as Arc<dyn Store>,
                instance as Arc<dyn Processor>,
            )
        });
        self.add_node(
            name,
            NodeType::Store,
            Supplier::Store {
                supplier,
                cell: Arc::new(Mutex::new(None)),
            },
            &[],
        )
    }

    /// Check build-completion invariants. Called by
    /// [`Stream::new`](crate::Stream::new); cheap to call directly.
    pub fn validate(&self) -> Result<()> {
        for &root in &self.roots {
            if self.nodes[root].successors.is_empty() {
                return Err(Error::InvalidTopology(format!(
                    "source {} has no successors",
                    self.nodes[root].name
                )));
            }
        }
        Ok(())
    }

    /// DOT representation of the topology.
    pub fn dot_graph(&self) -> String {
        let mut graph = String::from("digraph Topology {\nrankdir=LR;\n");
        for node in &self.nodes {
            for &successor in &node.successors {
                let _ = writeln!(graph, "\"{}\" -> \"{}\"", node.name, self.nodes[successor].name);
            }
        }
        graph.push_str("}\n");
        graph
    }

    /// Id of the node with the given name.
    pub fn get(&self, name: &str) -> Option<NodeId> {
        self.nodes.iter().position(|n| n.name == name)
    }

    fn add_node(
        &mut self,
        name: &str,
        node_type: NodeType,
        supplier: Supplier,
        predecessors: &[&str],
    ) -> Result<()> {
        if name.is_empty() {
            return Err(Error::EmptyName);
        }

        if self.get(name).is_some() {
            return Err(Error::InvalidTopology(format!("duplicate node name {name}")));
        }

        if matches!(node_type, NodeType::Processor | NodeType::Sink) && predecessors.is_empty() {
            return Err(Error::InvalidTopology(format!(
                "{node_type} {name} has no predecessors"
            )));
        }

        // Resolve all predecessors before touching the graph, so a failed
        // add leaves the builder unchanged.
        let mut predecessor_ids = Vec::with_capacity(predecessors.len());
        for &predecessor in predecessors {
            if predecessor == name {
                return Err(Error::InvalidTopology(format!("{name} cannot succeed itself")));
            }

            let id = self
                .get(predecessor)
                .ok_or_else(|| Error::PredecessorNotFound(predecessor.to_string()))?;

            if self.nodes[id].node_type == NodeType::Sink {
                return Err(Error::InvalidTopology(format!(
                    "sink {predecessor} cannot have successors"
                )));
            }

            predecessor_ids.push(id);
        }

        let id = self.nodes.len();
        for &predecessor in &predecessor_ids {
            self.nodes[predecessor].successors.push(id);
        }

        self.nodes.push(Node {
            name: name.to_string(),
            node_type,
            supplier,
            successors: Vec::new(),
            predecessors: predecessor_ids,
        });

        match node_type {
            NodeType::Source => self.roots.push(id),
            NodeType::Store => {
                self.stores.insert(name.to_string(), id);
            }
            _ => {}
        }

        Ok(())
    }
}

impl fmt::Debug for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Topology")
            .field("nodes", &self.nodes)
            .field("roots", &self.roots)
            .finish()
    }
}

#[cfg(test)]
#[path = "tests/topology_tests.rs"]
mod tests;
