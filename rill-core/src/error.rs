//! Error kinds raised by the topology builder, the stream lifecycle and the
//! processor context.

use thiserror::Error;

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by rill.
///
/// Build-time and start-time errors abort their operation and are returned
/// to the caller. Runtime errors inside `process` are delivered to the
/// stream error handler and never terminate the stream by themselves.
#[derive(Debug, Error)]
pub enum Error {
    /// A node was added with an empty name.
    #[error("name cannot be empty")]
    EmptyName,

    /// The construction sequence violates a topology invariant.
    #[error("invalid topology: {0}")]
    InvalidTopology(String),

    /// A named predecessor was not yet registered in the topology.
    #[error("predecessor not found: {0}")]
    PredecessorNotFound(String),

    /// A node supplier does not match the declared node type.
    #[error("invalid node type for {0}")]
    InvalidNodeType(String),

    /// `ProcessorContext::store` was called with an unknown store name.
    #[error("store not found: {0}")]
    StoreNotFound(String),

    /// Forward from an inactive context, a sink, or a node without
    /// successors.
    #[error("invalid forward from {0}")]
    InvalidForward(String),

    /// `forward_to` targeted a node that does not exist in the stream.
    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// Store lookup miss.
    #[error("key not found")]
    KeyNotFound,

    /// Operation on a stream that has already been closed.
    #[error("stream already closed")]
    StreamClosed,

    /// `start` called on a stream that is already running.
    #[error("stream already started")]
    AlreadyStarted,

    /// Scale request for a node that has no task layer (a sink or a node
    /// without successors).
    #[error("{node} cannot be scaled")]
    InvalidScale { node: String },

    /// A processor or store failed its `init` hook; `Stream::start` aborts.
    #[error("init of {node} failed: {source}")]
    Init {
        node: String,
        #[source]
        source: Box<Error>,
    },

    /// One or more `close` hooks failed. Closing continues past failures
    /// and the collected reasons are returned together.
    #[error("close failed: {}", .failures.join("; "))]
    Close { failures: Vec<String> },

    /// Any other error bubbled out of user code.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
