//! # rill stores
//!
//! State store backends for the rill stream processing engine.
//!
//! - [`memory`] — [`MemoryStore`](memory::MemoryStore), an ordered
//!   in-memory backend. Persistent backends plug in through the same
//!   [`Store`](rill_core::Store) contract.

pub mod memory;

pub use memory::MemoryStore;
