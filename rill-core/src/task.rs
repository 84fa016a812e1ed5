//! Per-node task layer: buffered fan-out with per-key ordering.
//!
//! Every source or non-terminal processor owns a pool of task slots. A
//! slot is a bounded record channel paired with exactly one worker thread;
//! the number of slots is the node's scale and may change at runtime.
//!
//! Dispatch routes a record to `slot = jump_consistent_hash(record.id,
//! scale)`. The id is a deterministic function of the key bytes, so for
//! any fixed scale all records sharing a key land in the same slot, and a
//! slot is drained FIFO by a single worker — records sharing a key are
//! processed in submission order. A scale change may reorder same-key
//! records that are in flight across the change; that is the documented
//! cost of dynamic scaling.
//!
//! At scale 0 the pool is disabled and forwards run inline on the calling
//! thread. A full buffer blocks the dispatcher — backpressure by channel
//! capacity.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Sender};
use parking_lot::{Mutex, RwLock};

use crate::error::Result;
use crate::partitioner::jump_consistent_hash;
use crate::record::Record;
use crate::stream::StreamCore;
use crate::topology::NodeId;

/// Default capacity of one task buffer.
pub(crate) const DEFAULT_BUFFER_SIZE: u64 = 1024;
/// Default scale applied to pooled nodes at stream start.
pub(crate) const DEFAULT_TASK_COUNT: u64 = 1;

/// Buffered task slots of one node. Readers of the slot list are
/// dispatchers (the hot path); the only writer is the scaler.
pub(crate) struct TaskPool {
    buffers: RwLock<Vec<Sender<Record>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskPool {
    pub(crate) fn new() -> TaskPool {
        TaskPool {
            buffers: RwLock::new(Vec::new()),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Current number of task slots.
    pub(crate) fn scale(&self) -> usize {
        self.buffers.read().len()
    }

    /// Records currently queued across all slots.
    pub(crate) fn buffered(&self) -> usize {
        self.buffers.read().iter().map(|b| b.len()).sum()
    }

    #[cfg(test)]
    pub(crate) fn worker_count(&self) -> usize {
        self.workers.lock().len()
    }
}

/// Dispatch a record forwarded by `node`: enqueue it onto the slot owning
/// the record's key, or run the forward inline when the node has no tasks.
pub(crate) fn forward_from(core: &Arc<StreamCore>, node: NodeId, record: Record) {
    let mut record = Some(record);

    {
        let buffers = core.nodes[node].pool.buffers.read();
        if !buffers.is_empty() {
            let taken = record.take().expect("record present");
            let slot = jump_consistent_hash(taken.id, buffers.len());
            match buffers[slot].send(taken) {
                Ok(()) => return,
                // The slot's worker died; recover the record and degrade
                // to an inline forward.
                Err(send_error) => record = Some(send_error.0),
            }
        }
    }

    if let Some(record) = record {
        forward_inline(core, node, record);
    }
}

/// Invoke `process` on every successor of `node`, in declaration order,
/// bracketing each call with the successor context's activation. A
/// processor error is routed to the stream error handler together with the
/// record; dispatch continues with the next successor.
pub(crate) fn forward_inline(core: &Arc<StreamCore>, node: NodeId, record: Record) {
    for &successor in &core.nodes[node].successors {
        let target = &core.nodes[successor];
        let Some(processor) = target.instance.get() else {
            continue;
        };

        target.context.activate();
        let outcome = processor.process(&target.context, record.clone());
        target.context.deactivate();

        if let Err(error) = outcome {
            core.emit_error(successor, error, vec![record.clone()]);
        }
    }
}

/// Grow or shrink the node's task slots to `target`.
///
/// Growth allocates bounded channels of the configured size and spawns one
/// worker per new slot. Shrinking detaches the tail slots; their workers
/// finish the records already queued and exit — the scaler does not wait.
pub(crate) fn set_scale(core: &Arc<StreamCore>, node: NodeId, target: usize) -> Result<()> {
    let runtime_node = &core.nodes[node];
    let mut buffers = runtime_node.pool.buffers.write();
    let current = buffers.len();

    if target > current {
        let buffer_size = core
            .config
            .get(&[runtime_node.name.as_str(), "tasks", "buffer_size"])
            .uint(DEFAULT_BUFFER_SIZE) as usize;

        let mut workers = runtime_node.pool.workers.lock();
        for slot in current..target {
            let (sender, receiver) = bounded::<Record>(buffer_size);
            buffers.push(sender);

            let worker_core = Arc::clone(core);
            let handle = thread::Builder::new()
                .name(format!("{}-task-{slot}", runtime_node.name))
                .spawn(move || {
                    // Exits once the slot is detached and drained.
                    for record in receiver {
                        forward_inline(&worker_core, node, record);
                    }
                })
                .map_err(anyhow::Error::from)?;
            workers.push(handle);
        }
    } else if target < current {
        buffers.truncate(target);
    }

    tracing::debug!(
        node = runtime_node.name.as_str(),
        from = current,
        to = target,
        "scaled tasks"
    );
    Ok(())
}

/// Quiesce the node's task layer during close: wait for the buffers to
/// empty (bounded by the stream close timeout), detach every slot, and
/// join the workers. Workers drain whatever is still queued in their slot
/// before exiting, so after this returns no task worker of `node` remains
/// scheduled.
pub(crate) fn drain(core: &Arc<StreamCore>, node: NodeId, timeout: Duration) {
    let runtime_node = &core.nodes[node];

    let deadline = Instant::now() + timeout;
    loop {
        let pending = runtime_node.pool.buffered();
        if pending == 0 {
            break;
        }
        if Instant::now() >= deadline {
            tracing::warn!(
                node = runtime_node.name.as_str(),
                pending,
                timeout_ms = timeout.as_millis() as u64,
                "closing task layer with records still buffered"
            );
            break;
        }
        thread::sleep(Duration::from_millis(1));
    }

    let _ = set_scale(core, node, 0);

    let workers: Vec<JoinHandle<()>> = runtime_node.pool.workers.lock().drain(..).collect();
    for worker in workers {
        let _ = worker.join();
    }
}

#[cfg(test)]
#[path = "tests/task_tests.rs"]
mod tests;
