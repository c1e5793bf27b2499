//! Deferred teardown queue.
//!
//! The render thread may still hold a render plan (and through it, nodes)
//! after the control thread has removed them from a graph. Anything removed
//! is therefore pushed here instead of being dropped in place, and a
//! non-real-time thread drains the queue periodically. Items still referenced
//! elsewhere are put back for the next drain.

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::graph::Node;

/// Something whose last owner should be the deferred queue.
pub trait Retained: Send {
    /// True once no other owner remains.
    fn is_unique(&self) -> bool;
}

impl<T: ?Sized + Send + Sync> Retained for Arc<T> {
    fn is_unique(&self) -> bool {
        Arc::strong_count(self) == 1
    }
}

/// A unit of deferred work.
pub enum DeferredTask {
    /// Close the editor of a removed node, then release the node.
    CloseEditor(Arc<Node>),
    /// Drop the item once nothing else holds it.
    Release(Box<dyn Retained>),
}

impl core::fmt::Debug for DeferredTask {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::CloseEditor(node) => write!(f, "CloseEditor({})", node.id()),
            Self::Release(_) => write!(f, "Release(..)"),
        }
    }
}

/// Counts from one [`DeferredQueue::drain`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Editors closed.
    pub editors_closed: usize,
    /// Items dropped.
    pub released: usize,
    /// Items still referenced and re-queued.
    pub retained: usize,
}

/// Multi-producer queue of [`DeferredTask`]s.
#[derive(Debug)]
pub struct DeferredQueue {
    tx: Sender<DeferredTask>,
    rx: Receiver<DeferredTask>,
}

impl DeferredQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// Queues a task.
    pub fn push(&self, task: DeferredTask) {
        // Both ends live in `self`, so the channel cannot be disconnected.
        let _ = self.tx.send(task);
    }

    /// Queues an `Arc` to be dropped once it is the last reference.
    pub fn release<T: ?Sized + Send + Sync + 'static>(&self, item: Arc<T>) {
        self.push(DeferredTask::Release(Box::new(item)));
    }

    /// Queues an editor close for a removed node.
    pub fn close_editor(&self, node: Arc<Node>) {
        self.push(DeferredTask::CloseEditor(node));
    }

    /// Number of pending tasks.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// True when nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Runs every pending task once. Call from a non-real-time thread.
    pub fn drain(&self) -> DrainReport {
        let pending: Vec<DeferredTask> = self.rx.try_iter().collect();
        let mut report = DrainReport::default();

        for task in pending {
            let item: Box<dyn Retained> = match task {
                DeferredTask::CloseEditor(node) => {
                    node.with_unit(|unit| unit.close_editor());
                    report.editors_closed += 1;
                    Box::new(node)
                }
                DeferredTask::Release(item) => item,
            };
            if item.is_unique() {
                drop(item);
                report.released += 1;
            } else {
                self.push(DeferredTask::Release(item));
                report.retained += 1;
            }
        }

        #[cfg(feature = "tracing")]
        {
            if report != DrainReport::default() {
                tracing::debug!(
                    "deferred_drain: {} editors closed, {} released, {} retained",
                    report.editors_closed,
                    report.released,
                    report.retained
                );
            }
        }

        report
    }
}

impl Default for DeferredQueue {
    fn default() -> Self {
        Self::new()
    }
}
