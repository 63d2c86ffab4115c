//! Reactive Runtime
//!
//! Two thread-local queues schedule deferred work.
//!
//! # How It Works
//!
//! 1. The [`FlushQueue`] batches computed observers. When a dependency of a
//!    computed property changes, the observer marks itself dirty and adds
//!    itself to the queue. If no flush is running, `add` drains the queue
//!    before returning; otherwise the item joins the running pass.
//!
//! 2. The task queue stands in for the event loop's microtask turn.
//!    Async-mode watchers enqueue their re-evaluation there, and the host
//!    drains it with [`Runtime::run_pending_tasks`] (the dirty-check loop
//!    does so after every poll).
//!
//! Both queues run items in insertion order, and both keep draining work
//! queued while they run.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::trace;

use super::subscriber::SubscriberId;

/// Work that can be batched on the [`FlushQueue`].
pub trait Flushable {
    fn flush_id(&self) -> SubscriberId;

    fn flush(&self);
}

/// Insertion-ordered set of pending flushes.
pub struct FlushQueue {
    flushing: Cell<bool>,
    items: RefCell<IndexMap<SubscriberId, Rc<dyn Flushable>>>,
}

thread_local! {
    static FLUSH_QUEUE: Rc<FlushQueue> = Rc::new(FlushQueue {
        flushing: Cell::new(false),
        items: RefCell::new(IndexMap::new()),
    });

    static TASKS: RefCell<VecDeque<Box<dyn FnOnce()>>> = RefCell::new(VecDeque::new());
}

impl FlushQueue {
    /// The queue of the current thread.
    pub fn instance() -> Rc<FlushQueue> {
        FLUSH_QUEUE.with(Rc::clone)
    }

    /// Queue `item` unless it is already pending, then drain if idle.
    pub fn add(&self, item: Rc<dyn Flushable>) {
        self.items.borrow_mut().entry(item.flush_id()).or_insert(item);
        if !self.flushing.get() {
            self.drain();
        }
    }

    fn drain(&self) {
        let _flushing = FlagGuard::set(&self.flushing);
        let mut flushed = 0usize;
        loop {
            let next = self.items.borrow_mut().shift_remove_index(0).map(|(_, item)| item);
            match next {
                Some(item) => {
                    item.flush();
                    flushed += 1;
                }
                None => break,
            }
        }
        trace!(flushed, "flush queue drained");
    }

    pub fn count(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_flushing(&self) -> bool {
        self.flushing.get()
    }
}

/// Sets a flag for the guard's lifetime and clears it on drop, even when
/// unwinding.
pub(crate) struct FlagGuard<'a> {
    flag: &'a Cell<bool>,
}

impl<'a> FlagGuard<'a> {
    pub(crate) fn set(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self { flag }
    }
}

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.flag.set(false);
    }
}

/// Entry points of the deferred task queue.
pub struct Runtime;

impl Runtime {
    /// Defer `task` to the next [`run_pending_tasks`](Self::run_pending_tasks).
    pub fn queue_task<F>(task: F)
    where
        F: FnOnce() + 'static,
    {
        TASKS.with(|tasks| tasks.borrow_mut().push_back(Box::new(task)));
    }

    /// Run queued tasks until the queue is empty, including tasks queued by
    /// the tasks themselves. Returns how many ran.
    pub fn run_pending_tasks() -> usize {
        let mut ran = 0;
        while let Some(task) = TASKS.with(|tasks| tasks.borrow_mut().pop_front()) {
            task();
            ran += 1;
        }
        if ran > 0 {
            trace!(ran, "pending tasks ran");
        }
        ran
    }

    pub fn pending_task_count() -> usize {
        TASKS.with(|tasks| tasks.borrow().len())
    }
}

// ---- Tests ----
