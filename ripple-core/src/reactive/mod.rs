//! Reactive Plumbing
//!
//! This module holds the machinery shared by observers and watchers: who is
//! subscribed to what, which computation is currently running, and when
//! deferred work runs.
//!
//! # Concepts
//!
//! ## Subscribers
//!
//! A [`Subscriber`] is a weak, tagged handle to something that reacts to
//! property changes, collection changes, or both. Observers keep them in a
//! [`SubscriberRecord`], which notifies in registration order.
//!
//! ## The Watcher Stack
//!
//! While a computation runs it is the *current watcher*. Proxy reads report
//! to it, and it subscribes itself to the observers behind those reads.
//! Nested computations suspend and resume the outer one.
//!
//! ## Scheduling
//!
//! Computed observers batch through the [`FlushQueue`]; async watchers
//! defer to the task queue drained by [`Runtime::run_pending_tasks`].
//!
//! # Implementation Notes
//!
//! All state is thread-local and single-threaded (`Rc`, `RefCell`). This
//! mirrors an event-loop host: mutation, notification and re-evaluation all
//! happen on one thread, and nothing here is `Send`.

mod context;
mod dependency;
mod runtime;
mod subscriber;

pub use context::{
    current_watcher, enter_watcher, exit_watcher, is_watching, pause_watching, resume_watching,
    stack_depth, untracked, Watcher, WatcherContext,
};
pub use runtime::{FlushQueue, Flushable, Runtime};
pub use subscriber::{
    CollectionSubscriber, FnSubscriber, PropertySubscriber, Subscriber, SubscriberId,
    SubscriberRecord,
};

pub(crate) use dependency::DependencyRecord;
pub(crate) use runtime::FlagGuard;
