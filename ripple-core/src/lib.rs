//! Ripple Core
//!
//! A reactive observation engine. It lets code subscribe to changes of
//! object properties, array lengths and indices, map and set sizes, and the
//! results of arbitrary computations, with dependencies discovered
//! automatically while the computation runs.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `value`: the observable data model (objects, arrays, maps, sets)
//! - `proxy`: tracking handles that report reads to the current watcher
//! - `reactive`: subscriber records, the watcher stack and the task queues
//! - `observer`: per-property and per-collection observers and the locator
//!   that picks between them
//! - `watcher`: computed and expression watchers that re-run on change
//! - `expression`: evaluation of pre-parsed expressions against a scope
//! - `config`: runtime settings loaded from JSON
//!
//! # Example
//!
//! ```rust,ignore
//! use ripple_core::prelude::*;
//!
//! let locator = ObserverLocator::default();
//! let todo = ObjectRef::from_entries([("title", "write docs"), ("done", false)]);
//!
//! let watcher = ComputedWatcher::new(
//!     todo.clone(),
//!     &locator,
//!     |t, _| t.get_member("done"),
//!     |done, _, _| println!("done: {done}"),
//!     FlushMode::Sync,
//! );
//! watcher.bind();
//!
//! todo.set("done", true)?;
//! // prints "done: true"
//! ```

pub mod config;
pub mod error;
pub mod expression;
pub mod observer;
pub mod proxy;
pub mod reactive;
pub mod value;
pub mod watcher;

pub use config::{DirtyCheckSettings, FlushMode, ObservationConfig};
pub use error::{ConfigError, ObservationError};

/// Everything needed for everyday use.
pub mod prelude {
    pub use crate::config::{FlushMode, ObservationConfig};
    pub use crate::expression::{BinaryOp, Expression, Scope, UnaryOp};
    pub use crate::observer::{Observable, ObserverLocator, PropertyObserver};
    pub use crate::proxy::{get_proxy_or_self, get_raw_or_self, Proxied};
    pub use crate::reactive::{Runtime, Watcher};
    pub use crate::value::{Accessor, ArrayRef, MapRef, ObjectRef, SetRef, Value};
    pub use crate::watcher::{ComputedWatcher, ExpressionWatcher};
}
