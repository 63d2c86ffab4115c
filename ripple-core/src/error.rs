//! Error types.
//!
//! Only programmer misuse is reported through these types. Failures inside
//! user-supplied computations are panics that unwind through the engine;
//! see [`WatcherContext`](crate::reactive::WatcherContext) for how the
//! watcher stack survives them.

use thiserror::Error;

use crate::reactive::SubscriberId;

/// Misuse of the observation engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObservationError {
    /// `enter_watcher` was called with the watcher that is already current.
    #[error("watcher {0:?} is already the current watcher")]
    WatcherAlreadyCurrent(SubscriberId),

    /// `exit_watcher` was called with a watcher that is not current.
    #[error("cannot exit watcher {expected:?}: current watcher is {actual:?}")]
    WatcherMismatch {
        expected: SubscriberId,
        actual: Option<SubscriberId>,
    },

    /// A value was assigned to an accessor property without a setter.
    #[error("readonly property: {0}")]
    ReadonlyProperty(String),
}

/// Failure to load an [`ObservationConfig`](crate::config::ObservationConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid observation config: {0}")]
    Parse(#[from] serde_json::Error),
}
