//! Watcher Stack
//!
//! The watcher stack tracks which computation is currently collecting
//! dependencies. Proxy reads consult it to find out whose evaluation they
//! happen inside.
//!
//! # Implementation
//!
//! A thread-local slot holds the current watcher; entering another watcher
//! suspends the current one onto a stack, exiting resumes it. This supports
//! nested computations (a computed property reading another computed
//! property).
//!
//! Watching can be paused while the engine runs user code that must not
//! become a dependency of the current computation: watcher callbacks and
//! polled getters. Pauses nest: each `pause_watching` must be matched by a
//! `resume_watching`. A pause belongs to the computation it was taken in;
//! entering a watcher starts unpaused and exiting it restores the outer
//! pause depth. The engine's own bookkeeping reads use untracked raw
//! accessors instead and never touch the stack.
//!
//! Evaluations should go through [`WatcherContext`], which exits the
//! watcher when dropped, including while a panic unwinds.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::error;

use super::SubscriberId;
use crate::error::ObservationError;
use crate::value::Value;

/// A computation that collects dependencies while it is current.
pub trait Watcher {
    fn watcher_id(&self) -> SubscriberId;

    /// Record a dependency on `key` of the raw `target`.
    fn observe(&self, target: &Value, key: &str);

    /// Record a dependency on the contents of the raw `collection`.
    fn observe_collection(&self, collection: &Value);
}

#[derive(Default)]
struct WatcherStack {
    current: Option<Rc<dyn Watcher>>,
    suspended: Vec<Rc<dyn Watcher>>,
    paused: usize,
    /// Pause depth of each enclosing level, restored on exit.
    outer_pauses: Vec<usize>,
}

thread_local! {
    static WATCHER_STACK: RefCell<WatcherStack> = RefCell::new(WatcherStack::default());
}

/// The watcher presently collecting dependencies, if any.
pub fn current_watcher() -> Option<Rc<dyn Watcher>> {
    WATCHER_STACK.with(|stack| stack.borrow().current.clone())
}

/// Make `watcher` current, suspending the previous one.
///
/// Fails if `watcher` is already current.
pub fn enter_watcher(watcher: Rc<dyn Watcher>) -> Result<(), ObservationError> {
    WATCHER_STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        if let Some(current) = &stack.current {
            if current.watcher_id() == watcher.watcher_id() {
                return Err(ObservationError::WatcherAlreadyCurrent(watcher.watcher_id()));
            }
        }
        if let Some(previous) = stack.current.replace(watcher) {
            stack.suspended.push(previous);
        }
        let paused = std::mem::take(&mut stack.paused);
        stack.outer_pauses.push(paused);
        Ok(())
    })
}

/// Exit `watcher` and resume the one it suspended.
///
/// Fails if `watcher` is not current.
pub fn exit_watcher(watcher: &dyn Watcher) -> Result<(), ObservationError> {
    let exited = WATCHER_STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        let actual = stack.current.as_ref().map(|w| w.watcher_id());
        if actual != Some(watcher.watcher_id()) {
            return Err(ObservationError::WatcherMismatch {
                expected: watcher.watcher_id(),
                actual,
            });
        }
        let exited = stack.current.take();
        stack.current = stack.suspended.pop();
        stack.paused = stack.outer_pauses.pop().unwrap_or_default();
        Ok(exited)
    })?;
    // Released outside the borrow: dropping the last handle may run user code.
    drop(exited);
    Ok(())
}

pub fn pause_watching() {
    WATCHER_STACK.with(|stack| stack.borrow_mut().paused += 1);
}

pub fn resume_watching() {
    WATCHER_STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        stack.paused = stack.paused.saturating_sub(1);
    });
}

/// Whether reads are currently recorded. False while paused.
pub fn is_watching() -> bool {
    WATCHER_STACK.with(|stack| stack.borrow().paused == 0)
}

/// Run `f` with watching paused.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    struct Resume;

    impl Drop for Resume {
        fn drop(&mut self) {
            resume_watching();
        }
    }

    pause_watching();
    let _resume = Resume;
    f()
}

/// Number of entered watchers, current one included.
pub fn stack_depth() -> usize {
    WATCHER_STACK.with(|stack| {
        let stack = stack.borrow();
        stack.current.iter().count() + stack.suspended.len()
    })
}

/// Guard that exits the watcher when dropped.
pub struct WatcherContext {
    watcher: Rc<dyn Watcher>,
}

impl WatcherContext {
    /// Enter `watcher` for the lifetime of the returned guard.
    pub fn enter(watcher: Rc<dyn Watcher>) -> Result<Self, ObservationError> {
        enter_watcher(Rc::clone(&watcher))?;
        Ok(Self { watcher })
    }

    pub fn watcher_id(&self) -> SubscriberId {
        self.watcher.watcher_id()
    }
}

impl Drop for WatcherContext {
    fn drop(&mut self) {
        if let Err(err) = exit_watcher(self.watcher.as_ref()) {
            error!(%err, "watcher stack out of balance");
            debug_assert!(std::thread::panicking(), "{err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct Recorder {
        id: SubscriberId,
        seen: RefCell<Vec<String>>,
    }

    impl Recorder {
        fn new() -> Rc<Self> {
            Rc::new(Self {
                id: SubscriberId::new(),
                seen: RefCell::new(Vec::new()),
            })
        }
    }

    impl Watcher for Recorder {
        fn watcher_id(&self) -> SubscriberId {
            self.id
        }

        fn observe(&self, _: &Value, key: &str) {
            self.seen.borrow_mut().push(key.to_string());
        }

        fn observe_collection(&self, _: &Value) {
            self.seen.borrow_mut().push("*".to_string());
        }
    }

    fn current_id() -> Option<SubscriberId> {
        current_watcher().map(|w| w.watcher_id())
    }

    #[test]
    fn context_tracks_watcher() {
        let recorder = Recorder::new();

        assert!(current_watcher().is_none());
        {
            let _ctx = WatcherContext::enter(recorder.clone()).unwrap();
            assert_eq!(current_id(), Some(recorder.id));
        }

        // Context should be cleaned up after drop
        assert!(current_watcher().is_none());
        assert_eq!(stack_depth(), 0);
    }

    #[test]
    fn nested_contexts() {
        let outer = Recorder::new();
        let inner = Recorder::new();

        {
            let _ctx1 = WatcherContext::enter(outer.clone()).unwrap();
            {
                let _ctx2 = WatcherContext::enter(inner.clone()).unwrap();
                assert_eq!(current_id(), Some(inner.id));
                assert_eq!(stack_depth(), 2);
            }

            // After inner context drops, outer should be current
            assert_eq!(current_id(), Some(outer.id));
        }

        assert!(current_watcher().is_none());
    }

    #[test]
    fn reentering_current_watcher_fails() {
        let recorder = Recorder::new();
        let _ctx = WatcherContext::enter(recorder.clone()).unwrap();

        let err = enter_watcher(recorder.clone()).unwrap_err();
        assert_eq!(err, ObservationError::WatcherAlreadyCurrent(recorder.id));
    }

    #[test]
    fn exiting_wrong_watcher_fails() {
        let current = Recorder::new();
        let other = Recorder::new();
        let _ctx = WatcherContext::enter(current.clone()).unwrap();

        let err = exit_watcher(other.as_ref()).unwrap_err();
        assert_eq!(
            err,
            ObservationError::WatcherMismatch {
                expected: other.id,
                actual: Some(current.id),
            }
        );
        assert_eq!(current_id(), Some(current.id));
    }

    #[test]
    fn pause_nests() {
        assert!(is_watching());
        pause_watching();
        pause_watching();
        resume_watching();
        assert!(!is_watching());
        resume_watching();
        assert!(is_watching());

        untracked(|| assert!(!is_watching()));
        assert!(is_watching());
    }

    #[test]
    fn entered_watcher_is_not_paused_by_outer_pause() {
        let recorder = Recorder::new();
        untracked(|| {
            assert!(!is_watching());
            {
                let _ctx = WatcherContext::enter(recorder.clone()).unwrap();
                assert!(is_watching());
            }
            assert!(!is_watching());
        });
        assert!(is_watching());
    }

    #[test]
    fn guard_unwinds_on_panic() {
        let recorder = Recorder::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ctx = WatcherContext::enter(recorder.clone()).unwrap();
            panic!("computation failed");
        }));

        assert!(result.is_err());
        assert!(current_watcher().is_none());
    }
}
