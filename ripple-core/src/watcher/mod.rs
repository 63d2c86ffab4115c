//! Watchers
//!
//! A watcher re-evaluates something whenever what it read last time
//! changes, and reports new results to a callback.
//!
//! # How Watchers Work
//!
//! 1. `bind()` evaluates once inside the watcher stack. Every proxy read
//!    subscribes the watcher to the matching observer. The callback is not
//!    invoked for this first value.
//!
//! 2. When a dependency notifies:
//!    - in [`FlushMode::Sync`] the watcher re-evaluates immediately and
//!      invokes the callback if the value changed;
//!    - in [`FlushMode::Async`] it marks itself dirty and queues one task.
//!      Further notifications before the task runs are absorbed, so a burst
//!      of mutations causes one re-evaluation and at most one callback.
//!
//! 3. Each evaluation replaces the dependency set with what that run read.
//!
//! 4. `unbind()` drops every subscription. A queued task that finds the
//!    watcher no longer dirty does nothing, so no callback fires after
//!    `unbind()`.

mod computed;
mod expression;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::{debug, error};

pub use computed::ComputedWatcher;
pub use expression::ExpressionWatcher;

use crate::config::FlushMode;
use crate::observer::ObserverLocator;
use crate::reactive::{untracked, DependencyRecord, Runtime, SubscriberId, Watcher, WatcherContext};
use crate::value::Value;

/// Lifecycle of a watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Unbound,
    BoundIdle,
    BoundEvaluating,
    BoundDirty,
}

impl WatcherState {
    pub fn is_bound(self) -> bool {
        self != WatcherState::Unbound
    }
}

/// State shared by every watcher kind.
struct WatcherCore {
    id: SubscriberId,
    locator: ObserverLocator,
    mode: FlushMode,
    state: Cell<WatcherState>,
    value: RefCell<Value>,
    deps: DependencyRecord,
}

impl WatcherCore {
    fn new(locator: &ObserverLocator, mode: FlushMode) -> Self {
        Self {
            id: SubscriberId::new(),
            locator: locator.clone(),
            mode,
            state: Cell::new(WatcherState::Unbound),
            value: RefCell::new(Value::Undefined),
            deps: DependencyRecord::new(),
        }
    }
}

/// Puts the watcher back to idle after an evaluation, even one that
/// panicked, unless it was unbound meanwhile.
struct EvaluationGuard<'a> {
    state: &'a Cell<WatcherState>,
}

impl Drop for EvaluationGuard<'_> {
    fn drop(&mut self) {
        if self.state.get() == WatcherState::BoundEvaluating {
            self.state.set(WatcherState::BoundIdle);
        }
    }
}

/// What differs between watcher kinds.
trait Evaluator: Watcher + Sized + 'static {
    fn core(&self) -> &WatcherCore;

    /// Produce the watched value. Runs with the watcher current.
    fn evaluate(&self) -> Value;

    fn invoke_callback(&self, new_value: &Value, old_value: &Value);
}

/// Evaluate with `watcher` current and keep only the dependencies read.
fn compute<E: Evaluator>(watcher: &Rc<E>) -> Value {
    let core = watcher.core();
    core.deps.begin();
    core.state.set(WatcherState::BoundEvaluating);
    let value = {
        let _idle = EvaluationGuard { state: &core.state };
        let _context = match WatcherContext::enter(Rc::clone(watcher) as Rc<dyn Watcher>) {
            Ok(context) => Some(context),
            Err(err) => {
                error!(%err, "watcher evaluated untracked");
                None
            }
        };
        watcher.evaluate()
    };
    if core.state.get().is_bound() {
        core.deps.prune(core.id);
    } else {
        // Unbound from inside the evaluation: drop what this run subscribed.
        core.deps.clear(core.id);
    }
    value
}

/// Re-evaluate and report a changed value.
fn run<E: Evaluator>(watcher: &Rc<E>) {
    let core = watcher.core();
    if !core.state.get().is_bound() {
        return;
    }
    let new_value = compute(watcher);
    if !core.state.get().is_bound() {
        return;
    }
    let old_value = core.value.replace(new_value.clone());
    if !new_value.same_value(&old_value) {
        // A sync callback can fire while another computation is current.
        untracked(|| watcher.invoke_callback(&new_value, &old_value));
    }
}

fn on_dependency_change<E: Evaluator>(watcher: &Rc<E>) {
    let core = watcher.core();
    if core.state.get() != WatcherState::BoundIdle {
        return;
    }
    match core.mode {
        FlushMode::Sync => run(watcher),
        FlushMode::Async => {
            core.state.set(WatcherState::BoundDirty);
            let pending = Rc::downgrade(watcher);
            Runtime::queue_task(move || {
                if let Some(watcher) = pending.upgrade() {
                    if watcher.core().state.get() == WatcherState::BoundDirty {
                        watcher.core().state.set(WatcherState::BoundIdle);
                        run(&watcher);
                    }
                }
            });
        }
    }
}

fn bind<E: Evaluator>(watcher: &Rc<E>) {
    let core = watcher.core();
    if core.state.get().is_bound() {
        return;
    }
    core.state.set(WatcherState::BoundIdle);
    let value = compute(watcher);
    *core.value.borrow_mut() = value;
    debug!(
        watcher = ?core.id,
        dependencies = core.deps.len(),
        "watcher bound"
    );
}

fn unbind<E: Evaluator>(watcher: &E) {
    let core = watcher.core();
    if !core.state.get().is_bound() {
        return;
    }
    core.state.set(WatcherState::Unbound);
    core.deps.clear(core.id);
    debug!(watcher = ?core.id, "watcher unbound");
}
