//! Watcher over a user compute function.

use std::rc::{Rc, Weak};

use super::{Evaluator, WatcherCore, WatcherState};
use crate::config::FlushMode;
use crate::observer::{CollectionChange, ObserverLocator};
use crate::proxy::Proxied;
use crate::reactive::{CollectionSubscriber, PropertySubscriber, Subscriber, SubscriberId, Watcher};
use crate::value::Value;

type ComputeFn = Box<dyn Fn(&Value, &dyn Watcher) -> Value>;
type CallbackFn = Box<dyn Fn(&Value, &Value, &Value)>;

/// Re-runs `compute(target, watcher)` when anything it read changes and
/// calls `callback(new_value, old_value, target)` with changed results.
///
/// The compute function receives the target proxied (unless the locator's
/// configuration disables proxies) plus a handle for declaring extra
/// dependencies by hand. Those are redeclared on every run like any other.
///
/// ```rust,ignore
/// let watcher = ComputedWatcher::new(
///     obj.clone(),
///     &locator,
///     |o, _| o.get_member("prop"),
///     |new, _old, _this| println!("prop is now {new}"),
///     FlushMode::Sync,
/// );
/// watcher.bind();
/// ```
pub struct ComputedWatcher {
    core: WatcherCore,
    weak_self: Weak<ComputedWatcher>,
    target: Value,
    compute: ComputeFn,
    callback: CallbackFn,
}

impl ComputedWatcher {
    pub fn new<C, F>(
        target: impl Into<Value>,
        locator: &ObserverLocator,
        compute: C,
        callback: F,
        mode: FlushMode,
    ) -> Rc<Self>
    where
        C: Fn(&Value, &dyn Watcher) -> Value + 'static,
        F: Fn(&Value, &Value, &Value) + 'static,
    {
        let target: Value = target.into();
        let target = if locator.config().use_proxy {
            target.proxy()
        } else {
            target.raw()
        };
        Rc::new_cyclic(|weak_self| Self {
            core: WatcherCore::new(locator, mode),
            weak_self: weak_self.clone(),
            target,
            compute: Box::new(compute),
            callback: Box::new(callback),
        })
    }

    /// Like [`new`](Self::new), flushing in the locator's configured
    /// `default_flush` mode.
    pub fn with_default_flush<C, F>(
        target: impl Into<Value>,
        locator: &ObserverLocator,
        compute: C,
        callback: F,
    ) -> Rc<Self>
    where
        C: Fn(&Value, &dyn Watcher) -> Value + 'static,
        F: Fn(&Value, &Value, &Value) + 'static,
    {
        let mode = locator.config().default_flush;
        Self::new(target, locator, compute, callback, mode)
    }

    /// Evaluate once and start tracking. No callback for this value.
    pub fn bind(self: &Rc<Self>) {
        super::bind(self);
    }

    /// Stop tracking. Pending async re-evaluations are cancelled.
    pub fn unbind(&self) {
        super::unbind(self);
    }

    pub fn is_bound(&self) -> bool {
        self.core.state.get().is_bound()
    }

    pub fn state(&self) -> WatcherState {
        self.core.state.get()
    }

    /// The last computed value.
    pub fn value(&self) -> Value {
        self.core.value.borrow().clone()
    }

    pub fn id(&self) -> SubscriberId {
        self.core.id
    }

    pub fn dependency_count(&self) -> usize {
        self.core.deps.len()
    }

    fn subscriber(&self) -> Subscriber {
        let property: Weak<dyn PropertySubscriber> = self.weak_self.clone();
        let collection: Weak<dyn CollectionSubscriber> = self.weak_self.clone();
        Subscriber::Both {
            id: self.core.id,
            property,
            collection,
        }
    }
}

impl Evaluator for ComputedWatcher {
    fn core(&self) -> &WatcherCore {
        &self.core
    }

    fn evaluate(&self) -> Value {
        (self.compute)(&self.target, self)
    }

    fn invoke_callback(&self, new_value: &Value, old_value: &Value) {
        (self.callback)(new_value, old_value, &self.target);
    }
}

impl Watcher for ComputedWatcher {
    fn watcher_id(&self) -> SubscriberId {
        self.core.id
    }

    fn observe(&self, target: &Value, key: &str) {
        self.core
            .deps
            .observe_property(&self.core.locator, target, key, || self.subscriber());
    }

    fn observe_collection(&self, collection: &Value) {
        self.core
            .deps
            .observe_collection(&self.core.locator, collection, || self.subscriber());
    }
}

impl PropertySubscriber for ComputedWatcher {
    fn handle_change(&self, _: &Value, _: &Value) {
        if let Some(me) = self.weak_self.upgrade() {
            super::on_dependency_change(&me);
        }
    }
}

impl CollectionSubscriber for ComputedWatcher {
    fn handle_collection_change(&self, _: &CollectionChange) {
        if let Some(me) = self.weak_self.upgrade() {
            super::on_dependency_change(&me);
        }
    }
}
