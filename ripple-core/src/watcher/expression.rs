//! Watcher over a parsed expression.

use std::rc::{Rc, Weak};

use super::{Evaluator, WatcherCore, WatcherState};
use crate::config::FlushMode;
use crate::expression::{Expression, Scope};
use crate::observer::{CollectionChange, ObserverLocator};
use crate::reactive::{CollectionSubscriber, PropertySubscriber, Subscriber, SubscriberId, Watcher};
use crate::value::Value;

type CallbackFn = Box<dyn Fn(&Value, &Value, &Value)>;

/// Evaluates `expression` against `scope` and calls
/// `callback(new_value, old_value, context)` when the result changes.
pub struct ExpressionWatcher {
    core: WatcherCore,
    weak_self: Weak<ExpressionWatcher>,
    scope: Rc<Scope>,
    context: Value,
    expression: Expression,
    callback: CallbackFn,
}

impl ExpressionWatcher {
    pub fn new<F>(
        scope: &Rc<Scope>,
        context: impl Into<Value>,
        locator: &ObserverLocator,
        expression: Expression,
        callback: F,
        mode: FlushMode,
    ) -> Rc<Self>
    where
        F: Fn(&Value, &Value, &Value) + 'static,
    {
        let context = context.into();
        Rc::new_cyclic(|weak_self| Self {
            core: WatcherCore::new(locator, mode),
            weak_self: weak_self.clone(),
            scope: Rc::clone(scope),
            context,
            expression,
            callback: Box::new(callback),
        })
    }

    /// Like [`new`](Self::new), flushing in the locator's configured
    /// `default_flush` mode.
    pub fn with_default_flush<F>(
        scope: &Rc<Scope>,
        context: impl Into<Value>,
        locator: &ObserverLocator,
        expression: Expression,
        callback: F,
    ) -> Rc<Self>
    where
        F: Fn(&Value, &Value, &Value) + 'static,
    {
        let mode = locator.config().default_flush;
        Self::new(scope, context, locator, expression, callback, mode)
    }

    pub fn bind(self: &Rc<Self>) {
        super::bind(self);
    }

    pub fn unbind(&self) {
        super::unbind(self);
    }

    pub fn is_bound(&self) -> bool {
        self.core.state.get().is_bound()
    }

    pub fn state(&self) -> WatcherState {
        self.core.state.get()
    }

    pub fn value(&self) -> Value {
        self.core.value.borrow().clone()
    }

    pub fn id(&self) -> SubscriberId {
        self.core.id
    }

    pub fn expression(&self) -> &Expression {
        &self.expression
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

impl Evaluator for ExpressionWatcher {
    fn core(&self) -> &WatcherCore {
        &self.core
    }

    fn evaluate(&self) -> Value {
        self.expression.evaluate(&self.scope)
    }

    fn invoke_callback(&self, new_value: &Value, old_value: &Value) {
        (self.callback)(new_value, old_value, &self.context);
    }
}

impl Watcher for ExpressionWatcher {
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

impl PropertySubscriber for ExpressionWatcher {
    fn handle_change(&self, _: &Value, _: &Value) {
        if let Some(me) = self.weak_self.upgrade() {
            super::on_dependency_change(&me);
        }
    }
}

impl CollectionSubscriber for ExpressionWatcher {
    fn handle_collection_change(&self, _: &CollectionChange) {
        if let Some(me) = self.weak_self.upgrade() {
            super::on_dependency_change(&me);
        }
    }
}
