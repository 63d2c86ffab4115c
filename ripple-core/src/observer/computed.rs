//! Computed properties.
//!
//! A [`ComputedObserver`] wraps an accessor with a getter. While it has
//! subscribers it behaves like a cached derivation:
//!
//! - the first subscriber triggers one eager evaluation, collecting the
//!   getter's dependencies and its initial value;
//! - a dependency change marks it dirty and queues it on the
//!   [`FlushQueue`](crate::reactive::FlushQueue);
//! - a flush (or a read while dirty) re-runs the getter inside the watcher
//!   stack, replaces the dependency set with what this run read, and
//!   notifies if the value changed under `same_value`;
//! - when the last subscriber leaves, all dependencies are released.
//!
//! Without subscribers a read calls the getter directly and tracks nothing.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tracing::error;

use super::{CollectionChange, Observable, ObserverKind, ObserverLocator, PropertyObserver};
use crate::error::ObservationError;
use crate::proxy::Proxied;
use crate::reactive::{
    CollectionSubscriber, DependencyRecord, FlagGuard, FlushQueue, Flushable, PropertySubscriber,
    Subscriber, SubscriberId, SubscriberRecord, Watcher, WatcherContext,
};
use crate::value::{Getter, ObjectInner, ObjectRef, Setter, Value};

pub struct ComputedObserver {
    id: SubscriberId,
    object: Weak<ObjectInner>,
    key: Rc<str>,
    getter: Getter,
    setter: Option<Setter>,
    locator: ObserverLocator,
    use_proxy: bool,
    value: RefCell<Value>,
    dirty: Cell<bool>,
    running: Cell<bool>,
    subs: SubscriberRecord,
    deps: DependencyRecord,
    weak_self: Weak<ComputedObserver>,
}

impl ComputedObserver {
    pub(crate) fn new(
        object: &ObjectRef,
        key: &str,
        getter: Getter,
        setter: Option<Setter>,
        locator: &ObserverLocator,
    ) -> Rc<Self> {
        Rc::new_cyclic(|weak_self| Self {
            id: SubscriberId::new(),
            object: Rc::downgrade(object.inner()),
            key: Rc::from(key),
            getter,
            setter,
            locator: locator.clone(),
            use_proxy: locator.config().use_proxy,
            value: RefCell::new(Value::Undefined),
            dirty: Cell::new(true),
            running: Cell::new(false),
            subs: SubscriberRecord::new(),
            deps: DependencyRecord::new(),
            weak_self: weak_self.clone(),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    /// Number of observers the last run depends on.
    pub fn dependency_count(&self) -> usize {
        self.deps.len()
    }

    fn object(&self) -> Option<ObjectRef> {
        self.object
            .upgrade()
            .map(|inner| ObjectRef::from_inner(inner, false))
    }

    fn subscriber(&self) -> Subscriber {
        let property: Weak<dyn PropertySubscriber> = self.weak_self.clone();
        let collection: Weak<dyn CollectionSubscriber> = self.weak_self.clone();
        Subscriber::Both {
            id: self.id,
            property,
            collection,
        }
    }

    /// Run the getter as the current watcher and keep only what it read.
    fn compute(&self) -> Value {
        let Some(object) = self.object() else {
            return Value::Undefined;
        };
        let this = if self.use_proxy { object.proxy() } else { object };
        let _running = FlagGuard::set(&self.running);

        self.deps.begin();
        let value = match self.weak_self.upgrade() {
            Some(me) => match WatcherContext::enter(me) {
                Ok(_context) => (self.getter)(&this),
                Err(err) => {
                    error!(%err, key = %self.key, "computed getter ran untracked");
                    (self.getter)(&this)
                }
            },
            None => (self.getter)(&this),
        };
        self.deps.prune(self.id);
        value
    }

    fn run(&self) {
        self.dirty.set(false);
        let new_value = self.compute();
        let old_value = self.value.replace(new_value.clone());
        if !new_value.same_value(&old_value) {
            self.subs.notify(&new_value, &old_value);
        }
        if self.subs.is_empty() {
            self.release();
        }
    }

    fn release(&self) {
        self.dirty.set(true);
        self.deps.clear(self.id);
    }

    fn on_dependency_change(&self) {
        self.dirty.set(true);
        if self.running.get() || self.subs.is_empty() {
            return;
        }
        if let Some(me) = self.weak_self.upgrade() {
            FlushQueue::instance().add(me);
        }
    }
}

impl Observable for ComputedObserver {
    fn subscribe(&self, subscriber: Subscriber) {
        if self.subs.add(subscriber) && self.subs.count() == 1 {
            let value = self.compute();
            *self.value.borrow_mut() = value;
            self.dirty.set(false);
        }
    }

    fn unsubscribe(&self, id: SubscriberId) {
        if self.subs.remove(id) && self.subs.is_empty() {
            self.release();
        }
    }

    fn subscriber_count(&self) -> usize {
        self.subs.count()
    }
}

impl PropertyObserver for ComputedObserver {
    fn get_value(&self) -> Value {
        if self.subs.is_empty() {
            return match self.object() {
                Some(object) => (self.getter)(&object),
                None => Value::Undefined,
            };
        }
        if self.dirty.get() && !self.running.get() {
            self.run();
        }
        self.value.borrow().clone()
    }

    fn set_value(&self, value: Value) -> Result<(), ObservationError> {
        let Some(setter) = &self.setter else {
            return Err(ObservationError::ReadonlyProperty(self.key.to_string()));
        };
        let Some(object) = self.object() else {
            return Ok(());
        };
        {
            let _running = FlagGuard::set(&self.running);
            setter(&object, value);
        }
        if !self.subs.is_empty() {
            self.run();
        }
        Ok(())
    }

    fn kind(&self) -> ObserverKind {
        ObserverKind::Computed
    }
}

impl PropertySubscriber for ComputedObserver {
    fn handle_change(&self, _: &Value, _: &Value) {
        self.on_dependency_change();
    }
}

impl CollectionSubscriber for ComputedObserver {
    fn handle_collection_change(&self, _: &CollectionChange) {
        self.on_dependency_change();
    }
}

impl Flushable for ComputedObserver {
    fn flush_id(&self) -> SubscriberId {
        self.id
    }

    fn flush(&self) {
        if self.dirty.get() && !self.subs.is_empty() {
            self.run();
        }
    }
}

impl Watcher for ComputedObserver {
    fn watcher_id(&self) -> SubscriberId {
        self.id
    }

    fn observe(&self, target: &Value, key: &str) {
        self.deps
            .observe_property(&self.locator, target, key, || self.subscriber());
    }

    fn observe_collection(&self, collection: &Value) {
        self.deps
            .observe_collection(&self.locator, collection, || self.subscriber());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::FnSubscriber;
    use crate::value::{Accessor, ArrayRef};

    fn full_name() -> (ObjectRef, Rc<Cell<usize>>) {
        let runs = Rc::new(Cell::new(0));
        let counter = Rc::clone(&runs);
        let person = ObjectRef::from_entries([("first", "Ada"), ("last", "Lovelace")]);
        person.define_accessor(
            "full",
            Accessor::new().getter(move |this| {
                counter.set(counter.get() + 1);
                Value::from(format!("{} {}", this.get("first"), this.get("last")))
            }),
        );
        (person, runs)
    }

    #[test]
    fn unobserved_reads_call_the_getter_directly() {
        let locator = ObserverLocator::default();
        let (person, runs) = full_name();
        let observer = locator.get_observer(&Value::from(person.clone()), "full");
        assert_eq!(observer.kind(), ObserverKind::Computed);

        assert_eq!(observer.get_value(), Value::from("Ada Lovelace"));
        assert_eq!(observer.get_value(), Value::from("Ada Lovelace"));
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn first_subscriber_evaluates_eagerly_and_caches() {
        let locator = ObserverLocator::default();
        let (person, runs) = full_name();
        let observer = locator.get_observer(&Value::from(person.clone()), "full");

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let subscriber = FnSubscriber::new(move |new, _| sink.borrow_mut().push(new.clone()));
        observer.subscribe(subscriber.subscriber());
        assert_eq!(runs.get(), 1);

        assert_eq!(person.get("full"), Value::from("Ada Lovelace"));
        assert_eq!(runs.get(), 1);

        person.set("first", "Augusta").unwrap();
        assert_eq!(runs.get(), 2);
        assert_eq!(*seen.borrow(), vec![Value::from("Augusta Lovelace")]);
    }

    #[test]
    fn last_unsubscribe_releases_dependencies() {
        let locator = ObserverLocator::default();
        let (person, _) = full_name();
        let target = Value::from(person.clone());
        let observer = locator.get_observer(&target, "full");
        let subscriber = FnSubscriber::new(|_, _| {});

        observer.subscribe(subscriber.subscriber());
        assert_eq!(locator.get_observer(&target, "first").subscriber_count(), 1);

        observer.unsubscribe(subscriber.id());
        assert_eq!(locator.get_observer(&target, "first").subscriber_count(), 0);
    }

    #[test]
    fn dependencies_are_what_the_last_run_read() {
        let locator = ObserverLocator::default();
        let o = ObjectRef::from_entries([
            ("a", Value::Bool(true)),
            ("b", Value::from("b0")),
            ("c", Value::from("c0")),
        ]);
        o.define_accessor(
            "pick",
            Accessor::new().getter(|this| {
                if this.get("a").is_truthy() {
                    this.get("b")
                } else {
                    this.get("c")
                }
            }),
        );
        let target = Value::from(o.clone());
        let observer = locator.get_observer(&target, "pick");
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let subscriber = FnSubscriber::new(move |new, _| sink.borrow_mut().push(new.clone()));
        observer.subscribe(subscriber.subscriber());

        let subscribers = |key: &str| locator.get_observer(&target, key).subscriber_count();
        assert_eq!(observer.get_value(), Value::from("b0"));
        assert_eq!((subscribers("a"), subscribers("b"), subscribers("c")), (1, 1, 0));

        o.set("c", "c1").unwrap();
        assert!(seen.borrow().is_empty());
        o.set("b", "b1").unwrap();
        assert_eq!(*seen.borrow(), vec![Value::from("b1")]);

        o.set("a", false).unwrap();
        assert_eq!(*seen.borrow(), vec![Value::from("b1"), Value::from("c1")]);
        assert_eq!((subscribers("a"), subscribers("b"), subscribers("c")), (1, 0, 1));

        o.set("b", "b2").unwrap();
        assert_eq!(seen.borrow().len(), 2);
        o.set("c", "c2").unwrap();
        assert_eq!(seen.borrow().last(), Some(&Value::from("c2")));
    }

    #[test]
    fn chained_computed_properties_settle_in_one_flush() {
        let locator = ObserverLocator::default();
        let (person, _) = full_name();
        let greeting_runs = Rc::new(Cell::new(0));
        let counter = Rc::clone(&greeting_runs);
        person.define_accessor(
            "greeting",
            Accessor::new().getter(move |this| {
                counter.set(counter.get() + 1);
                Value::from(format!("Hello {}", this.get("full")))
            }),
        );
        let target = Value::from(person.clone());
        let greeting = locator.get_observer(&target, "greeting");
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let subscriber = FnSubscriber::new(move |new, _| sink.borrow_mut().push(new.clone()));
        greeting.subscribe(subscriber.subscriber());

        assert_eq!(greeting_runs.get(), 1);
        assert_eq!(locator.get_observer(&target, "full").subscriber_count(), 1);

        person.set("first", "Augusta").unwrap();
        assert_eq!(*seen.borrow(), vec![Value::from("Hello Augusta Lovelace")]);
        assert_eq!(greeting_runs.get(), 2);
        assert_eq!(FlushQueue::instance().count(), 0);
    }

    #[test]
    fn getter_without_setter_is_readonly() {
        let locator = ObserverLocator::default();
        let (person, _) = full_name();
        let observer = locator.get_observer(&Value::from(person.clone()), "full");

        let err = observer.set_value(Value::from("x")).unwrap_err();
        assert_eq!(err, ObservationError::ReadonlyProperty("full".into()));
        assert_eq!(person.set("full", "x").unwrap_err(), err);
    }

    #[test]
    fn setter_runs_then_value_refreshes() {
        let locator = ObserverLocator::default();
        let temperature = ObjectRef::from_entries([("celsius", 0)]);
        temperature.define_accessor(
            "fahrenheit",
            Accessor::new()
                .getter(|this| Value::from(this.get("celsius").to_number() * 9.0 / 5.0 + 32.0))
                .setter(|this, value| {
                    let celsius = (value.to_number() - 32.0) * 5.0 / 9.0;
                    this.set("celsius", celsius).unwrap();
                }),
        );
        let observer = locator.get_observer(&Value::from(temperature.clone()), "fahrenheit");
        let subscriber = FnSubscriber::new(|_, _| {});
        observer.subscribe(subscriber.subscriber());

        temperature.set("fahrenheit", 212).unwrap();
        assert_eq!(temperature.get("celsius"), Value::from(100));
        assert_eq!(observer.get_value(), Value::from(212));
    }

    #[test]
    fn collection_reads_are_dependencies() {
        let locator = ObserverLocator::default();
        let items = ArrayRef::from_values([1, 2]);
        let holder = ObjectRef::from_entries([("items", items.clone())]);
        holder.define_accessor(
            "total",
            Accessor::new().getter(|this| {
                let items = this.get("items");
                match items.as_array() {
                    Some(items) => items.reduce(|acc, v, _| Value::from(acc.to_number() + v.to_number()), Value::from(0)),
                    None => Value::Undefined,
                }
            }),
        );
        let observer = locator.get_observer(&Value::from(holder.clone()), "total");
        let totals = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&totals);
        let subscriber = FnSubscriber::new(move |new, _| sink.borrow_mut().push(new.clone()));
        observer.subscribe(subscriber.subscriber());

        items.push([3]);
        assert_eq!(*totals.borrow(), vec![Value::from(6)]);
    }
}
