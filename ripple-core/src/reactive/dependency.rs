//! Per-run dependency sets.
//!
//! Every evaluation of a watcher starts a new version. Observers touched
//! during the run are stamped with it; after the run, entries carrying an
//! older stamp were not touched and get unsubscribed. The result is that a
//! watcher is subscribed to exactly what its last run read.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use indexmap::IndexMap;

use super::{Subscriber, SubscriberId};
use crate::observer::{CollectionObserver, Observable, ObserverLocator, PropertyObserver};
use crate::value::Value;

#[derive(Clone)]
pub(crate) enum Dependency {
    Property(Rc<dyn PropertyObserver>),
    Collection(Rc<CollectionObserver>),
}

impl Dependency {
    /// Identity of the underlying observer.
    fn key(&self) -> usize {
        match self {
            Dependency::Property(o) => Rc::as_ptr(o) as *const () as usize,
            Dependency::Collection(o) => Rc::as_ptr(o) as *const () as usize,
        }
    }

    fn subscribe(&self, subscriber: Subscriber) {
        match self {
            Dependency::Property(o) => o.subscribe(subscriber),
            Dependency::Collection(o) => o.subscribe(subscriber),
        }
    }

    fn unsubscribe(&self, id: SubscriberId) {
        match self {
            Dependency::Property(o) => o.unsubscribe(id),
            Dependency::Collection(o) => o.unsubscribe(id),
        }
    }
}

#[derive(Default)]
pub(crate) struct DependencyRecord {
    version: Cell<u64>,
    entries: RefCell<IndexMap<usize, (Dependency, u64)>>,
}

impl DependencyRecord {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Start a new run.
    pub(crate) fn begin(&self) {
        self.version.set(self.version.get() + 1);
    }

    /// Stamp `dependency` for the current run, subscribing on first sight.
    pub(crate) fn add(&self, dependency: Dependency, subscriber: impl FnOnce() -> Subscriber) {
        let version = self.version.get();
        let is_new = {
            let mut entries = self.entries.borrow_mut();
            match entries.get_mut(&dependency.key()) {
                Some(entry) => {
                    entry.1 = version;
                    false
                }
                None => {
                    entries.insert(dependency.key(), (dependency.clone(), version));
                    true
                }
            }
        };
        // Subscribing may evaluate a computed property, which may come back here.
        if is_new {
            dependency.subscribe(subscriber());
        }
    }

    pub(crate) fn observe_property(
        &self,
        locator: &ObserverLocator,
        target: &Value,
        key: &str,
        subscriber: impl FnOnce() -> Subscriber,
    ) {
        let observer = locator.get_observer(target, key);
        self.add(Dependency::Property(observer), subscriber);
    }

    pub(crate) fn observe_collection(
        &self,
        locator: &ObserverLocator,
        collection: &Value,
        subscriber: impl FnOnce() -> Subscriber,
    ) {
        if let Some(observer) = locator.get_collection_observer(collection) {
            self.add(Dependency::Collection(observer), subscriber);
        }
    }

    /// Unsubscribe `id` from everything the current run did not touch.
    pub(crate) fn prune(&self, id: SubscriberId) {
        let version = self.version.get();
        let mut stale = Vec::new();
        self.entries.borrow_mut().retain(|_, (dependency, stamp)| {
            if *stamp == version {
                true
            } else {
                stale.push(dependency.clone());
                false
            }
        });
        for dependency in stale {
            dependency.unsubscribe(id);
        }
    }

    /// Unsubscribe `id` from every dependency.
    pub(crate) fn clear(&self, id: SubscriberId) {
        let all: Vec<Dependency> = self
            .entries
            .borrow_mut()
            .drain(..)
            .map(|(_, (dependency, _))| dependency)
            .collect();
        for dependency in all {
            dependency.unsubscribe(id);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.borrow().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::FnSubscriber;
    use crate::value::ObjectRef;

    #[test]
    fn prune_drops_untouched_dependencies() {
        let locator = ObserverLocator::default();
        let object = Value::from(ObjectRef::from_entries([("a", 1), ("b", 2)]));
        let subscriber = FnSubscriber::new(|_, _| {});
        let record = DependencyRecord::new();

        record.begin();
        record.observe_property(&locator, &object, "a", || subscriber.subscriber());
        record.observe_property(&locator, &object, "b", || subscriber.subscriber());
        record.prune(subscriber.id());
        assert_eq!(record.len(), 2);

        record.begin();
        record.observe_property(&locator, &object, "a", || subscriber.subscriber());
        record.prune(subscriber.id());
        assert_eq!(record.len(), 1);
        assert_eq!(locator.get_observer(&object, "b").subscriber_count(), 0);
        assert_eq!(locator.get_observer(&object, "a").subscriber_count(), 1);

        record.clear(subscriber.id());
        assert_eq!(record.len(), 0);
        assert_eq!(locator.get_observer(&object, "a").subscriber_count(), 0);
    }

    #[test]
    fn repeated_reads_subscribe_once() {
        let locator = ObserverLocator::default();
        let object = Value::from(ObjectRef::new());
        let subscriber = FnSubscriber::new(|_, _| {});
        let record = DependencyRecord::new();

        record.begin();
        for _ in 0..3 {
            record.observe_property(&locator, &object, "x", || subscriber.subscriber());
        }
        assert_eq!(locator.get_observer(&object, "x").subscriber_count(), 1);
    }
}
