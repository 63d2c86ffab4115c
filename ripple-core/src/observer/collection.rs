//! Collection observers and change descriptors.

use std::cell::{OnceCell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use super::{
    ArrayIndexObserver, CollectionLengthObserver, CollectionSizeObserver, DirtyCheckProperty,
    Observable, ObserverLocator, PropertyObserver,
};
use crate::reactive::{Subscriber, SubscriberId, SubscriberRecord};
use crate::value::{parse_index, Value, WeakValue};

/// Where an element of the new collection came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexSlot {
    /// Previously at this index.
    Moved(usize),
    /// Inserted by the mutation.
    Added,
}

/// How old indices map to new ones after a mutation.
///
/// `indices` has one slot per element of the collection after the change.
/// Removed elements are listed in `deleted_indices` (old positions) and
/// `deleted_items`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexMapping {
    pub indices: Vec<IndexSlot>,
    pub deleted_indices: Vec<usize>,
    pub deleted_items: Vec<Value>,
}

impl IndexMapping {
    /// Mapping of an unchanged collection of `len` elements.
    pub fn identity(len: usize) -> Self {
        Self {
            indices: (0..len).map(IndexSlot::Moved).collect(),
            ..Self::default()
        }
    }

    pub fn added_count(&self) -> usize {
        self.indices.iter().filter(|slot| **slot == IndexSlot::Added).count()
    }
}

/// A collection change notification.
#[derive(Debug, Clone, PartialEq)]
pub enum CollectionChange {
    Indexed(IndexMapping),
    /// The collection was cleared; there is no meaningful mapping.
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    Array,
    Map,
    Set,
}

/// The single observer of one collection.
///
/// Created on the first [`get_collection_observer`] call and owned by the
/// collection afterwards. Derived scalar observers (`length`, `size`,
/// indices) hang off it and are created lazily.
pub struct CollectionObserver {
    kind: CollectionKind,
    target: WeakValue,
    subs: SubscriberRecord,
    weak_self: Weak<CollectionObserver>,
    length: OnceCell<Rc<CollectionLengthObserver>>,
    size: OnceCell<Rc<CollectionSizeObserver>>,
    indices: RefCell<HashMap<usize, Rc<ArrayIndexObserver>>>,
    fallbacks: RefCell<HashMap<String, Rc<DirtyCheckProperty>>>,
}

impl CollectionObserver {
    pub(crate) fn new(kind: CollectionKind, target: WeakValue) -> Rc<Self> {
        Rc::new_cyclic(|weak_self| Self {
            kind,
            target,
            subs: SubscriberRecord::new(),
            weak_self: weak_self.clone(),
            length: OnceCell::new(),
            size: OnceCell::new(),
            indices: RefCell::new(HashMap::new()),
            fallbacks: RefCell::new(HashMap::new()),
        })
    }

    pub fn kind(&self) -> CollectionKind {
        self.kind
    }

    /// The raw collection, unless it has been dropped.
    pub fn collection(&self) -> Option<Value> {
        self.target.upgrade()
    }

    /// Deliver `change` to every collection subscriber.
    pub fn notify(&self, change: &CollectionChange) {
        self.subs.notify_collection(change);
    }

    /// Observer of an array's `length`.
    pub fn length_observer(&self) -> Rc<CollectionLengthObserver> {
        Rc::clone(
            self.length
                .get_or_init(|| CollectionLengthObserver::new(self.weak_self.clone())),
        )
    }

    /// Observer of a map's or set's `size`.
    pub fn size_observer(&self) -> Rc<CollectionSizeObserver> {
        Rc::clone(
            self.size
                .get_or_init(|| CollectionSizeObserver::new(self.weak_self.clone())),
        )
    }

    pub fn index_observer(&self, index: usize) -> Rc<ArrayIndexObserver> {
        let mut indices = self.indices.borrow_mut();
        Rc::clone(
            indices
                .entry(index)
                .or_insert_with(|| ArrayIndexObserver::new(self.weak_self.clone(), index)),
        )
    }

    /// Observer for `key` of this collection, per the locator's rules.
    pub(crate) fn property_observer(
        &self,
        key: &str,
        locator: &ObserverLocator,
    ) -> Rc<dyn PropertyObserver> {
        match (self.kind, key) {
            (CollectionKind::Array, "length") => return self.length_observer(),
            (CollectionKind::Map | CollectionKind::Set, "size") => return self.size_observer(),
            (CollectionKind::Array, key) => {
                if let Some(index) = parse_index(key) {
                    return self.index_observer(index);
                }
            }
            _ => {}
        }

        if let Some(existing) = self.fallbacks.borrow().get(key) {
            return Rc::clone(existing) as Rc<dyn PropertyObserver>;
        }
        let target = self.collection().unwrap_or_default();
        let observer = locator.dirty_checker().create_property(&target, key);
        self.fallbacks
            .borrow_mut()
            .insert(key.to_string(), Rc::clone(&observer));
        observer
    }
}

impl Observable for CollectionObserver {
    fn subscribe(&self, subscriber: Subscriber) {
        self.subs.add(subscriber);
    }

    fn unsubscribe(&self, id: SubscriberId) {
        self.subs.remove(id);
    }

    fn subscriber_count(&self) -> usize {
        self.subs.count()
    }
}

/// The observer of `collection`, created on first request. `None` for
/// values that are not arrays, maps or sets.
pub fn get_collection_observer(collection: &Value) -> Option<Rc<CollectionObserver>> {
    match collection {
        Value::Array(a) => Some(a.observer()),
        Value::Map(m) => Some(m.observer()),
        Value::Set(s) => Some(s.observer()),
        _ => None,
    }
}
