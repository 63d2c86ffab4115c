//! Scalar observers derived from a collection observer.
//!
//! These are not sources of truth. Each subscribes to its parent
//! [`CollectionObserver`] while it has subscribers of its own, re-derives
//! its scalar on every collection change and notifies only when the scalar
//! actually changed.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use super::{CollectionChange, CollectionObserver, Observable, ObserverKind, PropertyObserver};
use crate::error::ObservationError;
use crate::reactive::{CollectionSubscriber, Subscriber, SubscriberId, SubscriberRecord};
use crate::value::{is_valid_array_length, Value};

/// Shared bookkeeping of the derived observers.
struct Derived<T> {
    id: SubscriberId,
    parent: Weak<CollectionObserver>,
    last: RefCell<Value>,
    subs: SubscriberRecord,
    weak_self: Weak<T>,
}

impl<T: CollectionSubscriber + 'static> Derived<T> {
    fn new(parent: Weak<CollectionObserver>, weak_self: &Weak<T>) -> Self {
        Self {
            id: SubscriberId::new(),
            parent,
            last: RefCell::new(Value::Undefined),
            subs: SubscriberRecord::new(),
            weak_self: weak_self.clone(),
        }
    }

    fn collection(&self) -> Option<Value> {
        self.parent.upgrade().and_then(|parent| parent.collection())
    }

    fn subscribe(&self, subscriber: Subscriber, current: Value) {
        if !self.subs.add(subscriber) || self.subs.count() != 1 {
            return;
        }
        *self.last.borrow_mut() = current;
        if let Some(parent) = self.parent.upgrade() {
            let target: Weak<dyn CollectionSubscriber> = self.weak_self.clone();
            parent.subscribe(Subscriber::Collection { id: self.id, target });
        }
    }

    fn unsubscribe(&self, id: SubscriberId) {
        if self.subs.remove(id) && self.subs.is_empty() {
            if let Some(parent) = self.parent.upgrade() {
                parent.unsubscribe(self.id);
            }
        }
    }

    /// Store `current` and notify if it differs from the last value seen.
    /// Detaches from the parent once every subscriber has been dropped.
    fn refresh(&self, current: Value, changed: impl Fn(&Value, &Value) -> bool) {
        let old = self.last.replace(current.clone());
        if changed(&current, &old) {
            self.subs.notify(&current, &old);
        } else {
            self.subs.prune();
        }
        if self.subs.is_empty() {
            if let Some(parent) = self.parent.upgrade() {
                parent.unsubscribe(self.id);
            }
        }
    }
}

/// Observer of an array's `length`.
pub struct CollectionLengthObserver {
    derived: Derived<CollectionLengthObserver>,
}

impl CollectionLengthObserver {
    pub(crate) fn new(parent: Weak<CollectionObserver>) -> Rc<Self> {
        Rc::new_cyclic(|weak_self| Self {
            derived: Derived::new(parent, weak_self),
        })
    }

    fn current(&self) -> Value {
        match self.derived.collection() {
            Some(Value::Array(array)) => Value::from(array.raw_len()),
            _ => Value::Undefined,
        }
    }
}

impl Observable for CollectionLengthObserver {
    fn subscribe(&self, subscriber: Subscriber) {
        self.derived.subscribe(subscriber, self.current());
    }

    fn unsubscribe(&self, id: SubscriberId) {
        self.derived.unsubscribe(id);
    }

    fn subscriber_count(&self) -> usize {
        self.derived.subs.count()
    }
}

impl PropertyObserver for CollectionLengthObserver {
    fn get_value(&self) -> Value {
        self.current()
    }

    /// Truncates or extends the array. Values that are not valid array
    /// lengths (negative, fractional, NaN, non-numbers) are ignored.
    fn set_value(&self, value: Value) -> Result<(), ObservationError> {
        if let (Value::Number(n), Some(Value::Array(array))) = (&value, self.derived.collection()) {
            if is_valid_array_length(*n) {
                array.set_length(*n as usize);
            }
        }
        Ok(())
    }

    fn kind(&self) -> ObserverKind {
        ObserverKind::CollectionLength
    }
}

impl CollectionSubscriber for CollectionLengthObserver {
    fn handle_collection_change(&self, _: &CollectionChange) {
        self.derived.refresh(self.current(), |new, old| !new.strict_eq(old));
    }
}

/// Observer of a map's or set's `size`. Read-only.
pub struct CollectionSizeObserver {
    derived: Derived<CollectionSizeObserver>,
}

impl CollectionSizeObserver {
    pub(crate) fn new(parent: Weak<CollectionObserver>) -> Rc<Self> {
        Rc::new_cyclic(|weak_self| Self {
            derived: Derived::new(parent, weak_self),
        })
    }

    fn current(&self) -> Value {
        match self.derived.collection() {
            Some(Value::Map(map)) => Value::from(map.raw_size()),
            Some(Value::Set(set)) => Value::from(set.raw_size()),
            _ => Value::Undefined,
        }
    }
}

impl Observable for CollectionSizeObserver {
    fn subscribe(&self, subscriber: Subscriber) {
        self.derived.subscribe(subscriber, self.current());
    }

    fn unsubscribe(&self, id: SubscriberId) {
        self.derived.unsubscribe(id);
    }

    fn subscriber_count(&self) -> usize {
        self.derived.subs.count()
    }
}

impl PropertyObserver for CollectionSizeObserver {
    fn get_value(&self) -> Value {
        self.current()
    }

    fn set_value(&self, _: Value) -> Result<(), ObservationError> {
        Ok(())
    }

    fn kind(&self) -> ObserverKind {
        ObserverKind::CollectionSize
    }
}

impl CollectionSubscriber for CollectionSizeObserver {
    fn handle_collection_change(&self, _: &CollectionChange) {
        self.derived.refresh(self.current(), |new, old| !new.strict_eq(old));
    }
}

/// Observer of one array element.
pub struct ArrayIndexObserver {
    index: usize,
    derived: Derived<ArrayIndexObserver>,
}

impl ArrayIndexObserver {
    pub(crate) fn new(parent: Weak<CollectionObserver>, index: usize) -> Rc<Self> {
        Rc::new_cyclic(|weak_self| Self {
            index,
            derived: Derived::new(parent, weak_self),
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    fn current(&self) -> Value {
        match self.derived.collection() {
            Some(Value::Array(array)) => array.raw_get(self.index),
            _ => Value::Undefined,
        }
    }
}

impl Observable for ArrayIndexObserver {
    fn subscribe(&self, subscriber: Subscriber) {
        self.derived.subscribe(subscriber, self.current());
    }

    fn unsubscribe(&self, id: SubscriberId) {
        self.derived.unsubscribe(id);
    }

    fn subscriber_count(&self) -> usize {
        self.derived.subs.count()
    }
}

impl PropertyObserver for ArrayIndexObserver {
    fn get_value(&self) -> Value {
        self.current()
    }

    fn set_value(&self, value: Value) -> Result<(), ObservationError> {
        if let Some(Value::Array(array)) = self.derived.collection() {
            array.set(self.index, value);
        }
        Ok(())
    }

    fn kind(&self) -> ObserverKind {
        ObserverKind::ArrayIndex
    }
}

impl CollectionSubscriber for ArrayIndexObserver {
    fn handle_collection_change(&self, _: &CollectionChange) {
        self.derived.refresh(self.current(), |new, old| !new.same_value(old));
    }
}
