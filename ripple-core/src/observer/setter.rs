//! Observers that intercept assignments to object properties.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use super::{Observable, ObserverKind, PropertyObserver};
use crate::error::ObservationError;
use crate::reactive::{Subscriber, SubscriberId, SubscriberRecord};
use crate::value::{ObjectInner, ObjectRef, Setter, Value};

fn upgrade(object: &Weak<ObjectInner>) -> Option<ObjectRef> {
    object.upgrade().map(|inner| ObjectRef::from_inner(inner, false))
}

/// Observer of a plain data property (or one not defined yet).
///
/// Stores the value itself and notifies on strict inequality, so
/// assigning `NaN` over `NaN` notifies while `-0` over `+0` does not.
pub struct SetterObserver {
    object: Weak<ObjectInner>,
    key: Rc<str>,
    subs: SubscriberRecord,
}

impl SetterObserver {
    pub(crate) fn new(object: &ObjectRef, key: &str) -> Rc<Self> {
        Rc::new(Self {
            object: Rc::downgrade(object.inner()),
            key: Rc::from(key),
            subs: SubscriberRecord::new(),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Observable for SetterObserver {
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

impl PropertyObserver for SetterObserver {
    fn get_value(&self) -> Value {
        upgrade(&self.object)
            .map(|object| object.read_data(&self.key))
            .unwrap_or_default()
    }

    fn set_value(&self, value: Value) -> Result<(), ObservationError> {
        let Some(object) = upgrade(&self.object) else {
            return Ok(());
        };
        let old = object.read_data(&self.key);
        if !old.strict_eq(&value) {
            object.write_data(&self.key, value.clone());
            self.subs.notify(&value, &old);
        }
        Ok(())
    }

    fn kind(&self) -> ObserverKind {
        ObserverKind::Setter
    }
}

/// Observer of an accessor that has a setter but no getter.
///
/// Delegates to the setter, then notifies. The setter cannot be read
/// back, so the last assigned value stands in for the current one.
pub struct CustomSetterObserver {
    object: Weak<ObjectInner>,
    key: Rc<str>,
    setter: Setter,
    last: RefCell<Value>,
    subs: SubscriberRecord,
}

impl CustomSetterObserver {
    pub(crate) fn new(object: &ObjectRef, key: &str, setter: Setter) -> Rc<Self> {
        Rc::new(Self {
            object: Rc::downgrade(object.inner()),
            key: Rc::from(key),
            setter,
            last: RefCell::new(Value::Undefined),
            subs: SubscriberRecord::new(),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Observable for CustomSetterObserver {
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

impl PropertyObserver for CustomSetterObserver {
    fn get_value(&self) -> Value {
        self.last.borrow().clone()
    }

    fn set_value(&self, value: Value) -> Result<(), ObservationError> {
        let Some(object) = upgrade(&self.object) else {
            return Ok(());
        };
        let old = self.last.replace(value.clone());
        (self.setter)(&object, value.clone());
        if !old.strict_eq(&value) {
            self.subs.notify(&value, &old);
        }
        Ok(())
    }

    fn kind(&self) -> ObserverKind {
        ObserverKind::CustomSetter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::ObserverLocator;
    use crate::reactive::FnSubscriber;
    use crate::value::Accessor;
    use std::cell::Cell;

    fn counting(observer: &dyn PropertyObserver) -> (Rc<FnSubscriber>, Rc<Cell<usize>>) {
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let subscriber = FnSubscriber::new(move |_, _| counter.set(counter.get() + 1));
        observer.subscribe(subscriber.subscriber());
        (subscriber, calls)
    }

    #[test]
    fn object_writes_route_through_setter_observer() {
        let locator = ObserverLocator::default();
        let object = ObjectRef::from_entries([("name", "a")]);
        let observer = locator.get_observer(&Value::from(object.clone()), "name");
        assert_eq!(observer.kind(), ObserverKind::Setter);
        let (_keep, calls) = counting(observer.as_ref());

        object.set("name", "b").unwrap();
        object.set("name", "b").unwrap();
        assert_eq!(calls.get(), 1);
        assert_eq!(observer.get_value(), Value::from("b"));
    }

    #[test]
    fn strict_inequality_decides_notification() {
        let locator = ObserverLocator::default();
        let object = ObjectRef::from_entries([("n", 0.0)]);
        let observer = locator.get_observer(&Value::from(object.clone()), "n");
        let (_keep, calls) = counting(observer.as_ref());

        object.set("n", -0.0).unwrap();
        assert_eq!(calls.get(), 0);
        object.set("n", f64::NAN).unwrap();
        object.set("n", f64::NAN).unwrap();
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn custom_setter_delegates_then_notifies() {
        let locator = ObserverLocator::default();
        let object = ObjectRef::new();
        let stored = Rc::new(RefCell::new(Value::Undefined));
        let sink = Rc::clone(&stored);
        object.define_accessor(
            "sink",
            Accessor::new().setter(move |_, value| *sink.borrow_mut() = value),
        );

        let observer = locator.get_observer(&Value::from(object.clone()), "sink");
        assert_eq!(observer.kind(), ObserverKind::CustomSetter);
        let (_keep, calls) = counting(observer.as_ref());

        object.set("sink", 3).unwrap();
        assert_eq!(*stored.borrow(), Value::from(3));
        assert_eq!(observer.get_value(), Value::from(3));
        assert_eq!(calls.get(), 1);
    }
}
