//! Observer Locator
//!
//! The single entry point for obtaining observers. The locator owns the
//! configuration and the dirty checker; the observers themselves are cached
//! on their targets, so asking twice for the same `(object, key)` returns
//! the same observer for as long as the object lives.

use std::rc::Rc;

use tracing::trace;

use super::{
    get_collection_observer, CollectionObserver, ComputedObserver, CustomSetterObserver,
    DirtyChecker, InstalledObserver, PrimitiveObserver, PropertyObserver, SetterObserver,
};
use crate::config::ObservationConfig;
use crate::proxy::Proxied;
use crate::value::{ObjectRef, Property, Value};

struct LocatorInner {
    config: ObservationConfig,
    dirty_checker: Rc<DirtyChecker>,
}

/// Picks and caches observers. Cheap to clone.
#[derive(Clone)]
pub struct ObserverLocator {
    inner: Rc<LocatorInner>,
}

impl ObserverLocator {
    pub fn new(config: ObservationConfig) -> Self {
        let dirty_checker = DirtyChecker::new(config.dirty_check.clone());
        Self {
            inner: Rc::new(LocatorInner {
                config,
                dirty_checker,
            }),
        }
    }

    pub fn config(&self) -> &ObservationConfig {
        &self.inner.config
    }

    pub fn dirty_checker(&self) -> &Rc<DirtyChecker> {
        &self.inner.dirty_checker
    }

    /// The observer for `key` of `target`. Proxies are unwrapped first.
    pub fn get_observer(&self, target: &Value, key: &str) -> Rc<dyn PropertyObserver> {
        match target.raw() {
            Value::Object(object) => self.object_observer(&object, key),
            collection @ (Value::Array(_) | Value::Map(_) | Value::Set(_)) => {
                match get_collection_observer(&collection) {
                    Some(observer) => observer.property_observer(key, self),
                    None => Rc::new(PrimitiveObserver::new(collection, key)),
                }
            }
            primitive => Rc::new(PrimitiveObserver::new(primitive, key)),
        }
    }

    /// The observer of `collection`, or `None` if it is not a collection.
    pub fn get_collection_observer(&self, collection: &Value) -> Option<Rc<CollectionObserver>> {
        get_collection_observer(&collection.raw())
    }

    fn object_observer(&self, object: &ObjectRef, key: &str) -> Rc<dyn PropertyObserver> {
        if let Some(installed) = object.installed(key) {
            return installed.as_observer();
        }

        let installed = match object.descriptor(key) {
            Some(Property::Accessor(accessor)) if !accessor.is_configurable() => {
                let target = Value::Object(object.clone());
                InstalledObserver::DirtyCheck(self.inner.dirty_checker.create_property(&target, key))
            }
            Some(Property::Accessor(accessor)) => match accessor.getter {
                Some(getter) => InstalledObserver::Computed(ComputedObserver::new(
                    object,
                    key,
                    getter,
                    accessor.setter,
                    self,
                )),
                None => match accessor.setter {
                    Some(setter) => {
                        InstalledObserver::CustomSetter(CustomSetterObserver::new(object, key, setter))
                    }
                    // Neither getter nor setter: reads are undefined, writes fail.
                    None => InstalledObserver::Computed(ComputedObserver::new(
                        object,
                        key,
                        Rc::new(|_: &ObjectRef| Value::Undefined),
                        None,
                        self,
                    )),
                },
            },
            Some(Property::Data(_)) | None => InstalledObserver::Setter(SetterObserver::new(object, key)),
        };

        let observer = installed.as_observer();
        trace!(object = object.id().raw(), key, kind = ?observer.kind(), "observer installed");
        object.install(key, installed);
        observer
    }
}

impl Default for ObserverLocator {
    fn default() -> Self {
        Self::new(ObservationConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::ObserverKind;
    use crate::value::{Accessor, ArrayRef, MapRef};

    #[test]
    fn observers_are_cached_per_object_and_key() {
        let locator = ObserverLocator::default();
        let object = Value::from(ObjectRef::from_entries([("a", 1)]));

        let first = locator.get_observer(&object, "a");
        let again = locator.get_observer(&object.proxy(), "a");
        let other = ObserverLocator::default().get_observer(&object, "a");
        assert!(Rc::ptr_eq(&first, &again));
        assert!(Rc::ptr_eq(&first, &other));
        assert!(!Rc::ptr_eq(&first, &locator.get_observer(&object, "b")));
    }

    #[test]
    fn selection_follows_property_shape() {
        let locator = ObserverLocator::default();
        let object = ObjectRef::from_entries([("data", 1)]);
        object.define_accessor("computed", Accessor::new().getter(|_| Value::Null));
        object.define_accessor("write_only", Accessor::new().setter(|_, _| {}));
        let target = Value::from(object);

        let kind = |key: &str| locator.get_observer(&target, key).kind();
        assert_eq!(kind("data"), ObserverKind::Setter);
        assert_eq!(kind("missing"), ObserverKind::Setter);
        assert_eq!(kind("computed"), ObserverKind::Computed);
        assert_eq!(kind("write_only"), ObserverKind::CustomSetter);
    }

    #[test]
    fn selection_for_collections_and_primitives() {
        let mut config = ObservationConfig::default();
        config.dirty_check.warn = false;
        let locator = ObserverLocator::new(config);
        let array = Value::from(ArrayRef::from_values([1]));
        let map = Value::from(MapRef::new());

        assert_eq!(locator.get_observer(&array, "length").kind(), ObserverKind::CollectionLength);
        assert_eq!(locator.get_observer(&array, "0").kind(), ObserverKind::ArrayIndex);
        assert_eq!(locator.get_observer(&array, "foo").kind(), ObserverKind::DirtyCheck);
        let huge = locator.get_observer(&array, "18446744073709551615");
        assert_eq!(huge.kind(), ObserverKind::DirtyCheck);
        huge.set_value(Value::from(1)).unwrap();
        assert_eq!(array.as_array().unwrap().raw_len(), 1);
        assert_eq!(locator.get_observer(&map, "size").kind(), ObserverKind::CollectionSize);
        assert_eq!(locator.get_observer(&map, "length").kind(), ObserverKind::DirtyCheck);
        assert_eq!(locator.get_observer(&Value::from("s"), "length").kind(), ObserverKind::Primitive);
        assert!(locator.get_collection_observer(&Value::Null).is_none());
    }
}
