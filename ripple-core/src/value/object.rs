//! Plain objects: ordered property bags with data and accessor properties.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use super::{ObjectId, Value};
use crate::error::ObservationError;
use crate::observer::{InstalledObserver, PropertyObserver};
use crate::proxy::{self, Proxied};

/// Getter of an accessor property. Receives the handle the read went
/// through, so a getter invoked on a proxy reads through the proxy too.
pub type Getter = Rc<dyn Fn(&ObjectRef) -> Value>;

/// Setter of an accessor property.
pub type Setter = Rc<dyn Fn(&ObjectRef, Value)>;

/// An accessor property definition.
#[derive(Clone)]
pub struct Accessor {
    pub(crate) getter: Option<Getter>,
    pub(crate) setter: Option<Setter>,
    pub(crate) configurable: bool,
}

impl Accessor {
    /// An accessor with neither getter nor setter, configurable.
    pub fn new() -> Self {
        Self {
            getter: None,
            setter: None,
            configurable: true,
        }
    }

    pub fn getter<F>(mut self, getter: F) -> Self
    where
        F: Fn(&ObjectRef) -> Value + 'static,
    {
        self.getter = Some(Rc::new(getter));
        self
    }

    pub fn setter<F>(mut self, setter: F) -> Self
    where
        F: Fn(&ObjectRef, Value) + 'static,
    {
        self.setter = Some(Rc::new(setter));
        self
    }

    /// Mark the accessor as non-configurable. Such properties cannot be
    /// intercepted and fall back to dirty checking.
    pub fn non_configurable(mut self) -> Self {
        self.configurable = false;
        self
    }

    pub fn has_getter(&self) -> bool {
        self.getter.is_some()
    }

    pub fn has_setter(&self) -> bool {
        self.setter.is_some()
    }

    pub fn is_configurable(&self) -> bool {
        self.configurable
    }
}

impl Default for Accessor {
    fn default() -> Self {
        Self::new()
    }
}

/// A property slot.
#[derive(Clone)]
pub enum Property {
    Data(Value),
    Accessor(Accessor),
}

pub(crate) struct ObjectInner {
    id: ObjectId,
    props: RefCell<IndexMap<Rc<str>, Property>>,
    /// Observers cached per key. Installed observers also intercept writes
    /// (and, for computed properties, reads) made through any handle.
    observers: RefCell<HashMap<Rc<str>, InstalledObserver>>,
}

/// Handle to a plain object.
///
/// # Example
///
/// ```rust,ignore
/// let user = ObjectRef::from_entries([("first", "Ada"), ("last", "Lovelace")]);
/// user.define_accessor(
///     "full",
///     Accessor::new().getter(|this| format!("{} {}", this.get("first"), this.get("last")).into()),
/// );
/// assert_eq!(user.get("full"), Value::from("Ada Lovelace"));
/// ```
#[derive(Clone)]
pub struct ObjectRef {
    inner: Rc<ObjectInner>,
    proxied: bool,
}

impl ObjectRef {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(ObjectInner {
                id: ObjectId::next(),
                props: RefCell::new(IndexMap::new()),
                observers: RefCell::new(HashMap::new()),
            }),
            proxied: false,
        }
    }

    /// Create an object with the given data properties.
    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let object = Self::new();
        for (key, value) in entries {
            let value: Value = value.into();
            object.write_data(key.as_ref(), value.raw());
        }
        object
    }

    pub(crate) fn from_inner(inner: Rc<ObjectInner>, proxied: bool) -> Self {
        Self { inner, proxied }
    }

    pub(crate) fn inner(&self) -> &Rc<ObjectInner> {
        &self.inner
    }

    pub fn id(&self) -> ObjectId {
        self.inner.id
    }

    /// Read a property. On a proxy this records a dependency on
    /// `(object, key)` and wraps object results in proxies.
    pub fn get(&self, key: &str) -> Value {
        if self.proxied {
            proxy::observe_property(&Value::Object(self.raw()), key);
            self.read(key).proxy()
        } else {
            self.read(key)
        }
    }

    /// Assign a property. Routed through the installed observer when the
    /// property is being observed. Fails only for accessors without setter.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<(), ObservationError> {
        let value: Value = value.into();
        let value = value.raw();
        match self.installed(key) {
            Some(observer) => observer.as_observer().set_value(value),
            None => self.write(key, value),
        }
    }

    /// Whether the property exists. Tracked on proxies.
    pub fn has(&self, key: &str) -> bool {
        if self.proxied {
            proxy::observe_property(&Value::Object(self.raw()), key);
        }
        self.contains_key(key)
    }

    /// Own property names in definition order. Never tracked.
    pub fn keys(&self) -> Vec<String> {
        self.inner.props.borrow().keys().map(|k| k.to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.props.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Define (or redefine) an accessor property.
    ///
    /// Accessors should be defined before the property is first observed;
    /// an observer already installed for `key` keeps its original strategy.
    pub fn define_accessor(&self, key: &str, accessor: Accessor) {
        self.define_property(key, Property::Accessor(accessor));
    }

    pub fn define_property(&self, key: &str, property: Property) {
        self.inner.props.borrow_mut().insert(Rc::from(key), property);
    }

    pub(crate) fn contains_key(&self, key: &str) -> bool {
        self.inner.props.borrow().contains_key(key)
    }

    pub(crate) fn descriptor(&self, key: &str) -> Option<Property> {
        self.inner.props.borrow().get(key).cloned()
    }

    /// Untracked read honouring installed computed observers.
    pub(crate) fn read(&self, key: &str) -> Value {
        if let Some(InstalledObserver::Computed(computed)) = self.installed(key) {
            return computed.get_value();
        }
        self.read_own(key)
    }

    /// Untracked read of the property itself, invoking getters.
    pub(crate) fn read_own(&self, key: &str) -> Value {
        match self.descriptor(key) {
            Some(Property::Data(value)) => value,
            Some(Property::Accessor(accessor)) => match accessor.getter {
                Some(getter) => getter(self),
                None => Value::Undefined,
            },
            None => Value::Undefined,
        }
    }

    /// Stored value of a data property; `undefined` for accessors.
    pub(crate) fn read_data(&self, key: &str) -> Value {
        match self.inner.props.borrow().get(key) {
            Some(Property::Data(value)) => value.clone(),
            _ => Value::Undefined,
        }
    }

    /// Untracked write bypassing installed observers.
    pub(crate) fn write(&self, key: &str, value: Value) -> Result<(), ObservationError> {
        match self.descriptor(key) {
            Some(Property::Accessor(accessor)) => match accessor.setter {
                Some(setter) => {
                    setter(self, value);
                    Ok(())
                }
                None => Err(ObservationError::ReadonlyProperty(key.to_string())),
            },
            _ => {
                self.write_data(key, value);
                Ok(())
            }
        }
    }

    pub(crate) fn write_data(&self, key: &str, value: Value) {
        let mut props = self.inner.props.borrow_mut();
        match props.get_mut(key) {
            Some(slot) => *slot = Property::Data(value),
            None => {
                props.insert(Rc::from(key), Property::Data(value));
            }
        }
    }

    pub(crate) fn installed(&self, key: &str) -> Option<InstalledObserver> {
        self.inner.observers.borrow().get(key).cloned()
    }

    pub(crate) fn install(&self, key: &str, observer: InstalledObserver) {
        self.inner
            .observers
            .borrow_mut()
            .insert(Rc::from(key), observer);
    }
}

impl Default for ObjectRef {
    fn default() -> Self {
        Self::new()
    }
}

impl Proxied for ObjectRef {
    fn proxy(&self) -> Self {
        Self::from_inner(Rc::clone(&self.inner), true)
    }

    fn raw(&self) -> Self {
        Self::from_inner(Rc::clone(&self.inner), false)
    }

    fn is_proxy(&self) -> bool {
        self.proxied
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.proxied {
            write!(f, "Proxy(Object#{})", self.id().raw())
        } else {
            write!(f, "Object#{}", self.id().raw())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn data_properties_round_trip() {
        let object = ObjectRef::from_entries([("a", 1)]);
        assert_eq!(object.get("a"), Value::from(1));
        assert_eq!(object.get("missing"), Value::Undefined);

        object.set("b", "two").unwrap();
        assert_eq!(object.keys(), vec!["a".to_string(), "b".to_string()]);
        assert!(object.has("b"));
    }

    #[test]
    fn accessors_receive_the_handle_used() {
        let object = ObjectRef::from_entries([("x", 2)]);
        object.define_accessor(
            "double",
            Accessor::new().getter(|this| Value::from(this.get("x").to_number() * 2.0)),
        );
        assert_eq!(object.get("double"), Value::from(4));

        let seen_proxy = Rc::new(Cell::new(false));
        let seen = Rc::clone(&seen_proxy);
        object.define_accessor(
            "lookup",
            Accessor::new().getter(move |this| {
                seen.set(this.is_proxy());
                Value::Undefined
            }),
        );
        object.proxy().get("lookup");
        assert!(seen_proxy.get());
    }

    #[test]
    fn setter_only_accessor_accepts_writes() {
        let object = ObjectRef::new();
        let last = Rc::new(RefCell::new(Value::Undefined));
        let sink = Rc::clone(&last);
        object.define_accessor(
            "sink",
            Accessor::new().setter(move |_, value| *sink.borrow_mut() = value),
        );

        object.set("sink", 7).unwrap();
        assert_eq!(*last.borrow(), Value::from(7));
        assert_eq!(object.get("sink"), Value::Undefined);
    }

    #[test]
    fn getter_only_accessor_is_readonly() {
        let object = ObjectRef::new();
        object.define_accessor("answer", Accessor::new().getter(|_| Value::from(42)));

        let err = object.set("answer", 1).unwrap_err();
        assert_eq!(err, ObservationError::ReadonlyProperty("answer".into()));
    }

    #[test]
    fn values_are_stored_raw() {
        let child = ObjectRef::new();
        let parent = ObjectRef::new().proxy();
        parent.set("child", child.proxy()).unwrap();

        assert!(!parent.raw().get("child").is_proxy());
        assert!(parent.get("child").is_proxy());
    }
}
