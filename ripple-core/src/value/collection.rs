//! Keyed collections: insertion-ordered maps and sets.
//!
//! Keys compare with SameValueZero and are stored raw. Change descriptors
//! use insertion positions, so observers can treat maps and sets like
//! arrays of entries.

use std::cell::{OnceCell, RefCell};
use std::fmt;
use std::iter;
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};

use super::key::MapKey;
use super::{ObjectId, Value};
use crate::observer::{CollectionChange, CollectionKind, CollectionObserver, IndexMapping, IndexSlot};
use crate::proxy::{self, Proxied};

pub(crate) struct MapInner {
    id: ObjectId,
    entries: RefCell<IndexMap<MapKey, Value>>,
    observer: OnceCell<Rc<CollectionObserver>>,
}

pub(crate) struct SetInner {
    id: ObjectId,
    items: RefCell<IndexSet<MapKey>>,
    observer: OnceCell<Rc<CollectionObserver>>,
}

/// Handle to a map.
#[derive(Clone)]
pub struct MapRef {
    inner: Rc<MapInner>,
    proxied: bool,
}

/// Handle to a set.
#[derive(Clone)]
pub struct SetRef {
    inner: Rc<SetInner>,
    proxied: bool,
}

fn notify(slot: &OnceCell<Rc<CollectionObserver>>, change: impl FnOnce() -> CollectionChange) {
    if let Some(observer) = slot.get().cloned() {
        observer.notify(&change());
    }
}

/// Mapping for removing the entry at `index` out of `old_len`.
fn removal(old_len: usize, index: usize, item: Value) -> CollectionChange {
    CollectionChange::Indexed(IndexMapping {
        indices: (0..old_len)
            .filter(|&i| i != index)
            .map(IndexSlot::Moved)
            .collect(),
        deleted_indices: vec![index],
        deleted_items: vec![item],
    })
}

fn appended(old_len: usize) -> CollectionChange {
    let mut mapping = IndexMapping::identity(old_len);
    mapping.indices.push(IndexSlot::Added);
    CollectionChange::Indexed(mapping)
}

impl MapRef {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(MapInner {
                id: ObjectId::next(),
                entries: RefCell::new(IndexMap::new()),
                observer: OnceCell::new(),
            }),
            proxied: false,
        }
    }

    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Value>,
        V: Into<Value>,
    {
        let map = Self::new();
        {
            let mut slots = map.inner.entries.borrow_mut();
            for (key, value) in entries {
                let value: Value = value.into();
                slots.insert(MapKey::new(key.into()), value.raw());
            }
        }
        map
    }

    pub(crate) fn from_inner(inner: Rc<MapInner>, proxied: bool) -> Self {
        Self { inner, proxied }
    }

    pub(crate) fn inner(&self) -> &Rc<MapInner> {
        &self.inner
    }

    pub fn id(&self) -> ObjectId {
        self.inner.id
    }

    pub(crate) fn observer(&self) -> Rc<CollectionObserver> {
        Rc::clone(self.inner.observer.get_or_init(|| {
            CollectionObserver::new(CollectionKind::Map, Value::Map(self.raw()).downgrade())
        }))
    }

    fn track_collection(&self) {
        if self.proxied {
            proxy::observe_collection(&Value::Map(self.raw()));
        }
    }

    fn wrap(&self, value: Value) -> Value {
        if self.proxied {
            value.proxy()
        } else {
            value
        }
    }

    pub(crate) fn raw_size(&self) -> usize {
        self.inner.entries.borrow().len()
    }

    pub(crate) fn raw_entries(&self) -> Vec<(Value, Value)> {
        self.inner
            .entries
            .borrow()
            .iter()
            .map(|(k, v)| (k.value().clone(), v.clone()))
            .collect()
    }

    /// Number of entries. Tracked as `size` on proxies.
    pub fn size(&self) -> usize {
        if self.proxied {
            proxy::observe_property(&Value::Map(self.raw()), "size");
        }
        self.raw_size()
    }

    pub fn get(&self, key: &Value) -> Value {
        self.track_collection();
        let value = self
            .inner
            .entries
            .borrow()
            .get(&MapKey::new(key.clone()))
            .cloned()
            .unwrap_or_default();
        self.wrap(value)
    }

    pub fn has(&self, key: &Value) -> bool {
        self.track_collection();
        self.inner.entries.borrow().contains_key(&MapKey::new(key.clone()))
    }

    /// Insert or replace. Replacing with a strictly equal value is silent.
    pub fn set(&self, key: impl Into<Value>, value: impl Into<Value>) -> &Self {
        let key = MapKey::new(key.into());
        let value: Value = value.into();
        let value = value.raw();
        let (old_len, replaced) = {
            let mut entries = self.inner.entries.borrow_mut();
            let old_len = entries.len();
            match entries.get_full_mut(&key) {
                Some((index, _, slot)) => {
                    if slot.strict_eq(&value) {
                        return self;
                    }
                    (old_len, Some((index, std::mem::replace(slot, value))))
                }
                None => {
                    entries.insert(key, value);
                    (old_len, None)
                }
            }
        };
        notify(&self.inner.observer, || match replaced {
            Some((index, previous)) => {
                let mut mapping = IndexMapping::identity(old_len);
                mapping.indices[index] = IndexSlot::Added;
                mapping.deleted_indices.push(index);
                mapping.deleted_items.push(previous);
                CollectionChange::Indexed(mapping)
            }
            None => appended(old_len),
        });
        self
    }

    /// Remove an entry; returns whether it existed.
    pub fn delete(&self, key: &Value) -> bool {
        let removed = {
            let mut entries = self.inner.entries.borrow_mut();
            let old_len = entries.len();
            entries
                .shift_remove_full(&MapKey::new(key.clone()))
                .map(|(index, _, value)| (old_len, index, value))
        };
        match removed {
            Some((old_len, index, value)) => {
                notify(&self.inner.observer, || removal(old_len, index, value));
                true
            }
            None => false,
        }
    }

    pub fn clear(&self) {
        let had_entries = {
            let mut entries = self.inner.entries.borrow_mut();
            let had_entries = !entries.is_empty();
            entries.clear();
            had_entries
        };
        if had_entries {
            notify(&self.inner.observer, || CollectionChange::Reset);
        }
    }

    pub fn keys(&self) -> Vec<Value> {
        self.entries().into_iter().map(|(k, _)| k).collect()
    }

    pub fn values(&self) -> Vec<Value> {
        self.entries().into_iter().map(|(_, v)| v).collect()
    }

    pub fn entries(&self) -> Vec<(Value, Value)> {
        self.track_collection();
        self.raw_entries()
            .into_iter()
            .map(|(k, v)| (self.wrap(k), self.wrap(v)))
            .collect()
    }

    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(Value, Value),
    {
        for (key, value) in self.entries() {
            f(value, key);
        }
    }
}

impl SetRef {
    pub fn new() -> Self {
        Self::from_values(iter::empty::<Value>())
    }

    pub fn from_values<I>(values: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        Self {
            inner: Rc::new(SetInner {
                id: ObjectId::next(),
                items: RefCell::new(values.into_iter().map(|v| MapKey::new(v.into())).collect()),
                observer: OnceCell::new(),
            }),
            proxied: false,
        }
    }

    pub(crate) fn from_inner(inner: Rc<SetInner>, proxied: bool) -> Self {
        Self { inner, proxied }
    }

    pub(crate) fn inner(&self) -> &Rc<SetInner> {
        &self.inner
    }

    pub fn id(&self) -> ObjectId {
        self.inner.id
    }

    pub(crate) fn observer(&self) -> Rc<CollectionObserver> {
        Rc::clone(self.inner.observer.get_or_init(|| {
            CollectionObserver::new(CollectionKind::Set, Value::Set(self.raw()).downgrade())
        }))
    }

    fn track_collection(&self) {
        if self.proxied {
            proxy::observe_collection(&Value::Set(self.raw()));
        }
    }

    pub(crate) fn raw_size(&self) -> usize {
        self.inner.items.borrow().len()
    }

    pub(crate) fn raw_values(&self) -> Vec<Value> {
        self.inner.items.borrow().iter().map(|k| k.value().clone()).collect()
    }

    /// Number of members. Tracked as `size` on proxies.
    pub fn size(&self) -> usize {
        if self.proxied {
            proxy::observe_property(&Value::Set(self.raw()), "size");
        }
        self.raw_size()
    }

    pub fn has(&self, value: &Value) -> bool {
        self.track_collection();
        self.inner.items.borrow().contains(&MapKey::new(value.clone()))
    }

    /// Add a member. Adding an existing member is silent.
    pub fn add(&self, value: impl Into<Value>) -> &Self {
        let inserted = {
            let mut items = self.inner.items.borrow_mut();
            let old_len = items.len();
            items.insert(MapKey::new(value.into())).then_some(old_len)
        };
        if let Some(old_len) = inserted {
            notify(&self.inner.observer, || appended(old_len));
        }
        self
    }

    pub fn delete(&self, value: &Value) -> bool {
        let removed = {
            let mut items = self.inner.items.borrow_mut();
            let old_len = items.len();
            items
                .shift_remove_full(&MapKey::new(value.clone()))
                .map(|(index, key)| (old_len, index, key.into_value()))
        };
        match removed {
            Some((old_len, index, item)) => {
                notify(&self.inner.observer, || removal(old_len, index, item));
                true
            }
            None => false,
        }
    }

    pub fn clear(&self) {
        let had_items = {
            let mut items = self.inner.items.borrow_mut();
            let had_items = !items.is_empty();
            items.clear();
            had_items
        };
        if had_items {
            notify(&self.inner.observer, || CollectionChange::Reset);
        }
    }

    pub fn values(&self) -> Vec<Value> {
        self.track_collection();
        self.raw_values()
            .into_iter()
            .map(|v| if self.proxied { v.proxy() } else { v })
            .collect()
    }

    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(Value),
    {
        for value in self.values() {
            f(value);
        }
    }
}

impl Default for MapRef {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for SetRef {
    fn default() -> Self {
        Self::new()
    }
}

impl Proxied for MapRef {
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

impl Proxied for SetRef {
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

impl fmt::Debug for MapRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.proxied {
            write!(f, "Proxy(Map#{})", self.id().raw())
        } else {
            write!(f, "Map#{}", self.id().raw())
        }
    }
}

impl fmt::Debug for SetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.proxied {
            write!(f, "Proxy(Set#{})", self.id().raw())
        } else {
            write!(f, "Set#{}", self.id().raw())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::{get_collection_observer, Observable};
    use crate::reactive::{CollectionSubscriber, Subscriber, SubscriberId};
    use crate::value::ObjectRef;

    #[derive(Default)]
    struct Counter {
        changes: RefCell<Vec<CollectionChange>>,
    }

    impl CollectionSubscriber for Counter {
        fn handle_collection_change(&self, change: &CollectionChange) {
            self.changes.borrow_mut().push(change.clone());
        }
    }

    fn watch(target: Value) -> Rc<Counter> {
        let counter = Rc::new(Counter::default());
        get_collection_observer(&target)
            .unwrap()
            .subscribe(Subscriber::collection(SubscriberId::new(), &counter));
        counter
    }

    #[test]
    fn map_set_then_delete() {
        let map = MapRef::new();
        let counter = watch(Value::Map(map.clone()));

        map.set("a", 1).set("b", 2);
        assert_eq!(map.size(), 2);
        assert!(map.delete(&Value::from("a")));
        assert!(!map.delete(&Value::from("a")));

        let changes = counter.changes.borrow();
        assert_eq!(changes.len(), 3);
        match &changes[2] {
            CollectionChange::Indexed(mapping) => {
                assert_eq!(mapping.indices, vec![IndexSlot::Moved(1)]);
                assert_eq!(mapping.deleted_items, vec![Value::from(1)]);
            }
            CollectionChange::Reset => panic!("expected indexed change"),
        }
    }

    #[test]
    fn map_overwrite_with_equal_value_is_silent() {
        let map = MapRef::from_entries([("k", 1)]);
        let counter = watch(Value::Map(map.clone()));

        map.set("k", 1);
        assert!(counter.changes.borrow().is_empty());
        map.set("k", 2);
        assert_eq!(counter.changes.borrow().len(), 1);
        assert_eq!(map.get(&Value::from("k")), Value::from(2));
    }

    #[test]
    fn object_keys_use_identity() {
        let key = ObjectRef::new();
        let map = MapRef::new();
        map.set(key.clone(), "found");

        assert_eq!(map.get(&Value::from(key.proxy())), Value::from("found"));
        assert_eq!(map.get(&Value::from(ObjectRef::new())), Value::Undefined);
    }

    #[test]
    fn set_ignores_duplicates() {
        let set = SetRef::new();
        let counter = watch(Value::Set(set.clone()));

        set.add(1).add(1).add(-0.0).add(0);
        assert_eq!(set.size(), 2);
        assert_eq!(counter.changes.borrow().len(), 2);
    }

    #[test]
    fn clear_reports_reset_only_when_non_empty() {
        let set = SetRef::from_values(["x"]);
        let counter = watch(Value::Set(set.clone()));

        set.clear();
        set.clear();
        let changes = counter.changes.borrow();
        assert_eq!(changes.len(), 1);
        assert!(matches!(changes[0], CollectionChange::Reset));
    }
}
