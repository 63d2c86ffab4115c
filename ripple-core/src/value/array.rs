//! Arrays.
//!
//! Mutators perform the change on the backing vector first, then describe
//! it as a [`CollectionChange`] and hand it to the array's collection
//! observer, if one was ever created. Unobserved arrays never build a
//! change descriptor.
//!
//! Read methods on a proxy record one dependency per call: `len()` records
//! `length`, `get(i)` records the index `i`, everything else records the
//! whole collection. Callbacks and
//! results see proxied elements; stored values are always raw.

use std::cell::{OnceCell, RefCell};
use std::cmp::Ordering;
use std::fmt;
use std::iter;
use std::rc::Rc;

use super::{is_valid_array_length, ObjectId, Value};
use crate::observer::{CollectionChange, CollectionKind, CollectionObserver, IndexMapping, IndexSlot};
use crate::proxy::{self, Proxied};

pub(crate) struct ArrayInner {
    id: ObjectId,
    items: RefCell<Vec<Value>>,
    observer: OnceCell<Rc<CollectionObserver>>,
}

/// Handle to an array.
#[derive(Clone)]
pub struct ArrayRef {
    inner: Rc<ArrayInner>,
    proxied: bool,
}

impl ArrayRef {
    pub fn new() -> Self {
        Self::from_values(iter::empty::<Value>())
    }

    pub fn from_values<I>(values: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        Self {
            inner: Rc::new(ArrayInner {
                id: ObjectId::next(),
                items: RefCell::new(values.into_iter().map(|v| Into::<Value>::into(v).raw()).collect()),
                observer: OnceCell::new(),
            }),
            proxied: false,
        }
    }

    pub(crate) fn from_inner(inner: Rc<ArrayInner>, proxied: bool) -> Self {
        Self { inner, proxied }
    }

    pub(crate) fn inner(&self) -> &Rc<ArrayInner> {
        &self.inner
    }

    pub fn id(&self) -> ObjectId {
        self.inner.id
    }

    /// The collection observer of this array, created on first request.
    pub(crate) fn observer(&self) -> Rc<CollectionObserver> {
        Rc::clone(self.inner.observer.get_or_init(|| {
            CollectionObserver::new(CollectionKind::Array, Value::Array(self.raw()).downgrade())
        }))
    }

    fn emit(&self, change: impl FnOnce() -> CollectionChange) {
        if let Some(observer) = self.inner.observer.get().cloned() {
            observer.notify(&change());
        }
    }

    fn track_collection(&self) {
        if self.proxied {
            proxy::observe_collection(&Value::Array(self.raw()));
        }
    }

    fn wrap(&self, value: Value) -> Value {
        if self.proxied {
            value.proxy()
        } else {
            value
        }
    }

    fn wrap_array(&self, array: ArrayRef) -> ArrayRef {
        if self.proxied {
            array.proxy()
        } else {
            array
        }
    }

    /// Snapshot of the backing values, so callbacks may touch the array.
    fn snapshot(&self) -> Vec<Value> {
        self.inner.items.borrow().clone()
    }

    pub(crate) fn raw_len(&self) -> usize {
        self.inner.items.borrow().len()
    }

    pub(crate) fn raw_get(&self, index: usize) -> Value {
        self.inner.items.borrow().get(index).cloned().unwrap_or_default()
    }

    pub(crate) fn raw_values(&self) -> Vec<Value> {
        self.snapshot()
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn len(&self) -> usize {
        if self.proxied {
            proxy::observe_property(&Value::Array(self.raw()), "length");
        }
        self.raw_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Value {
        if self.proxied {
            proxy::observe_property(&Value::Array(self.raw()), &index.to_string());
        }
        self.wrap(self.raw_get(index))
    }

    pub fn values(&self) -> Vec<Value> {
        self.track_collection();
        self.snapshot().into_iter().map(|v| self.wrap(v)).collect()
    }

    pub fn iter(&self) -> std::vec::IntoIter<Value> {
        self.values().into_iter()
    }

    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(Value, usize),
    {
        for (index, value) in self.values().into_iter().enumerate() {
            f(value, index);
        }
    }

    pub fn map<F>(&self, mut f: F) -> ArrayRef
    where
        F: FnMut(Value, usize) -> Value,
    {
        let mapped: Vec<Value> = self
            .values()
            .into_iter()
            .enumerate()
            .map(|(index, value)| f(value, index))
            .collect();
        self.wrap_array(ArrayRef::from_values(mapped))
    }

    pub fn filter<F>(&self, mut f: F) -> ArrayRef
    where
        F: FnMut(&Value, usize) -> bool,
    {
        let kept: Vec<Value> = self
            .values()
            .into_iter()
            .enumerate()
            .filter(|(index, value)| f(value, *index))
            .map(|(_, value)| value)
            .collect();
        self.wrap_array(ArrayRef::from_values(kept))
    }

    pub fn find<F>(&self, mut f: F) -> Value
    where
        F: FnMut(&Value, usize) -> bool,
    {
        self.values()
            .into_iter()
            .enumerate()
            .find(|(index, value)| f(value, *index))
            .map(|(_, value)| value)
            .unwrap_or_default()
    }

    pub fn find_index<F>(&self, mut f: F) -> Option<usize>
    where
        F: FnMut(&Value, usize) -> bool,
    {
        self.values()
            .iter()
            .enumerate()
            .position(|(index, value)| f(value, index))
    }

    /// Position of the first element strictly equal to `needle`.
    pub fn index_of(&self, needle: &Value) -> Option<usize> {
        self.track_collection();
        let needle = needle.raw();
        self.inner.items.borrow().iter().position(|v| v.strict_eq(&needle))
    }

    /// SameValueZero membership, so `NaN` is found.
    pub fn includes(&self, needle: &Value) -> bool {
        self.track_collection();
        let needle = needle.raw();
        self.inner.items.borrow().iter().any(|v| v.same_value_zero(&needle))
    }

    pub fn some<F>(&self, mut f: F) -> bool
    where
        F: FnMut(&Value, usize) -> bool,
    {
        self.values().iter().enumerate().any(|(index, value)| f(value, index))
    }

    pub fn every<F>(&self, mut f: F) -> bool
    where
        F: FnMut(&Value, usize) -> bool,
    {
        self.values().iter().enumerate().all(|(index, value)| f(value, index))
    }

    pub fn reduce<F>(&self, mut f: F, initial: Value) -> Value
    where
        F: FnMut(Value, Value, usize) -> Value,
    {
        self.values()
            .into_iter()
            .enumerate()
            .fold(initial, |acc, (index, value)| f(acc, value, index))
    }

    /// Copy of `start..end`. Negative bounds count from the end.
    pub fn slice(&self, start: isize, end: Option<isize>) -> ArrayRef {
        self.track_collection();
        let items = self.snapshot();
        let len = items.len();
        let start = relative_index(start, len);
        let end = end.map_or(len, |end| relative_index(end, len));
        let sliced = if start < end { items[start..end].to_vec() } else { Vec::new() };
        self.wrap_array(ArrayRef::from_values(sliced))
    }

    pub fn join(&self, separator: &str) -> String {
        self.track_collection();
        self.snapshot()
            .iter()
            .map(|v| if v.is_nullish() { String::new() } else { v.to_string() })
            .collect::<Vec<_>>()
            .join(separator)
    }

    // ------------------------------------------------------------------
    // Mutators
    // ------------------------------------------------------------------

    /// Append values; returns the new length. One notification per call.
    pub fn push<I>(&self, values: I) -> usize
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(|v| Into::<Value>::into(v).raw()).collect();
        let added = values.len();
        let (old_len, new_len) = {
            let mut items = self.inner.items.borrow_mut();
            let old_len = items.len();
            items.extend(values);
            (old_len, items.len())
        };
        if added > 0 {
            self.emit(|| {
                let mut mapping = IndexMapping::identity(old_len);
                mapping.indices.extend(iter::repeat(IndexSlot::Added).take(added));
                CollectionChange::Indexed(mapping)
            });
        }
        new_len
    }

    pub fn pop(&self) -> Value {
        let (removed, new_len) = {
            let mut items = self.inner.items.borrow_mut();
            let removed = items.pop();
            (removed, items.len())
        };
        let Some(item) = removed else {
            return Value::Undefined;
        };
        self.emit(|| {
            let mut mapping = IndexMapping::identity(new_len);
            mapping.deleted_indices.push(new_len);
            mapping.deleted_items.push(item.clone());
            CollectionChange::Indexed(mapping)
        });
        self.wrap(item)
    }

    pub fn shift(&self) -> Value {
        let (removed, new_len) = {
            let mut items = self.inner.items.borrow_mut();
            let removed = if items.is_empty() { None } else { Some(items.remove(0)) };
            (removed, items.len())
        };
        let Some(item) = removed else {
            return Value::Undefined;
        };
        self.emit(|| {
            let indices = (1..=new_len).map(IndexSlot::Moved).collect();
            CollectionChange::Indexed(IndexMapping {
                indices,
                deleted_indices: vec![0],
                deleted_items: vec![item.clone()],
            })
        });
        self.wrap(item)
    }

    /// Prepend values; returns the new length.
    pub fn unshift<I>(&self, values: I) -> usize
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(|v| Into::<Value>::into(v).raw()).collect();
        let added = values.len();
        let (old_len, new_len) = {
            let mut items = self.inner.items.borrow_mut();
            let old_len = items.len();
            items.splice(0..0, values);
            (old_len, items.len())
        };
        if added > 0 {
            self.emit(|| {
                let indices = iter::repeat(IndexSlot::Added)
                    .take(added)
                    .chain((0..old_len).map(IndexSlot::Moved))
                    .collect();
                CollectionChange::Indexed(IndexMapping {
                    indices,
                    ..IndexMapping::default()
                })
            });
        }
        new_len
    }

    /// Remove `delete_count` elements at `start` (all remaining when `None`)
    /// and insert `values` in their place. Returns the removed elements.
    pub fn splice<I>(&self, start: isize, delete_count: Option<usize>, values: I) -> ArrayRef
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(|v| Into::<Value>::into(v).raw()).collect();
        let inserted = values.len();
        let (removed, old_len, start) = {
            let mut items = self.inner.items.borrow_mut();
            let len = items.len();
            let start = relative_index(start, len);
            let count = delete_count.unwrap_or(len - start).min(len - start);
            let removed: Vec<Value> = items.splice(start..start + count, values).collect();
            (removed, len, start)
        };
        let deleted = removed.len();
        if deleted > 0 || inserted > 0 {
            self.emit(|| {
                let indices = (0..start)
                    .map(IndexSlot::Moved)
                    .chain(iter::repeat(IndexSlot::Added).take(inserted))
                    .chain((start + deleted..old_len).map(IndexSlot::Moved))
                    .collect();
                CollectionChange::Indexed(IndexMapping {
                    indices,
                    deleted_indices: (start..start + deleted).collect(),
                    deleted_items: removed.clone(),
                })
            });
        }
        self.wrap_array(ArrayRef::from_values(removed))
    }

    /// Reverse in place. Recorded as a whole-collection read on proxies.
    pub fn reverse(&self) -> ArrayRef {
        let len = {
            let mut items = self.inner.items.borrow_mut();
            items.reverse();
            items.len()
        };
        self.track_collection();
        if len > 0 {
            self.emit(|| {
                CollectionChange::Indexed(IndexMapping {
                    indices: (0..len).rev().map(IndexSlot::Moved).collect(),
                    ..IndexMapping::default()
                })
            });
        }
        self.clone()
    }

    /// Sort in place by [`Value`]'s total order: booleans, numbers,
    /// strings, handles, then `null` and `undefined`.
    pub fn sort(&self) -> ArrayRef {
        self.sort_by(Value::total_cmp)
    }

    /// Stable sort in place. The comparator sees raw elements.
    pub fn sort_by<F>(&self, mut compare: F) -> ArrayRef
    where
        F: FnMut(&Value, &Value) -> Ordering,
    {
        self.track_collection();
        // The array is untouched until the sort completes.
        let mut indexed: Vec<(usize, Value)> = self.snapshot().into_iter().enumerate().collect();
        if indexed.len() < 2 {
            return self.clone();
        }
        indexed.sort_by(|(_, a), (_, b)| compare(a, b));

        let (permutation, sorted): (Vec<usize>, Vec<Value>) = indexed.into_iter().unzip();
        *self.inner.items.borrow_mut() = sorted;
        self.emit(|| {
            CollectionChange::Indexed(IndexMapping {
                indices: permutation.into_iter().map(IndexSlot::Moved).collect(),
                ..IndexMapping::default()
            })
        });
        self.clone()
    }

    /// Write one element, padding with `undefined` past the end.
    /// Indices of `2^32 - 1` and above are not array indices and are ignored.
    pub fn set(&self, index: usize, value: impl Into<Value>) {
        if !is_valid_array_length(index as f64) {
            return;
        }
        let value: Value = value.into();
        let value = value.raw();
        let (old_len, previous) = {
            let mut items = self.inner.items.borrow_mut();
            let old_len = items.len();
            if index < old_len {
                if items[index].strict_eq(&value) {
                    return;
                }
                (old_len, Some(std::mem::replace(&mut items[index], value)))
            } else {
                items.resize(index, Value::Undefined);
                items.push(value);
                (old_len, None)
            }
        };
        self.emit(|| match previous {
            Some(previous) => {
                let mut mapping = IndexMapping::identity(old_len);
                mapping.indices[index] = IndexSlot::Added;
                mapping.deleted_indices.push(index);
                mapping.deleted_items.push(previous);
                CollectionChange::Indexed(mapping)
            }
            None => {
                let mut mapping = IndexMapping::identity(old_len);
                mapping.indices.extend(iter::repeat(IndexSlot::Added).take(index + 1 - old_len));
                CollectionChange::Indexed(mapping)
            }
        });
    }

    /// Truncate or extend (with `undefined`) to exactly `len` elements.
    pub fn set_length(&self, len: usize) {
        let (old_len, removed) = {
            let mut items = self.inner.items.borrow_mut();
            let old_len = items.len();
            let removed = if len < old_len {
                items.split_off(len)
            } else {
                items.resize(len, Value::Undefined);
                Vec::new()
            };
            (old_len, removed)
        };
        if len == old_len {
            return;
        }
        self.emit(|| {
            if len < old_len {
                CollectionChange::Indexed(IndexMapping {
                    indices: (0..len).map(IndexSlot::Moved).collect(),
                    deleted_indices: (len..old_len).collect(),
                    deleted_items: removed,
                })
            } else {
                let mut mapping = IndexMapping::identity(old_len);
                mapping.indices.extend(iter::repeat(IndexSlot::Added).take(len - old_len));
                CollectionChange::Indexed(mapping)
            }
        });
    }

    /// Remove every element. Reported as [`CollectionChange::Reset`].
    pub fn clear(&self) {
        let had_items = {
            let mut items = self.inner.items.borrow_mut();
            let had_items = !items.is_empty();
            items.clear();
            had_items
        };
        if had_items {
            self.emit(|| CollectionChange::Reset);
        }
    }
}

/// Resolve a possibly negative position against `len`, clamped to `0..=len`.
fn relative_index(position: isize, len: usize) -> usize {
    if position < 0 {
        len.saturating_sub(position.unsigned_abs())
    } else {
        (position as usize).min(len)
    }
}

impl Default for ArrayRef {
    fn default() -> Self {
        Self::new()
    }
}

impl Proxied for ArrayRef {
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

impl fmt::Debug for ArrayRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = if self.proxied { "Proxy(Array" } else { "Array" };
        write!(f, "{label}#{}", self.id().raw())?;
        if self.proxied {
            f.write_str(")")?;
        }
        f.debug_list().entries(self.inner.items.borrow().iter()).finish()
    }
}
