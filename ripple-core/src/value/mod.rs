//! Dynamic Values
//!
//! The observation engine watches identity-bearing objects and collections,
//! so it needs a heap with reference semantics. This module provides it:
//!
//! - [`Value`] is the dynamic value type flowing through observers.
//! - [`ObjectRef`], [`ArrayRef`], [`MapRef`] and [`SetRef`] are shared
//!   handles; cloning a handle never copies the underlying data.
//!
//! # Raw and proxy handles
//!
//! Every handle is either *raw* or a *proxy*. Both point at the same
//! allocation; a proxy additionally reports every read to the current
//! watcher (see [`crate::proxy`]). Equality distinguishes the two views,
//! the same way an identity comparison between an object and its proxy
//! would.
//!
//! # Equality
//!
//! - [`Value::strict_eq`]: `NaN != NaN`, `+0 == -0`. Used by setter observers.
//! - [`Value::same_value`]: `NaN == NaN`, `+0 != -0`. Used by computed
//!   observers and watchers, and by `PartialEq`.
//! - SameValueZero (`NaN == NaN`, `+0 == -0`) for map keys and `includes`.

mod array;
mod collection;
mod key;
mod object;

use std::cmp::Ordering;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

pub use array::ArrayRef;
pub use collection::{MapRef, SetRef};
pub use object::{Accessor, Getter, ObjectRef, Property, Setter};

pub(crate) use array::ArrayInner;
pub(crate) use collection::{MapInner, SetInner};
pub(crate) use object::ObjectInner;

use crate::error::ObservationError;
use crate::proxy::Proxied;

/// Identity of a heap allocation. Never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, AtomicOrdering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// A dynamically typed value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Object(ObjectRef),
    Array(ArrayRef),
    Map(MapRef),
    Set(SetRef),
}

impl Value {
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// `null` or `undefined`.
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    /// Whether this value is a heap handle (object or collection).
    pub fn is_handle(&self) -> bool {
        matches!(
            self,
            Value::Object(_) | Value::Array(_) | Value::Map(_) | Value::Set(_)
        )
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayRef> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&MapRef> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&SetRef> {
        match self {
            Value::Set(s) => Some(s),
            _ => None,
        }
    }

    /// Identity of the referenced allocation, if this is a handle.
    pub fn id(&self) -> Option<ObjectId> {
        match self {
            Value::Object(o) => Some(o.id()),
            Value::Array(a) => Some(a.id()),
            Value::Map(m) => Some(m.id()),
            Value::Set(s) => Some(s.id()),
            _ => None,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// Numeric coercion.
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    trimmed.parse().unwrap_or(f64::NAN)
                }
            }
            _ => f64::NAN,
        }
    }

    /// `NaN != NaN`, `+0 == -0`, handles compare by identity and view.
    pub fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            _ => self.same_identity(other),
        }
    }

    /// `NaN == NaN`, `+0 != -0`, handles compare by identity and view.
    pub fn same_value(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => {
                (a.is_nan() && b.is_nan()) || (a == b && a.is_sign_negative() == b.is_sign_negative())
            }
            _ => self.same_identity(other),
        }
    }

    /// `NaN == NaN`, `+0 == -0`.
    pub fn same_value_zero(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => (a.is_nan() && b.is_nan()) || a == b,
            _ => self.same_identity(other),
        }
    }

    fn same_identity(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Number(_), Value::Number(_)) => unreachable!("numbers are compared by the caller"),
            _ => match (self.id(), other.id()) {
                (Some(a), Some(b)) => a == b && self.is_proxy() == other.is_proxy(),
                _ => false,
            },
        }
    }

    /// Total order used by the default array sort: booleans, numbers,
    /// strings, handles (by identity), then `null` and `undefined` last.
    pub(crate) fn total_cmp(&self, other: &Value) -> Ordering {
        fn rank(value: &Value) -> u8 {
            match value {
                Value::Bool(_) => 0,
                Value::Number(_) => 1,
                Value::String(_) => 2,
                Value::Object(_) | Value::Array(_) | Value::Map(_) | Value::Set(_) => 3,
                Value::Null => 4,
                Value::Undefined => 5,
            }
        }

        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Number(a), Value::Number(b)) => a.total_cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            _ => rank(self)
                .cmp(&rank(other))
                .then_with(|| self.id().cmp(&other.id())),
        }
    }

    /// Read a named member. Proxy handles record the read on the current
    /// watcher, raw handles do not.
    pub fn get_member(&self, name: &str) -> Value {
        match self {
            Value::Object(o) => o.get(name),
            Value::Array(a) => {
                if name == "length" {
                    Value::from(a.len())
                } else if let Some(index) = parse_index(name) {
                    a.get(index)
                } else {
                    Value::Undefined
                }
            }
            Value::Map(m) if name == "size" => Value::from(m.size()),
            Value::Set(s) if name == "size" => Value::from(s.size()),
            Value::String(s) if name == "length" => Value::from(s.encode_utf16().count()),
            _ => Value::Undefined,
        }
    }

    /// Read a computed member (`value[key]`).
    pub fn get_keyed(&self, key: &Value) -> Value {
        match (self, key) {
            (Value::Array(a), Value::Number(n)) if *n >= 0.0 && n.fract() == 0.0 => a.get(*n as usize),
            (Value::Map(m), key) => m.get(key),
            _ => self.get_member(&key.to_string()),
        }
    }

    /// Untracked read used by observers: honours accessors and installed
    /// interceptors but never reports to the current watcher.
    pub(crate) fn read_property(&self, key: &str) -> Value {
        match self {
            Value::Object(o) => o.read(key),
            Value::Array(a) => {
                if key == "length" {
                    Value::from(a.raw_len())
                } else if let Some(index) = parse_index(key) {
                    a.raw_get(index)
                } else {
                    Value::Undefined
                }
            }
            Value::Map(m) if key == "size" => Value::from(m.raw_size()),
            Value::Set(s) if key == "size" => Value::from(s.raw_size()),
            Value::String(s) if key == "length" => Value::from(s.encode_utf16().count()),
            _ => Value::Undefined,
        }
    }

    /// Untracked write that bypasses interceptors.
    pub(crate) fn write_property(&self, key: &str, value: Value) -> Result<(), ObservationError> {
        match self {
            Value::Object(o) => o.write(key, value),
            Value::Array(a) => {
                if key == "length" {
                    if let Value::Number(n) = value {
                        if is_valid_array_length(n) {
                            a.set_length(n as usize);
                        }
                    }
                } else if let Some(index) = parse_index(key) {
                    a.set(index, value);
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    pub(crate) fn downgrade(&self) -> WeakValue {
        match self {
            Value::Object(o) => WeakValue::Object(Rc::downgrade(o.inner())),
            Value::Array(a) => WeakValue::Array(Rc::downgrade(a.inner())),
            Value::Map(m) => WeakValue::Map(Rc::downgrade(m.inner())),
            Value::Set(s) => WeakValue::Set(Rc::downgrade(s.inner())),
            primitive => WeakValue::Primitive(primitive.clone()),
        }
    }

    /// Build a value tree from JSON. Objects become [`ObjectRef`]s with data
    /// properties and arrays become [`ArrayRef`]s.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::from(s.as_str()),
            serde_json::Value::Array(items) => {
                Value::Array(ArrayRef::from_values(items.iter().map(Value::from_json)))
            }
            serde_json::Value::Object(map) => {
                let object = ObjectRef::new();
                for (key, value) in map {
                    object.write_data(key, Value::from_json(value));
                }
                Value::Object(object)
            }
        }
    }

    /// Snapshot this value as JSON without tracking. Maps become arrays of
    /// `[key, value]` pairs, sets become arrays, accessors are evaluated.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Undefined | Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 9.0e15 => {
                serde_json::Value::Number(serde_json::Number::from(*n as i64))
            }
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.to_string()),
            Value::Object(o) => serde_json::Value::Object(
                o.keys()
                    .into_iter()
                    .map(|key| {
                        let value = o.read(&key).to_json();
                        (key, value)
                    })
                    .collect(),
            ),
            Value::Array(a) => {
                serde_json::Value::Array(a.raw_values().iter().map(Value::to_json).collect())
            }
            Value::Map(m) => serde_json::Value::Array(
                m.raw_entries()
                    .into_iter()
                    .map(|(k, v)| serde_json::Value::Array(vec![k.to_json(), v.to_json()]))
                    .collect(),
            ),
            Value::Set(s) => {
                serde_json::Value::Array(s.raw_values().iter().map(Value::to_json).collect())
            }
        }
    }
}

/// Parse a canonical array index (`"0"`, `"12"`, never `"01"` or `"+1"`).
/// Keys from `"4294967295"` up are ordinary property names.
pub(crate) fn parse_index(key: &str) -> Option<usize> {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    if !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let index: u64 = key.parse().ok()?;
    if index >= 4_294_967_295 {
        return None;
    }
    usize::try_from(index).ok()
}

/// Largest valid array length is `2^32 - 1`; valid indices are below it.
pub(crate) fn is_valid_array_length(n: f64) -> bool {
    n >= 0.0 && n.fract() == 0.0 && n < 4_294_967_295.0
}

/// Weak counterpart of [`Value`]. Observers hold their targets through this
/// so that observation never extends an object's lifetime.
#[derive(Clone)]
pub(crate) enum WeakValue {
    Primitive(Value),
    Object(Weak<ObjectInner>),
    Array(Weak<ArrayInner>),
    Map(Weak<MapInner>),
    Set(Weak<SetInner>),
}

impl WeakValue {
    /// Upgrade to a raw handle, or `None` if the target was dropped.
    pub(crate) fn upgrade(&self) -> Option<Value> {
        match self {
            WeakValue::Primitive(value) => Some(value.clone()),
            WeakValue::Object(w) => w.upgrade().map(|inner| Value::Object(ObjectRef::from_inner(inner, false))),
            WeakValue::Array(w) => w.upgrade().map(|inner| Value::Array(ArrayRef::from_inner(inner, false))),
            WeakValue::Map(w) => w.upgrade().map(|inner| Value::Map(MapRef::from_inner(inner, false))),
            WeakValue::Set(w) => w.upgrade().map(|inner| Value::Set(SetRef::from_inner(inner, false))),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.same_value(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("Undefined"),
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Number(n) => write!(f, "Number({n})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Object(o) => fmt::Debug::fmt(o, f),
            Value::Array(a) => fmt::Debug::fmt(a, f),
            Value::Map(m) => fmt::Debug::fmt(m, f),
            Value::Set(s) => fmt::Debug::fmt(s, f),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => {
                if n.is_nan() {
                    f.write_str("NaN")
                } else if n.is_infinite() {
                    f.write_str(if *n > 0.0 { "Infinity" } else { "-Infinity" })
                } else if n.fract() == 0.0 && n.abs() < 1e21 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{n}")
                }
            }
            Value::String(s) => f.write_str(s),
            Value::Object(_) => f.write_str("[object Object]"),
            Value::Array(a) => {
                let parts: Vec<String> = a
                    .raw_values()
                    .iter()
                    .map(|v| if v.is_nullish() { String::new() } else { v.to_string() })
                    .collect();
                f.write_str(&parts.join(","))
            }
            Value::Map(_) => f.write_str("[object Map]"),
            Value::Set(_) => f.write_str("[object Set]"),
        }
    }
}

macro_rules! impl_from_number {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(n: $ty) -> Self {
                    Value::Number(n as f64)
                }
            }
        )*
    };
}

impl_from_number!(i32, i64, u32, u64, usize, f32, f64);

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<ObjectRef> for Value {
    fn from(o: ObjectRef) -> Self {
        Value::Object(o)
    }
}

impl From<ArrayRef> for Value {
    fn from(a: ArrayRef) -> Self {
        Value::Array(a)
    }
}

impl From<MapRef> for Value {
    fn from(m: MapRef) -> Self {
        Value::Map(m)
    }
}

impl From<SetRef> for Value {
    fn from(s: SetRef) -> Self {
        Value::Set(s)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Undefined)
    }
}
