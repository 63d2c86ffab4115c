//! Transparent Proxy Layer
//!
//! A proxy is a handle over the same allocation as its raw target with a
//! tracking flag set. Reads through a proxy report to the current watcher;
//! writes are identical to raw writes, so observers fire either way.
//!
//! # How Tracking Works
//!
//! 1. A watcher enters the watcher stack and evaluates user code against
//!    proxied values.
//!
//! 2. Each read (`get`, `len`, `size`, iteration, ...) calls
//!    [`observe_property`] or [`observe_collection`] with the raw target.
//!
//! 3. Those forward to the current watcher, if watching is not paused.
//!
//! 4. Results that are handles come back proxied, so nested reads are
//!    tracked too. Values and keys passed in are unwrapped before storage.
//!
//! Because proxy and raw share one allocation, a raw object has exactly one
//! proxy identity for its whole lifetime, and `get_raw(get_proxy(x))` is
//! `x` by construction.

use crate::reactive;
use crate::value::Value;

/// Property names never reported to watchers.
pub const EXCLUDED_KEYS: [&str; 3] = ["constructor", "__proto__", "$raw"];

/// Conversion between raw and proxy views of a handle.
pub trait Proxied: Sized {
    /// The tracking view. Idempotent.
    fn proxy(&self) -> Self;

    /// The untracked view. Idempotent.
    fn raw(&self) -> Self;

    fn is_proxy(&self) -> bool;
}

impl Proxied for Value {
    fn proxy(&self) -> Self {
        match self {
            Value::Object(o) => Value::Object(o.proxy()),
            Value::Array(a) => Value::Array(a.proxy()),
            Value::Map(m) => Value::Map(m.proxy()),
            Value::Set(s) => Value::Set(s.proxy()),
            primitive => primitive.clone(),
        }
    }

    fn raw(&self) -> Self {
        match self {
            Value::Object(o) => Value::Object(o.raw()),
            Value::Array(a) => Value::Array(a.raw()),
            Value::Map(m) => Value::Map(m.raw()),
            Value::Set(s) => Value::Set(s.raw()),
            primitive => primitive.clone(),
        }
    }

    fn is_proxy(&self) -> bool {
        match self {
            Value::Object(o) => o.is_proxy(),
            Value::Array(a) => a.is_proxy(),
            Value::Map(m) => m.is_proxy(),
            Value::Set(s) => s.is_proxy(),
            _ => false,
        }
    }
}

/// The proxy view of `value`. Primitives are returned unchanged.
pub fn get_proxy<T: Proxied>(value: &T) -> T {
    value.proxy()
}

/// The raw view of `value`. Primitives are returned unchanged.
pub fn get_raw<T: Proxied>(value: &T) -> T {
    value.raw()
}

/// Proxy `value` if it is a handle, otherwise return it as is.
pub fn get_proxy_or_self(value: Value) -> Value {
    if value.is_handle() {
        value.proxy()
    } else {
        value
    }
}

pub fn get_raw_or_self(value: Value) -> Value {
    if value.is_proxy() {
        value.raw()
    } else {
        value
    }
}

/// Whether a proxy read right now would be recorded.
pub fn is_tracking() -> bool {
    reactive::is_watching() && reactive::current_watcher().is_some()
}

pub(crate) fn observe_property(raw: &Value, key: &str) {
    if EXCLUDED_KEYS.contains(&key) || !reactive::is_watching() {
        return;
    }
    if let Some(watcher) = reactive::current_watcher() {
        watcher.observe(raw, key);
    }
}

pub(crate) fn observe_collection(raw: &Value) {
    if !reactive::is_watching() {
        return;
    }
    if let Some(watcher) = reactive::current_watcher() {
        watcher.observe_collection(raw);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{ArrayRef, MapRef, ObjectRef, SetRef};

    #[test]
    fn raw_round_trip_for_every_handle_kind() {
        let handles = [
            Value::from(ObjectRef::new()),
            Value::from(ArrayRef::new()),
            Value::from(MapRef::new()),
            Value::from(SetRef::new()),
        ];
        for raw in handles {
            let proxy = get_proxy(&raw);
            assert!(proxy.is_proxy());
            assert_eq!(get_raw(&proxy), raw);
            assert_eq!(get_proxy(&proxy), proxy);
            assert_ne!(proxy, raw);
        }
    }

    #[test]
    fn primitives_pass_through() {
        let n = Value::from(3);
        assert_eq!(get_proxy_or_self(n.clone()), n);
        assert_eq!(get_raw_or_self(Value::Null), Value::Null);
        assert!(!Value::from("s").proxy().is_proxy());
    }

    #[test]
    fn nothing_is_tracked_outside_a_watcher() {
        assert!(!is_tracking());
        // Must not panic or record anything.
        ObjectRef::from_entries([("a", 1)]).proxy().get("a");
    }
}
