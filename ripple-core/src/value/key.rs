//! Map and set keys with SameValueZero semantics.

use std::hash::{Hash, Hasher};

use super::Value;
use crate::proxy::Proxied;

/// A raw [`Value`] usable as a map or set key.
///
/// Keys are always stored unwrapped so that a proxy and its raw target
/// address the same entry.
#[derive(Clone, Debug)]
pub(crate) struct MapKey(Value);

impl MapKey {
    pub(crate) fn new(value: Value) -> Self {
        Self(value.raw())
    }

    pub(crate) fn value(&self) -> &Value {
        &self.0
    }

    pub(crate) fn into_value(self) -> Value {
        self.0
    }
}

impl PartialEq for MapKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.same_value_zero(&other.0)
    }
}

impl Eq for MapKey {}

impl Hash for MapKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match &self.0 {
            Value::Undefined => 0u8.hash(state),
            Value::Null => 1u8.hash(state),
            Value::Bool(b) => {
                2u8.hash(state);
                b.hash(state);
            }
            Value::Number(n) => {
                3u8.hash(state);
                // +0 and -0 are one key, as are all NaNs.
                let bits = if *n == 0.0 {
                    0u64
                } else if n.is_nan() {
                    f64::NAN.to_bits()
                } else {
                    n.to_bits()
                };
                bits.hash(state);
            }
            Value::String(s) => {
                4u8.hash(state);
                s.hash(state);
            }
            handle => {
                5u8.hash(state);
                handle.id().hash(state);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ObjectRef;
    use std::collections::HashSet;

    #[test]
    fn zero_and_nan_keys_collapse() {
        let mut keys = HashSet::new();
        keys.insert(MapKey::new(Value::Number(0.0)));
        keys.insert(MapKey::new(Value::Number(-0.0)));
        keys.insert(MapKey::new(Value::Number(f64::NAN)));
        keys.insert(MapKey::new(Value::Number(f64::NAN)));
        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn proxy_and_raw_are_the_same_key() {
        let object = ObjectRef::new();
        let raw = MapKey::new(Value::from(object.clone()));
        let proxied = MapKey::new(Value::from(object.proxy()));
        assert_eq!(raw, proxied);
        assert!(!raw.value().is_proxy());
    }
}
