//! Observer for properties of primitive values.

use super::{Observable, ObserverKind, PropertyObserver};
use crate::error::ObservationError;
use crate::reactive::{Subscriber, SubscriberId};
use crate::value::Value;

/// Primitives are immutable, so there is nothing to observe: `set` and
/// `subscribe` are no-ops and no notification is ever sent.
pub struct PrimitiveObserver {
    target: Value,
    key: String,
}

impl PrimitiveObserver {
    pub(crate) fn new(target: Value, key: &str) -> Self {
        Self {
            target,
            key: key.to_string(),
        }
    }
}

impl Observable for PrimitiveObserver {
    fn subscribe(&self, _: Subscriber) {}

    fn unsubscribe(&self, _: SubscriberId) {}

    fn subscriber_count(&self) -> usize {
        0
    }
}

impl PropertyObserver for PrimitiveObserver {
    /// `length` of strings; `undefined` for everything else.
    fn get_value(&self) -> Value {
        match (&self.target, self.key.as_str()) {
            (Value::String(s), "length") => Value::from(s.encode_utf16().count()),
            _ => Value::Undefined,
        }
    }

    fn set_value(&self, _: Value) -> Result<(), ObservationError> {
        Ok(())
    }

    fn kind(&self) -> ObserverKind {
        ObserverKind::Primitive
    }
}
