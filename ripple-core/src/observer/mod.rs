//! Property and Collection Observers
//!
//! An observer turns mutations of one property (or one collection) into
//! notifications on a [`SubscriberRecord`](crate::reactive::SubscriberRecord).
//! Hosts obtain observers from an [`ObserverLocator`], which picks a
//! strategy per target and key:
//!
//! | target / property                 | observer                   |
//! |-----------------------------------|----------------------------|
//! | primitive value                   | [`PrimitiveObserver`]        |
//! | array `length`                    | [`CollectionLengthObserver`] |
//! | map/set `size`                    | [`CollectionSizeObserver`]   |
//! | array index                       | [`ArrayIndexObserver`]       |
//! | other collection keys             | [`DirtyCheckProperty`]       |
//! | object: missing or data property  | [`SetterObserver`]           |
//! | object: non-configurable accessor | [`DirtyCheckProperty`]       |
//! | object: accessor with getter      | [`ComputedObserver`]         |
//! | object: accessor with setter only | [`CustomSetterObserver`]     |
//!
//! Object observers are cached on the object itself and intercept every
//! write made through [`ObjectRef::set`](crate::value::ObjectRef::set).

mod collection;
mod computed;
mod dirty_check;
mod length;
mod locator;
mod primitive;
mod setter;

use std::rc::Rc;

pub use collection::{
    get_collection_observer, CollectionChange, CollectionKind, CollectionObserver, IndexMapping,
    IndexSlot,
};
pub use computed::ComputedObserver;
pub use dirty_check::{DirtyCheckProperty, DirtyChecker};
pub use length::{ArrayIndexObserver, CollectionLengthObserver, CollectionSizeObserver};
pub use locator::ObserverLocator;
pub use primitive::PrimitiveObserver;
pub use setter::{CustomSetterObserver, SetterObserver};

use crate::error::ObservationError;
use crate::reactive::{Subscriber, SubscriberId};
use crate::value::Value;

/// Something subscribers can register with.
pub trait Observable {
    fn subscribe(&self, subscriber: Subscriber);

    fn unsubscribe(&self, id: SubscriberId);

    fn subscriber_count(&self) -> usize;
}

/// Observer of a single property.
pub trait PropertyObserver: Observable {
    fn get_value(&self) -> Value;

    fn set_value(&self, value: Value) -> Result<(), ObservationError>;

    fn kind(&self) -> ObserverKind;
}

/// Observation strategy of a [`PropertyObserver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObserverKind {
    Primitive,
    Setter,
    CustomSetter,
    Computed,
    DirtyCheck,
    CollectionLength,
    CollectionSize,
    ArrayIndex,
}

/// Observer installed on an object property.
#[derive(Clone)]
pub(crate) enum InstalledObserver {
    Setter(Rc<SetterObserver>),
    CustomSetter(Rc<CustomSetterObserver>),
    Computed(Rc<ComputedObserver>),
    DirtyCheck(Rc<DirtyCheckProperty>),
}

impl InstalledObserver {
    pub(crate) fn as_observer(&self) -> Rc<dyn PropertyObserver> {
        match self {
            InstalledObserver::Setter(o) => Rc::clone(o) as Rc<dyn PropertyObserver>,
            InstalledObserver::CustomSetter(o) => Rc::clone(o) as Rc<dyn PropertyObserver>,
            InstalledObserver::Computed(o) => Rc::clone(o) as Rc<dyn PropertyObserver>,
            InstalledObserver::DirtyCheck(o) => Rc::clone(o) as Rc<dyn PropertyObserver>,
        }
    }
}
