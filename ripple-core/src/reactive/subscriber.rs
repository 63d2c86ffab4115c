//! Subscribers and the subscriber record.
//!
//! A subscriber is anything that wants to hear about changes: watchers,
//! computed observers, derived length observers, or host code. Property
//! changes and collection changes are separate capabilities, and a
//! subscriber opts into each explicitly through the [`Subscriber`] variant
//! it registers with.
//!
//! Records hold subscribers weakly. Observation never keeps a subscriber
//! alive; a dropped subscriber is skipped and pruned on the next `add`.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;

use crate::observer::CollectionChange;
use crate::value::Value;

/// Unique identifier for a subscriber.
///
/// Each subscriber (watcher, computed observer, or host callback) gets a
/// unique ID when created. This ID is used to deduplicate subscriptions
/// and to match watcher stack frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// Receives scalar change notifications.
pub trait PropertySubscriber {
    fn handle_change(&self, new_value: &Value, old_value: &Value);
}

/// Receives collection change notifications.
pub trait CollectionSubscriber {
    fn handle_collection_change(&self, change: &CollectionChange);
}

/// A registered subscriber, tagged by the notifications it accepts.
#[derive(Clone)]
pub enum Subscriber {
    Property {
        id: SubscriberId,
        target: Weak<dyn PropertySubscriber>,
    },
    Collection {
        id: SubscriberId,
        target: Weak<dyn CollectionSubscriber>,
    },
    Both {
        id: SubscriberId,
        property: Weak<dyn PropertySubscriber>,
        collection: Weak<dyn CollectionSubscriber>,
    },
}

impl Subscriber {
    pub fn property<T: PropertySubscriber + 'static>(id: SubscriberId, target: &Rc<T>) -> Self {
        let weak: Weak<T> = Rc::downgrade(target);
        let target: Weak<dyn PropertySubscriber> = weak;
        Subscriber::Property { id, target }
    }

    pub fn collection<T: CollectionSubscriber + 'static>(id: SubscriberId, target: &Rc<T>) -> Self {
        let weak: Weak<T> = Rc::downgrade(target);
        let target: Weak<dyn CollectionSubscriber> = weak;
        Subscriber::Collection { id, target }
    }

    pub fn both<T>(id: SubscriberId, target: &Rc<T>) -> Self
    where
        T: PropertySubscriber + CollectionSubscriber + 'static,
    {
        let weak: Weak<T> = Rc::downgrade(target);
        let property: Weak<dyn PropertySubscriber> = weak.clone();
        let collection: Weak<dyn CollectionSubscriber> = weak;
        Subscriber::Both {
            id,
            property,
            collection,
        }
    }

    pub fn id(&self) -> SubscriberId {
        match self {
            Subscriber::Property { id, .. }
            | Subscriber::Collection { id, .. }
            | Subscriber::Both { id, .. } => *id,
        }
    }

    fn property_target(&self) -> Option<Rc<dyn PropertySubscriber>> {
        match self {
            Subscriber::Property { target, .. } => target.upgrade(),
            Subscriber::Both { property, .. } => property.upgrade(),
            Subscriber::Collection { .. } => None,
        }
    }

    fn collection_target(&self) -> Option<Rc<dyn CollectionSubscriber>> {
        match self {
            Subscriber::Collection { target, .. } => target.upgrade(),
            Subscriber::Both { collection, .. } => collection.upgrade(),
            Subscriber::Property { .. } => None,
        }
    }

    fn is_alive(&self) -> bool {
        match self {
            Subscriber::Property { target, .. } => target.strong_count() > 0,
            Subscriber::Collection { target, .. } => target.strong_count() > 0,
            Subscriber::Both { property, .. } => property.strong_count() > 0,
        }
    }
}

/// Ordered set of subscribers. Up to three are stored inline.
#[derive(Default)]
pub struct SubscriberRecord {
    subscribers: RefCell<SmallVec<[Subscriber; 3]>>,
}

impl SubscriberRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber. Returns `false` if its id is already present.
    pub fn add(&self, subscriber: Subscriber) -> bool {
        let mut subscribers = self.subscribers.borrow_mut();
        if subscribers.iter().any(|s| s.id() == subscriber.id()) {
            return false;
        }
        subscribers.retain(|s| s.is_alive());
        subscribers.push(subscriber);
        true
    }

    /// Remove a subscriber by id. Returns `true` iff it was present.
    pub fn remove(&self, id: SubscriberId) -> bool {
        let mut subscribers = self.subscribers.borrow_mut();
        match subscribers.iter().position(|s| s.id() == id) {
            Some(index) => {
                subscribers.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn has(&self, id: SubscriberId) -> bool {
        self.subscribers.borrow().iter().any(|s| s.id() == id)
    }

    pub fn count(&self) -> usize {
        self.subscribers.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Invoke `handle_change` on every property subscriber, in the order
    /// they were added.
    ///
    /// Iterates over a snapshot: subscribers added during notification wait
    /// for the next call, removed ones are still called this round.
    /// Subscribers found dropped are pruned afterwards.
    pub fn notify(&self, new_value: &Value, old_value: &Value) {
        let snapshot = self.subscribers.borrow().clone();
        let mut dead = false;
        for subscriber in &snapshot {
            match subscriber.property_target() {
                Some(target) => target.handle_change(new_value, old_value),
                None => dead |= !subscriber.is_alive(),
            }
        }
        if dead {
            self.prune();
        }
    }

    /// Collection counterpart of [`notify`](Self::notify).
    pub fn notify_collection(&self, change: &CollectionChange) {
        let snapshot = self.subscribers.borrow().clone();
        let mut dead = false;
        for subscriber in &snapshot {
            match subscriber.collection_target() {
                Some(target) => target.handle_collection_change(change),
                None => dead |= !subscriber.is_alive(),
            }
        }
        if dead {
            self.prune();
        }
    }

    /// Drop subscribers whose target is gone. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let mut subscribers = self.subscribers.borrow_mut();
        let before = subscribers.len();
        subscribers.retain(|s| s.is_alive());
        before - subscribers.len()
    }

    pub fn clear(&self) {
        self.subscribers.borrow_mut().clear();
    }

    /// Whether the subscribers have spilled out of inline storage.
    pub fn spilled(&self) -> bool {
        self.subscribers.borrow().spilled()
    }
}

/// A property subscriber backed by a closure.
///
/// ```rust,ignore
/// let log = FnSubscriber::new(|new, old| println!("{old} -> {new}"));
/// observer.subscribe(log.subscriber());
/// ```
pub struct FnSubscriber {
    id: SubscriberId,
    callback: Box<dyn Fn(&Value, &Value)>,
}

impl FnSubscriber {
    pub fn new<F>(callback: F) -> Rc<Self>
    where
        F: Fn(&Value, &Value) + 'static,
    {
        Rc::new(Self {
            id: SubscriberId::new(),
            callback: Box::new(callback),
        })
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// The registration handle. The caller keeps the `Rc` alive.
    pub fn subscriber(self: &Rc<Self>) -> Subscriber {
        Subscriber::property(self.id, self)
    }
}

impl PropertySubscriber for FnSubscriber {
    fn handle_change(&self, new_value: &Value, old_value: &Value) {
        (self.callback)(new_value, old_value);
    }
}
