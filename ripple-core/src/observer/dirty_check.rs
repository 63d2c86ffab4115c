//! Dirty checking.
//!
//! The last-resort strategy for properties that cannot be intercepted:
//! non-configurable accessors and arbitrary keys of collections. Each
//! subscribed [`DirtyCheckProperty`] is registered with the
//! [`DirtyChecker`], which compares current and last-seen values on every
//! poll. Changes are therefore noticed with up to one poll interval of
//! latency, and changes reverted between two polls are never seen.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use tokio::task::JoinHandle;
use tracing::{trace, warn};

use super::{Observable, ObserverKind, PropertyObserver};
use crate::config::DirtyCheckSettings;
use crate::error::ObservationError;
use crate::proxy::Proxied;
use crate::reactive::{untracked, Runtime, Subscriber, SubscriberId, SubscriberRecord};
use crate::value::{Value, WeakValue};

/// A polled property.
pub struct DirtyCheckProperty {
    id: SubscriberId,
    target: WeakValue,
    key: Rc<str>,
    old_value: RefCell<Value>,
    subs: SubscriberRecord,
    checker: Weak<DirtyChecker>,
    weak_self: Weak<DirtyCheckProperty>,
}

impl DirtyCheckProperty {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Polls may run inside a computation; accessor getters must not
    /// report reads to it.
    fn current(&self) -> Value {
        match self.target.upgrade() {
            Some(target) => untracked(|| target.read_property(&self.key)),
            None => Value::Undefined,
        }
    }

    /// Whether the value moved since the last poll.
    pub fn is_dirty(&self) -> bool {
        !self.current().same_value(&self.old_value.borrow())
    }

    /// Record the current value and notify subscribers.
    pub fn flush(&self) {
        let new_value = self.current();
        let old_value = self.old_value.replace(new_value.clone());
        self.subs.notify(&new_value, &old_value);
    }
}

impl Observable for DirtyCheckProperty {
    fn subscribe(&self, subscriber: Subscriber) {
        if !self.subs.add(subscriber) || self.subs.count() != 1 {
            return;
        }
        *self.old_value.borrow_mut() = self.current();
        if let (Some(checker), Some(me)) = (self.checker.upgrade(), self.weak_self.upgrade()) {
            checker.add_property(me);
        }
    }

    fn unsubscribe(&self, id: SubscriberId) {
        if self.subs.remove(id) && self.subs.is_empty() {
            if let Some(checker) = self.checker.upgrade() {
                checker.remove_property(self.id);
            }
        }
    }

    fn subscriber_count(&self) -> usize {
        self.subs.count()
    }
}

impl PropertyObserver for DirtyCheckProperty {
    fn get_value(&self) -> Value {
        self.current()
    }

    /// Writes go straight to the target; the next poll reports them.
    fn set_value(&self, value: Value) -> Result<(), ObservationError> {
        match self.target.upgrade() {
            Some(target) => target.write_property(&self.key, value),
            None => Ok(()),
        }
    }

    fn kind(&self) -> ObserverKind {
        ObserverKind::DirtyCheck
    }
}

/// Poller for dirty-check properties.
///
/// Drive it by calling [`check`](Self::check) from a host loop, or let
/// [`spawn_local`](Self::spawn_local) run it on a tokio `LocalSet`.
pub struct DirtyChecker {
    settings: DirtyCheckSettings,
    tracked: RefCell<Vec<Rc<DirtyCheckProperty>>>,
}

impl DirtyChecker {
    pub fn new(settings: DirtyCheckSettings) -> Rc<Self> {
        Rc::new(Self {
            settings,
            tracked: RefCell::new(Vec::new()),
        })
    }

    pub fn settings(&self) -> &DirtyCheckSettings {
        &self.settings
    }

    pub(crate) fn create_property(self: &Rc<Self>, target: &Value, key: &str) -> Rc<DirtyCheckProperty> {
        if self.settings.warn {
            warn!(key, "property cannot be intercepted; falling back to dirty checking");
        }
        Rc::new_cyclic(|weak_self| DirtyCheckProperty {
            id: SubscriberId::new(),
            target: target.raw().downgrade(),
            key: Rc::from(key),
            old_value: RefCell::new(Value::Undefined),
            subs: SubscriberRecord::new(),
            checker: Rc::downgrade(self),
            weak_self: weak_self.clone(),
        })
    }

    fn add_property(&self, property: Rc<DirtyCheckProperty>) {
        self.tracked.borrow_mut().push(property);
    }

    fn remove_property(&self, id: SubscriberId) {
        self.tracked.borrow_mut().retain(|p| p.id != id);
    }

    /// Number of properties currently polled.
    pub fn tracked_count(&self) -> usize {
        self.tracked.borrow().len()
    }

    /// Poll every tracked property once and flush the dirty ones.
    /// Returns how many were dirty. Does nothing when disabled.
    ///
    /// Properties whose subscribers have all been dropped stop being polled.
    pub fn check(&self) -> usize {
        if self.settings.disabled {
            return 0;
        }
        self.tracked.borrow_mut().retain(|property| {
            property.subs.prune();
            !property.subs.is_empty()
        });
        let snapshot = self.tracked.borrow().clone();
        let mut dirty = 0;
        for property in snapshot {
            if property.is_dirty() {
                property.flush();
                dirty += 1;
            }
        }
        if dirty > 0 {
            trace!(dirty, "dirty check flushed properties");
        }
        dirty
    }

    /// Poll on a tokio interval, then run pending tasks. Must be called
    /// within a `LocalSet`. The loop ends when the checker is dropped.
    /// Returns `None` when dirty checking is disabled.
    pub fn spawn_local(self: &Rc<Self>) -> Option<JoinHandle<()>> {
        if self.settings.disabled {
            return None;
        }
        let period = self.settings.interval();
        let checker = Rc::downgrade(self);
        Some(tokio::task::spawn_local(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                match checker.upgrade() {
                    Some(checker) => {
                        checker.check();
                    }
                    None => break,
                }
                Runtime::run_pending_tasks();
            }
        }))
    }
}
