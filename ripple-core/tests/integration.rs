//! Integration Tests for the Observation Engine
//!
//! These tests drive the public API end to end: observers, proxies and
//! watchers working together.

use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use ripple_core::expression::{BinaryOp, Expression, Scope};
use ripple_core::observer::{Observable, ObserverKind, ObserverLocator, PropertyObserver};
use ripple_core::proxy::{get_proxy, get_raw, Proxied};
use ripple_core::reactive::{stack_depth, FnSubscriber, Runtime, SubscriberRecord, Watcher};
use ripple_core::value::{ArrayRef, MapRef, ObjectRef, SetRef, Value};
use ripple_core::watcher::{ComputedWatcher, ExpressionWatcher, WatcherState};
use ripple_core::{FlushMode, ObservationConfig};

type Log = Rc<RefCell<Vec<Value>>>;

/// A callback that records every new value it receives.
fn logging_callback() -> (Log, impl Fn(&Value, &Value, &Value)) {
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    (log, move |new: &Value, _: &Value, _: &Value| sink.borrow_mut().push(new.clone()))
}

#[test]
fn adding_a_subscriber_twice_is_idempotent() {
    let record = SubscriberRecord::new();
    let listener = FnSubscriber::new(|_, _| {});

    assert!(record.add(listener.subscriber()));
    assert!(!record.add(listener.subscriber()));
    assert_eq!(record.count(), 1);
    assert!(record.has(listener.id()));
}

#[test]
fn each_subscriber_is_notified_once_per_call() {
    for size in [1, 3, 8] {
        let record = SubscriberRecord::new();
        let calls = Rc::new(Cell::new(0));
        let listeners: Vec<_> = (0..size)
            .map(|_| {
                let calls = Rc::clone(&calls);
                FnSubscriber::new(move |_, _| calls.set(calls.get() + 1))
            })
            .collect();
        for listener in &listeners {
            record.add(listener.subscriber());
        }

        record.notify(&Value::from(1), &Value::Undefined);
        assert_eq!(calls.get(), size);
    }
}

#[test]
fn dependencies_follow_the_branch_taken() {
    let locator = ObserverLocator::default();
    let o = ObjectRef::from_entries([
        ("a", Value::Bool(true)),
        ("b", Value::from("b0")),
        ("c", Value::from("c0")),
    ]);
    let runs = Rc::new(Cell::new(0));
    let counter = Rc::clone(&runs);
    let watcher = ComputedWatcher::new(
        o.clone(),
        &locator,
        move |o, _| {
            counter.set(counter.get() + 1);
            if o.get_member("a").is_truthy() {
                o.get_member("b")
            } else {
                o.get_member("c")
            }
        },
        |_, _, _| {},
        FlushMode::Sync,
    );
    watcher.bind();
    assert_eq!(runs.get(), 1);

    o.set("c", "c1").unwrap();
    assert_eq!(runs.get(), 1);
    o.set("b", "b1").unwrap();
    assert_eq!(runs.get(), 2);

    o.set("a", false).unwrap();
    assert_eq!(runs.get(), 3);
    assert_eq!(watcher.value(), Value::from("c1"));

    o.set("b", "b2").unwrap();
    assert_eq!(runs.get(), 3);
    o.set("c", "c2").unwrap();
    assert_eq!(runs.get(), 4);
    assert_eq!(watcher.value(), Value::from("c2"));
}

#[test]
fn proxy_round_trip_preserves_identity() {
    let values = [
        Value::from(ObjectRef::new()),
        Value::from(ArrayRef::from_values([1, 2])),
        Value::from(MapRef::new()),
        Value::from(SetRef::new()),
    ];
    for raw in values {
        let proxy = get_proxy(&raw);
        assert!(proxy.is_proxy());
        assert!(!raw.is_proxy());
        assert!(get_raw(&proxy).strict_eq(&raw));
        assert!(get_proxy(&proxy).strict_eq(&proxy));
        assert_eq!(proxy.id(), raw.id());
    }

    // Primitives pass through untouched.
    assert_eq!(get_proxy(&Value::from(7)), Value::from(7));
}

#[test]
fn one_push_of_many_items_is_one_callback() {
    let locator = ObserverLocator::default();
    let array = ArrayRef::from_values([0]);
    let (log, callback) = logging_callback();
    let watcher = ComputedWatcher::new(
        array.clone(),
        &locator,
        |a, _| a.get_member("length"),
        callback,
        FlushMode::Sync,
    );
    watcher.bind();

    array.push([1, 2, 3]);
    assert_eq!(*log.borrow(), vec![Value::from(4)]);
}

#[test]
fn index_reads_depend_on_that_index_only() {
    let locator = ObserverLocator::default();
    let array = ArrayRef::from_values(["head"]);
    let runs = Rc::new(Cell::new(0));
    let counter = Rc::clone(&runs);
    let (log, callback) = logging_callback();
    let watcher = ComputedWatcher::new(
        array.clone(),
        &locator,
        move |a, _| {
            counter.set(counter.get() + 1);
            a.get_member("0")
        },
        callback,
        FlushMode::Sync,
    );
    watcher.bind();

    array.push(["x"]);
    array.push(["y"]);
    assert_eq!(runs.get(), 1);

    array.set(0, "new head");
    assert_eq!(runs.get(), 2);
    array.unshift(["front"]);
    assert_eq!(*log.borrow(), vec![Value::from("new head"), Value::from("front")]);
}

#[test]
fn invalid_lengths_leave_the_array_alone() {
    let locator = ObserverLocator::default();
    let array = ArrayRef::from_values(["a", "b"]);
    let length = locator.get_observer(&Value::from(array.clone()), "length");
    assert_eq!(length.kind(), ObserverKind::CollectionLength);

    let calls = Rc::new(Cell::new(0));
    let counter = Rc::clone(&calls);
    let listener = FnSubscriber::new(move |_, _| counter.set(counter.get() + 1));
    length.subscribe(listener.subscriber());

    length.set_value(Value::from(-1)).unwrap();
    length.set_value(Value::from(1.5)).unwrap();
    assert_eq!(array.len(), 2);
    assert_eq!(calls.get(), 0);
}

#[test]
fn computed_watcher_scenario() {
    let locator = ObserverLocator::default();
    let obj = ObjectRef::new();
    let (log, callback) = logging_callback();
    let watcher = ComputedWatcher::new(
        obj.clone(),
        &locator,
        |o, _| o.get_member("prop"),
        callback,
        FlushMode::Sync,
    );

    watcher.bind();
    assert!(log.borrow().is_empty());
    assert_eq!(watcher.value(), Value::Undefined);

    obj.set("prop", 1).unwrap();
    assert_eq!(*log.borrow(), vec![Value::from(1)]);
    assert_eq!(watcher.value(), Value::from(1));

    watcher.unbind();
    assert!(!watcher.is_bound());
    obj.set("prop", 2).unwrap();
    assert_eq!(log.borrow().len(), 1);
}

#[test]
fn separate_pushes_notify_separately() {
    let locator = ObserverLocator::default();
    let array = ArrayRef::new();
    let (log, callback) = logging_callback();
    let watcher = ComputedWatcher::new(
        Value::Null,
        &locator,
        {
            let array = array.clone();
            move |_, _| Value::from(array.proxy()).get_member("length")
        },
        callback,
        FlushMode::Sync,
    );
    watcher.bind();

    array.push([1]);
    array.push([2]);
    assert_eq!(*log.borrow(), vec![Value::from(1), Value::from(2)]);
}

#[test]
fn map_size_reports_each_change() {
    let locator = ObserverLocator::default();
    let map = MapRef::new();
    let size = locator.get_observer(&Value::from(map.clone()), "size");
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    let listener = FnSubscriber::new(move |new, _| sink.borrow_mut().push(new.clone()));
    size.subscribe(listener.subscriber());

    map.set("a", 1);
    map.delete(&Value::from("a"));
    assert_eq!(*log.borrow(), vec![Value::from(1), Value::from(0)]);
}

#[test]
fn async_watcher_coalesces_a_burst() {
    let locator = ObserverLocator::default();
    let obj = ObjectRef::from_entries([("n", 0)]);
    let (log, callback) = logging_callback();
    let watcher = ComputedWatcher::new(
        obj.clone(),
        &locator,
        |o, _| o.get_member("n"),
        callback,
        FlushMode::Async,
    );
    watcher.bind();

    obj.set("n", 1).unwrap();
    obj.set("n", 2).unwrap();
    obj.set("n", 3).unwrap();
    assert!(log.borrow().is_empty());
    assert_eq!(Runtime::pending_task_count(), 1);

    Runtime::run_pending_tasks();
    assert_eq!(*log.borrow(), vec![Value::from(3)]);
}

#[test]
fn unbind_cancels_a_pending_callback() {
    let locator = ObserverLocator::default();
    let obj = ObjectRef::from_entries([("n", 0)]);
    let (log, callback) = logging_callback();
    let watcher = ComputedWatcher::new(
        obj.clone(),
        &locator,
        |o, _| o.get_member("n"),
        callback,
        FlushMode::Async,
    );
    watcher.bind();

    obj.set("n", 1).unwrap();
    watcher.unbind();
    Runtime::run_pending_tasks();
    assert!(log.borrow().is_empty());
    assert_eq!(watcher.state(), WatcherState::Unbound);
}

#[test]
fn panicking_compute_leaves_the_stack_clean() {
    let locator = ObserverLocator::default();
    let obj = ObjectRef::from_entries([("fail", true)]);
    let watcher = ComputedWatcher::new(
        obj.clone(),
        &locator,
        |o, _| {
            if o.get_member("fail").is_truthy() {
                panic!("compute failed");
            }
            Value::from("ok")
        },
        |_, _, _| {},
        FlushMode::Sync,
    );

    let result = panic::catch_unwind(AssertUnwindSafe(|| watcher.bind()));
    assert!(result.is_err());
    assert_eq!(stack_depth(), 0);

    // Observation keeps working for other watchers.
    let other = ObjectRef::from_entries([("x", 1)]);
    let (log, callback) = logging_callback();
    let healthy = ComputedWatcher::new(
        other.clone(),
        &locator,
        |o, _| o.get_member("x"),
        callback,
        FlushMode::Sync,
    );
    healthy.bind();
    other.set("x", 2).unwrap();
    assert_eq!(*log.borrow(), vec![Value::from(2)]);
}

#[test]
fn expression_watcher_over_a_scope() {
    let locator = ObserverLocator::default();
    let user = ObjectRef::from_entries([("first", "Ada"), ("last", "Lovelace")]);
    let vm = ObjectRef::from_entries([("user", Value::from(user.clone()))]);
    let scope = Scope::new(vm.clone());
    let (log, callback) = logging_callback();

    let full_name = Expression::binary(
        BinaryOp::Add,
        Expression::binary(
            BinaryOp::Add,
            Expression::member(Expression::scope("user"), "first"),
            Expression::literal(" "),
        ),
        Expression::member(Expression::scope("user"), "last"),
    );
    let watcher = ExpressionWatcher::new(&scope, vm.clone(), &locator, full_name, callback, FlushMode::Sync);
    watcher.bind();
    assert_eq!(watcher.value(), Value::from("Ada Lovelace"));

    user.set("last", "King").unwrap();
    assert_eq!(*log.borrow(), vec![Value::from("Ada King")]);

    // Replacing the nested object moves the dependencies with it.
    let grace = ObjectRef::from_entries([("first", "Grace"), ("last", "Hopper")]);
    vm.set("user", grace.clone()).unwrap();
    assert_eq!(watcher.value(), Value::from("Grace Hopper"));

    user.set("first", "Augusta").unwrap();
    assert_eq!(log.borrow().len(), 2);
    grace.set("first", "Rear Admiral Grace").unwrap();
    assert_eq!(watcher.value(), Value::from("Rear Admiral Grace Hopper"));
}

#[test]
fn compute_can_declare_dependencies_by_hand() {
    let locator = ObserverLocator::default();
    let external = ObjectRef::from_entries([("ready", false)]);
    let tags = SetRef::new();
    let (log, callback) = logging_callback();

    let watcher = ComputedWatcher::new(
        Value::Null,
        &locator,
        {
            let external = external.clone();
            let tags = tags.clone();
            move |_, watcher: &dyn Watcher| {
                watcher.observe(&Value::from(external.clone()), "ready");
                watcher.observe_collection(&Value::from(tags.clone()));
                Value::from(external.get("ready").is_truthy() && tags.has(&Value::from("go")))
            }
        },
        callback,
        FlushMode::Sync,
    );
    watcher.bind();
    assert_eq!(watcher.value(), Value::Bool(false));

    external.set("ready", true).unwrap();
    assert!(log.borrow().is_empty());
    tags.add("go");
    assert_eq!(*log.borrow(), vec![Value::Bool(true)]);
}

#[test]
fn proxies_can_be_disabled_by_config() {
    let config = ObservationConfig::from_json_str(r#"{ "use_proxy": false }"#).unwrap();
    let locator = ObserverLocator::new(config);
    let obj = ObjectRef::from_entries([("n", 1)]);
    let (log, callback) = logging_callback();

    let watcher = ComputedWatcher::new(
        obj.clone(),
        &locator,
        |o, _| o.get_member("n"),
        callback,
        FlushMode::Sync,
    );
    watcher.bind();
    assert_eq!(watcher.dependency_count(), 0);

    obj.set("n", 2).unwrap();
    assert!(log.borrow().is_empty());
}
