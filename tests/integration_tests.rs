//! Integration tests for Keyed Store

use keyed_store::{
    key_state, runtime::Runtime, KeyedStore, Listener, RuntimeError, StoreOptions, Update,
};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn recorder<V: Clone + Send + 'static>() -> (Listener<V>, Arc<Mutex<Vec<V>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = seen.clone();
    let listener = Listener::new(move |v: &V| seen_clone.lock().unwrap().push(v.clone()));
    (listener, seen)
}

#[test]
fn immediate_set() {
    init_tracing();
    let store = KeyedStore::new([("count", 0)]);

    store.set("count", Update::Value(5));
    assert_eq!(store.get(&"count"), Some(5));
}

#[test]
fn change_notifies_every_subscriber_once() {
    init_tracing();
    let store = KeyedStore::new([("count", 0)]);
    let (first, first_seen) = recorder();
    let (second, second_seen) = recorder();
    let _a = store.subscribe("count", first);
    let _b = store.subscribe("count", second);

    store.set_value("count", 7);

    assert_eq!(store.get(&"count"), Some(7));
    assert_eq!(*first_seen.lock().unwrap(), vec![7]);
    assert_eq!(*second_seen.lock().unwrap(), vec![7]);
}

#[test]
fn equal_write_is_silent() {
    init_tracing();
    let store = KeyedStore::new([("name", "ada".to_string())]);
    let (listener, seen) = recorder();
    store.on("name", listener);

    store.set_value("name", "ada".to_string());

    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(store.get(&"name").as_deref(), Some("ada"));
}

#[test]
fn updater_resolves_before_equality_check() {
    init_tracing();
    let store = KeyedStore::new([("count", 3)]);
    let (listener, seen) = recorder();
    store.on("count", listener);

    let unchanged = Update::updater(|c: Option<&i32>| c.copied().unwrap_or(0));
    store.set("count", unchanged);
    assert!(seen.lock().unwrap().is_empty());

    let doubled = Update::updater(|c: Option<&i32>| c.map_or(0, |c| c * 2));
    store.set("count", doubled);
    assert_eq!(*seen.lock().unwrap(), vec![6]);
}

#[test]
fn unsubscribe_is_idempotent() {
    init_tracing();
    let store = KeyedStore::new([("count", 0)]);
    let (listener, seen) = recorder();
    let sub = store.subscribe("count", listener);

    store.set_value("count", 1);
    sub.unsubscribe();
    sub.unsubscribe();
    store.set_value("count", 2);

    assert!(!sub.is_active());
    assert_eq!(*seen.lock().unwrap(), vec![1]);
    assert_eq!(store.listener_count(&"count"), 0);
}

#[test]
fn off_removes_only_that_listener() {
    init_tracing();
    let store = KeyedStore::new([("x", 0)]);
    let (kept, kept_seen) = recorder();
    let (removed, removed_seen) = recorder();
    store.on("x", kept);
    store.on("x", removed.clone());

    store.off(&"x", &removed);
    store.set_value("x", 1);

    assert_eq!(*kept_seen.lock().unwrap(), vec![1]);
    assert!(removed_seen.lock().unwrap().is_empty());
}

#[test]
fn identical_closures_are_distinct_listeners() {
    init_tracing();
    let store = KeyedStore::new([("x", 0)]);
    let calls = Arc::new(AtomicUsize::new(0));

    for _ in 0..2 {
        let calls = calls.clone();
        store.on(
            "x",
            Listener::new(move |_: &i32| {
                calls.fetch_add(1, Ordering::SeqCst);
            }),
        );
    }

    store.set_value("x", 1);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn listeners_run_in_registration_order() {
    init_tracing();
    let store = KeyedStore::new([("x", 0)]);
    let order = Arc::new(Mutex::new(Vec::new()));

    for name in ["first", "second", "third"] {
        let order = order.clone();
        store.on("x", Listener::new(move |_: &i32| order.lock().unwrap().push(name)));
    }

    store.set_value("x", 1);
    assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
}

#[test]
fn batched_writes_coalesce() {
    init_tracing();
    Runtime::scope(|| {
        let store = KeyedStore::with_options([("k", 'a')], StoreOptions::new().batch_updates(true));
        let (listener, seen) = recorder();
        store.on("k", listener);

        store.set_value("k", 'b');
        store.set_value("k", 'c');
        assert_eq!(store.get(&"k"), Some('c'));
        assert!(seen.lock().unwrap().is_empty());

        Runtime::current().run_pending().unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!['c']);
        assert_eq!(store.get(&"k"), Some('c'));
    });
}

#[test]
fn batched_updaters_chain_through_pending_value() {
    init_tracing();
    Runtime::scope(|| {
        let store =
            KeyedStore::with_options([("count", 0)], StoreOptions::new().batch_updates(true));
        let (listener, seen) = recorder();
        store.on("count", listener);

        store.update("count", |c| c + 1);
        store.update("count", |c| c + 1);
        assert_eq!(Runtime::current().pending(), 1);

        assert_eq!(Runtime::current().run_pending().unwrap(), 1);
        assert_eq!(store.get(&"count"), Some(2));
        assert_eq!(*seen.lock().unwrap(), vec![2]);
    });
}

#[test]
fn batched_writes_across_keys_share_one_flush() {
    init_tracing();
    Runtime::scope(|| {
        let store = KeyedStore::with_options(
            [("a", 0), ("b", 0)],
            StoreOptions::new().batch_updates(true),
        );
        let (a_listener, a_seen) = recorder();
        let (b_listener, b_seen) = recorder();
        store.on("a", a_listener);
        store.on("b", b_listener);

        store.set_value("a", 1);
        store.set_value("b", 2);
        assert_eq!(Runtime::current().pending(), 1);

        Runtime::current().run_pending().unwrap();
        assert_eq!(*a_seen.lock().unwrap(), vec![1]);
        assert_eq!(*b_seen.lock().unwrap(), vec![2]);

        // A new tick schedules a new flush.
        store.set_value("a", 3);
        assert_eq!(Runtime::current().pending(), 1);
    });
}

#[test]
fn listener_writes_during_flush_commit_in_same_tick() {
    init_tracing();
    Runtime::scope(|| {
        let store = KeyedStore::with_options(
            [("input", 0), ("doubled", 0)],
            StoreOptions::new().batch_updates(true),
        );
        let mirror = store.clone();
        store.on(
            "input",
            Listener::new(move |v: &i32| mirror.set_value("doubled", v * 2)),
        );

        store.set_value("input", 21);
        Runtime::current().run_pending().unwrap();

        assert_eq!(store.get(&"doubled"), Some(42));
        assert!(!store.has_pending());
    });
}

#[test]
fn function_values_are_stored_literally() {
    init_tracing();
    type Formatter = Arc<dyn Fn(i32) -> String + Send + Sync>;

    let plain: Formatter = Arc::new(|n| n.to_string());
    let store = KeyedStore::with_options(
        [("fmt", plain)],
        StoreOptions::with_equality(|old: &Formatter, new: &Formatter, _: &&str| {
            Arc::ptr_eq(old, new)
        }),
    );

    let hex: Formatter = Arc::new(|n| format!("{n:#x}"));
    store.set("fmt", Update::Value(hex));

    let current = store.get(&"fmt").unwrap();
    assert_eq!(current(255), "0xff");
}

#[test]
fn key_state_round_trip() {
    init_tracing();
    let store = KeyedStore::new([("count", 0)]);
    let (count, set_count) = key_state(Some(&store), "count");

    set_count.update(|c| c + 1);
    set_count.set_value(10);

    assert_eq!(count.get(), Some(10));
    assert_eq!(count.version(), 2);

    drop(count);
    assert_eq!(store.listener_count(&"count"), 0);
}

#[test]
fn updater_sees_absent_key() {
    init_tracing();
    let store = KeyedStore::new([("count", 0)]);
    let (listener, seen) = recorder();
    store.on("total", listener);

    store.set(
        "total",
        Update::updater(|t: Option<&i32>| {
            assert!(t.is_none());
            10
        }),
    );

    assert_eq!(store.get(&"total"), Some(10));
    assert_eq!(*seen.lock().unwrap(), vec![10]);
}

#[test]
fn runaway_batched_listener_hits_tick_budget() {
    init_tracing();
    let runtime = Runtime::new().with_max_tasks_per_tick(50);
    let options = StoreOptions::new()
        .batch_updates(true)
        .runtime(runtime.clone());
    let store = KeyedStore::with_options([("x", 0)], options);
    let mirror = store.clone();
    store.on(
        "x",
        Listener::new(move |v: &i32| mirror.set_value("x", v + 1)),
    );

    store.set_value("x", 1);
    let err = runtime.run_pending().unwrap_err();

    assert_eq!(err, RuntimeError::Livelock { ran: 50, remaining: 1 });
    assert_eq!(store.get(&"x"), Some(51));
    assert_eq!(runtime.pending(), 1);
}
