//! Integration Tests for the Signal Graph and the Store
//!
//! These tests verify that signals, computeds, effects and store proxies
//! work together through the scheduler.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use bramble_core::reactive::{batch, computed, effect, signal, tick, untracked, Effect, Runtime};
use bramble_core::store::{wrap, PlainArray, PlainObject, Value};

fn counter() -> (Rc<Cell<usize>>, Rc<Cell<usize>>) {
    let count = Rc::new(Cell::new(0));
    (Rc::clone(&count), count)
}

/// Writing an equal value must not notify anyone.
#[test]
fn equal_writes_are_silent() {
    let source = signal(1);
    let (runs, seen) = counter();

    let s = source.clone();
    let _effect = effect(move || {
        s.get();
        runs.set(runs.get() + 1);
    });
    assert_eq!(seen.get(), 1);

    assert!(!source.set(1));
    tick();
    assert_eq!(seen.get(), 1);

    assert!(source.set(2));
    tick();
    assert_eq!(seen.get(), 2);
}

/// Effects run once per flush no matter how many writes happened.
#[test]
fn writes_are_batched_into_one_flush() {
    let a = signal(0);
    let b = signal(0);
    let (runs, seen) = counter();

    let (ra, rb) = (a.clone(), b.clone());
    let _effect = effect(move || {
        ra.get();
        rb.get();
        runs.set(runs.get() + 1);
    });

    for i in 1..=10 {
        a.set(i);
        b.set(i);
    }
    assert_eq!(seen.get(), 1, "nothing runs before the flush");
    tick();
    assert_eq!(seen.get(), 2);
}

/// `batch` flushes synchronously when the outermost call returns.
#[test]
fn batch_flushes_on_exit() {
    let value = signal(0);
    let observed = Rc::new(Cell::new(-1));

    let (v, o) = (value.clone(), Rc::clone(&observed));
    let _effect = effect(move || o.set(v.get()));

    batch(|| {
        value.set(1);
        batch(|| value.set(2));
        assert_eq!(observed.get(), 0, "inner batch does not flush");
    });
    assert_eq!(observed.get(), 2);
}

/// A computed recomputes on read, not on write.
#[test]
fn computed_is_pull_based() {
    let source = signal(2);
    let (computes, seen) = counter();

    let s = source.clone();
    let doubled = computed(move || {
        computes.set(computes.get() + 1);
        s.get() * 2
    });
    assert_eq!(seen.get(), 0);

    assert_eq!(doubled.get(), 4);
    assert_eq!(doubled.get(), 4);
    assert_eq!(seen.get(), 1);

    source.set(3);
    source.set(4);
    tick();
    assert_eq!(seen.get(), 1, "nobody read it yet");
    assert_eq!(doubled.get(), 8);
    assert_eq!(seen.get(), 2);
}

/// Computeds can depend on computeds, and effects see the end of the chain.
#[test]
fn computed_chain_feeds_an_effect() {
    let base = signal(1);
    let b = base.clone();
    let plus_one = computed(move || b.get() + 1);
    let p = plus_one.clone();
    let times_ten = computed(move || p.get() * 10);

    let log = Rc::new(RefCell::new(Vec::new()));
    let (t, l) = (times_ten.clone(), Rc::clone(&log));
    let _effect = effect(move || l.borrow_mut().push(t.get()));

    base.set(2);
    tick();
    base.set(3);
    tick();
    assert_eq!(*log.borrow(), vec![20, 30, 40]);
}

/// Reads inside `untracked` do not subscribe the running effect.
#[test]
fn untracked_reads_do_not_subscribe() {
    let tracked = signal(0);
    let ignored = signal(0);
    let (runs, seen) = counter();

    let (t, i) = (tracked.clone(), ignored.clone());
    let _effect = effect(move || {
        t.get();
        untracked(|| i.get());
        runs.set(runs.get() + 1);
    });

    ignored.set(1);
    tick();
    assert_eq!(seen.get(), 1);

    tracked.set(1);
    tick();
    assert_eq!(seen.get(), 2);
}

/// A disposed effect never runs again and leaves the registry.
#[test]
fn disposed_effect_does_not_run() {
    let source = signal(0);
    let (runs, seen) = counter();

    let before = Runtime::registered_count();
    let s = source.clone();
    let effect = Effect::new(move || {
        s.get();
        runs.set(runs.get() + 1);
    });
    assert_eq!(Runtime::registered_count(), before + 1);

    source.set(1);
    effect.dispose();
    tick();
    assert_eq!(seen.get(), 1);
    assert_eq!(Runtime::registered_count(), before);
}

/// Wrapping is identity-stable, nested values included.
#[test]
fn wrapping_is_identity_stable() {
    let inner = PlainObject::new().with("x", 1);
    let plain = PlainObject::new().with("inner", inner.clone());

    let first = wrap(Value::PlainObject(plain.clone()), None);
    let second = wrap(Value::PlainObject(plain), None);
    assert_eq!(first.identity(), second.identity());

    let object = first.as_object().unwrap();
    let nested_a = object.get("inner");
    let nested_b = object.get("inner");
    assert!(nested_a.as_object().is_some());
    assert_eq!(nested_a.identity(), nested_b.identity());
    assert_eq!(
        nested_a.identity(),
        wrap(Value::PlainObject(inner), None).identity()
    );

    // Non-plain values pass through.
    assert_eq!(wrap(Value::from(3), None).identity(), Value::from(3).identity());
}

/// Effects over proxies rerun only for the keys they read.
#[test]
fn store_effects_track_individual_keys() {
    let state = wrap(
        Value::PlainObject(PlainObject::new().with("a", 1).with("b", 1)),
        None,
    );
    let object = state.as_object().unwrap().clone();
    let (runs, seen) = counter();

    let o = object.clone();
    let _effect = effect(move || {
        o.get("a");
        runs.set(runs.get() + 1);
    });

    object.set("b", 2);
    tick();
    assert_eq!(seen.get(), 1);

    object.set("a", 1);
    tick();
    assert_eq!(seen.get(), 1, "same value");

    object.set("a", 2);
    tick();
    assert_eq!(seen.get(), 2);
}

/// Adding and removing keys invalidates enumeration.
#[test]
fn key_enumeration_is_tracked() {
    let object = wrap(Value::PlainObject(PlainObject::new().with("a", 1)), None);
    let object = object.as_object().unwrap().clone();
    let keys = Rc::new(RefCell::new(Vec::new()));

    let (o, k) = (object.clone(), Rc::clone(&keys));
    let _effect = effect(move || *k.borrow_mut() = o.keys());

    object.set("b", 2);
    tick();
    assert_eq!(*keys.borrow(), ["a", "b"]);

    object.delete("a");
    tick();
    assert_eq!(*keys.borrow(), ["b"]);
}

/// Array mutators notify length observers; truncation runs disposers.
#[test]
fn array_mutation_and_truncation() {
    let array = wrap(
        Value::PlainArray(PlainArray::new().with(1).with(2).with(3)),
        None,
    );
    let array = array.as_array().unwrap().clone();
    let length = Rc::new(Cell::new(0));

    let (a, l) = (array.clone(), Rc::clone(&length));
    let _effect = effect(move || l.set(a.len()));
    assert_eq!(length.get(), 3);

    array.push([Value::from(4)]);
    tick();
    assert_eq!(length.get(), 4);

    let disposed = Rc::new(Cell::new(false));
    let d = Rc::clone(&disposed);
    assert!(array.attach_disposer(3, Box::new(move || d.set(true))));

    array.set_len(2);
    tick();
    assert!(disposed.get());
    assert_eq!(length.get(), 2);
    assert_eq!(
        array.peek_vec().iter().map(Value::to_number).collect::<Vec<_>>(),
        [1.0, 2.0]
    );
}

/// Getters become computeds that see later writes.
#[test]
fn getters_are_preserved() {
    let plain = PlainObject::new()
        .with("first", "Ada")
        .with("last", "Lovelace")
        .with_accessor(
            "full",
            |this| Value::from(format!("{} {}", this.get("first"), this.get("last"))),
            None,
        );
    let object = wrap(Value::PlainObject(plain), None);
    let object = object.as_object().unwrap().clone();

    let seen = Rc::new(RefCell::new(String::new()));
    let (o, s) = (object.clone(), Rc::clone(&seen));
    let _effect = effect(move || *s.borrow_mut() = o.get("full").to_string());
    assert_eq!(*seen.borrow(), "Ada Lovelace");

    object.set("first", "Augusta");
    tick();
    assert_eq!(*seen.borrow(), "Augusta Lovelace");
}

/// Child scopes read through to their parent and write to the owner.
#[test]
fn scope_chain_reads_and_writes() {
    let root = wrap(Value::PlainObject(PlainObject::new().with("n", 1)), None);
    let root = root.as_object().unwrap().clone();
    let child = bramble_core::store::Object::child(&root, [("local", Value::from(true))]);

    assert_eq!(child.get("n").to_number(), 1.0);
    child.set("n", 5);
    assert_eq!(root.get("n").to_number(), 5.0);
    assert!(!child.has_own("n"));
    assert!(root.get("local").is_undefined());
}
