//! Reactive Store
//!
//! Lazy, structural wrapping of plain nested data into signal-backed
//! proxies.
//!
//! # Wrapping
//!
//! [`wrap`] turns a [`PlainObject`] into an [`Object`] and a [`PlainArray`]
//! into an [`Array`]. Everything else (primitives, functions, nodes, opaque
//! host values, and values that are already proxies) is returned unchanged.
//!
//! Wrapping is identity-stable: a thread-local table maps each plain value
//! to its live proxy, so wrapping the same plain value twice yields the same
//! proxy. The table holds weak references only; when the last handle to a
//! proxy goes away its entry is removed.
//!
//! Nested plain values are wrapped on first read, not when the parent is
//! wrapped.
//!
//! # Mutation discipline
//!
//! All writes must go through the proxy. Mutating the plain value after it
//! has been wrapped bypasses tracking and leaves readers stale.

mod array;
mod object;
mod plain;
mod value;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Weak;

pub use array::Array;
pub use object::Object;
pub use plain::{Getter, PlainArray, PlainObject, Property, Setter};
pub use value::{format_number, Function, Identity, NativeFn, Value};

enum WeakProxy {
    Object(Weak<object::ObjectInner>),
    Array(Weak<array::ArrayInner>),
}

thread_local! {
    static PROXIES: RefCell<HashMap<usize, WeakProxy>> = RefCell::new(HashMap::new());
}

/// Wrap plain data into a reactive proxy.
///
/// `parent` becomes the scope parent of a newly created object proxy. It is
/// ignored when the value already has a proxy.
pub fn wrap(value: Value, parent: Option<&Object>) -> Value {
    match value {
        Value::PlainObject(plain) => {
            let addr = plain.addr();
            if let Some(existing) = lookup(addr) {
                return existing;
            }
            let proxy = Object::from_plain(plain, parent.cloned());
            PROXIES.with(|table| {
                table
                    .borrow_mut()
                    .insert(addr, WeakProxy::Object(proxy.downgrade()))
            });
            Value::Object(proxy)
        }
        Value::PlainArray(plain) => {
            let addr = plain.addr();
            if let Some(existing) = lookup(addr) {
                return existing;
            }
            let proxy = Array::from_plain(plain);
            PROXIES.with(|table| {
                table
                    .borrow_mut()
                    .insert(addr, WeakProxy::Array(proxy.downgrade()))
            });
            Value::Array(proxy)
        }
        other => other,
    }
}

/// Wrap a plain object and return the proxy directly.
pub fn wrap_object(plain: PlainObject, parent: Option<&Object>) -> Object {
    match wrap(Value::PlainObject(plain), parent) {
        Value::Object(object) => object,
        // A plain object is only ever registered with an object proxy.
        _ => Object::from_plain(PlainObject::new(), parent.cloned()),
    }
}

fn lookup(addr: usize) -> Option<Value> {
    PROXIES.with(|table| {
        let table = table.borrow();
        match table.get(&addr)? {
            WeakProxy::Object(weak) => weak.upgrade().map(|inner| Value::Object(Object::from_inner(inner))),
            WeakProxy::Array(weak) => weak.upgrade().map(|inner| Value::Array(Array::from_inner(inner))),
        }
    })
}

/// Drop the table entry for a plain value whose proxy is going away.
fn forget(addr: usize) {
    // The table may already be gone during thread teardown.
    let _ = PROXIES.try_with(|table| {
        if let Ok(mut table) = table.try_borrow_mut() {
            let dead = match table.get(&addr) {
                Some(WeakProxy::Object(weak)) => weak.strong_count() == 0,
                Some(WeakProxy::Array(weak)) => weak.strong_count() == 0,
                None => false,
            };
            if dead {
                table.remove(&addr);
            }
        }
    });
}

/// Number of live entries in the identity table.
pub fn proxy_count() -> usize {
    PROXIES.with(|table| {
        table
            .borrow()
            .values()
            .filter(|proxy| match proxy {
                WeakProxy::Object(weak) => weak.strong_count() > 0,
                WeakProxy::Array(weak) => weak.strong_count() > 0,
            })
            .count()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapping_is_identity_stable() {
        let plain = PlainObject::new().with("a", 1);
        let first = wrap(plain.clone().into(), None);
        let second = wrap(plain.into(), None);
        assert_eq!(first, second);

        // Wrapping a proxy returns it.
        assert_eq!(wrap(first.clone(), None), first);
    }

    #[test]
    fn primitives_pass_through() {
        assert_eq!(wrap(Value::from(3), None), Value::from(3));
        assert_eq!(wrap(Value::str("s"), None), Value::str("s"));
        assert!(wrap(Value::Undefined, None).is_undefined());
    }

    #[test]
    fn nested_values_wrap_on_read() {
        let inner = PlainObject::new().with("x", 1);
        let outer = wrap_object(PlainObject::new().with("inner", inner.clone()), None);

        let read = outer.get("inner");
        assert!(matches!(read, Value::Object(_)));
        assert_eq!(read, outer.get("inner"));
        assert_eq!(read, wrap(inner.into(), None));
    }

    #[test]
    fn dropped_proxies_leave_the_table() {
        let plain = PlainArray::new().with(1);
        let before = proxy_count();
        {
            let _proxy = wrap(plain.clone().into(), None);
            assert_eq!(proxy_count(), before + 1);
        }
        assert_eq!(proxy_count(), before);
    }
}
