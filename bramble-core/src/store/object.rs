//! Object proxies.
//!
//! An [`Object`] stands in for a [`PlainObject`]. Each own key gets a slot
//! that starts out holding the raw value and turns into a `Signal` the first
//! time it is read. Accessor properties become computed values whose getter
//! sees the proxy as `this`. A separate key-version signal is observed by
//! enumeration and by reads of missing keys; it only changes when a key is
//! added or removed.
//!
//! Objects may have a parent. Reads of keys the object does not own fall
//! through to the parent, and writes to such keys go to whichever ancestor
//! owns them. Directive scopes are built from this chain. An overlay is a
//! child that only holds a few temporary names: writes to names nobody owns
//! land on its parent instead of on the overlay.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use tracing::debug;

use crate::reactive::{Computed, Disposer, Signal};

use super::plain::{PlainObject, Property, Setter};
use super::value::Value;
use super::wrap;

enum SlotKind {
    /// Raw value, not read yet.
    Lazy(Value),
    Cell(Signal<Value>),
    Derived(Computed<Value>, Option<Setter>),
}

struct Slot {
    kind: SlotKind,
    disposer: Option<Disposer>,
}

impl Slot {
    fn new(kind: SlotKind) -> Self {
        Self {
            kind,
            disposer: None,
        }
    }
}

pub(super) struct ObjectInner {
    source: PlainObject,
    slots: RefCell<IndexMap<String, Slot>>,
    keys: Signal<usize>,
    parent: Option<Object>,
    transparent: bool,
}

impl Drop for ObjectInner {
    fn drop(&mut self) {
        super::forget(self.source.addr());
    }
}

/// How a write to an existing slot is carried out, decided under the
/// slot borrow and executed after it is released.
enum Write {
    Fresh,
    Cell(Signal<Value>),
    Setter(Setter),
    ReadOnly,
}

/// A reactive proxy over a plain object.
#[derive(Clone)]
pub struct Object {
    inner: Rc<ObjectInner>,
}

impl Object {
    pub(super) fn from_plain(source: PlainObject, parent: Option<Object>) -> Self {
        Self::build(source, parent, false)
    }

    fn build(source: PlainObject, parent: Option<Object>, transparent: bool) -> Self {
        let inner = Rc::new_cyclic(|this: &Weak<ObjectInner>| {
            let mut slots = IndexMap::new();
            for (key, property) in source.entries() {
                let kind = match property {
                    Property::Data(value) => SlotKind::Lazy(value),
                    Property::Accessor { get, set } => {
                        let this = this.clone();
                        let computed = Computed::new(move || match this.upgrade() {
                            Some(inner) => get(&Object { inner }),
                            None => Value::Undefined,
                        });
                        SlotKind::Derived(computed, set)
                    }
                };
                slots.insert(key, Slot::new(kind));
            }

            ObjectInner {
                source,
                slots: RefCell::new(slots),
                keys: Signal::new(0),
                parent,
                transparent,
            }
        });
        Self { inner }
    }

    pub(super) fn downgrade(&self) -> Weak<ObjectInner> {
        Rc::downgrade(&self.inner)
    }

    pub(super) fn from_inner(inner: Rc<ObjectInner>) -> Self {
        Self { inner }
    }

    /// A scope that inherits from `parent` and owns `bindings`.
    pub fn child<K: Into<String>>(
        parent: &Object,
        bindings: impl IntoIterator<Item = (K, Value)>,
    ) -> Object {
        let scope = Object::from_plain(PlainObject::new(), Some(parent.clone()));
        for (key, value) in bindings {
            scope.define(&key.into(), value);
        }
        scope
    }

    /// A child of `parent` holding `bindings` that hands writes to unowned
    /// names to `parent`.
    pub fn overlay<K: Into<String>>(
        parent: &Object,
        bindings: impl IntoIterator<Item = (K, Value)>,
    ) -> Object {
        let scope = Object::build(PlainObject::new(), Some(parent.clone()), true);
        for (key, value) in bindings {
            scope.define(&key.into(), value);
        }
        scope
    }

    pub fn parent(&self) -> Option<&Object> {
        self.inner.parent.as_ref()
    }

    /// The plain object this proxy wraps.
    pub fn source(&self) -> PlainObject {
        self.inner.source.clone()
    }

    /// Read `key`, falling through to the parent when it is not owned.
    pub fn get(&self, key: &str) -> Value {
        enum Read {
            Cell(Signal<Value>),
            Derived(Computed<Value>),
        }

        let read = {
            let mut slots = self.inner.slots.borrow_mut();
            match slots.get_mut(key) {
                None => None,
                Some(slot) => {
                    let lazy = match &slot.kind {
                        SlotKind::Lazy(raw) => Some(raw.clone()),
                        _ => None,
                    };
                    if let Some(raw) = lazy {
                        slot.kind = SlotKind::Cell(Signal::new(wrap(raw, None)));
                    }
                    match &slot.kind {
                        SlotKind::Cell(signal) => Some(Read::Cell(signal.clone())),
                        SlotKind::Derived(computed, _) => Some(Read::Derived(computed.clone())),
                        SlotKind::Lazy(_) => None,
                    }
                }
            }
        };

        match read {
            Some(Read::Cell(signal)) => signal.get(),
            Some(Read::Derived(computed)) => computed.get(),
            None => {
                // Absent keys may appear later.
                self.inner.keys.get();
                match &self.inner.parent {
                    Some(parent) => parent.get(key),
                    None => Value::Undefined,
                }
            }
        }
    }

    /// Whether this object itself owns `key`. Untracked.
    pub fn has_own(&self, key: &str) -> bool {
        self.inner.slots.borrow().contains_key(key)
    }

    /// Whether `key` resolves anywhere along the scope chain.
    pub fn has(&self, key: &str) -> bool {
        if self.has_own(key) {
            return true;
        }
        self.inner.keys.get();
        self.inner.parent.as_ref().is_some_and(|p| p.has(key))
    }

    fn owner_of(&self, key: &str) -> Option<Object> {
        if self.has_own(key) {
            return Some(self.clone());
        }
        self.inner.parent.as_ref().and_then(|p| p.owner_of(key))
    }

    /// Write `key`.
    ///
    /// A key this object does not own but an ancestor does is written on
    /// that ancestor. A key nobody owns is defined here, or on the parent
    /// for an overlay. Writing an equal value notifies nobody.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        if !self.has_own(key) {
            if let Some(parent) = &self.inner.parent {
                if self.inner.transparent {
                    parent.set(key, value);
                    return;
                }
                if let Some(owner) = parent.owner_of(key) {
                    owner.set(key, value);
                    return;
                }
            }
        }
        self.define(key, value);
    }

    /// Write `key` on this object, never on an ancestor.
    pub fn define(&self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        let write = {
            let mut slots = self.inner.slots.borrow_mut();
            match slots.get_mut(key) {
                None => Write::Fresh,
                Some(slot) => match &slot.kind {
                    SlotKind::Lazy(raw) => {
                        // Arrays wrapped elsewhere are updated through their proxy.
                        let signal = Signal::new(wrap(raw.clone(), None));
                        slot.kind = SlotKind::Cell(signal.clone());
                        Write::Cell(signal)
                    }
                    SlotKind::Cell(signal) => Write::Cell(signal.clone()),
                    SlotKind::Derived(_, Some(setter)) => Write::Setter(setter.clone()),
                    SlotKind::Derived(_, None) => Write::ReadOnly,
                },
            }
        };

        match write {
            Write::Fresh => {
                let signal = Signal::new(wrap(value.clone(), None));
                self.inner
                    .slots
                    .borrow_mut()
                    .insert(key.to_string(), Slot::new(SlotKind::Cell(signal)));
                self.inner.keys.update(|v| v + 1);
            }
            Write::Cell(signal) => {
                if let Value::Array(existing) = signal.peek() {
                    if replace_array_in_place(&existing, &value) {
                        return;
                    }
                }
                signal.set(wrap(value.clone(), None));
            }
            Write::Setter(setter) => {
                setter(self, value);
                return;
            }
            Write::ReadOnly => {
                debug!(key, "ignored write to getter-only property");
                return;
            }
        }

        self.inner.source.insert(key, value);
    }

    /// Remove `key`.
    ///
    /// Drops the slot, runs its attached disposer, then notifies readers as
    /// if the key were set to `undefined`.
    pub fn delete(&self, key: &str) -> bool {
        let Some(mut slot) = self.inner.slots.borrow_mut().shift_remove(key) else {
            return false;
        };
        self.inner.source.remove(key);
        if let Some(dispose) = slot.disposer.take() {
            dispose();
        }

        match slot.kind {
            SlotKind::Cell(signal) => {
                signal.set(Value::Undefined);
            }
            SlotKind::Derived(computed, _) => computed.mark_dirty(),
            SlotKind::Lazy(_) => {}
        }
        self.inner.keys.update(|v| v + 1);
        true
    }

    /// Attach a cleanup callback to the slot for `key`.
    ///
    /// It runs when the key is deleted, once the key is gone from
    /// [`Object::keys`]. Returns `false` when the key is not owned by this
    /// object.
    pub fn attach_disposer(&self, key: &str, disposer: Disposer) -> bool {
        let previous = {
            let mut slots = self.inner.slots.borrow_mut();
            match slots.get_mut(key) {
                None => return false,
                Some(slot) => slot.disposer.replace(disposer),
            }
        };
        if let Some(previous) = previous {
            previous();
        }
        true
    }

    /// Own keys in insertion order. Tracks additions and removals.
    pub fn keys(&self) -> Vec<String> {
        self.inner.keys.get();
        self.inner.slots.borrow().keys().cloned().collect()
    }

    /// Own `(key, value)` pairs. Tracks the key set and every value.
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.keys()
            .into_iter()
            .map(|key| {
                let value = self.get(&key);
                (key, value)
            })
            .collect()
    }

    /// Number of own keys. Tracks additions and removals.
    pub fn len(&self) -> usize {
        self.inner.keys.get();
        self.inner.slots.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.inner) as *const () as usize
    }
}

/// Turn an array assignment over a wrapped array into an in-place update.
fn replace_array_in_place(existing: &super::Array, incoming: &Value) -> bool {
    let items = match incoming {
        Value::Array(array) if array.ptr_eq(existing) => return true,
        Value::Array(array) => array.peek_vec(),
        Value::PlainArray(plain) if plain.ptr_eq(&existing.source()) => return true,
        Value::PlainArray(plain) => plain.to_vec(),
        _ => return false,
    };
    existing.replace_with(items);
    true
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("keys", &self.inner.slots.borrow().keys().collect::<Vec<_>>())
            .field("has_parent", &self.inner.parent.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{tick, Effect};
    use crate::store::PlainArray;
    use std::cell::Cell;

    fn object(plain: PlainObject) -> Object {
        match wrap(plain.into(), None) {
            Value::Object(o) => o,
            other => panic!("expected object, got {other:?}"),
        }
    }

    fn runs_of(f: impl Fn() + 'static) -> (Effect, Rc<Cell<usize>>) {
        let runs = Rc::new(Cell::new(0));
        let r = runs.clone();
        let effect = Effect::new(move || {
            f();
            r.set(r.get() + 1);
        });
        (effect, runs)
    }

    #[test]
    fn slots_are_created_lazily() {
        let state = object(PlainObject::new().with("a", 1).with("b", 2));
        let o = state.clone();
        let (effect, runs) = runs_of(move || {
            o.get("a");
        });

        state.set("b", 3);
        tick();
        assert_eq!(runs.get(), 1);

        state.set("a", 5);
        tick();
        assert_eq!(runs.get(), 2);
        assert_eq!(state.get("a"), Value::from(5));
        effect.dispose();
    }

    #[test]
    fn overwrite_does_not_touch_enumeration() {
        let state = object(PlainObject::new().with("a", 1));
        let o = state.clone();
        let (effect, runs) = runs_of(move || {
            o.keys();
        });

        state.set("a", 2);
        tick();
        assert_eq!(runs.get(), 1);

        state.set("b", 1);
        tick();
        assert_eq!(runs.get(), 2);

        state.delete("a");
        tick();
        assert_eq!(runs.get(), 3);
        assert_eq!(state.keys(), vec!["b".to_string()]);
        effect.dispose();
    }

    #[test]
    fn reading_a_missing_key_sees_it_appear() {
        let state = object(PlainObject::new());
        let seen = Rc::new(RefCell::new(Value::Undefined));
        let (o, s) = (state.clone(), seen.clone());
        let effect = Effect::new(move || *s.borrow_mut() = o.get("late"));

        state.set("late", "here");
        tick();
        assert_eq!(*seen.borrow(), Value::str("here"));
        effect.dispose();
    }

    #[test]
    fn getters_see_the_proxy_and_track_fields() {
        let plain = PlainObject::new()
            .with("first", "Ada")
            .with("last", "Lovelace")
            .with_accessor(
                "full",
                |this| Value::from(format!("{} {}", this.get("first"), this.get("last"))),
                None,
            );
        let state = object(plain);
        assert_eq!(state.get("full"), Value::str("Ada Lovelace"));

        state.set("first", "Augusta");
        assert_eq!(state.get("full"), Value::str("Augusta Lovelace"));

        // Getter-only properties ignore writes.
        state.set("full", "nobody");
        assert_eq!(state.get("full"), Value::str("Augusta Lovelace"));
    }

    #[test]
    fn setters_are_routed_through() {
        let setter: Setter = Rc::new(|this: &Object, value: Value| {
            this.set("celsius", Value::from((value.to_number() - 32.0) * 5.0 / 9.0));
        });
        let plain = PlainObject::new().with("celsius", 0).with_accessor(
            "fahrenheit",
            |this| Value::from(this.get("celsius").to_number() * 9.0 / 5.0 + 32.0),
            Some(setter),
        );
        let state = object(plain);

        state.set("fahrenheit", 212);
        assert_eq!(state.get("celsius"), Value::from(100));
        assert_eq!(state.get("fahrenheit"), Value::from(212));
    }

    #[test]
    fn scope_chain_reads_fall_through_and_writes_reach_the_owner() {
        let root = object(PlainObject::new().with("count", 1));
        let scope = Object::child(&root, [("item", Value::from("x"))]);

        assert_eq!(scope.get("count"), Value::from(1));
        assert_eq!(scope.get("item"), Value::str("x"));
        assert!(root.get("item").is_undefined());

        scope.set("count", 2);
        assert!(!scope.has_own("count"));
        assert_eq!(root.get("count"), Value::from(2));

        scope.set("fresh", true);
        assert!(scope.has_own("fresh"));
        assert!(!root.has_own("fresh"));
    }

    #[test]
    fn delete_runs_disposer_before_notifying() {
        let state = object(PlainObject::new().with("a", 1));
        let order = Rc::new(RefCell::new(Vec::new()));

        let (o, log) = (state.clone(), order.clone());
        let effect = Effect::new(move || {
            let v = o.get("a");
            log.borrow_mut().push(format!("read {v:?}"));
        });

        let log = order.clone();
        assert!(state.attach_disposer("a", Box::new(move || log.borrow_mut().push("dispose".into()))));
        assert!(state.delete("a"));
        tick();

        assert_eq!(
            *order.borrow(),
            vec!["read 1".to_string(), "dispose".into(), "read undefined".into()]
        );
        assert!(!state.has_own("a"));
        effect.dispose();
    }

    #[test]
    fn assigning_an_array_updates_in_place() {
        let list = PlainArray::from(vec![Value::from(1), Value::from(2), Value::from(3)]);
        let state = object(PlainObject::new().with("list", list));

        let before = state.get("list");
        let array = before.as_array().cloned().unwrap();

        let a = array.clone();
        let (effect, runs) = runs_of(move || {
            a.get(0);
        });

        state.set(
            "list",
            PlainArray::from(vec![Value::from(1), Value::from(9)]),
        );
        tick();

        let after = state.get("list");
        assert_eq!(before, after);
        assert_eq!(array.peek_vec(), vec![Value::from(1), Value::from(9)]);
        // Index 0 did not change.
        assert_eq!(runs.get(), 1);
        effect.dispose();
    }

    #[test]
    fn assigning_over_an_unread_array_reuses_its_proxy() {
        let list = PlainArray::from(vec![Value::from(1), Value::from(2)]);
        let state = object(PlainObject::new().with("list", list.clone()));
        let elsewhere = wrap(Value::PlainArray(list), None);
        let array = elsewhere.as_array().cloned().unwrap();

        let a = array.clone();
        let (effect, runs) = runs_of(move || {
            a.get(1);
        });

        state.set(
            "list",
            PlainArray::from(vec![Value::from(1), Value::from(9)]),
        );
        tick();

        assert_eq!(runs.get(), 2);
        assert_eq!(array.peek_vec(), vec![Value::from(1), Value::from(9)]);
        assert_eq!(state.get("list"), elsewhere);
        effect.dispose();
    }

    #[test]
    fn deleted_keys_are_gone_when_the_disposer_runs() {
        let state = object(PlainObject::new().with("a", 1).with("b", 2));
        let seen = Rc::new(RefCell::new(Vec::new()));

        let (o, s) = (state.clone(), seen.clone());
        assert!(state.attach_disposer("a", Box::new(move || *s.borrow_mut() = o.keys())));
        state.delete("a");

        assert_eq!(*seen.borrow(), vec!["b".to_string()]);
    }

    #[test]
    fn overlays_hand_new_names_to_the_parent() {
        let root = object(PlainObject::new().with("count", 1));
        let scope = Object::child(&root, [("item", Value::from("x"))]);
        let overlay = Object::overlay(&scope, [("event", Value::from(0))]);

        overlay.set("count", 2);
        overlay.set("fresh", true);
        overlay.set("event", 1);

        assert_eq!(root.get("count"), Value::from(2));
        assert!(scope.has_own("fresh"));
        assert!(!overlay.has_own("fresh"));
        assert_eq!(overlay.get("event"), Value::from(1));
    }
}
