//! Plain data: objects and arrays with identity but no reactivity.
//!
//! This is what applications hand to [`wrap`](super::wrap). Once a plain
//! value has been wrapped, all writes must go through the proxy; mutating
//! the plain value directly bypasses tracking and leaves the proxy stale.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use super::object::Object;
use super::value::Value;

/// Accessor getter. Receives the proxy as `this`.
pub type Getter = Rc<dyn Fn(&Object) -> Value>;

/// Accessor setter. Receives the proxy as `this`.
pub type Setter = Rc<dyn Fn(&Object, Value)>;

/// One own property of a plain object.
#[derive(Clone)]
pub enum Property {
    Data(Value),
    Accessor { get: Getter, set: Option<Setter> },
}

impl fmt::Debug for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Property::Data(v) => write!(f, "{v:?}"),
            Property::Accessor { set, .. } => {
                if set.is_some() {
                    f.write_str("[Getter/Setter]")
                } else {
                    f.write_str("[Getter]")
                }
            }
        }
    }
}

/// A plain mapping from keys to properties, in insertion order.
#[derive(Clone, Default)]
pub struct PlainObject(Rc<RefCell<IndexMap<String, Property>>>);

impl PlainObject {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`PlainObject::insert`].
    pub fn with(self, key: &str, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Builder for an accessor property.
    pub fn with_accessor(
        self,
        key: &str,
        get: impl Fn(&Object) -> Value + 'static,
        set: Option<Setter>,
    ) -> Self {
        self.0.borrow_mut().insert(
            key.to_string(),
            Property::Accessor {
                get: Rc::new(get),
                set,
            },
        );
        self
    }

    pub fn insert(&self, key: &str, value: impl Into<Value>) {
        self.0
            .borrow_mut()
            .insert(key.to_string(), Property::Data(value.into()));
    }

    pub fn remove(&self, key: &str) -> Option<Property> {
        self.0.borrow_mut().shift_remove(key)
    }

    pub fn get(&self, key: &str) -> Option<Property> {
        self.0.borrow().get(key).cloned()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.borrow().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.0.borrow().keys().cloned().collect()
    }

    pub fn entries(&self) -> Vec<(String, Property)> {
        self.0
            .borrow()
            .iter()
            .map(|(k, p)| (k.clone(), p.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}

impl fmt::Debug for PlainObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.0.borrow().iter()).finish()
    }
}

/// A plain ordered sequence.
#[derive(Clone, Default)]
pub struct PlainArray(Rc<RefCell<Vec<Value>>>);

impl PlainArray {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`PlainArray::push`].
    pub fn with(self, value: impl Into<Value>) -> Self {
        self.push(value);
        self
    }

    pub fn push(&self, value: impl Into<Value>) {
        self.0.borrow_mut().push(value.into());
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.0.borrow().get(index).cloned()
    }

    pub(crate) fn set(&self, index: usize, value: Value) {
        let mut items = self.0.borrow_mut();
        if index >= items.len() {
            items.resize(index + 1, Value::Undefined);
        }
        items[index] = value;
    }

    pub(crate) fn resize(&self, len: usize) {
        self.0.borrow_mut().resize(len, Value::Undefined);
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.0.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}

impl From<Vec<Value>> for PlainArray {
    fn from(items: Vec<Value>) -> Self {
        Self(Rc::new(RefCell::new(items)))
    }
}

impl FromIterator<Value> for PlainArray {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self::from(iter.into_iter().collect::<Vec<_>>())
    }
}

impl fmt::Debug for PlainArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.borrow().iter()).finish()
    }
}
