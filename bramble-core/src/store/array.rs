//! Array proxies.
//!
//! Per-index slots are created lazily, like object slots, and the length is
//! a signal of its own. Reads past the end track the length, so they see
//! the array grow.
//!
//! Bulk operations (`push`, `pop`, `shift`, `unshift`, `splice`,
//! `replace_with`) run untracked inside a batch and write index by index:
//! indices whose value did not change notify nobody. Disposers attached to
//! an index belong to the position, not to the value; they run when the
//! index is deleted or truncated away, after the removal is visible through
//! [`Array::held`] and before any reader reruns.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::reactive::{batch, untracked, Disposer, Signal};

use super::plain::PlainArray;
use super::value::Value;
use super::wrap;

enum SlotKind {
    Lazy(Value),
    Cell(Signal<Value>),
}

struct Slot {
    kind: SlotKind,
    disposer: Option<Disposer>,
}

impl Slot {
    fn lazy(value: Value) -> Self {
        Self {
            kind: SlotKind::Lazy(value),
            disposer: None,
        }
    }
}

pub(super) struct ArrayInner {
    source: PlainArray,
    slots: RefCell<Vec<Slot>>,
    len: Signal<usize>,
}

impl Drop for ArrayInner {
    fn drop(&mut self) {
        super::forget(self.source.addr());
    }
}

/// A reactive proxy over a plain array.
#[derive(Clone)]
pub struct Array {
    inner: Rc<ArrayInner>,
}

impl Array {
    pub(super) fn from_plain(source: PlainArray) -> Self {
        let slots: Vec<Slot> = source.to_vec().into_iter().map(Slot::lazy).collect();
        let len = slots.len();
        Self {
            inner: Rc::new(ArrayInner {
                source,
                slots: RefCell::new(slots),
                len: Signal::new(len),
            }),
        }
    }

    pub(super) fn downgrade(&self) -> Weak<ArrayInner> {
        Rc::downgrade(&self.inner)
    }

    pub(super) fn from_inner(inner: Rc<ArrayInner>) -> Self {
        Self { inner }
    }

    /// The plain array this proxy wraps.
    pub fn source(&self) -> PlainArray {
        self.inner.source.clone()
    }

    /// Read the item at `index`.
    pub fn get(&self, index: usize) -> Value {
        let cell = {
            let mut slots = self.inner.slots.borrow_mut();
            match slots.get_mut(index) {
                None => None,
                Some(slot) => Some(materialize(slot)),
            }
        };
        match cell {
            Some(signal) => signal.get(),
            None => {
                self.inner.len.get();
                Value::Undefined
            }
        }
    }

    /// Current length. Tracked.
    pub fn len(&self) -> usize {
        self.inner.len.get()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every item, in order. Tracks the length and each index.
    pub fn to_vec(&self) -> Vec<Value> {
        (0..self.len()).map(|i| self.get(i)).collect()
    }

    /// Every item, in order, without tracking.
    pub fn peek_vec(&self) -> Vec<Value> {
        untracked(|| self.to_vec())
    }

    fn peek_len(&self) -> usize {
        self.inner.len.peek()
    }

    /// Items currently held, untracked.
    ///
    /// Unlike [`Array::peek_vec`] this goes by the slots rather than the
    /// length signal, so it already reflects a truncation in progress.
    pub fn held(&self) -> Vec<Value> {
        let cells: Vec<Signal<Value>> = self
            .inner
            .slots
            .borrow_mut()
            .iter_mut()
            .map(materialize)
            .collect();
        cells.iter().map(Signal::peek).collect()
    }

    /// Write the item at `index`, growing the array when needed.
    pub fn set(&self, index: usize, value: impl Into<Value>) {
        let value = value.into();
        let wrapped = wrap(value.clone(), None);

        let cell = {
            let mut slots = self.inner.slots.borrow_mut();
            match slots.get_mut(index) {
                Some(slot) => match &slot.kind {
                    SlotKind::Cell(signal) => Some(signal.clone()),
                    SlotKind::Lazy(_) => {
                        slot.kind = SlotKind::Cell(Signal::new(wrapped.clone()));
                        None
                    }
                },
                None => {
                    slots.resize_with(index, || Slot::lazy(Value::Undefined));
                    slots.push(Slot {
                        kind: SlotKind::Cell(Signal::new(wrapped.clone())),
                        disposer: None,
                    });
                    None
                }
            }
        };

        if let Some(signal) = cell {
            signal.set(wrapped);
        }
        self.inner.source.set(index, value);

        let len = self.inner.slots.borrow().len();
        self.inner.len.set(len);
    }

    /// Change the length.
    ///
    /// Shrinking drops the removed slots from the array, runs their
    /// disposers, then notifies their readers with `undefined`.
    pub fn set_len(&self, len: usize) {
        batch(|| {
            untracked(|| {
                let current = self.peek_len();
                if len < current {
                    self.truncate(len, current);
                } else if len > current {
                    self.inner
                        .slots
                        .borrow_mut()
                        .resize_with(len, || Slot::lazy(Value::Undefined));
                    self.inner.source.resize(len);
                }
                self.inner.len.set(len);
            })
        })
    }

    fn truncate(&self, len: usize, current: usize) {
        let mut removed: Vec<Slot> = self.inner.slots.borrow_mut().drain(len..).collect();
        self.inner.source.resize(len);

        let disposers: Vec<Disposer> = removed
            .iter_mut()
            .filter_map(|slot| slot.disposer.take())
            .collect();
        let disposed = disposers.len();
        for dispose in disposers {
            dispose();
        }

        for slot in removed {
            if let SlotKind::Cell(signal) = slot.kind {
                signal.set(Value::Undefined);
            }
        }

        trace!(from = current, to = len, disposed, "array truncated");
    }

    /// Append items, returning the new length.
    pub fn push(&self, items: impl IntoIterator<Item = Value>) -> usize {
        batch(|| {
            untracked(|| {
                for item in items {
                    self.set(self.peek_len(), item);
                }
                self.peek_len()
            })
        })
    }

    /// Remove and return the last item.
    pub fn pop(&self) -> Value {
        batch(|| {
            untracked(|| {
                let len = self.peek_len();
                if len == 0 {
                    return Value::Undefined;
                }
                let last = self.get(len - 1);
                self.set_len(len - 1);
                last
            })
        })
    }

    /// Remove and return the first item.
    pub fn shift(&self) -> Value {
        batch(|| {
            untracked(|| {
                let len = self.peek_len();
                if len == 0 {
                    return Value::Undefined;
                }
                let first = self.get(0);
                for i in 1..len {
                    let next = self.get(i);
                    self.set(i - 1, next);
                }
                self.set_len(len - 1);
                first
            })
        })
    }

    /// Prepend items, returning the new length.
    pub fn unshift(&self, items: Vec<Value>) -> usize {
        self.splice(0, 0, items);
        self.inner.len.peek()
    }

    /// Remove `delete_count` items at `start`, insert `items` in their
    /// place and return the removed items.
    pub fn splice(&self, start: usize, delete_count: usize, items: Vec<Value>) -> Vec<Value> {
        let mut next = self.peek_vec();
        let start = start.min(next.len());
        let end = start.saturating_add(delete_count).min(next.len());
        let removed: Vec<Value> = next.splice(start..end, items).collect();
        self.replace_with(next);
        removed
    }

    /// Replace the whole content, index by index.
    pub fn replace_with(&self, items: Vec<Value>) {
        batch(|| {
            untracked(|| {
                let len = items.len();
                for (i, item) in items.into_iter().enumerate() {
                    self.set(i, item);
                }
                if len < self.peek_len() {
                    self.set_len(len);
                }
            })
        })
    }

    /// Clear the item at `index` without changing the length.
    ///
    /// The attached disposer runs once the slot holds `undefined`.
    pub fn delete(&self, index: usize) -> bool {
        let disposer = {
            let mut slots = self.inner.slots.borrow_mut();
            match slots.get_mut(index) {
                None => return false,
                Some(slot) => slot.disposer.take(),
            }
        };
        batch(|| {
            self.set(index, Value::Undefined);
            if let Some(dispose) = disposer {
                dispose();
            }
        });
        true
    }

    /// Attach a cleanup callback to `index`.
    ///
    /// Returns `false` when the index is out of range.
    pub fn attach_disposer(&self, index: usize, disposer: Disposer) -> bool {
        let previous = {
            let mut slots = self.inner.slots.borrow_mut();
            match slots.get_mut(index) {
                None => return false,
                Some(slot) => slot.disposer.replace(disposer),
            }
        };
        if let Some(previous) = previous {
            previous();
        }
        true
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.inner) as *const () as usize
    }
}

fn materialize(slot: &mut Slot) -> Signal<Value> {
    let lazy = match &slot.kind {
        SlotKind::Lazy(raw) => Some(raw.clone()),
        SlotKind::Cell(_) => None,
    };
    if let Some(raw) = lazy {
        slot.kind = SlotKind::Cell(Signal::new(wrap(raw, None)));
    }
    match &slot.kind {
        SlotKind::Cell(signal) => signal.clone(),
        SlotKind::Lazy(_) => Signal::new(Value::Undefined),
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Array")
            .field("len", &self.inner.len.peek())
            .finish()
    }
}
