//! Subscriber types for the reactive system.
//!
//! A subscriber is any computation that depends on reactive values: a
//! computed or an effect. Sources (signals and computeds) keep an ordered
//! set of their subscribers so that notification order follows the order in
//! which reactions first read the source.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::runtime::Reactive;

/// Unique identifier for a subscriber.
///
/// Each subscriber (computed, effect, or other reactive computation) gets a
/// unique ID when created. This ID is used to track dependencies and avoid
/// duplicate subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
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

/// The reactions observing one source, in subscription order.
///
/// Entries are weak: a source never keeps a reaction alive. Effects are
/// owned by the runtime registry, computeds by whoever holds them.
#[derive(Default)]
pub struct SubscriberSet {
    entries: RefCell<IndexMap<SubscriberId, Weak<dyn Reactive>>>,
}

impl SubscriberSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber. Re-inserting an existing ID keeps its position.
    pub fn insert(&self, id: SubscriberId, subscriber: Weak<dyn Reactive>) {
        self.entries.borrow_mut().entry(id).or_insert(subscriber);
    }

    /// Remove a subscriber, preserving the order of the rest.
    pub fn remove(&self, id: SubscriberId) {
        self.entries.borrow_mut().shift_remove(&id);
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.entries.borrow().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Notify every live subscriber that the source changed.
    ///
    /// The set is snapshotted first: a subscriber may subscribe or
    /// unsubscribe while being notified.
    pub fn notify(&self) {
        let targets: SmallVec<[Rc<dyn Reactive>; 4]> = {
            let mut entries = self.entries.borrow_mut();
            entries.retain(|_, weak| weak.strong_count() > 0);
            entries.values().filter_map(Weak::upgrade).collect()
        };

        for target in targets {
            target.notify();
        }
    }
}
