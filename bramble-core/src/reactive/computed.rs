//! Computed Implementation
//!
//! A Computed is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Computeds Work
//!
//! 1. On first access, the computed runs its function and caches the result.
//!
//! 2. When accessed again, if no dependencies have changed, returns the
//!    cached value.
//!
//! 3. When a dependency changes, the computed is marked dirty and forwards
//!    the notification to its own subscribers. Nothing is recomputed yet.
//!
//! 4. On next access, the computed recomputes synchronously.
//!
//! # Why This Matters
//!
//! This pull-based approach avoids unnecessary recomputation:
//!
//! - A signal changes
//! - 10 computeds depend on it
//! - Only the computeds actually read will recompute
//! - Computeds that are never read stay dirty (no wasted work)

use std::cell::{Cell, RefCell};
use std::fmt::Debug;
use std::rc::{Rc, Weak};

use super::context::ReactiveContext;
use super::runtime::{Reactive, Source};
use super::signal::next_source_id;
use super::subscriber::{SubscriberId, SubscriberSet};

/// Dirty state for a computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputedState {
    /// The cached value is up-to-date.
    Clean,

    /// A dependency changed since the last computation.
    Dirty,
}

struct ComputedInner<T: 'static> {
    id: u64,
    subscriber_id: SubscriberId,
    compute: Box<dyn Fn() -> T>,
    value: RefCell<Option<T>>,
    state: Cell<ComputedState>,
    dependencies: RefCell<Vec<Rc<dyn Source>>>,
    subscribers: SubscriberSet,
    this: Weak<ComputedInner<T>>,
}

impl<T: 'static> Reactive for ComputedInner<T> {
    fn subscriber_id(&self) -> SubscriberId {
        self.subscriber_id
    }

    fn notify(&self) {
        // Already dirty means our subscribers were told on the first change.
        if self.state.get() == ComputedState::Clean {
            self.state.set(ComputedState::Dirty);
            self.subscribers.notify();
        }
    }
}

impl<T: 'static> Source for ComputedInner<T> {
    fn source_id(&self) -> u64 {
        self.id
    }

    fn unsubscribe(&self, subscriber: SubscriberId) {
        self.subscribers.remove(subscriber);
    }
}

/// A cached derived value that recomputes lazily after its dependencies
/// change.
///
/// Cloning yields another handle to the same computation.
pub struct Computed<T: 'static> {
    inner: Rc<ComputedInner<T>>,
}

impl<T> Computed<T>
where
    T: Clone + 'static,
{
    /// Create a new computed with the given function.
    ///
    /// The function is not run immediately. It runs on first access.
    pub fn new(compute: impl Fn() -> T + 'static) -> Self {
        let inner = Rc::new_cyclic(|this| ComputedInner {
            id: next_source_id(),
            subscriber_id: SubscriberId::new(),
            compute: Box::new(compute),
            value: RefCell::new(None),
            state: Cell::new(ComputedState::Dirty),
            dependencies: RefCell::new(Vec::new()),
            subscribers: SubscriberSet::new(),
            this: this.clone(),
        });
        Self { inner }
    }

    /// Get the computed's unique source ID.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Get the subscriber ID used while this computed tracks its inputs.
    pub fn subscriber_id(&self) -> SubscriberId {
        self.inner.subscriber_id
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// If called within a reactive context, the caller subscribes to this
    /// computed.
    pub fn get(&self) -> T {
        let source: Rc<dyn Source> = self.inner.clone();
        if let Some((id, observer)) = ReactiveContext::track(source) {
            self.inner.subscribers.insert(id, observer);
        }
        self.value()
    }

    /// Get the current value without subscribing the caller.
    pub fn peek(&self) -> T {
        self.value()
    }

    fn value(&self) -> T {
        if self.inner.state.get() == ComputedState::Clean {
            if let Some(value) = self.inner.value.borrow().as_ref() {
                return value.clone();
            }
        }
        self.recompute()
    }

    /// Force the next read to recompute.
    pub fn mark_dirty(&self) {
        self.inner.notify();
    }

    /// Recompute the value.
    ///
    /// Runs the function within a reactive context so its dependency set is
    /// rebuilt from scratch.
    fn recompute(&self) -> T {
        let stale = std::mem::take(&mut *self.inner.dependencies.borrow_mut());
        for source in stale {
            source.unsubscribe(self.inner.subscriber_id);
        }

        let observer: Weak<dyn Reactive> = self.inner.this.clone();
        let ctx = ReactiveContext::enter(self.inner.subscriber_id, observer);
        let value = (self.inner.compute)();
        let dependencies = ctx.take_dependencies();
        drop(ctx);

        *self.inner.dependencies.borrow_mut() = dependencies;
        *self.inner.value.borrow_mut() = Some(value.clone());
        self.inner.state.set(ComputedState::Clean);
        value
    }

    /// Get the current dirty state.
    pub fn state(&self) -> ComputedState {
        self.inner.state.get()
    }

    /// Get the number of reactions reading this computed.
    pub fn dependent_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    /// Get the number of sources read during the last computation.
    pub fn dependency_count(&self) -> usize {
        self.inner.dependencies.borrow().len()
    }

    /// Check if the computed has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner.value.borrow().is_some()
    }

    /// Whether two handles point at the same computation.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Computed<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.inner.id)
            .field("state", &self.inner.state.get())
            .field("has_value", &self.inner.value.borrow().is_some())
            .field("dependent_count", &self.inner.subscribers.len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{tick, Effect, Signal};

    fn counter() -> Rc<Cell<i32>> {
        Rc::new(Cell::new(0))
    }

    #[test]
    fn computed_runs_on_first_access() {
        let call_count = counter();
        let call_count_clone = call_count.clone();

        let computed = Computed::new(move || {
            call_count_clone.set(call_count_clone.get() + 1);
            42
        });

        // Not computed yet
        assert!(!computed.has_value());
        assert_eq!(call_count.get(), 0);

        // First access triggers computation
        assert_eq!(computed.get(), 42);
        assert_eq!(call_count.get(), 1);
        assert!(computed.has_value());
    }

    #[test]
    fn computed_caches_value_when_clean() {
        let call_count = counter();
        let call_count_clone = call_count.clone();

        let computed = Computed::new(move || {
            call_count_clone.set(call_count_clone.get() + 1);
            42
        });

        assert_eq!(computed.get(), 42);
        assert_eq!(computed.get(), 42);
        assert_eq!(computed.get(), 42);
        assert_eq!(call_count.get(), 1);
    }

    #[test]
    fn computed_is_pull_based() {
        let source = Signal::new(1);
        let call_count = counter();

        let source_clone = source.clone();
        let call_count_clone = call_count.clone();
        let doubled = Computed::new(move || {
            call_count_clone.set(call_count_clone.get() + 1);
            source_clone.get() * 2
        });

        assert_eq!(doubled.get(), 2);
        assert_eq!(call_count.get(), 1);

        // Writes only mark the computed stale.
        source.set(2);
        source.set(3);
        assert_eq!(doubled.state(), ComputedState::Dirty);
        assert_eq!(call_count.get(), 1);

        assert_eq!(doubled.get(), 6);
        assert_eq!(call_count.get(), 2);
    }

    #[test]
    fn computed_chain_propagates_staleness() {
        let base = Signal::new(5);

        let base_clone = base.clone();
        let doubled = Computed::new(move || base_clone.get() * 2);

        let doubled_clone = doubled.clone();
        let plus_ten = Computed::new(move || doubled_clone.get() + 10);

        assert_eq!(plus_ten.get(), 20);

        base.set(10);
        assert_eq!(plus_ten.state(), ComputedState::Dirty);
        assert_eq!(plus_ten.get(), 30);
    }

    #[test]
    fn effect_reruns_through_computed() {
        let base = Signal::new(1);
        let seen = counter();

        let base_clone = base.clone();
        let squared = Computed::new(move || base_clone.get() * base_clone.get());

        let seen_clone = seen.clone();
        let squared_clone = squared.clone();
        let effect = Effect::new(move || seen_clone.set(squared_clone.get()));
        assert_eq!(seen.get(), 1);

        base.set(3);
        tick();
        assert_eq!(seen.get(), 9);
        effect.dispose();
    }

    #[test]
    fn dependencies_are_dynamic() {
        let flag = Signal::new(true);
        let a = Signal::new(1);
        let b = Signal::new(2);

        let (f, a2, b2) = (flag.clone(), a.clone(), b.clone());
        let pick = Computed::new(move || if f.get() { a2.get() } else { b2.get() });

        assert_eq!(pick.get(), 1);
        assert_eq!(a.subscriber_count(), 1);
        assert_eq!(b.subscriber_count(), 0);

        flag.set(false);
        assert_eq!(pick.get(), 2);
        assert_eq!(a.subscriber_count(), 0);
        assert_eq!(b.subscriber_count(), 1);
    }

    #[test]
    fn computed_clone_shares_state() {
        let computed1 = Computed::new(|| 42);
        assert_eq!(computed1.get(), 42);

        let computed2 = computed1.clone();
        assert_eq!(computed1.id(), computed2.id());
        assert!(computed2.has_value());

        computed1.mark_dirty();
        assert_eq!(computed2.state(), ComputedState::Dirty);
    }
}
