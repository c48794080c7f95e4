//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies.
//!
//! 2. When any dependency changes, the effect is queued on the runtime and
//!    re-runs on the next flush.
//!
//! 3. Before re-running, the effect unsubscribes from its old dependencies
//!    and tracks new ones during execution, so branches not taken this run
//!    stop triggering it.
//!
//! # Use Cases
//!
//! Effects are used to synchronize reactive state with the outside world:
//!
//! - Updating the DOM when state changes
//! - Logging state changes
//!
//! # Differences from Computed
//!
//! - Computeds return a value; effects do not.
//! - Computeds are lazy (compute on access); effects are eager (run when deps change).
//! - Computeds cache results; effects just run their side effect.
//!
//! # Lifetime
//!
//! The runtime keeps every effect alive until it is disposed. Dropping the
//! last `Effect` handle does not stop it.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tracing::trace;

use super::context::ReactiveContext;
use super::runtime::{Reactive, Runtime, Source};
use super::subscriber::SubscriberId;

/// A one-shot cleanup callback, as stored by binding tables.
pub type Disposer = Box<dyn FnOnce()>;

struct EffectInner {
    subscriber_id: SubscriberId,
    run: RefCell<Box<dyn FnMut()>>,
    dependencies: RefCell<Vec<Rc<dyn Source>>>,
    disposed: Cell<bool>,
    run_count: Cell<usize>,
    this: Weak<EffectInner>,
}

impl EffectInner {
    fn execute(&self) {
        if self.disposed.get() {
            return;
        }

        // A run that is already in progress further up the stack owns the
        // closure; the write that re-triggered us has queued another run.
        let Ok(mut run) = self.run.try_borrow_mut() else {
            return;
        };

        let stale = std::mem::take(&mut *self.dependencies.borrow_mut());
        for source in stale {
            source.unsubscribe(self.subscriber_id);
        }

        let observer: Weak<dyn Reactive> = self.this.clone();
        let ctx = ReactiveContext::enter(self.subscriber_id, observer);
        (*run)();
        let dependencies = ctx.take_dependencies();
        drop(ctx);
        drop(run);

        self.run_count.set(self.run_count.get() + 1);
        trace!(
            effect = ?self.subscriber_id,
            dependencies = dependencies.len(),
            "effect ran"
        );

        if self.disposed.get() {
            // Disposed by its own body: release what it subscribed to and
            // the captures the dispose call could not drop.
            for source in dependencies {
                source.unsubscribe(self.subscriber_id);
            }
            self.release_closure();
        } else {
            *self.dependencies.borrow_mut() = dependencies;
        }
    }

    fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }

        let dependencies = std::mem::take(&mut *self.dependencies.borrow_mut());
        for source in dependencies {
            source.unsubscribe(self.subscriber_id);
        }
        self.release_closure();
        Runtime::unregister(self.subscriber_id);
    }

    fn release_closure(&self) {
        let released = match self.run.try_borrow_mut() {
            Ok(mut run) => Some(std::mem::replace(&mut *run, Box::new(|| {}))),
            Err(_) => None,
        };
        drop(released);
    }
}

impl Reactive for EffectInner {
    fn subscriber_id(&self) -> SubscriberId {
        self.subscriber_id
    }

    fn notify(&self) {
        if self.disposed.get() {
            return;
        }
        if let Some(this) = self.this.upgrade() {
            Runtime::enqueue(this);
        }
    }

    fn run(&self) {
        self.execute();
    }
}

/// A side-effecting computation that runs when dependencies change.
///
/// # Example
///
/// ```rust
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use bramble_core::reactive::{tick, Effect, Signal};
///
/// let count = Signal::new(0);
/// let seen = Rc::new(Cell::new(-1));
///
/// let (c, s) = (count.clone(), seen.clone());
/// let effect = Effect::new(move || s.set(c.get()));
/// assert_eq!(seen.get(), 0);
///
/// count.set(5);
/// tick();
/// assert_eq!(seen.get(), 5);
/// effect.dispose();
/// ```
pub struct Effect {
    inner: Rc<EffectInner>,
}

impl Effect {
    /// Create a new effect with the given function.
    ///
    /// The function runs immediately to establish initial dependencies.
    pub fn new(run: impl FnMut() + 'static) -> Self {
        let effect = Self::new_lazy(run);
        effect.execute();
        effect
    }

    /// Create a new effect without running it immediately.
    ///
    /// It subscribes to nothing until [`Effect::execute`] is called.
    pub fn new_lazy(run: impl FnMut() + 'static) -> Self {
        let inner = Rc::new_cyclic(|this| EffectInner {
            subscriber_id: SubscriberId::new(),
            run: RefCell::new(Box::new(run)),
            dependencies: RefCell::new(Vec::new()),
            disposed: Cell::new(false),
            run_count: Cell::new(0),
            this: this.clone(),
        });
        Runtime::register(inner.clone());
        Self { inner }
    }

    /// Get the subscriber ID for this effect.
    pub fn subscriber_id(&self) -> SubscriberId {
        self.inner.subscriber_id
    }

    /// Execute the effect function now.
    ///
    /// This runs the function within a reactive context to track dependencies.
    pub fn execute(&self) {
        self.inner.execute();
    }

    /// Dispose of the effect.
    ///
    /// Unsubscribes from every current dependency, cancels a queued run and
    /// drops the closure. Disposing twice is a no-op.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    /// A boxed callback that disposes this effect.
    pub fn disposer(&self) -> Disposer {
        let inner = self.inner.clone();
        Box::new(move || inner.dispose())
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.get()
    }

    /// Get the number of dependencies.
    pub fn dependency_count(&self) -> usize {
        self.inner.dependencies.borrow().len()
    }
}

impl Clone for Effect {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.subscriber_id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{batch, tick, Signal};

    fn counter() -> Rc<Cell<i32>> {
        Rc::new(Cell::new(0))
    }

    #[test]
    fn effect_runs_on_creation() {
        let run_count = counter();
        let run_count_clone = run_count.clone();

        let effect = Effect::new(move || {
            run_count_clone.set(run_count_clone.get() + 1);
        });

        // Effect should have run once on creation
        assert_eq!(run_count.get(), 1);
        effect.dispose();
    }

    #[test]
    fn effect_lazy_does_not_run_on_creation() {
        let run_count = counter();
        let run_count_clone = run_count.clone();

        let effect = Effect::new_lazy(move || {
            run_count_clone.set(run_count_clone.get() + 1);
        });

        assert_eq!(run_count.get(), 0);
        assert_eq!(effect.run_count(), 0);

        // Manually execute
        effect.execute();
        assert_eq!(run_count.get(), 1);
        assert_eq!(effect.run_count(), 1);
        effect.dispose();
    }

    #[test]
    fn effect_reruns_after_tick() {
        let signal = Signal::new(1);
        let run_count = counter();

        let (s, r) = (signal.clone(), run_count.clone());
        let effect = Effect::new(move || {
            s.get();
            r.set(r.get() + 1);
        });

        signal.set(2);
        signal.set(3);
        // Nothing runs synchronously on write.
        assert_eq!(run_count.get(), 1);

        tick();
        assert_eq!(run_count.get(), 2);
        effect.dispose();
    }

    #[test]
    fn effect_does_not_run_after_disposal() {
        let signal = Signal::new(0);
        let run_count = counter();

        let (s, r) = (signal.clone(), run_count.clone());
        let effect = Effect::new(move || {
            s.get();
            r.set(r.get() + 1);
        });
        assert_eq!(signal.subscriber_count(), 1);

        effect.dispose();
        assert!(effect.is_disposed());
        assert_eq!(signal.subscriber_count(), 0);

        signal.set(1);
        tick();
        effect.execute();
        assert_eq!(run_count.get(), 1);
    }

    #[test]
    fn dispose_cancels_queued_run() {
        let signal = Signal::new(0);
        let run_count = counter();

        let (s, r) = (signal.clone(), run_count.clone());
        let effect = Effect::new(move || {
            s.get();
            r.set(r.get() + 1);
        });

        signal.set(1);
        effect.dispose();
        tick();
        assert_eq!(run_count.get(), 1);
    }

    #[test]
    fn dispose_drops_captures() {
        let payload = Rc::new(());
        let held = payload.clone();

        let effect = Effect::new(move || {
            let _ = &held;
        });
        assert_eq!(Rc::strong_count(&payload), 2);

        effect.dispose();
        assert_eq!(Rc::strong_count(&payload), 1);
    }

    #[test]
    fn stale_dependencies_are_dropped() {
        let flag = Signal::new(true);
        let a = Signal::new(0);
        let b = Signal::new(0);
        let run_count = counter();

        let (f, a2, b2, r) = (flag.clone(), a.clone(), b.clone(), run_count.clone());
        let effect = Effect::new(move || {
            r.set(r.get() + 1);
            if f.get() {
                a2.get();
            } else {
                b2.get();
            }
        });
        assert_eq!(effect.dependency_count(), 2);

        flag.set(false);
        tick();
        assert_eq!(run_count.get(), 2);

        // `a` is no longer read, writing it must not re-run the effect.
        a.set(1);
        tick();
        assert_eq!(run_count.get(), 2);

        b.set(1);
        tick();
        assert_eq!(run_count.get(), 3);
        effect.dispose();
    }

    #[test]
    fn nested_effect_attributes_reads_to_the_inner_run() {
        let outer_sig = Signal::new(0);
        let inner_sig = Signal::new(0);
        let outer_runs = counter();

        let inner_handle: Rc<RefCell<Option<Effect>>> = Rc::new(RefCell::new(None));
        let (o, i, r, slot) = (
            outer_sig.clone(),
            inner_sig.clone(),
            outer_runs.clone(),
            inner_handle.clone(),
        );
        let outer = Effect::new(move || {
            r.set(r.get() + 1);
            o.get();
            if slot.borrow().is_none() {
                let i = i.clone();
                *slot.borrow_mut() = Some(Effect::new(move || {
                    i.get();
                }));
            }
        });

        assert_eq!(outer.dependency_count(), 1);
        inner_sig.set(1);
        tick();
        assert_eq!(outer_runs.get(), 1);

        outer.dispose();
        if let Some(inner) = inner_handle.borrow_mut().take() {
            inner.dispose();
        };
    }

    #[test]
    fn batch_coalesces_writes() {
        let a = Signal::new(0);
        let b = Signal::new(0);
        let run_count = counter();

        let (a2, b2, r) = (a.clone(), b.clone(), run_count.clone());
        let effect = Effect::new(move || {
            a2.get();
            b2.get();
            r.set(r.get() + 1);
        });

        batch(|| {
            a.set(1);
            b.set(1);
            a.set(2);
        });
        assert_eq!(run_count.get(), 2);
        effect.dispose();
    }

    #[test]
    fn effect_clone_shares_state() {
        let effect1 = Effect::new(|| {});
        let effect2 = effect1.clone();

        assert_eq!(effect1.subscriber_id(), effect2.subscriber_id());
        assert_eq!(effect2.run_count(), 1);

        effect1.execute();
        assert_eq!(effect2.run_count(), 2);

        // Shared disposal state
        effect1.dispose();
        assert!(effect2.is_disposed());
    }
}
