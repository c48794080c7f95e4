//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, computeds, and
//! effects. These primitives form the foundation of Bramble's fine-grained
//! reactivity; the store and the directive runtime are built on them.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a tracking context (such as a computed or effect), the signal
//! automatically registers that context as a dependent. When the signal's
//! value changes, all dependents are notified.
//!
//! ## Computeds
//!
//! A Computed is a derived value that caches its result. It is marked stale
//! when one of its dependencies changes and re-evaluates on the next read.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change. Effects are used to synchronize reactive state with
//! external systems, such as updating the DOM.
//!
//! # Scheduling
//!
//! Writes never run effects synchronously. Dirty effects are queued and
//! flushed by a microtask; [`tick`] drains the microtask queue and
//! [`batch`] flushes synchronously when its outermost call returns.
//!
//! # Implementation Notes
//!
//! The reactive system uses a thread-local tracking context to automatically
//! detect dependencies. When a signal is read, we check if there is an active
//! tracking context and, if so, register the dependency.
//!
//! This approach (sometimes called "automatic dependency tracking" or
//! "transparent reactivity") is used by SolidJS, Vue 3, and Leptos.

mod computed;
mod context;
mod effect;
mod runtime;
mod signal;
mod subscriber;

pub use computed::{Computed, ComputedState};
pub use context::ReactiveContext;
pub use effect::{Disposer, Effect};
pub use runtime::{
    batch, has_pending_microtasks, queue_microtask, tick, untracked, Reactive, Runtime, Source,
};
pub use signal::Signal;
pub use subscriber::{SubscriberId, SubscriberSet};

/// Create a signal holding `initial`.
pub fn signal<T: Clone + PartialEq + 'static>(initial: T) -> Signal<T> {
    Signal::new(initial)
}

/// Create a lazily evaluated computed value.
pub fn computed<T: Clone + 'static>(compute: impl Fn() -> T + 'static) -> Computed<T> {
    Computed::new(compute)
}

/// Run `f` now and again whenever what it read changes.
pub fn effect(f: impl FnMut() + 'static) -> Effect {
    Effect::new(f)
}
