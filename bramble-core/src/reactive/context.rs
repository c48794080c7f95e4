//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a signal is read,
//! we can register the current computation as a dependent.
//!
//! # Implementation
//!
//! We use a thread-local stack to track the currently executing computation.
//! When entering a reactive context (e.g., running a computed or effect), we
//! push the subscriber onto the stack. When the computation completes, we pop
//! it. This is the one piece of ambient state the reactive system needs.
//!
//! An untracked entry (no subscriber) suspends recording: reads made while
//! it is on top of the stack are not attributed to anyone, and the
//! computation underneath resumes recording once it is popped.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use super::runtime::{Reactive, Source};
use super::SubscriberId;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = RefCell::new(Vec::new());
}

/// An entry in the reactive context stack.
struct ContextEntry {
    /// The computation being tracked, or `None` for an untracked section.
    observer: Option<(SubscriberId, Weak<dyn Reactive>)>,
    /// Sources read during this computation, deduplicated by source ID.
    dependencies: IndexMap<u64, Rc<dyn Source>>,
}

/// Guard that pops the context when dropped.
///
/// This ensures the context stack is properly maintained even if
/// the computation panics.
pub struct ReactiveContext {
    subscriber_id: Option<SubscriberId>,
}

impl ReactiveContext {
    /// Enter a new reactive context for the given subscriber.
    ///
    /// While this context is active, any signals that are read will
    /// register the subscriber as a dependent.
    pub fn enter(subscriber_id: SubscriberId, observer: Weak<dyn Reactive>) -> Self {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(ContextEntry {
                observer: Some((subscriber_id, observer)),
                dependencies: IndexMap::new(),
            });
        });

        Self {
            subscriber_id: Some(subscriber_id),
        }
    }

    /// Suspend dependency recording until the guard is dropped.
    pub fn untracked() -> Self {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(ContextEntry {
                observer: None,
                dependencies: IndexMap::new(),
            });
        });

        Self {
            subscriber_id: None,
        }
    }

    /// Check if reads are currently being recorded.
    pub fn is_active() -> bool {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .is_some_and(|entry| entry.observer.is_some())
        })
    }

    /// Get the current subscriber ID, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .and_then(|entry| entry.observer.as_ref().map(|(id, _)| *id))
        })
    }

    /// Record a read of `source` by the current computation.
    ///
    /// Returns the observer the source should subscribe, or `None` when
    /// nothing is tracking or the source was already read during this run.
    pub fn track(source: Rc<dyn Source>) -> Option<(SubscriberId, Weak<dyn Reactive>)> {
        CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            let entry = stack.last_mut()?;
            let observer = entry.observer.clone()?;
            let id = source.source_id();
            if entry.dependencies.contains_key(&id) {
                return None;
            }
            entry.dependencies.insert(id, source);
            Some(observer)
        })
    }

    /// Number of distinct sources read so far in the current context.
    pub fn dependency_count() -> usize {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .map(|entry| entry.dependencies.len())
                .unwrap_or_default()
        })
    }

    /// Take the sources collected by this context, in read order.
    pub fn take_dependencies(&self) -> Vec<Rc<dyn Source>> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow_mut()
                .last_mut()
                .map(|entry| std::mem::take(&mut entry.dependencies).into_values().collect())
                .unwrap_or_default()
        })
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        let popped = CONTEXT_STACK.with(|stack| stack.borrow_mut().pop());

        // Verify we're popping the right context.
        // This helps catch bugs where contexts are mismatched.
        if let Some(entry) = popped {
            debug_assert_eq!(
                entry.observer.as_ref().map(|(id, _)| *id),
                self.subscriber_id,
                "ReactiveContext mismatch"
            );
        }
    }
}
