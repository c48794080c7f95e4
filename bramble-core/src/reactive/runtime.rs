//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, computeds
//! and effects. It owns the queue of dirty reactions, the microtask queue
//! that stands in for the host event loop, and the registry that keeps live
//! effects alive until they are disposed.
//!
//! # How It Works
//!
//! 1. When a signal is written, its subscribers are notified. Computeds mark
//!    themselves stale and forward the notification; effects enqueue
//!    themselves here.
//!
//! 2. Outside of a batch, the first enqueue schedules a flush microtask.
//!    Further writes in the same tick only add to the queue, so any number
//!    of writes produce one run per affected effect.
//!
//! 3. Inside a batch nothing is scheduled; the outermost batch flushes
//!    synchronously when it returns.
//!
//! 4. A flush runs reactions in the order they were dirtied. A reaction that
//!    is dirtied again after it already ran in the current flush is deferred
//!    to a follow-up flush, so no reaction runs twice per flush.
//!
//! # Threading
//!
//! Everything here is thread-local. The reactive graph is built from `Rc`
//! and `RefCell` and never crosses threads.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::trace;

use super::context::ReactiveContext;
use super::subscriber::SubscriberId;

/// A computation that can be notified when its dependencies change.
pub trait Reactive {
    /// Get the subscriber ID for this reactive value.
    fn subscriber_id(&self) -> SubscriberId;

    /// One of the dependencies changed.
    ///
    /// Computeds mark themselves stale, effects enqueue themselves.
    fn notify(&self);

    /// Re-execute the computation. Only effects are ever queued, so the
    /// default does nothing.
    fn run(&self) {}
}

/// A value that reactions can depend on.
pub trait Source {
    /// Unique ID of the source, used to deduplicate reads within one run.
    fn source_id(&self) -> u64;

    /// Stop notifying the given subscriber.
    fn unsubscribe(&self, subscriber: SubscriberId);
}

type Task = Box<dyn FnOnce()>;

#[derive(Default)]
struct Scheduler {
    /// Dirty reactions waiting for the next flush, in dirty order.
    pending: IndexMap<SubscriberId, Rc<dyn Reactive>>,
    /// Reactions dirtied again after already running in this flush.
    deferred: IndexMap<SubscriberId, Rc<dyn Reactive>>,
    /// Reactions that already ran in the current flush.
    ran: HashSet<SubscriberId>,
    batch_depth: usize,
    flushing: bool,
    flush_scheduled: bool,
}

thread_local! {
    static SCHEDULER: RefCell<Scheduler> = RefCell::new(Scheduler::default());
    static MICROTASKS: RefCell<VecDeque<Task>> = RefCell::new(VecDeque::new());
    static REGISTRY: RefCell<HashMap<SubscriberId, Rc<dyn Reactive>>> =
        RefCell::new(HashMap::new());
}

/// The thread-local reactive runtime.
pub struct Runtime;

impl Runtime {
    /// Keep a reaction alive until [`Runtime::unregister`] is called.
    pub fn register(reactive: Rc<dyn Reactive>) {
        let id = reactive.subscriber_id();
        REGISTRY.with(|registry| {
            registry.borrow_mut().insert(id, reactive);
        });
    }

    /// Drop the runtime's reference to a reaction and cancel any pending run.
    pub fn unregister(id: SubscriberId) {
        let removed = REGISTRY.with(|registry| registry.borrow_mut().remove(&id));
        Self::dequeue(id);
        // Released outside the registry borrow: dropping the effect may
        // drop captured values whose destructors touch the runtime.
        drop(removed);
    }

    /// Number of reactions currently kept alive by the runtime.
    pub fn registered_count() -> usize {
        REGISTRY.with(|registry| registry.borrow().len())
    }

    /// Mark a reaction dirty.
    pub fn enqueue(reactive: Rc<dyn Reactive>) {
        let id = reactive.subscriber_id();
        let schedule = SCHEDULER.with(|scheduler| {
            let mut s = scheduler.borrow_mut();
            if s.flushing && s.ran.contains(&id) {
                s.deferred.entry(id).or_insert(reactive);
                return false;
            }
            s.pending.entry(id).or_insert(reactive);
            let schedule = s.batch_depth == 0 && !s.flushing && !s.flush_scheduled;
            if schedule {
                s.flush_scheduled = true;
            }
            schedule
        });

        if schedule {
            queue_microtask(Self::scheduled_flush);
        }
    }

    /// Remove a reaction from the queue without running it.
    pub fn dequeue(id: SubscriberId) {
        SCHEDULER.with(|scheduler| {
            let mut s = scheduler.borrow_mut();
            s.pending.shift_remove(&id);
            s.deferred.shift_remove(&id);
        });
    }

    /// Number of reactions waiting for a flush.
    pub fn pending_count() -> usize {
        SCHEDULER.with(|scheduler| {
            let s = scheduler.borrow();
            s.pending.len() + s.deferred.len()
        })
    }

    fn scheduled_flush() {
        SCHEDULER.with(|scheduler| scheduler.borrow_mut().flush_scheduled = false);
        Self::flush();
    }

    /// Run every pending reaction.
    ///
    /// Re-entrant calls (a batch closing inside a running effect) return
    /// immediately; the outer flush picks up whatever they enqueued.
    pub fn flush() {
        let entered = SCHEDULER.with(|scheduler| {
            let mut s = scheduler.borrow_mut();
            if s.flushing {
                return false;
            }
            s.flushing = true;
            s.ran.clear();
            true
        });
        if !entered {
            return;
        }

        let _guard = FlushGuard;
        let mut count = 0usize;
        loop {
            let next = SCHEDULER.with(|scheduler| {
                let mut s = scheduler.borrow_mut();
                let next = s.pending.shift_remove_index(0);
                if let Some((id, _)) = &next {
                    s.ran.insert(*id);
                }
                next
            });

            match next {
                Some((_, reactive)) => {
                    reactive.run();
                    count += 1;
                }
                None => break,
            }
        }

        if count > 0 {
            trace!(reactions = count, "flushed");
        }
    }

    /// Whether a reaction is currently being tracked.
    pub fn is_tracking() -> bool {
        ReactiveContext::is_active()
    }
}

/// Resets the flush state, even if a reaction panicked, and moves deferred
/// reactions into a follow-up flush.
struct FlushGuard;

impl Drop for FlushGuard {
    fn drop(&mut self) {
        let schedule = SCHEDULER.with(|scheduler| {
            let mut s = scheduler.borrow_mut();
            s.flushing = false;
            s.ran.clear();
            let deferred = std::mem::take(&mut s.deferred);
            for (id, reactive) in deferred {
                s.pending.entry(id).or_insert(reactive);
            }
            let schedule = !s.pending.is_empty() && !s.flush_scheduled;
            if schedule {
                s.flush_scheduled = true;
            }
            schedule
        });

        if schedule {
            queue_microtask(Runtime::scheduled_flush);
        }
    }
}

struct BatchGuard;

impl BatchGuard {
    fn enter() -> Self {
        SCHEDULER.with(|scheduler| scheduler.borrow_mut().batch_depth += 1);
        BatchGuard
    }
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        // If the batch body panicked, nobody flushes synchronously; make
        // sure the pending reactions still get a microtask.
        let schedule = SCHEDULER.with(|scheduler| {
            let mut s = scheduler.borrow_mut();
            s.batch_depth -= 1;
            let schedule = s.batch_depth == 0
                && !s.flushing
                && !s.pending.is_empty()
                && !s.flush_scheduled;
            if schedule {
                s.flush_scheduled = true;
            }
            schedule
        });

        if schedule {
            queue_microtask(Runtime::scheduled_flush);
        }
    }
}

/// Defer reaction execution until `f` returns.
///
/// Nested batches coalesce into the outermost one, which flushes
/// synchronously before returning.
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    let result = {
        let _guard = BatchGuard::enter();
        f()
    };

    let outermost = SCHEDULER.with(|scheduler| scheduler.borrow().batch_depth == 0);
    if outermost {
        Runtime::flush();
    }
    result
}

/// Run `f` without recording dependencies for the current reaction.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _ctx = ReactiveContext::untracked();
    f()
}

/// Queue a task for the next [`tick`].
pub fn queue_microtask(task: impl FnOnce() + 'static) {
    MICROTASKS.with(|queue| queue.borrow_mut().push_back(Box::new(task)));
}

/// Whether any microtask is waiting.
pub fn has_pending_microtasks() -> bool {
    MICROTASKS.with(|queue| !queue.borrow().is_empty())
}

/// Drain the microtask queue, including tasks queued while draining.
///
/// Returns the number of tasks that ran. Hosts call this once per event
/// loop turn.
pub fn tick() -> usize {
    let mut count = 0;
    loop {
        let task = MICROTASKS.with(|queue| queue.borrow_mut().pop_front());
        match task {
            Some(task) => {
                task();
                count += 1;
            }
            None => break,
        }
    }
    count
}
