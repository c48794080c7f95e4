//! DOM events.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use super::node::Node;

struct EventData {
    kind: String,
    key: Option<String>,
    target: RefCell<Option<Node>>,
    current_target: RefCell<Option<Node>>,
    propagation_stopped: Cell<bool>,
    default_prevented: Cell<bool>,
}

/// An event being dispatched. Cloning shares the same event.
#[derive(Clone)]
pub struct Event(Rc<EventData>);

impl Event {
    pub fn new(kind: &str) -> Self {
        Self::build(kind, None)
    }

    /// A keyboard event carrying `key`, e.g. `"Enter"` or `"a"`.
    pub fn keyboard(kind: &str, key: &str) -> Self {
        Self::build(kind, Some(key.to_string()))
    }

    fn build(kind: &str, key: Option<String>) -> Self {
        Event(Rc::new(EventData {
            kind: kind.to_string(),
            key,
            target: RefCell::new(None),
            current_target: RefCell::new(None),
            propagation_stopped: Cell::new(false),
            default_prevented: Cell::new(false),
        }))
    }

    pub fn kind(&self) -> &str {
        &self.0.kind
    }

    pub fn key(&self) -> Option<&str> {
        self.0.key.as_deref()
    }

    /// The node the event was dispatched at.
    pub fn target(&self) -> Option<Node> {
        self.0.target.borrow().clone()
    }

    /// The node whose listeners are currently running.
    pub fn current_target(&self) -> Option<Node> {
        self.0.current_target.borrow().clone()
    }

    pub(crate) fn set_target(&self, node: &Node) {
        *self.0.target.borrow_mut() = Some(node.clone());
    }

    pub(crate) fn set_current_target(&self, node: &Node) {
        *self.0.current_target.borrow_mut() = Some(node.clone());
    }

    pub fn stop_propagation(&self) {
        self.0.propagation_stopped.set(true);
    }

    pub fn propagation_stopped(&self) -> bool {
        self.0.propagation_stopped.get()
    }

    pub fn prevent_default(&self) {
        self.0.default_prevented.set(true);
    }

    pub fn default_prevented(&self) -> bool {
        self.0.default_prevented.get()
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("kind", &self.0.kind)
            .field("key", &self.0.key)
            .field("default_prevented", &self.default_prevented())
            .finish()
    }
}
