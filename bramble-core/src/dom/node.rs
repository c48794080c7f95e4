//! Node Implementation
//!
//! A minimal live document tree: elements and text nodes, ordered
//! attributes, parent links, form properties and event listeners.
//!
//! # Ownership
//!
//! Parents own their children; children hold a weak link back to the
//! parent. A detached subtree stays alive for as long as someone holds a
//! handle to its root, which is how directives keep templates and
//! currently-unmounted branches around.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::event::Event;

/// Unique identifier for a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Handle returned by [`Node::add_event_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NodeKind {
    Element(String),
    Text,
}

struct Listener {
    id: ListenerId,
    event: String,
    callback: Rc<dyn Fn(&Event)>,
    once: bool,
}

struct NodeData {
    id: NodeId,
    kind: NodeKind,
    text: RefCell<String>,
    attributes: RefCell<IndexMap<String, String>>,
    children: RefCell<Vec<Node>>,
    parent: RefCell<Weak<NodeData>>,
    listeners: RefCell<Vec<Listener>>,
    value: RefCell<Option<String>>,
    checked: Cell<Option<bool>>,
}

/// A node in the live tree. Cloning the handle does not clone the node;
/// equality is identity.
#[derive(Clone)]
pub struct Node(Rc<NodeData>);

impl Node {
    fn with_kind(kind: NodeKind, text: String) -> Self {
        Node(Rc::new(NodeData {
            id: NodeId::new(),
            kind,
            text: RefCell::new(text),
            attributes: RefCell::new(IndexMap::new()),
            children: RefCell::new(Vec::new()),
            parent: RefCell::new(Weak::new()),
            listeners: RefCell::new(Vec::new()),
            value: RefCell::new(None),
            checked: Cell::new(None),
        }))
    }

    /// Create an element. Tag names are lowercased.
    pub fn element(tag: &str) -> Self {
        Self::with_kind(NodeKind::Element(tag.to_ascii_lowercase()), String::new())
    }

    pub fn text(data: &str) -> Self {
        Self::with_kind(NodeKind::Text, data.to_string())
    }

    pub fn id(&self) -> NodeId {
        self.0.id
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    pub fn is_element(&self) -> bool {
        matches!(self.0.kind, NodeKind::Element(_))
    }

    pub fn is_text(&self) -> bool {
        self.0.kind == NodeKind::Text
    }

    /// Tag name of an element, `None` for text nodes.
    pub fn tag(&self) -> Option<&str> {
        match &self.0.kind {
            NodeKind::Element(tag) => Some(tag),
            NodeKind::Text => None,
        }
    }

    // ------------------------------------------------------------------
    // Attributes
    // ------------------------------------------------------------------

    pub fn attribute(&self, name: &str) -> Option<String> {
        self.0.attributes.borrow().get(name).cloned()
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.0.attributes.borrow().contains_key(name)
    }

    /// Set an attribute. An existing attribute keeps its position.
    pub fn set_attribute(&self, name: &str, value: &str) {
        let mut attributes = self.0.attributes.borrow_mut();
        match attributes.get_mut(name) {
            Some(existing) => {
                if existing != value {
                    *existing = value.to_string();
                }
            }
            None => {
                attributes.insert(name.to_string(), value.to_string());
            }
        }
    }

    pub fn remove_attribute(&self, name: &str) -> Option<String> {
        self.0.attributes.borrow_mut().shift_remove(name)
    }

    /// Attributes in document order.
    pub fn attributes(&self) -> Vec<(String, String)> {
        self.0
            .attributes
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    // ------------------------------------------------------------------
    // Tree
    // ------------------------------------------------------------------

    pub fn parent(&self) -> Option<Node> {
        self.0.parent.borrow().upgrade().map(Node)
    }

    pub fn children(&self) -> Vec<Node> {
        self.0.children.borrow().clone()
    }

    pub fn child_elements(&self) -> Vec<Node> {
        self.0
            .children
            .borrow()
            .iter()
            .filter(|c| c.is_element())
            .cloned()
            .collect()
    }

    pub fn first_child(&self) -> Option<Node> {
        self.0.children.borrow().first().cloned()
    }

    fn index_in_parent(&self) -> Option<(Node, usize)> {
        let parent = self.parent()?;
        let index = parent
            .0
            .children
            .borrow()
            .iter()
            .position(|c| c == self)?;
        Some((parent, index))
    }

    pub fn next_sibling(&self) -> Option<Node> {
        let (parent, index) = self.index_in_parent()?;
        let children = parent.0.children.borrow();
        children.get(index + 1).cloned()
    }

    pub fn previous_sibling(&self) -> Option<Node> {
        let (parent, index) = self.index_in_parent()?;
        let children = parent.0.children.borrow();
        index.checked_sub(1).and_then(|i| children.get(i).cloned())
    }

    pub fn next_element_sibling(&self) -> Option<Node> {
        let (parent, index) = self.index_in_parent()?;
        let children = parent.0.children.borrow();
        children[index + 1..].iter().find(|c| c.is_element()).cloned()
    }

    /// Whether `other` is this node or one of its descendants.
    pub fn contains(&self, other: &Node) -> bool {
        let mut current = Some(other.clone());
        while let Some(node) = current {
            if &node == self {
                return true;
            }
            current = node.parent();
        }
        false
    }

    /// Append `child`, moving it out of its current parent.
    pub fn append_child(&self, child: &Node) {
        self.insert_before(child, None);
    }

    /// Insert `child` before `reference`, or at the end when `reference` is
    /// `None` or not a child of this node.
    pub fn insert_before(&self, child: &Node, reference: Option<&Node>) {
        if reference == Some(child) || child.contains(self) {
            return;
        }
        child.remove();

        let mut children = self.0.children.borrow_mut();
        let index = reference
            .and_then(|r| children.iter().position(|c| c == r))
            .unwrap_or(children.len());
        children.insert(index, child.clone());
        *child.0.parent.borrow_mut() = Rc::downgrade(&self.0);
    }

    /// Detach from the parent. A detached node is left as is.
    pub fn remove(&self) {
        if let Some((parent, index)) = self.index_in_parent() {
            parent.0.children.borrow_mut().remove(index);
        }
        *self.0.parent.borrow_mut() = Weak::new();
    }

    /// Put `replacement` where this node is and detach this node.
    pub fn replace_with(&self, replacement: &Node) {
        if replacement == self {
            return;
        }
        let Some(parent) = self.parent() else {
            return;
        };
        parent.insert_before(replacement, Some(self));
        self.remove();
    }

    /// Remove every child.
    pub fn clear_children(&self) {
        let children = std::mem::take(&mut *self.0.children.borrow_mut());
        for child in children {
            *child.0.parent.borrow_mut() = Weak::new();
        }
    }

    /// Copy this node: kind, attributes, text and (when `deep`) children.
    /// Listeners and form properties are not copied.
    pub fn clone_node(&self, deep: bool) -> Node {
        let copy = Node::with_kind(self.0.kind.clone(), self.0.text.borrow().clone());
        *copy.0.attributes.borrow_mut() = self.0.attributes.borrow().clone();
        if deep {
            for child in self.children() {
                copy.append_child(&child.clone_node(true));
            }
        }
        copy
    }

    /// This node and all its descendants, pre-order.
    pub fn descendants(&self) -> Vec<Node> {
        let mut out = Vec::new();
        let mut stack: SmallVec<[Node; 16]> = SmallVec::new();
        stack.push(self.clone());
        while let Some(node) = stack.pop() {
            for child in node.0.children.borrow().iter().rev() {
                stack.push(child.clone());
            }
            out.push(node);
        }
        out
    }

    // ------------------------------------------------------------------
    // Text
    // ------------------------------------------------------------------

    /// Character data of a text node, concatenated descendant text for an
    /// element.
    pub fn text_content(&self) -> String {
        match self.0.kind {
            NodeKind::Text => self.0.text.borrow().clone(),
            NodeKind::Element(_) => self
                .children()
                .iter()
                .map(Node::text_content)
                .collect(),
        }
    }

    /// Replace the content with a single text node (or set the data of a
    /// text node).
    pub fn set_text_content(&self, text: &str) {
        match self.0.kind {
            NodeKind::Text => *self.0.text.borrow_mut() = text.to_string(),
            NodeKind::Element(_) => {
                self.clear_children();
                if !text.is_empty() {
                    self.append_child(&Node::text(text));
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Class and style
    // ------------------------------------------------------------------

    pub fn class_list(&self) -> Vec<String> {
        self.attribute("class")
            .map(|c| c.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.class_list().iter().any(|c| c == class)
    }

    pub fn add_class(&self, class: &str) {
        let mut classes = self.class_list();
        if !classes.iter().any(|c| c == class) {
            classes.push(class.to_string());
            self.set_attribute("class", &classes.join(" "));
        }
    }

    pub fn remove_class(&self, class: &str) {
        let classes = self.class_list();
        if classes.iter().any(|c| c == class) {
            let rest: Vec<String> = classes.into_iter().filter(|c| c != class).collect();
            self.set_attribute("class", &rest.join(" "));
        }
    }

    /// Inline style declarations, in order.
    pub fn style(&self) -> Vec<(String, String)> {
        self.attribute("style")
            .map(|style| {
                style
                    .split(';')
                    .filter_map(|decl| {
                        let (name, value) = decl.split_once(':')?;
                        let name = name.trim();
                        (!name.is_empty()).then(|| (name.to_string(), value.trim().to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn style_property(&self, name: &str) -> Option<String> {
        self.style()
            .into_iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Set one inline style property. An empty value removes it.
    pub fn set_style_property(&self, name: &str, value: &str) {
        let mut declarations = self.style();
        match declarations.iter().position(|(n, _)| n == name) {
            Some(i) if value.is_empty() => {
                declarations.remove(i);
            }
            Some(i) => declarations[i].1 = value.to_string(),
            None if value.is_empty() => return,
            None => declarations.push((name.to_string(), value.to_string())),
        }
        let style: Vec<String> = declarations
            .iter()
            .map(|(n, v)| format!("{n}: {v}"))
            .collect();
        self.set_attribute("style", &style.join("; "));
    }

    // ------------------------------------------------------------------
    // Form properties
    // ------------------------------------------------------------------

    /// The `type` of an input, lowercased; `text` when absent.
    pub fn input_type(&self) -> String {
        self.attribute("type")
            .map(|t| t.to_ascii_lowercase())
            .unwrap_or_else(|| "text".to_string())
    }

    /// Current value: the property when set, otherwise the attribute.
    pub fn value(&self) -> String {
        self.0
            .value
            .borrow()
            .clone()
            .or_else(|| self.attribute("value"))
            .unwrap_or_default()
    }

    pub fn set_value(&self, value: &str) {
        *self.0.value.borrow_mut() = Some(value.to_string());
    }

    /// Checkedness: the property when set, otherwise the attribute.
    pub fn checked(&self) -> bool {
        self.0
            .checked
            .get()
            .unwrap_or_else(|| self.has_attribute("checked"))
    }

    pub fn set_checked(&self, checked: bool) {
        self.0.checked.set(Some(checked));
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    pub fn add_event_listener(
        &self,
        event: &str,
        callback: impl Fn(&Event) + 'static,
        once: bool,
    ) -> ListenerId {
        let id = ListenerId::new();
        self.0.listeners.borrow_mut().push(Listener {
            id,
            event: event.to_string(),
            callback: Rc::new(callback),
            once,
        });
        id
    }

    pub fn remove_event_listener(&self, id: ListenerId) {
        self.0.listeners.borrow_mut().retain(|l| l.id != id);
    }

    pub fn listener_count(&self) -> usize {
        self.0.listeners.borrow().len()
    }

    /// Dispatch `event` at this node, bubbling to the ancestors.
    ///
    /// Returns `false` when a listener called `prevent_default`.
    pub fn dispatch_event(&self, event: &Event) -> bool {
        event.set_target(self);

        let mut path = vec![self.clone()];
        let mut current = self.parent();
        while let Some(node) = current {
            current = node.parent();
            path.push(node);
        }

        for node in path {
            event.set_current_target(&node);
            let matching: Vec<(ListenerId, Rc<dyn Fn(&Event)>, bool)> = node
                .0
                .listeners
                .borrow()
                .iter()
                .filter(|l| l.event == event.kind())
                .map(|l| (l.id, l.callback.clone(), l.once))
                .collect();

            for (id, callback, once) in matching {
                if once {
                    node.remove_event_listener(id);
                }
                callback(event);
            }

            if event.propagation_stopped() {
                break;
            }
        }

        !event.default_prevented()
    }

    /// Short description used in diagnostics, e.g. `<li class="x">`.
    pub fn describe(&self) -> String {
        match &self.0.kind {
            NodeKind::Text => format!("#text {:?}", self.0.text.borrow()),
            NodeKind::Element(tag) => {
                let mut out = format!("<{tag}");
                for (name, value) in self.0.attributes.borrow().iter() {
                    out.push_str(&format!(" {name}=\"{value}\""));
                }
                out.push('>');
                out
            }
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Node {}

impl std::hash::Hash for Node {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}
