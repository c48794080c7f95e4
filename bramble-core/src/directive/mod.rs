//! Directive Runtime
//!
//! Walks an element tree, finds attributes that start with the configured
//! prefix (`:` by default) and binds each one to a handler. Most handlers
//! create an [`Effect`](crate::reactive::Effect) that evaluates the
//! attribute's expression against the current scope and writes the result
//! into the DOM.
//!
//! # Dispatch
//!
//! Primary directives (`if`, `each`, `scope`, `ref`) run first, in attribute
//! order, and decide how the walk continues: `scope` swaps the scope used for
//! the rest of the element and its children, `if` and `each` take the element
//! over entirely and stop the walk there. Secondary directives (`text`,
//! `class`, `style`, `id`, `data`, `value`, `fx`, attribute and event
//! bindings) run afterwards and never affect descent.
//!
//! # Binding table
//!
//! Every binding is recorded under its element and attribute name together
//! with the disposer that undoes it. A walk skips attributes that are
//! already bound, so re-walking a subtree is safe, and
//! [`Directives::dispose_tree`] releases everything bound under a node.
//!
//! # Stand-ins
//!
//! `if` and `each` replace their element with another node (a placeholder
//! or the mounted branch). The runtime remembers which node currently stands
//! in for an element so that list reconciliation and disposal can find it.

mod conditional;
mod diagnostics;
mod each;
mod events;
mod leaf;
mod scope;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::config::Config;
use crate::dom::{Node, NodeId};
use crate::error::{CompileError, DirectiveError, Error, EvalError, Result};
use crate::expr::{Compile, Evaluator, ExprCompiler};
use crate::reactive::{Disposer, Effect};
use crate::store::{wrap_object, Object, PlainObject, Property, Value};

pub use diagnostics::Diagnostics;
pub use each::{longest_increasing_subsequence, MAX_RANGE};

/// How the walk proceeds after a directive has been bound.
pub enum Flow {
    Continue,
    /// Use this scope for the remaining directives and the children.
    Rescope(Object),
    /// The directive owns the element; skip everything else on it.
    Stop,
}

/// What binding a directive produced.
pub struct Bound {
    pub flow: Flow,
    pub disposer: Option<Disposer>,
}

impl Bound {
    pub fn none() -> Self {
        Self {
            flow: Flow::Continue,
            disposer: None,
        }
    }

    pub fn effect(effect: Effect) -> Self {
        Self {
            flow: Flow::Continue,
            disposer: Some(effect.disposer()),
        }
    }

    pub fn disposer(disposer: Disposer) -> Self {
        Self {
            flow: Flow::Continue,
            disposer: Some(disposer),
        }
    }

    pub fn with_flow(mut self, flow: Flow) -> Self {
        self.flow = flow;
        self
    }
}

/// The element, attribute and scope a directive is being bound to.
pub struct Site<'a> {
    pub runtime: &'a Directives,
    pub element: &'a Node,
    /// Full attribute name, prefix included.
    pub attribute: &'a str,
    /// Attribute name without the prefix.
    pub name: &'a str,
    pub expression: &'a str,
    pub scope: &'a Object,
}

impl Site<'_> {
    pub fn info(&self) -> BindingInfo {
        BindingInfo {
            directive: Rc::from(self.attribute),
            expression: Rc::from(self.expression),
            element: self.element.clone(),
        }
    }

    /// Compile the expression, reporting failures.
    pub fn compile(&self) -> Option<Evaluator> {
        self.runtime.compile_for(&self.info(), self.expression)
    }

    /// Bind an effect that evaluates the expression with the element as
    /// `this` and hands the result to `apply`.
    pub fn bind_effect(&self, mut apply: impl FnMut(&Value) + 'static) -> Bound {
        let Some(evaluator) = self.compile() else {
            return Bound::none();
        };
        let runtime = self.runtime.downgrade();
        let info = self.info();
        let scope = self.scope.clone();

        let effect = Effect::new(move || {
            let Some(runtime) = runtime.upgrade() else {
                return;
            };
            if let Some(value) = runtime.evaluate(&info, &evaluator, &scope) {
                apply(&value);
            }
        });
        Bound::effect(effect)
    }
}

/// Where a binding lives, kept for error reports raised after bind time.
#[derive(Clone)]
pub struct BindingInfo {
    pub directive: Rc<str>,
    pub expression: Rc<str>,
    pub element: Node,
}

impl BindingInfo {
    pub fn error(&self, kind: EvalError) -> DirectiveError {
        DirectiveError {
            directive: self.directive.to_string(),
            expression: self.expression.to_string(),
            element: self.element.describe(),
            kind,
        }
    }
}

/// A directive handler.
pub trait Directive {
    fn bind(&self, site: &Site<'_>) -> Bound;
}

impl<F> Directive for F
where
    F: Fn(&Site<'_>) -> Bound,
{
    fn bind(&self, site: &Site<'_>) -> Bound {
        self(site)
    }
}

type Builtin = fn(&Site<'_>) -> Bound;

enum Handler {
    Builtin(Builtin),
    Custom(Rc<dyn Directive>),
}

struct Binding {
    attribute: String,
    disposer: Option<Disposer>,
}

struct Inner {
    config: Config,
    compiler: Box<dyn Compile>,
    compiled: RefCell<HashMap<String, std::result::Result<Evaluator, CompileError>>>,
    custom: RefCell<HashMap<String, (Rc<dyn Directive>, bool)>>,
    bindings: RefCell<HashMap<NodeId, SmallVec<[Binding; 2]>>>,
    stand_ins: RefCell<HashMap<NodeId, Node>>,
    owners: RefCell<HashMap<NodeId, Node>>,
    roots: RefCell<HashMap<NodeId, Object>>,
    diagnostics: Diagnostics,
}

/// A directive runtime. Cloning shares the same runtime.
#[derive(Clone)]
pub struct Directives {
    inner: Rc<Inner>,
}

/// Non-owning handle held by long-lived bindings.
#[derive(Clone)]
pub struct WeakDirectives(Weak<Inner>);

impl WeakDirectives {
    pub fn upgrade(&self) -> Option<Directives> {
        self.0.upgrade().map(|inner| Directives { inner })
    }
}

impl Default for Directives {
    fn default() -> Self {
        Self::new()
    }
}

impl Directives {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self::with_compiler(config, ExprCompiler)
    }

    /// A runtime using another expression language.
    pub fn with_compiler(config: Config, compiler: impl Compile + 'static) -> Self {
        Self {
            inner: Rc::new(Inner {
                config,
                compiler: Box::new(compiler),
                compiled: RefCell::new(HashMap::new()),
                custom: RefCell::new(HashMap::new()),
                bindings: RefCell::new(HashMap::new()),
                stand_ins: RefCell::new(HashMap::new()),
                owners: RefCell::new(HashMap::new()),
                roots: RefCell::new(HashMap::new()),
                diagnostics: Diagnostics::default(),
            }),
        }
    }

    pub fn downgrade(&self) -> WeakDirectives {
        WeakDirectives(Rc::downgrade(&self.inner))
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.inner.diagnostics
    }

    /// Register a directive under `name` (without the prefix). A primary
    /// directive runs before the secondaries of its element. Registering a
    /// built-in name replaces the built-in.
    pub fn register(&self, name: &str, handler: impl Directive + 'static, primary: bool) {
        self.inner
            .custom
            .borrow_mut()
            .insert(name.to_string(), (Rc::new(handler), primary));
    }

    // ═══════════════════════════════════════════════════════════════════
    // Attach
    // ═══════════════════════════════════════════════════════════════════

    /// Bind every directive under `root` against a scope made from `data`.
    ///
    /// Attaching a root that is already attached merges `data` into its
    /// existing scope and walks the tree again; bindings that already exist
    /// are left alone.
    pub fn attach(&self, root: &Node, data: PlainObject) -> Result<ScopeHandle> {
        if !root.is_element() {
            return Err(Error::NotAnElement);
        }

        let existing = self.inner.roots.borrow().get(&root.id()).cloned();
        let scope = match existing {
            Some(scope) => {
                for (key, property) in data.entries() {
                    if let Property::Data(value) = property {
                        scope.set(&key, value);
                    }
                }
                scope
            }
            None => {
                let scope = wrap_object(data, None);
                self.inner
                    .roots
                    .borrow_mut()
                    .insert(root.id(), scope.clone());
                scope
            }
        };

        debug!(root = %root.describe(), "attach");
        self.walk(root, &scope);

        Ok(ScopeHandle {
            runtime: self.clone(),
            root: root.clone(),
            scope,
        })
    }

    // ═══════════════════════════════════════════════════════════════════
    // Tree walk
    // ═══════════════════════════════════════════════════════════════════

    /// Bind the directives of `element` and its descendants, pre-order.
    pub fn walk(&self, element: &Node, scope: &Object) {
        if !element.is_element() {
            return;
        }

        let prefix = self.inner.config.prefix.as_str();
        let directives: Vec<(String, String)> = element
            .attributes()
            .into_iter()
            .filter(|(name, _)| name.starts_with(prefix))
            .collect();

        let mut scope = scope.clone();
        if !directives.is_empty() {
            trace!(element = %element.describe(), count = directives.len(), "walk");

            let handlers: Vec<(String, String, Handler, bool)> = directives
                .into_iter()
                .map(|(attribute, expression)| {
                    let name = attribute[prefix.len()..].to_string();
                    let (handler, primary) = self.handler(&name);
                    (attribute, expression, handler, primary)
                })
                .collect();

            let parent = element.parent();
            let ordered = handlers
                .iter()
                .filter(|entry| entry.3)
                .chain(handlers.iter().filter(|entry| !entry.3));

            for (attribute, expression, handler, _) in ordered {
                if self.is_bound(element, attribute) {
                    continue;
                }

                let site = Site {
                    runtime: self,
                    element,
                    attribute,
                    name: &attribute[prefix.len()..],
                    expression,
                    scope: &scope,
                };
                let bound = match handler {
                    Handler::Builtin(bind) => bind(&site),
                    Handler::Custom(directive) => directive.bind(&site),
                };
                self.record(element, attribute, bound.disposer);

                match bound.flow {
                    Flow::Continue => {}
                    Flow::Rescope(next) => scope = next,
                    Flow::Stop => return,
                }
                if parent.is_some() && element.parent() != parent {
                    return;
                }
            }
        }

        for child in element.children() {
            // Skip nodes an earlier sibling's directive moved away.
            if child.parent().as_ref() != Some(element) {
                continue;
            }
            self.walk(&child, &scope);
        }
    }

    fn handler(&self, name: &str) -> (Handler, bool) {
        if let Some((directive, primary)) = self.inner.custom.borrow().get(name) {
            return (Handler::Custom(Rc::clone(directive)), *primary);
        }

        let (bind, primary): (Builtin, bool) = match name {
            "if" => (conditional::bind_if, true),
            "else" | "else-if" => (conditional::bind_stray_else, true),
            "each" => (each::bind_each, true),
            "scope" => (scope::bind_scope, true),
            "ref" => (scope::bind_ref, true),
            "text" => (leaf::bind_text, false),
            "class" => (leaf::bind_class, false),
            "style" => (leaf::bind_style, false),
            "id" => (leaf::bind_id, false),
            "data" => (leaf::bind_data, false),
            "value" => (leaf::bind_value, false),
            "fx" => (leaf::bind_fx, false),
            "" => (leaf::bind_spread, false),
            name if name.starts_with("on") => (events::bind_event, false),
            _ => (leaf::bind_attribute, false),
        };
        (Handler::Builtin(bind), primary)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Binding table
    // ═══════════════════════════════════════════════════════════════════

    fn record(&self, element: &Node, attribute: &str, disposer: Option<Disposer>) {
        self.inner
            .bindings
            .borrow_mut()
            .entry(element.id())
            .or_default()
            .push(Binding {
                attribute: attribute.to_string(),
                disposer,
            });
    }

    pub fn is_bound(&self, element: &Node, attribute: &str) -> bool {
        self.inner
            .bindings
            .borrow()
            .get(&element.id())
            .is_some_and(|bindings| bindings.iter().any(|b| b.attribute == attribute))
    }

    /// Number of live bindings across every element.
    pub fn binding_count(&self) -> usize {
        self.inner.bindings.borrow().values().map(SmallVec::len).sum()
    }

    /// Dispose every binding on `root` and its descendants, including
    /// bindings of elements that are currently represented by a stand-in
    /// inside the subtree. Disposing twice is harmless.
    pub fn dispose_tree(&self, root: &Node) {
        for node in root.descendants() {
            self.dispose_node(&node);
        }
    }

    fn dispose_node(&self, node: &Node) {
        let bindings = self.inner.bindings.borrow_mut().remove(&node.id());
        if let Some(bindings) = bindings {
            for binding in bindings.into_iter().rev() {
                if let Some(dispose) = binding.disposer {
                    dispose();
                }
            }
        }

        let stand_in = self.inner.stand_ins.borrow_mut().remove(&node.id());
        if let Some(stand_in) = stand_in {
            self.inner.owners.borrow_mut().remove(&stand_in.id());
        }

        let owner = self.inner.owners.borrow_mut().remove(&node.id());
        if let Some(owner) = owner {
            self.dispose_tree(&owner);
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Stand-ins
    // ═══════════════════════════════════════════════════════════════════

    /// Record that `stand_in` now occupies `element`'s place in the tree.
    pub fn set_stand_in(&self, element: &Node, stand_in: &Node) {
        let previous = if element == stand_in {
            self.inner.stand_ins.borrow_mut().remove(&element.id())
        } else {
            self.inner
                .stand_ins
                .borrow_mut()
                .insert(element.id(), stand_in.clone())
        };

        let mut owners = self.inner.owners.borrow_mut();
        if let Some(previous) = previous {
            owners.remove(&previous.id());
        }
        if element != stand_in {
            owners.insert(stand_in.id(), element.clone());
        }
    }

    pub fn clear_stand_in(&self, element: &Node) {
        self.set_stand_in(element, element);
    }

    /// The node currently in the tree on behalf of `node`.
    pub fn resolve(&self, node: &Node) -> Node {
        let stand_ins = self.inner.stand_ins.borrow();
        let mut current = node.clone();
        while let Some(next) = stand_ins.get(&current.id()) {
            if next == node {
                break;
            }
            current = next.clone();
        }
        current
    }

    // ═══════════════════════════════════════════════════════════════════
    // Expressions
    // ═══════════════════════════════════════════════════════════════════

    /// Compile `expression`, memoized per text. Failures are memoized too.
    pub fn compile(&self, expression: &str) -> std::result::Result<Evaluator, CompileError> {
        if let Some(cached) = self.inner.compiled.borrow().get(expression) {
            return cached.clone();
        }
        let compiled = self.inner.compiler.compile(expression);
        self.inner
            .compiled
            .borrow_mut()
            .insert(expression.to_string(), compiled.clone());
        compiled
    }

    pub(crate) fn compile_for(&self, info: &BindingInfo, expression: &str) -> Option<Evaluator> {
        match self.compile(expression) {
            Ok(evaluator) => Some(evaluator),
            Err(err) => {
                self.report(info, err.into());
                None
            }
        }
    }

    /// Run `evaluator` for a binding, reporting failures.
    pub fn evaluate(
        &self,
        info: &BindingInfo,
        evaluator: &Evaluator,
        scope: &Object,
    ) -> Option<Value> {
        match evaluator.evaluate(scope, Some(&info.element)) {
            Ok(value) => Some(value),
            Err(err) => {
                self.report(info, err);
                None
            }
        }
    }

    pub fn report(&self, info: &BindingInfo, kind: EvalError) {
        self.inner
            .diagnostics
            .report(info.error(kind), self.inner.config.report_errors);
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Host surface
// ═══════════════════════════════════════════════════════════════════════

/// The live scope of an attached tree.
pub struct ScopeHandle {
    runtime: Directives,
    root: Node,
    scope: Object,
}

impl ScopeHandle {
    pub fn scope(&self) -> &Object {
        &self.scope
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn get(&self, key: &str) -> Value {
        self.scope.get(key)
    }

    pub fn set(&self, key: &str, value: impl Into<Value>) {
        self.scope.set(key, value);
    }

    /// Dispose every binding under the root.
    pub fn teardown(self) {
        debug!(root = %self.root.describe(), "teardown");
        self.runtime.inner.roots.borrow_mut().remove(&self.root.id());
        self.runtime.dispose_tree(&self.root);
    }
}

thread_local! {
    static DEFAULT: Directives = Directives::new();
}

/// Attach `root` with this thread's default runtime.
pub fn attach(root: &Node, data: PlainObject) -> Result<ScopeHandle> {
    DEFAULT.with(|runtime| runtime.attach(root, data))
}

/// This thread's default runtime.
pub fn default_runtime() -> Directives {
    DEFAULT.with(Directives::clone)
}

/// `camelCase` to `dash-case`.
pub(crate) fn dashcase(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for c in name.chars() {
        if c.is_uppercase() {
            out.push('-');
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}
