//! Keyed list rendering.
//!
//! `:each="item in source"` or `:each="item, index in source"` renders one
//! clone of the element per item, each walked in a child scope binding the
//! item (and index). Items are keyed by identity; duplicates are told apart
//! by occurrence number. On every change the list is reconciled in place:
//!
//! 1. entries whose key is gone are disposed, then detached;
//! 2. entries whose key survives are reused and get their index updated;
//! 3. the longest run of reused entries that is already in order stays put,
//!    every other entry is moved (or inserted) in front of its successor;
//! 4. fresh entries are walked once they are in the tree.
//!
//! Sources: arrays (index is the position), objects (index is the key), a
//! non-negative number `n` (items `1..=n`, index from 0, at most
//! [`MAX_RANGE`]), and `null` or `undefined` (empty).
//!
//! Array and object sources also carry a disposer on every slot. Shrinking
//! the array or deleting a key prunes the entries whose items are gone right
//! away, so their bindings never rerun, even when the removal shares a batch
//! with other writes.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use tracing::debug;

use crate::dom::Node;
use crate::error::{CompileError, EvalError};
use crate::reactive::{untracked, Disposer, Effect};
use crate::store::{self, Identity, Object, Value};

use super::{Bound, Directives, Flow, Site};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Iteration {
    item: String,
    index: Option<String>,
    source: String,
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

fn parse_each(src: &str) -> Result<Iteration, CompileError> {
    let Some(split) = src.find(" in ") else {
        return Err(CompileError::new("Expected 'item in source'", 0));
    };
    let source = src[split + 4..].trim();
    if source.is_empty() {
        return Err(CompileError::new("Missing source after 'in'", src.len()));
    }

    let head = src[..split].trim();
    let head = head
        .strip_prefix('(')
        .and_then(|h| h.strip_suffix(')'))
        .unwrap_or(head);

    let mut names = head.split(',').map(str::trim);
    let item = names.next().unwrap_or_default();
    let index = names.next();
    if names.next().is_some()
        || !is_identifier(item)
        || index.is_some_and(|name| !is_identifier(name))
    {
        return Err(CompileError::new(format!("Invalid binding '{head}'"), 0));
    }

    Ok(Iteration {
        item: item.to_string(),
        index: index.map(str::to_string),
        source: source.to_string(),
    })
}

/// Largest number accepted as a range source.
pub const MAX_RANGE: usize = 1 << 20;

/// Expand a source value into `(index, item)` pairs. Reads are tracked.
fn iterate(source: &Value) -> Result<Vec<(Value, Value)>, EvalError> {
    match source {
        Value::Undefined | Value::Null => Ok(Vec::new()),
        Value::Array(array) => Ok(array
            .to_vec()
            .into_iter()
            .enumerate()
            .map(|(i, item)| (Value::from(i), item))
            .collect()),
        Value::Object(object) => Ok(object
            .entries()
            .into_iter()
            .map(|(key, item)| (Value::from(key), item))
            .collect()),
        Value::PlainArray(_) | Value::PlainObject(_) => iterate(&store::wrap(source.clone(), None)),
        Value::Number(n) if *n > MAX_RANGE as f64 => Err(EvalError::InvalidIteration(
            format!("{n} (ranges stop at {MAX_RANGE})"),
        )),
        Value::Number(n) if *n >= 0.0 && n.fract() == 0.0 => {
            let count = *n as usize;
            Ok((1..=count)
                .map(|k| (Value::from(k - 1), Value::from(k)))
                .collect())
        }
        other => Err(EvalError::InvalidIteration(format!("{other:?}"))),
    }
}

/// Indices into `values` of one longest strictly increasing subsequence.
pub fn longest_increasing_subsequence(values: &[usize]) -> Vec<usize> {
    // tails[k]: index of the smallest tail of an increasing run of length k + 1
    let mut tails: Vec<usize> = Vec::new();
    let mut previous: Vec<Option<usize>> = vec![None; values.len()];

    for (i, &value) in values.iter().enumerate() {
        let slot = tails.partition_point(|&t| values[t] < value);
        if slot > 0 {
            previous[i] = Some(tails[slot - 1]);
        }
        if slot == tails.len() {
            tails.push(i);
        } else {
            tails[slot] = i;
        }
    }

    let mut out = Vec::with_capacity(tails.len());
    let mut cursor = tails.last().copied();
    while let Some(i) = cursor {
        out.push(i);
        cursor = previous[i];
    }
    out.reverse();
    out
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ItemKey {
    identity: Identity,
    occurrence: usize,
}

fn item_keys<'a>(items: impl IntoIterator<Item = &'a Value>) -> Vec<ItemKey> {
    let mut occurrences: HashMap<Identity, usize> = HashMap::new();
    items
        .into_iter()
        .map(|item| {
            let identity = item.identity();
            let seen = occurrences.entry(identity.clone()).or_insert(0);
            let key = ItemKey {
                identity,
                occurrence: *seen,
            };
            *seen += 1;
            key
        })
        .collect()
}

struct Entry {
    key: ItemKey,
    node: Node,
    scope: Object,
}

struct List {
    template: Node,
    anchor: Node,
    scope: Object,
    item: String,
    index: Option<String>,
    entries: RefCell<Vec<Entry>>,
    /// The array or object last rendered from.
    source: RefCell<Value>,
    /// Set while slot disposers are being replaced.
    guarding: Cell<bool>,
}

impl List {
    fn reconcile(&self, runtime: &Directives, items: Vec<(Value, Value)>) {
        let keys = item_keys(items.iter().map(|(_, item)| item));
        let wanted: HashSet<&ItemKey> = keys.iter().collect();

        let old = std::mem::take(&mut *self.entries.borrow_mut());
        let mut reusable: HashMap<ItemKey, (usize, Entry)> = HashMap::with_capacity(old.len());
        let mut removed = 0;
        for (position, entry) in old.into_iter().enumerate() {
            if wanted.contains(&entry.key) {
                reusable.insert(entry.key.clone(), (position, entry));
            } else {
                release(runtime, &entry);
                removed += 1;
            }
        }

        let mut entries = Vec::with_capacity(items.len());
        let mut sources: Vec<Option<usize>> = Vec::with_capacity(items.len());
        for ((index, item), key) in items.into_iter().zip(keys) {
            match reusable.remove(&key) {
                Some((position, entry)) => {
                    if let Some(name) = &self.index {
                        entry.scope.define(name, index);
                    }
                    sources.push(Some(position));
                    entries.push(entry);
                }
                None => {
                    let mut bindings = vec![(self.item.clone(), item)];
                    if let Some(name) = &self.index {
                        bindings.push((name.clone(), index));
                    }
                    sources.push(None);
                    entries.push(Entry {
                        key,
                        node: self.template.clone_node(true),
                        scope: Object::child(&self.scope, bindings),
                    });
                }
            }
        }

        let reused: Vec<usize> = sources.iter().enumerate().filter_map(|(i, s)| s.map(|_| i)).collect();
        let old_positions: Vec<usize> = sources.iter().filter_map(|s| *s).collect();
        let mut stays = vec![false; entries.len()];
        for k in longest_increasing_subsequence(&old_positions) {
            stays[reused[k]] = true;
        }

        let mut moved = 0;
        if let Some(parent) = self.anchor.parent() {
            let mut next = self.anchor.clone();
            for i in (0..entries.len()).rev() {
                let node = runtime.resolve(&entries[i].node);
                if !stays[i] {
                    parent.insert_before(&node, Some(&next));
                    if sources[i].is_some() {
                        moved += 1;
                    }
                }
                next = node;
            }
        }

        let mut created = 0;
        for (entry, source) in entries.iter().zip(&sources) {
            if source.is_none() {
                runtime.walk(&entry.node, &entry.scope);
                created += 1;
            }
        }

        debug!(
            items = entries.len(),
            created,
            moved,
            removed,
            "list reconciled"
        );
        *self.entries.borrow_mut() = entries;
    }
}

impl List {
    /// Put a pruning disposer on every slot of an array or object source.
    fn guard_slots(
        self: &Rc<Self>,
        runtime: &Directives,
        source: &Value,
        items: &[(Value, Value)],
    ) {
        *self.source.borrow_mut() = source.clone();
        self.guarding.set(true);
        for (position, (index, _)) in items.iter().enumerate() {
            match source {
                Value::Array(array) => {
                    array.attach_disposer(position, self.pruner(runtime, source));
                }
                Value::Object(object) => {
                    if let Some(key) = index.as_str() {
                        object.attach_disposer(key, self.pruner(runtime, source));
                    }
                }
                _ => break,
            }
        }
        self.guarding.set(false);
    }

    fn pruner(self: &Rc<Self>, runtime: &Directives, source: &Value) -> Disposer {
        let list = Rc::downgrade(self);
        let runtime = runtime.downgrade();
        let identity = source.identity();
        Box::new(move || {
            let (Some(list), Some(runtime)) = (list.upgrade(), runtime.upgrade()) else {
                return;
            };
            if !list.guarding.get() && list.source.borrow().identity() == identity {
                list.prune(&runtime);
            }
        })
    }

    /// Release the entries whose items the source no longer holds.
    fn prune(&self, runtime: &Directives) {
        let remaining = match &*self.source.borrow() {
            Value::Array(array) => array.held(),
            Value::Object(object) => untracked(|| object.entries())
                .into_iter()
                .map(|(_, item)| item)
                .collect(),
            _ => return,
        };
        let wanted: HashSet<ItemKey> = item_keys(&remaining).into_iter().collect();

        let gone: Vec<Entry> = {
            let mut entries = self.entries.borrow_mut();
            let (kept, gone) = std::mem::take(&mut *entries)
                .into_iter()
                .partition(|entry| wanted.contains(&entry.key));
            *entries = kept;
            gone
        };
        for entry in &gone {
            release(runtime, entry);
        }
        if !gone.is_empty() {
            debug!(removed = gone.len(), "list pruned");
        }
    }
}

/// Dispose an entry's bindings, then take it out of the tree.
fn release(runtime: &Directives, entry: &Entry) {
    let node = runtime.resolve(&entry.node);
    runtime.dispose_tree(&entry.node);
    node.remove();
    entry.node.remove();
}

pub(super) fn bind_each(site: &Site<'_>) -> Bound {
    let runtime = site.runtime;
    let info = site.info();
    let template = site.element.clone();
    template.remove_attribute(site.attribute);

    let iteration = match parse_each(site.expression) {
        Ok(iteration) => iteration,
        Err(err) => {
            runtime.report(&info, err.into());
            return Bound::none().with_flow(Flow::Stop);
        }
    };
    let Some(source) = runtime.compile_for(&info, &iteration.source) else {
        return Bound::none().with_flow(Flow::Stop);
    };

    let anchor = Node::text("");
    template.replace_with(&anchor);
    runtime.set_stand_in(&template, &anchor);

    let list = Rc::new(List {
        template,
        anchor,
        scope: site.scope.clone(),
        item: iteration.item,
        index: iteration.index,
        entries: RefCell::new(Vec::new()),
        source: RefCell::new(Value::Undefined),
        guarding: Cell::new(false),
    });

    let weak = runtime.downgrade();
    let rendered = Rc::clone(&list);
    let effect = Effect::new(move || {
        let Some(runtime) = weak.upgrade() else {
            return;
        };
        let Some(value) = runtime.evaluate(&info, &source, &rendered.scope) else {
            return;
        };
        let value = match value {
            Value::PlainArray(_) | Value::PlainObject(_) => store::wrap(value, None),
            value => value,
        };
        match iterate(&value) {
            Ok(items) => untracked(|| {
                rendered.guard_slots(&runtime, &value, &items);
                rendered.reconcile(&runtime, items);
            }),
            Err(err) => runtime.report(&info, err),
        }
    });

    let weak = runtime.downgrade();
    let dispose = effect.disposer();
    Bound::disposer(Box::new(move || {
        dispose();
        let Some(runtime) = weak.upgrade() else {
            return;
        };
        runtime.clear_stand_in(&list.template);
        *list.source.borrow_mut() = Value::Undefined;
        let entries = std::mem::take(&mut *list.entries.borrow_mut());
        for entry in &entries {
            release(&runtime, entry);
        }
    }))
    .with_flow(Flow::Stop)
}
