//! `if` / `else-if` / `else` chains.
//!
//! The chain is collected once, when the `if` is bound: following element
//! siblings marked `else-if` (or `else` together with `if`) add clauses, a
//! plain `else` ends the chain. Every clause element is detached and kept as
//! a pristine template. A single node occupies the chain's position: the
//! mounted branch, or an empty text placeholder when no clause matches.
//!
//! Switching clauses disposes the old branch's bindings, swaps the node and
//! walks a fresh clone of the new clause's template.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::debug;

use crate::dom::Node;
use crate::error::EvalError;
use crate::expr::Evaluator;
use crate::reactive::{untracked, Effect};

use super::{BindingInfo, Bound, Flow, Site};

struct Clause {
    /// `None` for the trailing `else`.
    test: Option<(BindingInfo, Evaluator)>,
    template: Node,
}

struct Mounted {
    clause: Option<usize>,
    node: Node,
}

pub(super) fn bind_if(site: &Site<'_>) -> Bound {
    let runtime = site.runtime;
    let element = site.element.clone();
    element.remove_attribute(site.attribute);

    let mut clauses = vec![Clause {
        test: site.compile().map(|evaluator| (site.info(), evaluator)),
        template: element.clone(),
    }];
    // A clause whose test did not compile never matches.
    let mut broken = vec![clauses[0].test.is_none()];

    let prefix = runtime.config().prefix.as_str();
    let if_attr = format!("{prefix}if");
    let else_attr = format!("{prefix}else");
    let else_if_attr = format!("{prefix}else-if");

    let mut next = element.next_element_sibling();
    while let Some(sibling) = next {
        let test = if let Some(expression) = sibling.remove_attribute(&else_if_attr) {
            Some((else_if_attr.as_str(), expression))
        } else if sibling.remove_attribute(&else_attr).is_some() {
            sibling
                .remove_attribute(&if_attr)
                .map(|expression| (if_attr.as_str(), expression))
        } else {
            break;
        };

        next = sibling.next_element_sibling();
        sibling.remove();

        match test {
            Some((attribute, expression)) => {
                let info = BindingInfo {
                    directive: Rc::from(attribute),
                    expression: Rc::from(expression.as_str()),
                    element: sibling.clone(),
                };
                let evaluator = runtime.compile_for(&info, &expression);
                broken.push(evaluator.is_none());
                clauses.push(Clause {
                    test: evaluator.map(|evaluator| (info, evaluator)),
                    template: sibling,
                });
            }
            None => {
                broken.push(false);
                clauses.push(Clause {
                    test: None,
                    template: sibling,
                });
                break;
            }
        }
    }

    let placeholder = Node::text("");
    element.replace_with(&placeholder);
    runtime.set_stand_in(&element, &placeholder);

    debug!(clauses = clauses.len(), element = %element.describe(), "conditional bound");

    let mounted = Rc::new(RefCell::new(Mounted {
        clause: None,
        node: placeholder.clone(),
    }));

    let weak = runtime.downgrade();
    let scope = site.scope.clone();
    let state = Rc::clone(&mounted);
    let anchor = element.clone();

    let effect = Effect::new(move || {
        let Some(runtime) = weak.upgrade() else {
            return;
        };

        let mut selected = None;
        for (index, clause) in clauses.iter().enumerate() {
            if broken[index] {
                continue;
            }
            match &clause.test {
                None => {
                    selected = Some(index);
                    break;
                }
                Some((info, evaluator)) => match runtime.evaluate(info, evaluator, &scope) {
                    Some(value) if value.truthy() => {
                        selected = Some(index);
                        break;
                    }
                    Some(_) => {}
                    // Keep whatever is mounted.
                    None => return,
                },
            }
        }

        if state.borrow().clause == selected {
            return;
        }

        untracked(|| {
            let (previous, old) = {
                let mounted = state.borrow();
                (mounted.clause, mounted.node.clone())
            };
            let position = runtime.resolve(&old);
            // Unlink the old branch first so disposing it does not reach
            // back into this conditional.
            runtime.clear_stand_in(&anchor);
            if previous.is_some() {
                runtime.dispose_tree(&old);
            }

            let node = match selected {
                Some(index) => clauses[index].template.clone_node(true),
                None => placeholder.clone(),
            };
            position.replace_with(&node);
            if position != old {
                old.remove();
            }
            runtime.set_stand_in(&anchor, &node);
            *state.borrow_mut() = Mounted {
                clause: selected,
                node: node.clone(),
            };

            debug!(from = ?previous, to = ?selected, "branch switched");
            if selected.is_some() {
                runtime.walk(&node, &scope);
            }
        });
    });

    let weak = runtime.downgrade();
    let dispose = effect.disposer();
    Bound::disposer(Box::new(move || {
        dispose();
        let Some(runtime) = weak.upgrade() else {
            return;
        };
        let (clause, node) = {
            let mounted = mounted.borrow();
            (mounted.clause, mounted.node.clone())
        };
        runtime.clear_stand_in(&element);
        if clause.is_some() {
            runtime.dispose_tree(&node);
        }
    }))
    .with_flow(Flow::Stop)
}

/// An `else` or `else-if` that no `if` claimed.
pub(super) fn bind_stray_else(site: &Site<'_>) -> Bound {
    site.runtime.report(
        &site.info(),
        EvalError::TypeError(format!("{} without a preceding if", site.attribute)),
    );
    Bound::none()
}

#[cfg(test)]
mod tests {
    use crate::directive::Directives;
    use crate::dom::parse_element;
    use crate::reactive::tick;
    use crate::store::PlainObject;

    #[test]
    fn mounts_the_first_matching_clause() {
        let root = parse_element(
            r#"<div><p :if="n > 1">big</p><p :else-if="n > 0">small</p><p :else>none</p></div>"#,
        )
        .unwrap();
        let runtime = Directives::new();
        let handle = runtime
            .attach(&root, PlainObject::new().with("n", 2))
            .unwrap();
        assert_eq!(root.text_content(), "big");

        handle.set("n", 1);
        tick();
        assert_eq!(root.text_content(), "small");

        handle.set("n", 0);
        tick();
        assert_eq!(root.text_content(), "none");
        assert_eq!(root.children().len(), 1);
    }

    #[test]
    fn placeholder_when_nothing_matches() {
        let root = parse_element(r#"<div><p :if="on">on</p></div>"#).unwrap();
        let runtime = Directives::new();
        let handle = runtime
            .attach(&root, PlainObject::new().with("on", false))
            .unwrap();

        let placeholder = root.first_child().unwrap();
        assert!(placeholder.is_text());
        assert_eq!(root.inner_html(), "");

        handle.set("on", true);
        tick();
        assert_eq!(root.inner_html(), "<p>on</p>");

        handle.set("on", false);
        tick();
        assert_eq!(root.first_child(), Some(placeholder));
    }

    #[test]
    fn else_with_if_is_an_else_if() {
        let root = parse_element(
            r#"<div><b :if="a">a</b><i :else :if="b">b</i><u :else>c</u></div>"#,
        )
        .unwrap();
        let runtime = Directives::new();
        let handle = runtime
            .attach(&root, PlainObject::new().with("a", false).with("b", true))
            .unwrap();
        assert_eq!(root.inner_html(), "<i>b</i>");

        handle.set("b", false);
        tick();
        assert_eq!(root.inner_html(), "<u>c</u>");
    }

    #[test]
    fn branches_are_rebuilt_on_remount() {
        let root = parse_element(r#"<div><p :if="on" :text="label"></p></div>"#).unwrap();
        let runtime = Directives::new();
        let handle = runtime
            .attach(&root, PlainObject::new().with("on", true).with("label", "x"))
            .unwrap();
        let first = root.first_child().unwrap();
        assert_eq!(first.text_content(), "x");

        handle.set("on", false);
        tick();
        handle.set("on", true);
        tick();

        let second = root.first_child().unwrap();
        assert_ne!(first, second);
        assert_eq!(second.text_content(), "x");
        // The conditional itself plus the text binding of the live branch.
        assert_eq!(runtime.binding_count(), 2);
    }

    #[test]
    fn failing_test_keeps_the_mounted_branch() {
        let root = parse_element(r#"<div><p :if="item.ok">yes</p></div>"#).unwrap();
        let runtime = Directives::new();
        let handle = runtime
            .attach(
                &root,
                PlainObject::new().with("item", PlainObject::new().with("ok", true)),
            )
            .unwrap();
        assert_eq!(root.inner_html(), "<p>yes</p>");

        handle.set("item", crate::store::Value::Null);
        tick();
        assert_eq!(root.inner_html(), "<p>yes</p>");
        assert_eq!(runtime.diagnostics().reported_count(), 1);
    }

    #[test]
    fn stray_else_is_reported() {
        let root = parse_element(r#"<div><p :else>x</p></div>"#).unwrap();
        let runtime = Directives::new();
        runtime.attach(&root, PlainObject::new()).unwrap();
        assert_eq!(runtime.diagnostics().reported_count(), 1);
        assert_eq!(root.text_content(), "x");
    }
}
