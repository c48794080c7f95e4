//! Leaf directives: effects that write one aspect of their element.

use std::rc::Rc;

use tracing::debug;

use crate::dom::{Event, Node};
use crate::expr::display;
use crate::reactive::{batch, untracked};
use crate::store::{self, Object, Value};

use super::{dashcase, Bound, Site};

/// Own entries of an object value, plain or wrapped. Anything else is empty.
fn entries(value: &Value) -> Vec<(String, Value)> {
    match value {
        Value::Object(object) => object.entries(),
        Value::PlainObject(_) => match store::wrap(value.clone(), None) {
            Value::Object(object) => object.entries(),
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

fn items(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(array) => array.to_vec(),
        Value::PlainArray(plain) => plain.to_vec(),
        _ => Vec::new(),
    }
}

/// Attribute write with the usual coercions: `null`, `undefined` and `false`
/// remove, `true` is the empty string, numbers and strings are stringified,
/// anything else is the empty string.
fn set_attr(element: &Node, name: &str, value: &Value) {
    match value {
        Value::Undefined | Value::Null | Value::Bool(false) => {
            element.remove_attribute(name);
        }
        Value::Bool(true) => element.set_attribute(name, ""),
        Value::Number(_) | Value::String(_) => element.set_attribute(name, &value.to_string()),
        _ => element.set_attribute(name, ""),
    }
}

pub(super) fn bind_text(site: &Site<'_>) -> Bound {
    let element = site.element.clone();
    site.bind_effect(move |value| element.set_text_content(&display(value)))
}

/// Classes from the expression are added to the element's initial classes.
/// Strings are taken whole, arrays item by item, objects by truthy value.
pub(super) fn bind_class(site: &Site<'_>) -> Bound {
    let element = site.element.clone();
    let initial = element.attribute("class").unwrap_or_default();

    site.bind_effect(move |value| {
        let mut classes: Vec<String> = initial.split_whitespace().map(str::to_string).collect();
        match value {
            Value::String(s) => classes.extend(s.split_whitespace().map(str::to_string)),
            Value::Array(_) | Value::PlainArray(_) => {
                classes.extend(
                    items(value)
                        .iter()
                        .filter(|item| item.truthy())
                        .map(ToString::to_string),
                );
            }
            Value::Object(_) | Value::PlainObject(_) => {
                classes.extend(
                    entries(value)
                        .into_iter()
                        .filter(|(_, on)| on.truthy())
                        .map(|(class, _)| class),
                );
            }
            _ => {}
        }

        let mut seen = Vec::with_capacity(classes.len());
        for class in classes {
            if !seen.contains(&class) {
                seen.push(class);
            }
        }
        if seen.is_empty() {
            element.remove_attribute("class");
        } else {
            element.set_attribute("class", &seen.join(" "));
        }
    })
}

/// A string is appended to the initial inline style; an object sets one
/// property per entry on top of it.
pub(super) fn bind_style(site: &Site<'_>) -> Bound {
    let element = site.element.clone();
    let mut initial = element.attribute("style").unwrap_or_default();
    if !initial.trim().is_empty() && !initial.trim_end().ends_with(';') {
        initial.push(';');
    }
    if !initial.is_empty() && !initial.ends_with(' ') {
        initial.push(' ');
    }

    site.bind_effect(move |value| match value {
        Value::String(s) => element.set_attribute("style", &format!("{initial}{s}")),
        other => {
            let properties = entries(other);
            untracked(|| {
                element.set_attribute("style", initial.trim_end());
                for (name, value) in properties {
                    element.set_style_property(&dashcase(&name), &display(&value));
                }
            });
        }
    })
}

pub(super) fn bind_id(site: &Site<'_>) -> Bound {
    let element = site.element.clone();
    site.bind_effect(move |value| {
        let id = match value {
            Value::Number(n) if *n == 0.0 => "0".to_string(),
            v if v.truthy() => v.to_string(),
            _ => String::new(),
        };
        element.set_attribute("id", &id);
    })
}

pub(super) fn bind_data(site: &Site<'_>) -> Bound {
    let element = site.element.clone();
    site.bind_effect(move |value| {
        for (key, value) in entries(value) {
            element.set_attribute(&format!("data-{}", dashcase(&key)), &display(&value));
        }
    })
}

pub(super) fn bind_fx(site: &Site<'_>) -> Bound {
    site.bind_effect(|_| {})
}

/// `:="{ ... }"`: every entry becomes a dash-cased attribute.
pub(super) fn bind_spread(site: &Site<'_>) -> Bound {
    let element = site.element.clone();
    site.bind_effect(move |value| {
        for (key, value) in entries(value) {
            set_attr(&element, &dashcase(&key), &value);
        }
    })
}

/// Any other `:name` binds the attribute `name`.
pub(super) fn bind_attribute(site: &Site<'_>) -> Bound {
    let element = site.element.clone();
    let name = site.name.to_string();
    site.bind_effect(move |value| set_attr(&element, &name, value))
}

/// Two-way binding for form controls.
///
/// The effect pushes the value into the element: `checked` for checkboxes,
/// `value` otherwise. When the expression is assignable, `input` and
/// `change` events write the control's state back through
/// `<expression> = $value`.
pub(super) fn bind_value(site: &Site<'_>) -> Bound {
    let element = site.element.clone();
    let checkbox = element.input_type() == "checkbox";

    let render = {
        let element = element.clone();
        site.bind_effect(move |value| {
            if checkbox {
                element.set_checked(value.truthy());
                set_attr(&element, "checked", &Value::Bool(value.truthy()));
            } else {
                let text = display(value);
                element.set_value(&text);
                element.set_attribute("value", &text);
            }
        })
    };

    let writer = match site.runtime.compile(&format!("{} = $value", site.expression)) {
        Ok(writer) => writer,
        Err(err) => {
            debug!(expression = site.expression, error = %err, "value binding is read-only");
            return render;
        }
    };

    let numeric = matches!(element.input_type().as_str(), "number" | "range");
    let runtime = site.runtime.downgrade();
    let info = site.info();
    let scope = site.scope.clone();
    let write_back: Rc<dyn Fn(&Event)> = Rc::new(move |event: &Event| {
        let Some(runtime) = runtime.upgrade() else {
            return;
        };
        let Some(target) = event.current_target() else {
            return;
        };
        let value = if checkbox {
            Value::Bool(target.checked())
        } else if numeric {
            Value::from(target.value().trim().parse::<f64>().unwrap_or(f64::NAN))
        } else {
            Value::from(target.value())
        };
        let local = Object::overlay(&scope, [("$value", value)]);
        batch(|| untracked(|| runtime.evaluate(&info, &writer, &local)));
    });

    let listeners: Vec<_> = ["input", "change"]
        .into_iter()
        .map(|kind| {
            let write_back = Rc::clone(&write_back);
            element.add_event_listener(kind, move |event| write_back(event), false)
        })
        .collect();

    let dispose = render.disposer;
    Bound::disposer(Box::new(move || {
        for id in &listeners {
            element.remove_event_listener(*id);
        }
        if let Some(dispose) = dispose {
            dispose();
        }
    }))
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use crate::directive::Directives;
    use crate::dom::{parse_element, Event};
    use crate::reactive::tick;
    use crate::store::{Function, PlainArray, PlainObject, Value};

    fn mount(src: &str, data: PlainObject) -> (crate::dom::Node, crate::directive::ScopeHandle) {
        let root = parse_element(src).unwrap();
        let handle = Directives::new().attach(&root, data).unwrap();
        (root, handle)
    }

    #[test]
    fn text_renders_nullish_as_empty() {
        let (root, handle) = mount(r#"<p :text="label"></p>"#, PlainObject::new().with("label", "hi"));
        assert_eq!(root.text_content(), "hi");

        handle.set("label", Value::Null);
        tick();
        assert_eq!(root.text_content(), "");
    }

    #[test]
    fn class_forms() {
        let (root, handle) = mount(
            r#"<p class="base" :class="cls"></p>"#,
            PlainObject::new().with("cls", "a b"),
        );
        assert_eq!(root.class_list(), ["base", "a", "b"]);

        handle.set("cls", PlainArray::new().with("c").with(Value::Null));
        tick();
        assert_eq!(root.class_list(), ["base", "c"]);

        handle.set("cls", PlainObject::new().with("on", true).with("off", false));
        tick();
        assert_eq!(root.class_list(), ["base", "on"]);
    }

    #[test]
    fn class_attribute_is_removed_when_empty() {
        let (root, handle) = mount(r#"<p :class="cls"></p>"#, PlainObject::new().with("cls", "x"));
        assert!(root.has_class("x"));
        handle.set("cls", "");
        tick();
        assert_eq!(root.attribute("class"), None);
    }

    #[test]
    fn style_string_and_object() {
        let (root, handle) = mount(
            r#"<p style="color: red" :style="s"></p>"#,
            PlainObject::new().with("s", "margin: 0"),
        );
        assert_eq!(root.attribute("style").as_deref(), Some("color: red; margin: 0"));

        handle.set("s", PlainObject::new().with("fontSize", "2px"));
        tick();
        assert_eq!(root.style_property("color").as_deref(), Some("red"));
        assert_eq!(root.style_property("font-size").as_deref(), Some("2px"));
        assert_eq!(root.style_property("margin"), None);
    }

    #[test]
    fn id_keeps_zero() {
        let (root, handle) = mount(r#"<p :id="n"></p>"#, PlainObject::new().with("n", 0));
        assert_eq!(root.attribute("id").as_deref(), Some("0"));
        handle.set("n", false);
        tick();
        assert_eq!(root.attribute("id").as_deref(), Some(""));
    }

    #[test]
    fn data_attributes_are_dash_cased() {
        let (root, _handle) = mount(
            r#"<p :data="{ userId: 7 }"></p>"#,
            PlainObject::new(),
        );
        assert_eq!(root.attribute("data-user-id").as_deref(), Some("7"));
    }

    #[test]
    fn attribute_coercions() {
        let (root, handle) = mount(
            r#"<button :disabled="busy" :title="label" :="{ ariaLabel: label }"></button>"#,
            PlainObject::new().with("busy", true).with("label", "go"),
        );
        assert_eq!(root.attribute("disabled").as_deref(), Some(""));
        assert_eq!(root.attribute("title").as_deref(), Some("go"));
        assert_eq!(root.attribute("aria-label").as_deref(), Some("go"));

        handle.set("busy", false);
        tick();
        assert!(!root.has_attribute("disabled"));
    }

    #[test]
    fn fx_runs_for_side_effects() {
        let runs = Rc::new(Cell::new(0));
        let counter = Rc::clone(&runs);
        let log = Function::new("log", move |_| {
            counter.set(counter.get() + 1);
            Ok(Value::Undefined)
        });
        let (_root, handle) = mount(
            r#"<p :fx="log(n)"></p>"#,
            PlainObject::new().with("log", log).with("n", 1),
        );
        assert_eq!(runs.get(), 1);

        handle.set("n", 2);
        tick();
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn value_binds_both_ways() {
        let (root, handle) = mount(
            r#"<div><input :value="name"><input type="checkbox" :value="done"></div>"#,
            PlainObject::new().with("name", "a").with("done", false),
        );
        let children = root.child_elements();
        let (text, check) = (&children[0], &children[1]);
        assert_eq!(text.value(), "a");
        assert!(!check.checked());

        text.set_value("typed");
        text.dispatch_event(&Event::new("input"));
        assert_eq!(handle.get("name").as_str(), Some("typed"));

        check.set_checked(true);
        check.dispatch_event(&Event::new("change"));
        assert!(handle.get("done").truthy());

        handle.set("name", "reset");
        tick();
        assert_eq!(text.value(), "reset");
    }

    #[test]
    fn value_write_back_defines_missing_names() {
        let (root, handle) = mount(r#"<div><input :value="query"></div>"#, PlainObject::new());
        let input = root.child_elements()[0].clone();
        assert_eq!(input.value(), "");

        input.set_value("rust");
        input.dispatch_event(&Event::new("input"));
        assert_eq!(handle.get("query").as_str(), Some("rust"));
    }

    #[test]
    fn computed_values_are_read_only() {
        let (root, handle) = mount(
            r#"<input :value="a + b">"#,
            PlainObject::new().with("a", 1).with("b", 2),
        );
        assert_eq!(root.value(), "3");
        assert_eq!(root.listener_count(), 0);
        handle.teardown();
    }
}
