//! `:on<event>[.modifier...]` listeners.
//!
//! The expression runs on every matching event with `event` in scope. When
//! it evaluates to a function, that function is called with the event, so
//! both `:onclick="count++"` and `:onclick="e => save(e)"` work. Handlers
//! run inside a batch.

use tracing::{debug, trace};

use crate::dom::Event;
use crate::error::EvalError;
use crate::reactive::{batch, untracked};
use crate::store::{Function, Object, PlainObject, Value};

use super::{Bound, Site};

type KeyTest = fn(&str) -> bool;

#[derive(Default)]
struct Modifiers {
    prevent: bool,
    stop: bool,
    once: bool,
    only_self: bool,
    keys: Vec<KeyTest>,
}

fn key_test(name: &str) -> Option<KeyTest> {
    let test: KeyTest = match name {
        "enter" => |key: &str| key == "Enter",
        "esc" | "escape" => |key: &str| key.starts_with("Esc"),
        "tab" => |key: &str| key == "Tab",
        "space" => |key: &str| key == " " || key == "Space" || key == "Spacebar",
        "arrow" => |key: &str| key.starts_with("Arrow"),
        "backspace" => |key: &str| key == "Backspace",
        "delete" => |key: &str| key == "Delete",
        "digit" => |key: &str| single(key).is_some_and(|c| c.is_ascii_digit()),
        "letter" => |key: &str| single(key).is_some_and(|c| c.is_ascii_alphabetic()),
        "character" => |key: &str| single(key).is_some_and(|c| !c.is_whitespace()),
        _ => return None,
    };
    Some(test)
}

fn single(key: &str) -> Option<char> {
    let mut chars = key.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}

impl Modifiers {
    fn parse<'a>(names: impl Iterator<Item = &'a str>) -> Self {
        let mut modifiers = Self::default();
        for name in names {
            match name {
                "prevent" => modifiers.prevent = true,
                "stop" => modifiers.stop = true,
                "once" => modifiers.once = true,
                "self" => modifiers.only_self = true,
                other => match key_test(other) {
                    Some(test) => modifiers.keys.push(test),
                    None => debug!(modifier = other, "unknown event modifier ignored"),
                },
            }
        }
        modifiers
    }

    fn accepts(&self, event: &Event, target: crate::dom::NodeId) -> bool {
        if self.only_self && event.target().map(|node| node.id()) != Some(target) {
            return false;
        }
        if self.keys.is_empty() {
            return true;
        }
        event
            .key()
            .is_some_and(|key| self.keys.iter().all(|test| test(key)))
    }
}

/// The `event` object handed to expressions.
fn event_value(event: &Event) -> Value {
    let prevent = event.clone();
    let stop = event.clone();
    let object = PlainObject::new()
        .with("type", event.kind())
        .with("key", event.key().map(Value::from).unwrap_or_default())
        .with("target", event.target().map(Value::Node).unwrap_or(Value::Null))
        .with(
            "currentTarget",
            event.current_target().map(Value::Node).unwrap_or(Value::Null),
        )
        .with(
            "preventDefault",
            Function::new("preventDefault", move |_| {
                prevent.prevent_default();
                Ok(Value::Undefined)
            }),
        )
        .with(
            "stopPropagation",
            Function::new("stopPropagation", move |_| {
                stop.stop_propagation();
                Ok(Value::Undefined)
            }),
        );
    Value::PlainObject(object)
}

pub(super) fn bind_event(site: &Site<'_>) -> Bound {
    let mut parts = site.name.split('.');
    let kind = parts
        .next()
        .and_then(|head| head.strip_prefix("on"))
        .unwrap_or_default()
        .to_string();
    if kind.is_empty() {
        site.runtime.report(
            &site.info(),
            EvalError::TypeError(format!("{} names no event", site.attribute)),
        );
        return Bound::none();
    }
    let modifiers = Modifiers::parse(parts);

    let Some(evaluator) = site.compile() else {
        return Bound::none();
    };

    let element = site.element.clone();
    let target = element.id();
    let once = modifiers.once;
    let runtime = site.runtime.downgrade();
    let info = site.info();
    let scope = site.scope.clone();

    trace!(event = %kind, element = %element.describe(), "listen");
    let listener = element.add_event_listener(
        &kind,
        move |event| {
            if !modifiers.accepts(event, target) {
                return;
            }
            if modifiers.stop {
                event.stop_propagation();
            }
            if modifiers.prevent {
                event.prevent_default();
            }
            let Some(runtime) = runtime.upgrade() else {
                return;
            };

            let value = event_value(event);
            let local = Object::overlay(&scope, [("event", value.clone())]);
            batch(|| {
                untracked(|| {
                    if let Some(Value::Function(handler)) =
                        runtime.evaluate(&info, &evaluator, &local)
                    {
                        if let Err(err) = handler.call(&[value]) {
                            runtime.report(&info, err);
                        }
                    }
                })
            });
        },
        once,
    );

    Bound::disposer(Box::new(move || element.remove_event_listener(listener)))
}
