//! End-to-end tests for the directive runtime.
//!
//! Each test parses a template, attaches it with a fresh runtime and drives
//! it through scope writes and ticks.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use bramble_core::dom::{parse_element, Event, Node};
use bramble_core::reactive::{batch, effect, tick};
use bramble_core::store::{wrap, Function, PlainArray, PlainObject, Value};
use bramble_core::{Config, Directives, ScopeHandle};

fn mount(src: &str, data: PlainObject) -> (Node, Directives, ScopeHandle) {
    let root = parse_element(src).unwrap();
    let runtime = Directives::new();
    let handle = runtime.attach(&root, data).unwrap();
    (root, runtime, handle)
}

fn numbers(values: &[i32]) -> PlainArray {
    values.iter().map(|&n| Value::from(n)).collect()
}

/// A function that counts calls per argument.
fn init_counter() -> (Function, Rc<RefCell<HashMap<String, usize>>>) {
    let counts = Rc::new(RefCell::new(HashMap::new()));
    let seen = Rc::clone(&counts);
    let init = Function::new("init", move |args| {
        let key = args.first().map(ToString::to_string).unwrap_or_default();
        *seen.borrow_mut().entry(key).or_insert(0) += 1;
        Ok(Value::Undefined)
    });
    (init, counts)
}

#[test]
fn n_writes_run_n_reactions() {
    let state = wrap(
        Value::PlainObject(PlainObject::new().with("a", 0).with("b", 0).with("c", 0)),
        None,
    );
    let state = state.as_object().unwrap().clone();
    let runs = Rc::new(Cell::new(0));

    let _effects: Vec<_> = ["a", "b", "c"]
        .into_iter()
        .map(|key| {
            let (state, runs) = (state.clone(), Rc::clone(&runs));
            effect(move || {
                state.get(key);
                runs.set(runs.get() + 1);
            })
        })
        .collect();

    let (all, single) = (state.clone(), Rc::new(Cell::new(0)));
    let counter = Rc::clone(&single);
    let _single = effect(move || {
        for key in ["a", "b", "c"] {
            all.get(key);
        }
        counter.set(counter.get() + 1);
    });

    runs.set(0);
    single.set(0);
    state.set("a", 1);
    state.set("b", 1);
    state.set("c", 1);
    tick();

    assert_eq!(runs.get(), 3);
    assert_eq!(single.get(), 1);
}

#[test]
fn reattaching_does_not_double_bind() {
    let (root, runtime, _handle) = mount(
        r#"<div><p :text="a"></p><p :class="a"></p></div>"#,
        PlainObject::new().with("a", "x"),
    );
    let bound = runtime.binding_count();
    assert_eq!(bound, 2);

    runtime.attach(&root, PlainObject::new().with("a", "y")).unwrap();
    tick();
    assert_eq!(runtime.binding_count(), bound);
    assert_eq!(root.text_content(), "y");
}

#[test]
fn conditional_chain_does_not_leak() {
    let (root, runtime, handle) = mount(
        r#"<div><p :if="a" :text="'A'"></p><p :else-if="b" :text="'B'"></p><p :else :text="'none'"></p></div>"#,
        PlainObject::new().with("a", true).with("b", false),
    );
    assert_eq!(root.text_content(), "A");
    let after_one = runtime.binding_count();

    handle.set("a", false);
    handle.set("b", true);
    tick();
    assert_eq!(root.text_content(), "B");

    handle.set("b", false);
    tick();
    assert_eq!(root.text_content(), "none");
    assert_eq!(root.child_elements().len(), 1);

    for _ in 0..5 {
        handle.set("a", true);
        tick();
        handle.set("a", false);
        tick();
    }
    assert_eq!(runtime.binding_count(), after_one);
}

#[test]
fn keyed_reorder_reuses_elements() {
    let (init, counts) = init_counter();
    let (root, _runtime, handle) = mount(
        r#"<ul><li :each="item in items" :fx="init(item)" :text="item"></li></ul>"#,
        PlainObject::new()
            .with("items", numbers(&[1, 2, 3]))
            .with("init", init),
    );
    let before = root.child_elements();
    assert_eq!(before.len(), 3);

    handle.set("items", numbers(&[3, 1, 2]));
    tick();

    let after = root.child_elements();
    assert_eq!(after, [before[2].clone(), before[0].clone(), before[1].clone()]);
    assert_eq!(root.text_content(), "312");
    for key in ["1", "2", "3"] {
        assert_eq!(counts.borrow()[key], 1, "item {key} re-initialized");
    }
}

#[test]
fn keyed_removal_disposes_only_the_removed_item() {
    let (init, counts) = init_counter();
    let (root, runtime, handle) = mount(
        r#"<ul><li :each="item in items" :fx="init(item)" :text="item"></li></ul>"#,
        PlainObject::new()
            .with("items", numbers(&[1, 2, 3]))
            .with("init", init),
    );
    let before = root.child_elements();
    let bindings = runtime.binding_count();

    let items = handle.get("items");
    let removed = items.as_array().unwrap().splice(1, 1, Vec::new());
    assert_eq!(removed.len(), 1);
    tick();

    let after = root.child_elements();
    assert_eq!(after, [before[0].clone(), before[2].clone()]);
    assert!(before[1].parent().is_none());
    // Item 2 owned two bindings.
    assert_eq!(runtime.binding_count(), bindings - 2);
    assert!(counts.borrow().values().all(|&n| n == 1));
}

#[test]
fn truncating_in_a_batch_disposes_removed_items_first() {
    let (track, counts) = init_counter();
    let (root, runtime, handle) = mount(
        r#"<ul><li :each="x in xs" :fx="track(x, outer)"></li></ul>"#,
        PlainObject::new()
            .with("xs", numbers(&[1, 2, 3]))
            .with("outer", 0)
            .with("track", track),
    );
    let bindings = runtime.binding_count();
    let xs = handle.get("xs");

    batch(|| {
        handle.set("outer", 1);
        xs.as_array().unwrap().set_len(1);
    });
    tick();

    assert_eq!(counts.borrow()["1"], 2);
    assert_eq!(counts.borrow()["2"], 1, "item 2 ran after removal");
    assert_eq!(counts.borrow()["3"], 1, "item 3 ran after removal");
    assert_eq!(root.child_elements().len(), 1);
    assert_eq!(runtime.binding_count(), bindings - 2);
}

#[test]
fn popped_and_deleted_items_leave_before_the_next_flush() {
    let (root, _runtime, handle) = mount(
        r#"<ul><li :each="x in xs" :text="x"></li></ul>"#,
        PlainObject::new().with("xs", numbers(&[1, 2, 3])),
    );
    let before = root.child_elements();
    let xs = handle.get("xs");
    let xs = xs.as_array().unwrap();

    xs.pop();
    assert!(before[2].parent().is_none());
    assert_eq!(root.text_content(), "12");

    xs.delete(0);
    assert!(before[0].parent().is_none());
    tick();
    // The hole renders as an empty item; item 2 keeps its element.
    let after = root.child_elements();
    assert_eq!(after.len(), 2);
    assert_eq!(after[1], before[1]);
    assert_eq!(root.text_content(), "2");
}

#[test]
fn deleting_a_rendered_key_disposes_its_bindings() {
    let (track, counts) = init_counter();
    let (root, runtime, handle) = mount(
        r#"<dl><dt :each="v in map" :fx="track(v, outer)"></dt></dl>"#,
        PlainObject::new()
            .with("map", PlainObject::new().with("a", "x").with("b", "y"))
            .with("outer", 0)
            .with("track", track),
    );
    let bindings = runtime.binding_count();
    let map = handle.get("map");

    batch(|| {
        handle.set("outer", 1);
        map.as_object().unwrap().delete("a");
    });
    tick();

    assert_eq!(counts.borrow()["x"], 1);
    assert_eq!(counts.borrow()["y"], 2);
    assert_eq!(root.child_elements().len(), 1);
    assert_eq!(runtime.binding_count(), bindings - 1);
}

#[test]
fn appending_and_prepending_keep_existing_items() {
    let (root, _runtime, handle) = mount(
        r#"<ul><li :each="item in items" :text="item"></li></ul>"#,
        PlainObject::new().with("items", numbers(&[2, 3])),
    );
    let before = root.child_elements();

    let items = handle.get("items");
    let items = items.as_array().unwrap();
    items.push([Value::from(4)]);
    items.unshift(vec![Value::from(1)]);
    tick();

    let after = root.child_elements();
    assert_eq!(root.text_content(), "1234");
    assert_eq!(after[1], before[0]);
    assert_eq!(after[2], before[1]);
}

#[test]
fn item_scopes_fall_through_to_the_outer_scope() {
    let (root, _runtime, handle) = mount(
        r#"<ul><li :each="item in items" :text="prefix + item"></li></ul>"#,
        PlainObject::new()
            .with("items", numbers(&[1, 2]))
            .with("prefix", "#"),
    );
    assert_eq!(root.text_content(), "#1#2");

    handle.set("prefix", "no. ");
    tick();
    assert_eq!(root.text_content(), "no. 1no. 2");
}

#[test]
fn item_writes_reach_the_owning_scope() {
    let (root, _runtime, handle) = mount(
        r#"<ul><li :each="item in items" :onclick="selected = item"></li></ul>"#,
        PlainObject::new()
            .with("items", numbers(&[1, 2]))
            .with("selected", Value::Null),
    );
    root.child_elements()[1].dispatch_event(&Event::new("click"));
    assert_eq!(handle.get("selected").to_number(), 2.0);
}

#[test]
fn handlers_can_introduce_new_state() {
    let (root, _runtime, handle) = mount(
        r#"<div><button :onclick="shown = true"></button><p :if="shown">details</p></div>"#,
        PlainObject::new(),
    );
    assert_eq!(root.text_content(), "");

    root.child_elements()[0].dispatch_event(&Event::new("click"));
    tick();
    assert!(handle.get("shown").truthy());
    assert_eq!(root.text_content(), "details");
}

#[test]
fn conditional_swaps_around_a_stable_placeholder() {
    let (root, _runtime, handle) = mount(
        r#"<div><p :if="n > 0" :text="n"></p><p :else>zero</p><b :if="n > 0">!</b></div>"#,
        PlainObject::new().with("n", 0),
    );
    assert_eq!(root.text_content(), "zero");
    let placeholder = root.children()[1].clone();
    assert!(placeholder.is_text());

    handle.set("n", 5);
    tick();
    assert_eq!(root.text_content(), "5!");

    handle.set("n", 0);
    tick();
    assert_eq!(root.text_content(), "zero");
    assert_eq!(root.children()[1], placeholder);
}

#[test]
fn conditionals_inside_lists() {
    let (root, runtime, handle) = mount(
        r#"<ul><li :each="item in items"><b :if="item > 1" :text="item"></b></li></ul>"#,
        PlainObject::new().with("items", numbers(&[1, 2, 3])),
    );
    assert_eq!(root.text_content(), "23");

    handle.set("items", numbers(&[3, 2]));
    tick();
    assert_eq!(root.text_content(), "32");

    handle.set("items", PlainArray::new());
    tick();
    assert_eq!(root.inner_html(), "");
    // Only the list binding itself is left.
    assert_eq!(runtime.binding_count(), 1);
}

#[test]
fn lists_inside_conditionals() {
    let (root, runtime, handle) = mount(
        r#"<div><ul :if="show"><li :each="x in 3" :text="x"></li></ul></div>"#,
        PlainObject::new().with("show", true),
    );
    assert_eq!(root.text_content(), "123");

    handle.set("show", false);
    tick();
    assert_eq!(root.text_content(), "");
    assert_eq!(runtime.binding_count(), 1);

    handle.set("show", true);
    tick();
    assert_eq!(root.text_content(), "123");
}

#[test]
fn one_bad_binding_does_not_break_its_siblings() {
    let (root, runtime, _handle) = mount(
        r#"<div><p :text="missing.deep"></p><p :text="ok"></p><p :text="1 +"></p></div>"#,
        PlainObject::new().with("ok", "fine"),
    );
    assert_eq!(root.text_content(), "fine");
    assert_eq!(runtime.diagnostics().reported_count(), 2);

    assert!(runtime.diagnostics().take_uncaught().is_empty());
    tick();
    let uncaught = runtime.diagnostics().take_uncaught();
    assert_eq!(uncaught.len(), 2);
    assert_eq!(uncaught[0].directive, ":text");
    assert_eq!(uncaught[0].expression, "missing.deep");
}

#[test]
fn configured_prefix() {
    let config = Config::from_json(r#"{ "prefix": "x-", "report_errors": false }"#).unwrap();
    let root = parse_element(r#"<p x-text="msg" :text="'ignored'"></p>"#).unwrap();
    let runtime = Directives::with_config(config);
    runtime
        .attach(&root, PlainObject::new().with("msg", "hi"))
        .unwrap();
    assert_eq!(root.text_content(), "hi");
}

#[test]
fn todo_list() {
    let (root, _runtime, handle) = mount(
        r#"<section>
            <input :value="draft">
            <button :onclick="todos.push({ text: draft, done: false }); draft = ''">add</button>
            <ul>
                <li :each="todo, i in todos" :class="{ done: todo.done }">
                    <span :text="i + 1 + '. ' + todo.text"></span>
                    <input type="checkbox" :value="todo.done">
                </li>
            </ul>
            <p :text="todos.filter(t => !t.done).length + ' left'"></p>
        </section>"#,
        PlainObject::new()
            .with("draft", "")
            .with("todos", PlainArray::new()),
    );
    let input = root.child_elements()[0].clone();
    let button = root.child_elements()[1].clone();
    let list = root.child_elements()[2].clone();

    for text in ["milk", "eggs"] {
        input.set_value(text);
        input.dispatch_event(&Event::new("input"));
        button.dispatch_event(&Event::new("click"));
    }
    assert_eq!(handle.get("draft").as_str(), Some(""));
    assert_eq!(list.child_elements().len(), 2);
    assert!(root.text_content().contains("2 left"));

    let first = list.child_elements()[0].clone();
    let checkbox = first.child_elements()[1].clone();
    checkbox.set_checked(true);
    checkbox.dispatch_event(&Event::new("change"));
    tick();

    assert!(first.has_class("done"));
    assert!(root.text_content().contains("1 left"));
    assert!(first.text_content().contains("1. milk"));
}
