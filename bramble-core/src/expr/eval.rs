//! Tree-walking evaluation of [`Expr`] against a scope object.
//!
//! Reads go through the store, so evaluating inside an effect subscribes the
//! effect to exactly the slots the expression touched. Plain objects and
//! arrays met along the way (literals, host data) are wrapped before member
//! access, which keeps writes and reads on the same proxy.

use std::cmp::Ordering;
use std::rc::Rc;

use crate::dom::Node;
use crate::error::EvalError;
use crate::reactive::untracked;
use crate::store::{self, Array, Function, Object, PlainArray, PlainObject, Value};

use super::ast::{BinaryOp, Expr, LogicalOp, UnaryOp};

/// What an expression sees while it runs.
pub struct Env<'a> {
    pub scope: &'a Object,
    pub this: &'a Value,
}

/// Trait for evaluating syntax tree nodes to values.
pub trait Evaluate {
    fn eval(&self, env: &Env<'_>) -> Result<Value, EvalError>;
}

// ═══════════════════════════════════════════════════════════════════════
// Main Expression Dispatcher
// ═══════════════════════════════════════════════════════════════════════

impl Evaluate for Expr {
    fn eval(&self, env: &Env<'_>) -> Result<Value, EvalError> {
        match self {
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::String(s) => Ok(Value::String(Rc::clone(s))),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Null => Ok(Value::Null),
            Expr::Undefined => Ok(Value::Undefined),
            Expr::Ident(name) => Ok(env.scope.get(name)),
            Expr::This => Ok(env.this.clone()),

            Expr::Member {
                object,
                property,
                optional,
            } => {
                let object = object.eval(env)?;
                if *optional && object.is_nullish() {
                    return Ok(Value::Undefined);
                }
                get_member(&object, property)
            }

            Expr::Index {
                object,
                index,
                optional,
            } => {
                let object = object.eval(env)?;
                if *optional && object.is_nullish() {
                    return Ok(Value::Undefined);
                }
                let key = index.eval(env)?.to_string();
                get_member(&object, &key)
            }

            Expr::Call {
                callee,
                args,
                optional,
            } => {
                let function = callee.eval(env)?;
                if *optional && function.is_nullish() {
                    return Ok(Value::Undefined);
                }
                let Value::Function(function) = function else {
                    return Err(EvalError::NotCallable(callee.to_string()));
                };
                let args = args
                    .iter()
                    .map(|arg| arg.eval(env))
                    .collect::<Result<Vec<_>, _>>()?;
                function.call(&args)
            }

            Expr::Array(items) => {
                let items = items
                    .iter()
                    .map(|item| item.eval(env))
                    .collect::<Result<PlainArray, _>>()?;
                Ok(Value::PlainArray(items))
            }

            Expr::Object(entries) => {
                let object = PlainObject::new();
                for (key, value) in entries {
                    object.insert(key, value.eval(env)?);
                }
                Ok(Value::PlainObject(object))
            }

            Expr::Unary { op, operand } => {
                let value = operand.eval(env)?;
                Ok(match op {
                    UnaryOp::Not => Value::Bool(!value.truthy()),
                    UnaryOp::Neg => Value::Number(-to_primitive(value).to_number()),
                    UnaryOp::Plus => Value::Number(to_primitive(value).to_number()),
                    UnaryOp::TypeOf => Value::str(value.type_of()),
                })
            }

            Expr::Binary { op, left, right } => {
                let left = left.eval(env)?;
                let right = right.eval(env)?;
                Ok(binary(*op, left, right))
            }

            Expr::Logical { op, left, right } => {
                let left = left.eval(env)?;
                let short_circuit = match op {
                    LogicalOp::And => !left.truthy(),
                    LogicalOp::Or => left.truthy(),
                    LogicalOp::Nullish => !left.is_nullish(),
                };
                if short_circuit {
                    Ok(left)
                } else {
                    right.eval(env)
                }
            }

            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if test.eval(env)?.truthy() {
                    consequent.eval(env)
                } else {
                    alternate.eval(env)
                }
            }

            Expr::Assign { op, target, value } => {
                let place = Place::resolve(target, env)?;
                let value = match op.binary() {
                    None => value.eval(env)?,
                    Some(combine) => {
                        let current = place.read(env)?;
                        binary(combine, current, value.eval(env)?)
                    }
                };
                place.write(env, value.clone())?;
                Ok(value)
            }

            Expr::Update {
                increment,
                prefix,
                target,
            } => {
                let place = Place::resolve(target, env)?;
                let old = to_primitive(place.read(env)?).to_number();
                let new = if *increment { old + 1.0 } else { old - 1.0 };
                place.write(env, Value::Number(new))?;
                Ok(Value::Number(if *prefix { new } else { old }))
            }

            Expr::Arrow { params, body } => Ok(Value::Function(arrow(params, body, env))),

            Expr::Sequence(items) => {
                let mut last = Value::Undefined;
                for item in items {
                    last = item.eval(env)?;
                }
                Ok(last)
            }
        }
    }
}

/// An arrow function closing over the current scope. Parameters are bound
/// in a fresh overlay on each call; missing arguments are `undefined`.
fn arrow(params: &[String], body: &Rc<Expr>, env: &Env<'_>) -> Function {
    let params = params.to_vec();
    let body = Rc::clone(body);
    let scope = env.scope.clone();
    let this = env.this.clone();

    Function::new("anonymous", move |args: &[Value]| {
        let bindings = params
            .iter()
            .enumerate()
            .map(|(i, param)| (param.clone(), args.get(i).cloned().unwrap_or_default()));
        let local = Object::overlay(&scope, bindings);
        body.eval(&Env {
            scope: &local,
            this: &this,
        })
    })
}

// ═══════════════════════════════════════════════════════════════════════
// Assignment targets
// ═══════════════════════════════════════════════════════════════════════

enum Place {
    Scope(String),
    Member(Value, String),
}

impl Place {
    fn resolve(target: &Expr, env: &Env<'_>) -> Result<Self, EvalError> {
        match target {
            Expr::Ident(name) => Ok(Place::Scope(name.clone())),
            Expr::Member {
                object, property, ..
            } => Ok(Place::Member(object.eval(env)?, property.clone())),
            Expr::Index { object, index, .. } => {
                let object = object.eval(env)?;
                Ok(Place::Member(object, index.eval(env)?.to_string()))
            }
            other => Err(EvalError::InvalidAssignment(other.to_string())),
        }
    }

    fn read(&self, env: &Env<'_>) -> Result<Value, EvalError> {
        match self {
            Place::Scope(name) => Ok(env.scope.get(name)),
            Place::Member(object, key) => get_member(object, key),
        }
    }

    fn write(&self, env: &Env<'_>, value: Value) -> Result<(), EvalError> {
        match self {
            Place::Scope(name) => {
                env.scope.set(name, value);
                Ok(())
            }
            Place::Member(object, key) => set_member(object, key, value),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Member access
// ═══════════════════════════════════════════════════════════════════════

/// Read `object[key]`.
pub fn get_member(object: &Value, key: &str) -> Result<Value, EvalError> {
    match object {
        Value::Undefined | Value::Null => Err(EvalError::TypeError(format!(
            "Cannot read properties of {object} (reading '{key}')"
        ))),
        Value::Object(o) => Ok(o.get(key)),
        Value::Array(a) => Ok(array_member(a, key)),
        Value::PlainObject(_) | Value::PlainArray(_) => {
            get_member(&store::wrap(object.clone(), None), key)
        }
        Value::String(s) => Ok(string_member(s, key)),
        Value::Node(node) => Ok(node_member(node, key)),
        Value::Function(f) if key == "name" => Ok(Value::str(f.name())),
        _ => Ok(Value::Undefined),
    }
}

/// Write `object[key] = value`.
pub fn set_member(object: &Value, key: &str, value: Value) -> Result<(), EvalError> {
    match object {
        Value::Undefined | Value::Null => Err(EvalError::TypeError(format!(
            "Cannot set properties of {object} (setting '{key}')"
        ))),
        Value::Object(o) => {
            o.set(key, value);
            Ok(())
        }
        Value::Array(a) => {
            if key == "length" {
                let len = value.to_number();
                if len < 0.0 || len.fract() != 0.0 || len.is_nan() {
                    return Err(EvalError::TypeError("Invalid array length".to_string()));
                }
                a.set_len(len as usize);
                return Ok(());
            }
            match key.parse::<usize>() {
                Ok(index) => {
                    a.set(index, value);
                    Ok(())
                }
                Err(_) => Err(EvalError::InvalidAssignment(format!("array.{key}"))),
            }
        }
        Value::PlainObject(_) | Value::PlainArray(_) => {
            set_member(&store::wrap(object.clone(), None), key, value)
        }
        Value::Node(node) => {
            match key {
                "value" => node.set_value(&value.to_string()),
                "checked" => node.set_checked(value.truthy()),
                "textContent" => node.set_text_content(&display(&value)),
                "id" => node.set_attribute("id", &value.to_string()),
                _ => return Err(EvalError::InvalidAssignment(format!("element.{key}"))),
            }
            Ok(())
        }
        _ => Err(EvalError::InvalidAssignment(format!("{}.{key}", object.type_of()))),
    }
}

/// Text rendering where `null` and `undefined` become empty.
pub fn display(value: &Value) -> String {
    if value.is_nullish() {
        String::new()
    } else {
        value.to_string()
    }
}

fn node_member(node: &Node, key: &str) -> Value {
    match key {
        "value" => Value::from(node.value()),
        "checked" => Value::Bool(node.checked()),
        "id" => node.attribute("id").map(Value::from).unwrap_or(Value::str("")),
        "tagName" => node
            .tag()
            .map(|tag| Value::from(tag.to_ascii_uppercase()))
            .unwrap_or_default(),
        "textContent" => Value::from(node.text_content()),
        "parentNode" => node.parent().map(Value::Node).unwrap_or(Value::Null),
        _ => Value::Undefined,
    }
}

fn string_member(s: &Rc<str>, key: &str) -> Value {
    if key == "length" {
        return Value::from(s.chars().count());
    }
    if let Ok(index) = key.parse::<usize>() {
        return s
            .chars()
            .nth(index)
            .map(|c| Value::from(c.to_string()))
            .unwrap_or_default();
    }

    let target = Rc::clone(s);
    let method = key.to_string();
    let call = move |args: &[Value]| -> Result<Value, EvalError> {
        Ok(match method.as_str() {
            "toUpperCase" => Value::from(target.to_uppercase()),
            "toLowerCase" => Value::from(target.to_lowercase()),
            "trim" => Value::str(target.trim()),
            _ => {
                let needle = args.first().map(Value::to_string).unwrap_or_default();
                Value::Bool(target.contains(needle.as_str()))
            }
        })
    };

    match key {
        "toUpperCase" | "toLowerCase" | "trim" | "includes" => {
            Value::Function(Function::new(key, call))
        }
        _ => Value::Undefined,
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Array builtins
// ═══════════════════════════════════════════════════════════════════════

const ARRAY_METHODS: &[&str] = &[
    "push", "pop", "shift", "unshift", "splice", "includes", "indexOf", "join", "slice", "map",
    "filter",
];

fn array_member(array: &Array, key: &str) -> Value {
    if key == "length" {
        return Value::from(array.len());
    }
    if let Ok(index) = key.parse::<usize>() {
        return array.get(index);
    }
    if !ARRAY_METHODS.contains(&key) {
        return Value::Undefined;
    }

    let target = array.clone();
    let method = key.to_string();
    Value::Function(Function::new(key, move |args: &[Value]| {
        call_array_method(&target, &method, args)
    }))
}

fn call_array_method(array: &Array, method: &str, args: &[Value]) -> Result<Value, EvalError> {
    let arg = |i: usize| args.get(i).cloned().unwrap_or_default();

    match method {
        "push" => Ok(Value::from(array.push(args.iter().cloned()))),
        "pop" => Ok(array.pop()),
        "shift" => Ok(array.shift()),
        "unshift" => Ok(Value::from(array.unshift(args.to_vec()))),
        "splice" => {
            let len = untracked(|| array.len());
            let start = relative_index(&arg(0), len, 0);
            let delete_count = if args.len() < 2 {
                len - start
            } else {
                let requested = to_integer(arg(1).to_number()).max(0.0) as usize;
                requested.min(len - start)
            };
            let items = args.get(2..).map(<[Value]>::to_vec).unwrap_or_default();
            let removed = array.splice(start, delete_count, items);
            Ok(Value::PlainArray(removed.into()))
        }
        "includes" => {
            let needle = arg(0);
            Ok(Value::Bool(array.to_vec().iter().any(|item| {
                strict_equals(item, &needle) || (is_nan(item) && is_nan(&needle))
            })))
        }
        "indexOf" => {
            let needle = arg(0);
            let position = array
                .to_vec()
                .iter()
                .position(|item| strict_equals(item, &needle));
            Ok(position.map_or(Value::Number(-1.0), Value::from))
        }
        "join" => {
            let separator = match arg(0) {
                Value::Undefined => ",".to_string(),
                other => other.to_string(),
            };
            let parts: Vec<String> = array.to_vec().iter().map(display).collect();
            Ok(Value::from(parts.join(&separator)))
        }
        "slice" => {
            let items = array.to_vec();
            let start = relative_index(&arg(0), items.len(), 0);
            let end = relative_index(&arg(1), items.len(), items.len());
            let slice = if start < end {
                items[start..end].to_vec()
            } else {
                Vec::new()
            };
            Ok(Value::PlainArray(slice.into()))
        }
        "map" | "filter" => {
            let callback = match arg(0) {
                Value::Function(callback) => callback,
                other => return Err(EvalError::NotCallable(other.to_string())),
            };
            let mut out = Vec::new();
            for (i, item) in array.to_vec().into_iter().enumerate() {
                let result =
                    callback.call(&[item.clone(), Value::from(i), Value::Array(array.clone())])?;
                if method == "map" {
                    out.push(result);
                } else if result.truthy() {
                    out.push(item);
                }
            }
            Ok(Value::PlainArray(out.into()))
        }
        other => Err(EvalError::NotCallable(format!("array.{other}"))),
    }
}

fn to_integer(n: f64) -> f64 {
    if n.is_nan() {
        0.0
    } else {
        n.trunc()
    }
}

/// Resolve a possibly negative index argument against `len`.
fn relative_index(value: &Value, len: usize, default: usize) -> usize {
    if value.is_undefined() {
        return default;
    }
    let n = to_integer(value.to_number());
    if n < 0.0 {
        (len as f64 + n).max(0.0) as usize
    } else {
        n.min(len as f64) as usize
    }
}

fn is_nan(value: &Value) -> bool {
    matches!(value, Value::Number(n) if n.is_nan())
}

// ═══════════════════════════════════════════════════════════════════════
// Operators
// ═══════════════════════════════════════════════════════════════════════

fn is_primitive(value: &Value) -> bool {
    matches!(
        value,
        Value::Undefined | Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_)
    )
}

fn to_primitive(value: Value) -> Value {
    if is_primitive(&value) {
        value
    } else {
        Value::from(value.to_string())
    }
}

/// `===`
pub fn strict_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x == y,
        _ => a == b,
    }
}

/// `==`
pub fn loose_equals(a: &Value, b: &Value) -> bool {
    if a.is_nullish() || b.is_nullish() {
        return a.is_nullish() && b.is_nullish();
    }
    match (is_primitive(a), is_primitive(b)) {
        (true, true) => match (a, b) {
            (Value::String(x), Value::String(y)) => x == y,
            _ => a.to_number() == b.to_number(),
        },
        (false, false) => strict_equals(a, b),
        (true, false) => loose_equals(a, &to_primitive(b.clone())),
        (false, true) => loose_equals(&to_primitive(a.clone()), b),
    }
}

fn binary(op: BinaryOp, left: Value, right: Value) -> Value {
    match op {
        BinaryOp::Add => {
            let (left, right) = (to_primitive(left), to_primitive(right));
            if matches!(left, Value::String(_)) || matches!(right, Value::String(_)) {
                Value::from(format!("{left}{right}"))
            } else {
                Value::Number(left.to_number() + right.to_number())
            }
        }
        BinaryOp::Sub => arithmetic(left, right, |a, b| a - b),
        BinaryOp::Mul => arithmetic(left, right, |a, b| a * b),
        BinaryOp::Div => arithmetic(left, right, |a, b| a / b),
        BinaryOp::Rem => arithmetic(left, right, |a, b| a % b),
        BinaryOp::Lt => Value::Bool(compare(left, right) == Some(Ordering::Less)),
        BinaryOp::Gt => Value::Bool(compare(left, right) == Some(Ordering::Greater)),
        BinaryOp::Le => Value::Bool(matches!(
            compare(left, right),
            Some(Ordering::Less | Ordering::Equal)
        )),
        BinaryOp::Ge => Value::Bool(matches!(
            compare(left, right),
            Some(Ordering::Greater | Ordering::Equal)
        )),
        BinaryOp::LooseEq => Value::Bool(loose_equals(&left, &right)),
        BinaryOp::LooseNe => Value::Bool(!loose_equals(&left, &right)),
        BinaryOp::StrictEq => Value::Bool(strict_equals(&left, &right)),
        BinaryOp::StrictNe => Value::Bool(!strict_equals(&left, &right)),
    }
}

fn arithmetic(left: Value, right: Value, f: impl Fn(f64, f64) -> f64) -> Value {
    Value::Number(f(
        to_primitive(left).to_number(),
        to_primitive(right).to_number(),
    ))
}

fn compare(left: Value, right: Value) -> Option<Ordering> {
    match (to_primitive(left), to_primitive(right)) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(&b)),
        (a, b) => a.to_number().partial_cmp(&b.to_number()),
    }
}
