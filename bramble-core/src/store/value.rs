//! Dynamic values flowing through the store and the expression evaluator.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::dom::Node;
use crate::error::EvalError;

use super::array::Array;
use super::object::Object;
use super::plain::{PlainArray, PlainObject, Property};

/// Signature of a callable value.
pub type NativeFn = dyn Fn(&[Value]) -> Result<Value, EvalError>;

/// A callable value: a builtin, a host callback or an arrow function.
#[derive(Clone)]
pub struct Function {
    name: Rc<str>,
    call: Rc<NativeFn>,
}

impl Function {
    pub fn new(
        name: impl Into<Rc<str>>,
        call: impl Fn(&[Value]) -> Result<Value, EvalError> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            call: Rc::new(call),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, args: &[Value]) -> Result<Value, EvalError> {
        (self.call)(args)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.call), Rc::as_ptr(&other.call))
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Function({})", self.name)
    }
}

/// A dynamically typed value.
///
/// Plain variants hold data that has not been wrapped yet; `Object` and
/// `Array` are the signal-backed proxies produced by [`wrap`](super::wrap).
/// Everything else passes through the store untouched.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Object(Object),
    Array(Array),
    PlainObject(PlainObject),
    PlainArray(PlainArray),
    Function(Function),
    Node(Node),
    Opaque(Rc<dyn Any>),
}

/// Identity of a value, usable as a hash key.
///
/// Primitives are keyed by content, everything else by reference. Two
/// values have the same identity exactly when they are `SameValue`-equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    Undefined,
    Null,
    Bool(bool),
    Number(u64),
    String(Rc<str>),
    Ref(usize),
}

impl Value {
    pub fn str(s: &str) -> Self {
        Value::String(Rc::from(s))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    /// Whether the value is an ordered sequence, plain or wrapped.
    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_) | Value::PlainArray(_))
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// The `typeof` tag.
    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Function(_) => "function",
            _ => "object",
        }
    }

    /// Numeric conversion with the usual loose rules.
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    trimmed.parse().unwrap_or(f64::NAN)
                }
            }
            _ => f64::NAN,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Value::Node(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn identity(&self) -> Identity {
        match self {
            Value::Undefined => Identity::Undefined,
            Value::Null => Identity::Null,
            Value::Bool(b) => Identity::Bool(*b),
            Value::Number(n) if n.is_nan() => Identity::Number(f64::NAN.to_bits()),
            Value::Number(n) => Identity::Number(n.to_bits()),
            Value::String(s) => Identity::String(s.clone()),
            Value::Object(o) => Identity::Ref(o.addr()),
            Value::Array(a) => Identity::Ref(a.addr()),
            Value::PlainObject(p) => Identity::Ref(p.addr()),
            Value::PlainArray(p) => Identity::Ref(p.addr()),
            Value::Function(f) => Identity::Ref(Rc::as_ptr(&f.call) as *const () as usize),
            Value::Node(n) => Identity::Ref(n.addr()),
            Value::Opaque(o) => Identity::Ref(Rc::as_ptr(o) as *const () as usize),
        }
    }

    /// Snapshot the value as JSON.
    ///
    /// Reads through proxies are tracked like any other read. `undefined`
    /// object members are skipped; `undefined` array items, functions and
    /// non-finite numbers become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;

        match self {
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(|num| {
                    if n.fract() == 0.0 && n.abs() < 9.0e15 {
                        Json::from(*n as i64)
                    } else {
                        Json::Number(num)
                    }
                })
                .unwrap_or(Json::Null),
            Value::String(s) => Json::String(s.to_string()),
            Value::Object(o) => Json::Object(
                o.entries()
                    .into_iter()
                    .filter(|(_, v)| !v.is_undefined())
                    .map(|(k, v)| (k, v.to_json()))
                    .collect(),
            ),
            Value::Array(a) => Json::Array(a.to_vec().iter().map(Value::to_json).collect()),
            Value::PlainObject(p) => Json::Object(
                p.entries()
                    .into_iter()
                    .filter_map(|(k, prop)| match prop {
                        Property::Data(v) if !v.is_undefined() => Some((k, v.to_json())),
                        _ => None,
                    })
                    .collect(),
            ),
            Value::PlainArray(p) => Json::Array(p.to_vec().iter().map(Value::to_json).collect()),
            _ => Json::Null,
        }
    }

    /// Convert JSON into plain (unwrapped) data.
    pub fn from_json(json: &serde_json::Value) -> Self {
        use serde_json::Value as Json;

        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Value::str(s),
            Json::Array(items) => {
                Value::PlainArray(items.iter().map(Value::from_json).collect())
            }
            Json::Object(map) => {
                let plain = PlainObject::new();
                for (key, value) in map {
                    plain.insert(key, Value::from_json(value));
                }
                Value::PlainObject(plain)
            }
        }
    }
}

/// `SameValue` comparison: references by identity, NaN equal to itself,
/// +0 distinct from -0.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => same_number(*a, *b),
            (Value::String(a), Value::String(b)) => a == b,
            _ => self.identity() == other.identity(),
        }
    }
}

fn same_number(a: f64, b: f64) -> bool {
    if a.is_nan() && b.is_nan() {
        return true;
    }
    if a == 0.0 && b == 0.0 {
        return a.is_sign_negative() == b.is_sign_negative();
    }
    a == b
}

/// Format a number the way templates expect: integers without a fraction,
/// `NaN`, `Infinity`.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{n:.0}")
    } else {
        n.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::String(s) => f.write_str(s),
            Value::Array(a) => write_joined(f, &a.to_vec()),
            Value::PlainArray(p) => write_joined(f, &p.to_vec()),
            Value::Object(_) | Value::PlainObject(_) => f.write_str("[object Object]"),
            Value::Function(func) => write!(f, "function {}() {{}}", func.name()),
            Value::Node(_) => f.write_str("[object Node]"),
            Value::Opaque(_) => f.write_str("[object Opaque]"),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[Value]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(",")?;
        }
        if !item.is_nullish() {
            write!(f, "{item}")?;
        }
    }
    Ok(())
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Object(o) => write!(f, "{o:?}"),
            Value::Array(a) => write!(f, "{a:?}"),
            Value::PlainObject(p) => write!(f, "{p:?}"),
            Value::PlainArray(p) => write!(f, "{p:?}"),
            Value::Function(func) => write!(f, "{func:?}"),
            Value::Node(n) => write!(f, "{n:?}"),
            Value::Opaque(_) => f.write_str("Opaque"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<Object> for Value {
    fn from(o: Object) -> Self {
        Value::Object(o)
    }
}

impl From<Array> for Value {
    fn from(a: Array) -> Self {
        Value::Array(a)
    }
}

impl From<PlainObject> for Value {
    fn from(p: PlainObject) -> Self {
        Value::PlainObject(p)
    }
}

impl From<PlainArray> for Value {
    fn from(p: PlainArray) -> Self {
        Value::PlainArray(p)
    }
}

impl From<Function> for Value {
    fn from(f: Function) -> Self {
        Value::Function(f)
    }
}

impl From<Node> for Value {
    fn from(n: Node) -> Self {
        Value::Node(n)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_same_value() {
        assert_eq!(Value::Number(f64::NAN), Value::Number(f64::NAN));
        assert_ne!(Value::Number(0.0), Value::Number(-0.0));
        assert_eq!(Value::str("a"), Value::from("a".to_string()));
        assert_ne!(Value::Null, Value::Undefined);

        let a = PlainObject::new();
        let b = PlainObject::new();
        assert_eq!(Value::from(a.clone()), Value::from(a));
        assert_ne!(Value::from(b), Value::from(PlainObject::new()));
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Undefined.truthy());
        assert!(!Value::Number(0.0).truthy());
        assert!(!Value::Number(f64::NAN).truthy());
        assert!(!Value::str("").truthy());
        assert!(Value::str("0").truthy());
        assert!(Value::from(PlainArray::new()).truthy());
    }

    #[test]
    fn numbers_display_like_templates_expect() {
        assert_eq!(Value::from(3).to_string(), "3");
        assert_eq!(Value::from(-0.0).to_string(), "0");
        assert_eq!(Value::from(2.5).to_string(), "2.5");
        assert_eq!(Value::from(f64::INFINITY).to_string(), "Infinity");
        assert_eq!(
            Value::from(PlainArray::from(vec![Value::from(1), Value::Null, Value::from("x")]))
                .to_string(),
            "1,,x"
        );
    }

    #[test]
    fn loose_number_conversion() {
        assert_eq!(Value::str(" 42 ").to_number(), 42.0);
        assert_eq!(Value::str("").to_number(), 0.0);
        assert!(Value::str("4x").to_number().is_nan());
        assert_eq!(Value::Bool(true).to_number(), 1.0);
    }

    #[test]
    fn json_conversion_keeps_shape() {
        let json = serde_json::json!({"a": 1, "b": [true, null, "x"], "c": {"d": 2.5}});
        let value = Value::from_json(&json);
        assert!(matches!(value, Value::PlainObject(_)));
        assert_eq!(value.to_json(), json);
    }
}
