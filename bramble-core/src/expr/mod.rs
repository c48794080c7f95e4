//! Expression Language
//!
//! Directive attribute values are small expressions evaluated against a
//! scope [`Object`]. The directive runtime only talks to this module through
//! the [`Compile`] trait: it hands over the attribute text once, gets back an
//! [`Evaluator`], and runs that evaluator as often as it likes.
//!
//! [`ExprCompiler`] is the built-in implementation: a tokenizer, a
//! recursive-descent parser and a tree-walking evaluator over [`Expr`].
//!
//! # Example
//!
//! ```
//! use bramble_core::expr::{Compile, ExprCompiler};
//! use bramble_core::store::{wrap_object, PlainObject, Value};
//!
//! let scope = wrap_object(PlainObject::new().with("count", 2), None);
//! let double = ExprCompiler.compile("count * 2").unwrap();
//! assert_eq!(double.evaluate(&scope, None).unwrap(), Value::from(4));
//! ```

pub mod ast;
pub mod eval;
pub mod lexer;
pub mod parser;

use std::fmt;
use std::rc::Rc;

use crate::dom::Node;
use crate::error::{CompileError, EvalError};
use crate::store::{Object, Value};

pub use ast::Expr;
pub use eval::{display, get_member, loose_equals, set_member, strict_equals, Env, Evaluate};
pub use parser::parse;

type EvaluateFn = dyn Fn(&Object, Option<&Node>) -> Result<Value, EvalError>;

/// A compiled expression, ready to run against any scope.
#[derive(Clone)]
pub struct Evaluator(Rc<EvaluateFn>);

impl Evaluator {
    pub fn new(
        f: impl Fn(&Object, Option<&Node>) -> Result<Value, EvalError> + 'static,
    ) -> Self {
        Self(Rc::new(f))
    }

    /// Run the expression. `this` is the element the directive sits on.
    pub fn evaluate(&self, scope: &Object, this: Option<&Node>) -> Result<Value, EvalError> {
        (self.0)(scope, this)
    }
}

impl fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Evaluator")
    }
}

/// Turns expression text into an [`Evaluator`].
pub trait Compile {
    fn compile(&self, src: &str) -> Result<Evaluator, CompileError>;
}

/// The built-in expression language.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExprCompiler;

impl Compile for ExprCompiler {
    fn compile(&self, src: &str) -> Result<Evaluator, CompileError> {
        let expr = Rc::new(parse(src)?);
        Ok(Evaluator::new(move |scope, this| {
            let this = this.cloned().map(Value::Node).unwrap_or_default();
            expr.eval(&Env {
                scope,
                this: &this,
            })
        }))
    }
}
