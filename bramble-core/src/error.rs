//! Error types for Bramble
//!
//! Expression errors never abort a tree walk or a flush: the directive
//! runtime catches them at the binding boundary, wraps them in a
//! [`DirectiveError`] and reports them through its diagnostics channel.

use thiserror::Error;

/// Malformed expression text, detected when the expression is compiled.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message} at offset {offset}")]
pub struct CompileError {
    /// What the parser expected or rejected.
    pub message: String,

    /// Byte offset into the expression text.
    pub offset: usize,
}

impl CompileError {
    pub fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
        }
    }
}

/// Failure while running a compiled expression against a scope.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("Type error: {0}")]
    TypeError(String),

    #[error("{0} is not a function")]
    NotCallable(String),

    #[error("Invalid assignment target: {0}")]
    InvalidAssignment(String),

    #[error("Cannot iterate over {0}")]
    InvalidIteration(String),

    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),
}

/// An expression error annotated with the binding that hit it.
#[derive(Error, Debug, Clone)]
#[error("{directive}=\"{expression}\" on {element}: {kind}")]
pub struct DirectiveError {
    /// Directive attribute name, prefix included.
    pub directive: String,

    /// The raw attribute value.
    pub expression: String,

    /// Short description of the element, e.g. `<li class="item">`.
    pub element: String,

    #[source]
    pub kind: EvalError,
}

/// Malformed HTML handed to the fragment parser.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HtmlError {
    #[error("Unexpected end of input")]
    UnexpectedEnd,

    #[error("Unterminated comment at offset {offset}")]
    UnterminatedComment { offset: usize },

    #[error("Invalid attribute at offset {offset}")]
    InvalidAttribute { offset: usize },

    #[error("Expected </{expected}>, found </{found}> at offset {offset}")]
    MismatchedTag {
        expected: String,
        found: String,
        offset: usize,
    },

    #[error("Unclosed <{tag}>")]
    UnclosedTag { tag: String },

    #[error("Fragment contains no element")]
    NoElement,
}

/// Top-level error type for host-facing operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Attach target is not an element")]
    NotAnElement,

    #[error("Invalid markup: {0}")]
    Html(#[from] HtmlError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error(transparent)]
    Directive(#[from] DirectiveError),
}

/// Result type alias for host-facing operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;
