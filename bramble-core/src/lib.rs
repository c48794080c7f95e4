//! Bramble Core
//!
//! This crate provides the runtime for Bramble, a small declarative UI
//! library that binds plain data to markup through directive attributes.
//! It implements:
//!
//! - Reactive primitives (signals, computeds, effects) with microtask
//!   batched scheduling
//! - A reactive store that wraps plain nested data into signal-backed
//!   proxies
//! - The directive runtime: tree walk, `if`/`else-if`/`else`, keyed `each`,
//!   scopes, refs and the leaf directives
//! - A small expression language for directive attribute values
//! - An in-memory DOM the directives operate on
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Core reactive primitives and dependency tracking
//! - `store`: Values, plain data and the proxies that make it reactive
//! - `expr`: Expression lexer, parser and evaluator
//! - `directive`: Tree walk, binding table and the built-in directives
//! - `dom`: Nodes, events and the HTML fragment parser
//!
//! Everything is single-threaded: runtimes, proxies and nodes are `Rc`
//! based and the scheduler is thread-local.
//!
//! # Example
//!
//! ```rust
//! use bramble_core::dom::parse_element;
//! use bramble_core::store::PlainObject;
//! use bramble_core::{tick, Directives};
//!
//! let root = parse_element(r#"<p :text="greeting + ', ' + name"></p>"#).unwrap();
//! let runtime = Directives::new();
//! let handle = runtime
//!     .attach(
//!         &root,
//!         PlainObject::new().with("greeting", "Hello").with("name", "world"),
//!     )
//!     .unwrap();
//! assert_eq!(root.text_content(), "Hello, world");
//!
//! handle.set("name", "Bramble");
//! // Effects run on the next tick.
//! tick();
//! assert_eq!(root.text_content(), "Hello, Bramble");
//! ```

pub mod config;
pub mod directive;
pub mod dom;
pub mod error;
pub mod expr;
pub mod reactive;
pub mod store;

pub use config::Config;
pub use directive::{attach, Directives, ScopeHandle};
pub use error::{Error, Result};
pub use reactive::{batch, computed, effect, signal, tick, untracked};
pub use store::{wrap, Value};
