//! In-memory DOM
//!
//! The live tree the directive runtime mutates. It covers what directives
//! touch: element and text nodes, ordered attributes, child insertion,
//! removal and replacement, cloning, class and inline-style helpers, form
//! `value`/`checked` properties and bubbling events. The HTML fragment
//! parser builds trees from template markup.

mod event;
mod html;
mod node;

pub use event::Event;
pub use html::{parse_element, parse_html};
pub use node::{ListenerId, Node, NodeId};
