//! `scope` and `ref`: directives that shape the scope instead of the DOM.

use tracing::trace;

use crate::error::EvalError;
use crate::reactive::untracked;
use crate::store::{wrap_object, Object, Value};

use super::{Bound, Flow, Site};

/// Introduce a child scope for the element and its descendants.
///
/// The expression is evaluated once. A plain object becomes the new scope
/// with the current one as its parent; an existing proxy has its entries
/// copied into a fresh child scope, so the proxy's own parent is left alone.
pub(super) fn bind_scope(site: &Site<'_>) -> Bound {
    let Some(evaluator) = site.compile() else {
        return Bound::none();
    };
    let info = site.info();
    let Some(value) = untracked(|| site.runtime.evaluate(&info, &evaluator, site.scope)) else {
        return Bound::none();
    };

    let scope = match value {
        Value::Undefined | Value::Null => return Bound::none(),
        Value::PlainObject(plain) => wrap_object(plain, Some(site.scope)),
        Value::Object(object) => Object::child(site.scope, untracked(|| object.entries())),
        other => {
            site.runtime.report(
                &info,
                EvalError::TypeError(format!("scope must be an object, got {}", other.type_of())),
            );
            return Bound::none();
        }
    };

    trace!(element = %site.element.describe(), "scope");
    Bound::none().with_flow(Flow::Rescope(scope))
}

/// Expose the element to expressions under the given name.
pub(super) fn bind_ref(site: &Site<'_>) -> Bound {
    let name = site.expression.trim();
    if name.is_empty() {
        site.runtime.report(
            &site.info(),
            EvalError::TypeError("ref needs a name".to_string()),
        );
        return Bound::none();
    }
    site.scope.define(name, Value::Node(site.element.clone()));
    Bound::none()
}
