//! Error reporting for directive bindings.
//!
//! A failing binding never aborts the walk or the flush it happens in. The
//! error is logged, recorded, and delivered once more on the next
//! [`tick`](crate::reactive::tick) through [`Diagnostics::take_uncaught`],
//! which is where a host hooks its uncaught-error reporting.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::error::DirectiveError;
use crate::reactive::queue_microtask;

#[derive(Debug, Default)]
pub struct Diagnostics {
    reported: RefCell<Vec<DirectiveError>>,
    uncaught: Rc<RefCell<Vec<DirectiveError>>>,
}

impl Diagnostics {
    pub(crate) fn report(&self, error: DirectiveError, loud: bool) {
        if loud {
            warn!(
                directive = %error.directive,
                expression = %error.expression,
                element = %error.element,
                error = %error.kind,
                "directive error"
            );
        } else {
            debug!(
                directive = %error.directive,
                expression = %error.expression,
                element = %error.element,
                error = %error.kind,
                "directive error"
            );
        }

        self.reported.borrow_mut().push(error.clone());
        let uncaught = Rc::clone(&self.uncaught);
        queue_microtask(move || uncaught.borrow_mut().push(error));
    }

    /// Every error reported so far, oldest first.
    pub fn reported(&self) -> Vec<DirectiveError> {
        self.reported.borrow().clone()
    }

    pub fn reported_count(&self) -> usize {
        self.reported.borrow().len()
    }

    /// Errors re-delivered by past ticks that nobody has taken yet.
    pub fn take_uncaught(&self) -> Vec<DirectiveError> {
        std::mem::take(&mut *self.uncaught.borrow_mut())
    }

    pub fn clear(&self) {
        self.reported.borrow_mut().clear();
        self.uncaught.borrow_mut().clear();
    }
}
