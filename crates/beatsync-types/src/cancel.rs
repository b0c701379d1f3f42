use std::cell::Cell;
use std::rc::Rc;

/// Cooperative cancellation signal for pollable operations.
///
/// Tokens are cheap to clone; clones share the same flag. A child token
/// observes its own flag and every ancestor's, so cancelling a transition
/// also cancels the loads and fades it spawned.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    node: Rc<Node>,
}

#[derive(Debug, Default)]
struct Node {
    cancelled: Cell<bool>,
    parent: Option<Rc<Node>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a token that is cancelled whenever `self` is.
    pub fn child(&self) -> Self {
        Self {
            node: Rc::new(Node {
                cancelled: Cell::new(false),
                parent: Some(Rc::clone(&self.node)),
            }),
        }
    }

    pub fn cancel(&self) {
        self.node.cancelled.set(true);
    }

    pub fn is_cancelled(&self) -> bool {
        let mut node = Some(&self.node);
        while let Some(n) = node {
            if n.cancelled.get() {
                return true;
            }
            node = n.parent.as_ref();
        }
        false
    }
}
