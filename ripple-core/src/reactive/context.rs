//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a cell or derivation is
//! read, we record it against the computation on top of the stack.
//!
//! # Implementation
//!
//! We use a thread-local stack of frames. Evaluating a derivation or effect
//! pushes a frame owned by that node; when the computation completes the
//! frame is popped and its recorded reads become the node's new dependency
//! set. [`untrack`](super::untrack) pushes an ownerless frame so reads inside
//! it are not recorded.
//!
//! Nested frames are normal: a derivation evaluated on first read from inside
//! an effect gets its own frame above the effect's.

use std::cell::RefCell;

use indexmap::IndexMap;

use crate::graph::{NodeId, NodeKind};

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = const { RefCell::new(Vec::new()) };
}

/// An entry in the reactive context stack.
#[derive(Debug, Clone)]
struct ContextEntry {
    /// The evaluating node, `None` for untracked scopes.
    owner: Option<(NodeId, NodeKind)>,
    /// Nodes read so far, in read order, with the version seen.
    dependencies: IndexMap<NodeId, u64>,
}

/// Guard that pops its frame when dropped.
///
/// This keeps the stack balanced even if the computation panics.
pub(crate) struct ReactiveContext {
    owner: Option<NodeId>,
}

impl ReactiveContext {
    /// Enter a tracking frame for the given node.
    pub(crate) fn enter(node: NodeId, kind: NodeKind) -> Self {
        Self::push(Some((node, kind)))
    }

    /// Enter a frame that records nothing.
    pub(crate) fn untracked() -> Self {
        Self::push(None)
    }

    fn push(owner: Option<(NodeId, NodeKind)>) -> Self {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(ContextEntry {
                owner,
                dependencies: IndexMap::new(),
            });
        });

        Self {
            owner: owner.map(|(id, _)| id),
        }
    }

    /// Check if reads are currently being recorded.
    #[cfg(test)]
    pub(crate) fn is_active() -> bool {
        Self::current_subscriber().is_some()
    }

    /// Get the node whose reads are being recorded, if any.
    #[cfg(test)]
    pub(crate) fn current_subscriber() -> Option<NodeId> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .and_then(|entry| entry.owner.map(|(id, _)| id))
        })
    }

    /// Whether a derivation's compute function is anywhere on the stack.
    pub(crate) fn is_computing() -> bool {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .iter()
                .any(|entry| matches!(entry.owner, Some((_, NodeKind::Derivation))))
        })
    }

    /// Record a read of `node` at `version` in the current frame.
    ///
    /// A node read twice keeps its first position and its latest version.
    pub(crate) fn track_dependency(node: NodeId, version: u64) {
        CONTEXT_STACK.with(|stack| {
            if let Some(entry) = stack.borrow_mut().last_mut() {
                if entry.owner.is_some() {
                    entry.dependencies.insert(node, version);
                }
            }
        });
    }

    /// Get the dependencies collected in the current frame.
    #[cfg(test)]
    pub(crate) fn get_dependencies() -> Vec<NodeId> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .map(|entry| entry.dependencies.keys().copied().collect())
                .unwrap_or_default()
        })
    }

    /// Close the frame and hand back everything it recorded.
    pub(crate) fn finish(self) -> IndexMap<NodeId, u64> {
        let dependencies = CONTEXT_STACK.with(|stack| {
            stack
                .borrow_mut()
                .last_mut()
                .map(|entry| std::mem::take(&mut entry.dependencies))
                .unwrap_or_default()
        });
        drop(self);
        dependencies
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        // The stack may already be gone during thread teardown.
        let _ = CONTEXT_STACK.try_with(|stack| {
            let popped = stack.borrow_mut().pop();

            if let Some(entry) = popped {
                debug_assert_eq!(
                    entry.owner.map(|(id, _)| id),
                    self.owner,
                    "ReactiveContext mismatch"
                );
            }
        });
    }
}
