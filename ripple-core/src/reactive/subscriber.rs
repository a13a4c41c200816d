//! Subscriber capability.
//!
//! A subscriber is anything that reruns when its dependencies change:
//! derivations and effects. The graph stores subscribers type-erased so the
//! runtime can pull a stale node without knowing its value type.

use crate::error::ReactiveError;

/// An evaluatable node.
pub(crate) trait Subscriber {
    /// Run the computation once inside the caller's tracking frame.
    ///
    /// Returns whether the node's observable output changed. Effects always
    /// report a change when they run; derivations compare against their
    /// cached value.
    fn evaluate(&self) -> Result<bool, ReactiveError>;
}
