//! Error Types
//!
//! Every fallible operation in the engine returns [`ReactiveError`]. User code
//! running inside derivations and effects returns the same type, so reads can
//! be chained with `?` and custom failures are wrapped with
//! [`ReactiveError::custom`].

use crate::graph::NodeId;

/// Boxed error type used for failures raised by user computations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by the reactive engine.
#[derive(Debug, thiserror::Error)]
pub enum ReactiveError {
    /// Evaluating a node re-entered a node that is already evaluating, or an
    /// edge was about to close a cycle in the dependency graph.
    #[error("dependency cycle detected at node {node}")]
    CycleDetected { node: NodeId },

    /// A cell was written while a derivation's compute function was running.
    #[error("cell {cell} written while a derivation was computing")]
    WriteDuringComputation { cell: NodeId },

    /// A flush did not settle within the configured number of passes.
    #[error("flush did not settle after {limit} passes")]
    MaxFlushIterationsExceeded { limit: usize },

    /// A read, write or evaluation targeted a disposed node.
    #[error("node {node} has been disposed")]
    DisposedNodeAccess { node: NodeId },

    /// A failure raised by user code inside a compute or effect body.
    #[error(transparent)]
    Computation(#[from] BoxError),
}

impl ReactiveError {
    /// Wrap an arbitrary error raised by user code.
    pub fn custom<E>(error: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Computation(error.into())
    }

    /// Fatal errors abort the triggering operation and are never routed to
    /// the effect error hook.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::CycleDetected { .. }
                | Self::DisposedNodeAccess { .. }
                | Self::MaxFlushIterationsExceeded { .. }
        )
    }
}

/// Errors raised while loading a [`RuntimeConfig`](crate::config::RuntimeConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid runtime config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("max_flush_iterations must be at least 1")]
    ZeroFlushIterations,
}
