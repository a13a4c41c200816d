//! Reactive Primitives
//!
//! This module implements the core reactive system: cells, derivations and
//! effects, plus the runtime that schedules them.
//!
//! # Concepts
//!
//! ## Cells
//!
//! A Cell is a container for mutable state. When a cell is read within a
//! tracking frame (a derivation or effect evaluating), the read is recorded
//! and becomes a dependency edge. Writing a different value notifies every
//! dependent.
//!
//! ## Derivations
//!
//! A Derivation is a derived value that caches its result. It re-evaluates
//! only when one of its dependencies actually changed, and only when read.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies settle to a new value. Effects are used to synchronize
//! reactive state with external systems, such as rendering or logging.
//!
//! # Guarantees
//!
//! - Glitch freedom: an effect never observes a mix of old and new upstream
//!   values. Dependencies are settled before it runs.
//! - No duplicate work: within one flush pass each node evaluates at most
//!   once, even in diamond-shaped graphs.
//! - Pruning: equal writes and equal recomputes stop propagation.
//!
//! # Implementation Notes
//!
//! The reactive system uses a thread-local tracking stack to detect
//! dependencies automatically, and a thread-local runtime owning the
//! dependency graph.

mod cell;
mod context;
mod derivation;
mod effect;
mod handle;
mod runtime;
mod subscriber;

pub use cell::Cell;
pub use derivation::Derivation;
pub use effect::Effect;
pub use handle::{
    batch, create_cell, create_derivation, create_effect, dispose, flush, on_effect_error, read,
    untrack, write, Disposable, Readable,
};
pub use runtime::{Runtime, RuntimeStats};

pub(crate) use subscriber::Subscriber;
