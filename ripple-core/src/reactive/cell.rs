//! Cell Implementation
//!
//! A Cell is the fundamental reactive primitive. It holds a value and a
//! version counter, and is the only place where state enters the graph.
//!
//! # How Cells Work
//!
//! 1. When a cell is read within a tracking frame (derivation/effect), the
//!    read is recorded and becomes a dependency edge once the evaluation ends.
//!
//! 2. Writing a value equal to the current one does nothing. Any other write
//!    bumps the version and marks every dependent stale.
//!
//! 3. Outside a batch, the write then flushes pending effects before
//!    returning.
//!
//! # Mutation
//!
//! `read` hands out a clone. Mutating that clone never reaches the cell; use
//! [`Cell::modify`] to edit the value in place and write it back.

use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;

use super::runtime::Runtime;
use crate::error::ReactiveError;
use crate::graph::{Node, NodeId};

/// A reactive cell holding a value of type T.
///
/// # Example
///
/// ```rust
/// use ripple_core::reactive::Cell;
///
/// let count = Cell::new(0);
/// count.write(5).unwrap();
/// count.update(|c| c + 1).unwrap();
/// assert_eq!(count.read().unwrap(), 6);
/// ```
pub struct Cell<T> {
    id: NodeId,

    /// The current value, shared by every clone of the handle.
    value: Rc<RefCell<T>>,
}

impl<T> Cell<T>
where
    T: Clone + PartialEq + 'static,
{
    /// Create a new cell with the given initial value. Its version starts at 0.
    pub fn new(value: T) -> Self {
        let id = Runtime::register(Node::cell());
        Self {
            id,
            value: Rc::new(RefCell::new(value)),
        }
    }

    /// Get the cell's node ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Get the current value.
    ///
    /// If called within a tracking frame, this also records the cell as a
    /// dependency of the evaluating node.
    pub fn read(&self) -> Result<T, ReactiveError> {
        Runtime::track_read(self.id)?;
        Ok(self.value.borrow().clone())
    }

    /// Get the current value without recording a dependency.
    pub fn peek(&self) -> Result<T, ReactiveError> {
        Runtime::ensure_live(self.id)?;
        Ok(self.value.borrow().clone())
    }

    /// Set a new value and propagate.
    ///
    /// Equal values are ignored. Fails with `WriteDuringComputation` when
    /// called from inside a derivation.
    pub fn write(&self, value: T) -> Result<(), ReactiveError> {
        Runtime::check_writable(self.id)?;

        {
            let mut current = self.value.borrow_mut();
            if *current == value {
                return Ok(());
            }
            *current = value;
        }

        Runtime::cell_changed(self.id)
    }

    /// Write a value computed from the current one.
    pub fn update<F>(&self, f: F) -> Result<(), ReactiveError>
    where
        F: FnOnce(&T) -> T,
    {
        let next = {
            let current = self.value.borrow();
            f(&current)
        };
        self.write(next)
    }

    /// Edit a copy of the current value in place and write it back.
    ///
    /// Handy for collections: `roster.modify(|chars| chars.push(goku))`.
    pub fn modify<F>(&self, f: F) -> Result<(), ReactiveError>
    where
        F: FnOnce(&mut T),
    {
        let mut next = self.value.borrow().clone();
        f(&mut next);
        self.write(next)
    }

    /// Number of value-changing writes so far. `None` once disposed.
    pub fn version(&self) -> Option<u64> {
        Runtime::version(self.id)
    }

    /// Remove the cell from the graph. Idempotent.
    pub fn dispose(&self) {
        Runtime::dispose(self.id);
    }

    /// Whether the cell has been disposed.
    pub fn is_disposed(&self) -> bool {
        !Runtime::is_live(self.id)
    }
}

impl<T> Clone for Cell<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            value: Rc::clone(&self.value),
        }
    }
}

impl<T> Debug for Cell<T>
where
    T: Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cell")
            .field("id", &self.id)
            .field("value", &*self.value.borrow())
            .field("version", &Runtime::version(self.id))
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
