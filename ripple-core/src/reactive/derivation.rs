//! Derivation Implementation
//!
//! A Derivation is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Derivations Work
//!
//! 1. Creation does not run anything. The derivation starts dirty.
//!
//! 2. On first read, the compute function runs inside a tracking frame and
//!    the result is cached. Whatever it read becomes its dependency set.
//!
//! 3. When an upstream cell changes, the derivation is marked stale.
//!
//! 4. On next read, the derivation settles its dependencies and compares
//!    their versions with the ones it saw last time. Only a real change
//!    triggers a recompute.
//!
//! 5. A recompute that produces an equal value keeps the old version, so
//!    nothing downstream re-runs.
//!
//! Derivations that are never read never compute, no matter how often their
//! inputs change.

use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;

use super::runtime::Runtime;
use super::subscriber::Subscriber;
use crate::error::ReactiveError;
use crate::graph::{Node, NodeId, NodeState};

type ComputeFn<T> = Box<dyn Fn() -> Result<T, ReactiveError>>;

struct DerivationInner<T> {
    compute: ComputeFn<T>,

    /// The cached value (None if never computed).
    value: RefCell<Option<T>>,
}

impl<T> Subscriber for DerivationInner<T>
where
    T: PartialEq,
{
    fn evaluate(&self) -> Result<bool, ReactiveError> {
        let next = (self.compute)()?;

        let mut cached = self.value.borrow_mut();
        if cached.as_ref() == Some(&next) {
            return Ok(false);
        }
        *cached = Some(next);
        Ok(true)
    }
}

/// A cached derived value that recomputes only when dependencies change.
///
/// The `PartialEq` bound is what lets an unchanged result stop propagation.
///
/// # Example
///
/// ```rust
/// use ripple_core::reactive::{Cell, Derivation};
///
/// let name = Cell::new(String::from("Jao"));
/// let shout = {
///     let name = name.clone();
///     Derivation::new(move || Ok(name.read()?.to_uppercase()))
/// };
///
/// assert_eq!(shout.read().unwrap(), "JAO");
/// name.write(String::from("Bao")).unwrap();
/// assert_eq!(shout.read().unwrap(), "BAO");
/// ```
pub struct Derivation<T> {
    id: NodeId,
    inner: Rc<DerivationInner<T>>,
}

impl<T> Derivation<T>
where
    T: Clone + PartialEq + 'static,
{
    /// Create a new derivation. The compute function is not run until the
    /// first read.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> Result<T, ReactiveError> + 'static,
    {
        let inner = Rc::new(DerivationInner {
            compute: Box::new(compute),
            value: RefCell::new(None),
        });
        let id = Runtime::register(Node::derivation(inner.clone()));
        Self { id, inner }
    }

    /// Get the derivation's node ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// Inside a tracking frame the derivation is also recorded as a
    /// dependency. Compute errors and cycles are returned to the caller.
    /// A failed compute is still recorded, so the reader retries once the
    /// derivation's inputs change.
    pub fn read(&self) -> Result<T, ReactiveError> {
        if let Err(err) = Runtime::settle(self.id) {
            if !err.is_fatal() {
                Runtime::track_read(self.id)?;
            }
            return Err(err);
        }
        Runtime::track_read(self.id)?;
        self.cached()
    }

    /// Get the settled value without recording a dependency.
    pub fn peek(&self) -> Result<T, ReactiveError> {
        Runtime::settle(self.id)?;
        self.cached()
    }

    fn cached(&self) -> Result<T, ReactiveError> {
        self.inner
            .value
            .borrow()
            .clone()
            .ok_or(ReactiveError::DisposedNodeAccess { node: self.id })
    }

    /// Check if the derivation has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner.value.borrow().is_some()
    }

    /// Current freshness. `None` once disposed.
    pub fn state(&self) -> Option<NodeState> {
        Runtime::node_state(self.id)
    }

    /// Number of recomputes that produced a new value. `None` once disposed.
    pub fn version(&self) -> Option<u64> {
        Runtime::version(self.id)
    }

    /// Remove the derivation from the graph. Idempotent.
    pub fn dispose(&self) {
        Runtime::dispose(self.id);
    }

    pub fn is_disposed(&self) -> bool {
        !Runtime::is_live(self.id)
    }
}

impl<T> Clone for Derivation<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Derivation<T>
where
    T: Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Derivation")
            .field("id", &self.id)
            .field("state", &Runtime::node_state(self.id))
            .field("value", &*self.inner.value.borrow())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
