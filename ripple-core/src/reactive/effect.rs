//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies settle to a new value.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies.
//!
//! 2. When any dependency goes stale, the effect is queued for the next
//!    flush. Queueing is idempotent.
//!
//! 3. During the flush the effect's dependencies are settled first. If none
//!    of them ended up with a new value, the effect does not run.
//!
//! 4. Each run records a fresh dependency set; branches no longer taken stop
//!    triggering it.
//!
//! # Use Cases
//!
//! Effects are where the outside world is touched: rendering, logging,
//! kicking off a fetch. The engine treats the body as a black box and only
//! decides when it runs.
//!
//! # Errors
//!
//! An error returned by the body is handed to the runtime's effect error hook
//! and the rest of the flush carries on. Fatal errors (cycles, disposed
//! access, runaway flushes) abort the flush instead.

use std::cell::{Cell as Counter, RefCell};
use std::rc::Rc;

use super::runtime::Runtime;
use super::subscriber::Subscriber;
use crate::error::ReactiveError;
use crate::graph::{Node, NodeId};

type RunFn = Box<dyn FnMut() -> Result<(), ReactiveError>>;

struct EffectInner {
    run: RefCell<RunFn>,

    /// Number of times the body has been invoked.
    run_count: Counter<usize>,
}

impl Subscriber for EffectInner {
    fn evaluate(&self) -> Result<bool, ReactiveError> {
        let mut run = self
            .run
            .try_borrow_mut()
            .map_err(|_| ReactiveError::custom("effect re-entered its own run"))?;
        self.run_count.set(self.run_count.get() + 1);
        run()?;
        Ok(true)
    }
}

/// A side-effecting computation that runs when dependencies change.
///
/// # Example
///
/// ```rust
/// use ripple_core::reactive::{Cell, Effect};
///
/// let count = Cell::new(0);
/// let count_in_effect = count.clone();
///
/// let effect = Effect::new(move || {
///     println!("Count is: {}", count_in_effect.read()?);
///     Ok(())
/// })
/// .unwrap();
///
/// count.write(5).unwrap(); // Prints: "Count is: 5"
/// assert_eq!(effect.run_count(), 2);
/// ```
pub struct Effect {
    id: NodeId,
    inner: Rc<EffectInner>,
}

impl Effect {
    /// Create a new effect and run it once.
    ///
    /// An error returned by the first run is reported through the error hook
    /// like any later one, and the effect is still created. A fatal error
    /// (for example a cycle) disposes the effect and is returned.
    pub fn new<F>(run: F) -> Result<Self, ReactiveError>
    where
        F: FnMut() -> Result<(), ReactiveError> + 'static,
    {
        let inner = Rc::new(EffectInner {
            run: RefCell::new(Box::new(run)),
            run_count: Counter::new(0),
        });
        let id = Runtime::register(Node::effect(inner.clone()));
        let effect = Self { id, inner };

        // Writes made by the first run flush once it has finished.
        let outcome = Runtime::batch(|| match Runtime::settle(id) {
            Err(err) if !err.is_fatal() => {
                Runtime::report_effect_error(id, err);
                Ok(())
            }
            other => other,
        });

        match outcome {
            Ok(Ok(())) => Ok(effect),
            Ok(Err(err)) | Err(err) => {
                effect.dispose();
                Err(err)
            }
        }
    }

    /// Get the effect's node ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Detach the effect from the graph.
    ///
    /// After disposal the effect never runs again. Calling this from inside
    /// the effect's own body lets the current run finish.
    pub fn dispose(&self) {
        Runtime::dispose(self.id);
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        !Runtime::is_live(self.id)
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.get()
    }

    /// Get the number of dependencies recorded by the latest run.
    pub fn dependency_count(&self) -> usize {
        Runtime::dependency_count(self.id)
    }
}

impl Clone for Effect {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            inner: Rc::clone(&self.inner),
        }
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
