//! Handle capabilities and the free-function surface.
//!
//! Collaborating code mostly needs two things from a handle: read it, or
//! dispose it. Those are the [`Readable`] and [`Disposable`] traits; the
//! functions below are thin wrappers so event handlers and render paths can
//! be written without naming concrete handle types.

use super::cell::Cell;
use super::context::ReactiveContext;
use super::derivation::Derivation;
use super::effect::Effect;
use super::runtime::Runtime;
use crate::error::ReactiveError;
use crate::graph::NodeId;

/// A node whose value can be read.
pub trait Readable<T> {
    fn node_id(&self) -> NodeId;

    /// Read the value, recording a dependency when inside a tracking frame.
    fn read(&self) -> Result<T, ReactiveError>;
}

/// A node that can be removed from the graph.
pub trait Disposable {
    fn dispose(&self);

    fn is_disposed(&self) -> bool;
}

impl<T> Readable<T> for Cell<T>
where
    T: Clone + PartialEq + 'static,
{
    fn node_id(&self) -> NodeId {
        self.id()
    }

    fn read(&self) -> Result<T, ReactiveError> {
        Cell::read(self)
    }
}

impl<T> Readable<T> for Derivation<T>
where
    T: Clone + PartialEq + 'static,
{
    fn node_id(&self) -> NodeId {
        self.id()
    }

    fn read(&self) -> Result<T, ReactiveError> {
        Derivation::read(self)
    }
}

impl<T> Disposable for Cell<T>
where
    T: Clone + PartialEq + 'static,
{
    fn dispose(&self) {
        Cell::dispose(self);
    }

    fn is_disposed(&self) -> bool {
        Cell::is_disposed(self)
    }
}

impl<T> Disposable for Derivation<T>
where
    T: Clone + PartialEq + 'static,
{
    fn dispose(&self) {
        Derivation::dispose(self);
    }

    fn is_disposed(&self) -> bool {
        Derivation::is_disposed(self)
    }
}

impl Disposable for Effect {
    fn dispose(&self) {
        Effect::dispose(self);
    }

    fn is_disposed(&self) -> bool {
        Effect::is_disposed(self)
    }
}

pub fn create_cell<T>(initial: T) -> Cell<T>
where
    T: Clone + PartialEq + 'static,
{
    Cell::new(initial)
}

pub fn create_derivation<T, F>(compute: F) -> Derivation<T>
where
    T: Clone + PartialEq + 'static,
    F: Fn() -> Result<T, ReactiveError> + 'static,
{
    Derivation::new(compute)
}

pub fn create_effect<F>(run: F) -> Result<Effect, ReactiveError>
where
    F: FnMut() -> Result<(), ReactiveError> + 'static,
{
    Effect::new(run)
}

pub fn read<T, H>(handle: &H) -> Result<T, ReactiveError>
where
    H: Readable<T> + ?Sized,
{
    handle.read()
}

pub fn write<T>(cell: &Cell<T>, value: T) -> Result<(), ReactiveError>
where
    T: Clone + PartialEq + 'static,
{
    cell.write(value)
}

pub fn dispose<H>(handle: &H)
where
    H: Disposable + ?Sized,
{
    handle.dispose();
}

/// Coalesce the writes made by `f` into a single flush.
pub fn batch<R>(f: impl FnOnce() -> R) -> Result<R, ReactiveError> {
    Runtime::batch(f)
}

/// Settle every pending effect now.
pub fn flush() -> Result<(), ReactiveError> {
    Runtime::flush()
}

/// Run `f` without recording any of its reads as dependencies.
pub fn untrack<R>(f: impl FnOnce() -> R) -> R {
    let _ctx = ReactiveContext::untracked();
    f()
}

/// Install the handler for errors returned by effect bodies.
pub fn on_effect_error<F>(handler: F)
where
    F: Fn(NodeId, &ReactiveError) + 'static,
{
    Runtime::on_effect_error(handler);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn readable_handles_are_interchangeable() {
        let base = create_cell(3);
        let base_clone = base.clone();
        let tripled = create_derivation(move || Ok(base_clone.read()? * 3));

        let sources: Vec<Box<dyn Readable<i32>>> = vec![Box::new(base.clone()), Box::new(tripled)];
        let values: Vec<i32> = sources.iter().map(|s| read(s.as_ref()).unwrap()).collect();
        assert_eq!(values, vec![3, 9]);
    }

    #[test]
    fn dispose_through_trait_object() {
        let cell = create_cell(0);
        let effect = create_effect(|| Ok(())).unwrap();

        let handles: Vec<Rc<dyn Disposable>> = vec![Rc::new(cell.clone()), Rc::new(effect.clone())];
        for handle in &handles {
            dispose(handle.as_ref());
        }
        assert!(handles.iter().all(|h| h.is_disposed()));
        assert!(matches!(write(&cell, 1), Err(ReactiveError::DisposedNodeAccess { .. })));
    }

    #[test]
    fn untrack_hides_reads() {
        let tracked = create_cell(1);
        let hidden = create_cell(10);
        let (tracked_clone, hidden_clone) = (tracked.clone(), hidden.clone());

        let effect = create_effect(move || {
            let _ = tracked_clone.read()? + untrack(|| hidden_clone.read())?;
            Ok(())
        })
        .unwrap();

        write(&hidden, 20).unwrap();
        assert_eq!(effect.run_count(), 1);
        write(&tracked, 2).unwrap();
        assert_eq!(effect.run_count(), 2);
    }
}
