//! Ripple Core
//!
//! This crate provides a glitch-free reactive state-propagation engine.
//! It implements:
//!
//! - Reactive primitives (cells, derivations, effects)
//! - A dependency graph with dynamic edges and topological heights
//! - A two-phase scheduler: mark stale on write, pull and flush on demand
//! - Batching, cycle detection and a runaway-update guard
//!
//! Rendering, I/O and routing are left to the host. Effects are where the
//! host's side effects run; the engine only decides when.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Handles, tracking context and the per-thread runtime
//! - `graph`: The node arena, edges, heights and the pending queue
//! - `config`: Scheduler configuration
//! - `error`: Error types
//!
//! # Example
//!
//! ```rust
//! use ripple_core::reactive::{Cell, Derivation, Effect};
//! use std::{cell::RefCell, rc::Rc};
//!
//! let count = Cell::new(5);
//!
//! let doubled = {
//!     let count = count.clone();
//!     Derivation::new(move || Ok(count.read()? * 2))
//! };
//!
//! let log = Rc::new(RefCell::new(Vec::new()));
//! let _effect = {
//!     let (doubled, log) = (doubled.clone(), log.clone());
//!     Effect::new(move || {
//!         log.borrow_mut().push(doubled.read()?);
//!         Ok(())
//!     })
//!     .unwrap()
//! };
//!
//! count.write(8).unwrap();
//! count.write(8).unwrap(); // same value: nothing runs
//! assert_eq!(*log.borrow(), vec![10, 16]);
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod reactive;

pub use config::{FlushMode, RuntimeConfig};
pub use error::{BoxError, ConfigError, ReactiveError};
