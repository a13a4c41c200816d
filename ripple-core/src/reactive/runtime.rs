//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects cells, derivations
//! and effects. It owns the dependency graph and decides when things run.
//!
//! # How It Works
//!
//! 1. Cells, derivations and effects register a node with the runtime.
//!
//! 2. Reads inside a tracking frame are recorded by the reactive context and
//!    installed as edges when the evaluation finishes.
//!
//! 3. When a cell's value changes, the runtime:
//!    a. Bumps the cell's version
//!    b. Marks every transitive dependent stale and queues the effects
//!    c. Flushes, unless inside a batch or in manual flush mode
//!
//! 4. A flush pulls each queued effect: stale dependencies are settled first
//!    (recursively), and the effect only runs if one of them now has a
//!    different version than the one it last saw. Derivations are lazy and
//!    settle the same way when read.
//!
//! # Threading
//!
//! The runtime is thread-local. Each thread drives its own independent graph,
//! and handles are not `Send`.

use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;

use super::context::ReactiveContext;
use crate::config::{FlushMode, RuntimeConfig};
use crate::error::{ConfigError, ReactiveError};
use crate::graph::{Node, NodeId, NodeKind, NodeState, UpdateScheduler};

type ErrorHook = Rc<dyn Fn(NodeId, &ReactiveError)>;

thread_local! {
    static RUNTIME: RefCell<RuntimeState> = RefCell::new(RuntimeState::default());
}

/// Counters describing the work the runtime has done on this thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RuntimeStats {
    /// Flushes that processed at least one pass.
    pub flushes: u64,
    /// Passes over the pending queue, across all flushes.
    pub passes: u64,
    /// Derivation compute invocations.
    pub recomputations: u64,
    /// Effect run invocations, including the initial run.
    pub effect_runs: u64,
}

#[derive(Default)]
struct RuntimeState {
    scheduler: UpdateScheduler,
    config: RuntimeConfig,
    batch_depth: usize,
    flushing: bool,
    error_hook: Option<ErrorHook>,
    stats: RuntimeStats,
}

fn with_state<R>(f: impl FnOnce(&mut RuntimeState) -> R) -> R {
    RUNTIME.with(|runtime| f(&mut runtime.borrow_mut()))
}

/// Clears a node's evaluating flag on scope exit, panics included.
struct Evaluating(NodeId);

impl Drop for Evaluating {
    fn drop(&mut self) {
        let _ = RUNTIME.try_with(|runtime| {
            if let Ok(mut state) = runtime.try_borrow_mut() {
                if let Some(node) = state.scheduler.get_node_mut(self.0) {
                    node.set_evaluating(false);
                }
            }
        });
    }
}

struct BatchGuard;

impl Drop for BatchGuard {
    fn drop(&mut self) {
        let _ = RUNTIME.try_with(|runtime| {
            if let Ok(mut state) = runtime.try_borrow_mut() {
                state.batch_depth = state.batch_depth.saturating_sub(1);
            }
        });
    }
}

struct FlushGuard;

impl Drop for FlushGuard {
    fn drop(&mut self) {
        let _ = RUNTIME.try_with(|runtime| {
            if let Ok(mut state) = runtime.try_borrow_mut() {
                state.flushing = false;
            }
        });
    }
}

/// The per-thread reactive runtime.
pub struct Runtime;

impl Runtime {
    /// Install a new configuration for this thread.
    pub fn configure(config: RuntimeConfig) -> Result<(), ConfigError> {
        config.validate()?;
        with_state(|state| state.config = config);
        Ok(())
    }

    /// The configuration currently in effect.
    pub fn config() -> RuntimeConfig {
        with_state(|state| state.config.clone())
    }

    /// Counters for the work done so far on this thread.
    pub fn stats() -> RuntimeStats {
        with_state(|state| state.stats)
    }

    /// Number of live nodes in this thread's graph.
    pub fn node_count() -> usize {
        with_state(|state| state.scheduler.node_count())
    }

    /// Number of effects waiting for a flush.
    pub fn pending_count() -> usize {
        with_state(|state| state.scheduler.pending_len())
    }

    /// Whether a flush is currently running.
    pub fn is_flushing() -> bool {
        with_state(|state| state.flushing)
    }

    /// Install the handler that receives errors returned by effect bodies.
    ///
    /// Without a handler, failures are logged. Fatal errors never reach it.
    pub fn on_effect_error<F>(handler: F)
    where
        F: Fn(NodeId, &ReactiveError) + 'static,
    {
        with_state(|state| state.error_hook = Some(Rc::new(handler)));
    }

    /// Drop every node in this thread's graph. Configuration and the error
    /// hook are kept.
    pub fn teardown() {
        let scheduler = with_state(|state| {
            state.stats = RuntimeStats::default();
            std::mem::take(&mut state.scheduler)
        });
        // Dropping nodes releases user closures; keep that outside the borrow.
        drop(scheduler);
    }

    pub(crate) fn register(node: Node) -> NodeId {
        with_state(|state| state.scheduler.add_node(node))
    }

    pub(crate) fn dispose(id: NodeId) {
        let removed = with_state(|state| state.scheduler.remove_node(id));
        if removed.is_some() {
            tracing::trace!(node = %id, "disposed");
        }
        drop(removed);
    }

    pub(crate) fn is_live(id: NodeId) -> bool {
        with_state(|state| state.scheduler.contains(id))
    }

    pub(crate) fn ensure_live(id: NodeId) -> Result<(), ReactiveError> {
        with_state(|state| state.scheduler.live(id).map(|_| ()))
    }

    pub(crate) fn node_state(id: NodeId) -> Option<NodeState> {
        with_state(|state| state.scheduler.get_node(id).map(Node::state))
    }

    pub(crate) fn version(id: NodeId) -> Option<u64> {
        with_state(|state| state.scheduler.version_of(id))
    }

    pub(crate) fn dependency_count(id: NodeId) -> usize {
        with_state(|state| {
            state
                .scheduler
                .get_node(id)
                .map_or(0, |node| node.dependencies().len())
        })
    }

    /// Record a read of `id` in the current tracking frame.
    pub(crate) fn track_read(id: NodeId) -> Result<(), ReactiveError> {
        let version = with_state(|state| state.scheduler.live(id).map(Node::version))?;
        ReactiveContext::track_dependency(id, version);
        Ok(())
    }

    /// Reject writes from inside a derivation or to a disposed cell.
    pub(crate) fn check_writable(id: NodeId) -> Result<(), ReactiveError> {
        if ReactiveContext::is_computing() {
            return Err(ReactiveError::WriteDuringComputation { cell: id });
        }
        Self::ensure_live(id)
    }

    /// A cell's stored value changed: bump its version, mark dependents and
    /// flush if this write is the end of the current turn.
    pub(crate) fn cell_changed(id: NodeId) -> Result<(), ReactiveError> {
        let should_flush = with_state(|state| {
            let version = state.scheduler.live_mut(id)?.bump_version();
            let marked = state.scheduler.mark_changed(id);
            tracing::trace!(cell = %id, version, marked, "cell written");

            Ok::<_, ReactiveError>(
                state.batch_depth == 0
                    && !state.flushing
                    && state.config.flush_mode == FlushMode::Sync
                    && state.scheduler.has_pending(),
            )
        })?;

        if should_flush {
            Self::flush()?;
        }
        Ok(())
    }

    /// Run `f` with writes coalesced into a single flush.
    ///
    /// Batches nest; only the outermost one flushes, after `f` returns. The
    /// error, if any, comes from that flush.
    pub fn batch<R>(f: impl FnOnce() -> R) -> Result<R, ReactiveError> {
        with_state(|state| state.batch_depth += 1);
        let guard = BatchGuard;
        let out = f();
        drop(guard);

        let should_flush = with_state(|state| {
            state.batch_depth == 0
                && !state.flushing
                && state.config.flush_mode == FlushMode::Sync
                && state.scheduler.has_pending()
        });
        if should_flush {
            Self::flush()?;
        }
        Ok(out)
    }

    /// Settle every pending effect.
    ///
    /// Runs passes over the pending queue until it is empty. Effects that
    /// write cells during a pass queue their dependents for the next pass.
    /// Calling `flush` from inside a flush is a no-op: the outer flush picks
    /// up whatever was queued.
    pub fn flush() -> Result<(), ReactiveError> {
        let (started, limit) = with_state(|state| {
            if state.flushing {
                (false, 0)
            } else {
                state.flushing = true;
                (true, state.config.max_flush_iterations)
            }
        });
        if !started {
            return Ok(());
        }
        let _guard = FlushGuard;
        let _span = tracing::debug_span!("flush").entered();

        let mut passes = 0usize;
        loop {
            let batch = with_state(|state| state.scheduler.take_pending());
            if batch.is_empty() {
                break;
            }

            passes += 1;
            if passes > limit {
                with_state(|state| state.scheduler.clear_pending());
                tracing::warn!(limit, "flush did not settle; dropping pending effects");
                return Err(ReactiveError::MaxFlushIterationsExceeded { limit });
            }
            with_state(|state| state.stats.passes += 1);

            for (index, &effect) in batch.iter().enumerate() {
                // An earlier effect in this pass may have disposed it.
                if !Self::is_live(effect) {
                    continue;
                }
                match Self::settle(effect) {
                    Ok(()) => {}
                    Err(err) if err.is_fatal() => {
                        with_state(|state| state.scheduler.requeue_front(&batch[index + 1..]));
                        return Err(err);
                    }
                    Err(err) => Self::report_effect_error(effect, err),
                }
            }
        }

        if passes > 0 {
            with_state(|state| state.stats.flushes += 1);
            tracing::debug!(passes, "flush settled");
        }
        Ok(())
    }

    /// Hand an effect failure to the error hook, or log it.
    pub(crate) fn report_effect_error(effect: NodeId, err: ReactiveError) {
        let hook = with_state(|state| state.error_hook.clone());
        match hook {
            Some(hook) => hook(effect, &err),
            None => tracing::error!(effect = %effect, error = %err, "effect failed"),
        }
    }

    /// Bring `id` up to date, re-evaluating it only if needed.
    ///
    /// Clean nodes return at once. Stale nodes settle their dependencies in
    /// read order and re-evaluate as soon as one of them shows a version
    /// different from the last one seen; if none does, they become clean
    /// without running. Dirty nodes always re-evaluate.
    pub(crate) fn settle(id: NodeId) -> Result<(), ReactiveError> {
        let (state, evaluating) = with_state(|state| {
            state
                .scheduler
                .live(id)
                .map(|node| (node.state(), node.is_evaluating()))
        })?;

        if evaluating {
            return Err(ReactiveError::CycleDetected { node: id });
        }

        match state {
            NodeState::Clean => Ok(()),
            NodeState::Dirty => Self::evaluate(id),
            NodeState::Stale => {
                let dependencies: Vec<(NodeId, u64)> = with_state(|state| {
                    state.scheduler.get_node(id).map_or_else(Vec::new, |node| {
                        node.dependencies()
                            .iter()
                            .map(|(dep, version)| (*dep, *version))
                            .collect()
                    })
                });

                for (dep, seen) in dependencies {
                    if Self::is_live(dep) {
                        Self::settle(dep)?;
                    }
                    if Self::version(dep) != Some(seen) {
                        return Self::evaluate(id);
                    }
                }

                with_state(|state| {
                    if let Some(node) = state.scheduler.get_node_mut(id) {
                        node.mark_clean();
                    }
                });
                Ok(())
            }
        }
    }

    /// Run a derivation's compute or an effect's body inside a fresh tracking
    /// frame and install the dependencies it read.
    fn evaluate(id: NodeId) -> Result<(), ReactiveError> {
        let (kind, subscriber) = with_state(|state| {
            let node = state.scheduler.live_mut(id)?;
            node.set_evaluating(true);
            Ok::<_, ReactiveError>((node.kind(), node.subscriber()))
        })?;
        let evaluating = Evaluating(id);

        let Some(subscriber) = subscriber else {
            // Cells have nothing to run.
            drop(evaluating);
            with_state(|state| {
                if let Some(node) = state.scheduler.get_node_mut(id) {
                    node.mark_clean();
                }
            });
            return Ok(());
        };

        with_state(|state| match kind {
            NodeKind::Effect => state.stats.effect_runs += 1,
            _ => state.stats.recomputations += 1,
        });
        tracing::trace!(node = %id, ?kind, "evaluating");

        let ctx = ReactiveContext::enter(id, kind);
        let result = subscriber.evaluate();
        let observed = ctx.finish();
        drop(evaluating);
        drop(subscriber);

        with_state(|state| {
            // Disposed from inside its own run: nothing left to update.
            if !state.scheduler.contains(id) {
                return Ok(());
            }

            // A dependency written after it was read in this same run, or one
            // that went stale behind it and queued it again.
            let changed_since_read = observed
                .iter()
                .any(|(dep, seen)| state.scheduler.version_of(*dep).is_some_and(|v| v != *seen))
                || (kind == NodeKind::Effect && state.scheduler.is_pending(id));

            let installed = state
                .scheduler
                .install_dependencies(id, observed, result.is_err());
            let Some(node) = state.scheduler.get_node_mut(id) else {
                return installed;
            };

            if let Err(err) = installed {
                node.mark_dirty();
                return Err(err);
            }

            match (&result, kind) {
                (Ok(changed), NodeKind::Derivation) => {
                    if *changed {
                        node.bump_version();
                    }
                    node.mark_clean();
                }
                (Err(_), NodeKind::Derivation) => node.mark_dirty(),
                // Left stale so the next pass pulls its dependencies again.
                (_, _) if changed_since_read => {
                    node.mark_clean();
                    node.mark_stale();
                    state.scheduler.enqueue(id);
                }
                (_, _) => node.mark_clean(),
            }
            Ok(())
        })?;

        result.map(|_| ())
    }
}
