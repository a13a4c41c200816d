//! Update Scheduler
//!
//! The scheduler owns the node arena and everything that can be decided
//! without running user code: edges, heights, the mark phase and the queue of
//! effects waiting for a flush.
//!
//! # Algorithm
//!
//! 1. When a cell changes, walk its dependents transitively and mark every
//!    clean node as stale. Descent stops at nodes that are already stale: a
//!    stale node's dependents are already stale or queued.
//! 2. Every effect reached is added to the pending queue (set semantics).
//! 3. The runtime drains the queue pass by pass, in ascending height with
//!    FIFO order as tie-break, and pulls each effect's dependencies before
//!    deciding whether to run it.
//!
//! Marking never recomputes anything; all evaluation happens on the pull side.

use std::collections::{HashMap, HashSet};

use indexmap::{IndexMap, IndexSet};
use smallvec::SmallVec;

use super::node::{Node, NodeId, NodeKind, NodeState};
use crate::error::ReactiveError;

type NodeStack = SmallVec<[NodeId; 16]>;

/// The update scheduler manages the dependency graph and the pending queue.
#[derive(Default)]
pub struct UpdateScheduler {
    /// All live nodes in the graph, indexed by ID.
    nodes: HashMap<NodeId, Node>,

    /// Stale effects awaiting a flush, in enqueue order.
    pending: IndexSet<NodeId>,
}

impl UpdateScheduler {
    /// Create a new empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node to the graph.
    pub fn add_node(&mut self, node: Node) -> NodeId {
        let id = node.id();
        self.nodes.insert(id, node);
        id
    }

    /// Remove a node and every edge pointing at it from its dependencies.
    ///
    /// Dependents keep their reference to the removed id; the next time they
    /// settle they see a missing dependency and re-evaluate, which surfaces
    /// `DisposedNodeAccess` to whoever still reads it. The removed node is
    /// handed back so the caller can drop its computation outside any borrow.
    pub fn remove_node(&mut self, node_id: NodeId) -> Option<Node> {
        let node = self.nodes.remove(&node_id)?;
        self.pending.shift_remove(&node_id);

        for dep_id in node.dependencies().keys() {
            if let Some(dep) = self.nodes.get_mut(dep_id) {
                dep.remove_dependent(node_id);
            }
        }

        Some(node)
    }

    /// Get a reference to a node.
    pub fn get_node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    /// Get a mutable reference to a node.
    pub fn get_node_mut(&mut self, node_id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&node_id)
    }

    pub fn contains(&self, node_id: NodeId) -> bool {
        self.nodes.contains_key(&node_id)
    }

    /// Look up a live node or fail with `DisposedNodeAccess`.
    pub fn live(&self, node_id: NodeId) -> Result<&Node, ReactiveError> {
        self.nodes
            .get(&node_id)
            .ok_or(ReactiveError::DisposedNodeAccess { node: node_id })
    }

    /// Mutable variant of [`live`](Self::live).
    pub fn live_mut(&mut self, node_id: NodeId) -> Result<&mut Node, ReactiveError> {
        self.nodes
            .get_mut(&node_id)
            .ok_or(ReactiveError::DisposedNodeAccess { node: node_id })
    }

    /// Current version of a node, `None` once disposed.
    pub fn version_of(&self, node_id: NodeId) -> Option<u64> {
        self.nodes.get(&node_id).map(Node::version)
    }

    /// Whether `dependent` can already reach `dependency` through dependent
    /// edges, i.e. whether adding `dependency -> dependent` closes a cycle.
    pub fn would_create_cycle(&self, dependency: NodeId, dependent: NodeId) -> bool {
        if dependency == dependent {
            return true;
        }

        let mut visited = HashSet::new();
        let mut stack: NodeStack = SmallVec::new();
        stack.push(dependent);

        while let Some(node_id) = stack.pop() {
            if !visited.insert(node_id) {
                continue;
            }
            let Some(node) = self.nodes.get(&node_id) else {
                continue;
            };
            for &next in node.dependents() {
                if next == dependency {
                    return true;
                }
                stack.push(next);
            }
        }

        false
    }

    /// Replace `node_id`'s dependency set with the one observed during its
    /// latest evaluation.
    ///
    /// Newly read nodes gain `node_id` as a dependent, nodes no longer read
    /// lose it. With `keep_old` set (failed evaluations) nothing is
    /// unsubscribed and the old edges are kept alongside the new ones.
    /// Every new edge is checked for cycles before anything is installed.
    /// Height is recomputed from the final set.
    pub fn install_dependencies(
        &mut self,
        node_id: NodeId,
        observed: IndexMap<NodeId, u64>,
        keep_old: bool,
    ) -> Result<(), ReactiveError> {
        let old = match self.nodes.get(&node_id) {
            Some(node) => node.dependencies().clone(),
            None => return Ok(()),
        };

        // Nodes disposed after being read during the evaluation are dropped.
        let mut next: IndexMap<NodeId, u64> = observed
            .into_iter()
            .filter(|(dep_id, _)| self.nodes.contains_key(dep_id))
            .collect();

        for dep_id in next.keys() {
            if !old.contains_key(dep_id) && self.would_create_cycle(*dep_id, node_id) {
                return Err(ReactiveError::CycleDetected { node: node_id });
            }
        }

        if keep_old {
            for (dep_id, version) in &old {
                next.entry(*dep_id).or_insert(*version);
            }
        } else {
            for dep_id in old.keys() {
                if !next.contains_key(dep_id) {
                    if let Some(dep) = self.nodes.get_mut(dep_id) {
                        dep.remove_dependent(node_id);
                    }
                }
            }
        }

        for dep_id in next.keys() {
            if let Some(dep) = self.nodes.get_mut(dep_id) {
                dep.add_dependent(node_id);
            }
        }

        let height = next
            .keys()
            .filter_map(|dep_id| self.nodes.get(dep_id).map(Node::height))
            .max()
            .map_or(0, |h| h + 1);

        if let Some(node) = self.nodes.get_mut(&node_id) {
            node.replace_dependencies(next);
            node.set_height(height);
        }
        self.raise_heights(node_id);

        Ok(())
    }

    /// Push height increases down through dependents so every edge keeps
    /// `height(dependent) > height(dependency)`.
    fn raise_heights(&mut self, start: NodeId) {
        let mut stack: NodeStack = SmallVec::new();
        stack.push(start);

        while let Some(node_id) = stack.pop() {
            let Some(node) = self.nodes.get(&node_id) else {
                continue;
            };
            let floor = node.height() + 1;
            let dependents: NodeStack = node.dependents().iter().copied().collect();

            for dependent_id in dependents {
                if let Some(dependent) = self.nodes.get_mut(&dependent_id) {
                    if dependent.height() < floor {
                        dependent.set_height(floor);
                        stack.push(dependent_id);
                    }
                }
            }
        }
    }

    /// Mark phase for a changed node.
    ///
    /// Marks every clean transitive dependent stale and enqueues the effects
    /// among them. Dirty nodes are passed through without changing state,
    /// because a failed evaluation leaves clean dependents behind it.
    /// Returns the number of nodes that went from clean to stale.
    pub fn mark_changed(&mut self, source_id: NodeId) -> usize {
        let mut marked = 0;
        let mut visited = HashSet::new();
        let mut stack: NodeStack = match self.nodes.get(&source_id) {
            Some(source) => source.dependents().iter().rev().copied().collect(),
            None => return 0,
        };

        while let Some(node_id) = stack.pop() {
            if !visited.insert(node_id) {
                continue;
            }
            let Some(node) = self.nodes.get_mut(&node_id) else {
                continue;
            };

            let descend = match node.state() {
                NodeState::Clean => {
                    node.mark_stale();
                    marked += 1;
                    true
                }
                NodeState::Stale => false,
                NodeState::Dirty => true,
            };

            if node.kind() == NodeKind::Effect {
                self.pending.insert(node_id);
                continue;
            }

            if descend {
                stack.extend(node.dependents().iter().rev().copied());
            }
        }

        tracing::trace!(source = %source_id, marked, "marked dependents stale");
        marked
    }

    /// Enqueue an effect for the next flush. Enqueueing twice is a no-op.
    pub fn enqueue(&mut self, effect_id: NodeId) {
        self.pending.insert(effect_id);
    }

    /// Drain the pending queue in processing order: ascending height, then
    /// enqueue order.
    pub fn take_pending(&mut self) -> Vec<NodeId> {
        let mut batch: Vec<(u32, NodeId)> = self
            .pending
            .drain(..)
            .filter_map(|id| self.nodes.get(&id).map(|node| (node.height(), id)))
            .collect();
        // Stable sort keeps FIFO order among equal heights.
        batch.sort_by_key(|&(height, _)| height);
        batch.into_iter().map(|(_, id)| id).collect()
    }

    /// Put effects back at the front of the queue, ahead of anything queued
    /// since they were taken.
    pub fn requeue_front(&mut self, effects: &[NodeId]) {
        let rest = std::mem::take(&mut self.pending);
        self.pending.extend(effects.iter().copied().filter(|id| self.nodes.contains_key(id)));
        self.pending.extend(rest);
    }

    pub fn is_pending(&self, effect_id: NodeId) -> bool {
        self.pending.contains(&effect_id)
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn clear_pending(&mut self) {
        self.pending.clear();
    }

    /// Get the total number of live nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}
