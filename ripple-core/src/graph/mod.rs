//! Dependency Graph
//!
//! This module implements the dependency graph that tracks relationships
//! between cells, derivations and effects.
//!
//! # Overview
//!
//! The dependency graph is a directed acyclic graph (DAG) where:
//!
//! - Nodes represent cells (leaves), derivations or effects
//! - Edges represent dependencies: if A reads B, there is an edge from B to A
//!
//! When a cell changes, we traverse the graph to find all affected nodes and
//! mark them stale. The runtime then pulls stale nodes, re-evaluating only
//! those whose inputs actually changed.
//!
//! # Design Decisions
//!
//! 1. Nodes live in a central arena keyed by integer [`NodeId`]. Handles and
//!    edges refer to nodes by id, never by pointer, so there are no reference
//!    cycles between producers and consumers.
//!
//! 2. We maintain both forward (dependencies) and reverse (dependents) edges
//!    so marking walks down and pulling walks up without searching.
//!
//! 3. Every node carries a height, strictly greater than the heights of its
//!    dependencies. The pending queue is processed in height order.

mod node;
mod scheduler;

pub use node::{Node, NodeId, NodeKind, NodeState};
pub use scheduler::UpdateScheduler;
