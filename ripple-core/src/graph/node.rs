//! Graph Nodes
//!
//! This module defines the node types that live in the dependency graph.
//! Nodes are untyped: cell and derivation values live in their typed handles,
//! and the arena only keeps the bookkeeping the scheduler needs.

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::{IndexMap, IndexSet};

use crate::reactive::Subscriber;

/// Unique identifier for a node in the dependency graph.
///
/// Ids come from a process-wide counter and are never reused, so a handle to
/// a disposed node can always be told apart from a live one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A mutable leaf. Has dependents, never dependencies.
    Cell,

    /// A memoized pure computation. Has dependencies and may have dependents.
    Derivation,

    /// A side-effecting subscriber. Has dependencies but no dependents.
    Effect,
}

/// Freshness of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Up to date with every dependency.
    Clean,

    /// Something upstream changed. Dependencies must be settled and their
    /// versions compared before we know whether to re-evaluate.
    Stale,

    /// Must re-evaluate before the next read.
    Dirty,
}

/// A node in the dependency graph.
pub struct Node {
    id: NodeId,

    kind: NodeKind,

    state: NodeState,

    /// Bumped whenever the node's observable value changes.
    version: u64,

    /// Nodes this node read during its last evaluation, in read order, with
    /// the version each one had at that time.
    dependencies: IndexMap<NodeId, u64>,

    /// Nodes that read this node. Lookup-only back references.
    dependents: IndexSet<NodeId>,

    /// Topological depth: strictly greater than every dependency's height.
    height: u32,

    /// Set while the node's compute or run body is on the call stack.
    evaluating: bool,

    /// Type-erased computation for derivations and effects.
    subscriber: Option<Rc<dyn Subscriber>>,
}

impl Node {
    /// Create a new node with the given kind.
    pub fn new(kind: NodeKind) -> Self {
        Self {
            id: NodeId::new(),
            kind,
            state: match kind {
                NodeKind::Cell => NodeState::Clean,
                NodeKind::Derivation | NodeKind::Effect => NodeState::Dirty,
            },
            version: 0,
            dependencies: IndexMap::new(),
            dependents: IndexSet::new(),
            height: 0,
            evaluating: false,
            subscriber: None,
        }
    }

    /// Create a new cell node.
    pub fn cell() -> Self {
        Self::new(NodeKind::Cell)
    }

    /// Create a new derivation node driven by `subscriber`.
    pub(crate) fn derivation(subscriber: Rc<dyn Subscriber>) -> Self {
        let mut node = Self::new(NodeKind::Derivation);
        node.subscriber = Some(subscriber);
        node
    }

    /// Create a new effect node driven by `subscriber`.
    pub(crate) fn effect(subscriber: Rc<dyn Subscriber>) -> Self {
        let mut node = Self::new(NodeKind::Effect);
        node.subscriber = Some(subscriber);
        node
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn is_clean(&self) -> bool {
        self.state == NodeState::Clean
    }

    pub fn mark_clean(&mut self) {
        self.state = NodeState::Clean;
    }

    /// Mark the node stale. Returns `true` if it was clean before, which is
    /// the signal for the mark phase to keep descending.
    pub fn mark_stale(&mut self) -> bool {
        if self.state == NodeState::Clean {
            self.state = NodeState::Stale;
            true
        } else {
            false
        }
    }

    pub fn mark_dirty(&mut self) {
        self.state = NodeState::Dirty;
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn bump_version(&mut self) -> u64 {
        self.version += 1;
        self.version
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn set_height(&mut self, height: u32) {
        self.height = height;
    }

    pub fn is_evaluating(&self) -> bool {
        self.evaluating
    }

    pub fn set_evaluating(&mut self, evaluating: bool) {
        self.evaluating = evaluating;
    }

    pub(crate) fn subscriber(&self) -> Option<Rc<dyn Subscriber>> {
        self.subscriber.clone()
    }

    /// Drop the computation so captured handles are released.
    pub(crate) fn take_subscriber(&mut self) -> Option<Rc<dyn Subscriber>> {
        self.subscriber.take()
    }

    /// Dependencies with the version observed at last evaluation.
    pub fn dependencies(&self) -> &IndexMap<NodeId, u64> {
        &self.dependencies
    }

    pub(crate) fn replace_dependencies(&mut self, deps: IndexMap<NodeId, u64>) -> IndexMap<NodeId, u64> {
        std::mem::replace(&mut self.dependencies, deps)
    }

    pub fn dependents(&self) -> &IndexSet<NodeId> {
        &self.dependents
    }

    pub fn add_dependent(&mut self, node_id: NodeId) {
        self.dependents.insert(node_id);
    }

    pub fn remove_dependent(&mut self, node_id: NodeId) {
        self.dependents.shift_remove(&node_id);
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("state", &self.state)
            .field("version", &self.version)
            .field("height", &self.height)
            .field("dependencies", &self.dependencies.len())
            .field("dependents", &self.dependents.len())
            .field("evaluating", &self.evaluating)
            .finish()
    }
}
