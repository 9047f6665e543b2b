// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node identity, per-direction evaluation state and the common node record.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::hierarchy::HierarchyState;
use crate::layer::LayerState;
use crate::transform::TransformState;

/// Unique identifier for a node, stable across sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Generate a fresh id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Which way information flows for a given piece of cached state.
///
/// Downstream state (global transforms, visibility) is derived from
/// ancestors; upstream state (aggregate bounds) is derived from descendants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphDirection {
    /// Ancestor-derived state.
    Downstream,
    /// Descendant-derived state.
    Upstream,
}

/// Evaluation state of a node's cache in one direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeState {
    /// Cache is stale and must be recomputed.
    #[default]
    Dirty,
    /// Recompute is in flight.
    Evaluating,
    /// Cache is up to date.
    Clean,
}

/// Per-direction state pair; fresh nodes are dirty both ways.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct NodeStates {
    pub downstream: NodeState,
    pub upstream: NodeState,
}

impl NodeStates {
    pub fn get(&self, direction: GraphDirection) -> NodeState {
        match direction {
            GraphDirection::Downstream => self.downstream,
            GraphDirection::Upstream => self.upstream,
        }
    }

    pub fn set(&mut self, direction: GraphDirection, state: NodeState) {
        match direction {
            GraphDirection::Downstream => self.downstream = state,
            GraphDirection::Upstream => self.upstream = state,
        }
    }
}

/// Kind-specific payload of a node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NodeKind {
    /// Hierarchy node with no local transform of its own.
    Group(HierarchyState),
    /// Hierarchy node carrying scale/rotate/translate, pivots and shear.
    Transform(HierarchyState, Box<TransformState>),
    /// Flat membership set; not placed in the parent/child hierarchy.
    Layer(LayerState),
}

/// A node in the scene dependency graph.
///
/// Edge sets are mirrored: `a` lists `b` as a descendant exactly when `b`
/// lists `a` as an ancestor. Only the graph mutates them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneNode {
    pub(crate) id: NodeId,
    pub(crate) name: String,
    #[serde(skip)]
    pub(crate) ancestors: IndexSet<NodeId>,
    #[serde(skip)]
    pub(crate) descendants: IndexSet<NodeId>,
    #[serde(skip)]
    pub(crate) state: NodeStates,
    #[serde(skip)]
    pub(crate) visited: u32,
    #[serde(skip)]
    pub(crate) in_graph: bool,
    #[serde(skip)]
    pub(crate) transient: bool,
    pub(crate) kind: NodeKind,
}

impl SceneNode {
    fn with_kind(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: NodeId::new(),
            name: name.into(),
            ancestors: IndexSet::new(),
            descendants: IndexSet::new(),
            state: NodeStates::default(),
            visited: 0,
            in_graph: false,
            transient: false,
            kind,
        }
    }

    /// New group node.
    pub fn new_group(name: impl Into<String>) -> Self {
        Self::with_kind(name, NodeKind::Group(HierarchyState::default()))
    }

    /// New transform node with identity components.
    pub fn new_transform(name: impl Into<String>) -> Self {
        Self::with_kind(
            name,
            NodeKind::Transform(HierarchyState::default(), Box::default()),
        )
    }

    /// New empty layer.
    pub fn new_layer(name: impl Into<String>) -> Self {
        Self::with_kind(name, NodeKind::Layer(LayerState::default()))
    }

    /// Stable identifier.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Kind payload.
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Ids of nodes this node depends on.
    pub fn ancestors(&self) -> &IndexSet<NodeId> {
        &self.ancestors
    }

    /// Ids of nodes depending on this node.
    pub fn descendants(&self) -> &IndexSet<NodeId> {
        &self.descendants
    }

    /// Evaluation state in one direction.
    pub fn state(&self, direction: GraphDirection) -> NodeState {
        self.state.get(direction)
    }

    /// True while the node is registered with the graph (not pruned).
    pub fn in_graph(&self) -> bool {
        self.in_graph
    }

    /// Transient nodes are skipped by persistence.
    pub fn is_transient(&self) -> bool {
        self.transient
    }

    /// Mark the node transient.
    pub fn set_transient(&mut self, transient: bool) {
        self.transient = transient;
    }

    /// Hierarchy payload, if this is a hierarchy kind.
    pub fn hierarchy(&self) -> Option<&HierarchyState> {
        match &self.kind {
            NodeKind::Group(h) | NodeKind::Transform(h, _) => Some(h),
            NodeKind::Layer(_) => None,
        }
    }

    pub(crate) fn hierarchy_mut(&mut self) -> Option<&mut HierarchyState> {
        match &mut self.kind {
            NodeKind::Group(h) | NodeKind::Transform(h, _) => Some(h),
            NodeKind::Layer(_) => None,
        }
    }

    /// Transform payload, if this is a transform node.
    pub fn transform(&self) -> Option<&TransformState> {
        match &self.kind {
            NodeKind::Transform(_, t) => Some(t.as_ref()),
            _ => None,
        }
    }

    pub(crate) fn transform_mut(&mut self) -> Option<&mut TransformState> {
        match &mut self.kind {
            NodeKind::Transform(_, t) => Some(t.as_mut()),
            _ => None,
        }
    }

    /// Layer payload, if this is a layer.
    pub fn layer(&self) -> Option<&LayerState> {
        match &self.kind {
            NodeKind::Layer(l) => Some(l),
            _ => None,
        }
    }

    pub(crate) fn layer_mut(&mut self) -> Option<&mut LayerState> {
        match &mut self.kind {
            NodeKind::Layer(l) => Some(l),
            _ => None,
        }
    }

    /// True for group and transform nodes.
    pub fn is_hierarchy(&self) -> bool {
        self.hierarchy().is_some()
    }

    /// True for layers.
    pub fn is_layer(&self) -> bool {
        self.layer().is_some()
    }

    /// Standalone copy with a fresh id and no edges, links or cached state.
    ///
    /// Persistent payload (name, transform components, hidden flag, layer
    /// membership ids) is carried over; the caller wires the copy into a
    /// graph afterwards.
    pub(crate) fn duplicated(&self) -> SceneNode {
        let mut kind = self.kind.clone();
        match &mut kind {
            NodeKind::Group(h) => h.reset_links(),
            NodeKind::Transform(h, t) => {
                h.reset_links();
                t.reset_caches();
            }
            NodeKind::Layer(_) => {}
        }
        SceneNode {
            id: NodeId::new(),
            name: self.name.clone(),
            ancestors: IndexSet::new(),
            descendants: IndexSet::new(),
            state: NodeStates::default(),
            visited: 0,
            in_graph: false,
            transient: self.transient,
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_node_is_dirty_both_ways() {
        let n = SceneNode::new_group("g");
        assert_eq!(n.state(GraphDirection::Downstream), NodeState::Dirty);
        assert_eq!(n.state(GraphDirection::Upstream), NodeState::Dirty);
        assert!(!n.in_graph());
    }

    #[test]
    fn kind_accessors_dispatch() {
        let g = SceneNode::new_group("g");
        let t = SceneNode::new_transform("t");
        let l = SceneNode::new_layer("l");

        assert!(g.is_hierarchy() && g.transform().is_none());
        assert!(t.is_hierarchy() && t.transform().is_some());
        assert!(l.is_layer() && !l.is_hierarchy());
    }

    #[test]
    fn duplicated_gets_fresh_identity_and_no_edges() {
        let mut a = SceneNode::new_transform("widget");
        a.ancestors.insert(NodeId::new());
        a.descendants.insert(NodeId::new());
        a.in_graph = true;

        let b = a.duplicated();
        assert_ne!(a.id(), b.id());
        assert_eq!(b.name(), "widget");
        assert!(b.ancestors().is_empty());
        assert!(b.descendants().is_empty());
        assert!(!b.in_graph());
    }
}
