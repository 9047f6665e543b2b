// SPDX-License-Identifier: MIT OR Apache-2.0
//! The scene dependency graph.
//!
//! The graph owns every node in an arena keyed by [`NodeId`]; edges are id
//! references, so a stale id can only fail a lookup. Nodes are bucketed into
//! sources (no ancestors), sinks (no descendants) and intermediates after
//! every edge mutation, and the evaluation pump walks dirty sinks
//! ancestor-first (Downstream) and dirty sources descendant-first (Upstream).
//!
//! Prune and insert detach and reattach whole branches while preserving the
//! branch-internal edge structure, which is what makes undo/redo of delete
//! and reparent exact inverses.

use indexmap::{IndexMap, IndexSet};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::events::{EvaluateResult, SceneEvent};
use crate::node::{GraphDirection, NodeId, NodeKind, NodeState, SceneNode};

/// Errors returned by graph operations taking caller-supplied ids.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SceneError {
    /// The id does not resolve to a node in this graph.
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),
    /// The operation needs a group or transform node.
    #[error("node is not part of the hierarchy: {0}")]
    NotAHierarchyNode(NodeId),
    /// The operation needs a transform node.
    #[error("node has no transform: {0}")]
    NotATransformNode(NodeId),
    /// The operation needs a layer.
    #[error("node is not a layer: {0}")]
    NotALayer(NodeId),
}

/// The scene dependency graph; owns every node and all derived bookkeeping.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SceneGraph {
    #[serde(serialize_with = "serialize_persistent_nodes")]
    nodes: IndexMap<NodeId, SceneNode>,
    #[serde(skip)]
    sources: IndexSet<NodeId>,
    #[serde(skip)]
    sinks: IndexSet<NodeId>,
    #[serde(skip)]
    intermediate: IndexSet<NodeId>,
    #[serde(skip)]
    visited: u32,
    #[serde(skip)]
    events: Vec<SceneEvent>,
}

/// Transient nodes are tool scaffolding and never hit the file.
fn serialize_persistent_nodes<S>(
    nodes: &IndexMap<NodeId, SceneNode>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_map(nodes.iter().filter(|(_, node)| !node.transient))
}

impl SceneGraph {
    /// Empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes in the arena (registered or detached).
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when the arena is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Look up a node.
    pub fn node(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(&id)
    }

    /// Mutable node access for the per-node setters.
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut SceneNode> {
        self.nodes.get_mut(&id)
    }

    /// Iterate over every node in the arena.
    pub fn iter(&self) -> impl Iterator<Item = &SceneNode> {
        self.nodes.values()
    }

    /// Registered nodes with no ancestors.
    pub fn sources(&self) -> &IndexSet<NodeId> {
        &self.sources
    }

    /// Registered nodes with no descendants.
    pub fn sinks(&self) -> &IndexSet<NodeId> {
        &self.sinks
    }

    /// Registered nodes with both ancestors and descendants.
    pub fn intermediate(&self) -> &IndexSet<NodeId> {
        &self.intermediate
    }

    /// Evaluation state of a node in one direction.
    pub fn node_state(&self, id: NodeId, direction: GraphDirection) -> Option<NodeState> {
        self.nodes.get(&id).map(|n| n.state.get(direction))
    }

    /// Take the pending change events, leaving the queue empty.
    pub fn drain_events(&mut self) -> Vec<SceneEvent> {
        std::mem::take(&mut self.events)
    }

    /// Pending change events.
    pub fn events(&self) -> &[SceneEvent] {
        &self.events
    }

    pub(crate) fn push_event(&mut self, event: SceneEvent) {
        self.events.push(event);
    }

    pub(crate) fn try_node(&self, id: NodeId) -> Result<&SceneNode, SceneError> {
        self.nodes.get(&id).ok_or(SceneError::NodeNotFound(id))
    }

    pub(crate) fn try_node_mut(&mut self, id: NodeId) -> Result<&mut SceneNode, SceneError> {
        self.nodes.get_mut(&id).ok_or(SceneError::NodeNotFound(id))
    }

    // ----- arena & registration --------------------------------------------

    /// Add a node to the arena and register it with the graph.
    pub fn add_node(&mut self, node: SceneNode) -> NodeId {
        let id = node.id;
        debug_assert!(!self.nodes.contains_key(&id), "node added twice");
        self.nodes.insert(id, node);
        self.register_node(id);
        id
    }

    /// Delete a node and its branch from the graph, returning its storage.
    ///
    /// Combines [`prune`](Self::prune) and [`take_node`](Self::take_node);
    /// descendants stay in the arena, detached, so a delete command can
    /// reinsert them on undo.
    pub fn remove_node(&mut self, id: NodeId) -> Result<SceneNode, SceneError> {
        if self.try_node(id)?.in_graph {
            self.prune(id)?;
        }
        self.take_node(id)
    }

    /// Extract a detached node's storage; the caller owns it from here.
    ///
    /// The node must have been pruned first.
    pub fn take_node(&mut self, id: NodeId) -> Result<SceneNode, SceneError> {
        let node = self.try_node(id)?;
        assert!(!node.in_graph, "take_node on a registered node");
        self.nodes
            .shift_remove(&id)
            .ok_or(SceneError::NodeNotFound(id))
    }

    /// Put a taken node back into the arena, still detached.
    ///
    /// Follow with [`insert`](Self::insert) to reattach it.
    pub fn restore_node(&mut self, node: SceneNode) -> NodeId {
        let id = node.id;
        debug_assert!(!self.nodes.contains_key(&id), "node restored twice");
        self.nodes.insert(id, node);
        id
    }

    /// Rename a node.
    pub fn set_name(&mut self, id: NodeId, name: impl Into<String>) -> Result<(), SceneError> {
        let node = self.try_node_mut(id)?;
        let old_name = std::mem::replace(&mut node.name, name.into());
        self.push_event(SceneEvent::NodeRenamed { node: id, old_name });
        Ok(())
    }

    /// Register with the buckets and dirty; raises `NodeAdded`.
    pub(crate) fn register_node(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.get_mut(&id) {
            assert!(!node.in_graph, "node registered twice");
            node.in_graph = true;
            node.visited = 0;
        }
        self.classify(id);
        self.dirty(id);
        self.push_event(SceneEvent::NodeAdded(id));
    }

    /// Drop from the buckets; raises `NodeRemoved`. Storage stays put.
    pub(crate) fn deregister_node(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.in_graph = false;
        }
        self.classify(id);
        self.push_event(SceneEvent::NodeRemoved(id));
    }

    /// Re-bucket a node by its current live edges.
    pub(crate) fn classify(&mut self, id: NodeId) {
        self.sources.shift_remove(&id);
        self.sinks.shift_remove(&id);
        self.intermediate.shift_remove(&id);

        let (live_ancestor, live_descendant) = match self.nodes.get(&id) {
            Some(node) if node.in_graph => (
                node.ancestors
                    .iter()
                    .any(|a| self.nodes.get(a).is_some_and(|n| n.in_graph)),
                node.descendants
                    .iter()
                    .any(|d| self.nodes.get(d).is_some_and(|n| n.in_graph)),
            ),
            _ => return,
        };

        // An edge-less node lands in both buckets so both pump directions
        // still reach it.
        if !live_ancestor {
            self.sources.insert(id);
        }
        if !live_descendant {
            self.sinks.insert(id);
        }
        if live_ancestor && live_descendant {
            self.intermediate.insert(id);
        }
    }

    // ----- traversal ids ----------------------------------------------------

    /// Issue a fresh traversal id, resetting every node on wraparound.
    pub(crate) fn assign_visited_id(&mut self) -> u32 {
        if self.visited == u32::MAX {
            for node in self.nodes.values_mut() {
                node.visited = 0;
            }
            self.visited = 0;
        }
        self.visited += 1;
        self.visited
    }

    // ----- edges ------------------------------------------------------------

    /// Make `ancestor` a dependency of `node`, mirrored on both endpoints.
    ///
    /// The edge set must stay acyclic; this is a caller obligation checked
    /// only in debug builds.
    pub fn create_dependency(&mut self, node: NodeId, ancestor: NodeId) -> Result<(), SceneError> {
        debug_assert_ne!(node, ancestor, "self-dependency");
        self.try_node(node)?;
        self.try_node(ancestor)?;
        #[cfg(debug_assertions)]
        debug_assert!(
            !self.reaches(node, ancestor),
            "dependency would close a cycle"
        );
        self.connect_descendant(ancestor, node);
        self.connect_ancestor(node, ancestor);
        Ok(())
    }

    /// Undo a [`create_dependency`](Self::create_dependency), mirrored.
    pub fn remove_dependency(&mut self, node: NodeId, ancestor: NodeId) -> Result<(), SceneError> {
        self.try_node(node)?;
        self.try_node(ancestor)?;
        self.disconnect_descendant(ancestor, node);
        self.disconnect_ancestor(node, ancestor);
        Ok(())
    }

    /// True when `to` is reachable from `from` over descendant edges.
    #[cfg(debug_assertions)]
    fn reaches(&self, from: NodeId, to: NodeId) -> bool {
        let mut seen: IndexSet<NodeId> = IndexSet::new();
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            if id == to {
                return true;
            }
            if !seen.insert(id) {
                continue;
            }
            if let Some(node) = self.nodes.get(&id) {
                stack.extend(node.descendants.iter().copied());
            }
        }
        false
    }

    /// Record `descendant` on the ancestor side and dispatch on its kind:
    /// hierarchy nodes splice the child into the sibling list, layers track
    /// the persisted member set.
    pub(crate) fn connect_descendant(&mut self, ancestor: NodeId, descendant: NodeId) {
        let mut splice = false;
        let mut member = false;
        if let Some(node) = self.nodes.get_mut(&ancestor) {
            node.descendants.insert(descendant);
            match node.kind {
                NodeKind::Group(_) | NodeKind::Transform(..) => splice = true,
                NodeKind::Layer(_) => member = true,
            }
        }
        if splice {
            self.splice_child_in(ancestor, descendant);
        }
        if member {
            self.layer_member_connected(ancestor, descendant);
        }
        self.classify(ancestor);
        self.classify(descendant);
        self.dirty(ancestor);
    }

    /// Reverse of [`connect_descendant`](Self::connect_descendant); the
    /// descendant's own link memory is kept so a later insert can restore
    /// its position.
    pub(crate) fn disconnect_descendant(&mut self, ancestor: NodeId, descendant: NodeId) {
        let mut splice = false;
        let mut member = false;
        if let Some(node) = self.nodes.get_mut(&ancestor) {
            node.descendants.shift_remove(&descendant);
            match node.kind {
                NodeKind::Group(_) | NodeKind::Transform(..) => splice = true,
                NodeKind::Layer(_) => member = true,
            }
        }
        if splice {
            self.splice_child_out(ancestor, descendant);
        }
        if member {
            self.layer_member_disconnected(ancestor, descendant);
        }
        self.classify(ancestor);
        self.classify(descendant);
        self.dirty(ancestor);
    }

    /// Record `ancestor` on the descendant side; hierarchy nodes keep their
    /// nearest enclosing layer current.
    pub(crate) fn connect_ancestor(&mut self, node: NodeId, ancestor: NodeId) {
        let ancestor_is_layer = self.nodes.get(&ancestor).is_some_and(SceneNode::is_layer);
        if let Some(n) = self.nodes.get_mut(&node) {
            n.ancestors.insert(ancestor);
            if ancestor_is_layer {
                if let Some(h) = n.hierarchy_mut() {
                    h.nearest_layer = Some(ancestor);
                }
            }
        }
        self.classify(node);
        self.classify(ancestor);
    }

    /// Reverse of [`connect_ancestor`](Self::connect_ancestor).
    pub(crate) fn disconnect_ancestor(&mut self, node: NodeId, ancestor: NodeId) {
        let mut rescan = false;
        if let Some(n) = self.nodes.get_mut(&node) {
            n.ancestors.shift_remove(&ancestor);
            rescan = n.hierarchy().is_some_and(|h| h.nearest_layer == Some(ancestor));
        }
        if rescan {
            let next = self.nodes.get(&node).and_then(|n| {
                n.ancestors
                    .iter()
                    .copied()
                    .rev()
                    .find(|a| self.nodes.get(a).is_some_and(SceneNode::is_layer))
            });
            if let Some(h) = self.nodes.get_mut(&node).and_then(SceneNode::hierarchy_mut) {
                h.nearest_layer = next;
            }
        }
        self.classify(node);
        self.classify(ancestor);
    }

    // ----- dirty propagation ------------------------------------------------

    /// Dirty a node in its natural directions: hierarchy nodes both ways
    /// (their bounds live upstream), everything else downstream only.
    pub fn dirty(&mut self, id: NodeId) -> usize {
        let is_hierarchy = match self.nodes.get(&id) {
            Some(node) if node.in_graph => node.is_hierarchy(),
            _ => return 0,
        };
        let mut count = self.dirty_node(id, GraphDirection::Downstream);
        if is_hierarchy {
            count += self.dirty_node(id, GraphDirection::Upstream);
        }
        count
    }

    /// Walk the affected cone and mark every reachable cache Dirty.
    ///
    /// Already-dirty nodes are not re-walked, so diamond fan-in costs
    /// O(affected). Returns how many caches were newly dirtied.
    pub fn dirty_node(&mut self, id: NodeId, direction: GraphDirection) -> usize {
        let Some(node) = self.nodes.get_mut(&id) else {
            return 0;
        };
        if !node.in_graph {
            return 0;
        }

        let mut count = 0;
        if node.state.get(direction) != NodeState::Dirty {
            count += 1;
        }
        node.state.set(direction, NodeState::Dirty);

        // The start node always pushes its dependents even when it was
        // already dirty; an edge may have been added since it was marked.
        let mut stack: Vec<NodeId> = match direction {
            GraphDirection::Downstream => node.descendants.iter().copied().collect(),
            GraphDirection::Upstream => node.ancestors.iter().copied().collect(),
        };

        while let Some(next) = stack.pop() {
            let Some(node) = self.nodes.get_mut(&next) else {
                continue;
            };
            // Remembered edges into detached branches are not walked.
            if !node.in_graph || node.state.get(direction) == NodeState::Dirty {
                continue;
            }
            node.state.set(direction, NodeState::Dirty);
            count += 1;
            match direction {
                GraphDirection::Downstream => stack.extend(node.descendants.iter().copied()),
                GraphDirection::Upstream => stack.extend(node.ancestors.iter().copied()),
            }
        }

        count
    }

    // ----- prune / insert ---------------------------------------------------

    /// Detach a branch: this node plus its transitive descendants.
    ///
    /// The branch is marked with a fresh traversal id first, then each branch
    /// node is disconnected from ancestors *outside* the branch only; edges
    /// inside the branch and every node's own link memory are left untouched,
    /// which is what lets [`insert`](Self::insert) restore the exact
    /// structure. Returns the detached descendants.
    pub fn prune(&mut self, id: NodeId) -> Result<Vec<NodeId>, SceneError> {
        assert!(self.try_node(id)?.in_graph, "prune of a detached node");

        // Layers hold their members by bookkeeping, not ownership; release
        // the live edges but keep the persisted set for the matching insert.
        let released: Vec<NodeId> = if self.try_node(id)?.is_layer() {
            let members = self
                .try_node(id)?
                .descendants
                .iter()
                .copied()
                .collect();
            self.layer_prune_members(id);
            members
        } else {
            Vec::new()
        };

        let pass = self.assign_visited_id();
        let branch = self.mark_branch(id, pass);

        for &member in &branch {
            let outside: Vec<NodeId> = match self.nodes.get(&member) {
                Some(node) => node
                    .ancestors
                    .iter()
                    .copied()
                    .filter(|a| self.nodes.get(a).map_or(true, |n| n.visited != pass))
                    .collect(),
                None => continue,
            };
            for ancestor in outside {
                self.disconnect_descendant(ancestor, member);
            }
        }

        for &member in &branch {
            self.deregister_node(member);
        }
        // Released layer members re-bucket now that the layer is gone.
        for member in released {
            self.classify(member);
        }

        Ok(branch.into_iter().filter(|&m| m != id).collect())
    }

    /// Reattach a pruned branch; the exact inverse of
    /// [`prune`](Self::prune). Returns the reinserted descendants so callers
    /// can refresh their lookup tables.
    pub fn insert(&mut self, id: NodeId) -> Result<Vec<NodeId>, SceneError> {
        assert!(
            !self.try_node(id)?.in_graph,
            "insert of a node that was never pruned"
        );

        let pass = self.assign_visited_id();
        let branch = self.mark_branch(id, pass);

        for &member in &branch {
            self.register_node(member);
        }
        // Buckets settle only once the whole branch is live again.
        for &member in &branch {
            self.classify(member);
        }

        for &member in &branch {
            let outside: Vec<NodeId> = match self.nodes.get(&member) {
                Some(node) => node
                    .ancestors
                    .iter()
                    .copied()
                    .filter(|a| self.nodes.get(a).map_or(true, |n| n.visited != pass))
                    .collect(),
                None => continue,
            };
            for ancestor in outside {
                self.connect_descendant(ancestor, member);
            }
        }

        if self.try_node(id)?.is_layer() {
            self.layer_restore_members(id);
        }

        Ok(branch.into_iter().filter(|&m| m != id).collect())
    }

    /// Stamp `id` and its transitive descendants with `pass`; returns the
    /// branch, start node first.
    fn mark_branch(&mut self, id: NodeId, pass: u32) -> Vec<NodeId> {
        let mut branch = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            let Some(node) = self.nodes.get_mut(&next) else {
                continue;
            };
            if node.visited == pass {
                continue;
            }
            node.visited = pass;
            branch.push(next);
            stack.extend(node.descendants.iter().copied());
        }
        branch
    }

    // ----- evaluation -------------------------------------------------------

    /// Evaluate every dirty cache in dependency order.
    ///
    /// Dirty sinks pump Downstream (ancestors first), dirty sources pump
    /// Upstream (descendants first). A second call without intervening
    /// mutations evaluates nothing. One `Evaluated` event carries the whole
    /// batch unless `silent`.
    pub fn evaluate_graph(&mut self, silent: bool) -> EvaluateResult {
        let mut evaluated = Vec::new();

        let sinks: Vec<NodeId> = self.sinks.iter().copied().collect();
        for id in sinks {
            if self.node_state(id, GraphDirection::Downstream) == Some(NodeState::Dirty) {
                self.evaluate_into(id, GraphDirection::Downstream, &mut evaluated);
            }
        }

        let sources: Vec<NodeId> = self.sources.iter().copied().collect();
        for id in sources {
            if self.node_state(id, GraphDirection::Upstream) == Some(NodeState::Dirty) {
                self.evaluate_into(id, GraphDirection::Upstream, &mut evaluated);
            }
        }

        if !silent && !evaluated.is_empty() {
            self.push_event(SceneEvent::Evaluated(evaluated.clone()));
        }

        EvaluateResult { nodes: evaluated }
    }

    /// Recursive dependency-first evaluation. Cycles in the edge set would
    /// recurse without bound; acyclicity is the caller's invariant.
    fn evaluate_into(&mut self, id: NodeId, direction: GraphDirection, out: &mut Vec<NodeId>) {
        let dependencies: Vec<NodeId> = match (self.nodes.get(&id), direction) {
            (Some(node), GraphDirection::Downstream) => node.ancestors.iter().copied().collect(),
            (Some(node), GraphDirection::Upstream) => node.descendants.iter().copied().collect(),
            (None, _) => return,
        };

        for dep in dependencies {
            let dirty = self
                .nodes
                .get(&dep)
                .is_some_and(|n| n.in_graph && n.state.get(direction) == NodeState::Dirty);
            if dirty {
                self.evaluate_into(dep, direction, out);
            }
        }

        self.do_evaluate(id, direction);
        out.push(id);
    }

    /// Evaluating → kind-specific recompute → Clean. Never recurses into
    /// neighbours; ordering is the pump's job.
    fn do_evaluate(&mut self, id: NodeId, direction: GraphDirection) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.state.set(direction, NodeState::Evaluating);
        }

        let kind_is_hierarchy = self.nodes.get(&id).is_some_and(SceneNode::is_hierarchy);
        if kind_is_hierarchy {
            self.evaluate_hierarchy(id, direction);
        }
        // Layers recompute nothing; their flags are their state.

        if let Some(node) = self.nodes.get_mut(&id) {
            node.state.set(direction, NodeState::Clean);
        }
    }

    // ----- persistence ------------------------------------------------------

    /// Serialize to RON text; transient nodes and all derived state are
    /// excluded.
    pub fn to_ron(&self) -> Result<String, ron::Error> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
    }

    /// Parse a graph from RON text. Call [`initialize`](Self::initialize)
    /// before using it.
    pub fn from_ron(text: &str) -> Result<Self, ron::error::SpannedError> {
        ron::from_str(text)
    }

    /// Rebuild live structure after deserialization.
    ///
    /// Edges, buckets and caches are not persisted; this reconnects the
    /// hierarchy from each parent's stored child order, reattaches layer
    /// members, and dirties everything for the first pump.
    pub fn initialize(&mut self) {
        let ids: Vec<NodeId> = self.nodes.keys().copied().collect();

        for &id in &ids {
            if let Some(node) = self.nodes.get_mut(&id) {
                node.in_graph = true;
                node.visited = 0;
            }
        }
        for &id in &ids {
            self.classify(id);
        }

        // The persisted child lists carry the sibling order; reconnecting in
        // list order rebuilds the previous/next links as a side effect.
        for &id in &ids {
            let children: Vec<NodeId> = match self.nodes.get_mut(&id).and_then(SceneNode::hierarchy_mut)
            {
                Some(h) => std::mem::take(&mut h.children),
                None => continue,
            };
            for child in children {
                if self.nodes.contains_key(&child) {
                    let _ = self.create_dependency(child, id);
                } else {
                    tracing::debug!(parent = %id, %child, "child missing after load");
                }
            }
        }

        // Orphan cleanup, plus reattachment for a child its parent's list
        // somehow lost; those land at the end of the sibling order.
        for &id in &ids {
            let parent = self
                .nodes
                .get(&id)
                .and_then(SceneNode::hierarchy)
                .and_then(|h| h.parent);
            let Some(parent) = parent else { continue };
            if !self.nodes.contains_key(&parent) {
                tracing::warn!(node = %id, parent = %parent, "parent missing after load");
                if let Some(h) = self.nodes.get_mut(&id).and_then(SceneNode::hierarchy_mut) {
                    h.parent = None;
                }
            } else if !self
                .nodes
                .get(&id)
                .is_some_and(|n| n.ancestors.contains(&parent))
            {
                let _ = self.create_dependency(id, parent);
            }
        }

        let layers: Vec<NodeId> = ids
            .iter()
            .copied()
            .filter(|id| self.nodes.get(id).is_some_and(SceneNode::is_layer))
            .collect();
        for layer in layers {
            let _ = self.initialize_layer(layer);
        }

        for &id in &ids {
            self.dirty(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(graph: &mut SceneGraph, name: &str) -> NodeId {
        graph.add_node(SceneNode::new_group(name))
    }

    #[test]
    fn dependency_edges_are_mirrored() {
        let mut g = SceneGraph::new();
        let a = group(&mut g, "a");
        let b = group(&mut g, "b");

        g.create_dependency(b, a).unwrap();
        assert!(g.node(a).unwrap().descendants().contains(&b));
        assert!(g.node(b).unwrap().ancestors().contains(&a));

        g.remove_dependency(b, a).unwrap();
        assert!(g.node(a).unwrap().descendants().is_empty());
        assert!(g.node(b).unwrap().ancestors().is_empty());
    }

    #[test]
    fn buckets_track_edge_shape() {
        let mut g = SceneGraph::new();
        let a = group(&mut g, "a");
        let b = group(&mut g, "b");
        let c = group(&mut g, "c");
        let lone = group(&mut g, "lone");

        g.create_dependency(b, a).unwrap();
        g.create_dependency(c, b).unwrap();

        assert!(g.sources().contains(&a) && !g.sinks().contains(&a));
        assert!(g.intermediate().contains(&b));
        assert!(g.sinks().contains(&c) && !g.sources().contains(&c));
        // No edges at all: reachable from both pump directions.
        assert!(g.sources().contains(&lone) && g.sinks().contains(&lone));
    }

    #[test]
    fn dirty_walk_marks_each_node_once() {
        let mut g = SceneGraph::new();
        let a = group(&mut g, "a");
        let b = group(&mut g, "b");
        let c = group(&mut g, "c");
        let d = group(&mut g, "d");

        // Diamond: a fans out to b and c, both converge on d.
        g.create_dependency(b, a).unwrap();
        g.create_dependency(c, a).unwrap();
        g.create_dependency(d, b).unwrap();
        g.create_dependency(d, c).unwrap();

        g.evaluate_graph(true);
        assert_eq!(
            g.node_state(d, GraphDirection::Downstream),
            Some(NodeState::Clean)
        );

        let count = g.dirty_node(a, GraphDirection::Downstream);
        assert_eq!(count, 4);
        // All dirty already; nothing newly marked.
        assert_eq!(g.dirty_node(a, GraphDirection::Downstream), 0);
    }

    #[test]
    fn chain_evaluates_ancestor_first_downstream() {
        let mut g = SceneGraph::new();
        let a = group(&mut g, "a");
        let b = group(&mut g, "b");
        let c = group(&mut g, "c");
        g.create_dependency(b, a).unwrap();
        g.create_dependency(c, b).unwrap();

        let result = g.evaluate_graph(true);
        let pos = |id| result.nodes.iter().position(|&n| n == id).unwrap();
        assert!(pos(a) < pos(b) && pos(b) < pos(c));

        // Upstream pumps children first.
        let pos_up = |nodes: &[NodeId], id| nodes.iter().rposition(|&n| n == id).unwrap();
        let up = &result.nodes;
        assert!(pos_up(up, c) < pos_up(up, b) && pos_up(up, b) < pos_up(up, a));
    }

    #[test]
    fn evaluate_is_idempotent() {
        let mut g = SceneGraph::new();
        let a = group(&mut g, "a");
        let b = group(&mut g, "b");
        g.create_dependency(b, a).unwrap();

        let first = g.evaluate_graph(false);
        assert!(first.count() > 0);
        let second = g.evaluate_graph(false);
        assert_eq!(second.count(), 0);

        let events = g.drain_events();
        let evaluated: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, SceneEvent::Evaluated(_)))
            .collect();
        assert_eq!(evaluated.len(), 1);
    }

    #[test]
    fn prune_insert_restores_diamond_edges() {
        let mut g = SceneGraph::new();
        let root = group(&mut g, "root");
        let a = group(&mut g, "a");
        let b = group(&mut g, "b");
        let c = group(&mut g, "c");
        let d = group(&mut g, "d");

        g.create_dependency(a, root).unwrap();
        g.create_dependency(b, a).unwrap();
        g.create_dependency(c, a).unwrap();
        g.create_dependency(d, b).unwrap();
        g.create_dependency(d, c).unwrap();

        let pruned = g.prune(a).unwrap();
        assert_eq!(pruned.len(), 3);
        assert!(!g.node(a).unwrap().in_graph());
        assert!(!g.node(d).unwrap().in_graph());
        // The crossing edge is gone from the live side...
        assert!(!g.node(root).unwrap().descendants().contains(&a));
        // ...but branch-internal structure is untouched.
        assert!(g.node(a).unwrap().descendants().contains(&b));
        assert!(g.node(d).unwrap().ancestors().contains(&b));
        assert!(g.node(d).unwrap().ancestors().contains(&c));
        // The branch remembers where it was attached.
        assert!(g.node(a).unwrap().ancestors().contains(&root));

        let inserted = g.insert(a).unwrap();
        assert_eq!(inserted.len(), 3);
        assert!(g.node(root).unwrap().descendants().contains(&a));
        assert!(g.node(a).unwrap().in_graph());
        assert!(g.node(d).unwrap().in_graph());
        assert!(g.intermediate().contains(&a));
        assert!(g.sinks().contains(&d));
    }

    #[test]
    fn take_and_restore_round_trip() {
        let mut g = SceneGraph::new();
        let root = group(&mut g, "root");
        let a = group(&mut g, "a");
        g.create_dependency(a, root).unwrap();

        g.prune(a).unwrap();
        let node = g.take_node(a).unwrap();
        assert!(g.node(a).is_none());

        let restored = g.restore_node(node);
        assert_eq!(restored, a);
        g.insert(a).unwrap();
        assert!(g.node(root).unwrap().descendants().contains(&a));
    }

    #[test]
    fn remove_node_prunes_and_extracts() {
        let mut g = SceneGraph::new();
        let root = group(&mut g, "root");
        let a = group(&mut g, "a");
        let b = group(&mut g, "b");
        g.create_dependency(a, root).unwrap();
        g.create_dependency(b, a).unwrap();

        let node = g.remove_node(a).unwrap();
        assert_eq!(node.id(), a);
        assert!(g.node(a).is_none());
        // The rest of the branch stays in the arena, detached.
        assert!(!g.node(b).unwrap().in_graph());
        assert!(g.node(root).unwrap().descendants().is_empty());
    }

    #[test]
    fn visited_id_wraps_around() {
        let mut g = SceneGraph::new();
        let a = group(&mut g, "a");

        g.visited = u32::MAX - 1;
        assert_eq!(g.assign_visited_id(), u32::MAX);
        if let Some(node) = g.nodes.get_mut(&a) {
            node.visited = u32::MAX;
        }

        // Wraparound resets every node before issuing the next id.
        assert_eq!(g.assign_visited_id(), 1);
        assert_eq!(g.node(a).unwrap().visited, 0);
    }

    #[test]
    fn persistence_round_trips_structure() {
        use glam::Vec3;

        let mut g = SceneGraph::new();
        let root = g.add_node(SceneNode::new_group("root"));
        let child = g.add_node(SceneNode::new_transform("child"));
        g.add_child(root, child).unwrap();
        g.set_translate(child, Vec3::new(1.0, 2.0, 3.0)).unwrap();
        let layer = g.add_node(SceneNode::new_layer("layer"));
        g.add_to_layer(child, layer).unwrap();
        let scratch = g.add_node(SceneNode::new_group("scratch"));
        g.node_mut(scratch).unwrap().set_transient(true);
        g.evaluate_graph(true);

        let text = g.to_ron().unwrap();
        let mut loaded = SceneGraph::from_ron(&text).unwrap();
        loaded.initialize();
        loaded.evaluate_graph(true);

        // Transient scaffolding never hits the file.
        assert!(loaded.node(scratch).is_none());
        assert_eq!(loaded.parent_of(child), Some(root));
        assert_eq!(loaded.children_of(root), &[child]);
        assert!(loaded
            .node(layer)
            .unwrap()
            .layer()
            .unwrap()
            .members()
            .contains(&child));
        let t = loaded.node(child).unwrap().transform().unwrap();
        assert!((t.translate() - Vec3::new(1.0, 2.0, 3.0)).length() < 1e-6);
        assert!(
            (t.global_transform().w_axis.truncate() - Vec3::new(1.0, 2.0, 3.0)).length() < 1e-4
        );
    }

    #[test]
    fn rename_queues_event() {
        let mut g = SceneGraph::new();
        let a = group(&mut g, "before");
        g.drain_events();
        g.set_name(a, "after").unwrap();
        assert_eq!(g.node(a).unwrap().name(), "after");
        assert!(g
            .drain_events()
            .iter()
            .any(|e| matches!(e, SceneEvent::NodeRenamed { old_name, .. } if old_name == "before")));
    }
}
