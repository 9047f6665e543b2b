// SPDX-License-Identifier: MIT OR Apache-2.0
//! Layers: flat membership sets over hierarchy nodes.
//!
//! A layer holds its members through ordinary dependency edges plus a
//! persisted id set that survives prune, save and load. Hiding or locking a
//! layer reaches its members through normal downstream propagation.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::graph::{SceneError, SceneGraph};
use crate::node::{NodeId, SceneNode};

/// Layer payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerState {
    pub(crate) members: IndexSet<NodeId>,
    pub(crate) visible: bool,
    pub(crate) selectable: bool,
    pub(crate) color: [u8; 3],
}

impl Default for LayerState {
    fn default() -> Self {
        Self {
            members: IndexSet::new(),
            visible: true,
            selectable: true,
            color: [128, 128, 128],
        }
    }
}

impl LayerState {
    /// Persisted member ids; superset of the live member edges.
    pub fn members(&self) -> &IndexSet<NodeId> {
        &self.members
    }

    /// Whether members of this layer are shown.
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Whether members of this layer can be picked.
    pub fn is_selectable(&self) -> bool {
        self.selectable
    }

    /// Display color in the outliner and viewport.
    pub fn color(&self) -> [u8; 3] {
        self.color
    }
}

impl SceneGraph {
    fn try_layer(&self, id: NodeId) -> Result<&LayerState, SceneError> {
        self.try_node(id)?.layer().ok_or(SceneError::NotALayer(id))
    }

    fn try_layer_mut(&mut self, id: NodeId) -> Result<&mut LayerState, SceneError> {
        self.try_node_mut(id)?
            .layer_mut()
            .ok_or(SceneError::NotALayer(id))
    }

    /// Put a node into a layer.
    pub fn add_to_layer(&mut self, node: NodeId, layer: NodeId) -> Result<(), SceneError> {
        self.try_layer(layer)?;
        self.create_dependency(node, layer)
    }

    /// Take a node out of a layer.
    pub fn remove_from_layer(&mut self, node: NodeId, layer: NodeId) -> Result<(), SceneError> {
        self.try_layer(layer)?;
        self.remove_dependency(node, layer)
    }

    /// Show or hide the layer's members.
    pub fn set_layer_visible(&mut self, layer: NodeId, visible: bool) -> Result<(), SceneError> {
        self.try_layer_mut(layer)?.visible = visible;
        self.dirty(layer);
        Ok(())
    }

    /// Lock or unlock the layer's members for picking.
    pub fn set_layer_selectable(
        &mut self,
        layer: NodeId,
        selectable: bool,
    ) -> Result<(), SceneError> {
        self.try_layer_mut(layer)?.selectable = selectable;
        self.dirty(layer);
        Ok(())
    }

    /// Change the layer's display color.
    pub fn set_layer_color(&mut self, layer: NodeId, color: [u8; 3]) -> Result<(), SceneError> {
        self.try_layer_mut(layer)?.color = color;
        Ok(())
    }

    /// Post-load reconnect: resolve every persisted member id to a live node
    /// and rebuild the edges; ids that no longer resolve are dropped.
    pub fn initialize_layer(&mut self, layer: NodeId) -> Result<(), SceneError> {
        let members: Vec<NodeId> = {
            let state = self.try_layer_mut(layer)?;
            state.members.drain(..).collect()
        };
        for member in members {
            if self.node(member).is_some_and(|n| n.in_graph) {
                self.create_dependency(member, layer)?;
            } else {
                tracing::debug!(%layer, %member, "dropping unresolvable layer member");
            }
        }
        Ok(())
    }

    /// Edge dispatch: a new live member joins the persisted set.
    pub(crate) fn layer_member_connected(&mut self, layer: NodeId, member: NodeId) {
        if let Some(state) = self.try_node_mut(layer).ok().and_then(SceneNode::layer_mut) {
            debug_assert!(
                !state.members.contains(&member),
                "layer member connected twice"
            );
            state.members.insert(member);
        }
    }

    /// Edge dispatch: a departing live member leaves the persisted set.
    pub(crate) fn layer_member_disconnected(&mut self, layer: NodeId, member: NodeId) {
        if let Some(state) = self.try_node_mut(layer).ok().and_then(SceneNode::layer_mut) {
            state.members.shift_remove(&member);
        }
    }

    /// Prune support: release every live member edge but put the persisted
    /// set back, so the matching insert can restore membership. Members keep
    /// the layer in their ancestor memory for the same reason.
    pub(crate) fn layer_prune_members(&mut self, layer: NodeId) {
        let (members, descendants) = match self.node(layer) {
            Some(node) => (
                node.layer().map(|l| l.members.clone()).unwrap_or_default(),
                node.descendants.iter().copied().collect::<Vec<_>>(),
            ),
            None => return,
        };
        for descendant in descendants {
            self.disconnect_descendant(layer, descendant);
        }
        if let Some(state) = self.try_node_mut(layer).ok().and_then(SceneNode::layer_mut) {
            state.members = members;
        }
    }

    /// Insert support: restore an edge for every member id that resolves to
    /// a live node. Unresolvable ids are kept; a later partial load may
    /// still bring them back.
    pub(crate) fn layer_restore_members(&mut self, layer: NodeId) {
        let members: Vec<NodeId> = match self.node(layer).and_then(SceneNode::layer) {
            Some(state) => state.members.iter().copied().collect(),
            None => return,
        };
        if let Some(state) = self.try_node_mut(layer).ok().and_then(SceneNode::layer_mut) {
            state.members.clear();
        }
        for member in members {
            if self.node(member).is_some_and(|n| n.in_graph) {
                self.connect_descendant(layer, member);
            } else {
                tracing::debug!(%layer, %member, "layer member not live; keeping id for later");
                if let Some(state) =
                    self.try_node_mut(layer).ok().and_then(SceneNode::layer_mut)
                {
                    state.members.insert(member);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{GraphDirection, NodeState};

    fn layer_with_members(g: &mut SceneGraph, count: usize) -> (NodeId, Vec<NodeId>) {
        let layer = g.add_node(SceneNode::new_layer("layer"));
        let mut members = Vec::new();
        for i in 0..count {
            let m = g.add_node(SceneNode::new_group(format!("m{i}")));
            g.add_to_layer(m, layer).unwrap();
            members.push(m);
        }
        (layer, members)
    }

    #[test]
    fn membership_tracks_dependency_edges() {
        let mut g = SceneGraph::new();
        let (layer, members) = layer_with_members(&mut g, 2);

        let state = g.node(layer).unwrap().layer().unwrap();
        assert!(state.members().contains(&members[0]));
        assert!(state.members().contains(&members[1]));

        g.remove_from_layer(members[0], layer).unwrap();
        let state = g.node(layer).unwrap().layer().unwrap();
        assert!(!state.members().contains(&members[0]));
        assert!(state.members().contains(&members[1]));
    }

    #[test]
    fn hidden_layer_hides_and_locks_members() {
        let mut g = SceneGraph::new();
        let (layer, members) = layer_with_members(&mut g, 1);
        g.evaluate_graph(true);

        g.set_layer_visible(layer, false).unwrap();
        g.set_layer_selectable(layer, false).unwrap();
        g.evaluate_graph(true);

        let h = g.node(members[0]).unwrap().hierarchy().unwrap();
        assert!(!h.is_visible());
        assert!(!h.is_selectable());
        assert_eq!(h.nearest_layer(), Some(layer));
    }

    #[test]
    fn prune_keeps_members_and_insert_restores_edges() {
        let mut g = SceneGraph::new();
        let (layer, members) = layer_with_members(&mut g, 2);

        g.prune(layer).unwrap();
        assert!(!g.node(layer).unwrap().in_graph());
        assert!(g.node(layer).unwrap().descendants().is_empty());
        let state = g.node(layer).unwrap().layer().unwrap();
        assert_eq!(state.members().len(), 2);
        // Members stay live; only the layer left the graph.
        assert!(g.node(members[0]).unwrap().in_graph());

        g.insert(layer).unwrap();
        assert!(g.node(layer).unwrap().descendants().contains(&members[0]));
        assert!(g.node(layer).unwrap().descendants().contains(&members[1]));
        assert_eq!(g.node(layer).unwrap().layer().unwrap().members().len(), 2);
    }

    #[test]
    fn unresolvable_member_is_kept_and_skipped() {
        let mut g = SceneGraph::new();
        let (layer, members) = layer_with_members(&mut g, 1);
        // A member id from a not-yet-loaded part of the scene.
        let ghost = NodeId::new();
        if let Some(state) = g.try_node_mut(layer).ok().and_then(SceneNode::layer_mut) {
            state.members.insert(ghost);
        }

        g.prune(layer).unwrap();
        g.insert(layer).unwrap();

        let node = g.node(layer).unwrap();
        // The live member got its edge back; the ghost kept its slot.
        assert!(node.descendants().contains(&members[0]));
        assert!(!node.descendants().contains(&ghost));
        assert!(node.layer().unwrap().members().contains(&ghost));
    }

    #[test]
    fn pruning_a_member_updates_the_persisted_set() {
        let mut g = SceneGraph::new();
        let (layer, members) = layer_with_members(&mut g, 2);

        // Pruning the member releases its slot; reinserting takes it back.
        g.prune(members[1]).unwrap();
        assert!(!g
            .node(layer)
            .unwrap()
            .layer()
            .unwrap()
            .members()
            .contains(&members[1]));

        g.insert(members[1]).unwrap();
        assert!(g
            .node(layer)
            .unwrap()
            .layer()
            .unwrap()
            .members()
            .contains(&members[1]));
    }

    #[test]
    fn dirty_walk_stops_at_a_detached_layer() {
        let mut g = SceneGraph::new();
        let (layer, members) = layer_with_members(&mut g, 1);
        g.evaluate_graph(true);

        g.prune(layer).unwrap();
        // The member remembers the layer as an ancestor; the upstream walk
        // must not follow that edge out of the live graph.
        let count = g.dirty_node(members[0], GraphDirection::Upstream);
        assert_eq!(count, 1);
        assert_eq!(
            g.node(layer).unwrap().state(GraphDirection::Upstream),
            NodeState::Clean
        );
    }

    #[test]
    fn initialize_layer_trims_dead_ids() {
        let mut g = SceneGraph::new();
        let (layer, members) = layer_with_members(&mut g, 1);
        let ghost = NodeId::new();
        if let Some(state) = g.try_node_mut(layer).ok().and_then(SceneNode::layer_mut) {
            state.members.insert(ghost);
        }

        g.initialize_layer(layer).unwrap();

        let state = g.node(layer).unwrap().layer().unwrap();
        assert!(state.members().contains(&members[0]));
        assert!(!state.members().contains(&ghost));
    }

    #[test]
    fn duplicate_copies_layer_membership() {
        let mut g = SceneGraph::new();
        let (layer, members) = layer_with_members(&mut g, 1);

        let copy = g.duplicate(members[0]).unwrap();

        let state = g.node(layer).unwrap().layer().unwrap();
        assert!(state.members().contains(&members[0]));
        assert!(state.members().contains(&copy));
    }
}
