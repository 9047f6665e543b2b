// SPDX-License-Identifier: MIT OR Apache-2.0
//! Parent/child structure layered on top of the dependency edges.
//!
//! A hierarchy node's parent edge is an ordinary dependency; on top of it the
//! parent keeps an ordered child list and each child remembers its siblings,
//! so a pruned child reinserted by undo lands back in its old position.
//! Visibility and selectability are derived downstream (parent and ancestor
//! layers), aggregate bounds upstream (children).

use glam::Mat4;
use serde::{Deserialize, Serialize};

use crate::bounds::AlignedBox;
use crate::events::SceneEvent;
use crate::graph::{SceneError, SceneGraph};
use crate::node::{GraphDirection, NodeId, SceneNode};

fn default_true() -> bool {
    true
}

/// Hierarchy payload shared by group and transform nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HierarchyState {
    pub(crate) parent: Option<NodeId>,
    #[serde(skip)]
    pub(crate) previous: Option<NodeId>,
    #[serde(skip)]
    pub(crate) next: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) object_bounds: AlignedBox,
    #[serde(skip)]
    pub(crate) hierarchy_bounds: AlignedBox,
    pub(crate) hidden: bool,
    #[serde(skip, default = "default_true")]
    pub(crate) visible: bool,
    #[serde(skip, default = "default_true")]
    pub(crate) selectable: bool,
    #[serde(skip)]
    pub(crate) nearest_layer: Option<NodeId>,
}

impl Default for HierarchyState {
    fn default() -> Self {
        Self {
            parent: None,
            previous: None,
            next: None,
            children: Vec::new(),
            object_bounds: AlignedBox::EMPTY,
            hierarchy_bounds: AlignedBox::EMPTY,
            hidden: false,
            visible: true,
            selectable: true,
            nearest_layer: None,
        }
    }
}

impl HierarchyState {
    /// Parent node id, if parented.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Previous sibling in the parent's child order.
    pub fn previous_sibling(&self) -> Option<NodeId> {
        self.previous
    }

    /// Next sibling in the parent's child order.
    pub fn next_sibling(&self) -> Option<NodeId> {
        self.next
    }

    /// Ordered children.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Bounds of this node's own geometry, in its local frame.
    pub fn object_bounds(&self) -> AlignedBox {
        self.object_bounds
    }

    /// Aggregate bounds of this node and its children, in its local frame.
    pub fn hierarchy_bounds(&self) -> AlignedBox {
        self.hierarchy_bounds
    }

    /// Explicitly hidden by the user.
    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    /// Computed visibility as of the last evaluation.
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Computed selectability as of the last evaluation.
    pub fn is_selectable(&self) -> bool {
        self.selectable
    }

    /// Innermost layer this node belongs to.
    pub fn nearest_layer(&self) -> Option<NodeId> {
        self.nearest_layer
    }

    /// Drop links and caches for a duplicated copy.
    pub(crate) fn reset_links(&mut self) {
        self.parent = None;
        self.previous = None;
        self.next = None;
        self.children.clear();
        self.hierarchy_bounds = AlignedBox::EMPTY;
        self.visible = true;
        self.selectable = true;
        self.nearest_layer = None;
    }
}

impl SceneGraph {
    /// Ordered children of a hierarchy node (empty for anything else).
    pub fn children_of(&self, id: NodeId) -> &[NodeId] {
        self.node(id)
            .and_then(SceneNode::hierarchy)
            .map_or(&[], |h| h.children.as_slice())
    }

    /// Parent of a hierarchy node.
    pub fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(SceneNode::hierarchy)?.parent
    }

    fn try_hierarchy(&self, id: NodeId) -> Result<&HierarchyState, SceneError> {
        self.try_node(id)?
            .hierarchy()
            .ok_or(SceneError::NotAHierarchyNode(id))
    }

    /// Parent `child` under `parent`; the child must be unparented.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), SceneError> {
        self.try_hierarchy(parent)?;
        {
            let node = self.try_node_mut(child)?;
            let h = node
                .hierarchy_mut()
                .ok_or(SceneError::NotAHierarchyNode(child))?;
            debug_assert!(
                h.parent.is_none() || h.parent == Some(parent),
                "child already has a different parent"
            );
            h.parent = Some(parent);
        }
        self.create_dependency(child, parent)
    }

    /// Unparent `child` from `parent`.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), SceneError> {
        self.try_hierarchy(parent)?;
        debug_assert_eq!(self.try_hierarchy(child)?.parent, Some(parent));
        self.remove_dependency(child, parent)?;
        if let Some(h) = self
            .try_node_mut(child)?
            .hierarchy_mut()
        {
            h.parent = None;
        }
        Ok(())
    }

    /// Reparent without veto; `None` detaches to the root level.
    /// Raises `ParentChanged`.
    pub fn set_parent(&mut self, child: NodeId, parent: Option<NodeId>) -> Result<(), SceneError> {
        let old = self.try_hierarchy(child)?.parent;
        if old == parent {
            return Ok(());
        }
        if let Some(old_parent) = old {
            self.remove_child(old_parent, child)?;
        }
        if let Some(new_parent) = parent {
            self.add_child(new_parent, child)?;
        }
        self.push_event(SceneEvent::ParentChanged {
            node: child,
            old_parent: old,
        });
        Ok(())
    }

    /// Hide or show a node; derived visibility updates on the next pump.
    pub fn set_hidden(&mut self, id: NodeId, hidden: bool) -> Result<(), SceneError> {
        self.try_hierarchy(id)?;
        if let Some(h) = self.try_node_mut(id)?.hierarchy_mut() {
            h.hidden = hidden;
        }
        self.dirty(id);
        Ok(())
    }

    /// Replace a node's own geometry bounds (local frame).
    pub fn set_object_bounds(&mut self, id: NodeId, bounds: AlignedBox) -> Result<(), SceneError> {
        self.try_hierarchy(id)?;
        if let Some(h) = self.try_node_mut(id)?.hierarchy_mut() {
            h.object_bounds = bounds;
        }
        self.dirty(id);
        Ok(())
    }

    /// Reverse the child order in place, relinking the sibling list.
    pub fn reverse_children(&mut self, id: NodeId) -> Result<(), SceneError> {
        self.try_hierarchy(id)?;
        let children: Vec<NodeId> = {
            let Some(h) = self.try_node_mut(id)?.hierarchy_mut() else {
                return Ok(());
            };
            h.children.reverse();
            h.children.clone()
        };
        let mut prev: Option<NodeId> = None;
        for &child in &children {
            if let Some(h) = self
                .try_node_mut(child)
                .ok()
                .and_then(SceneNode::hierarchy_mut)
            {
                h.previous = prev;
                h.next = None;
            }
            if let Some(p) = prev {
                if let Some(h) = self.try_node_mut(p).ok().and_then(SceneNode::hierarchy_mut) {
                    h.next = Some(child);
                }
            }
            prev = Some(child);
        }
        self.dirty(id);
        Ok(())
    }

    /// Deep-copy a subtree with fresh ids.
    ///
    /// Non-hierarchy dependencies are recreated on each copy, so layer
    /// membership survives; the child tree is rebuilt by reparenting clones.
    /// The copy is left unparented for the caller to place.
    pub fn duplicate(&mut self, id: NodeId) -> Result<NodeId, SceneError> {
        let (clone, ancestors, descendants, children) = {
            let original = self.try_node(id)?;
            if original.hierarchy().is_none() {
                return Err(SceneError::NotAHierarchyNode(id));
            }
            (
                original.duplicated(),
                original.ancestors.iter().copied().collect::<Vec<_>>(),
                original.descendants.iter().copied().collect::<Vec<_>>(),
                original
                    .hierarchy()
                    .map(|h| h.children.clone())
                    .unwrap_or_default(),
            )
        };
        let clone_id = self.add_node(clone);

        for ancestor in ancestors {
            if self.node(ancestor).is_some_and(|n| !n.is_hierarchy()) {
                self.create_dependency(clone_id, ancestor)?;
            }
        }
        for descendant in descendants {
            if self.node(descendant).is_some_and(|n| !n.is_hierarchy()) {
                self.create_dependency(descendant, clone_id)?;
            }
        }

        for child in children {
            let child_clone = self.duplicate(child)?;
            self.set_parent(child_clone, Some(clone_id))?;
        }

        Ok(clone_id)
    }

    /// Depth-first name search from `root`, case-insensitive; `root` itself
    /// is a candidate and the first match in child order wins.
    pub fn find(&self, root: NodeId, name: &str) -> Option<NodeId> {
        let node = self.node(root)?;
        if node.name.eq_ignore_ascii_case(name) {
            return Some(root);
        }
        for &child in &node.hierarchy()?.children {
            if let Some(found) = self.find(child, name) {
                return Some(found);
            }
        }
        None
    }

    /// Resolve a `|`-delimited path of names below `root`, case-insensitive.
    pub fn find_from_path(&self, root: NodeId, path: &str) -> Option<NodeId> {
        let mut current = root;
        let mut walked = false;
        for segment in path.split('|').filter(|s| !s.is_empty()) {
            walked = true;
            current = self.children_of(current).iter().copied().find(|&c| {
                self.node(c)
                    .is_some_and(|n| n.name.eq_ignore_ascii_case(segment))
            })?;
        }
        walked.then_some(current)
    }

    /// `|`-delimited path of a node below its hierarchy root; the root node
    /// itself does not appear in the path.
    pub fn node_path(&self, id: NodeId) -> String {
        let Some(node) = self.node(id) else {
            return String::new();
        };
        let mut path = format!("|{}", node.name);
        let mut current = node.hierarchy().and_then(|h| h.parent);
        while let Some(parent) = current {
            let Some(parent_node) = self.node(parent) else {
                break;
            };
            let grandparent = parent_node.hierarchy().and_then(|h| h.parent);
            if grandparent.is_none() {
                break;
            }
            path = format!("|{}{}", parent_node.name, path);
            current = grandparent;
        }
        path
    }

    // ----- sibling splice (called from edge dispatch) -----------------------

    /// Put a reconnecting child back into the sibling list, honoring its
    /// remembered previous/next when those are still siblings.
    pub(crate) fn splice_child_in(&mut self, parent: NodeId, child: NodeId) {
        let is_child = self
            .node(child)
            .and_then(SceneNode::hierarchy)
            .is_some_and(|h| h.parent == Some(parent));
        if !is_child {
            return;
        }
        let Some((mut prev, mut next)) = self
            .node(child)
            .and_then(SceneNode::hierarchy)
            .map(|h| (h.previous, h.next))
        else {
            return;
        };
        let children: Vec<NodeId> = match self.node(parent).and_then(SceneNode::hierarchy) {
            Some(h) => h.children.clone(),
            None => return,
        };
        if children.contains(&child) {
            return;
        }

        // Stale memory from a previous family is dropped.
        if prev.is_some_and(|p| !children.contains(&p)) {
            prev = None;
        }
        if next.is_some_and(|n| !children.contains(&n)) {
            next = None;
        }

        if let Some(next_id) = next {
            if let Some(h) = self
                .nodes_hierarchy_mut(next_id)
            {
                h.previous = Some(child);
            }
            if let Some(prev_id) = prev {
                if let Some(h) = self.nodes_hierarchy_mut(prev_id) {
                    h.next = Some(child);
                }
            }
            if let Some(h) = self.nodes_hierarchy_mut(child) {
                h.previous = prev;
                h.next = Some(next_id);
            }
            if let Some(h) = self.nodes_hierarchy_mut(parent) {
                let pos = h
                    .children
                    .iter()
                    .position(|&c| c == next_id)
                    .unwrap_or(h.children.len());
                h.children.insert(pos, child);
            }
        } else {
            let back = children.last().copied();
            if let Some(back_id) = back {
                if let Some(h) = self.nodes_hierarchy_mut(back_id) {
                    h.next = Some(child);
                }
            }
            if let Some(h) = self.nodes_hierarchy_mut(child) {
                h.previous = back;
                h.next = None;
            }
            if let Some(h) = self.nodes_hierarchy_mut(parent) {
                h.children.push(child);
            }
        }
    }

    /// Unlink a child from the sibling list; the child's own previous/next
    /// are kept so a matching insert can restore its position.
    pub(crate) fn splice_child_out(&mut self, parent: NodeId, child: NodeId) {
        let is_child = self
            .node(child)
            .and_then(SceneNode::hierarchy)
            .is_some_and(|h| h.parent == Some(parent));
        if !is_child {
            return;
        }
        let Some((prev, next)) = self
            .node(child)
            .and_then(SceneNode::hierarchy)
            .map(|h| (h.previous, h.next))
        else {
            return;
        };
        if let Some(prev_id) = prev {
            if let Some(h) = self.nodes_hierarchy_mut(prev_id) {
                h.next = next;
            }
        }
        if let Some(next_id) = next {
            if let Some(h) = self.nodes_hierarchy_mut(next_id) {
                h.previous = prev;
            }
        }
        if let Some(h) = self.nodes_hierarchy_mut(parent) {
            h.children.retain(|&c| c != child);
        }
    }

    fn nodes_hierarchy_mut(&mut self, id: NodeId) -> Option<&mut HierarchyState> {
        self.try_node_mut(id).ok().and_then(SceneNode::hierarchy_mut)
    }

    // ----- evaluation -------------------------------------------------------

    pub(crate) fn evaluate_hierarchy(&mut self, id: NodeId, direction: GraphDirection) {
        match direction {
            GraphDirection::Downstream => {
                if self.node(id).and_then(SceneNode::transform).is_some() {
                    self.evaluate_transform(id);
                }
                self.evaluate_visibility(id);
            }
            GraphDirection::Upstream => self.evaluate_bounds(id),
        }
    }

    /// Visibility = own !hidden ∧ parent visible ∧ every live ancestor layer
    /// visible; selectability follows the layers alone. Raises
    /// `VisibilityChanged` only on an actual flip.
    fn evaluate_visibility(&mut self, id: NodeId) {
        let Some((hidden, parent, old_visible, ancestors)) = self.node(id).and_then(|n| {
            n.hierarchy()
                .map(|h| (h.hidden, h.parent, h.visible, n.ancestors.clone()))
        }) else {
            return;
        };

        let mut visible = !hidden;
        if let Some(parent_id) = parent {
            if let Some(h) = self
                .node(parent_id)
                .filter(|n| n.in_graph)
                .and_then(SceneNode::hierarchy)
            {
                visible = visible && h.visible;
            }
        }

        let mut selectable = true;
        for ancestor in ancestors {
            if let Some(layer) = self
                .node(ancestor)
                .filter(|n| n.in_graph)
                .and_then(SceneNode::layer)
            {
                visible = visible && layer.visible;
                selectable = selectable && layer.selectable;
            }
        }

        if let Some(h) = self.nodes_hierarchy_mut(id) {
            h.visible = visible;
            h.selectable = selectable;
        }
        if visible != old_visible {
            self.push_event(SceneEvent::VisibilityChanged(id));
        }
    }

    /// Hierarchy bounds = own object bounds ∪ each child's hierarchy bounds
    /// re-expressed in this node's frame. A child sharing this node's
    /// transform anchor merges directly.
    fn evaluate_bounds(&mut self, id: NodeId) {
        let Some((children, mut bounds)) = self
            .node(id)
            .and_then(SceneNode::hierarchy)
            .map(|h| (h.children.clone(), h.object_bounds))
        else {
            return;
        };

        let self_anchor = self.transform_anchor(Some(id));
        let self_inverse = self_anchor
            .and_then(|a| self.node(a))
            .and_then(SceneNode::transform)
            .map_or(Mat4::IDENTITY, |t| t.inverse_global);

        for child in children {
            let Some(child_bounds) = self
                .node(child)
                .and_then(SceneNode::hierarchy)
                .map(HierarchyState::hierarchy_bounds)
            else {
                continue;
            };
            let child_anchor = self.transform_anchor(Some(child));
            if child_anchor == self_anchor {
                bounds.merge(&child_bounds);
            } else {
                let child_global = child_anchor
                    .and_then(|a| self.node(a))
                    .and_then(SceneNode::transform)
                    .map_or(Mat4::IDENTITY, |t| t.global);
                bounds.merge(&child_bounds.transformed(self_inverse * child_global));
            }
        }

        if let Some(h) = self.nodes_hierarchy_mut(id) {
            h.hierarchy_bounds = bounds;
        }
    }
}
