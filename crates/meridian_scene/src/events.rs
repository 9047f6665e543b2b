// SPDX-License-Identifier: MIT OR Apache-2.0
//! Change notifications raised by the graph.
//!
//! The graph queues events as mutations and evaluation happen; consumers
//! (outliner, property panels, layer UI) drain the queue after each pump.

use crate::node::NodeId;

/// A change the graph wants its observers to see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneEvent {
    /// A node was registered with the graph.
    NodeAdded(NodeId),
    /// A node was deregistered from the graph (it may still be in the arena).
    NodeRemoved(NodeId),
    /// A node's name changed.
    NodeRenamed {
        /// The renamed node.
        node: NodeId,
        /// Its name before the change.
        old_name: String,
    },
    /// A hierarchy node moved to a different parent.
    ParentChanged {
        /// The reparented node.
        node: NodeId,
        /// Its parent before the change.
        old_parent: Option<NodeId>,
    },
    /// A node's computed visibility flipped.
    VisibilityChanged(NodeId),
    /// An evaluation pass completed; carries every node it touched.
    Evaluated(Vec<NodeId>),
}

/// Outcome of one [`evaluate_graph`](crate::graph::SceneGraph::evaluate_graph)
/// pass.
#[derive(Debug, Clone, Default)]
pub struct EvaluateResult {
    /// Every node evaluated this pass, dependency order.
    pub nodes: Vec<NodeId>,
}

impl EvaluateResult {
    /// Number of nodes evaluated.
    pub fn count(&self) -> usize {
        self.nodes.len()
    }
}
