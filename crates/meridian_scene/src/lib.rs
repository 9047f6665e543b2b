// SPDX-License-Identifier: MIT OR Apache-2.0
//! Scene dependency graph and node-evaluation engine for Meridian Editor.
//!
//! This crate provides the core that keeps an interactive 3-D scene
//! consistent while it is being edited:
//! - Dependency tracking between nodes with mirrored edge sets
//! - Dirty propagation and ordered recomputation of cached state
//! - Live detach/reattach (prune/insert) that undo/redo can rely on
//! - Hierarchy, transform and layer node kinds on top of the common graph
//!
//! ## Architecture
//!
//! The [`SceneGraph`] owns every node in an arena keyed by [`NodeId`]. Cached
//! state is split by direction: ancestor-derived caches (global transforms,
//! visibility) evaluate Downstream, descendant-derived caches (aggregate
//! bounds) evaluate Upstream. One [`evaluate_graph`](SceneGraph::evaluate_graph)
//! call per displayed frame settles everything that editing dirtied.

pub mod bounds;
pub mod events;
pub mod graph;
pub mod hierarchy;
pub mod layer;
pub mod math;
pub mod node;
pub mod transform;

pub use bounds::AlignedBox;
pub use events::{EvaluateResult, SceneEvent};
pub use graph::{SceneError, SceneGraph};
pub use hierarchy::HierarchyState;
pub use layer::LayerState;
pub use math::Shear;
pub use node::{GraphDirection, NodeId, NodeKind, NodeState, SceneNode};
pub use transform::TransformState;
