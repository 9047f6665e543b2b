// SPDX-License-Identifier: MIT OR Apache-2.0
//! Transform components and the cached matrix pipeline.
//!
//! A transform node composes `object = T(translate) * rotate_component *
//! scale_component`, where each component wraps its part of the transform in
//! pivot translations. Pivot setters fold the resulting shift into a
//! compensating translate, so moving a pivot never moves the object. Global
//! matrices chain through the nearest ancestor transform while `inherit` is
//! set; the bind pair snapshots the global lazily.

use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::graph::{SceneError, SceneGraph};
use crate::math::{decompose, decompose_with_pivots, euler_from_quat, quat_from_euler, Shear};
use crate::node::{NodeId, SceneNode};

fn default_bind_dirty() -> bool {
    true
}

/// Transform payload: components, pivots and the cached matrices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformState {
    pub(crate) scale: Vec3,
    pub(crate) rotate: Vec3,
    pub(crate) translate: Vec3,
    pub(crate) inherit: bool,
    pub(crate) shear: Shear,
    pub(crate) scale_pivot: Vec3,
    pub(crate) scale_pivot_translate: Vec3,
    pub(crate) rotate_pivot: Vec3,
    pub(crate) rotate_pivot_translate: Vec3,
    pub(crate) translate_pivot: Vec3,
    pub(crate) snap_pivots: bool,
    #[serde(skip)]
    pub(crate) object: Mat4,
    #[serde(skip)]
    pub(crate) inverse_object: Mat4,
    #[serde(skip)]
    pub(crate) global: Mat4,
    #[serde(skip)]
    pub(crate) inverse_global: Mat4,
    #[serde(skip)]
    pub(crate) bind: Mat4,
    #[serde(skip)]
    pub(crate) inverse_bind: Mat4,
    #[serde(skip, default = "default_bind_dirty")]
    pub(crate) bind_dirty: bool,
}

impl Default for TransformState {
    fn default() -> Self {
        Self {
            scale: Vec3::ONE,
            rotate: Vec3::ZERO,
            translate: Vec3::ZERO,
            inherit: true,
            shear: Shear::IDENTITY,
            scale_pivot: Vec3::ZERO,
            scale_pivot_translate: Vec3::ZERO,
            rotate_pivot: Vec3::ZERO,
            rotate_pivot_translate: Vec3::ZERO,
            translate_pivot: Vec3::ZERO,
            snap_pivots: true,
            object: Mat4::IDENTITY,
            inverse_object: Mat4::IDENTITY,
            global: Mat4::IDENTITY,
            inverse_global: Mat4::IDENTITY,
            bind: Mat4::IDENTITY,
            inverse_bind: Mat4::IDENTITY,
            bind_dirty: true,
        }
    }
}

impl TransformState {
    /// Scale factors.
    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    /// Euler rotation, radians, XYZ order.
    pub fn rotate(&self) -> Vec3 {
        self.rotate
    }

    /// Translation.
    pub fn translate(&self) -> Vec3 {
        self.translate
    }

    /// Shear factors.
    pub fn shear(&self) -> Shear {
        self.shear
    }

    /// Whether the global transform chains through the parent.
    pub fn inherits(&self) -> bool {
        self.inherit
    }

    /// Whether pivot setters move the sibling pivots along.
    pub fn snaps_pivots(&self) -> bool {
        self.snap_pivots
    }

    /// Rotation as a quaternion.
    pub fn rotation(&self) -> Quat {
        quat_from_euler(self.rotate)
    }

    /// Scale pivot, sampled through the scale and rotate components.
    pub fn scale_pivot(&self) -> Vec3 {
        (self.rotate_component() * self.scale_component()).transform_point3(self.scale_pivot)
    }

    /// Compensating translate carried by the scale component.
    pub fn scale_pivot_translate(&self) -> Vec3 {
        self.scale_pivot_translate
    }

    /// Rotate pivot, sampled through the rotate component.
    pub fn rotate_pivot(&self) -> Vec3 {
        self.rotate_component().transform_point3(self.rotate_pivot)
    }

    /// Compensating translate carried by the rotate component.
    pub fn rotate_pivot_translate(&self) -> Vec3 {
        self.rotate_pivot_translate
    }

    /// Translate pivot (plain storage, no compensation).
    pub fn translate_pivot(&self) -> Vec3 {
        self.translate_pivot
    }

    /// Cached local matrix.
    pub fn object_transform(&self) -> Mat4 {
        self.object
    }

    /// Cached inverse local matrix.
    pub fn inverse_object_transform(&self) -> Mat4 {
        self.inverse_object
    }

    /// Cached world matrix.
    pub fn global_transform(&self) -> Mat4 {
        self.global
    }

    /// Cached inverse world matrix.
    pub fn inverse_global_transform(&self) -> Mat4 {
        self.inverse_global
    }

    /// World matrix snapshotted at bind time.
    pub fn bind_transform(&self) -> Mat4 {
        self.bind
    }

    /// Inverse of the bind snapshot.
    pub fn inverse_bind_transform(&self) -> Mat4 {
        self.inverse_bind
    }

    /// `T(sp+spt) * Shear * S * T(-sp)`.
    pub fn scale_component(&self) -> Mat4 {
        Mat4::from_translation(self.scale_pivot + self.scale_pivot_translate)
            * self.shear.to_mat4()
            * Mat4::from_scale(self.scale)
            * Mat4::from_translation(-self.scale_pivot)
    }

    /// `T(rp+rpt) * R * T(-rp)`.
    pub fn rotate_component(&self) -> Mat4 {
        Mat4::from_translation(self.rotate_pivot + self.rotate_pivot_translate)
            * Mat4::from_quat(self.rotation())
            * Mat4::from_translation(-self.rotate_pivot)
    }

    /// `T(translate)`.
    pub fn translate_component(&self) -> Mat4 {
        Mat4::from_translation(self.translate)
    }

    /// Local matrix from the current components.
    pub fn compose_object(&self) -> Mat4 {
        self.translate_component() * self.rotate_component() * self.scale_component()
    }

    pub(crate) fn apply_scale_pivot(&mut self, value: Vec3, snap_siblings: bool) {
        let frame = self.rotate_component() * self.scale_component();
        let local = frame.inverse().transform_point3(value);

        // Sample the component at the origin before and after the move and
        // fold the delta into the compensator.
        let before = self.scale_component().transform_point3(Vec3::ZERO);
        self.scale_pivot = local;
        let after = self.scale_component().transform_point3(Vec3::ZERO);
        self.scale_pivot_translate += before - after;

        if self.snap_pivots && snap_siblings {
            self.apply_rotate_pivot(value, false);
            self.apply_translate_pivot(value, false);
        }
    }

    pub(crate) fn apply_rotate_pivot(&mut self, value: Vec3, snap_siblings: bool) {
        let local = self.rotate_component().inverse().transform_point3(value);

        let before = self.rotate_component().transform_point3(Vec3::ZERO);
        self.rotate_pivot = local;
        let after = self.rotate_component().transform_point3(Vec3::ZERO);
        self.rotate_pivot_translate += before - after;

        if self.snap_pivots && snap_siblings {
            self.apply_scale_pivot(value, false);
            self.apply_translate_pivot(value, false);
        }
    }

    pub(crate) fn apply_translate_pivot(&mut self, value: Vec3, snap_siblings: bool) {
        self.translate_pivot = value;

        if self.snap_pivots && snap_siblings {
            self.apply_scale_pivot(value, false);
            self.apply_rotate_pivot(value, false);
        }
    }

    /// Identity components, zeroed pivots and compensators.
    pub(crate) fn reset(&mut self) {
        let inherit = self.inherit;
        *self = Self::default();
        self.inherit = inherit;
    }

    /// Drop cached matrices for a duplicated copy.
    pub(crate) fn reset_caches(&mut self) {
        self.object = Mat4::IDENTITY;
        self.inverse_object = Mat4::IDENTITY;
        self.global = Mat4::IDENTITY;
        self.inverse_global = Mat4::IDENTITY;
        self.bind = Mat4::IDENTITY;
        self.inverse_bind = Mat4::IDENTITY;
        self.bind_dirty = true;
    }
}

impl SceneGraph {
    /// Nearest node at or above `start` that carries a transform.
    pub(crate) fn transform_anchor(&self, start: Option<NodeId>) -> Option<NodeId> {
        let mut current = start;
        while let Some(id) = current {
            let node = self.node(id)?;
            if node.transform().is_some() {
                return Some(id);
            }
            current = node.hierarchy().and_then(|h| h.parent);
        }
        None
    }

    fn try_transform_mut(&mut self, id: NodeId) -> Result<&mut TransformState, SceneError> {
        self.try_node_mut(id)?
            .transform_mut()
            .ok_or(SceneError::NotATransformNode(id))
    }

    /// Set the scale factors.
    pub fn set_scale(&mut self, id: NodeId, scale: Vec3) -> Result<(), SceneError> {
        self.try_transform_mut(id)?.scale = scale;
        self.dirty(id);
        Ok(())
    }

    /// Set the Euler rotation (radians, XYZ order).
    pub fn set_rotate(&mut self, id: NodeId, rotate: Vec3) -> Result<(), SceneError> {
        self.try_transform_mut(id)?.rotate = rotate;
        self.dirty(id);
        Ok(())
    }

    /// Set the translation.
    pub fn set_translate(&mut self, id: NodeId, translate: Vec3) -> Result<(), SceneError> {
        self.try_transform_mut(id)?.translate = translate;
        self.dirty(id);
        Ok(())
    }

    /// Set the shear factors.
    pub fn set_shear(&mut self, id: NodeId, shear: Shear) -> Result<(), SceneError> {
        self.try_transform_mut(id)?.shear = shear;
        self.dirty(id);
        Ok(())
    }

    /// Toggle whether pivot setters snap the sibling pivots.
    pub fn set_snap_pivots(&mut self, id: NodeId, snap: bool) -> Result<(), SceneError> {
        self.try_transform_mut(id)?.snap_pivots = snap;
        Ok(())
    }

    /// Move the scale pivot without moving the object.
    pub fn set_scale_pivot(&mut self, id: NodeId, value: Vec3) -> Result<(), SceneError> {
        self.try_transform_mut(id)?.apply_scale_pivot(value, true);
        self.dirty(id);
        Ok(())
    }

    /// Move the rotate pivot without moving the object.
    pub fn set_rotate_pivot(&mut self, id: NodeId, value: Vec3) -> Result<(), SceneError> {
        self.try_transform_mut(id)?.apply_rotate_pivot(value, true);
        self.dirty(id);
        Ok(())
    }

    /// Move the translate pivot.
    pub fn set_translate_pivot(&mut self, id: NodeId, value: Vec3) -> Result<(), SceneError> {
        self.try_transform_mut(id)?.apply_translate_pivot(value, true);
        self.dirty(id);
        Ok(())
    }

    /// Set the scale compensator directly.
    pub fn set_scale_pivot_translate(&mut self, id: NodeId, value: Vec3) -> Result<(), SceneError> {
        self.try_transform_mut(id)?.scale_pivot_translate = value;
        self.dirty(id);
        Ok(())
    }

    /// Set the rotate compensator directly.
    pub fn set_rotate_pivot_translate(
        &mut self,
        id: NodeId,
        value: Vec3,
    ) -> Result<(), SceneError> {
        self.try_transform_mut(id)?.rotate_pivot_translate = value;
        self.dirty(id);
        Ok(())
    }

    /// Toggle parent inheritance, keeping the node's world placement by
    /// re-deriving its local components from the cached global.
    pub fn set_inherit(&mut self, id: NodeId, inherit: bool) -> Result<(), SceneError> {
        self.try_transform_mut(id)?.inherit = inherit;
        self.compute_object_components(id)
    }

    /// Replace the local matrix, decomposing it into components.
    ///
    /// The decomposition assumes zeroed pivots; use
    /// [`set_global_transform`](Self::set_global_transform) for the
    /// pivot-aware path.
    pub fn set_object_transform(&mut self, id: NodeId, m: Mat4) -> Result<(), SceneError> {
        let (scale, shear, rotation, translation) = decompose(m);
        let t = self.try_transform_mut(id)?;
        t.scale = scale;
        t.shear = shear;
        t.rotate = euler_from_quat(rotation);
        t.translate = translation;
        t.object = m;
        self.dirty(id);
        Ok(())
    }

    /// Pin the node at a world matrix: store it as the global and re-derive
    /// the local components.
    pub fn set_global_transform(&mut self, id: NodeId, m: Mat4) -> Result<(), SceneError> {
        self.try_transform_mut(id)?.global = m;
        self.compute_object_components(id)
    }

    /// Re-derive scale/shear/rotation/translation from the cached global.
    ///
    /// The pivots are preserved and peeled out of the matrix in composition
    /// order; the compensators are zeroed first, as recomposition makes them
    /// redundant.
    pub fn compute_object_components(&mut self, id: NodeId) -> Result<(), SceneError> {
        let parent = self.parent_of(id);
        let parent_inverse = self
            .transform_anchor(parent)
            .and_then(|a| self.node(a))
            .and_then(SceneNode::transform)
            .map(|t| t.inverse_global);

        let t = self.try_transform_mut(id)?;
        let local = match (t.inherit, parent_inverse) {
            (true, Some(pi)) => pi * t.global,
            _ => t.global,
        };

        t.scale_pivot_translate = Vec3::ZERO;
        t.rotate_pivot_translate = Vec3::ZERO;
        let (scale, shear, rotation, translation) =
            decompose_with_pivots(local, t.scale_pivot, Vec3::ZERO, t.rotate_pivot, Vec3::ZERO);
        t.scale = scale;
        t.shear = shear;
        t.rotate = euler_from_quat(rotation);
        t.translate = translation;

        self.dirty(id);
        Ok(())
    }

    /// Back to identity components and zeroed pivots.
    pub fn reset_transform(&mut self, id: NodeId) -> Result<(), SceneError> {
        self.try_transform_mut(id)?.reset();
        self.dirty(id);
        Ok(())
    }

    /// Downstream recompute of the matrix caches.
    ///
    /// The pump has already evaluated every ancestor, so the parent anchor's
    /// global is clean here.
    pub(crate) fn evaluate_transform(&mut self, id: NodeId) {
        let parent = self.parent_of(id);
        let parent_global = self
            .transform_anchor(parent)
            .and_then(|a| self.node(a))
            .and_then(SceneNode::transform)
            .map(|t| t.global);

        let Some(t) = self
            .try_node_mut(id)
            .ok()
            .and_then(SceneNode::transform_mut)
        else {
            return;
        };

        t.object = t.compose_object();
        t.inverse_object = t.object.inverse();
        t.global = match (t.inherit, parent_global) {
            (true, Some(pg)) => pg * t.object,
            _ => t.object,
        };
        t.inverse_global = t.global.inverse();

        if t.bind_dirty {
            t.bind = t.global;
            t.inverse_bind = t.inverse_global;
            t.bind_dirty = false;
        }
    }
}
