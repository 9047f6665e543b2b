// SPDX-License-Identifier: MIT OR Apache-2.0
//! Axis-aligned bounding boxes.

use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

/// An axis-aligned box in 3-D space.
///
/// The empty box has `minimum > maximum` and merges as the identity; freshly
/// constructed nodes start with empty bounds until geometry contributes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlignedBox {
    /// Smallest corner.
    pub minimum: Vec3,
    /// Largest corner.
    pub maximum: Vec3,
}

impl Default for AlignedBox {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl AlignedBox {
    /// The empty box; merging anything into it yields that thing.
    pub const EMPTY: Self = Self {
        minimum: Vec3::INFINITY,
        maximum: Vec3::NEG_INFINITY,
    };

    /// Box spanning the two corners.
    pub fn new(minimum: Vec3, maximum: Vec3) -> Self {
        Self { minimum, maximum }
    }

    /// True when the box contains no points.
    pub fn is_empty(&self) -> bool {
        self.minimum.x > self.maximum.x
            || self.minimum.y > self.maximum.y
            || self.minimum.z > self.maximum.z
    }

    /// Center point of the box, or the origin when empty.
    pub fn center(&self) -> Vec3 {
        if self.is_empty() {
            Vec3::ZERO
        } else {
            (self.minimum + self.maximum) * 0.5
        }
    }

    /// Grow to contain a point.
    pub fn merge_point(&mut self, point: Vec3) {
        self.minimum = self.minimum.min(point);
        self.maximum = self.maximum.max(point);
    }

    /// Grow to contain another box.
    pub fn merge(&mut self, other: &AlignedBox) {
        if other.is_empty() {
            return;
        }
        self.minimum = self.minimum.min(other.minimum);
        self.maximum = self.maximum.max(other.maximum);
    }

    /// The box containing all eight transformed corners.
    pub fn transformed(&self, m: Mat4) -> AlignedBox {
        if self.is_empty() {
            return AlignedBox::EMPTY;
        }
        let mut out = AlignedBox::EMPTY;
        for i in 0..8 {
            let corner = Vec3::new(
                if i & 1 == 0 { self.minimum.x } else { self.maximum.x },
                if i & 2 == 0 { self.minimum.y } else { self.maximum.y },
                if i & 4 == 0 { self.minimum.z } else { self.maximum.z },
            );
            out.merge_point(m.transform_point3(corner));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_box_merges_as_identity() {
        let mut a = AlignedBox::new(Vec3::ZERO, Vec3::ONE);
        let before = a;
        a.merge(&AlignedBox::EMPTY);
        assert_eq!(a, before);

        let mut b = AlignedBox::EMPTY;
        b.merge(&before);
        assert_eq!(b, before);
    }

    #[test]
    fn merge_point_expands() {
        let mut b = AlignedBox::EMPTY;
        b.merge_point(Vec3::new(1.0, 2.0, 3.0));
        b.merge_point(Vec3::new(-1.0, 0.0, 5.0));
        assert_eq!(b.minimum, Vec3::new(-1.0, 0.0, 3.0));
        assert_eq!(b.maximum, Vec3::new(1.0, 2.0, 5.0));
        assert!(!b.is_empty());
    }

    #[test]
    fn transformed_covers_rotated_corners() {
        let b = AlignedBox::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let m = Mat4::from_translation(Vec3::new(10.0, 0.0, 0.0));
        let t = b.transformed(m);
        assert!((t.minimum - Vec3::new(9.0, -1.0, -1.0)).length() < 1e-5);
        assert!((t.maximum - Vec3::new(11.0, 1.0, 1.0)).length() < 1e-5);

        assert!(AlignedBox::EMPTY.transformed(m).is_empty());
    }
}
