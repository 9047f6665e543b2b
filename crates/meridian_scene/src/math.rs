// SPDX-License-Identifier: MIT OR Apache-2.0
//! Matrix decomposition helpers for the transform system.
//!
//! Everything here works in glam's column-vector convention: a composed
//! matrix `T * R * Sh * S` applies scale first and translation last.

use glam::{EulerRot, Mat3, Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Shear factors applied between scale and rotation.
///
/// `xy` shears x by y, `xz` shears x by z, `yz` shears y by z. The matrix
/// form is unit upper-triangular, so `Shear::IDENTITY` is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Shear {
    /// Shear of x along y.
    pub xy: f32,
    /// Shear of x along z.
    pub xz: f32,
    /// Shear of y along z.
    pub yz: f32,
}

impl Shear {
    /// The identity (no shear).
    pub const IDENTITY: Self = Self {
        xy: 0.0,
        xz: 0.0,
        yz: 0.0,
    };

    /// Matrix form of the shear.
    pub fn to_mat4(self) -> Mat4 {
        Mat4::from_cols(
            glam::Vec4::new(1.0, 0.0, 0.0, 0.0),
            glam::Vec4::new(self.xy, 1.0, 0.0, 0.0),
            glam::Vec4::new(self.xz, self.yz, 1.0, 0.0),
            glam::Vec4::new(0.0, 0.0, 0.0, 1.0),
        )
    }
}

/// Euler angles (radians, XYZ order) for a rotation quaternion.
pub fn euler_from_quat(q: Quat) -> Vec3 {
    let (x, y, z) = q.to_euler(EulerRot::XYZ);
    Vec3::new(x, y, z)
}

/// Rotation quaternion for Euler angles (radians, XYZ order).
pub fn quat_from_euler(angles: Vec3) -> Quat {
    Quat::from_euler(EulerRot::XYZ, angles.x, angles.y, angles.z)
}

/// Decompose an affine matrix into `T * R * Sh * S`.
///
/// Returns `(scale, shear, rotation, translation)`. The matrix must be
/// invertible; a negative determinant folds into a negated scale.
pub fn decompose(m: Mat4) -> (Vec3, Shear, Quat, Vec3) {
    let translation = m.w_axis.truncate();

    let mut c0 = m.x_axis.truncate();
    let mut c1 = m.y_axis.truncate();
    let mut c2 = m.z_axis.truncate();

    let mut scale = Vec3::ONE;
    let mut shear = Shear::IDENTITY;

    scale.x = c0.length();
    c0 /= scale.x;

    shear.xy = c0.dot(c1);
    c1 -= c0 * shear.xy;
    scale.y = c1.length();
    c1 /= scale.y;
    shear.xy /= scale.y;

    shear.xz = c0.dot(c2);
    c2 -= c0 * shear.xz;
    shear.yz = c1.dot(c2);
    c2 -= c1 * shear.yz;
    scale.z = c2.length();
    c2 /= scale.z;
    shear.xz /= scale.z;
    shear.yz /= scale.z;

    // A negative determinant means the basis is left-handed; flip it.
    if c0.cross(c1).dot(c2) < 0.0 {
        scale = -scale;
        c0 = -c0;
        c1 = -c1;
        c2 = -c2;
    }

    let rotation = Quat::from_mat3(&Mat3::from_cols(c0, c1, c2));

    (scale, shear, rotation, translation)
}

/// Decompose a local matrix that was composed around fixed pivot points.
///
/// The composed form is
/// `T * T(rp+rpt) * R * T(-rp) * T(sp+spt) * Sh * S * T(-sp)`;
/// a plain [`decompose`] of such a matrix yields component values that are
/// only correct for zero pivots. This peels the known pivot matrices off in
/// order: strip the trailing scale-pivot inverse, decompose scale and shear,
/// strip the rotate-pivot group, then read the final rotation and
/// translation.
///
/// Returns `(scale, shear, rotation, translation)` such that recomposing
/// with the same pivots reproduces `total`.
pub fn decompose_with_pivots(
    total: Mat4,
    scale_pivot: Vec3,
    scale_pivot_translate: Vec3,
    rotate_pivot: Vec3,
    rotate_pivot_translate: Vec3,
) -> (Vec3, Shear, Quat, Vec3) {
    // Cancel the trailing T(-sp), leaving T .. Sh * S at the tail.
    let m1 = total * Mat4::from_translation(scale_pivot);

    let (scale, shear, r1, t1) = decompose(m1);

    // The rigid remainder: everything except scale and shear.
    let m2 = Mat4::from_translation(t1) * Mat4::from_quat(r1);

    // Cancel T(sp+spt) and the rotate-pivot inverse in one step, leaving
    // T * T(rp+rpt) * R.
    let m5 = m2 * Mat4::from_translation(rotate_pivot - scale_pivot - scale_pivot_translate);

    let (_, _, rotation, t5) = decompose(m5);

    let translation = t5 - rotate_pivot_translate - rotate_pivot;

    (scale, shear, rotation, translation)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mat_close(a: Mat4, b: Mat4) -> bool {
        a.to_cols_array()
            .iter()
            .zip(b.to_cols_array().iter())
            .all(|(x, y)| (x - y).abs() < 1e-4)
    }

    #[test]
    fn decompose_recomposes_srt() {
        let scale = Vec3::new(2.0, 0.5, 3.0);
        let rotation = quat_from_euler(Vec3::new(0.3, -0.7, 1.2));
        let translation = Vec3::new(5.0, -2.0, 1.0);
        let m = Mat4::from_translation(translation)
            * Mat4::from_quat(rotation)
            * Mat4::from_scale(scale);

        let (s, sh, r, t) = decompose(m);

        let rebuilt = Mat4::from_translation(t)
            * Mat4::from_quat(r)
            * sh.to_mat4()
            * Mat4::from_scale(s);
        assert!(mat_close(m, rebuilt));
        assert!((s - scale).length() < 1e-4);
        assert!((t - translation).length() < 1e-4);
        assert!(sh.xy.abs() < 1e-4 && sh.xz.abs() < 1e-4 && sh.yz.abs() < 1e-4);
    }

    #[test]
    fn decompose_extracts_shear() {
        let shear = Shear {
            xy: 0.5,
            xz: -0.25,
            yz: 0.75,
        };
        let m = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0))
            * Mat4::from_quat(quat_from_euler(Vec3::new(0.1, 0.2, 0.3)))
            * shear.to_mat4()
            * Mat4::from_scale(Vec3::new(2.0, 3.0, 4.0));

        let (s, sh, r, t) = decompose(m);
        let rebuilt =
            Mat4::from_translation(t) * Mat4::from_quat(r) * sh.to_mat4() * Mat4::from_scale(s);
        assert!(mat_close(m, rebuilt));
        assert!((sh.xy - shear.xy).abs() < 1e-4);
        assert!((sh.xz - shear.xz).abs() < 1e-4);
        assert!((sh.yz - shear.yz).abs() < 1e-4);
    }

    #[test]
    fn pivot_peel_round_trips() {
        let scale = Vec3::new(1.5, 2.0, 0.75);
        let rotation = quat_from_euler(Vec3::new(0.4, 0.9, -0.3));
        let translation = Vec3::new(-3.0, 4.0, 2.0);
        let sp = Vec3::new(1.0, -2.0, 0.5);
        let rp = Vec3::new(-0.5, 1.0, 2.0);

        let total = Mat4::from_translation(translation)
            * Mat4::from_translation(rp)
            * Mat4::from_quat(rotation)
            * Mat4::from_translation(-rp)
            * Mat4::from_translation(sp)
            * Mat4::from_scale(scale)
            * Mat4::from_translation(-sp);

        let (s, sh, r, t) = decompose_with_pivots(total, sp, Vec3::ZERO, rp, Vec3::ZERO);

        let rebuilt = Mat4::from_translation(t)
            * Mat4::from_translation(rp)
            * Mat4::from_quat(r)
            * Mat4::from_translation(-rp)
            * Mat4::from_translation(sp)
            * sh.to_mat4()
            * Mat4::from_scale(s)
            * Mat4::from_translation(-sp);
        assert!(mat_close(total, rebuilt));
        assert!((s - scale).length() < 1e-3);
        assert!((t - translation).length() < 1e-3);
    }

    #[test]
    fn pivot_peel_matches_plain_decompose_for_zero_pivots() {
        let m = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0))
            * Mat4::from_quat(quat_from_euler(Vec3::new(0.2, 0.4, 0.6)))
            * Mat4::from_scale(Vec3::new(2.0, 2.0, 2.0));

        let (s1, _, r1, t1) = decompose(m);
        let (s2, _, r2, t2) =
            decompose_with_pivots(m, Vec3::ZERO, Vec3::ZERO, Vec3::ZERO, Vec3::ZERO);

        assert!((s1 - s2).length() < 1e-4);
        assert!((t1 - t2).length() < 1e-4);
        assert!(r1.dot(r2).abs() > 1.0 - 1e-4);
    }
}
