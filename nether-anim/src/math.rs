//! Transform types shared by the clip model, the error metric and the decoder

use glam::{Affine3A, Quat, Vec3};

/// Local-space bone transform (rotation, translation, non-uniform scale)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoneTransform {
    /// Unit quaternion rotation
    pub rotation: Quat,
    /// Translation relative to the parent bone
    pub translation: Vec3,
    /// Non-uniform scale [x, y, z]
    pub scale: Vec3,
}

impl Default for BoneTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl BoneTransform {
    /// Identity transform (no rotation, no translation, unit scale)
    pub const IDENTITY: Self = Self {
        rotation: Quat::IDENTITY,
        translation: Vec3::ZERO,
        scale: Vec3::ONE,
    };

    pub const fn new(rotation: Quat, translation: Vec3, scale: Vec3) -> Self {
        Self {
            rotation,
            translation,
            scale,
        }
    }

    /// Blend towards `other` by `t` in [0, 1]
    ///
    /// Rotation takes the shortest arc; translation and scale are linear.
    pub fn interpolate(&self, other: &Self, t: f32) -> Self {
        let t = t.clamp(0.0, 1.0);
        Self {
            rotation: self.rotation.slerp(other.rotation, t),
            translation: self.translation.lerp(other.translation, t),
            scale: self.scale.lerp(other.scale, t),
        }
    }

    /// Affine matrix used by the error metric
    ///
    /// Additive clips store scale as a delta on top of a unit base, so the
    /// measured scale is `1 + scale`.
    pub(crate) fn to_affine(self, additive: bool) -> Affine3A {
        let scale = if additive {
            Vec3::ONE + self.scale
        } else {
            self.scale
        };
        Affine3A::from_scale_rotation_translation(scale, self.rotation, self.translation)
    }
}

/// Angle in radians between two rotations, ignoring quaternion double cover
pub(crate) fn rotation_angle(a: Quat, b: Quat) -> f32 {
    let dot = a.dot(b).abs().min(1.0);
    2.0 * dot.acos()
}
