//! Rigid skeleton model
//!
//! Bones live in a flat arena ordered parents-first: every non-root bone's
//! parent index is strictly lower than its own. The ordering is validated
//! once at construction and the skeleton is read-only afterwards.

use glam::{Quat, Vec3};

use crate::error::{AnimError, Result};
use crate::math::BoneTransform;
use crate::settings::VertexDistances;

/// Parent index stored for root bones in the encoded format
pub const INVALID_BONE_INDEX: u16 = u16::MAX;

/// Maximum bones per skeleton (the sentinel is reserved)
pub const MAX_BONES: usize = INVALID_BONE_INDEX as usize;

/// A rigid bone
#[derive(Debug, Clone, PartialEq)]
pub struct Bone {
    pub name: String,
    /// Parent bone, `None` for roots
    pub parent: Option<u16>,
    /// Bind pose (scale is always unit)
    pub bind_transform: BoneTransform,
    /// Distance of the virtual vertex used to weight this bone's error
    pub vertex_distance: f32,
}

impl Bone {
    pub fn new(
        name: impl Into<String>,
        parent: Option<u16>,
        bind_rotation: Quat,
        bind_translation: Vec3,
        vertex_distance: f32,
    ) -> Self {
        Self {
            name: name.into(),
            parent,
            bind_transform: BoneTransform::new(bind_rotation, bind_translation, Vec3::ONE),
            vertex_distance,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// Host-side bone description, resolved to a [`Bone`] against a vertex distance policy
#[derive(Debug, Clone, PartialEq)]
pub struct BoneDesc {
    pub name: String,
    pub parent: Option<u16>,
    pub bind_rotation: Quat,
    pub bind_translation: Vec3,
    /// Bone carries a socket or is a keyed end effector (IK target, hand, camera)
    pub key_bone: bool,
    /// Explicit distance, overrides the policy
    pub vertex_distance: Option<f32>,
}

impl BoneDesc {
    pub fn new(name: impl Into<String>, parent: Option<u16>) -> Self {
        Self {
            name: name.into(),
            parent,
            bind_rotation: Quat::IDENTITY,
            bind_translation: Vec3::ZERO,
            key_bone: false,
            vertex_distance: None,
        }
    }

    pub fn with_bind(mut self, rotation: Quat, translation: Vec3) -> Self {
        self.bind_rotation = rotation;
        self.bind_translation = translation;
        self
    }

    pub fn key_bone(mut self, key_bone: bool) -> Self {
        self.key_bone = key_bone;
        self
    }

    pub fn with_vertex_distance(mut self, distance: f32) -> Self {
        self.vertex_distance = Some(distance);
        self
    }

    fn resolve(&self, distances: &VertexDistances) -> Bone {
        let distance = self
            .vertex_distance
            .unwrap_or_else(|| distances.for_bone(self.key_bone));
        Bone::new(
            self.name.clone(),
            self.parent,
            self.bind_rotation,
            self.bind_translation,
            distance,
        )
    }
}

/// Immutable bone hierarchy
#[derive(Debug, Clone, PartialEq)]
pub struct Skeleton {
    bones: Vec<Bone>,
}

impl Skeleton {
    /// Build a skeleton, validating the hierarchy
    ///
    /// Fails with [`AnimError::InvalidHierarchy`] when a parent index is not
    /// strictly lower than its bone's index, and with
    /// [`AnimError::InvalidClip`] for non-positive vertex distances.
    pub fn new(bones: Vec<Bone>) -> Result<Self> {
        if bones.is_empty() {
            return Err(AnimError::InvalidHierarchy(
                "skeleton has no bones".to_string(),
            ));
        }
        if bones.len() > MAX_BONES {
            return Err(AnimError::InvalidHierarchy(format!(
                "{} bones exceeds maximum of {}",
                bones.len(),
                MAX_BONES
            )));
        }

        for (index, bone) in bones.iter().enumerate() {
            if let Some(parent) = bone.parent {
                let parent = parent as usize;
                if parent >= bones.len() {
                    return Err(AnimError::InvalidHierarchy(format!(
                        "bone {} ('{}') references missing parent {}",
                        index, bone.name, parent
                    )));
                }
                if parent >= index {
                    return Err(AnimError::InvalidHierarchy(format!(
                        "bone {} ('{}') has parent {} which is not defined before it",
                        index, bone.name, parent
                    )));
                }
            }
            if !(bone.vertex_distance.is_finite() && bone.vertex_distance > 0.0) {
                return Err(AnimError::InvalidClip(format!(
                    "bone {} ('{}') has invalid vertex distance {}",
                    index, bone.name, bone.vertex_distance
                )));
            }
        }

        Ok(Self { bones })
    }

    /// Build from host descriptions using a vertex distance policy
    pub fn from_descs(descs: &[BoneDesc], distances: &VertexDistances) -> Result<Self> {
        Self::new(descs.iter().map(|d| d.resolve(distances)).collect())
    }

    pub fn bone_count(&self) -> usize {
        self.bones.len()
    }

    pub fn bones(&self) -> &[Bone] {
        &self.bones
    }

    pub fn bone(&self, index: usize) -> Result<&Bone> {
        self.bones
            .get(index)
            .ok_or_else(|| AnimError::out_of_range("bone", index, self.bones.len()))
    }

    /// Parent of a bone, `None` for roots
    pub fn parent(&self, index: usize) -> Result<Option<usize>> {
        Ok(self.bone(index)?.parent.map(usize::from))
    }

    /// Ancestors of a bone, nearest first
    pub fn ancestors(&self, index: usize) -> Ancestors<'_> {
        let next = self.bones.get(index).and_then(|b| b.parent).map(usize::from);
        Ancestors {
            skeleton: self,
            next,
        }
    }

    pub fn find_bone(&self, name: &str) -> Option<usize> {
        self.bones.iter().position(|b| b.name == name)
    }
}

/// Iterator over a bone's ancestors, nearest first
pub struct Ancestors<'a> {
    skeleton: &'a Skeleton,
    next: Option<usize>,
}

impl Iterator for Ancestors<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let current = self.next?;
        self.next = self.skeleton.bones[current].parent.map(usize::from);
        Some(current)
    }
}
