//! Procedural skeletons and clips for integration tests.
//!
//! Also carries an independent implementation of the vertex error metric so
//! round-trip tests do not trust the quantizer's own measurement.

#![allow(dead_code)]

use glam::{Affine3A, Quat, Vec3};
use nether_anim::{AnimationClip, Bone, BoneTransform, SampleValue, Skeleton};
use std::f32::consts::TAU;
use std::sync::Arc;

/// Segment length between chained bones
pub const SEGMENT_LENGTH: f32 = 1.5;

/// Chain of bones, each offset along +Y from its parent
pub fn chain_skeleton(len: usize, vertex_distance: f32) -> Arc<Skeleton> {
    let bones = (0..len)
        .map(|i| {
            let parent = i.checked_sub(1).map(|p| p as u16);
            let offset = if i == 0 {
                Vec3::ZERO
            } else {
                Vec3::new(0.0, SEGMENT_LENGTH, 0.0)
            };
            let bind = Quat::from_rotation_y(i as f32 * 0.2);
            Bone::new(format!("bone{i}"), parent, bind, offset, vertex_distance)
        })
        .collect();
    Arc::new(Skeleton::new(bones).unwrap())
}

/// Wave motion on every bone
///
/// Rotations sway about Z and X with a per-bone phase, the root bobs
/// vertically and the last bone pulses its scale.
pub fn wave_clip(skeleton: Arc<Skeleton>, samples: u32, rate: f32, additive: bool) -> AnimationClip {
    let bone_count = skeleton.bone_count();
    let mut clip = AnimationClip::new(skeleton, samples, rate, "wave", additive).unwrap();

    for bone in 0..bone_count {
        let phase = bone as f32 * 0.9;
        for i in 0..samples as usize {
            let t = i as f32 / samples as f32;
            let rotation = Quat::from_rotation_z((t * TAU + phase).sin() * 0.5)
                * Quat::from_rotation_x((t * TAU * 2.0 + phase).cos() * 0.25);
            clip.set_sample(bone, i, SampleValue::Rotation(rotation)).unwrap();
        }
        clip.set_output_index(bone, Some(bone as u16)).unwrap();
    }

    for i in 0..samples as usize {
        let t = i as f32 / samples as f32;
        let bob = Vec3::new(0.0, (t * TAU).sin() * 0.3, t * 2.0);
        clip.set_sample(0, i, SampleValue::Translation(bob)).unwrap();

        let pulse = if additive {
            Vec3::splat((t * TAU).sin() * 0.1)
        } else {
            Vec3::splat(1.0 + (t * TAU).sin() * 0.1)
        };
        clip.set_sample(bone_count - 1, i, SampleValue::Scale(pulse)).unwrap();
    }
    clip
}

/// Object-space transforms of a local pose
pub fn object_space(skeleton: &Skeleton, pose: &[BoneTransform], additive: bool) -> Vec<Affine3A> {
    let mut object: Vec<Affine3A> = Vec::with_capacity(pose.len());
    for (bone, local) in skeleton.bones().iter().zip(pose) {
        let scale = if additive {
            Vec3::ONE + local.scale
        } else {
            local.scale
        };
        let local = Affine3A::from_scale_rotation_translation(scale, local.rotation, local.translation);
        let transform = match bone.parent {
            Some(parent) => object[parent as usize] * local,
            None => local,
        };
        object.push(transform);
    }
    object
}

/// Largest virtual vertex displacement between two poses
pub fn pose_error(
    skeleton: &Skeleton,
    exact: &[BoneTransform],
    lossy: &[BoneTransform],
    additive: bool,
) -> f32 {
    let exact = object_space(skeleton, exact, additive);
    let lossy = object_space(skeleton, lossy, additive);

    let mut worst = 0.0f32;
    for ((bone, exact), lossy) in skeleton.bones().iter().zip(&exact).zip(&lossy) {
        for axis in [Vec3::X, Vec3::Y, Vec3::Z] {
            let vertex = axis * bone.vertex_distance;
            let error = exact
                .transform_point3(vertex)
                .distance(lossy.transform_point3(vertex));
            worst = worst.max(error);
        }
    }
    worst
}
