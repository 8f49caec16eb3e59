//! Animation clip model
//!
//! A clip holds one [`BoneTracks`] per skeleton bone. Clips are built once,
//! either default-initialized to the bind pose, copied from a
//! [`SourceAnimation`], or extracted as a single reference frame.

use glam::{Quat, Vec3};
use hashbrown::HashMap;
use std::sync::Arc;

use crate::error::{AnimError, Result};
use crate::format::Channel;
use crate::math::BoneTransform;
use crate::skeleton::Skeleton;
use crate::source::{SourceAnimation, SourceTrack};
use crate::track::{BoneTracks, SampleValue, Track};

/// Sample rate used for single-sample clips (bind pose, reference frames)
pub const SINGLE_SAMPLE_RATE: f32 = 30.0;

/// Name given to clips built without source animation
pub const BIND_POSE_CLIP_NAME: &str = "Bind Pose";

/// Default scale for bones without scale data
///
/// Additive clips are summed onto a base pose, so their neutral scale is zero.
pub fn default_scale(is_additive: bool) -> Vec3 {
    if is_additive { Vec3::ZERO } else { Vec3::ONE }
}

/// Raw per-bone sample tracks referencing a shared skeleton
#[derive(Debug, Clone)]
pub struct AnimationClip {
    name: String,
    skeleton: Arc<Skeleton>,
    sample_count: u32,
    sample_rate: f32,
    is_additive: bool,
    bones: Vec<BoneTracks>,
}

impl AnimationClip {
    /// Clip with every bone held at its bind pose
    ///
    /// Rotation and translation come from the bind pose; scale is the
    /// additive-aware default. Output indices are unset.
    pub fn new(
        skeleton: Arc<Skeleton>,
        sample_count: u32,
        sample_rate: f32,
        name: impl Into<String>,
        is_additive: bool,
    ) -> Result<Self> {
        let name = name.into();
        if sample_count == 0 {
            return Err(AnimError::InvalidClip(format!("clip '{}' has no samples", name)));
        }
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(AnimError::InvalidClip(format!(
                "clip '{}' has invalid sample rate {}",
                name, sample_rate
            )));
        }

        let scale = default_scale(is_additive);
        let bones = skeleton
            .bones()
            .iter()
            .map(|bone| {
                let bind = bone.bind_transform;
                BoneTracks::constant(BoneTransform { scale, ..bind }, None)
            })
            .collect();

        Ok(Self {
            name,
            skeleton,
            sample_count,
            sample_rate,
            is_additive,
            bones,
        })
    }

    /// Single-sample clip of the bind pose, used when no source animation exists
    pub fn bind_pose(skeleton: Arc<Skeleton>, is_additive: bool) -> Result<Self> {
        let mut clip = Self::new(
            skeleton,
            1,
            SINGLE_SAMPLE_RATE,
            BIND_POSE_CLIP_NAME,
            is_additive,
        )?;
        for (index, bone) in clip.bones.iter_mut().enumerate() {
            bone.output_index = Some(index as u16);
        }
        Ok(clip)
    }

    /// Copy a host animation
    ///
    /// Bones with a source track take its keys verbatim (single keys are
    /// held for the whole clip) and record the track's position as their
    /// output index. Bones without one are synthesized from the bind pose.
    pub fn from_source(
        skeleton: Arc<Skeleton>,
        source: &SourceAnimation,
        is_additive: bool,
    ) -> Result<Self> {
        source.validate(skeleton.bone_count())?;

        let mut clip = Self::new(
            skeleton,
            source.frame_count,
            source.sample_rate,
            source.name.clone(),
            is_additive,
        )?;
        let scale = default_scale(is_additive);
        let lookup = track_lookup(source);

        for (bone_index, bone) in clip.bones.iter_mut().enumerate() {
            let Some(&track_index) = lookup.get(&(bone_index as u16)) else {
                continue;
            };
            let track = &source.tracks[track_index];
            // Rotation and translation keys are validated non-empty
            bone.rotation = keys_to_track(&track.rotations, Quat::IDENTITY);
            bone.translation = keys_to_track(&track.translations, Vec3::ZERO);
            bone.scale = keys_to_track(&track.scales, scale);
            bone.output_index = Some(track_index as u16);
        }

        tracing::debug!(
            "Built clip '{}' from source: {} tracks, {} of {} bones synthesized",
            clip.name,
            source.tracks.len(),
            clip.bones.iter().filter(|b| b.output_index.is_none()).count(),
            clip.bones.len()
        );

        Ok(clip)
    }

    /// Single-sample clip holding one frame of a host animation
    ///
    /// `frame_index` is clamped to the last frame. Used to build additive
    /// base or preview poses.
    pub fn reference_frame(
        skeleton: Arc<Skeleton>,
        source: &SourceAnimation,
        frame_index: u32,
        is_additive: bool,
    ) -> Result<Self> {
        source.validate(skeleton.bone_count())?;

        let frame = frame_index.min(source.frame_count - 1) as usize;
        let mut clip = Self::new(
            skeleton,
            1,
            SINGLE_SAMPLE_RATE,
            source.name.clone(),
            is_additive,
        )?;
        let scale = default_scale(is_additive);
        let lookup = track_lookup(source);

        for (bone_index, bone) in clip.bones.iter_mut().enumerate() {
            let Some(&track_index) = lookup.get(&(bone_index as u16)) else {
                continue;
            };
            let track = &source.tracks[track_index];
            if let Some(rotation) = SourceTrack::key(&track.rotations, frame) {
                bone.rotation = Track::Constant(rotation);
            }
            if let Some(translation) = SourceTrack::key(&track.translations, frame) {
                bone.translation = Track::Constant(translation);
            }
            bone.scale = Track::Constant(SourceTrack::key(&track.scales, frame).unwrap_or(scale));
            bone.output_index = Some(track_index as u16);
        }

        Ok(clip)
    }

    /// Overwrite one sample of one bone
    pub fn set_sample(
        &mut self,
        bone_index: usize,
        sample_index: usize,
        value: SampleValue,
    ) -> Result<()> {
        let bone_count = self.bones.len();
        let sample_count = self.sample_count as usize;
        if sample_index >= sample_count {
            return Err(AnimError::out_of_range("sample", sample_index, sample_count));
        }
        let bone = self
            .bones
            .get_mut(bone_index)
            .ok_or_else(|| AnimError::out_of_range("bone", bone_index, bone_count))?;

        match value {
            SampleValue::Rotation(q) => bone.rotation.set(sample_index, q, sample_count),
            SampleValue::Translation(t) => bone.translation.set(sample_index, t, sample_count),
            SampleValue::Scale(s) => bone.scale.set(sample_index, s, sample_count),
        }
        Ok(())
    }

    /// Route a bone to a host track slot (`None` = synthesized)
    pub fn set_output_index(&mut self, bone_index: usize, output_index: Option<u16>) -> Result<()> {
        let bone_count = self.bones.len();
        let bone = self
            .bones
            .get_mut(bone_index)
            .ok_or_else(|| AnimError::out_of_range("bone", bone_index, bone_count))?;
        bone.output_index = output_index;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn skeleton(&self) -> &Skeleton {
        &self.skeleton
    }

    pub fn shared_skeleton(&self) -> Arc<Skeleton> {
        Arc::clone(&self.skeleton)
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Length in seconds (0 for single-sample clips)
    pub fn duration(&self) -> f32 {
        (self.sample_count - 1) as f32 / self.sample_rate
    }

    pub fn is_additive(&self) -> bool {
        self.is_additive
    }

    pub fn bones(&self) -> &[BoneTracks] {
        &self.bones
    }

    pub fn bone_tracks(&self, bone_index: usize) -> Result<&BoneTracks> {
        self.bones
            .get(bone_index)
            .ok_or_else(|| AnimError::out_of_range("bone", bone_index, self.bones.len()))
    }

    pub fn output_index(&self, bone_index: usize) -> Result<Option<u16>> {
        Ok(self.bone_tracks(bone_index)?.output_index)
    }

    /// Value a stripped track decodes to
    pub fn default_value(&self, bone_index: usize, channel: Channel) -> Result<SampleValue> {
        let bind = self.skeleton.bone(bone_index)?.bind_transform;
        Ok(match channel {
            Channel::Rotation => SampleValue::Rotation(bind.rotation),
            Channel::Translation => SampleValue::Translation(bind.translation),
            Channel::Scale => SampleValue::Scale(default_scale(self.is_additive)),
        })
    }

    /// Local transforms of every bone at one sample
    pub fn sample_pose(&self, sample_index: usize) -> Result<Vec<BoneTransform>> {
        let sample_count = self.sample_count as usize;
        if sample_index >= sample_count {
            return Err(AnimError::out_of_range("sample", sample_index, sample_count));
        }
        self.bones
            .iter()
            .enumerate()
            .map(|(bone, tracks)| {
                tracks.sample(sample_index).ok_or_else(|| {
                    AnimError::InvalidClip(format!(
                        "bone {} track shorter than {} samples",
                        bone, sample_count
                    ))
                })
            })
            .collect()
    }
}

/// First track per bone wins
fn track_lookup(source: &SourceAnimation) -> HashMap<u16, usize> {
    let mut lookup = HashMap::with_capacity(source.tracks.len());
    for (index, track) in source.tracks.iter().enumerate() {
        lookup.entry(track.bone_index).or_insert(index);
    }
    lookup
}

fn keys_to_track<T: Copy>(keys: &[T], missing: T) -> Track<T> {
    match keys.len() {
        0 => Track::Constant(missing),
        1 => Track::Constant(keys[0]),
        _ => Track::Sampled(keys.to_vec()),
    }
}
