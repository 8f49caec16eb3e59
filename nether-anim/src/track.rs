//! Per-bone sample tracks

use glam::{Quat, Vec3};

use crate::format::Channel;
use crate::math::BoneTransform;

/// Samples of one channel: a single value held for the whole clip, or one value per sample
#[derive(Debug, Clone, PartialEq)]
pub enum Track<T> {
    Constant(T),
    Sampled(Vec<T>),
}

impl<T: Copy> Track<T> {
    /// Value at a sample index (constant tracks ignore the index)
    pub fn get(&self, index: usize) -> Option<T> {
        match self {
            Self::Constant(value) => Some(*value),
            Self::Sampled(samples) => samples.get(index).copied(),
        }
    }

    /// Stored sample count (1 for constant tracks)
    pub fn len(&self) -> usize {
        match self {
            Self::Constant(_) => 1,
            Self::Sampled(samples) => samples.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace one sample, broadcasting a constant track to `sample_count` samples first
    pub(crate) fn set(&mut self, index: usize, value: T, sample_count: usize) {
        match self {
            Self::Constant(current) if sample_count <= 1 => *current = value,
            Self::Constant(current) => {
                let mut samples = vec![*current; sample_count];
                samples[index] = value;
                *self = Self::Sampled(samples);
            }
            Self::Sampled(samples) => samples[index] = value,
        }
    }

    /// All samples expanded to `sample_count` values
    pub fn to_samples(&self, sample_count: usize) -> Vec<T> {
        match self {
            Self::Constant(value) => vec![*value; sample_count],
            Self::Sampled(samples) => samples.clone(),
        }
    }
}

/// A single sample value for [`crate::AnimationClip::set_sample`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleValue {
    Rotation(Quat),
    Translation(Vec3),
    Scale(Vec3),
}

impl SampleValue {
    pub fn channel(&self) -> Channel {
        match self {
            Self::Rotation(_) => Channel::Rotation,
            Self::Translation(_) => Channel::Translation,
            Self::Scale(_) => Channel::Scale,
        }
    }
}

/// Rotation, translation and scale tracks of one bone
#[derive(Debug, Clone, PartialEq)]
pub struct BoneTracks {
    pub rotation: Track<Quat>,
    pub translation: Track<Vec3>,
    pub scale: Track<Vec3>,
    /// Index into the host's track order, `None` when synthesized from the bind pose
    pub output_index: Option<u16>,
}

impl BoneTracks {
    /// Constant tracks holding one transform
    pub fn constant(transform: BoneTransform, output_index: Option<u16>) -> Self {
        Self {
            rotation: Track::Constant(transform.rotation),
            translation: Track::Constant(transform.translation),
            scale: Track::Constant(transform.scale),
            output_index,
        }
    }

    /// Transform at a sample index, `None` past the end of a sampled track
    pub fn sample(&self, index: usize) -> Option<BoneTransform> {
        Some(BoneTransform {
            rotation: self.rotation.get(index)?,
            translation: self.translation.get(index)?,
            scale: self.scale.get(index)?,
        })
    }
}
