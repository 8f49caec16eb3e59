//! Track classification, range reduction and bit-rate search
//!
//! Quantization runs in three passes:
//!
//! 1. Every track is classified as default (stripped), constant or animated.
//!    Bones are independent here, so this pass runs in parallel.
//! 2. Variable-rate channels pick the narrowest width whose vertex error stays
//!    within the threshold. Bones are visited parents first and measured
//!    against the lossy chain already chosen for their ancestors.
//! 3. The complete lossy pose is verified. While a bone is above the
//!    threshold, precision is raised on that bone or its ancestors; when
//!    nothing can be raised the clip fails with
//!    [`AnimError::ToleranceUnsatisfiable`].

mod error_metric;


use glam::{Affine3A, Quat, Vec3};
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::clip::{AnimationClip, default_scale};
use crate::error::{AnimError, Result};
use crate::format::{Channel, ChannelEncoding, FormatPlan, MAX_QUANTIZED_BITS, select_formats};
use crate::math::{BoneTransform, rotation_angle};
use crate::range::{
    TrackRange, dequantize_components, drop_w, quantize_components, rotation_from_xyz,
};
use crate::settings::CompressionSettings;
use crate::track::{BoneTracks, SampleValue};

use error_metric::{compose, vertex_error};

/// How one track is stored after quantization
#[derive(Debug, Clone, PartialEq)]
pub enum EncodedTrack {
    /// Stripped: decodes to the bind pose (or the additive default scale)
    Default,
    /// One full-precision value held for the whole clip
    Constant(SampleValue),
    /// Full-precision components, `sample_count × components` values
    Raw { values: Vec<f32> },
    /// Range-reduced components, `sample_count × 3` values of `bits` each
    Quantized {
        bits: u8,
        range: TrackRange,
        values: Vec<u32>,
    },
}

impl EncodedTrack {
    pub fn is_animated(&self) -> bool {
        matches!(self, Self::Raw { .. } | Self::Quantized { .. })
    }
}

/// Quantized tracks of one bone
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizedBone {
    pub bind_rotation: Quat,
    pub bind_translation: Vec3,
    pub output_index: Option<u16>,
    /// Rotation, translation, scale
    pub tracks: [EncodedTrack; 3],
}

impl QuantizedBone {
    pub fn track(&self, channel: Channel) -> &EncodedTrack {
        &self.tracks[channel.index()]
    }
}

/// A clip whose every track has a certified encoding
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizedClip {
    pub name: String,
    pub sample_count: u32,
    pub sample_rate: f32,
    pub is_additive: bool,
    pub plan: FormatPlan,
    pub bones: Vec<QuantizedBone>,
    /// Worst vertex error over all bones and samples
    pub max_error: f32,
    /// Bone the worst error occurred on, `None` for a lossless result
    pub worst_bone: Option<usize>,
}

impl QuantizedClip {
    /// Stripped, constant and animated track counts
    pub fn track_counts(&self) -> (usize, usize, usize) {
        let mut counts = (0, 0, 0);
        for track in self.bones.iter().flat_map(|b| b.tracks.iter()) {
            match track {
                EncodedTrack::Default => counts.0 += 1,
                EncodedTrack::Constant(_) => counts.1 += 1,
                _ => counts.2 += 1,
            }
        }
        counts
    }
}

/// Quantize every track of a clip so the decoded pose stays within the error threshold
pub fn quantize_clip(clip: &AnimationClip, settings: &CompressionSettings) -> Result<QuantizedClip> {
    settings.validate()?;
    let plan = select_formats(settings)?;

    let mut quantizer = Quantizer::new(clip, settings, plan);
    quantizer.search();
    let (max_error, worst_bone) = quantizer.verify_and_escalate()?;
    Ok(quantizer.finish(max_error, worst_bone))
}

/// Vertex error of one track quantized at `bits`, every other track exact
///
/// The bone's ancestors are exact too, so the result depends only on the
/// track itself.
pub fn measure_track_error(
    clip: &AnimationClip,
    settings: &CompressionSettings,
    bone_index: usize,
    channel: Channel,
    bits: u8,
) -> Result<f32> {
    settings.validate()?;
    if bits == 0 || bits > MAX_QUANTIZED_BITS {
        return Err(AnimError::InvalidSettings(format!(
            "bit width {} outside 1..={}",
            bits, MAX_QUANTIZED_BITS
        )));
    }
    clip.skeleton().bone(bone_index)?;
    let plan = select_formats(settings)?;

    let quantizer = Quantizer::new(clip, settings, plan);
    Ok(quantizer.channel_error(bone_index, channel, Reconstruction::Quantized { bits }))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrackState {
    Default,
    Constant,
    Animated { bits: u8 },
}

/// How a track's values are rebuilt when measuring error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reconstruction {
    Exact,
    Default,
    Constant,
    Raw { components: usize },
    Quantized { bits: u8 },
}

impl Reconstruction {
    fn of(state: TrackState, encoding: ChannelEncoding) -> Self {
        match (state, encoding) {
            (TrackState::Default, _) => Self::Default,
            (TrackState::Constant, _) => Self::Constant,
            (TrackState::Animated { .. }, ChannelEncoding::Full { components }) => {
                Self::Raw { components }
            }
            (TrackState::Animated { bits }, _) => Self::Quantized { bits },
        }
    }
}

/// Expanded samples and default values of one bone
struct BoneSamples {
    rotations: Vec<Quat>,
    translations: Vec<Vec3>,
    scales: Vec<Vec3>,
    default: BoneTransform,
}

impl BoneSamples {
    fn new(tracks: &BoneTracks, default: BoneTransform, sample_count: usize) -> Self {
        Self {
            rotations: tracks.rotation.to_samples(sample_count),
            translations: tracks.translation.to_samples(sample_count),
            scales: tracks.scale.to_samples(sample_count),
            default,
        }
    }

    fn classify(&self, settings: &CompressionSettings, plan: &FormatPlan) -> [TrackState; 3] {
        let rotation_threshold = settings.constant_rotation_threshold_angle;
        let translation_threshold = settings.constant_translation_threshold;
        let scale_threshold = settings.constant_scale_threshold;

        [
            classify(
                &self.rotations,
                self.default.rotation,
                |a, b| rotation_angle(a, b) <= rotation_threshold,
                plan.rotation,
            ),
            classify(
                &self.translations,
                self.default.translation,
                |a, b| a.distance(b) <= translation_threshold,
                plan.translation,
            ),
            classify(
                &self.scales,
                self.default.scale,
                |a, b| (a - b).abs().max_element() <= scale_threshold,
                plan.scale,
            ),
        ]
    }

    fn rotations_with(&self, how: Reconstruction) -> Vec<Quat> {
        let count = self.rotations.len();
        match how {
            Reconstruction::Exact | Reconstruction::Raw { components: 4 } => self.rotations.clone(),
            Reconstruction::Default => vec![self.default.rotation; count],
            Reconstruction::Constant => vec![self.rotations[0]; count],
            Reconstruction::Raw { .. } => self
                .rotations
                .iter()
                .map(|q| rotation_from_xyz(drop_w(*q)))
                .collect(),
            Reconstruction::Quantized { bits } => {
                requantize(&rotation_components(&self.rotations), bits)
                    .into_iter()
                    .map(rotation_from_xyz)
                    .collect()
            }
        }
    }

    fn local_with(&self, how: [Reconstruction; 3]) -> Vec<BoneTransform> {
        let rotations = self.rotations_with(how[0]);
        let translations = vectors_with(&self.translations, self.default.translation, how[1]);
        let scales = vectors_with(&self.scales, self.default.scale, how[2]);

        rotations
            .into_iter()
            .zip(translations)
            .zip(scales)
            .map(|((rotation, translation), scale)| BoneTransform {
                rotation,
                translation,
                scale,
            })
            .collect()
    }

    fn encode(&self, channel: Channel, state: TrackState, encoding: ChannelEncoding) -> EncodedTrack {
        match Reconstruction::of(state, encoding) {
            Reconstruction::Default | Reconstruction::Exact => EncodedTrack::Default,
            Reconstruction::Constant => EncodedTrack::Constant(match channel {
                Channel::Rotation => SampleValue::Rotation(self.rotations[0]),
                Channel::Translation => SampleValue::Translation(self.translations[0]),
                Channel::Scale => SampleValue::Scale(self.scales[0]),
            }),
            Reconstruction::Raw { components } => {
                let values = match channel {
                    Channel::Rotation if components == 4 => self
                        .rotations
                        .iter()
                        .flat_map(|q| q.to_array())
                        .collect(),
                    _ => self.components(channel).into_iter().flatten().collect(),
                };
                EncodedTrack::Raw { values }
            }
            Reconstruction::Quantized { bits } => {
                let components = self.components(channel);
                let range = TrackRange::from_samples(&components);
                let values = components
                    .iter()
                    .flat_map(|c| quantize_components(&range, *c, bits))
                    .collect();
                EncodedTrack::Quantized {
                    bits,
                    range,
                    values,
                }
            }
        }
    }

    fn components(&self, channel: Channel) -> Vec<[f32; 3]> {
        match channel {
            Channel::Rotation => rotation_components(&self.rotations),
            Channel::Translation => self.translations.iter().map(|v| v.to_array()).collect(),
            Channel::Scale => self.scales.iter().map(|v| v.to_array()).collect(),
        }
    }
}

fn classify<T: Copy>(
    samples: &[T],
    default: T,
    within: impl Fn(T, T) -> bool,
    encoding: ChannelEncoding,
) -> TrackState {
    let first = samples[0];
    if samples.iter().all(|s| within(*s, default)) {
        TrackState::Default
    } else if samples.iter().all(|s| within(*s, first)) {
        TrackState::Constant
    } else {
        TrackState::Animated {
            bits: encoding.initial_bits(),
        }
    }
}

fn rotation_components(rotations: &[Quat]) -> Vec<[f32; 3]> {
    rotations.iter().map(|q| drop_w(*q)).collect()
}

fn vectors_with(samples: &[Vec3], default: Vec3, how: Reconstruction) -> Vec<Vec3> {
    match how {
        Reconstruction::Exact | Reconstruction::Raw { .. } => samples.to_vec(),
        Reconstruction::Default => vec![default; samples.len()],
        Reconstruction::Constant => vec![samples[0]; samples.len()],
        Reconstruction::Quantized { bits } => {
            let components: Vec<[f32; 3]> = samples.iter().map(|v| v.to_array()).collect();
            requantize(&components, bits)
                .into_iter()
                .map(Vec3::from_array)
                .collect()
        }
    }
}

/// Quantize and dequantize a track against its own range
fn requantize(components: &[[f32; 3]], bits: u8) -> Vec<[f32; 3]> {
    let range = TrackRange::from_samples(components);
    components
        .iter()
        .map(|c| dequantize_components(&range, quantize_components(&range, *c, bits), bits))
        .collect()
}

/// Working state of one quantization run
struct Quantizer<'a> {
    clip: &'a AnimationClip,
    plan: FormatPlan,
    threshold: f32,
    samples: Vec<BoneSamples>,
    states: Vec<[TrackState; 3]>,
    exact_object: Vec<Vec<Affine3A>>,
    lossy_local: Vec<Vec<BoneTransform>>,
    lossy_object: Vec<Vec<Affine3A>>,
}

impl<'a> Quantizer<'a> {
    fn new(clip: &'a AnimationClip, settings: &CompressionSettings, plan: FormatPlan) -> Self {
        let sample_count = clip.sample_count() as usize;
        let scale = default_scale(clip.is_additive());

        let (samples, states): (Vec<_>, Vec<_>) = clip
            .skeleton()
            .bones()
            .par_iter()
            .zip(clip.bones().par_iter())
            .map(|(bone, tracks)| {
                let default = BoneTransform { scale, ..bone.bind_transform };
                let samples = BoneSamples::new(tracks, default, sample_count);
                let states = samples.classify(settings, &plan);
                (samples, states)
            })
            .unzip();

        let mut quantizer = Self {
            clip,
            plan,
            threshold: settings.error_threshold,
            samples,
            states,
            exact_object: Vec::new(),
            lossy_local: Vec::new(),
            lossy_object: Vec::new(),
        };

        for bone in 0..quantizer.samples.len() {
            let local = quantizer.samples[bone].local_with([Reconstruction::Exact; 3]);
            let object = compose(
                quantizer.parent(bone).map(|p| quantizer.exact_object[p].as_slice()),
                &local,
                clip.is_additive(),
            );
            quantizer.exact_object.push(object);
        }
        quantizer
    }

    fn parent(&self, bone: usize) -> Option<usize> {
        self.clip.skeleton().bones()[bone].parent.map(usize::from)
    }

    fn bone_name(&self, bone: usize) -> &str {
        &self.clip.skeleton().bones()[bone].name
    }

    fn current(&self, bone: usize) -> [Reconstruction; 3] {
        let states = self.states[bone];
        Channel::ALL.map(|c| Reconstruction::of(states[c.index()], self.plan.encoding(c)))
    }

    /// Error of a bone rebuilt with `how`, composed onto a given parent chain
    fn error_with(
        &self,
        bone: usize,
        how: [Reconstruction; 3],
        parent_object: Option<&[Affine3A]>,
    ) -> f32 {
        let local = self.samples[bone].local_with(how);
        let object = compose(parent_object, &local, self.clip.is_additive());
        let distance = self.clip.skeleton().bones()[bone].vertex_distance;
        vertex_error(&self.exact_object[bone], &object, distance)
    }

    /// Error from one track alone: other tracks and all ancestors exact
    fn channel_error(&self, bone: usize, channel: Channel, how: Reconstruction) -> f32 {
        let mut all = [Reconstruction::Exact; 3];
        all[channel.index()] = how;
        let parent = self.parent(bone).map(|p| self.exact_object[p].as_slice());
        self.error_with(bone, all, parent)
    }

    /// Error the lossy ancestors alone cause on a bone
    fn inherited_error(&self, bone: usize) -> f32 {
        match self.parent(bone) {
            Some(p) => self.error_with(bone, [Reconstruction::Exact; 3], Some(&self.lossy_object[p])),
            None => 0.0,
        }
    }

    /// Greedy per-track width search, parents first
    fn search(&mut self) {
        for bone in 0..self.samples.len() {
            let parent_object = self.parent(bone).map(|p| self.lossy_object[p].as_slice());
            let budget = self.threshold.max(self.inherited_error(bone));
            let mut states = self.states[bone];

            for channel in Channel::ALL {
                let ChannelEncoding::Variable { min_bits, max_bits } = self.plan.encoding(channel)
                else {
                    continue;
                };
                if !matches!(states[channel.index()], TrackState::Animated { .. }) {
                    continue;
                }

                let mut chosen = max_bits;
                for bits in min_bits..=max_bits {
                    let mut how = [Reconstruction::Exact; 3];
                    how[channel.index()] = Reconstruction::Quantized { bits };
                    if self.error_with(bone, how, parent_object) <= budget {
                        chosen = bits;
                        break;
                    }
                }
                states[channel.index()] = TrackState::Animated { bits: chosen };
            }

            debug!(
                "Bone {} ('{}'): rotation {:?}, translation {:?}, scale {:?}",
                bone,
                self.bone_name(bone),
                states[0],
                states[1],
                states[2]
            );

            self.states[bone] = states;
            let local = self.samples[bone].local_with(self.current(bone));
            let object = compose(
                self.parent(bone).map(|p| self.lossy_object[p].as_slice()),
                &local,
                self.clip.is_additive(),
            );
            self.lossy_local.push(local);
            self.lossy_object.push(object);
        }
    }

    /// Recompose the lossy chain and measure every bone
    fn refresh(&mut self) -> Vec<f32> {
        let mut errors = Vec::with_capacity(self.samples.len());
        for bone in 0..self.samples.len() {
            let object = compose(
                self.parent(bone).map(|p| self.lossy_object[p].as_slice()),
                &self.lossy_local[bone],
                self.clip.is_additive(),
            );
            let distance = self.clip.skeleton().bones()[bone].vertex_distance;
            errors.push(vertex_error(&self.exact_object[bone], &object, distance));
            self.lossy_object[bone] = object;
        }
        errors
    }

    fn verify_and_escalate(&mut self) -> Result<(f32, Option<usize>)> {
        loop {
            let errors = self.refresh();
            let Some(failing) = errors.iter().position(|e| *e > self.threshold) else {
                let (worst_bone, max_error) = errors
                    .iter()
                    .copied()
                    .enumerate()
                    .fold((None, 0.0f32), |(worst, max), (bone, error)| {
                        if error > max { (Some(bone), error) } else { (worst, max) }
                    });
                return Ok((max_error, worst_bone));
            };

            let ancestors: Vec<usize> = self.clip.skeleton().ancestors(failing).collect();
            let candidates: Vec<usize> = if self.inherited_error(failing) > self.threshold {
                ancestors.iter().copied().chain([failing]).collect()
            } else {
                [failing].into_iter().chain(ancestors.iter().copied()).collect()
            };

            let Some(raised) = candidates.into_iter().find(|&bone| self.escalate(bone)) else {
                return Err(AnimError::ToleranceUnsatisfiable {
                    bone: failing,
                    name: self.bone_name(failing).to_string(),
                    error: errors[failing],
                    threshold: self.threshold,
                });
            };

            if raised != failing {
                warn!(
                    "Raised precision on bone {} ('{}') to bring descendant {} ('{}') within {} (error {})",
                    raised,
                    self.bone_name(raised),
                    failing,
                    self.bone_name(failing),
                    self.threshold,
                    errors[failing]
                );
            }
        }
    }

    /// Raise one track of a bone by one step; false when nothing can improve
    ///
    /// Order: stripped or constant tracks that break the threshold on their
    /// own, then the widest-error variable track, then any stripped or
    /// constant track whose approximation still costs some error.
    fn escalate(&mut self, bone: usize) -> bool {
        if self.promote(bone, |error, threshold| error > threshold) {
            return true;
        }

        let mut widest: Option<(Channel, u8, f32)> = None;
        for channel in Channel::ALL {
            let ChannelEncoding::Variable { max_bits, .. } = self.plan.encoding(channel) else {
                continue;
            };
            let TrackState::Animated { bits } = self.states[bone][channel.index()] else {
                continue;
            };
            if bits >= max_bits {
                continue;
            }
            let error = self.channel_error(bone, channel, Reconstruction::Quantized { bits });
            if widest.is_none_or(|(_, _, worst)| error > worst) {
                widest = Some((channel, bits, error));
            }
        }

        if let Some((channel, bits, _)) = widest {
            debug!(
                "Widening {} track of bone {} ('{}') to {} bits",
                channel.name(),
                bone,
                self.bone_name(bone),
                bits + 1
            );
            self.set_state(bone, channel, TrackState::Animated { bits: bits + 1 });
            return true;
        }

        self.promote(bone, |error, _| error > 0.0)
    }

    /// Promote the first stripped or constant track whose own error passes `eligible`
    ///
    /// A stripped track tries a held constant before animation. The cheapest
    /// state that lowers the track's error to within the threshold wins;
    /// failing that, the cheapest one that lowers it at all.
    fn promote(&mut self, bone: usize, eligible: impl Fn(f32, f32) -> bool) -> bool {
        for channel in Channel::ALL {
            let state = self.states[bone][channel.index()];
            if !matches!(state, TrackState::Default | TrackState::Constant) {
                continue;
            }
            let encoding = self.plan.encoding(channel);
            let current = self.channel_error(bone, channel, Reconstruction::of(state, encoding));
            if !eligible(current, self.threshold) {
                continue;
            }

            let held = (state == TrackState::Default).then_some(TrackState::Constant);
            let animated = (encoding.initial_bits()..=encoding.max_bits())
                .map(|bits| TrackState::Animated { bits });
            let candidates: Vec<(TrackState, f32)> = held
                .into_iter()
                .chain(animated)
                .map(|next| {
                    let how = Reconstruction::of(next, encoding);
                    (next, self.channel_error(bone, channel, how))
                })
                .collect();

            let promoted = candidates
                .iter()
                .find(|(_, error)| *error < current && *error <= self.threshold)
                .or_else(|| candidates.iter().find(|(_, error)| *error < current))
                .map(|(next, _)| *next);

            if let Some(next) = promoted {
                debug!(
                    "Promoting {} track of bone {} ('{}') from {:?} to {:?}",
                    channel.name(),
                    bone,
                    self.bone_name(bone),
                    state,
                    next
                );
                self.set_state(bone, channel, next);
                return true;
            }
        }
        false
    }

    fn set_state(&mut self, bone: usize, channel: Channel, state: TrackState) {
        self.states[bone][channel.index()] = state;
        self.lossy_local[bone] = self.samples[bone].local_with(self.current(bone));
    }

    fn finish(self, max_error: f32, worst_bone: Option<usize>) -> QuantizedClip {
        let bones = self
            .clip
            .skeleton()
            .bones()
            .iter()
            .zip(self.clip.bones())
            .enumerate()
            .map(|(index, (bone, tracks))| {
                let samples = &self.samples[index];
                let states = self.states[index];
                QuantizedBone {
                    bind_rotation: bone.bind_transform.rotation,
                    bind_translation: bone.bind_transform.translation,
                    output_index: tracks.output_index,
                    tracks: Channel::ALL.map(|c| {
                        samples.encode(c, states[c.index()], self.plan.encoding(c))
                    }),
                }
            })
            .collect();

        QuantizedClip {
            name: self.clip.name().to_string(),
            sample_count: self.clip.sample_count(),
            sample_rate: self.clip.sample_rate(),
            is_additive: self.clip.is_additive(),
            plan: self.plan,
            bones,
            max_error,
            worst_bone,
        }
    }
}
