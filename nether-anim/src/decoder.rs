//! Compressed clip reader
//!
//! [`ClipReader`] parses and validates the header and tables once, then
//! decodes any sample by seeking straight to each track's bits in the
//! payload. Readers borrow the buffer immutably, so any number of them can
//! decode the same clip concurrently.

use byteorder::{LittleEndian, ReadBytesExt};
use glam::{Quat, Vec3};

use crate::bitstream::BitReader;
use crate::clip::default_scale;
use crate::error::{AnimError, Result};
use crate::format::{
    Channel, ChannelEncoding, FIXED_48_BITS, FormatPlan, MAX_QUANTIZED_BITS, RAW_BITS,
    RotationFormat, VectorFormat,
};
use crate::header::{ClipHeader, TrackKind};
use crate::math::BoneTransform;
use crate::range::{TrackRange, dequantize_components, rotation_from_xyz};
use crate::skeleton::INVALID_BONE_INDEX;
use crate::track::SampleValue;

/// Where and how one track is stored
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrackDescriptor {
    /// Stripped, decodes to the bind pose
    Default,
    Constant(SampleValue),
    Raw {
        components: u8,
        bit_offset: u64,
    },
    Quantized {
        bits: u8,
        range: TrackRange,
        bit_offset: u64,
    },
}

impl TrackDescriptor {
    pub fn kind(&self) -> TrackKind {
        match self {
            Self::Default => TrackKind::Default,
            Self::Constant(_) => TrackKind::Constant,
            Self::Raw { .. } => TrackKind::Raw,
            Self::Quantized { .. } => TrackKind::Quantized,
        }
    }

    /// Payload bits used per sample
    pub fn bits_per_sample(&self) -> u64 {
        match *self {
            Self::Default | Self::Constant(_) => 0,
            Self::Raw { components, .. } => components as u64 * RAW_BITS as u64,
            Self::Quantized { bits, .. } => 3 * bits as u64,
        }
    }
}

/// One entry of the bone table
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoneEntry {
    pub bind_rotation: Quat,
    pub bind_translation: Vec3,
    /// Host track slot, `None` for synthesized bones
    pub output_index: Option<u16>,
    /// Rotation, translation, scale
    pub tracks: [TrackDescriptor; 3],
}

/// Validated view over a compressed clip
#[derive(Debug, Clone)]
pub struct ClipReader<'a> {
    header: ClipHeader,
    name: &'a str,
    bones: Vec<BoneEntry>,
    payload: &'a [u8],
}

impl<'a> ClipReader<'a> {
    /// Parse a compressed clip
    ///
    /// Any structural inconsistency is a [`AnimError::CorruptBuffer`].
    pub fn new(bytes: &'a [u8]) -> Result<Self> {
        let header = ClipHeader::from_bytes(bytes)?;
        if bytes.len() != header.file_size() {
            return Err(AnimError::corrupt(format!(
                "buffer is {} bytes, header describes {}",
                bytes.len(),
                header.file_size()
            )));
        }

        let plan = header_plan(&header);
        plan.certify()
            .map_err(|err| AnimError::corrupt(format!("header formats: {}", err)))?;

        let name = std::str::from_utf8(&bytes[ClipHeader::SIZE..header.bone_table_offset()])
            .map_err(|_| AnimError::corrupt("clip name is not UTF-8"))?;

        let mut table = &bytes[header.bone_table_offset()..header.descriptor_offset()];
        let mut descriptors = &bytes[header.descriptor_offset()..header.payload_offset()];
        let sample_count = header.sample_count as u64;
        let mut bit_offset = 0u64;

        let mut bones = Vec::with_capacity(header.bone_count as usize);
        for _ in 0..header.bone_count {
            let bind_rotation = Quat::from_array(read_f32s(&mut table)?);
            let bind_translation = Vec3::from_array(read_f32s(&mut table)?);
            let output_index = match table.read_u16::<LittleEndian>().map_err(truncated)? {
                INVALID_BONE_INDEX => None,
                index => Some(index),
            };

            let mut tracks = [TrackDescriptor::Default; 3];
            for channel in Channel::ALL {
                let track = read_descriptor(&mut descriptors, &plan, channel, bit_offset)?;
                bit_offset += track.bits_per_sample() * sample_count;
                tracks[channel.index()] = track;
            }

            bones.push(BoneEntry {
                bind_rotation,
                bind_translation,
                output_index,
                tracks,
            });
        }

        if !descriptors.is_empty() {
            return Err(AnimError::corrupt(format!(
                "{} unused bytes in descriptor table",
                descriptors.len()
            )));
        }
        if bit_offset.div_ceil(8) != header.payload_bytes as u64 {
            return Err(AnimError::corrupt(format!(
                "tracks need {} payload bits, payload holds {} bytes",
                bit_offset, header.payload_bytes
            )));
        }

        Ok(Self {
            header,
            name,
            bones,
            payload: &bytes[header.payload_offset()..],
        })
    }

    pub fn header(&self) -> &ClipHeader {
        &self.header
    }

    pub fn name(&self) -> &'a str {
        self.name
    }

    pub fn bone_count(&self) -> usize {
        self.bones.len()
    }

    pub fn sample_count(&self) -> u32 {
        self.header.sample_count
    }

    pub fn sample_rate(&self) -> f32 {
        self.header.sample_rate
    }

    pub fn is_additive(&self) -> bool {
        self.header.is_additive()
    }

    /// Length in seconds
    pub fn duration(&self) -> f32 {
        (self.header.sample_count - 1) as f32 / self.header.sample_rate
    }

    pub fn bones(&self) -> &[BoneEntry] {
        &self.bones
    }

    pub fn descriptor(&self, bone_index: usize, channel: Channel) -> Result<&TrackDescriptor> {
        Ok(&self.bone(bone_index)?.tracks[channel.index()])
    }

    /// Host track slot of every bone
    pub fn output_indices(&self) -> Vec<Option<u16>> {
        self.bones.iter().map(|b| b.output_index).collect()
    }

    fn bone(&self, bone_index: usize) -> Result<&BoneEntry> {
        self.bones
            .get(bone_index)
            .ok_or_else(|| AnimError::out_of_range("bone", bone_index, self.bones.len()))
    }

    fn check_sample(&self, sample_index: usize) -> Result<()> {
        let count = self.header.sample_count as usize;
        if sample_index >= count {
            return Err(AnimError::out_of_range("sample", sample_index, count));
        }
        Ok(())
    }

    /// Local transform of one bone at one sample
    pub fn decode_bone(&self, bone_index: usize, sample_index: usize) -> Result<BoneTransform> {
        self.check_sample(sample_index)?;
        let bone = self.bone(bone_index)?;
        let sample = sample_index as u64;

        let rotation = match bone.tracks[0] {
            TrackDescriptor::Default => bone.bind_rotation,
            TrackDescriptor::Constant(SampleValue::Rotation(q)) => q,
            TrackDescriptor::Raw {
                components,
                bit_offset,
            } => {
                let values = self.read_raw(bit_offset, sample, components)?;
                if components == 4 {
                    Quat::from_xyzw(values[0], values[1], values[2], values[3])
                } else {
                    rotation_from_xyz([values[0], values[1], values[2]])
                }
            }
            TrackDescriptor::Quantized {
                bits,
                range,
                bit_offset,
            } => rotation_from_xyz(self.read_quantized(bit_offset, sample, bits, &range)?),
            TrackDescriptor::Constant(_) => {
                return Err(AnimError::corrupt("rotation track holds a vector"));
            }
        };

        Ok(BoneTransform {
            rotation,
            translation: self.decode_vector(&bone.tracks[1], sample, bone.bind_translation)?,
            scale: self.decode_vector(&bone.tracks[2], sample, default_scale(self.is_additive()))?,
        })
    }

    fn decode_vector(&self, track: &TrackDescriptor, sample: u64, default: Vec3) -> Result<Vec3> {
        Ok(match *track {
            TrackDescriptor::Default => default,
            TrackDescriptor::Constant(SampleValue::Translation(v) | SampleValue::Scale(v)) => v,
            TrackDescriptor::Constant(SampleValue::Rotation(_)) => {
                return Err(AnimError::corrupt("vector track holds a rotation"));
            }
            TrackDescriptor::Raw {
                components,
                bit_offset,
            } => {
                let values = self.read_raw(bit_offset, sample, components)?;
                Vec3::new(values[0], values[1], values[2])
            }
            TrackDescriptor::Quantized {
                bits,
                range,
                bit_offset,
            } => Vec3::from_array(self.read_quantized(bit_offset, sample, bits, &range)?),
        })
    }

    fn read_raw(&self, bit_offset: u64, sample: u64, components: u8) -> Result<[f32; 4]> {
        let stride = components as u64 * RAW_BITS as u64;
        let mut reader = BitReader::at(self.payload, bit_offset + sample * stride);
        let mut values = [0.0; 4];
        for value in values.iter_mut().take(components as usize) {
            *value = f32::from_bits(reader.read_bits(RAW_BITS)?);
        }
        Ok(values)
    }

    fn read_quantized(
        &self,
        bit_offset: u64,
        sample: u64,
        bits: u8,
        range: &TrackRange,
    ) -> Result<[f32; 3]> {
        let mut reader = BitReader::at(self.payload, bit_offset + sample * 3 * bits as u64);
        let quantized = [
            reader.read_bits(bits)?,
            reader.read_bits(bits)?,
            reader.read_bits(bits)?,
        ];
        Ok(dequantize_components(range, quantized, bits))
    }

    /// Local transforms of every bone at one sample
    pub fn decode_sample(&self, sample_index: usize) -> Result<Vec<BoneTransform>> {
        self.check_sample(sample_index)?;
        (0..self.bones.len())
            .map(|bone| self.decode_bone(bone, sample_index))
            .collect()
    }

    /// Blend of two samples, `t` in [0, 1]
    pub fn decode_interpolated(
        &self,
        sample_index: usize,
        next_sample_index: usize,
        t: f32,
    ) -> Result<Vec<BoneTransform>> {
        self.check_sample(next_sample_index)?;
        let from = self.decode_sample(sample_index)?;
        if t.is_nan() || t <= 0.0 || sample_index == next_sample_index {
            return Ok(from);
        }
        let to = self.decode_sample(next_sample_index)?;
        if t >= 1.0 {
            return Ok(to);
        }
        Ok(from
            .iter()
            .zip(&to)
            .map(|(a, b)| a.interpolate(b, t))
            .collect())
    }

    /// Pose at a time in seconds, clamped to the clip
    pub fn decode_at_time(&self, seconds: f32) -> Result<Vec<BoneTransform>> {
        let last = self.header.sample_count as usize - 1;
        let position = seconds.max(0.0).min(self.duration()) * self.header.sample_rate;
        let sample = (position.floor() as usize).min(last);
        let next = (sample + 1).min(last);
        let t = (position - sample as f32).clamp(0.0, 1.0);
        self.decode_interpolated(sample, next, t)
    }

    /// Decode a sample into a host-ordered pose
    ///
    /// Each bone is written to `out[output_index]`; synthesized bones are
    /// skipped and their slots left untouched.
    pub fn write_output_pose(&self, sample_index: usize, out: &mut [BoneTransform]) -> Result<()> {
        let pose = self.decode_sample(sample_index)?;
        let mut slots = self.bones.iter().filter_map(|b| b.output_index);
        if let Some(index) = slots.find(|i| *i as usize >= out.len()) {
            return Err(AnimError::out_of_range("output", index as usize, out.len()));
        }
        for (bone, transform) in self.bones.iter().zip(pose) {
            if let Some(index) = bone.output_index {
                out[index as usize] = transform;
            }
        }
        Ok(())
    }
}

/// Decode every bone of one sample
pub fn decode_sample(bytes: &[u8], sample_index: usize) -> Result<Vec<BoneTransform>> {
    ClipReader::new(bytes)?.decode_sample(sample_index)
}

/// Decode and blend two samples for sub-frame playback
pub fn decode_interpolated(
    bytes: &[u8],
    sample_index: usize,
    next_sample_index: usize,
    t: f32,
) -> Result<Vec<BoneTransform>> {
    ClipReader::new(bytes)?.decode_interpolated(sample_index, next_sample_index, t)
}

fn truncated(_: std::io::Error) -> AnimError {
    AnimError::corrupt("table truncated")
}

fn read_f32s<const N: usize>(input: &mut &[u8]) -> Result<[f32; N]> {
    let mut values = [0.0; N];
    for value in &mut values {
        *value = input.read_f32::<LittleEndian>().map_err(truncated)?;
    }
    Ok(values)
}

fn read_descriptor(
    input: &mut &[u8],
    plan: &FormatPlan,
    channel: Channel,
    bit_offset: u64,
) -> Result<TrackDescriptor> {
    let tag = input.read_u8().map_err(truncated)?;
    let kind = TrackKind::from_u8(tag)
        .ok_or_else(|| AnimError::corrupt(format!("unknown track kind {}", tag)))?;
    let encoding = plan.encoding(channel);

    Ok(match kind {
        TrackKind::Default => TrackDescriptor::Default,
        TrackKind::Constant => TrackDescriptor::Constant(match channel {
            Channel::Rotation => SampleValue::Rotation(Quat::from_array(read_f32s(input)?)),
            Channel::Translation => SampleValue::Translation(Vec3::from_array(read_f32s(input)?)),
            Channel::Scale => SampleValue::Scale(Vec3::from_array(read_f32s(input)?)),
        }),
        TrackKind::Raw => match encoding {
            ChannelEncoding::Full { components } => TrackDescriptor::Raw {
                components: components as u8,
                bit_offset,
            },
            _ => {
                return Err(AnimError::corrupt(format!(
                    "raw {} track in a quantized format",
                    channel.name()
                )));
            }
        },
        TrackKind::Quantized => {
            let bits = input.read_u8().map_err(truncated)?;
            let min = read_f32s(input)?;
            let extent = read_f32s(input)?;
            if matches!(encoding, ChannelEncoding::Full { .. }) || !encoding.accepts_bits(bits) {
                return Err(AnimError::corrupt(format!(
                    "{} bit {} track not allowed by its format",
                    bits,
                    channel.name()
                )));
            }
            TrackDescriptor::Quantized {
                bits,
                range: TrackRange { min, extent },
                bit_offset,
            }
        }
    })
}

/// Format plan implied by the header's format tags
///
/// Variable widths are not recorded in the header, so any width the format
/// family can store is accepted.
fn header_plan(header: &ClipHeader) -> FormatPlan {
    let variable = ChannelEncoding::Variable {
        min_bits: 1,
        max_bits: MAX_QUANTIZED_BITS,
    };
    let vector = |format: VectorFormat| match format {
        VectorFormat::Vector3_96 => ChannelEncoding::Full { components: 3 },
        VectorFormat::Vector3_48 => ChannelEncoding::Fixed {
            bits: FIXED_48_BITS,
        },
        VectorFormat::Vector3Variable => variable,
    };
    let rotation = match header.rotation_format {
        RotationFormat::Quat128 => ChannelEncoding::Full { components: 4 },
        RotationFormat::QuatDropW96 => ChannelEncoding::Full { components: 3 },
        RotationFormat::QuatDropW48 => ChannelEncoding::Fixed {
            bits: FIXED_48_BITS,
        },
        RotationFormat::QuatDropWVariable => variable,
    };

    FormatPlan {
        rotation_format: header.rotation_format,
        translation_format: header.translation_format,
        scale_format: header.scale_format,
        range_reduction: header.range_reduction,
        rotation,
        translation: vector(header.translation_format),
        scale: vector(header.scale_format),
    }
}
