//! Compressed clip writer
//!
//! Layout: [`ClipHeader`], clip name, bone table, track descriptors, then the
//! bit-packed payload of every animated track in descriptor order. Tables are
//! little-endian.

use byteorder::{LittleEndian, WriteBytesExt};
use std::io;

use crate::bitstream::BitWriter;
use crate::error::{AnimError, Result};
use crate::format::{Channel, ChannelEncoding, RAW_BITS};
use crate::header::{ClipHeader, TrackKind};
use crate::quantize::{EncodedTrack, QuantizedBone, QuantizedClip};
use crate::skeleton::{INVALID_BONE_INDEX, MAX_BONES};
use crate::track::SampleValue;

/// Serialize a quantized clip
///
/// Every track is checked against the clip's format plan first; a track the
/// plan did not certify fails with [`AnimError::UnsupportedFormat`] and no
/// bytes are produced.
pub fn encode(clip: &QuantizedClip) -> Result<Vec<u8>> {
    certify(clip)?;

    let mut payload = BitWriter::new();
    for bone in &clip.bones {
        for track in &bone.tracks {
            match track {
                EncodedTrack::Raw { values } => {
                    for value in values {
                        payload.write_bits(value.to_bits(), RAW_BITS);
                    }
                }
                EncodedTrack::Quantized { bits, values, .. } => {
                    for value in values {
                        payload.write_bits(*value, *bits);
                    }
                }
                EncodedTrack::Default | EncodedTrack::Constant(_) => {}
            }
        }
    }
    let payload = payload.finish();

    let mut descriptors = Vec::new();
    for bone in &clip.bones {
        for track in &bone.tracks {
            write_descriptor(&mut descriptors, track).map_err(write_failed)?;
        }
    }

    let header = ClipHeader {
        version: ClipHeader::VERSION,
        flags: if clip.is_additive {
            ClipHeader::FLAG_ADDITIVE
        } else {
            0
        },
        bone_count: clip.bones.len() as u16,
        rotation_format: clip.plan.rotation_format,
        translation_format: clip.plan.translation_format,
        scale_format: clip.plan.scale_format,
        range_reduction: clip.plan.range_reduction,
        name_len: clip.name.len() as u16,
        sample_count: clip.sample_count,
        sample_rate: clip.sample_rate,
        payload_bytes: to_u32(payload.len(), "payload")?,
        descriptor_bytes: to_u32(descriptors.len(), "descriptor table")?,
    };

    let mut bytes = Vec::with_capacity(header.file_size());
    bytes.extend_from_slice(&header.to_bytes());
    bytes.extend_from_slice(clip.name.as_bytes());
    for bone in &clip.bones {
        write_bone_entry(&mut bytes, bone).map_err(write_failed)?;
    }
    bytes.extend_from_slice(&descriptors);
    bytes.extend_from_slice(&payload);

    debug_assert_eq!(bytes.len(), header.file_size());
    Ok(bytes)
}

fn write_failed(err: io::Error) -> AnimError {
    AnimError::InvalidClip(format!("failed to write clip tables: {}", err))
}

fn to_u32(len: usize, what: &str) -> Result<u32> {
    u32::try_from(len)
        .map_err(|_| AnimError::InvalidClip(format!("{} of {} bytes is too large", what, len)))
}

fn write_bone_entry(out: &mut Vec<u8>, bone: &QuantizedBone) -> io::Result<()> {
    for value in bone.bind_rotation.to_array() {
        out.write_f32::<LittleEndian>(value)?;
    }
    for value in bone.bind_translation.to_array() {
        out.write_f32::<LittleEndian>(value)?;
    }
    out.write_u16::<LittleEndian>(bone.output_index.unwrap_or(INVALID_BONE_INDEX))?;
    Ok(())
}

fn write_descriptor(out: &mut Vec<u8>, track: &EncodedTrack) -> io::Result<()> {
    match track {
        EncodedTrack::Default => out.write_u8(TrackKind::Default as u8)?,
        EncodedTrack::Constant(value) => {
            out.write_u8(TrackKind::Constant as u8)?;
            let components = match value {
                SampleValue::Rotation(q) => q.to_array().to_vec(),
                SampleValue::Translation(v) | SampleValue::Scale(v) => v.to_array().to_vec(),
            };
            for component in components {
                out.write_f32::<LittleEndian>(component)?;
            }
        }
        EncodedTrack::Raw { .. } => out.write_u8(TrackKind::Raw as u8)?,
        EncodedTrack::Quantized { bits, range, .. } => {
            out.write_u8(TrackKind::Quantized as u8)?;
            out.write_u8(*bits)?;
            for value in range.min.iter().chain(&range.extent) {
                out.write_f32::<LittleEndian>(*value)?;
            }
        }
    }
    Ok(())
}

/// Check clip metadata and every track against the format plan
fn certify(clip: &QuantizedClip) -> Result<()> {
    clip.plan.certify()?;

    if clip.bones.is_empty() || clip.bones.len() > MAX_BONES {
        return Err(AnimError::InvalidClip(format!(
            "cannot encode {} bones",
            clip.bones.len()
        )));
    }
    if clip.sample_count == 0 || !(clip.sample_rate.is_finite() && clip.sample_rate > 0.0) {
        return Err(AnimError::InvalidClip(format!(
            "cannot encode {} samples at {} Hz",
            clip.sample_count, clip.sample_rate
        )));
    }
    if clip.name.len() > u16::MAX as usize {
        return Err(AnimError::InvalidClip(format!(
            "clip name of {} bytes is too long",
            clip.name.len()
        )));
    }

    let samples = clip.sample_count as usize;
    for (index, bone) in clip.bones.iter().enumerate() {
        if bone.output_index == Some(INVALID_BONE_INDEX) {
            return Err(AnimError::InvalidClip(format!(
                "bone {} uses the reserved output index",
                index
            )));
        }
        for channel in Channel::ALL {
            let encoding = clip.plan.encoding(channel);
            certify_track(bone.track(channel), channel, encoding, samples).map_err(|reason| {
                AnimError::UnsupportedFormat(format!(
                    "bone {} {} track: {}",
                    index,
                    channel.name(),
                    reason
                ))
            })?;
        }
    }
    Ok(())
}

fn certify_track(
    track: &EncodedTrack,
    channel: Channel,
    encoding: ChannelEncoding,
    samples: usize,
) -> std::result::Result<(), String> {
    match track {
        EncodedTrack::Default => Ok(()),
        EncodedTrack::Constant(value) => {
            if value.channel() == channel {
                Ok(())
            } else {
                Err(format!("holds a {} value", value.channel().name()))
            }
        }
        EncodedTrack::Raw { values } => match encoding {
            ChannelEncoding::Full { components } if values.len() == samples * components => Ok(()),
            ChannelEncoding::Full { components } => Err(format!(
                "{} raw values, expected {}",
                values.len(),
                samples * components
            )),
            _ => Err(format!("raw storage not certified for {:?}", encoding)),
        },
        EncodedTrack::Quantized {
            bits,
            range,
            values,
        } => {
            if matches!(encoding, ChannelEncoding::Full { .. }) || !encoding.accepts_bits(*bits) {
                return Err(format!("{} bits not certified for {:?}", bits, encoding));
            }
            if values.len() != samples * 3 {
                return Err(format!(
                    "{} quantized values, expected {}",
                    values.len(),
                    samples * 3
                ));
            }
            let max = (1u32 << *bits) - 1;
            if values.iter().any(|v| *v > max) {
                return Err(format!("value exceeds {} bits", bits));
            }
            let finite = range.min.iter().chain(&range.extent).all(|v| v.is_finite());
            if !finite || range.extent.iter().any(|e| *e < 0.0) {
                return Err("invalid range".to_string());
            }
            Ok(())
        }
    }
}
