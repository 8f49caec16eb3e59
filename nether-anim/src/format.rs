//! Track format selection
//!
//! Formats are a caller choice, not a heuristic. This module validates the
//! requested combination and maps it to the per-channel quantization
//! parameters the quantizer works with.
//!
//! | Format | Components | Storage | Range reduction |
//! |--------|------------|---------|-----------------|
//! | `Quat128` | x, y, z, w | f32 × 4 | not allowed |
//! | `QuatDropW96` | x, y, z | f32 × 3 | optional (ignored) |
//! | `QuatDropW48` | x, y, z | 16 bits × 3 | required |
//! | `QuatDropWVariable` | x, y, z | searched bits × 3 | required |
//! | `Vector3_96` | x, y, z | f32 × 3 | optional (ignored) |
//! | `Vector3_48` | x, y, z | 16 bits × 3 | required |
//! | `Vector3Variable` | x, y, z | searched bits × 3 | required |

use serde::{Deserialize, Serialize};

use crate::error::{AnimError, Result};
use crate::settings::CompressionSettings;

/// Bits per component of the fixed 48-bit formats
pub const FIXED_48_BITS: u8 = 16;

/// Highest bit width a quantized component may use
///
/// Normalized values are dequantized in f32, which carries 24 bits of mantissa.
pub const MAX_QUANTIZED_BITS: u8 = 23;

/// Bit width recorded for tracks stored as raw f32 components
pub const RAW_BITS: u8 = 32;

/// Rotation track encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum RotationFormat {
    /// Full quaternion, 4 × f32
    #[serde(rename = "quat_128")]
    Quat128,
    /// x, y, z as f32; w rebuilt as positive
    #[serde(rename = "quat_drop_w_96")]
    QuatDropW96,
    /// x, y, z range reduced to 16 bits each
    #[serde(rename = "quat_drop_w_48")]
    QuatDropW48,
    /// x, y, z range reduced, bit width searched per track
    #[default]
    #[serde(rename = "quat_drop_w_variable")]
    QuatDropWVariable,
}

/// Translation/scale track encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum VectorFormat {
    /// 3 × f32
    #[serde(rename = "vector3_96")]
    Vector3_96,
    /// Range reduced, 16 bits per component
    #[serde(rename = "vector3_48")]
    Vector3_48,
    /// Range reduced, bit width searched per track
    #[default]
    #[serde(rename = "vector3_variable")]
    Vector3Variable,
}

impl RotationFormat {
    pub const fn to_u8(self) -> u8 {
        match self {
            Self::Quat128 => 0,
            Self::QuatDropW96 => 1,
            Self::QuatDropW48 => 2,
            Self::QuatDropWVariable => 3,
        }
    }

    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Quat128),
            1 => Some(Self::QuatDropW96),
            2 => Some(Self::QuatDropW48),
            3 => Some(Self::QuatDropWVariable),
            _ => None,
        }
    }

    /// Number of stored components per sample
    pub const fn components(self) -> usize {
        match self {
            Self::Quat128 => 4,
            _ => 3,
        }
    }

    pub const fn is_variable(self) -> bool {
        matches!(self, Self::QuatDropWVariable)
    }
}

impl VectorFormat {
    pub const fn to_u8(self) -> u8 {
        match self {
            Self::Vector3_96 => 0,
            Self::Vector3_48 => 1,
            Self::Vector3Variable => 2,
        }
    }

    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Vector3_96),
            1 => Some(Self::Vector3_48),
            2 => Some(Self::Vector3Variable),
            _ => None,
        }
    }

    pub const fn is_variable(self) -> bool {
        matches!(self, Self::Vector3Variable)
    }
}

bitflags::bitflags! {
    /// Channels whose animated tracks are normalized to their own value range
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RangeReductionFlags: u8 {
        const ROTATIONS = 0b0000_0001;
        const TRANSLATIONS = 0b0000_0010;
        const SCALES = 0b0000_0100;
    }
}

impl Default for RangeReductionFlags {
    fn default() -> Self {
        Self::all()
    }
}

// Stored as the raw bit mask, matching the clip header
impl Serialize for RangeReductionFlags {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.bits().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RangeReductionFlags {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bits = u8::deserialize(deserializer)?;
        Ok(RangeReductionFlags::from_bits_truncate(bits))
    }
}

/// Track channel of a bone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Rotation,
    Translation,
    Scale,
}

impl Channel {
    /// Channels in storage order
    pub const ALL: [Channel; 3] = [Channel::Rotation, Channel::Translation, Channel::Scale];

    pub const fn index(self) -> usize {
        match self {
            Self::Rotation => 0,
            Self::Translation => 1,
            Self::Scale => 2,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Rotation => "rotation",
            Self::Translation => "translation",
            Self::Scale => "scale",
        }
    }

    const fn range_flag(self) -> RangeReductionFlags {
        match self {
            Self::Rotation => RangeReductionFlags::ROTATIONS,
            Self::Translation => RangeReductionFlags::TRANSLATIONS,
            Self::Scale => RangeReductionFlags::SCALES,
        }
    }
}

/// How animated samples of one channel are stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelEncoding {
    /// Raw f32 components, no range reduction
    Full { components: usize },
    /// Range reduced, uniform width for every track
    Fixed { bits: u8 },
    /// Range reduced, width searched per track within `[min_bits, max_bits]`
    Variable { min_bits: u8, max_bits: u8 },
}

impl ChannelEncoding {
    /// Stored components per sample
    pub const fn components(&self) -> usize {
        match self {
            Self::Full { components } => *components,
            _ => 3,
        }
    }

    /// Whether `bits` is a width this encoding may store
    pub fn accepts_bits(&self, bits: u8) -> bool {
        match *self {
            Self::Full { .. } => bits == RAW_BITS,
            Self::Fixed { bits: fixed } => bits == fixed,
            Self::Variable { min_bits, max_bits } => (min_bits..=max_bits).contains(&bits),
        }
    }

    /// Starting width for a newly animated track
    pub const fn initial_bits(&self) -> u8 {
        match *self {
            Self::Full { .. } => RAW_BITS,
            Self::Fixed { bits } => bits,
            Self::Variable { min_bits, .. } => min_bits,
        }
    }

    /// Largest width the encoding allows
    pub const fn max_bits(&self) -> u8 {
        match *self {
            Self::Full { .. } => RAW_BITS,
            Self::Fixed { bits } => bits,
            Self::Variable { max_bits, .. } => max_bits,
        }
    }
}

/// Certified per-channel quantization parameters for one clip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatPlan {
    pub rotation_format: RotationFormat,
    pub translation_format: VectorFormat,
    pub scale_format: VectorFormat,
    pub range_reduction: RangeReductionFlags,
    pub rotation: ChannelEncoding,
    pub translation: ChannelEncoding,
    pub scale: ChannelEncoding,
}

impl FormatPlan {
    pub const fn encoding(&self, channel: Channel) -> ChannelEncoding {
        match channel {
            Channel::Rotation => self.rotation,
            Channel::Translation => self.translation,
            Channel::Scale => self.scale,
        }
    }

    /// Whether the quantizer ran its bit-width search for this channel
    pub const fn is_variable(&self, channel: Channel) -> bool {
        matches!(self.encoding(channel), ChannelEncoding::Variable { .. })
    }
}

/// Validate the settings' format choice and build the quantization plan
pub fn select_formats(settings: &CompressionSettings) -> Result<FormatPlan> {
    let (min_bits, max_bits) = (settings.min_bits, settings.max_bits);

    let rotation = match settings.rotation_format {
        RotationFormat::Quat128 => ChannelEncoding::Full { components: 4 },
        RotationFormat::QuatDropW96 => ChannelEncoding::Full { components: 3 },
        RotationFormat::QuatDropW48 => ChannelEncoding::Fixed {
            bits: FIXED_48_BITS,
        },
        RotationFormat::QuatDropWVariable => ChannelEncoding::Variable { min_bits, max_bits },
    };

    let plan = FormatPlan {
        rotation_format: settings.rotation_format,
        translation_format: settings.translation_format,
        scale_format: settings.scale_format,
        range_reduction: settings.range_reduction,
        rotation,
        translation: vector_encoding(settings.translation_format, min_bits, max_bits),
        scale: vector_encoding(settings.scale_format, min_bits, max_bits),
    };
    plan.certify()?;
    Ok(plan)
}

impl FormatPlan {
    /// Check that the format combination is one the quantizer supports
    pub fn certify(&self) -> Result<()> {
        let range = self.range_reduction;
        if self.rotation_format == RotationFormat::Quat128
            && range.contains(RangeReductionFlags::ROTATIONS)
        {
            return Err(AnimError::UnsupportedFormat(
                "quat_128 rotations cannot be range reduced".to_string(),
            ));
        }

        let consistent = |format_variable: bool, format_fixed: bool, encoding: ChannelEncoding| {
            match encoding {
                ChannelEncoding::Full { .. } => !format_variable && !format_fixed,
                ChannelEncoding::Fixed { bits } => format_fixed && bits == FIXED_48_BITS,
                ChannelEncoding::Variable { min_bits, max_bits } => {
                    format_variable
                        && min_bits >= 1
                        && min_bits <= max_bits
                        && max_bits <= MAX_QUANTIZED_BITS
                }
            }
        };
        let rotation_ok = consistent(
            self.rotation_format.is_variable(),
            self.rotation_format == RotationFormat::QuatDropW48,
            self.rotation,
        ) && match self.rotation {
            ChannelEncoding::Full { components } => {
                components == self.rotation_format.components()
            }
            _ => true,
        };
        let translation_ok = consistent(
            self.translation_format.is_variable(),
            self.translation_format == VectorFormat::Vector3_48,
            self.translation,
        ) && self.translation.components() == 3;
        let scale_ok = consistent(
            self.scale_format.is_variable(),
            self.scale_format == VectorFormat::Vector3_48,
            self.scale,
        ) && self.scale.components() == 3;

        if !(rotation_ok && translation_ok && scale_ok) {
            return Err(AnimError::UnsupportedFormat(format!(
                "channel encodings do not match formats {:?}/{:?}/{:?}",
                self.rotation_format, self.translation_format, self.scale_format
            )));
        }

        for channel in Channel::ALL {
            let quantized = !matches!(self.encoding(channel), ChannelEncoding::Full { .. });
            if quantized && !range.contains(channel.range_flag()) {
                return Err(AnimError::UnsupportedFormat(format!(
                    "quantized {} format requires {} range reduction",
                    channel.name(),
                    channel.name()
                )));
            }
        }
        Ok(())
    }
}

fn vector_encoding(format: VectorFormat, min_bits: u8, max_bits: u8) -> ChannelEncoding {
    match format {
        VectorFormat::Vector3_96 => ChannelEncoding::Full { components: 3 },
        VectorFormat::Vector3_48 => ChannelEncoding::Fixed {
            bits: FIXED_48_BITS,
        },
        VectorFormat::Vector3Variable => ChannelEncoding::Variable { min_bits, max_bits },
    }
}
