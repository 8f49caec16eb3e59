//! Compressed clip header and track descriptor tags

use crate::error::{AnimError, Result};
use crate::format::{RangeReductionFlags, RotationFormat, VectorFormat};

/// Compressed clip header (32 bytes)
///
/// Note: Not packed - we use explicit byte serialization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipHeader {
    /// Format version
    pub version: u16,
    /// Bit 0: additive clip
    pub flags: u16,
    pub bone_count: u16,
    pub rotation_format: RotationFormat,
    pub translation_format: VectorFormat,
    pub scale_format: VectorFormat,
    pub range_reduction: RangeReductionFlags,
    /// Length of the UTF-8 clip name following the header
    pub name_len: u16,
    pub sample_count: u32,
    /// Samples per second
    pub sample_rate: f32,
    /// Length of the packed sample payload
    pub payload_bytes: u32,
    /// Length of the track descriptor table
    pub descriptor_bytes: u32,
}

impl ClipHeader {
    pub const SIZE: usize = 32;
    pub const MAGIC: [u8; 4] = *b"NCAN";
    pub const VERSION: u16 = 1;
    pub const FLAG_ADDITIVE: u16 = 1;

    /// Bytes per bone table entry: bind rotation, bind translation, output index
    pub const BONE_ENTRY_SIZE: usize = 4 * 4 + 3 * 4 + 2;

    pub fn is_additive(&self) -> bool {
        self.flags & Self::FLAG_ADDITIVE != 0
    }

    /// Write header to bytes
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&Self::MAGIC);
        bytes[4..6].copy_from_slice(&self.version.to_le_bytes());
        bytes[6..8].copy_from_slice(&self.flags.to_le_bytes());
        bytes[8..10].copy_from_slice(&self.bone_count.to_le_bytes());
        bytes[10] = self.rotation_format.to_u8();
        bytes[11] = self.translation_format.to_u8();
        bytes[12] = self.scale_format.to_u8();
        bytes[13] = self.range_reduction.bits();
        bytes[14..16].copy_from_slice(&self.name_len.to_le_bytes());
        bytes[16..20].copy_from_slice(&self.sample_count.to_le_bytes());
        bytes[20..24].copy_from_slice(&self.sample_rate.to_le_bytes());
        bytes[24..28].copy_from_slice(&self.payload_bytes.to_le_bytes());
        bytes[28..32].copy_from_slice(&self.descriptor_bytes.to_le_bytes());
        bytes
    }

    /// Read and validate a header
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::SIZE {
            return Err(AnimError::corrupt(format!(
                "buffer of {} bytes is shorter than the {} byte header",
                bytes.len(),
                Self::SIZE
            )));
        }
        if bytes[0..4] != Self::MAGIC {
            return Err(AnimError::corrupt("bad magic"));
        }

        let u16_at = |at: usize| u16::from_le_bytes([bytes[at], bytes[at + 1]]);
        let u32_at =
            |at: usize| u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);

        let rotation_format = RotationFormat::from_u8(bytes[10])
            .ok_or_else(|| AnimError::corrupt(format!("unknown rotation format {}", bytes[10])))?;
        let translation_format = VectorFormat::from_u8(bytes[11])
            .ok_or_else(|| AnimError::corrupt(format!("unknown translation format {}", bytes[11])))?;
        let scale_format = VectorFormat::from_u8(bytes[12])
            .ok_or_else(|| AnimError::corrupt(format!("unknown scale format {}", bytes[12])))?;
        let range_reduction = RangeReductionFlags::from_bits(bytes[13])
            .ok_or_else(|| AnimError::corrupt(format!("unknown range flags {:#04x}", bytes[13])))?;

        let header = Self {
            version: u16_at(4),
            flags: u16_at(6),
            bone_count: u16_at(8),
            rotation_format,
            translation_format,
            scale_format,
            range_reduction,
            name_len: u16_at(14),
            sample_count: u32_at(16),
            sample_rate: f32::from_bits(u32_at(20)),
            payload_bytes: u32_at(24),
            descriptor_bytes: u32_at(28),
        };
        header.validate()?;
        Ok(header)
    }

    /// Validate header
    pub fn validate(&self) -> Result<()> {
        if self.version != Self::VERSION {
            return Err(AnimError::corrupt(format!(
                "unsupported version {}",
                self.version
            )));
        }
        if self.flags & !Self::FLAG_ADDITIVE != 0 {
            return Err(AnimError::corrupt(format!("unknown flags {:#06x}", self.flags)));
        }
        if self.bone_count == 0 || self.sample_count == 0 {
            return Err(AnimError::corrupt("clip has no bones or no samples"));
        }
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(AnimError::corrupt(format!(
                "invalid sample rate {}",
                self.sample_rate
            )));
        }
        Ok(())
    }

    /// Offset of the bone table
    pub fn bone_table_offset(&self) -> usize {
        Self::SIZE + self.name_len as usize
    }

    /// Offset of the track descriptor table
    pub fn descriptor_offset(&self) -> usize {
        self.bone_table_offset() + self.bone_count as usize * Self::BONE_ENTRY_SIZE
    }

    /// Offset of the packed payload
    pub fn payload_offset(&self) -> usize {
        self.descriptor_offset() + self.descriptor_bytes as usize
    }

    /// Calculate total buffer size
    pub fn file_size(&self) -> usize {
        self.payload_offset() + self.payload_bytes as usize
    }
}

/// Storage kind tag of a track descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TrackKind {
    Default = 0,
    Constant = 1,
    Raw = 2,
    Quantized = 3,
}

impl TrackKind {
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Default),
            1 => Some(Self::Constant),
            2 => Some(Self::Raw),
            3 => Some(Self::Quantized),
            _ => None,
        }
    }
}
