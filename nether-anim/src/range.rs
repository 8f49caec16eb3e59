//! Range reduction and fixed-point component quantization
//!
//! Animated tracks are normalized to `[0, 1]` against their own per-component
//! bounds before quantization, so every bit covers only the values the track
//! actually visits. The quantizer and the decoder share these functions,
//! which keeps the error measured at compression time identical to what
//! playback reconstructs.
//!
//! Codes step by `1 / 2^bits`, so the grid of every width contains the grids
//! of all narrower widths and widening a track never moves a sample further
//! from its nearest code. The top code sits one step below the range maximum.

use glam::Quat;

use crate::format::RAW_BITS;

/// Per-component bounds of one track
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TrackRange {
    pub min: [f32; 3],
    pub extent: [f32; 3],
}

impl TrackRange {
    /// Smallest range covering every sample
    pub fn from_samples(samples: &[[f32; 3]]) -> Self {
        let mut min = [f32::MAX; 3];
        let mut max = [f32::MIN; 3];
        for sample in samples {
            for c in 0..3 {
                min[c] = min[c].min(sample[c]);
                max[c] = max[c].max(sample[c]);
            }
        }
        if samples.is_empty() {
            return Self::default();
        }
        Self {
            min,
            extent: [max[0] - min[0], max[1] - min[1], max[2] - min[2]],
        }
    }

    /// Map a value into `[0, 1]`
    pub fn normalize(&self, value: [f32; 3]) -> [f32; 3] {
        std::array::from_fn(|c| {
            if self.extent[c] > 0.0 {
                ((value[c] - self.min[c]) / self.extent[c]).clamp(0.0, 1.0)
            } else {
                0.0
            }
        })
    }

    /// Map a normalized value back into the track's range
    pub fn denormalize(&self, normalized: [f32; 3]) -> [f32; 3] {
        std::array::from_fn(|c| self.min[c] + normalized[c] * self.extent[c])
    }
}

/// Largest integer a `bits`-wide component holds
#[inline]
fn max_quantized(bits: u8) -> u32 {
    debug_assert!(bits > 0 && bits < RAW_BITS);
    ((1u64 << bits) - 1) as u32
}

/// Grid steps per unit at a width
#[inline]
fn steps(bits: u8) -> f64 {
    (1u64 << bits) as f64
}

/// Quantize a value in `[0, 1]` to the nearest `bits`-wide code
#[inline]
pub fn quantize_unorm(value: f32, bits: u8) -> u32 {
    let max = max_quantized(bits);
    let scaled = (value.clamp(0.0, 1.0) as f64 * steps(bits)).round() as u64;
    scaled.min(max as u64) as u32
}

/// Inverse of [`quantize_unorm`]
#[inline]
pub fn dequantize_unorm(value: u32, bits: u8) -> f32 {
    (value.min(max_quantized(bits)) as f64 / steps(bits)) as f32
}

/// Quantize a range-reduced sample
pub fn quantize_components(range: &TrackRange, value: [f32; 3], bits: u8) -> [u32; 3] {
    let normalized = range.normalize(value);
    normalized.map(|v| quantize_unorm(v, bits))
}

/// Reconstruct a range-reduced sample
pub fn dequantize_components(range: &TrackRange, quantized: [u32; 3], bits: u8) -> [f32; 3] {
    range.denormalize(quantized.map(|q| dequantize_unorm(q, bits)))
}

/// Rotation with a non-negative w, as stored by drop-W formats
pub fn canonical_rotation(rotation: Quat) -> Quat {
    let rotation = rotation.normalize();
    if rotation.w < 0.0 { -rotation } else { rotation }
}

/// The x, y, z components kept by drop-W formats
pub fn drop_w(rotation: Quat) -> [f32; 3] {
    let q = canonical_rotation(rotation);
    [q.x, q.y, q.z]
}

/// Rebuild a rotation from its x, y, z components with a positive w
pub fn rotation_from_xyz(xyz: [f32; 3]) -> Quat {
    let [x, y, z] = xyz;
    let w = (1.0 - (x * x + y * y + z * z)).max(0.0).sqrt();
    Quat::from_xyzw(x, y, z, w).normalize()
}
