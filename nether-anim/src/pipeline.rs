//! Selector → quantizer → encoder pipeline

use rayon::prelude::*;
use tracing::info;

use crate::clip::AnimationClip;
use crate::decoder::ClipReader;
use crate::encoder::encode;
use crate::error::Result;
use crate::quantize::quantize_clip;
use crate::settings::CompressionSettings;

/// Uncompressed size of one bone sample (rotation 4 × f32, translation and scale 3 × f32)
pub const RAW_BONE_SAMPLE_SIZE: usize = 40;

/// Summary of one compressed clip
#[derive(Debug, Clone, PartialEq)]
pub struct CompressionStats {
    /// Bytes needed to store every sample of every bone uncompressed
    pub raw_size: usize,
    pub compressed_size: usize,
    /// `raw_size / compressed_size`
    pub ratio: f32,
    /// Worst vertex error over all bones and samples
    pub max_error: f32,
    pub worst_bone: Option<usize>,
    pub stripped_tracks: usize,
    pub constant_tracks: usize,
    pub animated_tracks: usize,
}

/// An encoded clip and its statistics
#[derive(Debug, Clone, PartialEq)]
pub struct CompressedClip {
    pub bytes: Vec<u8>,
    pub stats: CompressionStats,
}

impl CompressedClip {
    pub fn reader(&self) -> Result<ClipReader<'_>> {
        ClipReader::new(&self.bytes)
    }
}

/// Compress one clip
///
/// Either the whole clip compresses within the settings' error threshold or
/// an error is returned; no partial output is produced.
pub fn compress_clip(clip: &AnimationClip, settings: &CompressionSettings) -> Result<CompressedClip> {
    let quantized = quantize_clip(clip, settings)?;
    let bytes = encode(&quantized)?;

    let raw_size = clip.bones().len() * clip.sample_count() as usize * RAW_BONE_SAMPLE_SIZE;
    let (stripped_tracks, constant_tracks, animated_tracks) = quantized.track_counts();
    let stats = CompressionStats {
        raw_size,
        compressed_size: bytes.len(),
        ratio: raw_size as f32 / bytes.len() as f32,
        max_error: quantized.max_error,
        worst_bone: quantized.worst_bone,
        stripped_tracks,
        constant_tracks,
        animated_tracks,
    };

    info!(
        "Compressed '{}': {} bones, {} samples, {} -> {} bytes ({:.2}x), max error {:.6}",
        clip.name(),
        clip.bones().len(),
        clip.sample_count(),
        stats.raw_size,
        stats.compressed_size,
        stats.ratio,
        stats.max_error
    );

    Ok(CompressedClip { bytes, stats })
}

/// Compress independent clips in parallel
///
/// Results are returned in input order, one per clip.
pub fn compress_clips(
    clips: &[AnimationClip],
    settings: &CompressionSettings,
) -> Vec<Result<CompressedClip>> {
    clips
        .par_iter()
        .map(|clip| compress_clip(clip, settings))
        .collect()
}
