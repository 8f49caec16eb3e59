//! Error-bounded skeletal animation clip compression
//!
//! This crate turns sampled bone animation into a compact binary clip and
//! decodes it back for playback. Data flows one way:
//!
//! ```text
//! Skeleton + AnimationClip -> select_formats -> quantize_clip -> encode -> bytes
//! bytes -> ClipReader -> per-bone transforms
//! ```
//!
//! Error is measured as the displacement of virtual vertices placed around
//! each bone (see [`Bone::vertex_distance`]), pushed through the whole
//! parent chain. Compression either meets the configured threshold for every
//! bone and sample or fails.
//!
//! # Modules
//!
//! - [`skeleton`] - Bone hierarchy with parents-first ordering
//! - [`clip`] - Per-bone sample tracks and clip construction policies
//! - [`source`] - Engine-neutral host animation data
//! - [`settings`] - Compression settings and TOML loading
//! - [`format`] - Track formats and plan certification
//! - [`quantize`] - Track classification and bit-rate search
//! - [`encoder`] / [`decoder`] - The `.ncanim` binary layout
//! - [`pipeline`] - One-call compression of single clips or batches

pub mod bitstream;
pub mod clip;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod format;
pub mod header;
pub mod math;
pub mod pipeline;
pub mod quantize;
pub mod range;
pub mod settings;
pub mod skeleton;
pub mod source;
pub mod track;

/// File extension for compressed clips
pub const CLIP_EXT: &str = "ncanim";

pub use clip::{AnimationClip, BIND_POSE_CLIP_NAME, SINGLE_SAMPLE_RATE, default_scale};
pub use decoder::{BoneEntry, ClipReader, TrackDescriptor, decode_interpolated, decode_sample};
pub use encoder::encode;
pub use error::{AnimError, Result};
pub use format::{
    Channel, ChannelEncoding, FormatPlan, RangeReductionFlags, RotationFormat, VectorFormat,
    select_formats,
};
pub use header::{ClipHeader, TrackKind};
pub use math::BoneTransform;
pub use pipeline::{CompressedClip, CompressionStats, compress_clip, compress_clips};
pub use quantize::{
    EncodedTrack, QuantizedBone, QuantizedClip, measure_track_error, quantize_clip,
};
pub use settings::{CompressionSettings, SettingsError, VertexDistances};
pub use skeleton::{Bone, BoneDesc, Skeleton};
pub use source::{SourceAnimation, SourceTrack};
pub use track::{BoneTracks, SampleValue, Track};
