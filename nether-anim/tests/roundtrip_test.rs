//! Integration tests for the compress → decode round trip.
//!
//! Tests the complete flow:
//! 1. Build a procedural clip
//! 2. Compress through the pipeline
//! 3. Decode every sample and measure it against the source

mod clip_generator;

use glam::{Quat, Vec3};
use nether_anim::{
    AnimationClip, Bone, Channel, ClipReader, CompressionSettings, RangeReductionFlags,
    RotationFormat, SampleValue, Skeleton, TrackDescriptor, VectorFormat, compress_clip,
    decode_sample,
};
use std::f32::consts::FRAC_PI_2;
use std::sync::Arc;

use clip_generator::{chain_skeleton, pose_error, wave_clip};

/// Slack for f32 noise between the quantizer's measurement and ours
const METRIC_SLACK: f32 = 1e-5;

fn assert_within_threshold(clip: &AnimationClip, bytes: &[u8], threshold: f32) {
    let reader = ClipReader::new(bytes).unwrap();
    assert_eq!(reader.sample_count(), clip.sample_count());

    for sample in 0..clip.sample_count() as usize {
        let exact = clip.sample_pose(sample).unwrap();
        let decoded = reader.decode_sample(sample).unwrap();
        let error = pose_error(clip.skeleton(), &exact, &decoded, clip.is_additive());
        assert!(
            error <= threshold + METRIC_SLACK,
            "sample {} error {} exceeds {}",
            sample,
            error,
            threshold
        );
    }
}

// ========================================================================
// Round trip
// ========================================================================

#[test]
fn test_wave_roundtrip_within_threshold() {
    let clip = wave_clip(chain_skeleton(6, 3.0), 40, 30.0, false);
    let settings = CompressionSettings::default();
    let compressed = compress_clip(&clip, &settings).unwrap();

    assert!(compressed.stats.max_error <= settings.error_threshold);
    assert!(compressed.stats.compressed_size < compressed.stats.raw_size);
    assert_within_threshold(&clip, &compressed.bytes, settings.error_threshold);
}

#[test]
fn test_additive_roundtrip_within_threshold() {
    let clip = wave_clip(chain_skeleton(4, 3.0), 30, 30.0, true);
    let settings = CompressionSettings::default();
    let compressed = compress_clip(&clip, &settings).unwrap();

    let reader = compressed.reader().unwrap();
    assert!(reader.is_additive());
    assert_within_threshold(&clip, &compressed.bytes, settings.error_threshold);
}

#[test]
fn test_tight_threshold_with_large_vertex_distance() {
    let clip = wave_clip(chain_skeleton(3, 100.0), 24, 24.0, false);
    let settings = CompressionSettings::default().with_error_threshold(0.005);
    let compressed = compress_clip(&clip, &settings).unwrap();
    assert_within_threshold(&clip, &compressed.bytes, 0.005);
}

#[test]
fn test_fixed_48_roundtrip() {
    let clip = wave_clip(chain_skeleton(4, 3.0), 30, 30.0, false);
    let settings = CompressionSettings {
        rotation_format: RotationFormat::QuatDropW48,
        translation_format: VectorFormat::Vector3_48,
        scale_format: VectorFormat::Vector3_48,
        ..Default::default()
    };
    let compressed = compress_clip(&clip, &settings).unwrap();
    assert_within_threshold(&clip, &compressed.bytes, settings.error_threshold);

    let reader = compressed.reader().unwrap();
    assert!(matches!(
        reader.descriptor(0, Channel::Rotation).unwrap(),
        TrackDescriptor::Quantized { bits: 16, .. }
    ));
}

#[test]
fn test_full_precision_formats_are_lossless() {
    let clip = wave_clip(chain_skeleton(3, 3.0), 20, 30.0, false);
    let settings = CompressionSettings {
        rotation_format: RotationFormat::Quat128,
        translation_format: VectorFormat::Vector3_96,
        scale_format: VectorFormat::Vector3_96,
        range_reduction: RangeReductionFlags::empty(),
        ..Default::default()
    };
    let compressed = compress_clip(&clip, &settings).unwrap();
    assert_eq!(compressed.stats.max_error, 0.0);

    for sample in 0..20 {
        assert_eq!(
            decode_sample(&compressed.bytes, sample).unwrap(),
            clip.sample_pose(sample).unwrap(),
            "sample {}",
            sample
        );
    }
}

// ========================================================================
// Determinism
// ========================================================================

#[test]
fn test_compression_is_idempotent() {
    let clip = wave_clip(chain_skeleton(5, 3.0), 32, 30.0, false);
    let settings = CompressionSettings::default();

    let first = compress_clip(&clip, &settings).unwrap();
    let second = compress_clip(&clip.clone(), &settings).unwrap();
    assert_eq!(first.bytes, second.bytes);
    assert_eq!(first.stats, second.stats);
}

// ========================================================================
// Stripped tracks and bind pose
// ========================================================================

#[test]
fn test_bind_pose_tracks_decode_exactly() {
    let skeleton = chain_skeleton(4, 3.0);
    let mut clip = wave_clip(skeleton.clone(), 25, 30.0, false);

    // Bone 2 explicitly keyed at its bind rotation every sample
    let bind = skeleton.bone(2).unwrap().bind_transform;
    for sample in 0..25 {
        clip.set_sample(2, sample, SampleValue::Rotation(bind.rotation))
            .unwrap();
    }

    let compressed = compress_clip(&clip, &CompressionSettings::default()).unwrap();
    let reader = compressed.reader().unwrap();
    assert_eq!(
        reader.descriptor(2, Channel::Rotation).unwrap(),
        &TrackDescriptor::Default
    );
    for sample in 0..25 {
        let pose = reader.decode_sample(sample).unwrap();
        assert_eq!(pose[2].rotation, bind.rotation);
        assert_eq!(pose[2].translation, bind.translation);
    }
}

#[test]
fn test_bind_pose_clip_decodes_to_bind_transforms() {
    let skeleton = chain_skeleton(5, 3.0);
    let clip = AnimationClip::bind_pose(skeleton.clone(), false).unwrap();
    let compressed = compress_clip(&clip, &CompressionSettings::default()).unwrap();

    let reader = compressed.reader().unwrap();
    assert_eq!(reader.name(), "Bind Pose");
    assert_eq!(reader.sample_count(), 1);
    assert_eq!(reader.sample_rate(), 30.0);

    let pose = reader.decode_sample(0).unwrap();
    for (bone, decoded) in skeleton.bones().iter().zip(&pose) {
        assert_eq!(*decoded, bone.bind_transform, "bone {}", bone.name);
    }
    assert_eq!(compressed.stats.animated_tracks, 0);
}

#[test]
fn test_additive_bind_pose_has_zero_scale() {
    let skeleton = chain_skeleton(3, 3.0);
    let clip = AnimationClip::bind_pose(skeleton.clone(), true).unwrap();
    let compressed = compress_clip(&clip, &CompressionSettings::default()).unwrap();

    let pose = decode_sample(&compressed.bytes, 0).unwrap();
    for (bone, decoded) in skeleton.bones().iter().zip(&pose) {
        assert_eq!(decoded.scale, Vec3::ZERO);
        assert_eq!(decoded.translation, bone.bind_transform.translation);
        assert_eq!(decoded.rotation, bone.bind_transform.rotation);
    }
}

// ========================================================================
// Two-bone scenario
// ========================================================================

#[test]
fn test_two_bone_quarter_turn() {
    let skeleton = Arc::new(
        Skeleton::new(vec![
            Bone::new("root", None, Quat::IDENTITY, Vec3::ZERO, 3.0),
            Bone::new("child", Some(0), Quat::IDENTITY, Vec3::new(0.0, 1.0, 0.0), 10.0),
        ])
        .unwrap(),
    );
    let mut clip = AnimationClip::new(skeleton.clone(), 30, 30.0, "quarter turn", false).unwrap();
    for sample in 0..30 {
        let angle = FRAC_PI_2 * sample as f32 / 29.0;
        clip.set_sample(1, sample, SampleValue::Rotation(Quat::from_rotation_z(angle)))
            .unwrap();
    }

    let settings = CompressionSettings::default().with_error_threshold(0.01);
    assert_eq!(settings.rotation_format, RotationFormat::QuatDropWVariable);
    let compressed = compress_clip(&clip, &settings).unwrap();

    let reader = compressed.reader().unwrap();
    let TrackDescriptor::Quantized { bits, .. } = *reader.descriptor(1, Channel::Rotation).unwrap()
    else {
        panic!("child rotation should be quantized");
    };
    assert!((settings.min_bits..=settings.max_bits).contains(&bits));

    for sample in 0..30 {
        let angle = FRAC_PI_2 * sample as f32 / 29.0;
        let decoded = reader.decode_sample(sample).unwrap();
        let mut expected = clip.sample_pose(sample).unwrap();
        expected[1].rotation = Quat::from_rotation_z(angle);

        let error = pose_error(&skeleton, &expected, &decoded, false);
        assert!(error <= 0.01 + METRIC_SLACK, "sample {} error {}", sample, error);
    }
}
