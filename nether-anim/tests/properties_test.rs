//! Integration tests for pipeline-wide properties: validation, failure
//! modes, bit-width behaviour, output routing and batch compression.

mod clip_generator;

use glam::{Quat, Vec3};
use nether_anim::{
    AnimError, AnimationClip, Bone, BoneTransform, Channel, ClipHeader, ClipReader,
    CompressionSettings, RotationFormat, SampleValue, Skeleton, SourceAnimation, SourceTrack,
    TrackDescriptor, VectorFormat, compress_clip, compress_clips, decode_interpolated,
    measure_track_error,
};
use std::sync::Arc;

use clip_generator::{chain_skeleton, wave_clip};

// ========================================================================
// Hierarchy and clip validation
// ========================================================================

#[test]
fn test_parent_not_before_child_is_invalid() {
    for parent in [1u16, 2] {
        let bones = vec![
            Bone::new("root", None, Quat::IDENTITY, Vec3::ZERO, 3.0),
            Bone::new("a", Some(parent), Quat::IDENTITY, Vec3::Y, 3.0),
            Bone::new("b", Some(0), Quat::IDENTITY, Vec3::Y, 3.0),
        ];
        assert!(
            matches!(Skeleton::new(bones), Err(AnimError::InvalidHierarchy(_))),
            "parent {}",
            parent
        );
    }
}

#[test]
fn test_set_sample_bounds() {
    let mut clip = AnimationClip::new(chain_skeleton(2, 3.0), 10, 30.0, "clip", false).unwrap();
    assert!(matches!(
        clip.set_sample(2, 0, SampleValue::Scale(Vec3::ONE)),
        Err(AnimError::IndexOutOfRange { what: "bone", .. })
    ));
    assert!(matches!(
        clip.set_sample(0, 10, SampleValue::Scale(Vec3::ONE)),
        Err(AnimError::IndexOutOfRange { what: "sample", .. })
    ));
}

#[test]
fn test_additive_synthesized_bone_defaults() {
    let skeleton = chain_skeleton(3, 3.0);
    let mut source = SourceAnimation::new("additive", 12, 30.0);
    source.tracks.push(SourceTrack {
        bone_index: 0,
        rotations: (0..12).map(|i| Quat::from_rotation_x(i as f32 * 0.05)).collect(),
        translations: vec![Vec3::ZERO],
        scales: Vec::new(),
    });
    let clip = AnimationClip::from_source(skeleton.clone(), &source, true).unwrap();

    for sample in 0..12 {
        let pose = clip.sample_pose(sample).unwrap();
        for bone in 1..3 {
            assert_eq!(pose[bone].scale, Vec3::ZERO);
            assert_eq!(
                pose[bone].translation,
                skeleton.bone(bone).unwrap().bind_transform.translation
            );
        }
    }

    let compressed = compress_clip(&clip, &CompressionSettings::default()).unwrap();
    let reader = compressed.reader().unwrap();
    assert_eq!(reader.output_indices(), vec![Some(0), None, None]);
    for sample in 0..12 {
        let pose = reader.decode_sample(sample).unwrap();
        assert_eq!(pose[2].scale, Vec3::ZERO);
        assert_eq!(pose[2].translation, Vec3::new(0.0, 1.5, 0.0));
    }
}

// ========================================================================
// Bit widths
// ========================================================================

#[test]
fn test_more_bits_never_increase_error() {
    // Dense linear ramp: every quantization cell holds several samples
    let samples = 1000;
    let mut clip =
        AnimationClip::new(chain_skeleton(1, 3.0), samples, 30.0, "ramp", false).unwrap();
    for i in 0..samples as usize {
        let x = i as f32 / (samples - 1) as f32;
        clip.set_sample(0, i, SampleValue::Translation(Vec3::new(x, 0.0, 0.0)))
            .unwrap();
    }

    let settings = CompressionSettings::default();
    let errors: Vec<f32> = (1..=9)
        .map(|bits| measure_track_error(&clip, &settings, 0, Channel::Translation, bits).unwrap())
        .collect();
    for (bits, pair) in (2..).zip(errors.windows(2)) {
        assert!(
            pair[1] <= pair[0] + 1e-6,
            "{} bits: {} -> {}",
            bits,
            pair[0],
            pair[1]
        );
    }
}

#[test]
fn test_sparse_track_error_never_grows_with_bits() {
    let mut clip = AnimationClip::new(chain_skeleton(1, 3.0), 3, 30.0, "sparse", false).unwrap();
    for (i, x) in [0.0, 1.0 / 3.0, 1.0].into_iter().enumerate() {
        clip.set_sample(0, i, SampleValue::Translation(Vec3::new(x, 0.0, 0.0)))
            .unwrap();
    }

    let settings = CompressionSettings::default();
    let errors: Vec<f32> = (1..=23)
        .map(|bits| measure_track_error(&clip, &settings, 0, Channel::Translation, bits).unwrap())
        .collect();
    for (bits, pair) in (2..).zip(errors.windows(2)) {
        // Slack covers f32 rounding of vertices three units from the joint
        assert!(
            pair[1] <= pair[0] + 1e-6,
            "{} bits: {} -> {}",
            bits,
            pair[0],
            pair[1]
        );
    }
    assert!(errors[22] < 2e-6, "{}", errors[22]);
}

#[test]
fn test_rotation_error_falls_with_bits() {
    let clip = wave_clip(chain_skeleton(2, 10.0), 60, 30.0, false);
    let settings = CompressionSettings::default();
    let error = |bits| measure_track_error(&clip, &settings, 1, Channel::Rotation, bits).unwrap();

    let (coarse, medium, fine) = (error(4), error(10), error(18));
    assert!(medium < coarse, "{} !< {}", medium, coarse);
    assert!(fine < medium, "{} !< {}", fine, medium);
}

// ========================================================================
// Stripped tracks
// ========================================================================

#[test]
fn test_near_bind_offset_decodes_to_bind_beside_animated_rotation() {
    for amplitude in [0.05f32, 0.2, 0.45, 0.8] {
        let skeleton = chain_skeleton(2, 3.0);
        let mut clip = AnimationClip::new(skeleton.clone(), 30, 30.0, "sway", false).unwrap();
        for i in 0..30 {
            let angle = (i as f32 / 30.0 * std::f32::consts::TAU).sin() * amplitude;
            clip.set_sample(0, i, SampleValue::Rotation(Quat::from_rotation_z(angle)))
                .unwrap();
            clip.set_sample(0, i, SampleValue::Translation(Vec3::new(0.0009, 0.0, 0.0)))
                .unwrap();
        }

        let compressed = compress_clip(&clip, &CompressionSettings::default()).unwrap();
        let reader = compressed.reader().unwrap();
        assert_eq!(
            reader.descriptor(0, Channel::Translation).unwrap(),
            &TrackDescriptor::Default,
            "amplitude {}",
            amplitude
        );
        assert!(matches!(
            reader.descriptor(0, Channel::Rotation).unwrap(),
            TrackDescriptor::Quantized { .. }
        ));

        let bind = skeleton.bone(0).unwrap().bind_transform.translation;
        for sample in 0..30 {
            assert_eq!(reader.decode_sample(sample).unwrap()[0].translation, bind);
        }
    }
}

// ========================================================================
// Failure modes
// ========================================================================

#[test]
fn test_uncertified_format_is_unsupported() {
    let clip = wave_clip(chain_skeleton(2, 3.0), 10, 30.0, false);
    let settings = CompressionSettings {
        rotation_format: RotationFormat::Quat128,
        ..Default::default()
    };
    assert!(matches!(
        compress_clip(&clip, &settings),
        Err(AnimError::UnsupportedFormat(_))
    ));
}

#[test]
fn test_unreachable_tolerance_is_reported() {
    let clip = wave_clip(chain_skeleton(3, 3.0), 30, 30.0, false);
    let settings = CompressionSettings {
        rotation_format: RotationFormat::QuatDropW48,
        translation_format: VectorFormat::Vector3_48,
        scale_format: VectorFormat::Vector3_48,
        ..Default::default()
    }
    .with_error_threshold(1e-7);

    match compress_clip(&clip, &settings) {
        Err(AnimError::ToleranceUnsatisfiable { error, threshold, .. }) => {
            assert!(error > threshold);
        }
        other => panic!("expected ToleranceUnsatisfiable, got {:?}", other),
    }
}

#[test]
fn test_corrupt_buffers_never_panic() {
    let clip = wave_clip(chain_skeleton(2, 3.0), 6, 30.0, false);
    let bytes = compress_clip(&clip, &CompressionSettings::default())
        .unwrap()
        .bytes;

    for len in 0..bytes.len() {
        assert!(
            matches!(ClipReader::new(&bytes[..len]), Err(AnimError::CorruptBuffer(_))),
            "prefix of {} bytes",
            len
        );
    }

    for index in 0..bytes.len() {
        let mut damaged = bytes.clone();
        damaged[index] ^= 0xff;
        match ClipReader::new(&damaged) {
            Ok(reader) => {
                for sample in 0..reader.sample_count() as usize {
                    // Payload damage decodes to wrong values, never to a panic
                    let _ = reader.decode_sample(sample);
                }
            }
            Err(err) => assert!(
                matches!(err, AnimError::CorruptBuffer(_)),
                "byte {}: {:?}",
                index,
                err
            ),
        }
    }
}

#[test]
fn test_header_damage_is_detected() {
    let clip = wave_clip(chain_skeleton(2, 3.0), 6, 30.0, false);
    let bytes = compress_clip(&clip, &CompressionSettings::default())
        .unwrap()
        .bytes;

    // Magic, version, bone count, formats, sample count and table lengths
    for index in [0, 4, 8, 10, 11, 12, 16, 24, 28] {
        let mut damaged = bytes.clone();
        damaged[index] ^= 0xff;
        assert!(ClipReader::new(&damaged).is_err(), "byte {}", index);
    }
    assert!(ClipHeader::from_bytes(&bytes).is_ok());
}

// ========================================================================
// Playback
// ========================================================================

#[test]
fn test_source_order_drives_output_routing() {
    let skeleton = chain_skeleton(3, 3.0);
    let mut source = SourceAnimation::new("routed", 8, 24.0);
    // Host lists the tip first and the root second; the middle bone is absent
    for bone_index in [2u16, 0] {
        source.tracks.push(SourceTrack {
            bone_index,
            rotations: (0..8)
                .map(|i| Quat::from_rotation_z(i as f32 * 0.1 + bone_index as f32))
                .collect(),
            translations: vec![skeleton.bone(bone_index as usize).unwrap().bind_transform.translation],
            scales: vec![Vec3::ONE],
        });
    }
    let clip = AnimationClip::from_source(skeleton, &source, false).unwrap();
    let compressed = compress_clip(&clip, &CompressionSettings::default()).unwrap();
    let reader = compressed.reader().unwrap();

    assert_eq!(reader.sample_rate(), 24.0);
    let pose = reader.decode_sample(5).unwrap();
    let mut host = vec![BoneTransform::IDENTITY; 2];
    reader.write_output_pose(5, &mut host).unwrap();
    assert_eq!(host[0], pose[2]);
    assert_eq!(host[1], pose[0]);
}

#[test]
fn test_interpolated_playback_between_samples() {
    let clip = wave_clip(chain_skeleton(3, 3.0), 20, 30.0, false);
    let bytes = compress_clip(&clip, &CompressionSettings::default())
        .unwrap()
        .bytes;

    let start = decode_interpolated(&bytes, 6, 7, 0.0).unwrap();
    let end = decode_interpolated(&bytes, 6, 7, 1.0).unwrap();
    let mid = decode_interpolated(&bytes, 6, 7, 0.5).unwrap();
    for bone in 0..3 {
        let expected = start[bone].interpolate(&end[bone], 0.5);
        assert!(mid[bone].rotation.angle_between(expected.rotation) < 1e-5);
        assert!((mid[bone].translation - expected.translation).length() < 1e-6);
    }
}

// ========================================================================
// Batch compression
// ========================================================================

#[test]
fn test_parallel_matches_sequential() {
    let skeleton = chain_skeleton(4, 3.0);
    let clips = vec![
        wave_clip(skeleton.clone(), 20, 30.0, false),
        AnimationClip::bind_pose(skeleton.clone(), false).unwrap(),
        wave_clip(skeleton, 35, 60.0, true),
        wave_clip(chain_skeleton(2, 3.0), 5, 30.0, false),
    ];
    let settings = CompressionSettings::default();

    let parallel = compress_clips(&clips, &settings);
    assert_eq!(parallel.len(), clips.len());
    for (clip, result) in clips.iter().zip(parallel) {
        let sequential = compress_clip(clip, &settings).unwrap();
        assert_eq!(result.unwrap(), sequential);
    }
}

#[test]
fn test_shared_skeleton_across_clips() {
    let skeleton = chain_skeleton(3, 3.0);
    let a = wave_clip(Arc::clone(&skeleton), 10, 30.0, false);
    let b = AnimationClip::bind_pose(Arc::clone(&skeleton), false).unwrap();
    assert!(Arc::ptr_eq(&a.shared_skeleton(), &b.shared_skeleton()));
    assert_eq!(Arc::strong_count(&skeleton), 3);
}

// ========================================================================
// Settings files
// ========================================================================

#[test]
fn test_toml_settings_drive_encoding() {
    let settings = CompressionSettings::from_toml_str(
        r#"
rotation_format = "quat_drop_w_48"
translation_format = "vector3_96"
error_threshold = 0.02
"#,
    )
    .unwrap();
    assert_eq!(settings.scale_format, VectorFormat::default());

    let clip = wave_clip(chain_skeleton(3, 3.0), 16, 30.0, false);
    let compressed = compress_clip(&clip, &settings).unwrap();
    let reader = compressed.reader().unwrap();

    assert_eq!(reader.header().rotation_format, RotationFormat::QuatDropW48);
    assert_eq!(reader.header().translation_format, VectorFormat::Vector3_96);
    assert!(compressed.stats.max_error <= 0.02);
    assert!(matches!(
        reader.descriptor(0, Channel::Translation).unwrap(),
        TrackDescriptor::Raw { components: 3, .. }
    ));
}
