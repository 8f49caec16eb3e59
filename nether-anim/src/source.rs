//! Engine-neutral source animation data
//!
//! A host translation layer fills these structures once from its own
//! animation containers; the clip builder never touches host types.

use glam::{Quat, Vec3};

use crate::error::{AnimError, Result};

/// Raw keys for one bone as exported by the host
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SourceTrack {
    /// Skeleton bone this track animates
    pub bone_index: u16,
    /// One key, or one key per frame
    pub rotations: Vec<Quat>,
    /// One key, or one key per frame
    pub translations: Vec<Vec3>,
    /// Empty (no scale data), one key, or one key per frame
    pub scales: Vec<Vec3>,
}

impl SourceTrack {
    pub fn new(bone_index: u16) -> Self {
        Self {
            bone_index,
            ..Default::default()
        }
    }

    /// Value at a frame, holding single-key tracks
    pub(crate) fn key<T: Copy>(keys: &[T], frame: usize) -> Option<T> {
        match keys.len() {
            0 => None,
            1 => Some(keys[0]),
            _ => keys.get(frame).copied(),
        }
    }
}

/// A host animation sequence
#[derive(Debug, Clone, PartialEq)]
pub struct SourceAnimation {
    pub name: String,
    /// Frames per track when fully keyed
    pub frame_count: u32,
    /// Samples per second, as reported by the host
    pub sample_rate: f32,
    /// Tracks in host order; a track's position is its output index
    pub tracks: Vec<SourceTrack>,
}

impl SourceAnimation {
    pub fn new(name: impl Into<String>, frame_count: u32, sample_rate: f32) -> Self {
        Self {
            name: name.into(),
            frame_count,
            sample_rate,
            tracks: Vec::new(),
        }
    }

    /// Check key counts against the frame count
    pub fn validate(&self, bone_count: usize) -> Result<()> {
        if self.frame_count == 0 {
            return Err(AnimError::InvalidClip(format!(
                "source animation '{}' has no frames",
                self.name
            )));
        }
        if self.tracks.len() >= u16::MAX as usize {
            return Err(AnimError::InvalidClip(format!(
                "source animation '{}' has {} tracks, maximum is {}",
                self.name,
                self.tracks.len(),
                u16::MAX - 1
            )));
        }

        let frames = self.frame_count as usize;
        for (index, track) in self.tracks.iter().enumerate() {
            if track.bone_index as usize >= bone_count {
                return Err(AnimError::out_of_range(
                    "source bone",
                    track.bone_index as usize,
                    bone_count,
                ));
            }
            let counts = [
                ("rotation", track.rotations.len(), false),
                ("translation", track.translations.len(), false),
                ("scale", track.scales.len(), true),
            ];
            for (channel, len, may_be_empty) in counts {
                let valid = len == 1 || len == frames || (may_be_empty && len == 0);
                if !valid {
                    return Err(AnimError::InvalidClip(format!(
                        "track {} has {} {} keys, expected 1 or {}",
                        index, len, channel, frames
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyed(bone: u16, frames: usize) -> SourceTrack {
        SourceTrack {
            bone_index: bone,
            rotations: vec![Quat::IDENTITY; frames],
            translations: vec![Vec3::ZERO],
            scales: Vec::new(),
        }
    }

    #[test]
    fn test_valid_source() {
        let mut source = SourceAnimation::new("walk", 10, 30.0);
        source.tracks.push(keyed(0, 10));
        source.tracks.push(keyed(1, 1));
        assert!(source.validate(2).is_ok());
    }

    #[test]
    fn test_bad_key_count() {
        let mut source = SourceAnimation::new("walk", 10, 30.0);
        source.tracks.push(keyed(0, 7));
        let err = source.validate(1).unwrap_err();
        assert!(matches!(err, AnimError::InvalidClip(_)));
        assert!(err.to_string().contains("rotation"));
    }

    #[test]
    fn test_missing_rotation_keys() {
        let mut source = SourceAnimation::new("walk", 10, 30.0);
        let mut track = keyed(0, 10);
        track.rotations.clear();
        source.tracks.push(track);
        assert!(source.validate(1).is_err());
    }

    #[test]
    fn test_unknown_bone() {
        let mut source = SourceAnimation::new("walk", 10, 30.0);
        source.tracks.push(keyed(4, 10));
        assert!(matches!(
            source.validate(2),
            Err(AnimError::IndexOutOfRange { index: 4, .. })
        ));
    }

    #[test]
    fn test_key_lookup() {
        let keys = [1, 2, 3];
        assert_eq!(SourceTrack::key(&keys, 2), Some(3));
        assert_eq!(SourceTrack::key(&[9], 5), Some(9));
        assert_eq!(SourceTrack::key::<i32>(&[], 0), None);
    }
}
